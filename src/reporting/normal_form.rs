// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Identity of a finding for deduplication.
//!
//! Findings that describe the same vulnerability (for example an exposed
//! `http://example.com/wp-config.php.bak` and `https://www.example.com/wp-config.php.bak`)
//! share a normal form. Among findings with one normal form, the one with the
//! highest score is the one worth sending.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use url::{Host, Url};

use crate::config::ReportingConfig;
use crate::task_dedup::canonicalize;
use crate::types::Finding;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NormalForm {
    pub report_type: String,
    pub target: String,
    /// Selected `additional_data` entries, canonical JSON per key
    pub identity: Vec<(String, String)>,
}

impl fmt::Display for NormalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.report_type, self.target)?;
        for (key, value) in &self.identity {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Strip a leading `www.`
pub fn domain_normal_form(domain: &str) -> String {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    match domain.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => domain,
    }
}

/// http and https on a common port collapse to scheme `http_or_https`, port 0
pub fn url_normal_form(url: &Url, common_http_ports: &[u16]) -> Option<String> {
    let host = match url.host()? {
        Host::Domain(domain) => domain_normal_form(domain),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => format!("[{}]", ip),
    };

    let port = url.port_or_known_default().unwrap_or(0);
    let (scheme, port) = match url.scheme() {
        "http" | "https" if common_http_ports.contains(&port) => ("http_or_https", 0),
        scheme => (scheme, port),
    };

    let mut normal = format!("{}://{}:{}{}", scheme, host, port, url.path());
    if let Some(query) = url.query() {
        normal.push('?');
        normal.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        normal.push('#');
        normal.push_str(fragment);
    }
    Some(normal)
}

pub fn url_score(url: &Url) -> i64 {
    let mut score = 0;
    if url.scheme() == "https" {
        score += 2;
    }
    if url.host_str().is_some_and(|host| host.starts_with("www.")) {
        score -= 1;
    }
    score
}

pub fn domain_score(domain: &str) -> i64 {
    if domain.starts_with("www.") {
        0
    } else {
        1
    }
}

/// The finding with its domain host replaced by `target_ip`, port kept.
///
/// Only URL findings on a domain host with a known IP have one. The result
/// need not exist as a real vulnerability; it is a deduplication key.
pub fn alternative_with_ip_address(finding: &Finding) -> Option<Finding> {
    let mut url = finding.target_url()?;
    if !matches!(url.host()?, Host::Domain(_)) {
        return None;
    }

    let ip: IpAddr = finding.target_ip.as_deref()?.parse().ok()?;
    url.set_ip_host(ip).ok()?;

    let mut alternative = finding.clone();
    alternative.target = url.to_string();
    Some(alternative)
}

/// Normal form with default rules
pub fn normal_form(finding: &Finding) -> NormalForm {
    NormalFormRules::default().normal_form(finding)
}

/// Per-report-type normal form and scoring rules
#[derive(Debug, Clone)]
pub struct NormalFormRules {
    common_http_ports: Vec<u16>,
    identity_keys: HashMap<String, Vec<String>>,
}

impl Default for NormalFormRules {
    fn default() -> Self {
        Self::from_config(&ReportingConfig::default())
    }
}

impl NormalFormRules {
    pub fn from_config(config: &ReportingConfig) -> Self {
        Self {
            common_http_ports: config.common_http_ports.clone(),
            identity_keys: HashMap::new(),
        }
    }

    /// Make `keys` of `additional_data` part of the identity of `report_type`
    pub fn with_identity_keys(mut self, report_type: &str, keys: &[&str]) -> Self {
        self.identity_keys.insert(
            report_type.to_string(),
            keys.iter().map(|k| k.to_string()).collect(),
        );
        self
    }

    pub fn normal_form(&self, finding: &Finding) -> NormalForm {
        let target = finding
            .target_url()
            .and_then(|url| url_normal_form(&url, &self.common_http_ports))
            .unwrap_or_else(|| domain_normal_form(&finding.target));

        let identity = self
            .identity_keys
            .get(&finding.report_type)
            .map(|keys| {
                keys.iter()
                    .map(|key| {
                        let value = finding
                            .additional_data
                            .get(key)
                            .map(|v| canonicalize(v).to_string())
                            .unwrap_or_else(|| "null".to_string());
                        (key.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        NormalForm {
            report_type: finding.report_type.clone(),
            target,
            identity,
        }
    }

    /// Compared lexicographically: target canonicality, then detail length
    pub fn score(&self, finding: &Finding) -> [i64; 2] {
        let canonicality = match finding.target_url() {
            Some(url) => url_score(&url),
            None => domain_score(&finding.target),
        };
        let detail = canonicalize(&serde_json::Value::Object(finding.additional_data.clone()))
            .to_string()
            .len() as i64;
        [canonicality, detail]
    }
}
