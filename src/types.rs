// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use tracing::debug;
use url::{Host, Url};
use uuid::Uuid;

use crate::resolver::Resolver;

/// Severity of a finding; drives how long a re-notification is held back
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// A unit of scan work as passed between workers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub uid: String,

    /// Uid of the analysis this task descends from
    pub root_uid: String,

    #[serde(default)]
    pub headers: Map<String, Value>,

    #[serde(default)]
    pub payload: Map<String, Value>,

    #[serde(default)]
    pub payload_persistent: Map<String, Value>,
}

impl Task {
    pub fn new(root_uid: &str) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            root_uid: root_uid.to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.headers.insert(key.to_string(), value.into());
        self
    }

    pub fn with_payload(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn with_persistent(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload_persistent.insert(key.to_string(), value.into());
        self
    }

    /// Host or address the task points at, if any
    pub fn destination(&self) -> Option<String> {
        ["host", "domain", "ip", "url"]
            .iter()
            .find_map(|key| self.payload.get(*key).and_then(Value::as_str))
            .map(|target| match Url::parse(target) {
                Ok(url) => url
                    .host_str()
                    .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
                    .unwrap_or_else(|| target.to_string()),
                Err(_) => target.to_string(),
            })
    }
}

/// A reported vulnerability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,

    /// Target originally submitted for scanning
    pub top_level_target: String,

    /// Where the vulnerability was found: a URL or a bare domain/IP
    pub target: String,

    pub report_type: String,

    #[serde(default)]
    pub additional_data: Map<String, Value>,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub target_ip: Option<String>,

    #[serde(default)]
    pub target_ip_checked: bool,

    #[serde(default)]
    pub last_domain: Option<String>,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub is_subsequent_reminder: bool,
}

impl Finding {
    pub fn new(top_level_target: &str, target: &str, report_type: &str, severity: Severity) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            top_level_target: top_level_target.to_string(),
            target: target.to_string(),
            report_type: report_type.to_string(),
            additional_data: Map::new(),
            timestamp: None,
            target_ip: None,
            target_ip_checked: false,
            last_domain: None,
            severity,
            is_subsequent_reminder: false,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_target_ip(mut self, ip: &str) -> Self {
        self.target_ip = Some(ip.to_string());
        self.target_ip_checked = true;
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.additional_data.insert(key.to_string(), value.into());
        self
    }

    /// Parsed target, when it is a URL with a host
    pub fn target_url(&self) -> Option<Url> {
        Url::parse(&self.target).ok().filter(|url| url.has_host())
    }

    pub fn target_is_url(&self) -> bool {
        self.target_url().is_some()
    }

    pub fn target_is_domain(&self) -> bool {
        !self.target_is_url()
    }

    /// Host part of a URL target, brackets stripped from IPv6 literals
    pub fn target_host(&self) -> Option<String> {
        self.target_url().and_then(|url| match url.host()? {
            Host::Domain(domain) => Some(domain.to_string()),
            Host::Ipv4(ip) => Some(ip.to_string()),
            Host::Ipv6(ip) => Some(ip.to_string()),
        })
    }

    pub fn target_is_ip_address(&self) -> bool {
        match self.target_host() {
            Some(host) => host.parse::<IpAddr>().is_ok(),
            None => self.target.parse::<IpAddr>().is_ok(),
        }
    }

    /// Fill `target_ip` from the target host, at most once.
    ///
    /// Domain targets are skipped; domain-level issues have no IP version.
    /// Resolution failures leave the IP empty.
    pub async fn annotate_target_ip(&mut self, resolver: &Resolver) {
        if self.target_ip_checked {
            return;
        }

        if let Some(host) = self.target_host() {
            if host.parse::<IpAddr>().is_ok() {
                self.target_ip = Some(host);
            } else {
                match resolver.resolve_ips(&host).await {
                    Ok(ips) => self.target_ip = ips.into_iter().next(),
                    Err(e) => {
                        debug!(host = %host, error = %e, "Could not resolve finding target");
                        self.target_ip = None;
                    }
                }
            }
        }

        self.target_ip_checked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::resolver::{RecordType, StaticTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn resolver() -> Resolver {
        let transport = StaticTransport::new().with_record("a.example.com", RecordType::A, "1.2.3.4");
        Resolver::new(
            Arc::new(transport),
            &ResolverConfig {
                prefer_system_lookup: false,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_target_classification() {
        let url = Finding::new("example.com", "https://a.example.com/admin", "exposed_panel", Severity::Medium);
        assert!(url.target_is_url());
        assert!(!url.target_is_ip_address());
        assert_eq!(url.target_host().as_deref(), Some("a.example.com"));

        let ip_url = Finding::new("example.com", "http://[2001:db8::1]:8080/", "exposed_panel", Severity::Medium);
        assert!(ip_url.target_is_ip_address());
        assert_eq!(ip_url.target_host().as_deref(), Some("2001:db8::1"));

        let domain = Finding::new("example.com", "example.com", "missing_dmarc", Severity::Low);
        assert!(domain.target_is_domain());
        assert!(!domain.target_is_ip_address());
    }

    #[tokio::test]
    async fn test_annotate_target_ip() {
        let resolver = resolver();

        let mut finding = Finding::new("example.com", "http://a.example.com/.git/", "exposed_vcs", Severity::High);
        finding.annotate_target_ip(&resolver).await;
        assert_eq!(finding.target_ip.as_deref(), Some("1.2.3.4"));
        assert!(finding.target_ip_checked);

        let mut literal = Finding::new("10.0.0.5", "http://10.0.0.5:8080/", "exposed_vcs", Severity::High);
        literal.annotate_target_ip(&resolver).await;
        assert_eq!(literal.target_ip.as_deref(), Some("10.0.0.5"));

        let mut domain = Finding::new("example.com", "example.com", "missing_dmarc", Severity::Low);
        domain.annotate_target_ip(&resolver).await;
        assert!(domain.target_ip.is_none());
        assert!(domain.target_ip_checked);
    }

    #[test]
    fn test_task_destination() {
        let task = Task::new("analysis-1").with_payload("url", "https://scan.example.com:8443/x");
        assert_eq!(task.destination().as_deref(), Some("scan.example.com"));

        let task = Task::new("analysis-1").with_payload("ip", "10.0.0.5");
        assert_eq!(task.destination().as_deref(), Some("10.0.0.5"));

        let task = Task::new("analysis-1").with_header("type", json!("service"));
        assert!(task.destination().is_none());
    }

    #[test]
    fn test_finding_deserializes_with_defaults() {
        let finding: Finding = serde_json::from_value(json!({
            "top_level_target": "example.com",
            "target": "https://example.com/wp-config.php.bak",
            "report_type": "exposed_file",
            "severity": "high"
        }))
        .unwrap();

        assert_eq!(finding.severity, Severity::High);
        assert!(finding.timestamp.is_none());
        assert!(!finding.is_subsequent_reminder);
    }
}
