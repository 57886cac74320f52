// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Target Resolver
 * Hostname resolution with bounded CNAME chasing, retries and memoization
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

pub mod cname;
pub mod transport;

pub use cname::{chase_cnames, ChaseOutcome, MAX_CNAME_NEST_DEPTH};
pub use transport::{
    normalize_name, DnsTransport, HickoryTransport, StaticTransport, TransportAnswer,
    TransportRecord,
};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::errors::{CoordinationError, CoordinationResult};
use crate::retry::{retry_with_backoff, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Ns,
    Cname,
}

impl RecordType {
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Ns => "NS",
            RecordType::Cname => "CNAME",
        };
        f.write_str(name)
    }
}

impl FromStr for RecordType {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "NS" => Ok(RecordType::Ns),
            "CNAME" => Ok(RecordType::Cname),
            other => Err(CoordinationError::Configuration(format!(
                "Unsupported record type: {}",
                other
            ))),
        }
    }
}

/// Resolver statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Resolved on the first attempt
    pub clean: u64,
    /// Resolved only after at least one retry
    pub flaky: u64,
    pub failed: u64,
    pub truncated: u64,
    pub system_lookups: u64,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    clean: AtomicU64,
    flaky: AtomicU64,
    failed: AtomicU64,
    truncated: AtomicU64,
    system_lookups: AtomicU64,
}

/// Caching, retrying resolver in front of a `DnsTransport`
pub struct Resolver {
    transport: Arc<dyn DnsTransport>,
    cache: Cache<(String, RecordType), BTreeSet<String>>,
    retry: RetryConfig,
    prefer_system_lookup: bool,
    counters: Counters,
}

impl Resolver {
    pub fn new(transport: Arc<dyn DnsTransport>, config: &ResolverConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.cache_capacity).build();

        info!(
            "Resolver initialized: retries={}, cache_capacity={}, system_lookup={}",
            config.retries, config.cache_capacity, config.prefer_system_lookup
        );

        Self {
            transport,
            cache,
            retry: RetryConfig::default().with_max_attempts(config.retries),
            prefer_system_lookup: config.prefer_system_lookup,
            counters: Counters::default(),
        }
    }

    /// Resolver using the host's DNS configuration
    pub fn from_system_conf(config: &ResolverConfig) -> CoordinationResult<Self> {
        Ok(Self::new(Arc::new(HickoryTransport::from_system_conf()?), config))
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Records of `record_type` for `domain`, following CNAMEs.
    ///
    /// An absent domain yields an empty set; only transport failures that
    /// persist through every retry are errors.
    pub async fn lookup(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> CoordinationResult<BTreeSet<String>> {
        let domain = normalize_name(domain);
        let key = (domain.clone(), record_type);

        if let Some(records) = self.cache.get(&key).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(domain = %domain, record_type = %record_type, "Resolver cache hit");
            return Ok(records);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        if record_type.is_address() && self.prefer_system_lookup {
            let records = self.system_lookup(&domain, record_type).await;
            if !records.is_empty() {
                self.cache.insert(key, records.clone()).await;
                return Ok(records);
            }
        }

        let transport = Arc::clone(&self.transport);
        let outcome = retry_with_backoff(&self.retry, "dns_lookup", || {
            let transport = Arc::clone(&transport);
            let domain = domain.clone();
            async move { chase_cnames(transport.as_ref(), &domain, record_type).await }
        })
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(domain = %domain, record_type = %record_type, error = %e, "DNS lookup failed");
                return Err(e);
            }
        };

        if outcome.is_flaky() {
            self.counters.flaky.fetch_add(1, Ordering::Relaxed);
            info!(
                domain = %domain,
                record_type = %record_type,
                attempts = outcome.attempts,
                "Flaky DNS query"
            );
        } else {
            self.counters.clean.fetch_add(1, Ordering::Relaxed);
        }

        if outcome.value.is_truncated() {
            self.counters.truncated.fetch_add(1, Ordering::Relaxed);
        }

        let records = outcome.value.into_records();
        self.cache.insert(key, records.clone()).await;
        Ok(records)
    }

    /// IP addresses of `host`; IP literals are returned as-is
    pub async fn resolve_ips(&self, host: &str) -> CoordinationResult<BTreeSet<String>> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(std::iter::once(ip.to_string()).collect());
        }

        let mut ips = self.lookup(host, RecordType::A).await?;
        if ips.is_empty() {
            ips = self.lookup(host, RecordType::Aaaa).await?;
        }
        Ok(ips)
    }

    /// OS name lookup, which honors hosts-file overrides
    async fn system_lookup(&self, domain: &str, record_type: RecordType) -> BTreeSet<String> {
        self.counters.system_lookups.fetch_add(1, Ordering::Relaxed);

        match tokio::net::lookup_host(format!("{}:0", domain)).await {
            Ok(addrs) => addrs
                .map(|addr| addr.ip())
                .filter(|ip| match record_type {
                    RecordType::A => ip.is_ipv4(),
                    RecordType::Aaaa => ip.is_ipv6(),
                    _ => false,
                })
                .map(|ip| ip.to_string())
                .collect(),
            Err(e) => {
                debug!(domain = domain, error = %e, "System lookup failed, falling back to DNS");
                BTreeSet::new()
            }
        }
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn stats(&self) -> ResolverStats {
        let c = &self.counters;
        ResolverStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            clean: c.clean.load(Ordering::Relaxed),
            flaky: c.flaky.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            truncated: c.truncated.load(Ordering::Relaxed),
            system_lookups: c.system_lookups.load(Ordering::Relaxed),
        }
    }
}
