// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Per-IP Request Limiter
 * Bounds how often cooperating workers hit the same target address
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::CoordinationConfig;
use crate::errors::{CoordinationError, CoordinationResult};
use crate::lock::LockManager;
use crate::resolver::Resolver;

pub const IP_REQUEST_LOCK_KEY_PREFIX: &str = "ip-request-lock-";

/// Allows at most one request per `seconds_per_request` to each target IP,
/// across every worker sharing the lock store.
///
/// This bounds instantaneous load, not long-run throughput.
pub struct TargetRateLimiter {
    locks: LockManager,
    resolver: Arc<Resolver>,
    seconds_per_request: u64,
    system_lookup: bool,
    requests_limited: AtomicU64,
}

impl TargetRateLimiter {
    pub fn new(
        locks: LockManager,
        resolver: Arc<Resolver>,
        seconds_per_request: u64,
        system_lookup: bool,
    ) -> Self {
        if seconds_per_request == 0 {
            info!("Per-IP request limiting disabled");
        } else {
            info!(
                "Per-IP request limiting: one request per {}s",
                seconds_per_request
            );
        }

        Self {
            locks,
            resolver,
            seconds_per_request,
            system_lookup,
            requests_limited: AtomicU64::new(0),
        }
    }

    pub fn from_config(
        locks: LockManager,
        resolver: Arc<Resolver>,
        config: &CoordinationConfig,
    ) -> Self {
        Self::new(
            locks,
            resolver,
            config.rate_limit.seconds_per_request,
            config.resolver.prefer_system_lookup,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.seconds_per_request > 0
    }

    /// Wait until a request to `target` (host, IP or URL) is allowed.
    ///
    /// Returns the IP the slot was taken for, or `None` when limiting is
    /// disabled.
    pub async fn limit_requests_for_target(
        &self,
        target: &str,
    ) -> CoordinationResult<Option<IpAddr>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let host = extract_host(target);
        let ip = self.resolve_target_ip(&host).await?;
        let lease = Duration::from_secs(self.seconds_per_request);

        self.locks
            .acquire_expiring(&format!("{}{}", IP_REQUEST_LOCK_KEY_PREFIX, ip), lease, None)
            .await?;

        self.requests_limited.fetch_add(1, Ordering::Relaxed);
        debug!(target = target, ip = %ip, "Request slot acquired");

        Ok(Some(ip))
    }

    /// OS lookup first so the locked IP matches the one actually dialed
    async fn resolve_target_ip(&self, host: &str) -> CoordinationResult<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        if self.system_lookup {
            if let Ok(addrs) = tokio::net::lookup_host(format!("{}:0", host)).await {
                let ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
                if let Some(ip) = ips.iter().find(|ip| ip.is_ipv4()).or(ips.first()) {
                    return Ok(*ip);
                }
            }
        }

        self.resolver
            .resolve_ips(host)
            .await?
            .iter()
            .find_map(|ip| ip.parse::<IpAddr>().ok())
            .ok_or_else(|| CoordinationError::UnresolvableTarget {
                host: host.to_string(),
            })
    }

    pub fn requests_limited(&self) -> u64 {
        self.requests_limited.load(Ordering::Relaxed)
    }
}

/// Host of a URL, `host:port` or bare host/IP
fn extract_host(target: &str) -> String {
    let target = target.trim();

    if let Some(host) = Url::parse(target)
        .ok()
        .filter(|url| url.has_host())
        .and_then(|url| url.host_str().map(|h| h.to_string()))
    {
        return host.trim_start_matches('[').trim_end_matches(']').to_string();
    }

    if target.parse::<IpAddr>().is_ok() {
        return target.to_string();
    }

    match target.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !host.contains(':') => {
            host.to_string()
        }
        _ => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::lock::LockSettings;
    use crate::resolver::{RecordType, StaticTransport};
    use crate::store::{CoordinationStore, MemoryStore};

    fn limiter(store: &MemoryStore, seconds_per_request: u64) -> TargetRateLimiter {
        let transport = StaticTransport::new()
            .with_record("scan.example.com", RecordType::A, "10.0.0.5")
            .with_record("alias.example.com", RecordType::Cname, "scan.example.com");
        let resolver = Resolver::new(
            Arc::new(transport),
            &ResolverConfig {
                prefer_system_lookup: false,
                ..Default::default()
            },
        );
        let locks = LockManager::new(Arc::new(store.clone()), LockSettings::default());

        TargetRateLimiter::new(locks, Arc::new(resolver), seconds_per_request, false)
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host("https://scan.example.com:8443/path"), "scan.example.com");
        assert_eq!(extract_host("scan.example.com:8080"), "scan.example.com");
        assert_eq!(extract_host("10.0.0.5"), "10.0.0.5");
        assert_eq!(extract_host("2001:db8::1"), "2001:db8::1");
        assert_eq!(extract_host("http://[2001:db8::1]:80/"), "2001:db8::1");
    }

    #[tokio::test]
    async fn test_disabled_limiter_is_noop() {
        let store = MemoryStore::new();
        let limiter = limiter(&store, 0);

        assert_eq!(limiter.limit_requests_for_target("unknown.invalid").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_to_same_ip_are_spaced() {
        let store = MemoryStore::new();
        let limiter = limiter(&store, 3);

        let started = tokio::time::Instant::now();
        let ip = limiter
            .limit_requests_for_target("http://scan.example.com/")
            .await
            .unwrap();
        assert_eq!(ip, Some("10.0.0.5".parse().unwrap()));
        assert!(store.get("ip-request-lock-10.0.0.5").await.unwrap().is_some());

        // A CNAME to the same host shares the slot
        limiter
            .limit_requests_for_target("alias.example.com")
            .await
            .unwrap();

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3));
        assert!(waited < Duration::from_secs(4));
        assert_eq!(limiter.requests_limited(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_ips_do_not_wait() {
        let store = MemoryStore::new();
        let limiter = limiter(&store, 30);

        let started = tokio::time::Instant::now();
        limiter.limit_requests_for_target("10.0.0.1").await.unwrap();
        limiter.limit_requests_for_target("10.0.0.2").await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unresolvable_target() {
        let store = MemoryStore::new();
        let limiter = limiter(&store, 5);

        let err = limiter
            .limit_requests_for_target("nothing.invalid")
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::UnresolvableTarget { .. }));
        assert!(err.is_retryable());
    }
}
