// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

use super::transport::{normalize_name, DnsTransport, TransportAnswer, TransportRecord};
use super::RecordType;
use crate::errors::CoordinationResult;

/// Maximum number of CNAME hops followed from the queried name
pub const MAX_CNAME_NEST_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaseOutcome {
    Complete(BTreeSet<String>),
    /// Some CNAME targets lay beyond the depth bound and were not followed
    TruncatedAtDepth {
        records: BTreeSet<String>,
        depth: usize,
    },
}

impl ChaseOutcome {
    pub fn records(&self) -> &BTreeSet<String> {
        match self {
            ChaseOutcome::Complete(records) => records,
            ChaseOutcome::TruncatedAtDepth { records, .. } => records,
        }
    }

    pub fn into_records(self) -> BTreeSet<String> {
        match self {
            ChaseOutcome::Complete(records) => records,
            ChaseOutcome::TruncatedAtDepth { records, .. } => records,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, ChaseOutcome::TruncatedAtDepth { .. })
    }
}

/// Resolve `domain` to records of `record_type`, following CNAMEs breadth-first.
///
/// Records returned alongside an answer (a recursive resolver usually
/// includes the whole chain) are reused before issuing another query.
/// CNAME queries return the direct targets without chasing.
pub async fn chase_cnames(
    transport: &dyn DnsTransport,
    domain: &str,
    record_type: RecordType,
) -> CoordinationResult<ChaseOutcome> {
    let mut results = BTreeSet::new();
    let mut known: HashMap<String, Vec<TransportRecord>> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut worklist: VecDeque<(String, usize)> = VecDeque::new();
    let mut truncated_at = None;

    worklist.push_back((normalize_name(domain), 0));

    while let Some((name, depth)) = worklist.pop_front() {
        if !visited.insert(name.clone()) {
            continue;
        }

        if !known.contains_key(&name) {
            match transport.query(&name, record_type).await? {
                TransportAnswer::Records(records) => {
                    for record in records {
                        known.entry(record.name.clone()).or_default().push(record);
                    }
                }
                TransportAnswer::NoRecords | TransportAnswer::NxDomain => {}
            }
        }

        let Some(records) = known.get(&name) else {
            continue;
        };

        for record in records {
            if record.record_type == record_type {
                results.insert(record.value.clone());
            } else if record.record_type == RecordType::Cname {
                if depth + 1 > MAX_CNAME_NEST_DEPTH {
                    truncated_at = Some(depth);
                    continue;
                }
                worklist.push_back((record.value.clone(), depth + 1));
            }
        }
    }

    match truncated_at {
        Some(depth) => {
            debug!(
                domain = domain,
                record_type = %record_type,
                depth = depth,
                "CNAME chain truncated"
            );
            Ok(ChaseOutcome::TruncatedAtDepth {
                records: results,
                depth,
            })
        }
        None => Ok(ChaseOutcome::Complete(results)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::transport::StaticTransport;

    fn chain(length: usize) -> StaticTransport {
        let transport = StaticTransport::new();
        for i in 0..length {
            transport.add_record(
                &format!("c{}.example.com", i),
                RecordType::Cname,
                &format!("c{}.example.com.", i + 1),
            );
        }
        transport.add_record(&format!("c{}.example.com", length), RecordType::A, "192.0.2.1");
        transport
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let transport = StaticTransport::new()
            .with_record("example.com", RecordType::A, "192.0.2.1")
            .with_record("example.com", RecordType::A, "192.0.2.2");

        let outcome = chase_cnames(&transport, "example.com", RecordType::A)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ChaseOutcome::Complete(
                ["192.0.2.1", "192.0.2.2"].iter().map(|s| s.to_string()).collect()
            )
        );
    }

    #[tokio::test]
    async fn test_chain_within_bound_resolves() {
        let transport = chain(MAX_CNAME_NEST_DEPTH);

        let outcome = chase_cnames(&transport, "c0.example.com", RecordType::A)
            .await
            .unwrap();

        assert!(!outcome.is_truncated());
        assert!(outcome.records().contains("192.0.2.1"));
    }

    #[tokio::test]
    async fn test_long_chain_truncates_without_error() {
        let transport = chain(10);

        let outcome = chase_cnames(&transport, "c0.example.com", RecordType::A)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ChaseOutcome::TruncatedAtDepth {
                records: BTreeSet::new(),
                depth: MAX_CNAME_NEST_DEPTH,
            }
        );
        // The queried name plus five hops
        assert_eq!(transport.query_count(), MAX_CNAME_NEST_DEPTH as u32 + 1);
    }

    #[tokio::test]
    async fn test_cname_loop_terminates() {
        let transport = StaticTransport::new()
            .with_record("a.example.com", RecordType::Cname, "b.example.com")
            .with_record("b.example.com", RecordType::Cname, "a.example.com");

        let outcome = chase_cnames(&transport, "a.example.com", RecordType::A)
            .await
            .unwrap();

        assert!(outcome.records().is_empty());
    }

    #[tokio::test]
    async fn test_cname_query_is_not_chased() {
        let transport = chain(3);

        let outcome = chase_cnames(&transport, "c0.example.com", RecordType::Cname)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ChaseOutcome::Complete(std::iter::once("c1.example.com".to_string()).collect())
        );
    }

    #[tokio::test]
    async fn test_nxdomain_is_empty() {
        let transport = StaticTransport::new();

        let outcome = chase_cnames(&transport, "nonexistent.invalid", RecordType::A)
            .await
            .unwrap();

        assert_eq!(outcome, ChaseOutcome::Complete(BTreeSet::new()));
    }
}
