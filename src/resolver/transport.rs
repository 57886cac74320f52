// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use async_trait::async_trait;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{RData, RecordType as HickoryRecordType};
use hickory_resolver::TokioResolver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

use super::RecordType;
use crate::errors::{CoordinationError, CoordinationResult};

/// One (owner name, type, value) answer record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRecord {
    pub name: String,
    pub record_type: RecordType,
    pub value: String,
}

impl TransportRecord {
    pub fn new(name: &str, record_type: RecordType, value: &str) -> Self {
        Self {
            name: normalize_name(name),
            record_type,
            value: match record_type {
                RecordType::A | RecordType::Aaaa => value.to_string(),
                RecordType::Ns | RecordType::Cname => normalize_name(value),
            },
        }
    }
}

/// Result of a single protocol-level query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAnswer {
    Records(Vec<TransportRecord>),
    /// The name exists but has no records of the requested type
    NoRecords,
    NxDomain,
}

/// Protocol-level DNS client
#[async_trait]
pub trait DnsTransport: Send + Sync {
    /// Errors are transport/protocol failures only; an absent name is `NxDomain`
    async fn query(&self, name: &str, record_type: RecordType)
        -> CoordinationResult<TransportAnswer>;
}

/// Lowercase and strip the trailing root dot
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Transport backed by the system-configured hickory resolver
pub struct HickoryTransport {
    resolver: TokioResolver,
}

impl HickoryTransport {
    pub fn from_system_conf() -> CoordinationResult<Self> {
        let resolver = TokioResolver::builder(TokioConnectionProvider::default())
            .map_err(|e| {
                CoordinationError::Configuration(format!("Failed to create resolver: {}", e))
            })?
            .build();

        Ok(Self { resolver })
    }

    pub fn new(resolver: TokioResolver) -> Self {
        Self { resolver }
    }
}

fn to_hickory(record_type: RecordType) -> HickoryRecordType {
    match record_type {
        RecordType::A => HickoryRecordType::A,
        RecordType::Aaaa => HickoryRecordType::AAAA,
        RecordType::Ns => HickoryRecordType::NS,
        RecordType::Cname => HickoryRecordType::CNAME,
    }
}

fn from_rdata(data: &RData) -> Option<(RecordType, String)> {
    match data {
        RData::A(a) => Some((RecordType::A, a.0.to_string())),
        RData::AAAA(aaaa) => Some((RecordType::Aaaa, aaaa.0.to_string())),
        RData::NS(ns) => Some((RecordType::Ns, ns.0.to_string())),
        RData::CNAME(cname) => Some((RecordType::Cname, cname.0.to_string())),
        _ => None,
    }
}

#[async_trait]
impl DnsTransport for HickoryTransport {
    async fn query(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> CoordinationResult<TransportAnswer> {
        match self.resolver.lookup(name, to_hickory(record_type)).await {
            Ok(lookup) => {
                let records: Vec<TransportRecord> = lookup
                    .record_iter()
                    .filter_map(|record| {
                        from_rdata(record.data()).map(|(rtype, value)| {
                            TransportRecord::new(&record.name().to_string(), rtype, &value)
                        })
                    })
                    .collect();

                if records.is_empty() {
                    Ok(TransportAnswer::NoRecords)
                } else {
                    Ok(TransportAnswer::Records(records))
                }
            }
            Err(e) if e.is_nx_domain() => {
                debug!(domain = name, "NXDOMAIN");
                Ok(TransportAnswer::NxDomain)
            }
            Err(e) if e.is_no_records_found() => Ok(TransportAnswer::NoRecords),
            Err(e) => Err(CoordinationError::resolution(name, record_type, e)),
        }
    }
}

/// In-memory zone, answering only for names it holds records for.
///
/// Queries for a name return its records of the requested type plus any
/// CNAME records, the way an authoritative server would.
#[derive(Default)]
pub struct StaticTransport {
    zone: Mutex<HashMap<String, Vec<TransportRecord>>>,
    failures_remaining: AtomicU32,
    queries: AtomicU32,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, name: &str, record_type: RecordType, value: &str) -> Self {
        self.add_record(name, record_type, value);
        self
    }

    pub fn add_record(&self, name: &str, record_type: RecordType, value: &str) {
        let record = TransportRecord::new(name, record_type, value);
        self.zone
            .lock()
            .entry(record.name.clone())
            .or_default()
            .push(record);
    }

    /// Make the next `count` queries fail with a transport error
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of queries answered or failed so far
    pub fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsTransport for StaticTransport {
    async fn query(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> CoordinationResult<TransportAnswer> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(CoordinationError::resolution(
                name,
                record_type,
                "simulated transport failure",
            ));
        }

        let zone = self.zone.lock();
        let Some(records) = zone.get(&normalize_name(name)) else {
            return Ok(TransportAnswer::NxDomain);
        };

        let matching: Vec<TransportRecord> = records
            .iter()
            .filter(|r| r.record_type == record_type || r.record_type == RecordType::Cname)
            .cloned()
            .collect();

        if matching.is_empty() {
            Ok(TransportAnswer::NoRecords)
        } else {
            Ok(TransportAnswer::Records(matching))
        }
    }
}
