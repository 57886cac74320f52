// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Scheduled Task Deduplication
 * Content-derived task identity so identical work is never scheduled twice
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::errors::CoordinationResult;
use crate::types::Task;

/// Headers that only describe routing, not the work itself
const VOLATILE_HEADERS: &[&str] = &["origin", "receiver"];

/// Payload fields that differ between otherwise identical tasks
const VOLATILE_PAYLOAD: &[&str] = &["last_domain", "created_at"];

/// Row identifying one scheduled task within an analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTaskKey {
    pub analysis_id: String,
    /// SHA-256 hex of `deduplication_data_original`
    pub deduplication_data: String,
    pub deduplication_data_original: String,
    pub task_id: String,
}

impl ScheduledTaskKey {
    pub fn for_task(task: &Task) -> CoordinationResult<Self> {
        let original = canonical_task_key(task)?;
        Ok(Self {
            analysis_id: task.root_uid.clone(),
            deduplication_data: hex::encode(Sha256::digest(original.as_bytes())),
            deduplication_data_original: original,
            task_id: task.uid.clone(),
        })
    }
}

/// Recursively replace every object by its `[key, value]` pairs sorted by key
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Value::Array(
                pairs
                    .into_iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), canonicalize(v)]))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn replace_nul(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains('\0') => Value::String(s.replace('\0', " ")),
        Value::Array(items) => Value::Array(items.into_iter().map(replace_nul).collect()),
        other => other,
    }
}

fn without(map: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    let mut map = map.clone();
    for key in keys {
        map.remove(*key);
    }
    map
}

/// Compact, order-independent representation of what a task asks for
pub fn canonical_task_key(task: &Task) -> CoordinationResult<String> {
    let mut content = Map::new();
    content.insert(
        "headers".to_string(),
        Value::Object(without(&task.headers, VOLATILE_HEADERS)),
    );
    content.insert(
        "payload".to_string(),
        Value::Object(without(&task.payload, VOLATILE_PAYLOAD)),
    );
    content.insert(
        "payload_persistent".to_string(),
        Value::Object(task.payload_persistent.clone()),
    );

    let canonical = replace_nul(canonicalize(&Value::Object(content)));
    Ok(serde_json::to_string(&canonical)?)
}

/// Persistent set of scheduled task keys
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert unless (analysis_id, deduplication_data) exists; true iff inserted
    async fn insert_if_absent(&self, key: &ScheduledTaskKey) -> CoordinationResult<bool>;
}

#[derive(Default, Clone)]
pub struct MemoryTaskStore {
    rows: Arc<Mutex<HashMap<(String, String), ScheduledTaskKey>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert_if_absent(&self, key: &ScheduledTaskKey) -> CoordinationResult<bool> {
        let mut rows = self.rows.lock();
        let id = (key.analysis_id.clone(), key.deduplication_data.clone());
        if rows.contains_key(&id) {
            return Ok(false);
        }
        rows.insert(id, key.clone());
        Ok(true)
    }
}

pub struct TaskDeduplicator {
    store: Arc<dyn TaskStore>,
}

impl TaskDeduplicator {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Record `task` as scheduled; false means an identical task already was.
    ///
    /// Store failures propagate rather than guessing either answer.
    pub async fn save_scheduled_task(&self, task: &Task) -> CoordinationResult<bool> {
        let key = ScheduledTaskKey::for_task(task)?;
        let inserted = self.store.insert_if_absent(&key).await?;

        if !inserted {
            debug!(
                task_id = %task.uid,
                analysis_id = %task.root_uid,
                "Identical task already scheduled"
            );
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn task() -> Task {
        Task::new("analysis-1")
            .with_header("type", "service")
            .with_header("origin", "port_scanner")
            .with_header("receiver", "bruter")
            .with_payload("host", "10.0.0.5")
            .with_payload("port", 22)
            .with_payload("last_domain", "a.example.com")
            .with_payload("created_at", "2026-01-01T00:00:00Z")
    }

    #[test]
    fn test_canonicalize_nested() {
        let value = json!({"b": {"y": 1, "x": [{"k": 2, "j": 3}]}, "a": null});

        assert_eq!(
            canonicalize(&value),
            json!([["a", null], ["b", [["x", [[["j", 3], ["k", 2]]]], ["y", 1]]]])
        );
    }

    #[test]
    fn test_key_ignores_volatile_fields() {
        let first = task();
        let mut second = task()
            .with_header("origin", "subdomain_enum")
            .with_payload("last_domain", "b.example.com")
            .with_payload("created_at", "2026-02-02T00:00:00Z");
        second.headers.remove("receiver");

        assert_ne!(first.uid, second.uid);
        assert_eq!(
            canonical_task_key(&first).unwrap(),
            canonical_task_key(&second).unwrap()
        );
    }

    #[test]
    fn test_key_shape() {
        let task = Task::new("analysis-1")
            .with_header("type", "domain")
            .with_payload("domain", "exa\0mple.com");

        assert_eq!(
            canonical_task_key(&task).unwrap(),
            r#"[["headers",[["type","domain"]]],["payload",[["domain","exa mple.com"]]],["payload_persistent",[]]]"#
        );
    }

    #[test]
    fn test_key_hash_is_sha256_hex() {
        let key = ScheduledTaskKey::for_task(&task()).unwrap();
        assert_eq!(key.deduplication_data.len(), 64);
        assert_eq!(key.analysis_id, "analysis-1");
        assert_eq!(
            key.deduplication_data,
            hex::encode(Sha256::digest(key.deduplication_data_original.as_bytes()))
        );
    }

    #[tokio::test]
    async fn test_save_scheduled_task_is_idempotent() {
        let store = MemoryTaskStore::new();
        let dedup = TaskDeduplicator::new(Arc::new(store.clone()));

        assert!(dedup.save_scheduled_task(&task()).await.unwrap());
        assert!(!dedup.save_scheduled_task(&task()).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_same_task_in_other_analysis_is_new() {
        let dedup = TaskDeduplicator::new(Arc::new(MemoryTaskStore::new()));

        let mut other = task();
        other.root_uid = "analysis-2".to_string();

        assert!(dedup.save_scheduled_task(&task()).await.unwrap());
        assert!(dedup.save_scheduled_task(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_tasks_differing_in_payload_are_both_new() {
        let store = MemoryTaskStore::new();
        let dedup = TaskDeduplicator::new(Arc::new(store.clone()));

        let ssh = task().with_payload("port", 22);
        let http = task().with_payload("port", 80);

        assert!(dedup.save_scheduled_task(&ssh).await.unwrap());
        assert!(dedup.save_scheduled_task(&http).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_canonicalize_ignores_textual_key_order(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let render = |pairs: Vec<(&String, &i64)>| {
                let body: Vec<String> = pairs
                    .into_iter()
                    .map(|(k, v)| format!("\"{}\":{{\"n\":{},\"m\":[{}]}}", k, v, v))
                    .collect();
                format!("{{{}}}", body.join(","))
            };
            let forward: Value = serde_json::from_str(&render(entries.iter().collect())).unwrap();
            let backward: Value = serde_json::from_str(&render(entries.iter().rev().collect())).unwrap();

            let canonical = canonicalize(&forward);
            prop_assert_eq!(&canonical, &canonicalize(&backward));

            let keys: Vec<String> = canonical
                .as_array()
                .unwrap()
                .iter()
                .map(|pair| pair[0].as_str().unwrap().to_string())
                .collect();
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(keys.len(), entries.len());
            for pair in canonical.as_array().unwrap() {
                prop_assert_eq!(pair[1][0][0].as_str(), Some("m"));
                prop_assert_eq!(pair[1][1][0].as_str(), Some("n"));
            }
        }

        #[test]
        fn prop_canonicalize_is_idempotent_on_scalars(n in any::<i64>(), s in ".*") {
            prop_assert_eq!(canonicalize(&json!(n)), json!(n));
            prop_assert_eq!(canonicalize(&json!(s.clone())), json!(s));
        }
    }
}
