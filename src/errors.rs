// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Coordination Error Types
 * Error taxonomy for locking, resolution and deduplication
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use std::time::Duration;
use thiserror::Error;

/// Main coordination error type
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Resource contended past the configured number of tries
    #[error("Failed to acquire lock {resource} after {tries} tries")]
    LockUnavailable {
        resource: String,
        tries: u32,
    },

    /// No addresses could be found for a target
    #[error("Unable to resolve target {host}")]
    UnresolvableTarget {
        host: String,
    },

    /// Transport or protocol failure while resolving (distinct from "domain absent")
    #[error("DNS resolution of {domain} ({record_type}) failed: {reason}")]
    Resolution {
        domain: String,
        record_type: String,
        reason: String,
    },

    /// Shared store unavailable or misbehaving
    #[error("Shared store error: {0}")]
    Store(#[from] StoreError),

    /// Persistent store errors
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a shared key-value store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection to {backend} failed: {reason}")]
    ConnectionFailed {
        backend: &'static str,
        reason: String,
    },

    #[error("Command {command} failed: {reason}")]
    CommandFailed {
        command: &'static str,
        reason: String,
    },

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        command: &'static str,
        reply: String,
    },
}

impl CoordinationError {
    /// Whether the operation may succeed if retried later (rescheduled)
    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinationError::LockUnavailable { .. } => true,
            CoordinationError::UnresolvableTarget { .. } => true,
            CoordinationError::Resolution { .. } => true,
            // Coordination correctness cannot be guaranteed without the substrate
            CoordinationError::Store(_) => false,
            CoordinationError::Database(_) => false,
            CoordinationError::Configuration(_) => false,
            CoordinationError::Serialization(_) => false,
        }
    }

    /// Suggested delay before a rescheduled attempt
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            CoordinationError::LockUnavailable { .. } => Some(Duration::from_secs(5)),
            CoordinationError::UnresolvableTarget { .. } => Some(Duration::from_secs(60)),
            _ => None,
        }
    }

    pub(crate) fn resolution(domain: &str, record_type: impl ToString, reason: impl ToString) -> Self {
        CoordinationError::Resolution {
            domain: domain.to_string(),
            record_type: record_type.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            StoreError::ConnectionFailed {
                backend: "redis",
                reason: err.to_string(),
            }
        } else {
            StoreError::CommandFailed {
                command: "redis",
                reason: err.to_string(),
            }
        }
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StoreError::ConnectionFailed {
            backend: "redis",
            reason: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for CoordinationError {
    fn from(err: redis::RedisError) -> Self {
        CoordinationError::Store(err.into())
    }
}

impl From<deadpool_redis::PoolError> for CoordinationError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CoordinationError::Store(err.into())
    }
}

/// Convert tokio-postgres errors to our error types
impl From<tokio_postgres::Error> for CoordinationError {
    fn from(err: tokio_postgres::Error) -> Self {
        CoordinationError::Database(err.to_string())
    }
}

/// Convert deadpool errors to our error types
impl From<deadpool_postgres::PoolError> for CoordinationError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        CoordinationError::Database(format!("connection pool: {}", err))
    }
}

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reschedulable_errors() {
        let lock = CoordinationError::LockUnavailable {
            resource: "lock-10.0.0.5".to_string(),
            tries: 3,
        };
        assert!(lock.is_retryable());
        assert_eq!(lock.retry_delay(), Some(Duration::from_secs(5)));

        let unresolvable = CoordinationError::UnresolvableTarget {
            host: "nonexistent.example".to_string(),
        };
        assert!(unresolvable.is_retryable());
    }

    #[test]
    fn test_store_errors_are_fatal() {
        let err = CoordinationError::Store(StoreError::ConnectionFailed {
            backend: "redis",
            reason: "connection refused".to_string(),
        });
        assert!(!err.is_retryable());
        assert!(err.retry_delay().is_none());
        assert!(err.to_string().contains("connection refused"));
    }
}
