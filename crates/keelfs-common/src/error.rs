//! Error types for KeelFS
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for KeelFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which configured ceiling a rejected write ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Memory,
    Disk,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// Common error type for KeelFS
#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("not found")]
    NotFound,

    // Lifecycle errors
    #[error("storage engine is closed")]
    StorageClosed,

    // Admission errors
    #[error("{kind} quota exceeded: {used} used + {incoming} incoming > {limit} byte limit")]
    QuotaExceeded {
        kind: QuotaKind,
        used: u64,
        incoming: u64,
        limit: u64,
    },

    // Internal errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("data corruption detected: {0}")]
    Corruption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),
}

impl Error {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid checkpoint error
    pub fn invalid_checkpoint(msg: impl Into<String>) -> Self {
        Self::InvalidCheckpoint(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this is a closed-engine error
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::StorageClosed)
    }

    /// Check if this is a quota rejection
    #[must_use]
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Check if this is an unclassified internal failure
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Backend(_)
                | Self::Corruption(_)
                | Self::Serialization(_)
                | Self::InvalidCheckpoint(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::NotFound.is_internal());

        assert!(Error::StorageClosed.is_closed());
        assert!(!Error::StorageClosed.is_internal());

        let quota = Error::QuotaExceeded {
            kind: QuotaKind::Disk,
            used: 10,
            incoming: 5,
            limit: 12,
        };
        assert!(quota.is_resource_exhausted());
        assert!(!quota.is_not_found());
    }

    #[test]
    fn test_internal_family() {
        let io: Error = std::io::Error::other("boom").into();
        assert!(io.is_internal());
        assert!(Error::backend("engine fault").is_internal());
        assert!(Error::corruption("bad key").is_internal());
        assert!(Error::serialization("truncated").is_internal());
        assert!(Error::invalid_checkpoint("no manifest").is_internal());
    }

    #[test]
    fn test_quota_display() {
        let err = Error::QuotaExceeded {
            kind: QuotaKind::Memory,
            used: 100,
            incoming: 28,
            limit: 120,
        };
        let msg = err.to_string();
        assert!(msg.contains("memory quota exceeded"));
        assert!(msg.contains("120"));
    }
}
