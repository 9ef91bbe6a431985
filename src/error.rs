//! Error types for subscription management and frame decoding.

use crate::types::{ConnectionId, JobType, PartitionId};
use thiserror::Error;

/// Main error type for subscription manager operations.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Partition with id '{0}' not found")]
    PartitionNotFound(PartitionId),

    #[error("Failed to build activation unit for job type '{job_type}': {reason}")]
    ActivationUnitBuild { job_type: JobType, reason: String },

    #[error("Failed to tear down activation unit '{unit}': {reason}")]
    ActivationUnitTeardown { unit: String, reason: String },

    #[error("Activation processor rejected request: {0}")]
    DownstreamDispatch(String),

    #[error("Connection {0:?} closed before the subscription was added")]
    ConnectionClosed(ConnectionId),

    #[error("Subscription manager is closed")]
    ManagerClosed,

    #[error("Timed out waiting for subscription manager")]
    Timeout,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

impl From<rmp_serde::encode::Error> for SubscriptionError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SubscriptionError::Serialization(e.to_string())
    }
}

/// Result type for subscription manager operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
