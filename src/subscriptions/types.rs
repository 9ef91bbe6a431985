//! Subscription data types and manager configuration.

use crate::error::{Result, SubscriptionError};
use crate::types::{ConnectionId, JobType, PartitionId, SubscriberKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upper bound on credit requests in flight towards one manager.
pub const NUM_CONCURRENT_REQUESTS: usize = 1_024;

/// Number of jobs a new subscription may receive before it has to ask for
/// more credits.
pub const DEFAULT_CREDITS: i32 = 32;

/// Default time a worker holds an activated job before it times out.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A client's interest in jobs of one type on one partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubscription {
    pub partition_id: PartitionId,
    pub job_type: JobType,
    /// Connection that owns this subscription.
    pub connection: ConnectionId,
    /// Worker name recorded as the job's lock owner.
    pub worker: String,
    /// How long an activated job stays locked to this worker.
    pub timeout: Duration,
    pub credits: i32,
    /// Assigned by the manager when the subscription is added.
    pub subscriber_key: Option<SubscriberKey>,
}

impl JobSubscription {
    pub fn new(partition_id: PartitionId, job_type: impl Into<JobType>, connection: ConnectionId) -> Self {
        Self {
            partition_id,
            job_type: job_type.into(),
            connection,
            worker: String::new(),
            timeout: DEFAULT_JOB_TIMEOUT,
            credits: DEFAULT_CREDITS,
            subscriber_key: None,
        }
    }

    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = worker.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credits(mut self, credits: i32) -> Self {
        self.credits = credits;
        self
    }
}

/// Identifies one activation processor for the lifetime of a manager.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessorId(pub u64);

impl fmt::Debug for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessorId({})", self.0)
    }
}

/// Subscription manager configuration.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Name of the actor thread.
    /// Default: "jobqueue.subscription.manager"
    pub name: String,

    /// Capacity of the credit request channel.
    /// Default: 1024
    pub credit_capacity: usize,

    /// How long the actor waits for other work before retrying parked
    /// credit requests.
    /// Default: 1ms
    pub backpressure_retry_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "jobqueue.subscription.manager".to_string(),
            credit_capacity: NUM_CONCURRENT_REQUESTS,
            backpressure_retry_interval: Duration::from_millis(1),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.credit_capacity == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "credit_capacity must be greater than zero".into(),
            ));
        }
        if self.backpressure_retry_interval.is_zero() {
            return Err(SubscriptionError::InvalidConfig(
                "backpressure_retry_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// One registered activation processor, as seen in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSummary {
    pub id: ProcessorId,
    pub partition_id: PartitionId,
    pub job_type: JobType,
    pub name: String,
}

/// Point-in-time view of the manager's state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    /// Partitions with a registered bucket, ascending.
    pub partitions: Vec<PartitionId>,
    /// Registered processors, by partition then job type.
    pub processors: Vec<ProcessorSummary>,
    /// Subscriber keys present in the credit routing index, ascending.
    pub subscriptions: Vec<SubscriberKey>,
    /// Credit requests parked in the overflow store.
    pub backpressured_credits: usize,
    /// Collaborator calls still awaiting completion.
    pub pending_operations: usize,
}

impl ManagerSnapshot {
    pub fn processors_for(&self, partition_id: PartitionId, job_type: &JobType) -> usize {
        self.processors
            .iter()
            .filter(|p| p.partition_id == partition_id && &p.job_type == job_type)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ManagerConfig {
            credit_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SubscriptionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_subscription_builder() {
        let subscription = JobSubscription::new(PartitionId(1), "pay", ConnectionId(3))
            .with_worker("billing")
            .with_credits(4);

        assert_eq!(subscription.job_type, JobType::from("pay"));
        assert_eq!(subscription.worker, "billing");
        assert_eq!(subscription.credits, 4);
        assert_eq!(subscription.timeout, DEFAULT_JOB_TIMEOUT);
        assert!(subscription.subscriber_key.is_none());
    }
}
