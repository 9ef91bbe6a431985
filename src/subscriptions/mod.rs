//! Job subscription management for a broker.
//!
//! The [`SubscriptionManager`] keeps, per leader partition, the activation
//! processors serving each job type and routes to them:
//! - New subscriptions, building a processor on first use of a job type
//! - Subscription removals, tearing down processors nobody uses anymore
//! - Credit requests, parking those a processor cannot take yet
//! - Connection closes, sweeping every processor
//!
//! Building and tearing down processors is delegated to an
//! [`ActivationUnitBuilder`].
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::start(ManagerConfig::default(), builder)?;
//! manager.add_partition("partition-1", Partition::new(PartitionId(1), log));
//!
//! let key = manager
//!     .add_subscription(JobSubscription::new(PartitionId(1), "pay", connection))
//!     .wait()?;
//!
//! // From a transport thread
//! manager.increase_subscription_credits_async(CreditsRequest::new(key, 10));
//! ```

mod actor;
mod bucket;
mod future;
mod manager;
mod processor;
mod types;

pub use bucket::PartitionBucket;
pub use future::ActorFuture;
pub use manager::SubscriptionManager;
pub use processor::{
    ActivationProcessor, ActivationUnit, ActivationUnitBuilder, Completion, ProcessorHandle,
};
pub use types::{
    JobSubscription, ManagerConfig, ManagerSnapshot, ProcessorId, ProcessorSummary,
    DEFAULT_CREDITS, DEFAULT_JOB_TIMEOUT, NUM_CONCURRENT_REQUESTS,
};
