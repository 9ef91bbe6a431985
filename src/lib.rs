//! # Job Subscriptions
//!
//! Broker-side job subscription management and the client protocol frames
//! that go with it.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: Client interest in one job type on one partition
//! - **Activation processors**: Per (partition, job type) units handing out jobs
//! - **Credits**: Flow control; a subscriber receives as many jobs as it has credits
//! - **Frames**: Little-endian command responses and subscribed events
//!
//! ## Example
//!
//! ```ignore
//! use job_subscriptions::{JobSubscription, ManagerConfig, SubscriptionManager};
//!
//! let manager = SubscriptionManager::start(ManagerConfig::default(), builder)?;
//! manager.add_partition("partition-1", partition);
//!
//! let key = manager
//!     .add_subscription(JobSubscription::new(PartitionId(1), "pay", connection))
//!     .wait()?;
//! manager.increase_subscription_credits_async(CreditsRequest::new(key, 32));
//! ```

pub mod credits;
pub mod error;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use credits::{CreditRequestChannel, CreditSender, CreditsRequest, OverflowStore};
pub use error::{Result, SubscriptionError};
pub use subscriptions::{
    ActivationProcessor, ActivationUnit, ActivationUnitBuilder, ActorFuture, Completion,
    JobSubscription, ManagerConfig, ManagerSnapshot, PartitionBucket, ProcessorHandle,
    ProcessorId, ProcessorSummary, SubscriptionManager,
};
pub use transport::{
    BufferWriter, CommandResponseWriter, MsgPackValue, ServerOutput, SubscribedEventWriter,
    TransportListener,
};
pub use types::*;
