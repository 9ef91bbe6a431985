//! Contracts for activation processors and the units that run them.

use super::actor::{Message, OpId, Outcome};
use super::types::{JobSubscription, ProcessorId};
use crate::credits::CreditsRequest;
use crate::types::{ConnectionId, JobType, Partition, PartitionId, SubscriberKey};
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::Arc;

/// Per-(partition, job type) unit that owns the active subscriptions and
/// hands out jobs against their credits.
///
/// Calls that take a [`Completion`] may finish on any thread; the manager
/// observes the result on its own actor thread.
pub trait ActivationProcessor: Send + Sync {
    fn add_subscription(&self, subscription: JobSubscription, done: Completion<()>);

    /// Completes with whether other subscriptions remain active.
    fn remove_subscription(&self, subscriber_key: SubscriberKey, done: Completion<bool>);

    /// Apply more credits without blocking.
    ///
    /// Returning false means the processor cannot take the request yet; the
    /// manager parks it and retries later.
    fn increase_subscription_credits(&self, request: CreditsRequest) -> bool;

    /// Drop every subscription owned by `connection`. Completes with whether
    /// other subscriptions remain active.
    fn on_connection_closed(&self, connection: ConnectionId, done: Completion<bool>);
}

/// Builds and tears down the execution units behind activation processors.
pub trait ActivationUnitBuilder: Send + Sync {
    /// Build and start the unit described by `unit`, completing with its
    /// processor.
    fn build(&self, unit: ActivationUnit, done: Completion<Arc<dyn ActivationProcessor>>);

    /// Stop the unit and release its resources.
    fn teardown(
        &self,
        unit: ActivationUnit,
        processor: Arc<dyn ActivationProcessor>,
        done: Completion<()>,
    );
}

/// Describes the execution unit serving one job type on one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationUnit {
    pub partition: Partition,
    /// Service name the partition was registered under.
    pub partition_service: String,
    pub job_type: JobType,
    /// Unit name, `job-activate.<job type>`.
    pub name: String,
}

impl ActivationUnit {
    pub fn new(partition: Partition, partition_service: impl Into<String>, job_type: JobType) -> Self {
        let name = format!("job-activate.{}", job_type);
        Self {
            partition,
            partition_service: partition_service.into(),
            job_type,
            name,
        }
    }
}

/// Handle a collaborator uses to report the outcome of an async call.
///
/// The outcome is delivered to the manager's actor thread. A completion
/// dropped without a result reports a failure, so every call settles once.
pub struct Completion<T> {
    target: Option<CompletionTarget<T>>,
}

struct CompletionTarget<T> {
    op: OpId,
    inbox: Sender<Message>,
    wrap: fn(std::result::Result<T, String>) -> Outcome,
}

impl<T> Completion<T> {
    pub(crate) fn new(
        op: OpId,
        inbox: Sender<Message>,
        wrap: fn(std::result::Result<T, String>) -> Outcome,
    ) -> Self {
        Self {
            target: Some(CompletionTarget { op, inbox, wrap }),
        }
    }

    pub fn complete(mut self, value: T) {
        self.settle(Ok(value));
    }

    pub fn fail(mut self, reason: impl Into<String>) {
        self.settle(Err(reason.into()));
    }

    fn settle(&mut self, result: std::result::Result<T, String>) {
        if let Some(target) = self.target.take() {
            let outcome = (target.wrap)(result);
            // A closed inbox means the manager is gone; nothing waits for this.
            let _ = target.inbox.send(Message::Resume {
                op: target.op,
                outcome,
            });
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        self.settle(Err("completion dropped without a result".into()));
    }
}

/// A processor registered with the manager, together with its unit.
#[derive(Clone)]
pub struct ProcessorHandle {
    id: ProcessorId,
    unit: Arc<ActivationUnit>,
    processor: Arc<dyn ActivationProcessor>,
}

impl ProcessorHandle {
    pub(crate) fn new(
        id: ProcessorId,
        unit: ActivationUnit,
        processor: Arc<dyn ActivationProcessor>,
    ) -> Self {
        Self {
            id,
            unit: Arc::new(unit),
            processor,
        }
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn unit(&self) -> &ActivationUnit {
        &self.unit
    }

    pub fn partition_id(&self) -> PartitionId {
        self.unit.partition.id
    }

    pub fn job_type(&self) -> &JobType {
        &self.unit.job_type
    }

    pub fn processor(&self) -> &Arc<dyn ActivationProcessor> {
        &self.processor
    }
}

impl fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("id", &self.id)
            .field("unit", &self.unit.name)
            .field("partition_id", &self.unit.partition.id)
            .finish()
    }
}
