//! The subscription manager's actor: one thread owning all routing state.
//!
//! Callers talk to the actor through its inbox. Collaborator calls return
//! through [`Completion`]s, which post a `Resume` message carrying the
//! outcome; the matching continuation is kept in a map keyed by operation id
//! until then. Nothing here is shared with other threads except the credit
//! request channel.

use super::bucket::PartitionBucket;
use super::future::CompletableFuture;
use super::processor::{
    ActivationProcessor, ActivationUnit, ActivationUnitBuilder, Completion, ProcessorHandle,
};
use super::types::{JobSubscription, ManagerConfig, ManagerSnapshot, ProcessorId, ProcessorSummary};
use crate::credits::{CreditRequestChannel, CreditsRequest, OverflowStore};
use crate::error::SubscriptionError;
use crate::types::{ConnectionId, JobType, Partition, PartitionId, SubscriberKey};
use crossbeam_channel::{Receiver, Select, Sender, TryRecvError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub(crate) type OpId = u64;

/// Processors are unique per partition and job type.
type UnitKey = (PartitionId, JobType);

/// Outcome of a collaborator call, as delivered by a [`Completion`].
pub(crate) enum Outcome {
    Unit(std::result::Result<(), String>),
    Remaining(std::result::Result<bool, String>),
    Built(std::result::Result<Arc<dyn ActivationProcessor>, String>),
}

pub(crate) enum Message {
    AddSubscription {
        subscription: JobSubscription,
        reply: CompletableFuture<SubscriberKey>,
    },
    RemoveSubscription {
        subscriber_key: SubscriberKey,
        reply: CompletableFuture<()>,
    },
    AddPartition {
        service_name: String,
        partition: Partition,
    },
    RemovePartition {
        partition_id: PartitionId,
    },
    ConnectionClosed {
        connection: ConnectionId,
    },
    Snapshot {
        reply: CompletableFuture<ManagerSnapshot>,
    },
    Resume {
        op: OpId,
        outcome: Outcome,
    },
    Shutdown,
}

/// What to do once a collaborator call settles.
enum Continuation {
    Build {
        unit: ActivationUnit,
    },
    Subscribe {
        subscriber_key: SubscriberKey,
        connection: ConnectionId,
        processor: ProcessorHandle,
        reply: CompletableFuture<SubscriberKey>,
        /// Set when the owning connection closed while the add was in flight.
        connection_closed: bool,
    },
    Unsubscribe {
        processor: ProcessorHandle,
        reply: CompletableFuture<()>,
    },
    Teardown {
        unit_key: UnitKey,
        unit_name: String,
        reply: Option<CompletableFuture<()>>,
    },
    ConnectionSweep {
        processor: ProcessorHandle,
        connection: ConnectionId,
    },
}

/// A subscription waiting to be handed to its processor.
struct PendingAdd {
    subscriber_key: SubscriberKey,
    subscription: JobSubscription,
    reply: CompletableFuture<SubscriberKey>,
}

struct IndexEntry {
    processor: ProcessorHandle,
    connection: ConnectionId,
}

enum Wake {
    Inbox,
    Credits,
    Retry,
}

pub(crate) struct ManagerActor {
    config: ManagerConfig,
    builder: Arc<dyn ActivationUnitBuilder>,
    inbox: Receiver<Message>,
    /// Cloned into every completion handed to a collaborator.
    inbox_sender: Sender<Message>,
    credits: CreditRequestChannel,
    backpressured: OverflowStore,
    buckets: HashMap<PartitionId, PartitionBucket>,
    /// Credit routing index: subscriber key to its processor.
    index: HashMap<SubscriberKey, IndexEntry>,
    /// Subscriptions waiting on a processor that is being built, or that will
    /// be built once the previous unit for the same key has stopped.
    pending_builds: HashMap<UnitKey, Vec<PendingAdd>>,
    /// Index entries plus adds in flight, per processor. Absent means zero.
    references: HashMap<ProcessorId, usize>,
    /// Teardowns not yet settled, per unit key.
    retiring: HashMap<UnitKey, usize>,
    continuations: HashMap<OpId, Continuation>,
    next_subscriber_key: u64,
    next_processor_id: u64,
    next_op: OpId,
}

impl ManagerActor {
    pub(crate) fn new(
        config: ManagerConfig,
        builder: Arc<dyn ActivationUnitBuilder>,
        inbox: Receiver<Message>,
        inbox_sender: Sender<Message>,
        credits: CreditRequestChannel,
    ) -> Self {
        let backpressured = OverflowStore::with_capacity(credits.capacity());
        Self {
            config,
            builder,
            inbox,
            inbox_sender,
            credits,
            backpressured,
            buckets: HashMap::new(),
            index: HashMap::new(),
            pending_builds: HashMap::new(),
            references: HashMap::new(),
            retiring: HashMap::new(),
            continuations: HashMap::new(),
            next_subscriber_key: 0,
            next_processor_id: 0,
            next_op: 0,
        }
    }

    pub(crate) fn run(mut self) {
        let span = tracing::info_span!("subscription_manager", name = %self.config.name);
        let _entered = span.enter();
        debug!("subscription manager started");

        loop {
            let drained = self.dispatch_backpressured_credits();
            match self.next_wake(drained) {
                Wake::Inbox => match self.inbox.try_recv() {
                    Ok(Message::Shutdown) | Err(TryRecvError::Disconnected) => break,
                    Ok(message) => self.handle(message),
                    Err(TryRecvError::Empty) => {}
                },
                Wake::Credits => self.consume_credits_request(),
                Wake::Retry => {}
            }
        }

        debug!(
            backpressured = self.backpressured.size(),
            pending = self.continuations.len(),
            "subscription manager stopped"
        );
    }

    /// Wait for work. Credit requests are only considered once the overflow
    /// store is empty; otherwise wake up after the retry interval.
    fn next_wake(&self, overflow_drained: bool) -> Wake {
        let mut select = Select::new();
        let inbox = select.recv(&self.inbox);

        if overflow_drained {
            select.recv(self.credits.receiver());
            if select.ready() == inbox {
                Wake::Inbox
            } else {
                Wake::Credits
            }
        } else {
            match select.ready_timeout(self.config.backpressure_retry_interval) {
                Ok(_) => Wake::Inbox,
                Err(_) => Wake::Retry,
            }
        }
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::AddSubscription {
                subscription,
                reply,
            } => self.add_subscription(subscription, reply),
            Message::RemoveSubscription {
                subscriber_key,
                reply,
            } => self.remove_subscription(subscriber_key, reply),
            Message::AddPartition {
                service_name,
                partition,
            } => self.add_partition(service_name, partition),
            Message::RemovePartition { partition_id } => self.remove_partition(partition_id),
            Message::ConnectionClosed { connection } => self.on_connection_closed(connection),
            Message::Snapshot { reply } => reply.complete(Ok(self.snapshot())),
            Message::Resume { op, outcome } => self.resume(op, outcome),
            Message::Shutdown => {}
        }
    }

    // --- Credits ---

    /// Retry parked requests newest first. Returns true once the store is
    /// empty, false as soon as one request still cannot be dispatched.
    fn dispatch_backpressured_credits(&mut self) -> bool {
        while let Some(newest) = self.backpressured.size().checked_sub(1) {
            let Some(request) = self.backpressured.element_at(newest) else {
                break;
            };
            if !dispatch_credits(&self.index, request) {
                return false;
            }
            self.backpressured.remove_at(newest);
        }
        true
    }

    fn consume_credits_request(&mut self) {
        let index = &self.index;
        let backpressured = &mut self.backpressured;

        self.credits.drain(1, |request| {
            if !dispatch_credits(index, request) {
                trace!(subscriber_key = %request.subscriber_key, "credits backpressured");
                backpressured.append(request);
            }
            true
        });
    }

    // --- Subscriptions ---

    fn add_subscription(
        &mut self,
        mut subscription: JobSubscription,
        reply: CompletableFuture<SubscriberKey>,
    ) {
        let partition_id = subscription.partition_id;
        let Some(bucket) = self.buckets.get(&partition_id) else {
            reply.complete(Err(SubscriptionError::PartitionNotFound(partition_id)));
            return;
        };

        let subscriber_key = SubscriberKey(self.next_subscriber_key);
        self.next_subscriber_key += 1;
        subscription.subscriber_key = Some(subscriber_key);

        let unit_key = (partition_id, subscription.job_type.clone());
        let pending = PendingAdd {
            subscriber_key,
            subscription,
            reply,
        };

        if let Some(processor) = bucket.by_job_type(&unit_key.1).cloned() {
            self.forward_subscription(processor, pending);
            return;
        }

        if let Some(waiting) = self.pending_builds.get_mut(&unit_key) {
            trace!(job_type = %unit_key.1, "waiting for activation unit under construction");
            waiting.push(pending);
            return;
        }
        self.pending_builds.insert(unit_key.clone(), vec![pending]);

        if self.retiring.contains_key(&unit_key) {
            debug!(job_type = %unit_key.1, "deferring build until the previous activation unit stopped");
            return;
        }
        self.start_build(unit_key);
    }

    fn start_build(&mut self, unit_key: UnitKey) {
        let (partition_id, job_type) = unit_key;
        let Some(bucket) = self.buckets.get(&partition_id) else {
            self.fail_pending(&(partition_id, job_type), |_| {
                SubscriptionError::PartitionNotFound(partition_id)
            });
            return;
        };

        let unit = ActivationUnit::new(bucket.partition().clone(), bucket.service_name(), job_type);
        debug!(unit = %unit.name, partition = %partition_id, "building activation unit");
        let op = self.register(Continuation::Build { unit: unit.clone() });
        self.builder.build(unit, self.completion(op, Outcome::Built));
    }

    /// Fail every subscription waiting on `unit_key`.
    fn fail_pending(&mut self, unit_key: &UnitKey, error: impl Fn(&JobType) -> SubscriptionError) {
        for pending in self.pending_builds.remove(unit_key).unwrap_or_default() {
            pending.reply.complete(Err(error(&unit_key.1)));
        }
    }

    fn forward_subscription(&mut self, processor: ProcessorHandle, pending: PendingAdd) {
        let PendingAdd {
            subscriber_key,
            subscription,
            reply,
        } = pending;

        self.acquire(processor.id());
        let op = self.register(Continuation::Subscribe {
            subscriber_key,
            connection: subscription.connection,
            processor: processor.clone(),
            reply,
            connection_closed: false,
        });
        processor
            .processor()
            .add_subscription(subscription, self.completion(op, Outcome::Unit));
    }

    fn on_processor_built(
        &mut self,
        unit: ActivationUnit,
        result: std::result::Result<Arc<dyn ActivationProcessor>, String>,
    ) {
        let unit_key = (unit.partition.id, unit.job_type.clone());

        let processor = match result {
            Ok(processor) => processor,
            Err(reason) => {
                warn!(unit = %unit.name, %reason, "failed to build activation unit");
                self.fail_pending(&unit_key, |job_type| SubscriptionError::ActivationUnitBuild {
                    job_type: job_type.clone(),
                    reason: reason.clone(),
                });
                return;
            }
        };

        let waiting = self.pending_builds.remove(&unit_key).unwrap_or_default();
        let partition_id = unit_key.0;
        let handle = ProcessorHandle::new(ProcessorId(self.next_processor_id), unit, processor);
        self.next_processor_id += 1;

        if waiting.is_empty() {
            debug!(unit = %handle.unit().name, "no subscriptions left for activation unit");
            self.teardown(handle, None);
            return;
        }

        match self.buckets.get_mut(&partition_id) {
            Some(bucket) => bucket.add_processor(handle.clone()),
            None => {
                debug!(unit = %handle.unit().name, "partition removed while building activation unit");
                for pending in waiting {
                    pending
                        .reply
                        .complete(Err(SubscriptionError::PartitionNotFound(partition_id)));
                }
                self.teardown(handle, None);
                return;
            }
        }
        debug!(unit = %handle.unit().name, processor = ?handle.id(), "activation unit started");

        for pending in waiting {
            self.forward_subscription(handle.clone(), pending);
        }
    }

    fn on_subscription_added(
        &mut self,
        subscriber_key: SubscriberKey,
        connection: ConnectionId,
        processor: ProcessorHandle,
        reply: CompletableFuture<SubscriberKey>,
        connection_closed: bool,
        result: std::result::Result<(), String>,
    ) {
        if let Err(reason) = result {
            self.release(&processor);
            reply.complete(Err(SubscriptionError::DownstreamDispatch(reason)));
            return;
        }

        if connection_closed {
            debug!(%subscriber_key, ?connection, "subscription added after its connection closed");
            reply.complete(Err(SubscriptionError::ConnectionClosed(connection)));
            self.discard_subscription(processor, subscriber_key, connection);
            return;
        }

        let partition_id = processor.partition_id();
        let registered = self
            .buckets
            .get(&partition_id)
            .is_some_and(|bucket| bucket.contains(processor.id()));
        if !registered {
            self.release(&processor);
            reply.complete(Err(SubscriptionError::PartitionNotFound(partition_id)));
            return;
        }

        // The in-flight reference now belongs to the index entry.
        trace!(%subscriber_key, unit = %processor.unit().name, "subscription added");
        self.index.insert(
            subscriber_key,
            IndexEntry {
                processor,
                connection,
            },
        );
        reply.complete(Ok(subscriber_key));
    }

    /// Take back a subscription the processor accepted for a closed
    /// connection, retiring the processor if that leaves it unused.
    fn discard_subscription(
        &mut self,
        processor: ProcessorHandle,
        subscriber_key: SubscriberKey,
        connection: ConnectionId,
    ) {
        // Released without retiring; the sweep retires once the processor is empty.
        self.drop_reference(processor.id());
        let op = self.register(Continuation::ConnectionSweep {
            processor: processor.clone(),
            connection,
        });
        processor
            .processor()
            .remove_subscription(subscriber_key, self.completion(op, Outcome::Remaining));
    }

    fn remove_subscription(&mut self, subscriber_key: SubscriberKey, reply: CompletableFuture<()>) {
        let Some(entry) = self.unindex(&subscriber_key) else {
            reply.complete(Ok(()));
            return;
        };

        let processor = entry.processor;
        let op = self.register(Continuation::Unsubscribe {
            processor: processor.clone(),
            reply,
        });
        processor
            .processor()
            .remove_subscription(subscriber_key, self.completion(op, Outcome::Remaining));
    }

    fn on_subscription_removed(
        &mut self,
        processor: ProcessorHandle,
        reply: CompletableFuture<()>,
        result: std::result::Result<bool, String>,
    ) {
        match result {
            Ok(false) if self.is_unreferenced(&processor) => self.retire(processor, Some(reply)),
            Ok(_) => reply.complete(Ok(())),
            Err(reason) => reply.complete(Err(SubscriptionError::DownstreamDispatch(reason))),
        }
    }

    // --- Processor lifecycle ---

    fn acquire(&mut self, id: ProcessorId) {
        *self.references.entry(id).or_insert(0) += 1;
    }

    fn drop_reference(&mut self, id: ProcessorId) {
        if let Some(count) = self.references.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.references.remove(&id);
            }
        }
    }

    /// Drop one reference and retire the processor if it was the last one.
    fn release(&mut self, processor: &ProcessorHandle) {
        self.drop_reference(processor.id());
        if self.is_unreferenced(processor) {
            self.retire(processor.clone(), None);
        }
    }

    /// Remove an index entry together with the reference it holds.
    fn unindex(&mut self, subscriber_key: &SubscriberKey) -> Option<IndexEntry> {
        let entry = self.index.remove(subscriber_key)?;
        self.drop_reference(entry.processor.id());
        Some(entry)
    }

    /// True when no indexed subscription and no pending add refers to the
    /// processor.
    fn is_unreferenced(&self, processor: &ProcessorHandle) -> bool {
        !self.references.contains_key(&processor.id())
    }

    /// Detach the processor from its bucket and tear its unit down. A
    /// processor that is no longer registered was already retired.
    fn retire(&mut self, processor: ProcessorHandle, reply: Option<CompletableFuture<()>>) {
        let detached = self
            .buckets
            .get_mut(&processor.partition_id())
            .and_then(|bucket| bucket.remove_processor(processor.id()))
            .is_some();

        if detached {
            self.teardown(processor, reply);
        } else if let Some(reply) = reply {
            reply.complete(Ok(()));
        }
    }

    fn teardown(&mut self, processor: ProcessorHandle, reply: Option<CompletableFuture<()>>) {
        debug!(unit = %processor.unit().name, processor = ?processor.id(), "tearing down activation unit");
        let unit_key = (processor.partition_id(), processor.job_type().clone());
        *self.retiring.entry(unit_key.clone()).or_insert(0) += 1;

        let op = self.register(Continuation::Teardown {
            unit_key,
            unit_name: processor.unit().name.clone(),
            reply,
        });
        self.builder.teardown(
            processor.unit().clone(),
            Arc::clone(processor.processor()),
            self.completion(op, Outcome::Unit),
        );
    }

    fn on_torn_down(
        &mut self,
        unit_key: UnitKey,
        unit_name: String,
        reply: Option<CompletableFuture<()>>,
        result: std::result::Result<(), String>,
    ) {
        match (result, reply) {
            (Ok(()), Some(reply)) => reply.complete(Ok(())),
            (Ok(()), None) => trace!(unit = %unit_name, "activation unit torn down"),
            (Err(reason), Some(reply)) => {
                reply.complete(Err(SubscriptionError::ActivationUnitTeardown {
                    unit: unit_name,
                    reason,
                }))
            }
            (Err(reason), None) => {
                warn!(unit = %unit_name, %reason, "failed to tear down activation unit")
            }
        }

        if let Some(count) = self.retiring.get_mut(&unit_key) {
            *count -= 1;
            if *count > 0 {
                return;
            }
            self.retiring.remove(&unit_key);
        }

        // Start the build deferred behind this teardown.
        match self.pending_builds.get(&unit_key) {
            Some(waiting) if waiting.is_empty() => {
                self.pending_builds.remove(&unit_key);
            }
            Some(_) => self.start_build(unit_key),
            None => {}
        }
    }

    // --- Partitions ---

    fn add_partition(&mut self, service_name: String, partition: Partition) {
        let partition_id = partition.id;
        debug!(partition = %partition_id, service = %service_name, "adding partition");

        let bucket = PartitionBucket::new(partition, service_name);
        if let Some(previous) = self.buckets.insert(partition_id, bucket) {
            warn!(partition = %partition_id, "partition registered twice, replacing it");
            self.discard_bucket(partition_id, Some(previous));
        }
    }

    fn remove_partition(&mut self, partition_id: PartitionId) {
        debug!(partition = %partition_id, "removing partition");
        let bucket = self.buckets.remove(&partition_id);
        self.discard_bucket(partition_id, bucket);
    }

    /// Purge every index entry of the partition and tear down the bucket's
    /// units.
    fn discard_bucket(&mut self, partition_id: PartitionId, bucket: Option<PartitionBucket>) {
        let purged: Vec<SubscriberKey> = self
            .index
            .iter()
            .filter(|(_, entry)| entry.processor.partition_id() == partition_id)
            .map(|(key, _)| *key)
            .collect();
        for key in &purged {
            self.unindex(key);
        }
        trace!(partition = %partition_id, purged = purged.len(), "purged subscriptions of partition");

        if let Some(bucket) = bucket {
            for processor in bucket.into_processors() {
                self.teardown(processor, None);
            }
        }
    }

    // --- Connections ---

    fn on_connection_closed(&mut self, connection: ConnectionId) {
        let closed: Vec<SubscriberKey> = self
            .index
            .iter()
            .filter(|(_, entry)| entry.connection == connection)
            .map(|(key, _)| *key)
            .collect();
        for key in &closed {
            self.unindex(key);
        }

        // Adds still waiting for their processor to be built.
        let mut abandoned = 0;
        for waiting in self.pending_builds.values_mut() {
            let (dropped, kept): (Vec<PendingAdd>, Vec<PendingAdd>) = waiting
                .drain(..)
                .partition(|pending| pending.subscription.connection == connection);
            *waiting = kept;
            abandoned += dropped.len();
            for pending in dropped {
                pending
                    .reply
                    .complete(Err(SubscriptionError::ConnectionClosed(connection)));
            }
        }

        // Adds already handed to a processor are taken back once they settle.
        for continuation in self.continuations.values_mut() {
            if let Continuation::Subscribe {
                connection: owner,
                connection_closed,
                ..
            } = continuation
            {
                if *owner == connection {
                    *connection_closed = true;
                }
            }
        }

        let processors: Vec<ProcessorHandle> = self
            .buckets
            .values()
            .flat_map(|bucket| bucket.processors().cloned())
            .collect();
        debug!(
            ?connection,
            subscriptions = closed.len(),
            abandoned,
            processors = processors.len(),
            "connection closed"
        );

        for processor in processors {
            let op = self.register(Continuation::ConnectionSweep {
                processor: processor.clone(),
                connection,
            });
            processor
                .processor()
                .on_connection_closed(connection, self.completion(op, Outcome::Remaining));
        }
    }

    fn on_connection_swept(
        &mut self,
        processor: ProcessorHandle,
        connection: ConnectionId,
        result: std::result::Result<bool, String>,
    ) {
        match result {
            Ok(false) if self.is_unreferenced(&processor) => self.retire(processor, None),
            Ok(_) => {}
            Err(reason) => debug!(
                ?connection,
                unit = %processor.unit().name,
                %reason,
                "problem on closing job activation processor"
            ),
        }
    }

    // --- Continuations ---

    fn register(&mut self, continuation: Continuation) -> OpId {
        let op = self.next_op;
        self.next_op += 1;
        self.continuations.insert(op, continuation);
        op
    }

    fn completion<T>(
        &self,
        op: OpId,
        wrap: fn(std::result::Result<T, String>) -> Outcome,
    ) -> Completion<T> {
        Completion::new(op, self.inbox_sender.clone(), wrap)
    }

    fn resume(&mut self, op: OpId, outcome: Outcome) {
        let Some(continuation) = self.continuations.remove(&op) else {
            warn!(op, "completion for unknown operation");
            return;
        };

        match (continuation, outcome) {
            (Continuation::Build { unit }, Outcome::Built(result)) => {
                self.on_processor_built(unit, result)
            }
            (
                Continuation::Subscribe {
                    subscriber_key,
                    connection,
                    processor,
                    reply,
                    connection_closed,
                },
                Outcome::Unit(result),
            ) => self.on_subscription_added(
                subscriber_key,
                connection,
                processor,
                reply,
                connection_closed,
                result,
            ),
            (Continuation::Unsubscribe { processor, reply }, Outcome::Remaining(result)) => {
                self.on_subscription_removed(processor, reply, result)
            }
            (
                Continuation::Teardown {
                    unit_key,
                    unit_name,
                    reply,
                },
                Outcome::Unit(result),
            ) => self.on_torn_down(unit_key, unit_name, reply, result),
            (Continuation::ConnectionSweep { processor, connection }, Outcome::Remaining(result)) => {
                self.on_connection_swept(processor, connection, result)
            }
            _ => warn!(op, "completion outcome does not match pending operation"),
        }
    }

    fn snapshot(&self) -> ManagerSnapshot {
        let mut partitions: Vec<PartitionId> = self.buckets.keys().copied().collect();
        partitions.sort();

        let mut processors: Vec<ProcessorSummary> = self
            .buckets
            .values()
            .flat_map(|bucket| bucket.processors())
            .map(|processor| ProcessorSummary {
                id: processor.id(),
                partition_id: processor.partition_id(),
                job_type: processor.job_type().clone(),
                name: processor.unit().name.clone(),
            })
            .collect();
        processors.sort_by(|a, b| {
            (a.partition_id, a.job_type.as_bytes()).cmp(&(b.partition_id, b.job_type.as_bytes()))
        });

        let mut subscriptions: Vec<SubscriberKey> = self.index.keys().copied().collect();
        subscriptions.sort();

        ManagerSnapshot {
            partitions,
            processors,
            subscriptions,
            backpressured_credits: self.backpressured.size(),
            pending_operations: self.continuations.len(),
        }
    }
}

/// Forward credits to the subscription's processor. Credits for a
/// subscription that is gone count as handled.
fn dispatch_credits(index: &HashMap<SubscriberKey, IndexEntry>, request: CreditsRequest) -> bool {
    match index.get(&request.subscriber_key) {
        Some(entry) => entry.processor.processor().increase_subscription_credits(request),
        None => {
            trace!(subscriber_key = %request.subscriber_key, "ignoring credits for unknown subscription");
            true
        }
    }
}
