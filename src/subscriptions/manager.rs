//! Public handle to the subscription manager actor.

use crate::credits::{CreditRequestChannel, CreditSender, CreditsRequest};
use crate::error::{Result, SubscriptionError};
use crate::transport::TransportListener;
use crate::types::{ConnectionId, Partition, PartitionId, SubscriberKey};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use super::actor::{ManagerActor, Message};
use super::future::{pair, ActorFuture};
use super::processor::ActivationUnitBuilder;
use super::types::{JobSubscription, ManagerConfig, ManagerSnapshot};

/// Routes job subscriptions and credit requests to activation processors.
///
/// All routing state lives on a dedicated actor thread. Methods here only
/// post messages to it and never block on collaborators, so they are safe to
/// call from transport threads. Operations that produce a result return an
/// [`ActorFuture`].
pub struct SubscriptionManager {
    name: String,
    inbox: Sender<Message>,
    credits: CreditSender,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionManager {
    /// Start the manager's actor thread.
    pub fn start(config: ManagerConfig, builder: Arc<dyn ActivationUnitBuilder>) -> Result<Self> {
        config.validate()?;

        let (inbox_sender, inbox) = unbounded();
        let channel = CreditRequestChannel::new(config.credit_capacity);
        let credits = channel.sender();
        let name = config.name.clone();

        let actor = ManagerActor::new(config, builder, inbox, inbox_sender.clone(), channel);
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || actor.run())?;

        debug!(name = %name, "subscription manager spawned");
        Ok(Self {
            name,
            inbox: inbox_sender,
            credits,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a subscription, building the activation unit for its
    /// partition and job type on first use.
    ///
    /// Resolves to the subscriber key once the subscription is routable.
    /// Fails with [`SubscriptionError::PartitionNotFound`] if this broker
    /// does not lead the partition.
    pub fn add_subscription(&self, subscription: JobSubscription) -> ActorFuture<SubscriberKey> {
        let (reply, future) = pair();
        self.post(Message::AddSubscription {
            subscription,
            reply,
        });
        future
    }

    /// Remove a subscription. Unknown keys resolve successfully.
    pub fn remove_subscription(&self, subscriber_key: SubscriberKey) -> ActorFuture<()> {
        let (reply, future) = pair();
        self.post(Message::RemoveSubscription {
            subscriber_key,
            reply,
        });
        future
    }

    /// Queue a credit request for the subscription's processor.
    ///
    /// Never blocks. Returns false when the credit channel is full and the
    /// request was not accepted.
    pub fn increase_subscription_credits_async(&self, request: CreditsRequest) -> bool {
        self.credits.write(request)
    }

    /// Producer handle for the credit channel, for transport threads.
    pub fn credit_sender(&self) -> CreditSender {
        self.credits.clone()
    }

    /// Track a partition this broker became leader for.
    pub fn add_partition(&self, service_name: impl Into<String>, partition: Partition) {
        self.post(Message::AddPartition {
            service_name: service_name.into(),
            partition,
        });
    }

    /// Forget a partition, dropping its subscriptions and tearing down its
    /// activation units.
    pub fn remove_partition(&self, partition_id: PartitionId) {
        self.post(Message::RemovePartition { partition_id });
    }

    /// Drop every subscription owned by `connection`.
    pub fn on_client_channel_close_async(&self, connection: ConnectionId) {
        self.post(Message::ConnectionClosed { connection });
    }

    pub fn snapshot(&self) -> ActorFuture<ManagerSnapshot> {
        let (reply, future) = pair();
        self.post(Message::Snapshot { reply });
        future
    }

    /// Stop the actor thread. Pending futures resolve to
    /// [`SubscriptionError::ManagerClosed`]. Idempotent.
    pub fn close(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = self.inbox.send(Message::Shutdown);

        if worker.thread().id() == thread::current().id() {
            // Closed from a collaborator running on the actor itself.
            return;
        }
        if worker.join().is_err() {
            warn!(name = %self.name, "subscription manager thread panicked");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.worker.lock().is_none()
    }

    fn post(&self, message: Message) {
        // A send only fails after the actor exited; the message's reply is
        // dropped with it, which resolves the caller's future as closed.
        if self.inbox.send(message).is_err() {
            debug!(name = %self.name, error = %SubscriptionError::ManagerClosed, "message dropped");
        }
    }
}

impl TransportListener for SubscriptionManager {
    fn on_connection_closed(&self, connection: ConnectionId) {
        self.on_client_channel_close_async(connection);
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close();
    }
}
