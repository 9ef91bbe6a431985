//! One-shot futures resolved by the manager's actor thread.

use crate::error::{Result, SubscriptionError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Result of an operation the actor will finish later.
///
/// Settles exactly once. If the actor stops before settling it, the future
/// resolves to [`SubscriptionError::ManagerClosed`].
pub struct ActorFuture<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> ActorFuture<T> {
    /// Block until the operation settles.
    pub fn wait(self) -> Result<T> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(SubscriptionError::ManagerClosed),
        }
    }

    /// Block for at most `timeout`. A timed-out future can be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SubscriptionError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SubscriptionError::ManagerClosed),
        }
    }

    /// Take the result if the operation has settled.
    pub fn try_take(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SubscriptionError::ManagerClosed)),
        }
    }
}

/// Completing side of an [`ActorFuture`], held by the actor.
pub(crate) struct CompletableFuture<T> {
    sender: Sender<Result<T>>,
}

impl<T> CompletableFuture<T> {
    pub(crate) fn complete(self, result: Result<T>) {
        // The caller may have dropped its future; nobody is left to tell.
        let _ = self.sender.try_send(result);
    }
}

pub(crate) fn pair<T>() -> (CompletableFuture<T>, ActorFuture<T>) {
    let (sender, receiver) = bounded(1);
    (CompletableFuture { sender }, ActorFuture { receiver })
}
