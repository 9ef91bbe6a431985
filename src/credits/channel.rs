//! Bounded, non-blocking ingestion channel for credit requests.

use super::request::CreditsRequest;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Many-producer, single-consumer credit request channel.
///
/// Capacity is fixed at construction and bounds the number of credit
/// requests in flight. Writers never block: a full channel rejects the
/// write. Only the owning actor thread calls [`drain`](Self::drain).
pub struct CreditRequestChannel {
    sender: Sender<CreditsRequest>,
    receiver: Receiver<CreditsRequest>,
    capacity: usize,
}

impl CreditRequestChannel {
    /// Create a channel holding at most `capacity` requests.
    ///
    /// `capacity` must be non-zero; a zero capacity channel would reject
    /// every write.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Producer handle that can be cloned into other threads.
    pub fn sender(&self) -> CreditSender {
        CreditSender {
            sender: self.sender.clone(),
        }
    }

    /// Try to append a request. Returns false if the channel is full.
    pub fn write(&self, request: CreditsRequest) -> bool {
        try_write(&self.sender, request)
    }

    /// Pop up to `limit` requests in FIFO order, handing each to `handler`.
    ///
    /// A popped request is owned by the handler whatever it returns; a
    /// `false` return stops the drain early. Returns the number of requests
    /// popped.
    pub fn drain<F>(&self, limit: usize, mut handler: F) -> usize
    where
        F: FnMut(CreditsRequest) -> bool,
    {
        let mut drained = 0;
        while drained < limit {
            let Ok(request) = self.receiver.try_recv() else {
                break;
            };
            drained += 1;
            if !handler(request) {
                break;
            }
        }
        drained
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Consumer side, for readiness selection in the actor loop.
    pub(crate) fn receiver(&self) -> &Receiver<CreditsRequest> {
        &self.receiver
    }
}

/// Cloneable producer end of a [`CreditRequestChannel`].
#[derive(Clone)]
pub struct CreditSender {
    sender: Sender<CreditsRequest>,
}

impl CreditSender {
    /// Try to append a request. Returns false if the channel is full or the
    /// consumer is gone.
    pub fn write(&self, request: CreditsRequest) -> bool {
        try_write(&self.sender, request)
    }
}

fn try_write(sender: &Sender<CreditsRequest>, request: CreditsRequest) -> bool {
    match sender.try_send(request) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => false,
        Err(TrySendError::Disconnected(_)) => false,
    }
}
