//! Actor-local store for credit requests that could not be dispatched.

use super::request::CreditsRequest;

/// Ordered list of parked credit requests.
///
/// Not thread-safe; only the owning actor touches it. The actor drains it
/// newest-first, so across subscriptions requests are not kept in order.
#[derive(Debug, Default)]
pub struct OverflowStore {
    requests: Vec<CreditsRequest>,
}

impl OverflowStore {
    /// Create a store pre-sized for `capacity` requests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            requests: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, request: CreditsRequest) {
        self.requests.push(request);
    }

    /// Remove the request at `index`, shifting later requests down.
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove_at(&mut self, index: usize) -> CreditsRequest {
        self.requests.remove(index)
    }

    pub fn element_at(&self, index: usize) -> Option<CreditsRequest> {
        self.requests.get(index).copied()
    }

    pub fn size(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
