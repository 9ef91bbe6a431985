//! Credit replenishment pipeline.
//!
//! Producers on any thread write fixed-size [`CreditsRequest`]s into a
//! bounded [`CreditRequestChannel`]. The owning actor drains it one request
//! per cycle. Requests its activation processor cannot accept yet are parked
//! in the [`OverflowStore`] and retried before the channel is read again.

mod channel;
mod overflow;
mod request;

pub use channel::{CreditRequestChannel, CreditSender};
pub use overflow::OverflowStore;
pub use request::CreditsRequest;
