//! Fixed-size credit increase request.

use crate::types::SubscriberKey;
use serde::{Deserialize, Serialize};

/// Asks for `credits` more jobs to be pushed to a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsRequest {
    pub subscriber_key: SubscriberKey,
    pub credits: i32,
}

impl CreditsRequest {
    /// Encoded size: subscriber key (u64) followed by credits (i32).
    pub const LENGTH: usize = 12;

    pub fn new(subscriber_key: SubscriberKey, credits: i32) -> Self {
        Self {
            subscriber_key,
            credits,
        }
    }

    /// Little-endian fixed layout, as carried between broker components.
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut bytes = [0u8; Self::LENGTH];
        bytes[0..8].copy_from_slice(&self.subscriber_key.0.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.credits.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; Self::LENGTH]) -> Self {
        let mut key = [0u8; 8];
        key.copy_from_slice(&bytes[0..8]);
        let mut credits = [0u8; 4];
        credits.copy_from_slice(&bytes[8..12]);

        Self {
            subscriber_key: SubscriberKey(u64::from_le_bytes(key)),
            credits: i32::from_le_bytes(credits),
        }
    }
}
