//! Subscribed event frames pushed to subscribers.

use super::buffer::BufferWriter;
use super::output::{ServerOutput, TransportMessage};
use super::protocol::{
    ensure_len, get_u16, get_u64, put_u16, put_u64, read_var_data, EventType, MessageHeader,
    SubscriptionType, KEY_NULL, MAX_PAYLOAD_LENGTH, PARTITION_ID_NULL, POSITION_NULL,
    SUBSCRIBED_EVENT_TEMPLATE_ID, SUBSCRIBER_KEY_NULL, VAR_DATA_HEADER_LENGTH,
};
use crate::error::Result;
use crate::types::{ConnectionId, PartitionId, SubscriberKey};

/// Size of the fixed message block.
///
/// partition id (2), position (8), key (8), subscriber key (8),
/// subscription type (1), event type (1).
pub const SUBSCRIBED_EVENT_BLOCK_LENGTH: usize = 28;

/// Reusable writer for subscribed events.
///
/// Like [`CommandResponseWriter`](super::CommandResponseWriter), an event
/// writer must be set before the frame is measured or written.
pub struct SubscribedEventWriter {
    partition_id: u16,
    position: u64,
    key: u64,
    subscriber_key: u64,
    subscription_type: SubscriptionType,
    event_type: EventType,
    event: Option<Box<dyn BufferWriter + Send>>,
}

impl SubscribedEventWriter {
    pub fn new() -> Self {
        Self {
            partition_id: PARTITION_ID_NULL,
            position: POSITION_NULL,
            key: KEY_NULL,
            subscriber_key: SUBSCRIBER_KEY_NULL,
            subscription_type: SubscriptionType::Null,
            event_type: EventType::Null,
            event: None,
        }
    }

    pub fn partition_id(&mut self, partition_id: PartitionId) -> &mut Self {
        self.partition_id = partition_id.0;
        self
    }

    pub fn position(&mut self, position: u64) -> &mut Self {
        self.position = position;
        self
    }

    pub fn key(&mut self, key: u64) -> &mut Self {
        self.key = key;
        self
    }

    pub fn subscriber_key(&mut self, subscriber_key: SubscriberKey) -> &mut Self {
        self.subscriber_key = subscriber_key.0;
        self
    }

    pub fn subscription_type(&mut self, subscription_type: SubscriptionType) -> &mut Self {
        self.subscription_type = subscription_type;
        self
    }

    pub fn event_type(&mut self, event_type: EventType) -> &mut Self {
        self.event_type = event_type;
        self
    }

    pub fn event_writer(&mut self, writer: Box<dyn BufferWriter + Send>) -> &mut Self {
        self.event = Some(writer);
        self
    }

    /// Use a copy of `bytes` as the event payload.
    pub fn event(&mut self, bytes: &[u8]) -> &mut Self {
        self.event_writer(Box::new(bytes.to_vec()))
    }

    /// Preset for the message that tells a topic subscriber its
    /// subscription ended. Callers still supply the (usually empty) event.
    pub fn subscription_termination(
        &mut self,
        partition_id: PartitionId,
        subscriber_key: SubscriberKey,
    ) -> &mut Self {
        self.reset();
        self.partition_id(partition_id)
            .event_type(EventType::Null)
            .key(0)
            .position(0)
            .subscriber_key(subscriber_key)
            .subscription_type(SubscriptionType::TopicSubscription)
    }

    /// Push the frame to `connection` without expecting a reply.
    ///
    /// The writer is reset afterwards whether or not the send succeeded.
    pub fn try_write_message(&mut self, output: &dyn ServerOutput, connection: ConnectionId) -> bool {
        // Fail before the transport allocates anything.
        self.event_length();

        let sent = output.send_message(TransportMessage {
            connection,
            writer: &*self,
        });
        self.reset();
        sent
    }

    pub fn reset(&mut self) {
        self.partition_id = PARTITION_ID_NULL;
        self.position = POSITION_NULL;
        self.key = KEY_NULL;
        self.subscriber_key = SUBSCRIBER_KEY_NULL;
        self.subscription_type = SubscriptionType::Null;
        self.event_type = EventType::Null;
        self.event = None;
    }

    fn event_writer_ref(&self) -> &(dyn BufferWriter + Send) {
        match self.event.as_deref() {
            Some(writer) => writer,
            None => panic!("subscribed event written without an event writer"),
        }
    }

    fn event_length(&self) -> usize {
        let length = self.event_writer_ref().length();
        if length > MAX_PAYLOAD_LENGTH {
            panic!(
                "subscribed event of {} bytes exceeds the {} byte limit",
                length, MAX_PAYLOAD_LENGTH
            );
        }
        length
    }
}

impl Default for SubscribedEventWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferWriter for SubscribedEventWriter {
    fn length(&self) -> usize {
        MessageHeader::ENCODED_LENGTH
            + SUBSCRIBED_EVENT_BLOCK_LENGTH
            + VAR_DATA_HEADER_LENGTH
            + self.event_length()
    }

    fn write(&self, buffer: &mut [u8], offset: usize) {
        let event_length = self.event_length();

        MessageHeader::new(SUBSCRIBED_EVENT_BLOCK_LENGTH, SUBSCRIBED_EVENT_TEMPLATE_ID)
            .write(buffer, offset);

        let block = offset + MessageHeader::ENCODED_LENGTH;
        put_u16(buffer, block, self.partition_id);
        put_u64(buffer, block + 2, self.position);
        put_u64(buffer, block + 10, self.key);
        put_u64(buffer, block + 18, self.subscriber_key);
        buffer[block + 26] = self.subscription_type.value();
        buffer[block + 27] = self.event_type.value();

        let var_data = block + SUBSCRIBED_EVENT_BLOCK_LENGTH;
        put_u16(buffer, var_data, event_length as u16);
        self.event_writer_ref()
            .write(buffer, var_data + VAR_DATA_HEADER_LENGTH);
    }
}

/// Decoded subscribed event, as a client reads it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribedEvent {
    pub partition_id: u16,
    pub position: u64,
    pub key: u64,
    pub subscriber_key: u64,
    pub subscription_type: SubscriptionType,
    pub event_type: EventType,
    pub event: Vec<u8>,
}

impl SubscribedEvent {
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let header = MessageHeader::decode(
            frame,
            SUBSCRIBED_EVENT_TEMPLATE_ID,
            SUBSCRIBED_EVENT_BLOCK_LENGTH,
        )?;

        let block = MessageHeader::ENCODED_LENGTH;
        let block_length = header.block_length as usize;
        ensure_len(frame, block + block_length, "subscribed event block")?;

        Ok(Self {
            partition_id: get_u16(frame, block),
            position: get_u64(frame, block + 2),
            key: get_u64(frame, block + 10),
            subscriber_key: get_u64(frame, block + 18),
            subscription_type: SubscriptionType::from_value(frame[block + 26]),
            event_type: EventType::from_value(frame[block + 27]),
            event: read_var_data(frame, block + block_length)?,
        })
    }
}
