//! Client protocol constants, enums and the message header.
//!
//! Every frame starts with an 8-byte [`MessageHeader`] followed by a
//! fixed-size message block and a length-prefixed variable payload. All
//! multi-byte integers are little-endian.

use crate::error::{Result, SubscriptionError};

/// Schema identifier of the client protocol.
pub const SCHEMA_ID: u16 = 0;

/// Schema version of the client protocol.
pub const SCHEMA_VERSION: u16 = 1;

/// Template identifier of the execute-command response message.
pub const EXECUTE_COMMAND_RESPONSE_TEMPLATE_ID: u16 = 21;

/// Template identifier of the subscribed event message.
pub const SUBSCRIBED_EVENT_TEMPLATE_ID: u16 = 30;

/// Size of the length prefix in front of a value or event payload.
pub const VAR_DATA_HEADER_LENGTH: usize = 2;

/// Largest payload the 16-bit length prefix can describe.
pub const MAX_PAYLOAD_LENGTH: usize = u16::MAX as usize;

// Null sentinels. Each field type reserves its own "no value" constant so an
// unset field is never confused with a zero.
pub const PARTITION_ID_NULL: u16 = u16::MAX;
pub const POSITION_NULL: u64 = u64::MAX;
pub const KEY_NULL: u64 = u64::MAX;
pub const SUBSCRIBER_KEY_NULL: u64 = u64::MAX;
pub const TIMESTAMP_NULL: i64 = i64::MIN;
pub const ENUM_NULL: u8 = u8::MAX;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value,)+
            Null = ENUM_NULL,
        }

        impl $name {
            pub fn value(self) -> u8 {
                self as u8
            }

            /// Map a wire value back; unknown values decode as `Null`.
            pub fn from_value(value: u8) -> Self {
                match value {
                    $($value => $name::$variant,)+
                    _ => $name::Null,
                }
            }
        }
    };
}

wire_enum! {
    /// Kind of record a command response describes.
    RecordType {
        Event = 0,
        Command = 1,
        CommandRejection = 2,
    }
}

wire_enum! {
    /// Type of the value carried by a command response.
    ValueType {
        Job = 0,
        Raft = 1,
        Subscriber = 2,
        Subscription = 3,
        Deployment = 4,
        WorkflowInstance = 5,
        Incident = 6,
        Workflow = 7,
        Noop = 8,
        Topic = 9,
        Partition = 10,
    }
}

wire_enum! {
    /// Type of event pushed to a subscriber.
    EventType {
        JobEvent = 0,
        RaftEvent = 1,
        SubscriberEvent = 2,
        SubscriptionEvent = 3,
        DeploymentEvent = 4,
        WorkflowInstanceEvent = 5,
        IncidentEvent = 6,
        WorkflowEvent = 7,
        NoopEvent = 8,
        TopicEvent = 9,
        PartitionEvent = 10,
    }
}

wire_enum! {
    /// Which kind of subscription an event is pushed for.
    SubscriptionType {
        TopicSubscription = 0,
        JobSubscription = 1,
    }
}

/// Intent code of a record; meaning depends on the value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Intent(pub u8);

impl Intent {
    pub const NULL: Intent = Intent(ENUM_NULL);
}

/// Fixed header in front of every message block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub block_length: u16,
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
}

impl MessageHeader {
    pub const ENCODED_LENGTH: usize = 8;

    pub fn new(block_length: usize, template_id: u16) -> Self {
        Self {
            block_length: block_length as u16,
            template_id,
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        }
    }

    pub fn write(&self, buffer: &mut [u8], offset: usize) {
        put_u16(buffer, offset, self.block_length);
        put_u16(buffer, offset + 2, self.template_id);
        put_u16(buffer, offset + 4, self.schema_id);
        put_u16(buffer, offset + 6, self.version);
    }

    /// Decode the header and check it belongs to this schema and the
    /// expected template.
    pub fn decode(frame: &[u8], expected_template: u16, min_block_length: usize) -> Result<Self> {
        ensure_len(frame, Self::ENCODED_LENGTH, "message header")?;

        let header = Self {
            block_length: get_u16(frame, 0),
            template_id: get_u16(frame, 2),
            schema_id: get_u16(frame, 4),
            version: get_u16(frame, 6),
        };

        if header.schema_id != SCHEMA_ID {
            return Err(SubscriptionError::MalformedFrame(format!(
                "unexpected schema id {}",
                header.schema_id
            )));
        }
        if header.version != SCHEMA_VERSION {
            return Err(SubscriptionError::MalformedFrame(format!(
                "unsupported schema version {}",
                header.version
            )));
        }
        if header.template_id != expected_template {
            return Err(SubscriptionError::MalformedFrame(format!(
                "expected template {}, got {}",
                expected_template, header.template_id
            )));
        }
        if (header.block_length as usize) < min_block_length {
            return Err(SubscriptionError::MalformedFrame(format!(
                "block length {} shorter than {}",
                header.block_length, min_block_length
            )));
        }

        Ok(header)
    }
}

/// Read the length-prefixed payload starting at `offset`.
pub(crate) fn read_var_data(frame: &[u8], offset: usize) -> Result<Vec<u8>> {
    ensure_len(frame, offset + VAR_DATA_HEADER_LENGTH, "payload length")?;
    let length = get_u16(frame, offset) as usize;
    let start = offset + VAR_DATA_HEADER_LENGTH;
    ensure_len(frame, start + length, "payload")?;
    Ok(frame[start..start + length].to_vec())
}

pub(crate) fn ensure_len(frame: &[u8], needed: usize, what: &str) -> Result<()> {
    if frame.len() < needed {
        return Err(SubscriptionError::MalformedFrame(format!(
            "{} needs {} bytes, frame has {}",
            what,
            needed,
            frame.len()
        )));
    }
    Ok(())
}

pub(crate) fn put_u16(buffer: &mut [u8], offset: usize, value: u16) {
    buffer[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buffer: &mut [u8], offset: usize, value: u64) {
    buffer[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_i64(buffer: &mut [u8], offset: usize, value: i64) {
    buffer[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn get_u16(buffer: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buffer[offset..offset + 2]);
    u16::from_le_bytes(bytes)
}

pub(crate) fn get_u64(buffer: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buffer[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn get_i64(buffer: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buffer[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}
