//! Client protocol framing.
//!
//! Writers here build the binary frames the broker sends to clients:
//! - Execute-command responses, answering a client request
//! - Subscribed events, pushed to a subscriber without a request
//!
//! Writers are reused across frames. `reset` puts every field back to its
//! null sentinel, and `length` always matches the bytes `write` emits, so
//! transports can allocate the send buffer up front.
//!
//! # Example
//!
//! ```ignore
//! let mut writer = SubscribedEventWriter::new();
//! writer
//!     .partition_id(PartitionId(1))
//!     .position(position)
//!     .key(job_key)
//!     .subscriber_key(subscriber_key)
//!     .subscription_type(SubscriptionType::JobSubscription)
//!     .event_type(EventType::JobEvent)
//!     .event_writer(Box::new(MsgPackValue::encode(&job)?));
//!
//! if !writer.try_write_message(&*output, connection) {
//!     // transport is backpressured; retry later
//! }
//! ```

mod buffer;
mod command_response;
mod output;
pub mod protocol;
mod subscribed_event;

pub use buffer::{encode, BufferWriter, MsgPackValue};
pub use command_response::{CommandResponse, CommandResponseWriter, COMMAND_RESPONSE_BLOCK_LENGTH};
pub use output::{ServerOutput, ServerResponse, TransportListener, TransportMessage};
pub use protocol::{EventType, Intent, MessageHeader, RecordType, SubscriptionType, ValueType};
pub use subscribed_event::{SubscribedEvent, SubscribedEventWriter, SUBSCRIBED_EVENT_BLOCK_LENGTH};
