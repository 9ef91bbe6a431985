//! Transport-facing contracts.

use super::buffer::BufferWriter;
use crate::types::{ConnectionId, RequestId};

/// Response to a client request.
pub struct ServerResponse<'a> {
    pub connection: ConnectionId,
    pub request_id: RequestId,
    pub writer: &'a dyn BufferWriter,
}

/// Fire-and-forget push to a client.
pub struct TransportMessage<'a> {
    pub connection: ConnectionId,
    pub writer: &'a dyn BufferWriter,
}

/// Outgoing side of the server transport.
///
/// Implementations size the send buffer with `writer.length()`, then call
/// `writer.write`. The return value reports whether the frame was accepted
/// for sending, not whether it was delivered.
pub trait ServerOutput: Send + Sync {
    fn send_response(&self, response: ServerResponse<'_>) -> bool;

    fn send_message(&self, message: TransportMessage<'_>) -> bool;
}

/// Connection lifecycle notifications from the server transport.
pub trait TransportListener {
    fn on_connection_established(&self, _connection: ConnectionId) {}

    fn on_connection_closed(&self, connection: ConnectionId);
}
