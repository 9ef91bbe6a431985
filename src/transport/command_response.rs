//! Execute-command response frames.

use super::buffer::BufferWriter;
use super::output::{ServerOutput, ServerResponse};
use super::protocol::{
    ensure_len, get_i64, get_u16, get_u64, put_i64, put_u16, put_u64, read_var_data, Intent,
    MessageHeader, RecordType, ValueType, EXECUTE_COMMAND_RESPONSE_TEMPLATE_ID, KEY_NULL,
    MAX_PAYLOAD_LENGTH, PARTITION_ID_NULL, POSITION_NULL, TIMESTAMP_NULL, VAR_DATA_HEADER_LENGTH,
};
use crate::error::Result;
use crate::types::{ConnectionId, PartitionId, RequestId};

/// Size of the fixed message block.
///
/// record type (1), partition id (2), position (8), source record position
/// (8), value type (1), intent (1), key (8), timestamp (8).
pub const COMMAND_RESPONSE_BLOCK_LENGTH: usize = 37;

/// Reusable writer for execute-command responses.
///
/// Every field starts at its null sentinel. A value writer must be set
/// before the frame is measured or written; doing either without one is a
/// programming error and panics.
pub struct CommandResponseWriter {
    record_type: RecordType,
    partition_id: u16,
    position: u64,
    source_record_position: u64,
    value_type: ValueType,
    intent: Intent,
    key: u64,
    timestamp: i64,
    value: Option<Box<dyn BufferWriter + Send>>,
}

impl CommandResponseWriter {
    pub fn new() -> Self {
        Self {
            record_type: RecordType::Null,
            partition_id: PARTITION_ID_NULL,
            position: POSITION_NULL,
            source_record_position: POSITION_NULL,
            value_type: ValueType::Null,
            intent: Intent::NULL,
            key: KEY_NULL,
            timestamp: TIMESTAMP_NULL,
            value: None,
        }
    }

    pub fn record_type(&mut self, record_type: RecordType) -> &mut Self {
        self.record_type = record_type;
        self
    }

    pub fn partition_id(&mut self, partition_id: PartitionId) -> &mut Self {
        self.partition_id = partition_id.0;
        self
    }

    pub fn position(&mut self, position: u64) -> &mut Self {
        self.position = position;
        self
    }

    pub fn source_record_position(&mut self, position: u64) -> &mut Self {
        self.source_record_position = position;
        self
    }

    pub fn value_type(&mut self, value_type: ValueType) -> &mut Self {
        self.value_type = value_type;
        self
    }

    pub fn intent(&mut self, intent: Intent) -> &mut Self {
        self.intent = intent;
        self
    }

    pub fn key(&mut self, key: u64) -> &mut Self {
        self.key = key;
        self
    }

    pub fn timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    pub fn value_writer(&mut self, writer: Box<dyn BufferWriter + Send>) -> &mut Self {
        self.value = Some(writer);
        self
    }

    /// Use a copy of `bytes` as the value.
    pub fn value(&mut self, bytes: &[u8]) -> &mut Self {
        self.value_writer(Box::new(bytes.to_vec()))
    }

    /// Hand the frame to the transport as the response to `request_id`.
    ///
    /// The writer is reset afterwards whether or not the send succeeded.
    pub fn try_write_response(
        &mut self,
        output: &dyn ServerOutput,
        connection: ConnectionId,
        request_id: RequestId,
    ) -> bool {
        // Fail before the transport allocates anything.
        self.value_length();

        let sent = output.send_response(ServerResponse {
            connection,
            request_id,
            writer: &*self,
        });
        self.reset();
        sent
    }

    /// Restore every field to its null sentinel and drop the value writer.
    pub fn reset(&mut self) {
        self.record_type = RecordType::Null;
        self.partition_id = PARTITION_ID_NULL;
        self.position = POSITION_NULL;
        self.source_record_position = POSITION_NULL;
        self.value_type = ValueType::Null;
        self.intent = Intent::NULL;
        self.key = KEY_NULL;
        self.timestamp = TIMESTAMP_NULL;
        self.value = None;
    }

    fn value_writer_ref(&self) -> &(dyn BufferWriter + Send) {
        match self.value.as_deref() {
            Some(writer) => writer,
            None => panic!("command response written without a value writer"),
        }
    }

    fn value_length(&self) -> usize {
        let length = self.value_writer_ref().length();
        if length > MAX_PAYLOAD_LENGTH {
            panic!(
                "command response value of {} bytes exceeds the {} byte limit",
                length, MAX_PAYLOAD_LENGTH
            );
        }
        length
    }
}

impl Default for CommandResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferWriter for CommandResponseWriter {
    fn length(&self) -> usize {
        MessageHeader::ENCODED_LENGTH
            + COMMAND_RESPONSE_BLOCK_LENGTH
            + VAR_DATA_HEADER_LENGTH
            + self.value_length()
    }

    fn write(&self, buffer: &mut [u8], offset: usize) {
        let value_length = self.value_length();

        MessageHeader::new(
            COMMAND_RESPONSE_BLOCK_LENGTH,
            EXECUTE_COMMAND_RESPONSE_TEMPLATE_ID,
        )
        .write(buffer, offset);

        let block = offset + MessageHeader::ENCODED_LENGTH;
        buffer[block] = self.record_type.value();
        put_u16(buffer, block + 1, self.partition_id);
        put_u64(buffer, block + 3, self.position);
        put_u64(buffer, block + 11, self.source_record_position);
        buffer[block + 19] = self.value_type.value();
        buffer[block + 20] = self.intent.0;
        put_u64(buffer, block + 21, self.key);
        put_i64(buffer, block + 29, self.timestamp);

        let var_data = block + COMMAND_RESPONSE_BLOCK_LENGTH;
        put_u16(buffer, var_data, value_length as u16);
        self.value_writer_ref()
            .write(buffer, var_data + VAR_DATA_HEADER_LENGTH);
    }
}

/// Decoded execute-command response, as a client reads it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResponse {
    pub record_type: RecordType,
    pub partition_id: u16,
    pub position: u64,
    pub source_record_position: u64,
    pub value_type: ValueType,
    pub intent: Intent,
    pub key: u64,
    pub timestamp: i64,
    pub value: Vec<u8>,
}

impl CommandResponse {
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let header = MessageHeader::decode(
            frame,
            EXECUTE_COMMAND_RESPONSE_TEMPLATE_ID,
            COMMAND_RESPONSE_BLOCK_LENGTH,
        )?;

        let block = MessageHeader::ENCODED_LENGTH;
        let block_length = header.block_length as usize;
        ensure_len(frame, block + block_length, "command response block")?;

        Ok(Self {
            record_type: RecordType::from_value(frame[block]),
            partition_id: get_u16(frame, block + 1),
            position: get_u64(frame, block + 3),
            source_record_position: get_u64(frame, block + 11),
            value_type: ValueType::from_value(frame[block + 19]),
            intent: Intent(frame[block + 20]),
            key: get_u64(frame, block + 21),
            timestamp: get_i64(frame, block + 29),
            value: read_var_data(frame, block + block_length)?,
        })
    }
}
