//! Client frame encoding tests.

mod common;

use common::RecordingOutput;
use job_subscriptions::transport::protocol::{
    KEY_NULL, MAX_PAYLOAD_LENGTH, POSITION_NULL, SUBSCRIBER_KEY_NULL, TIMESTAMP_NULL,
};
use job_subscriptions::transport::{
    encode, BufferWriter, CommandResponse, CommandResponseWriter, EventType, Intent, MsgPackValue,
    RecordType, SubscribedEvent, SubscribedEventWriter, SubscriptionType, ValueType,
};
use job_subscriptions::{ConnectionId, PartitionId, RequestId, SubscriberKey};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Job {
    job_type: String,
    retries: u32,
    worker: String,
}

fn job() -> Job {
    Job {
        job_type: "pay".to_string(),
        retries: 3,
        worker: "billing".to_string(),
    }
}

fn configure_response(writer: &mut CommandResponseWriter, value: &[u8]) {
    writer
        .record_type(RecordType::Event)
        .partition_id(PartitionId(1))
        .position(120)
        .source_record_position(119)
        .value_type(ValueType::Job)
        .intent(Intent(2))
        .key(4_294_967_300)
        .timestamp(1_700_000_000_000)
        .value(value);
}

fn written_length(writer: &dyn BufferWriter) -> usize {
    let length = writer.length();
    // Trailing sentinel bytes must survive the write.
    let mut buffer = vec![0xAB; length + 4];
    writer.write(&mut buffer, 0);
    assert!(buffer[length..].iter().all(|b| *b == 0xAB));
    length
}

// --- Command Responses ---

#[test]
fn test_command_response_carries_fields() {
    let mut writer = CommandResponseWriter::new();
    configure_response(&mut writer, b"value");

    let decoded = CommandResponse::decode(&encode(&writer)).unwrap();
    assert_eq!(decoded.record_type, RecordType::Event);
    assert_eq!(decoded.partition_id, 1);
    assert_eq!(decoded.position, 120);
    assert_eq!(decoded.source_record_position, 119);
    assert_eq!(decoded.value_type, ValueType::Job);
    assert_eq!(decoded.intent, Intent(2));
    assert_eq!(decoded.key, 4_294_967_300);
    assert_eq!(decoded.timestamp, 1_700_000_000_000);
    assert_eq!(decoded.value, b"value");
}

#[test]
fn test_try_write_response_resets_writer() {
    let output = RecordingOutput::new();
    let mut writer = CommandResponseWriter::new();
    configure_response(&mut writer, b"first");

    assert!(writer.try_write_response(&output, ConnectionId(5), RequestId(9)));

    let frames = output.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].connection, ConnectionId(5));
    assert_eq!(frames[0].request_id, Some(RequestId(9)));

    // Only the value is set again; every other field is back to null.
    writer.value(b"second");
    let decoded = CommandResponse::decode(&encode(&writer)).unwrap();
    assert_eq!(decoded.record_type, RecordType::Null);
    assert_eq!(decoded.position, POSITION_NULL);
    assert_eq!(decoded.key, KEY_NULL);
    assert_eq!(decoded.timestamp, TIMESTAMP_NULL);
    assert_eq!(decoded.intent, Intent::NULL);
}

#[test]
fn test_rejected_response_still_resets() {
    let output = RecordingOutput::rejecting();
    let mut writer = CommandResponseWriter::new();
    configure_response(&mut writer, b"value");

    assert!(!writer.try_write_response(&output, ConnectionId(1), RequestId(1)));
    assert!(output.frames().is_empty());

    let mut fresh = CommandResponseWriter::new();
    fresh.value(b"x");
    writer.value(b"x");
    assert_eq!(encode(&writer), encode(&fresh));
}

#[test]
fn test_empty_and_max_values() {
    let mut writer = CommandResponseWriter::new();
    writer.value(b"");
    assert_eq!(written_length(&writer), 8 + 37 + 2);

    let max = vec![7u8; MAX_PAYLOAD_LENGTH];
    writer.value(&max);
    assert_eq!(written_length(&writer), 8 + 37 + 2 + MAX_PAYLOAD_LENGTH);
    assert_eq!(CommandResponse::decode(&encode(&writer)).unwrap().value, max);
}

#[test]
#[should_panic(expected = "exceeds")]
fn test_oversized_value_panics() {
    let mut writer = CommandResponseWriter::new();
    writer.value(&vec![0u8; MAX_PAYLOAD_LENGTH + 1]);
    writer.length();
}

#[test]
#[should_panic(expected = "without a value writer")]
fn test_try_write_without_value_panics() {
    let output = RecordingOutput::new();
    let mut writer = CommandResponseWriter::new();
    writer.try_write_response(&output, ConnectionId(1), RequestId(1));
}

// --- Subscribed Events ---

#[test]
fn test_job_event_pushed_to_subscriber() {
    let output = RecordingOutput::new();
    let mut writer = SubscribedEventWriter::new();
    writer
        .partition_id(PartitionId(3))
        .position(44)
        .key(12)
        .subscriber_key(SubscriberKey(6))
        .subscription_type(SubscriptionType::JobSubscription)
        .event_type(EventType::JobEvent)
        .event_writer(Box::new(MsgPackValue::encode(&job()).unwrap()));

    assert!(writer.try_write_message(&output, ConnectionId(2)));

    let frames = output.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].request_id, None);

    let decoded = SubscribedEvent::decode(&frames[0].bytes).unwrap();
    assert_eq!(decoded.partition_id, 3);
    assert_eq!(decoded.subscriber_key, 6);
    assert_eq!(decoded.subscription_type, SubscriptionType::JobSubscription);
    assert_eq!(decoded.event_type, EventType::JobEvent);

    let payload: Job = rmp_serde::from_slice(&decoded.event).unwrap();
    assert_eq!(payload, job());
}

#[test]
fn test_event_writer_reset_after_send() {
    let output = RecordingOutput::rejecting();
    let mut writer = SubscribedEventWriter::new();
    writer
        .partition_id(PartitionId(3))
        .subscriber_key(SubscriberKey(6))
        .event(b"payload");

    assert!(!writer.try_write_message(&output, ConnectionId(2)));

    writer.event(b"");
    let decoded = SubscribedEvent::decode(&encode(&writer)).unwrap();
    assert_eq!(decoded.subscriber_key, SUBSCRIBER_KEY_NULL);
    assert_eq!(decoded.subscription_type, SubscriptionType::Null);
}

// --- Properties ---

proptest! {
    #[test]
    fn prop_response_length_matches_bytes_written(value in prop::collection::vec(any::<u8>(), 0..4096)) {
        let mut writer = CommandResponseWriter::new();
        configure_response(&mut writer, &value);

        prop_assert_eq!(written_length(&writer), 8 + 37 + 2 + value.len());
        let decoded = CommandResponse::decode(&encode(&writer)).unwrap();
        prop_assert_eq!(decoded.value, value);
    }

    #[test]
    fn prop_event_length_matches_bytes_written(
        event in prop::collection::vec(any::<u8>(), 0..4096),
        key in any::<u64>(),
        subscriber in any::<u64>(),
    ) {
        let mut writer = SubscribedEventWriter::new();
        writer
            .partition_id(PartitionId(1))
            .key(key)
            .subscriber_key(SubscriberKey(subscriber))
            .event(&event);

        prop_assert_eq!(written_length(&writer), 8 + 28 + 2 + event.len());
        let decoded = SubscribedEvent::decode(&encode(&writer)).unwrap();
        prop_assert_eq!(decoded.key, key);
        prop_assert_eq!(decoded.subscriber_key, subscriber);
        prop_assert_eq!(decoded.event, event);
    }

    #[test]
    fn prop_reused_writer_matches_fresh_writer(
        first in prop::collection::vec(any::<u8>(), 0..256),
        second in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut reused = CommandResponseWriter::new();
        configure_response(&mut reused, &first);
        encode(&reused);
        reused.reset();
        configure_response(&mut reused, &second);

        let mut fresh = CommandResponseWriter::new();
        configure_response(&mut fresh, &second);

        prop_assert_eq!(encode(&reused), encode(&fresh));
    }
}
