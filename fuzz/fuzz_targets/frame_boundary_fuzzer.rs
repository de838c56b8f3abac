//! Fuzz target for message framing offsets
//!
//! Recorded offsets come straight from the log reader and cannot be trusted.
//!
//! # Invariants
//!
//! - Computing the framed window never panics or overflows
//! - An accepted window lies inside the buffer and ends where the content ends
//! - A dispatched message with unusable offsets is dropped, never forwarded

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use reprise_core::{
    DispatchOutcome, ENGINE_OWNER_ID, MESSAGE_HEADER_LENGTH, MessageEvent, ReplayConfig,
    ReplayDispatcher,
};
use reprise_harness::{SimTransport, ViolationLog};

#[derive(Debug, Arbitrary)]
struct FrameInput {
    buffer: Vec<u8>,
    initial_offset: usize,
    offset: usize,
    length: usize,
}

fuzz_target!(|input: FrameInput| {
    let event = MessageEvent {
        timestamp: 0,
        owner_id: ENGINE_OWNER_ID,
        connection_id: 1,
        message_type: u64::from(b'D'),
        buffer: Bytes::from(input.buffer),
        initial_offset: input.initial_offset,
        offset: input.offset,
        length: input.length,
    };

    let framed = event.framed_range();
    if let Ok(range) = &framed {
        assert_eq!(range.header_start + MESSAGE_HEADER_LENGTH, event.initial_offset);
        assert_eq!(range.header_start + range.payload_offset, event.offset);
        assert_eq!(range.end(), event.offset + event.length);
        assert!(range.end() <= event.buffer.len());
    }

    let transport = SimTransport::new();
    let violations = ViolationLog::new();
    let mut dispatcher =
        ReplayDispatcher::new(transport.clone(), violations.handler(), ReplayConfig::default());

    let outcome = dispatcher.on_message(&event);
    match framed {
        Ok(range) => {
            assert_eq!(outcome, DispatchOutcome::Forwarded);
            let forwarded = &transport.messages()[0];
            assert_eq!(forwarded.framed_bytes().len(), range.full_length);
            assert_eq!(forwarded.content().len(), event.length);
            assert!(violations.is_empty());
        },
        Err(_) => {
            assert_eq!(outcome, DispatchOutcome::Dropped);
            assert!(transport.messages().is_empty());
            assert_eq!(violations.len(), 1);
        },
    }
});
