//! Downstream transport seam.
//!
//! The dispatcher never performs I/O. It hands framed messages and connect
//! records to a [`ReplayTransport`], which feeds them into session logic in
//! place of a real network. The transport decides when a forwarded message
//! has been fully handled and reports that through the [`CompletionHandle`]
//! it was given when the dispatcher was built.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    event::{ConnectEvent, ConnectionId, FramedRange},
    sequencer::OperationSequencer,
};

/// A framed message forwarded to the transport.
///
/// Only the dispatcher builds these, from offsets already checked against
/// the buffer, so the byte windows are always in bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedMessage {
    connection_id: ConnectionId,
    buffer: Bytes,
    header_start: usize,
    payload_offset: usize,
    length: usize,
    is_resend: bool,
}

impl EnqueuedMessage {
    pub(crate) fn new(
        connection_id: ConnectionId,
        buffer: Bytes,
        range: FramedRange,
        is_resend: bool,
    ) -> Self {
        debug_assert!(range.end() <= buffer.len());
        Self {
            connection_id,
            buffer,
            header_start: range.header_start,
            payload_offset: range.payload_offset,
            length: range.length,
            is_resend,
        }
    }

    /// Connection the message belongs to.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Log buffer holding the message.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Start of the framed message, including its fixed header.
    pub fn header_start(&self) -> usize {
        self.header_start
    }

    /// Start of the decoded content, relative to `header_start`.
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Length of the decoded content.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Whether the message is a resend request.
    pub fn is_resend(&self) -> bool {
        self.is_resend
    }

    /// Bytes from the start of the header through the end of the content.
    ///
    /// Zero-copy: shares the underlying log buffer.
    pub fn framed_bytes(&self) -> Bytes {
        let end = self.header_start + self.payload_offset + self.length;
        self.buffer.slice(self.header_start..end)
    }

    /// Decoded content only.
    pub fn content(&self) -> Bytes {
        let start = self.header_start + self.payload_offset;
        self.buffer.slice(start..start + self.length)
    }
}

/// Handle the transport uses to signal that an accepted message has been
/// fully handled.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    sequencer: Arc<OperationSequencer>,
}

impl CompletionHandle {
    pub(crate) fn new(sequencer: Arc<OperationSequencer>) -> Self {
        Self { sequencer }
    }

    /// Close the outstanding operation.
    ///
    /// Must be called exactly once per accepted [`ReplayTransport::enqueue_message`].
    pub fn complete(&self) {
        self.sequencer.end();
    }

    /// Returns true while an operation is outstanding.
    pub fn is_in_progress(&self) -> bool {
        self.sequencer.is_in_progress()
    }
}

/// Downstream consumer of replayed traffic.
pub trait ReplayTransport {
    /// Forward one framed message.
    ///
    /// Returns `false` if the transport refused it. A refused message is
    /// never completed.
    fn enqueue_message(&mut self, message: EnqueuedMessage) -> bool;

    /// Forward a connection establishment.
    ///
    /// The operation opened for it is closed when the resulting connection
    /// id is taken from the dispatcher, not through the completion handle.
    fn enqueue_connect(&mut self, connect: &ConnectEvent);

    /// Receive the completion handle. Called once, when the dispatcher is
    /// constructed.
    fn register_completion(&mut self, handle: CompletionHandle);
}
