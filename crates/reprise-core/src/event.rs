//! Decoded replay events.
//!
//! The upstream log decoder turns archived fragments into these values. The
//! set of kinds is closed: the protocol being replayed only records message,
//! connect and heartbeat events that matter for re-driving a session.

use bytes::Bytes;

use crate::{clock::LogicalTime, error::ReplayError};

/// Identifier of a recorded connection.
pub type ConnectionId = u64;

/// Identifier of a logical owner (library) of connections and messages.
pub type OwnerId = u32;

/// Owner id reserved for the engine itself. Always valid.
pub const ENGINE_OWNER_ID: OwnerId = 0;

/// Length of the fixed message header preceding every recorded message body:
/// block length, template id, schema id and version, two bytes each.
pub const MESSAGE_HEADER_LENGTH: usize = 8;

/// Packed message type of a session-level resend request (`35=2`).
pub const RESEND_REQUEST_MESSAGE_TYPE: u64 = b'2' as u64;

/// Kind of a [`ReplayEvent`], for logging and accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Application or session message
    Message,
    /// Connection establishment
    Connect,
    /// Owner liveness signal
    Heartbeat,
}

/// A recorded inbound or outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Recorded timestamp (nanoseconds)
    pub timestamp: LogicalTime,
    /// Owner the message was attributed to
    pub owner_id: OwnerId,
    /// Connection the message travelled on
    pub connection_id: ConnectionId,
    /// Packed message type
    pub message_type: u64,
    /// Log buffer holding the framed message
    pub buffer: Bytes,
    /// Offset of the message body, just after its fixed header
    pub initial_offset: usize,
    /// Offset of the decoded content
    pub offset: usize,
    /// Length of the decoded content
    pub length: usize,
}

/// Byte window covering a framed message in its log buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramedRange {
    /// Start of the framed message, including its fixed header
    pub header_start: usize,
    /// Start of the decoded content, relative to `header_start`
    pub payload_offset: usize,
    /// Length of the decoded content
    pub length: usize,
    /// Bytes from `header_start` through the end of the decoded content
    pub full_length: usize,
}

impl FramedRange {
    /// Absolute end of the window (exclusive).
    pub fn end(&self) -> usize {
        self.header_start + self.full_length
    }
}

impl MessageEvent {
    /// Returns true if this message is a resend request.
    pub fn is_resend_request(&self) -> bool {
        self.message_type == RESEND_REQUEST_MESSAGE_TYPE
    }

    /// Compute the window from the start of the message header through the
    /// end of the decoded content.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::MalformedFrame`] if the recorded offsets leave
    /// no room for the header, place the content before the header, or run
    /// past the end of the buffer.
    pub fn framed_range(&self) -> Result<FramedRange, ReplayError> {
        let malformed = |reason: String| ReplayError::MalformedFrame {
            connection_id: self.connection_id,
            reason,
        };

        let header_start =
            self.initial_offset.checked_sub(MESSAGE_HEADER_LENGTH).ok_or_else(|| {
                malformed(format!(
                    "initial offset {} leaves no room for a {MESSAGE_HEADER_LENGTH} byte header",
                    self.initial_offset
                ))
            })?;

        let payload_offset = self.offset.checked_sub(header_start).ok_or_else(|| {
            malformed(format!(
                "content offset {} precedes header start {header_start}",
                self.offset
            ))
        })?;

        let end = self
            .offset
            .checked_add(self.length)
            .filter(|end| *end <= self.buffer.len())
            .ok_or_else(|| {
                malformed(format!(
                    "content {}+{} overruns buffer of {} bytes",
                    self.offset,
                    self.length,
                    self.buffer.len()
                ))
            })?;

        Ok(FramedRange {
            header_start,
            payload_offset,
            length: self.length,
            full_length: end - header_start,
        })
    }
}

/// A recorded connection establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectEvent {
    /// Recorded timestamp (nanoseconds)
    pub timestamp: LogicalTime,
    /// Owner that held the connection when it was established
    pub owner_id: OwnerId,
    /// Connection id assigned at capture time
    pub connection_id: ConnectionId,
    /// Remote address as recorded
    pub address: String,
    /// Encoded connect record, forwarded unchanged
    pub payload: Bytes,
}

/// A recorded owner liveness signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatEvent {
    /// Timestamp cached by the owner at send time (nanoseconds)
    pub timestamp: LogicalTime,
    /// Owner that sent the heartbeat
    pub owner_id: OwnerId,
}

/// A decoded event from the recorded stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEvent {
    /// Application or session message
    Message(MessageEvent),
    /// Connection establishment
    Connect(ConnectEvent),
    /// Owner liveness signal
    Heartbeat(HeartbeatEvent),
}

impl ReplayEvent {
    /// Recorded timestamp.
    pub fn timestamp(&self) -> LogicalTime {
        match self {
            Self::Message(m) => m.timestamp,
            Self::Connect(c) => c.timestamp,
            Self::Heartbeat(h) => h.timestamp,
        }
    }

    /// Owner the event is attributed to.
    pub fn owner_id(&self) -> OwnerId {
        match self {
            Self::Message(m) => m.owner_id,
            Self::Connect(c) => c.owner_id,
            Self::Heartbeat(h) => h.owner_id,
        }
    }

    /// Kind of event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Connect(_) => EventKind::Connect,
            Self::Heartbeat(_) => EventKind::Heartbeat,
        }
    }

    /// Returns true if dispatching this event opens an operation.
    pub fn opens_operation(&self) -> bool {
        !matches!(self, Self::Heartbeat(_))
    }
}

impl From<MessageEvent> for ReplayEvent {
    fn from(event: MessageEvent) -> Self {
        Self::Message(event)
    }
}

impl From<ConnectEvent> for ReplayEvent {
    fn from(event: ConnectEvent) -> Self {
        Self::Connect(event)
    }
}

impl From<HeartbeatEvent> for ReplayEvent {
    fn from(event: HeartbeatEvent) -> Self {
        Self::Heartbeat(event)
    }
}
