//! Builders for recorded event scripts.
//!
//! [`ScriptBuilder`] lays messages out the way the log reader sees them: a
//! run of earlier fragments, the 8-byte message header, a fixed block, then
//! the FIX content. [`ScriptOp`] is the fuzzer's view of the same script.

use arbitrary::Arbitrary;
use bytes::{BufMut, Bytes, BytesMut};
use reprise_core::{
    ConnectEvent, ConnectionId, ENGINE_OWNER_ID, HeartbeatEvent, LogicalTime,
    MESSAGE_HEADER_LENGTH, MessageEvent, OwnerId, RESEND_REQUEST_MESSAGE_TYPE, ReplayEvent,
};

/// Fixed block between the message header and its content.
///
/// Holds the connection id and the capture timestamp.
pub const FIXED_BLOCK_LENGTH: usize = 16;

const TEMPLATE_ID: u16 = 1;
const SCHEMA_ID: u16 = 666;
const SCHEMA_VERSION: u16 = 1;

/// Builds a script of recorded events with ascending timestamps.
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    events: Vec<ReplayEvent>,
    time: LogicalTime,
    next_connection_id: ConnectionId,
    padding: usize,
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScriptBuilder {
    /// Start a script at `start` nanoseconds.
    pub fn new(start: LogicalTime) -> Self {
        Self { events: Vec::new(), time: start, next_connection_id: 1, padding: 0 }
    }

    /// Bytes of earlier log fragments placed before each message.
    #[must_use]
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Move the capture time forward.
    pub fn advance(&mut self, nanos: LogicalTime) -> &mut Self {
        self.time = self.time.saturating_add(nanos);
        self
    }

    /// Current capture time.
    pub fn time(&self) -> LogicalTime {
        self.time
    }

    /// Record an inbound connection. Returns the id it was given.
    pub fn connect(&mut self, owner_id: OwnerId) -> ConnectionId {
        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;

        self.events.push(
            ConnectEvent {
                timestamp: self.time,
                owner_id,
                connection_id,
                address: format!("10.0.0.{}:9880", connection_id % 250 + 1),
                payload: Bytes::from(format!("connect-{connection_id}")),
            }
            .into(),
        );
        connection_id
    }

    /// Record a FIX message of type `message_type`.
    pub fn message(
        &mut self,
        owner_id: OwnerId,
        connection_id: ConnectionId,
        message_type: u8,
        fields: &str,
    ) -> &mut Self {
        let content = fix_content(message_type, fields);
        let event = self.framed(owner_id, connection_id, message_type, &content);
        self.events.push(event.into());
        self
    }

    /// Record a resend request.
    pub fn resend_request(
        &mut self,
        owner_id: OwnerId,
        connection_id: ConnectionId,
        begin: u64,
        end: u64,
    ) -> &mut Self {
        let message_type = RESEND_REQUEST_MESSAGE_TYPE as u8;
        let fields = format!("7={begin}\x0116={end}\x01");
        self.message(owner_id, connection_id, message_type, &fields)
    }

    /// Record a message whose offsets leave no room for its header.
    pub fn malformed_message(
        &mut self,
        owner_id: OwnerId,
        connection_id: ConnectionId,
    ) -> &mut Self {
        let content = fix_content(b'0', "");
        self.events.push(
            MessageEvent {
                timestamp: self.time,
                owner_id,
                connection_id,
                message_type: u64::from(b'0'),
                initial_offset: MESSAGE_HEADER_LENGTH / 2,
                offset: 0,
                length: content.len(),
                buffer: Bytes::from(content),
            }
            .into(),
        );
        self
    }

    /// Record a heartbeat stamped `stale_by` nanoseconds before the current
    /// capture time.
    pub fn heartbeat(&mut self, owner_id: OwnerId, stale_by: LogicalTime) -> &mut Self {
        self.events.push(
            HeartbeatEvent { timestamp: self.time.saturating_sub(stale_by), owner_id }.into(),
        );
        self
    }

    /// Apply a fuzzer-generated op.
    pub fn apply(&mut self, op: &ScriptOp) -> &mut Self {
        match *op {
            ScriptOp::Connect => {
                self.connect(ENGINE_OWNER_ID);
            },
            ScriptOp::Message { owner, connection, resend, fields } => {
                let connection_id = ConnectionId::from(connection);
                let owner_id = OwnerId::from(owner);
                if resend {
                    self.resend_request(owner_id, connection_id, 1, u64::from(fields));
                } else {
                    self.message(owner_id, connection_id, b'D', &"58=x\x01".repeat(fields.into()));
                }
            },
            ScriptOp::Malformed { connection } => {
                self.malformed_message(ENGINE_OWNER_ID, ConnectionId::from(connection));
            },
            ScriptOp::Heartbeat { owner, stale_by } => {
                self.heartbeat(OwnerId::from(owner), LogicalTime::from(stale_by));
            },
            ScriptOp::Advance { nanos } => {
                self.advance(LogicalTime::from(nanos));
            },
        }
        self
    }

    /// Take the events recorded so far, keeping capture time and
    /// connection numbering.
    pub fn drain(&mut self) -> Vec<ReplayEvent> {
        std::mem::take(&mut self.events)
    }

    /// Finish the script.
    pub fn build(self) -> Vec<ReplayEvent> {
        self.events
    }

    fn framed(
        &self,
        owner_id: OwnerId,
        connection_id: ConnectionId,
        message_type: u8,
        content: &[u8],
    ) -> MessageEvent {
        let capacity = self.padding + MESSAGE_HEADER_LENGTH + FIXED_BLOCK_LENGTH + content.len();
        let mut buffer = BytesMut::with_capacity(capacity);

        buffer.put_bytes(0, self.padding);
        buffer.put_u16_le(FIXED_BLOCK_LENGTH as u16);
        buffer.put_u16_le(TEMPLATE_ID);
        buffer.put_u16_le(SCHEMA_ID);
        buffer.put_u16_le(SCHEMA_VERSION);
        buffer.put_u64_le(connection_id);
        buffer.put_u64_le(self.time);
        buffer.put_slice(content);

        let initial_offset = self.padding + MESSAGE_HEADER_LENGTH;
        MessageEvent {
            timestamp: self.time,
            owner_id,
            connection_id,
            message_type: u64::from(message_type),
            initial_offset,
            offset: initial_offset + FIXED_BLOCK_LENGTH,
            length: content.len(),
            buffer: buffer.freeze(),
        }
    }
}

fn fix_content(message_type: u8, fields: &str) -> Vec<u8> {
    let body = format!("35={}\x01{fields}", char::from(message_type));
    format!("8=FIX.4.4\x019={}\x01{body}10=000\x01", body.len()).into_bytes()
}

/// One step of a fuzzer-generated script.
///
/// Small integer fields keep owner and connection ids colliding often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ScriptOp {
    /// Engine-owned connect
    Connect,
    /// Application message or resend request
    Message {
        /// Owner id
        owner: u8,
        /// Connection id
        connection: u8,
        /// Send a resend request instead
        resend: bool,
        /// Number of body fields
        fields: u8,
    },
    /// Message with unusable offsets
    Malformed {
        /// Connection id
        connection: u8,
    },
    /// Heartbeat, possibly stale
    Heartbeat {
        /// Owner id
        owner: u8,
        /// How far behind capture time it is stamped
        stale_by: u16,
    },
    /// Move capture time forward
    Advance {
        /// Nanoseconds
        nanos: u32,
    },
}
