//! Protocol types shared by the HTTP and TCP transports

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IggyClientError;

/// Longest name, message key or header key accepted by the broker
pub const MAX_NAME_LENGTH: usize = 255;

/// Stream or topic identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u32),
    Named(String),
}

impl Identifier {
    pub const NUMERIC_KIND: u8 = 1;
    pub const NAMED_KIND: u8 = 2;

    pub fn numeric(id: u32) -> Self {
        Self::Numeric(id)
    }

    /// Create a named identifier, 1 to 255 bytes of UTF-8
    pub fn named<S: Into<String>>(name: S) -> Result<Self, IggyClientError> {
        let id = Self::Named(name.into());
        id.validate()?;
        Ok(id)
    }

    /// Same length rule as [`Identifier::named`], for values built from the
    /// variant directly
    pub fn validate(&self) -> Result<(), IggyClientError> {
        match self {
            Self::Named(name) if name.is_empty() || name.len() > MAX_NAME_LENGTH => {
                Err(IggyClientError::invalid_message(format!(
                    "identifier name must be 1..={} bytes, got {}",
                    MAX_NAME_LENGTH,
                    name.len()
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn kind_code(&self) -> u8 {
        match self {
            Self::Numeric(_) => Self::NUMERIC_KIND,
            Self::Named(_) => Self::NAMED_KIND,
        }
    }

    /// Length of the value part of the binary form
    pub fn value_len(&self) -> usize {
        match self {
            Self::Numeric(_) => 4,
            Self::Named(name) => name.len(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{}", id),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Self {
        Self::Numeric(id)
    }
}

/// Wire discriminant of a [`Partitioning`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitioningKind {
    Balanced = 1,
    PartitionId = 2,
    MessagesKey = 3,
}

impl TryFrom<u8> for PartitioningKind {
    type Error = IggyClientError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Balanced),
            2 => Ok(Self::PartitionId),
            3 => Ok(Self::MessagesKey),
            other => Err(IggyClientError::decode(format!(
                "unknown partitioning kind {}",
                other
            ))),
        }
    }
}

/// Routing metadata telling the broker where to place messages
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partitioning {
    /// Let the broker pick a partition
    None,
    /// Explicit partition id, 4 bytes little-endian on the wire
    PartitionId(u32),
    /// Hash of the key picks the partition
    MessageKey(Bytes),
}

impl Partitioning {
    pub fn balanced() -> Self {
        Self::None
    }

    pub fn partition_id(id: u32) -> Self {
        Self::PartitionId(id)
    }

    /// Key-based partitioning, 1 to 255 bytes of key
    pub fn messages_key<K: Into<Bytes>>(key: K) -> Result<Self, IggyClientError> {
        let partitioning = Self::MessageKey(key.into());
        partitioning.validate()?;
        Ok(partitioning)
    }

    pub fn validate(&self) -> Result<(), IggyClientError> {
        match self {
            Self::MessageKey(key) if key.is_empty() || key.len() > MAX_NAME_LENGTH => {
                Err(IggyClientError::invalid_message(format!(
                    "message key must be 1..={} bytes, got {}",
                    MAX_NAME_LENGTH,
                    key.len()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Rebuild a partitioning from its kind and raw value bytes
    pub fn from_parts(kind: PartitioningKind, value: Bytes) -> Result<Self, IggyClientError> {
        match kind {
            PartitioningKind::Balanced if value.is_empty() => Ok(Self::None),
            PartitioningKind::PartitionId if value.len() == 4 => {
                let mut id = [0u8; 4];
                id.copy_from_slice(&value);
                Ok(Self::PartitionId(u32::from_le_bytes(id)))
            }
            PartitioningKind::MessagesKey => Self::messages_key(value)
                .map_err(|_| IggyClientError::decode("invalid messages key length")),
            _ => Err(IggyClientError::decode(format!(
                "partitioning {:?} cannot carry {} value bytes",
                kind,
                value.len()
            ))),
        }
    }

    pub fn kind(&self) -> PartitioningKind {
        match self {
            Self::None => PartitioningKind::Balanced,
            Self::PartitionId(_) => PartitioningKind::PartitionId,
            Self::MessageKey(_) => PartitioningKind::MessagesKey,
        }
    }

    /// Raw value bytes as sent on the wire
    pub fn value(&self) -> Bytes {
        match self {
            Self::None => Bytes::new(),
            Self::PartitionId(id) => Bytes::copy_from_slice(&id.to_le_bytes()),
            Self::MessageKey(key) => key.clone(),
        }
    }

    pub fn value_len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::PartitionId(_) => 4,
            Self::MessageKey(key) => key.len(),
        }
    }

    /// Partition id, only for explicit partition routing
    pub fn partition(&self) -> Option<u32> {
        match self {
            Self::PartitionId(id) => Some(*id),
            _ => None,
        }
    }
}

/// Type tag of a header value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderKind {
    Raw = 1,
    String = 2,
    Bool = 3,
    Int8 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    Int128 = 8,
    Uint8 = 9,
    Uint16 = 10,
    Uint32 = 11,
    Uint64 = 12,
    Uint128 = 13,
    Float32 = 14,
    Float64 = 15,
}

impl TryFrom<u8> for HeaderKind {
    type Error = IggyClientError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let kind = match code {
            1 => Self::Raw,
            2 => Self::String,
            3 => Self::Bool,
            4 => Self::Int8,
            5 => Self::Int16,
            6 => Self::Int32,
            7 => Self::Int64,
            8 => Self::Int128,
            9 => Self::Uint8,
            10 => Self::Uint16,
            11 => Self::Uint32,
            12 => Self::Uint64,
            13 => Self::Uint128,
            14 => Self::Float32,
            15 => Self::Float64,
            other => {
                return Err(IggyClientError::decode(format!(
                    "unknown header kind {}",
                    other
                )))
            }
        };
        Ok(kind)
    }
}

/// Typed header value; numbers are stored little-endian
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderValue {
    pub kind: HeaderKind,
    pub value: Bytes,
}

impl HeaderValue {
    pub fn raw<V: Into<Bytes>>(value: V) -> Self {
        Self {
            kind: HeaderKind::Raw,
            value: value.into(),
        }
    }

    pub fn string<S: Into<String>>(value: S) -> Self {
        Self {
            kind: HeaderKind::String,
            value: Bytes::from(value.into()),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            kind: HeaderKind::Bool,
            value: Bytes::copy_from_slice(&[value as u8]),
        }
    }

    pub fn int64(value: i64) -> Self {
        Self {
            kind: HeaderKind::Int64,
            value: Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    pub fn uint32(value: u32) -> Self {
        Self {
            kind: HeaderKind::Uint32,
            value: Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    pub fn uint64(value: u64) -> Self {
        Self {
            kind: HeaderKind::Uint64,
            value: Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    pub fn float64(value: f64) -> Self {
        Self {
            kind: HeaderKind::Float64,
            value: Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// String view of `String` headers
    pub fn as_str(&self) -> Option<&str> {
        match self.kind {
            HeaderKind::String => std::str::from_utf8(&self.value).ok(),
            _ => None,
        }
    }
}

/// One message header; headers keep their insertion order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    pub key: String,
    pub value: HeaderValue,
}

/// Message as produced by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// 128-bit message id, zero lets the broker assign one
    pub id: u128,
    pub headers: Vec<Header>,
    pub payload: Bytes,
}

impl Message {
    pub fn new<P: Into<Bytes>>(payload: P) -> Self {
        Self {
            id: 0,
            headers: Vec::new(),
            payload: payload.into(),
        }
    }

    pub fn with_id<P: Into<Bytes>>(id: u128, payload: P) -> Self {
        Self {
            id,
            headers: Vec::new(),
            payload: payload.into(),
        }
    }

    pub fn with_header<K: Into<String>>(mut self, key: K, value: HeaderValue) -> Self {
        self.headers.push(Header {
            key: key.into(),
            value,
        });
        self
    }

    fn validate(&self) -> Result<(), IggyClientError> {
        for header in &self.headers {
            if header.key.is_empty() || header.key.len() > MAX_NAME_LENGTH {
                return Err(IggyClientError::invalid_message(format!(
                    "header key must be 1..={} bytes, got {}",
                    MAX_NAME_LENGTH,
                    header.key.len()
                )));
            }
        }
        Ok(())
    }
}

/// One caller's send: messages bound for a single stream/topic/partitioning.
///
/// Requests are validated when built and never change afterwards. The
/// dispatcher also uses this type for the batches it composes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    stream_id: Identifier,
    topic_id: Identifier,
    partitioning: Partitioning,
    messages: Vec<Message>,
}

impl SendRequest {
    pub fn new(
        stream_id: Identifier,
        topic_id: Identifier,
        partitioning: Partitioning,
        messages: Vec<Message>,
    ) -> Result<Self, IggyClientError> {
        if messages.is_empty() {
            return Err(IggyClientError::invalid_message(
                "send request must carry at least one message",
            ));
        }
        stream_id.validate()?;
        topic_id.validate()?;
        partitioning.validate()?;
        for message in &messages {
            message.validate()?;
        }

        Ok(Self {
            stream_id,
            topic_id,
            partitioning,
            messages,
        })
    }

    /// Same target as `self`, different messages. Only used for batches
    /// composed from already validated requests.
    pub(crate) fn retarget(&self, messages: Vec<Message>) -> Self {
        Self {
            stream_id: self.stream_id.clone(),
            topic_id: self.topic_id.clone(),
            partitioning: self.partitioning.clone(),
            messages,
        }
    }

    pub fn stream_id(&self) -> &Identifier {
        &self.stream_id
    }

    pub fn topic_id(&self) -> &Identifier {
        &self.topic_id
    }

    pub fn partitioning(&self) -> &Partitioning {
        &self.partitioning
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// True when `other` targets the same stream, topic and partitioning
    pub fn same_target(&self, other: &SendRequest) -> bool {
        self.stream_id == other.stream_id
            && self.topic_id == other.topic_id
            && self.partitioning == other.partitioning
    }
}

/// Consumer identity used when polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    Consumer = 1,
    ConsumerGroup = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumer {
    pub kind: ConsumerKind,
    pub id: u32,
}

impl Consumer {
    pub fn new(id: u32) -> Self {
        Self {
            kind: ConsumerKind::Consumer,
            id,
        }
    }

    pub fn group(id: u32) -> Self {
        Self {
            kind: ConsumerKind::ConsumerGroup,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingKind {
    Offset = 1,
    Timestamp = 2,
    First = 3,
    Last = 4,
    Next = 5,
}

/// Where in the partition a poll starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingStrategy {
    pub kind: PollingKind,
    pub value: u64,
}

impl PollingStrategy {
    pub fn offset(value: u64) -> Self {
        Self {
            kind: PollingKind::Offset,
            value,
        }
    }

    pub fn timestamp(value: u64) -> Self {
        Self {
            kind: PollingKind::Timestamp,
            value,
        }
    }

    pub fn first() -> Self {
        Self {
            kind: PollingKind::First,
            value: 0,
        }
    }

    pub fn last() -> Self {
        Self {
            kind: PollingKind::Last,
            value: 0,
        }
    }

    pub fn next() -> Self {
        Self {
            kind: PollingKind::Next,
            value: 0,
        }
    }
}

/// Poll request for reading messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub consumer: Consumer,
    pub stream_id: Identifier,
    pub topic_id: Identifier,
    pub partition_id: u32,
    pub strategy: PollingStrategy,
    pub count: u32,
    pub auto_commit: bool,
}

/// Broker-side state of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Available = 1,
    Unavailable = 10,
    Poisoned = 20,
    MarkedForDeletion = 30,
}

impl TryFrom<u8> for MessageState {
    type Error = IggyClientError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Available),
            10 => Ok(Self::Unavailable),
            20 => Ok(Self::Poisoned),
            30 => Ok(Self::MarkedForDeletion),
            other => Err(IggyClientError::decode(format!(
                "unknown message state {}",
                other
            ))),
        }
    }
}

/// Message as returned by a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    pub offset: u64,
    pub state: MessageState,
    pub timestamp: u64,
    pub id: u128,
    pub checksum: u32,
    pub headers: Vec<Header>,
    pub payload: Bytes,
}

/// Result of one poll against a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledMessages {
    pub partition_id: u32,
    pub current_offset: u64,
    pub messages: Vec<MessageResponse>,
}
