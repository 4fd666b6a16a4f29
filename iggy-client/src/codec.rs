//! Binary codec for the TCP transport
//!
//! All integers are little-endian. Decoders check every declared length
//! against the bytes actually remaining before reading, so a malformed
//! payload fails with [`IggyClientError::Decode`] instead of over-reading or
//! silently truncating.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::IggyClientError;
use crate::protocol::{
    Header, HeaderKind, HeaderValue, Identifier, Message, MessageResponse, MessageState,
    Partitioning, PartitioningKind, PollRequest, PolledMessages, SendRequest, MAX_NAME_LENGTH,
};
use crate::records::{ConsumerGroup, Offset, Partition, Stats, Stream, Topic};
use crate::Result;

/// TCP command codes
pub mod command {
    pub const POLL_MESSAGES: u32 = 100;
    pub const SEND_MESSAGES: u32 = 101;
}

/// Fixed part of a stored message: everything but headers and payload
pub const MESSAGE_PREFIX_LEN: usize = 45;
/// Numeric header of the stats record, before the four strings
pub const STATS_HEADER_LEN: usize = 104;
/// Response header: status u32 + payload length u32
pub const RESPONSE_HEADER_LEN: usize = 8;
/// Largest response payload the frame decoder accepts
pub const MAX_FRAME_LEN: usize = 100_000_000;

/// A fixed-layout value with a bit-exact binary form.
///
/// `decode(encode(x)) == x` for every valid `x`, and re-encoding decoded
/// bytes reproduces them exactly.
pub trait BinaryRecord: Sized {
    /// Exact number of bytes `encode` writes
    fn encoded_len(&self) -> usize;

    /// Append the binary form to `dst`
    fn encode(&self, dst: &mut BytesMut) -> Result<()>;

    /// Consume one record from the front of `src`
    fn decode(src: &mut Bytes) -> Result<Self>;

    fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Decode exactly one record; leftover bytes are an error
    fn from_bytes(mut src: Bytes) -> Result<Self> {
        let record = Self::decode(&mut src)?;
        if src.has_remaining() {
            return Err(IggyClientError::decode(format!(
                "{} trailing bytes after record",
                src.remaining()
            )));
        }
        Ok(record)
    }
}

/// Decode back-to-back records until the buffer is exhausted
pub fn decode_list<T: BinaryRecord>(mut src: Bytes) -> Result<Vec<T>> {
    let mut records = Vec::new();
    while src.has_remaining() {
        records.push(T::decode(&mut src)?);
    }
    Ok(records)
}

fn ensure(src: &Bytes, needed: usize, field: &str) -> Result<()> {
    if src.remaining() < needed {
        return Err(IggyClientError::decode(format!(
            "{}: need {} bytes, {} remaining",
            field,
            needed,
            src.remaining()
        )));
    }
    Ok(())
}

fn read_u8(src: &mut Bytes, field: &str) -> Result<u8> {
    ensure(src, 1, field)?;
    Ok(src.get_u8())
}

fn read_u32(src: &mut Bytes, field: &str) -> Result<u32> {
    ensure(src, 4, field)?;
    Ok(src.get_u32_le())
}

fn read_i32(src: &mut Bytes, field: &str) -> Result<i32> {
    ensure(src, 4, field)?;
    Ok(src.get_i32_le())
}

fn read_u64(src: &mut Bytes, field: &str) -> Result<u64> {
    ensure(src, 8, field)?;
    Ok(src.get_u64_le())
}

fn read_u128(src: &mut Bytes, field: &str) -> Result<u128> {
    ensure(src, 16, field)?;
    Ok(src.get_u128_le())
}

fn read_f32(src: &mut Bytes, field: &str) -> Result<f32> {
    ensure(src, 4, field)?;
    Ok(src.get_f32_le())
}

fn read_bytes(src: &mut Bytes, len: usize, field: &str) -> Result<Bytes> {
    ensure(src, len, field)?;
    Ok(src.split_to(len))
}

fn read_string(src: &mut Bytes, len: usize, field: &str) -> Result<String> {
    let raw = read_bytes(src, len, field)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| IggyClientError::decode(format!("{}: invalid UTF-8", field)))
}

fn short_len(len: usize, field: &str) -> Result<u8> {
    if len > MAX_NAME_LENGTH {
        return Err(IggyClientError::invalid_message(format!(
            "{} is {} bytes, at most {} fit a u8 length",
            field, len, MAX_NAME_LENGTH
        )));
    }
    Ok(len as u8)
}

/// Like [`short_len`] but also rejects empty values
fn name_len(len: usize, field: &str) -> Result<u8> {
    if len == 0 {
        return Err(IggyClientError::invalid_message(format!(
            "{} must not be empty",
            field
        )));
    }
    short_len(len, field)
}

fn long_len(len: usize, field: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        IggyClientError::invalid_message(format!("{} is {} bytes, too large for u32", field, len))
    })
}

fn prefixed_string_len(len: usize, field: &str) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        IggyClientError::invalid_message(format!("{} is {} bytes, too large for i32", field, len))
    })
}

impl BinaryRecord for Identifier {
    fn encoded_len(&self) -> usize {
        2 + self.value_len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.kind_code());
        match self {
            Identifier::Numeric(id) => {
                dst.put_u8(4);
                dst.put_u32_le(*id);
            }
            Identifier::Named(name) => {
                dst.put_u8(name_len(name.len(), "identifier name")?);
                dst.put_slice(name.as_bytes());
            }
        }
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        let kind = read_u8(src, "identifier kind")?;
        let len = read_u8(src, "identifier length")? as usize;
        match kind {
            Identifier::NUMERIC_KIND if len == 4 => {
                Ok(Identifier::Numeric(read_u32(src, "identifier value")?))
            }
            Identifier::NAMED_KIND if len > 0 => {
                Ok(Identifier::Named(read_string(src, len, "identifier name")?))
            }
            _ => Err(IggyClientError::decode(format!(
                "identifier kind {} with length {}",
                kind, len
            ))),
        }
    }
}

impl BinaryRecord for Partitioning {
    fn encoded_len(&self) -> usize {
        2 + self.value_len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let value = self.value();
        let len = match self {
            Partitioning::MessageKey(_) => name_len(value.len(), "messages key")?,
            _ => short_len(value.len(), "partitioning value")?,
        };
        dst.put_u8(self.kind() as u8);
        dst.put_u8(len);
        dst.put_slice(&value);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        let kind = PartitioningKind::try_from(read_u8(src, "partitioning kind")?)?;
        let len = read_u8(src, "partitioning length")? as usize;
        let value = read_bytes(src, len, "partitioning value")?;
        Partitioning::from_parts(kind, value)
    }
}

fn headers_len(headers: &[Header]) -> usize {
    headers
        .iter()
        .map(|header| 4 + header.key.len() + 1 + 4 + header.value.value.len())
        .sum()
}

fn encode_headers(headers: &[Header], dst: &mut BytesMut) -> Result<()> {
    for header in headers {
        dst.put_u32_le(long_len(header.key.len(), "header key")?);
        dst.put_slice(header.key.as_bytes());
        dst.put_u8(header.value.kind as u8);
        dst.put_u32_le(long_len(header.value.value.len(), "header value")?);
        dst.put_slice(&header.value.value);
    }
    Ok(())
}

fn decode_headers(mut block: Bytes) -> Result<Vec<Header>> {
    let mut headers = Vec::new();
    while block.has_remaining() {
        let key_len = read_u32(&mut block, "header key length")? as usize;
        let key = read_string(&mut block, key_len, "header key")?;
        let kind = HeaderKind::try_from(read_u8(&mut block, "header kind")?)?;
        let value_len = read_u32(&mut block, "header value length")? as usize;
        let value = read_bytes(&mut block, value_len, "header value")?;
        headers.push(Header {
            key,
            value: HeaderValue { kind, value },
        });
    }
    Ok(headers)
}

fn decode_header_block(src: &mut Bytes) -> Result<Vec<Header>> {
    let len = read_u32(src, "headers length")? as usize;
    let block = read_bytes(src, len, "headers")?;
    decode_headers(block)
}

fn encode_header_block(headers: &[Header], dst: &mut BytesMut) -> Result<()> {
    dst.put_u32_le(long_len(headers_len(headers), "headers")?);
    encode_headers(headers, dst)
}

fn decode_payload(src: &mut Bytes) -> Result<Bytes> {
    let len = read_u32(src, "payload length")? as usize;
    read_bytes(src, len, "payload")
}

fn encode_payload(payload: &Bytes, dst: &mut BytesMut) -> Result<()> {
    dst.put_u32_le(long_len(payload.len(), "payload")?);
    dst.put_slice(payload);
    Ok(())
}

/// Outgoing message: `id | headers-length | headers | payload-length | payload`
impl BinaryRecord for Message {
    fn encoded_len(&self) -> usize {
        16 + 4 + headers_len(&self.headers) + 4 + self.payload.len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u128_le(self.id);
        encode_header_block(&self.headers, dst)?;
        encode_payload(&self.payload, dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        let id = read_u128(src, "message id")?;
        let headers = decode_header_block(src)?;
        let payload = decode_payload(src)?;
        Ok(Message {
            id,
            headers,
            payload,
        })
    }
}

impl BinaryRecord for MessageResponse {
    fn encoded_len(&self) -> usize {
        MESSAGE_PREFIX_LEN + headers_len(&self.headers) + self.payload.len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u64_le(self.offset);
        dst.put_u8(self.state as u8);
        dst.put_u64_le(self.timestamp);
        dst.put_u128_le(self.id);
        dst.put_u32_le(self.checksum);
        encode_header_block(&self.headers, dst)?;
        encode_payload(&self.payload, dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        let offset = read_u64(src, "message offset")?;
        let state = MessageState::try_from(read_u8(src, "message state")?)?;
        let timestamp = read_u64(src, "message timestamp")?;
        let id = read_u128(src, "message id")?;
        let checksum = read_u32(src, "message checksum")?;
        let headers = decode_header_block(src)?;
        let payload = decode_payload(src)?;
        Ok(MessageResponse {
            offset,
            state,
            timestamp,
            id,
            checksum,
            headers,
            payload,
        })
    }
}

/// Poll response: `partition-id | current-offset | count | messages`
impl BinaryRecord for PolledMessages {
    fn encoded_len(&self) -> usize {
        16 + self
            .messages
            .iter()
            .map(BinaryRecord::encoded_len)
            .sum::<usize>()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u32_le(self.partition_id);
        dst.put_u64_le(self.current_offset);
        dst.put_u32_le(long_len(self.messages.len(), "messages count")?);
        for message in &self.messages {
            message.encode(dst)?;
        }
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        let partition_id = read_u32(src, "partition id")?;
        let current_offset = read_u64(src, "current offset")?;
        let count = read_u32(src, "messages count")? as usize;
        // Each message needs at least its fixed prefix.
        ensure(src, count.saturating_mul(MESSAGE_PREFIX_LEN), "messages")?;
        let mut messages = Vec::with_capacity(count);
        for _ in 0..count {
            messages.push(MessageResponse::decode(src)?);
        }
        Ok(PolledMessages {
            partition_id,
            current_offset,
            messages,
        })
    }
}

impl BinaryRecord for Stream {
    fn encoded_len(&self) -> usize {
        33 + self.name.len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let name_len = short_len(self.name.len(), "stream name")?;
        dst.put_i32_le(self.id);
        dst.put_u64_le(self.created_at);
        dst.put_i32_le(self.topics_count);
        dst.put_u64_le(self.size_bytes);
        dst.put_u64_le(self.messages_count);
        dst.put_u8(name_len);
        dst.put_slice(self.name.as_bytes());
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        let id = read_i32(src, "stream id")?;
        let created_at = read_u64(src, "stream created at")?;
        let topics_count = read_i32(src, "stream topics count")?;
        let size_bytes = read_u64(src, "stream size")?;
        let messages_count = read_u64(src, "stream messages count")?;
        let name_len = read_u8(src, "stream name length")? as usize;
        let name = read_string(src, name_len, "stream name")?;
        Ok(Stream {
            id,
            created_at,
            topics_count,
            size_bytes,
            messages_count,
            name,
        })
    }
}

impl BinaryRecord for Topic {
    fn encoded_len(&self) -> usize {
        37 + self.name.len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let name_len = short_len(self.name.len(), "topic name")?;
        dst.put_i32_le(self.id);
        dst.put_u64_le(self.created_at);
        dst.put_i32_le(self.partitions_count);
        dst.put_i32_le(self.message_expiry);
        dst.put_u64_le(self.size_bytes);
        dst.put_u64_le(self.messages_count);
        dst.put_u8(name_len);
        dst.put_slice(self.name.as_bytes());
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        let id = read_i32(src, "topic id")?;
        let created_at = read_u64(src, "topic created at")?;
        let partitions_count = read_i32(src, "topic partitions count")?;
        let message_expiry = read_i32(src, "topic message expiry")?;
        let size_bytes = read_u64(src, "topic size")?;
        let messages_count = read_u64(src, "topic messages count")?;
        let name_len = read_u8(src, "topic name length")? as usize;
        let name = read_string(src, name_len, "topic name")?;
        Ok(Topic {
            id,
            created_at,
            partitions_count,
            message_expiry,
            size_bytes,
            messages_count,
            name,
        })
    }
}

impl BinaryRecord for Partition {
    fn encoded_len(&self) -> usize {
        28
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32_le(self.id);
        dst.put_i32_le(self.segments_count);
        dst.put_i32_le(self.current_offset);
        dst.put_u64_le(self.size_bytes);
        dst.put_u64_le(self.messages_count);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        ensure(src, 28, "partition")?;
        Ok(Partition {
            id: src.get_i32_le(),
            segments_count: src.get_i32_le(),
            current_offset: src.get_i32_le(),
            size_bytes: src.get_u64_le(),
            messages_count: src.get_u64_le(),
        })
    }
}

impl BinaryRecord for ConsumerGroup {
    fn encoded_len(&self) -> usize {
        12
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32_le(self.id);
        dst.put_i32_le(self.partitions_count);
        dst.put_i32_le(self.members_count);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        ensure(src, 12, "consumer group")?;
        Ok(ConsumerGroup {
            id: src.get_i32_le(),
            partitions_count: src.get_i32_le(),
            members_count: src.get_i32_le(),
        })
    }
}

impl BinaryRecord for Offset {
    fn encoded_len(&self) -> usize {
        20
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32_le(self.partition_id);
        dst.put_u64_le(self.current_offset);
        dst.put_u64_le(self.stored_offset);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        ensure(src, 20, "offset")?;
        Ok(Offset {
            partition_id: src.get_i32_le(),
            current_offset: src.get_u64_le(),
            stored_offset: src.get_u64_le(),
        })
    }
}

fn read_prefixed_string(src: &mut Bytes, field: &str) -> Result<String> {
    let len = read_i32(src, field)?;
    if len < 0 {
        return Err(IggyClientError::decode(format!(
            "{}: negative length {}",
            field, len
        )));
    }
    read_string(src, len as usize, field)
}

fn put_prefixed_string(value: &str, field: &str, dst: &mut BytesMut) -> Result<()> {
    dst.put_i32_le(prefixed_string_len(value.len(), field)?);
    dst.put_slice(value.as_bytes());
    Ok(())
}

impl BinaryRecord for Stats {
    fn encoded_len(&self) -> usize {
        STATS_HEADER_LEN
            + 16
            + self.hostname.len()
            + self.os_name.len()
            + self.os_version.len()
            + self.kernel_version.len()
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32_le(self.process_id);
        dst.put_f32_le(self.cpu_usage);
        dst.put_u64_le(self.memory_usage);
        dst.put_u64_le(self.total_memory);
        dst.put_u64_le(self.available_memory);
        dst.put_u64_le(self.run_time);
        dst.put_u64_le(self.start_time);
        dst.put_u64_le(self.read_bytes);
        dst.put_u64_le(self.written_bytes);
        dst.put_u64_le(self.messages_size_bytes);
        dst.put_i32_le(self.streams_count);
        dst.put_i32_le(self.topics_count);
        dst.put_i32_le(self.partitions_count);
        dst.put_i32_le(self.segments_count);
        dst.put_u64_le(self.messages_count);
        dst.put_i32_le(self.clients_count);
        dst.put_i32_le(self.consumer_groups_count);
        put_prefixed_string(&self.hostname, "hostname", dst)?;
        put_prefixed_string(&self.os_name, "os name", dst)?;
        put_prefixed_string(&self.os_version, "os version", dst)?;
        put_prefixed_string(&self.kernel_version, "kernel version", dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        ensure(src, STATS_HEADER_LEN, "stats header")?;
        let process_id = read_i32(src, "process id")?;
        let cpu_usage = read_f32(src, "cpu usage")?;
        let memory_usage = read_u64(src, "memory usage")?;
        let total_memory = read_u64(src, "total memory")?;
        let available_memory = read_u64(src, "available memory")?;
        let run_time = read_u64(src, "run time")?;
        let start_time = read_u64(src, "start time")?;
        let read_bytes = read_u64(src, "read bytes")?;
        let written_bytes = read_u64(src, "written bytes")?;
        let messages_size_bytes = read_u64(src, "messages size")?;
        let streams_count = read_i32(src, "streams count")?;
        let topics_count = read_i32(src, "topics count")?;
        let partitions_count = read_i32(src, "partitions count")?;
        let segments_count = read_i32(src, "segments count")?;
        let messages_count = read_u64(src, "messages count")?;
        let clients_count = read_i32(src, "clients count")?;
        let consumer_groups_count = read_i32(src, "consumer groups count")?;
        let hostname = read_prefixed_string(src, "hostname")?;
        let os_name = read_prefixed_string(src, "os name")?;
        let os_version = read_prefixed_string(src, "os version")?;
        let kernel_version = read_prefixed_string(src, "kernel version")?;
        Ok(Stats {
            process_id,
            cpu_usage,
            memory_usage,
            total_memory,
            available_memory,
            run_time,
            start_time,
            read_bytes,
            written_bytes,
            messages_size_bytes,
            streams_count,
            topics_count,
            partitions_count,
            segments_count,
            messages_count,
            clients_count,
            consumer_groups_count,
            hostname,
            os_name,
            os_version,
            kernel_version,
        })
    }
}

/// Payload of a `SEND_MESSAGES` command
pub fn encode_send_messages(request: &SendRequest, dst: &mut BytesMut) -> Result<()> {
    request.stream_id().encode(dst)?;
    request.topic_id().encode(dst)?;
    request.partitioning().encode(dst)?;
    for message in request.messages() {
        message.encode(dst)?;
    }
    Ok(())
}

pub fn send_messages_len(request: &SendRequest) -> usize {
    request.stream_id().encoded_len()
        + request.topic_id().encoded_len()
        + request.partitioning().encoded_len()
        + request
            .messages()
            .iter()
            .map(BinaryRecord::encoded_len)
            .sum::<usize>()
}

/// Inverse of [`encode_send_messages`]
pub fn decode_send_messages(mut src: Bytes) -> Result<SendRequest> {
    let stream_id = Identifier::decode(&mut src)?;
    let topic_id = Identifier::decode(&mut src)?;
    let partitioning = Partitioning::decode(&mut src)?;
    let messages = decode_list::<Message>(src)?;
    SendRequest::new(stream_id, topic_id, partitioning, messages)
        .map_err(|e| IggyClientError::decode(e.to_string()))
}

/// Payload of a `POLL_MESSAGES` command
pub fn encode_poll_messages(request: &PollRequest, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(request.consumer.kind as u8);
    dst.put_u32_le(request.consumer.id);
    request.stream_id.encode(dst)?;
    request.topic_id.encode(dst)?;
    dst.put_u32_le(request.partition_id);
    dst.put_u8(request.strategy.kind as u8);
    dst.put_u64_le(request.strategy.value);
    dst.put_u32_le(request.count);
    dst.put_u8(request.auto_commit as u8);
    Ok(())
}

/// One command frame sent to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpRequest {
    pub command: u32,
    pub payload: Bytes,
}

impl TcpRequest {
    pub fn send_messages(request: &SendRequest) -> Result<Self> {
        let mut payload = BytesMut::with_capacity(send_messages_len(request));
        encode_send_messages(request, &mut payload)?;
        Ok(Self {
            command: command::SEND_MESSAGES,
            payload: payload.freeze(),
        })
    }

    pub fn poll_messages(request: &PollRequest) -> Result<Self> {
        let mut payload = BytesMut::new();
        encode_poll_messages(request, &mut payload)?;
        Ok(Self {
            command: command::POLL_MESSAGES,
            payload: payload.freeze(),
        })
    }
}

/// One response frame read back from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpResponse {
    /// Zero on success, broker error code otherwise
    pub status: u32,
    pub payload: Bytes,
}

/// Length-prefixed framing for the persistent TCP socket.
///
/// Requests go out as `length u32 | command u32 | payload` where `length`
/// counts the command and payload. Responses come back as
/// `status u32 | length u32 | payload`.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<TcpRequest> for FrameCodec {
    type Error = IggyClientError;

    fn encode(&mut self, item: TcpRequest, dst: &mut BytesMut) -> Result<()> {
        let length = long_len(4 + item.payload.len(), "request frame")?;
        dst.reserve(4 + length as usize);
        dst.put_u32_le(length);
        dst.put_u32_le(item.command);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = TcpResponse;
    type Error = IggyClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < RESPONSE_HEADER_LEN {
            return Ok(None);
        }

        let status = (&src[0..4]).get_u32_le();
        let length = (&src[4..8]).get_u32_le() as usize;
        if length > MAX_FRAME_LEN {
            return Err(IggyClientError::decode(format!(
                "response payload of {} bytes exceeds {}",
                length, MAX_FRAME_LEN
            )));
        }

        let total = RESPONSE_HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(RESPONSE_HEADER_LEN);
        let payload = src.split_to(length).freeze();
        Ok(Some(TcpResponse { status, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Consumer, PollingStrategy};
    use proptest::collection::vec;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;
    use std::fmt::Debug;

    fn stats() -> Stats {
        Stats {
            process_id: 4242,
            cpu_usage: 12.5,
            memory_usage: 1024,
            total_memory: 8192,
            available_memory: 4096,
            run_time: 360,
            start_time: 1_700_000_000,
            read_bytes: 10,
            written_bytes: 20,
            messages_size_bytes: 30,
            streams_count: 1,
            topics_count: 2,
            partitions_count: 3,
            segments_count: 4,
            messages_count: 500,
            clients_count: 6,
            consumer_groups_count: 7,
            hostname: "h".to_string(),
            os_name: "o".to_string(),
            os_version: "v".to_string(),
            kernel_version: "k".to_string(),
        }
    }

    fn polled_message(offset: u64, payload: &'static [u8]) -> MessageResponse {
        MessageResponse {
            offset,
            state: MessageState::Unavailable,
            timestamp: 1_700_000_000_000,
            id: 0x0011_2233_4455_6677_8899_aabb_ccdd_eeff,
            checksum: 0xdead_beef,
            headers: Vec::new(),
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_stats_round_trip_and_length() {
        let stats = stats();
        let bytes = stats.to_bytes().unwrap();
        assert_eq!(bytes.len(), STATS_HEADER_LEN + 4 * 4 + 4);
        assert_eq!(Stats::from_bytes(bytes).unwrap(), stats);
    }

    #[test]
    fn test_stats_string_prefixes_are_sequential() {
        let bytes = stats().to_bytes().unwrap();
        assert_eq!(&bytes[104..108], &1i32.to_le_bytes());
        assert_eq!(bytes[108], b'h');
        assert_eq!(&bytes[109..113], &1i32.to_le_bytes());
        assert_eq!(bytes[113], b'o');
        assert_eq!(bytes[118], b'v');
        assert_eq!(bytes[123], b'k');
    }

    #[test]
    fn test_stats_rejects_negative_string_length() {
        let mut raw = BytesMut::from(&stats().to_bytes().unwrap()[..]);
        raw[104..108].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            Stats::from_bytes(raw.freeze()),
            Err(IggyClientError::Decode { .. })
        ));
    }

    #[test]
    fn test_message_layout_matches_fixed_prefix() {
        let message = polled_message(7, b"hello");
        let bytes = message.to_bytes().unwrap();

        assert_eq!(bytes.len(), MESSAGE_PREFIX_LEN + 5);
        assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
        assert_eq!(bytes[8], 0x0A);
        assert_eq!(&bytes[9..17], &1_700_000_000_000u64.to_le_bytes());
        assert_eq!(&bytes[17..33], &message.id.to_le_bytes());
        assert_eq!(&bytes[33..37], &0xdead_beefu32.to_le_bytes());
        assert_eq!(&bytes[37..41], &0u32.to_le_bytes());
        assert_eq!(&bytes[41..45], &5u32.to_le_bytes());
        assert_eq!(&bytes[45..], b"hello");

        assert_eq!(MessageResponse::from_bytes(bytes).unwrap(), message);
    }

    #[test]
    fn test_message_with_headers_round_trip() {
        let mut message = polled_message(1, b"{}");
        message.headers = vec![
            Header {
                key: "content-type".to_string(),
                value: HeaderValue::string("json"),
            },
            Header {
                key: "attempt".to_string(),
                value: HeaderValue::uint32(3),
            },
        ];
        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes.len(), message.encoded_len());
        let decoded = MessageResponse::from_bytes(bytes.clone()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_message_payload_length_past_buffer_fails() {
        let mut raw = BytesMut::from(&polled_message(1, b"abc").to_bytes().unwrap()[..]);
        raw[41..45].copy_from_slice(&100u32.to_le_bytes());
        let err = MessageResponse::from_bytes(raw.freeze()).unwrap_err();
        assert!(matches!(err, IggyClientError::Decode { .. }));
    }

    #[test]
    fn test_message_unknown_state_fails() {
        let mut raw = BytesMut::from(&polled_message(1, b"abc").to_bytes().unwrap()[..]);
        raw[8] = 99;
        assert!(MessageResponse::from_bytes(raw.freeze()).is_err());
    }

    #[test]
    fn test_stream_round_trip() {
        let stream = Stream {
            id: 1,
            created_at: 99,
            topics_count: 3,
            size_bytes: 4096,
            messages_count: 12,
            name: "orders".to_string(),
        };
        let bytes = stream.to_bytes().unwrap();
        assert_eq!(bytes.len(), 33 + 6);
        assert_eq!(bytes[32], 6);
        assert_eq!(Stream::from_bytes(bytes).unwrap(), stream);
    }

    #[test]
    fn test_stream_name_length_past_buffer_fails() {
        let stream = Stream {
            id: 1,
            created_at: 0,
            topics_count: 0,
            size_bytes: 0,
            messages_count: 0,
            name: "ab".to_string(),
        };
        let mut raw = BytesMut::from(&stream.to_bytes().unwrap()[..]);
        raw[32] = 10;
        assert!(matches!(
            Stream::from_bytes(raw.freeze()),
            Err(IggyClientError::Decode { .. })
        ));
    }

    #[test]
    fn test_topic_round_trip() {
        let topic = Topic {
            id: 2,
            created_at: 77,
            partitions_count: 12,
            message_expiry: -1,
            size_bytes: 1,
            messages_count: 2,
            name: "payments".to_string(),
        };
        let bytes = topic.to_bytes().unwrap();
        assert_eq!(bytes[36], 8);
        assert_eq!(Topic::from_bytes(bytes).unwrap(), topic);
    }

    #[test]
    fn test_fixed_records_round_trip() {
        let partition = Partition {
            id: 1,
            segments_count: 2,
            current_offset: 3,
            size_bytes: 4,
            messages_count: 5,
        };
        assert_eq!(
            Partition::from_bytes(partition.to_bytes().unwrap()).unwrap(),
            partition
        );

        let group = ConsumerGroup {
            id: 9,
            partitions_count: 3,
            members_count: 2,
        };
        let bytes = group.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], &3i32.to_le_bytes());
        assert_eq!(ConsumerGroup::from_bytes(bytes).unwrap(), group);

        let offset = Offset {
            partition_id: 1,
            current_offset: 100,
            stored_offset: 42,
        };
        assert_eq!(Offset::from_bytes(offset.to_bytes().unwrap()).unwrap(), offset);
    }

    #[test]
    fn test_empty_name_and_key_are_not_encoded() {
        assert!(Identifier::Named(String::new()).to_bytes().is_err());
        assert!(Partitioning::MessageKey(Bytes::new()).to_bytes().is_err());
        // balanced routing legitimately carries no value bytes
        assert_eq!(Partitioning::balanced().to_bytes().unwrap().as_ref(), &[1, 0]);
    }

    #[test]
    fn test_truncated_fixed_record_fails() {
        assert!(Partition::from_bytes(Bytes::from_static(&[0u8; 27])).is_err());
        assert!(Offset::from_bytes(Bytes::from_static(&[0u8; 19])).is_err());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        assert!(ConsumerGroup::from_bytes(Bytes::from_static(&[0u8; 13])).is_err());
    }

    #[test]
    fn test_decode_list_of_streams() {
        let mut buf = BytesMut::new();
        for (id, name) in [(1, "a"), (2, "bc")] {
            Stream {
                id,
                created_at: 0,
                topics_count: 0,
                size_bytes: 0,
                messages_count: 0,
                name: name.to_string(),
            }
            .encode(&mut buf)
            .unwrap();
        }
        let streams: Vec<Stream> = decode_list(buf.freeze()).unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[1].name, "bc");
    }

    #[test]
    fn test_send_messages_payload_layout() {
        let request = SendRequest::new(
            Identifier::numeric(1),
            Identifier::named("events").unwrap(),
            Partitioning::partition_id(3),
            vec![Message::with_id(5, "hi")],
        )
        .unwrap();
        let frame = TcpRequest::send_messages(&request).unwrap();
        assert_eq!(frame.command, command::SEND_MESSAGES);

        let payload = &frame.payload;
        assert_eq!(&payload[0..6], &[1, 4, 1, 0, 0, 0]);
        assert_eq!(&payload[6..8], &[2, 6]);
        assert_eq!(&payload[8..14], b"events");
        assert_eq!(&payload[14..20], &[2, 4, 3, 0, 0, 0]);
        assert_eq!(&payload[20..36], &5u128.to_le_bytes());
        assert_eq!(payload.len(), send_messages_len(&request));

        assert_eq!(decode_send_messages(frame.payload).unwrap(), request);
    }

    #[test]
    fn test_poll_messages_payload_layout() {
        let request = PollRequest {
            consumer: Consumer::new(1),
            stream_id: Identifier::numeric(1),
            topic_id: Identifier::numeric(2),
            partition_id: 3,
            strategy: PollingStrategy::offset(10),
            count: 50,
            auto_commit: true,
        };
        let frame = TcpRequest::poll_messages(&request).unwrap();
        assert_eq!(frame.command, command::POLL_MESSAGES);
        assert_eq!(frame.payload.len(), 5 + 6 + 6 + 4 + 1 + 8 + 4 + 1);
        assert_eq!(frame.payload[0], 1);
        assert_eq!(frame.payload[21], 1);
        assert_eq!(frame.payload[34], 1);
    }

    #[test]
    fn test_polled_messages_count_past_buffer_fails() {
        let polled = PolledMessages {
            partition_id: 1,
            current_offset: 2,
            messages: vec![polled_message(0, b"a")],
        };
        let mut raw = BytesMut::from(&polled.to_bytes().unwrap()[..]);
        raw[12..16].copy_from_slice(&5u32.to_le_bytes());
        assert!(PolledMessages::from_bytes(raw.freeze()).is_err());
    }

    #[test]
    fn test_frame_encoder_prefixes_length_and_command() {
        let mut codec = FrameCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(
                TcpRequest {
                    command: command::SEND_MESSAGES,
                    payload: Bytes::from_static(b"abc"),
                },
                &mut dst,
            )
            .unwrap();
        assert_eq!(&dst[0..4], &7u32.to_le_bytes());
        assert_eq!(&dst[4..8], &101u32.to_le_bytes());
        assert_eq!(&dst[8..], b"abc");
    }

    #[test]
    fn test_frame_decoder_waits_for_full_payload() {
        let mut codec = FrameCodec::new();
        let mut src = BytesMut::new();
        src.put_u32_le(0);
        src.put_u32_le(4);
        src.put_slice(b"ab");
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.put_slice(b"cd");
        let response = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(response.status, 0);
        assert_eq!(response.payload, Bytes::from_static(b"abcd"));
        assert!(src.is_empty());
    }

    #[test]
    fn test_frame_decoder_rejects_oversized_payload() {
        let mut codec = FrameCodec::new();
        let mut src = BytesMut::new();
        src.put_u32_le(0);
        src.put_u32_le(u32::MAX);
        assert!(codec.decode(&mut src).is_err());
    }

    // =========================================================================
    // Property-based tests for encode/decode round-trip integrity
    // =========================================================================

    /// decode(encode(x)) == x, and re-encoding the decoded value gives the
    /// same bytes back
    fn check_round_trip<T: BinaryRecord + PartialEq + Debug>(
        record: &T,
    ) -> std::result::Result<(), TestCaseError> {
        let bytes = record.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), record.encoded_len());
        let decoded = T::from_bytes(bytes.clone()).unwrap();
        prop_assert_eq!(&decoded, record);
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
        Ok(())
    }

    /// encode(decode(b)) == b for bytes the decoder accepts
    fn check_reencode<T: BinaryRecord>(bytes: Bytes) -> std::result::Result<(), TestCaseError> {
        let decoded = T::from_bytes(bytes.clone()).unwrap();
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
        Ok(())
    }

    fn arb_identifier() -> impl Strategy<Value = Identifier> {
        prop_oneof![
            any::<u32>().prop_map(Identifier::Numeric),
            "[a-z0-9._-]{1,255}".prop_map(Identifier::Named),
        ]
    }

    fn arb_partitioning() -> impl Strategy<Value = Partitioning> {
        prop_oneof![
            Just(Partitioning::None),
            any::<u32>().prop_map(Partitioning::PartitionId),
            vec(any::<u8>(), 1..=MAX_NAME_LENGTH)
                .prop_map(|key| Partitioning::MessageKey(Bytes::from(key))),
        ]
    }

    fn arb_headers() -> impl Strategy<Value = Vec<Header>> {
        let header = (
            "[a-z][a-z0-9-]{0,31}",
            (1u8..=15).prop_map(|code| HeaderKind::try_from(code).unwrap()),
            vec(any::<u8>(), 0..64),
        )
            .prop_map(|(key, kind, value)| Header {
                key,
                value: HeaderValue {
                    kind,
                    value: Bytes::from(value),
                },
            });
        vec(header, 0..4)
    }

    fn arb_payload() -> impl Strategy<Value = Bytes> {
        vec(any::<u8>(), 0..512).prop_map(Bytes::from)
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        (any::<u128>(), arb_headers(), arb_payload()).prop_map(|(id, headers, payload)| Message {
            id,
            headers,
            payload,
        })
    }

    fn arb_message_response() -> impl Strategy<Value = MessageResponse> {
        let state = prop_oneof![
            Just(MessageState::Available),
            Just(MessageState::Unavailable),
            Just(MessageState::Poisoned),
            Just(MessageState::MarkedForDeletion),
        ];
        (
            any::<u64>(),
            state,
            any::<u64>(),
            any::<u128>(),
            any::<u32>(),
            arb_headers(),
            arb_payload(),
        )
            .prop_map(
                |(offset, state, timestamp, id, checksum, headers, payload)| MessageResponse {
                    offset,
                    state,
                    timestamp,
                    id,
                    checksum,
                    headers,
                    payload,
                },
            )
    }

    proptest! {
        #[test]
        fn prop_identifier_roundtrip(id in arb_identifier()) {
            check_round_trip(&id)?;
        }

        #[test]
        fn prop_partitioning_roundtrip(partitioning in arb_partitioning()) {
            check_round_trip(&partitioning)?;
        }

        #[test]
        fn prop_stream_roundtrip(
            (id, topics_count) in (any::<i32>(), any::<i32>()),
            (created_at, size_bytes, messages_count) in (any::<u64>(), any::<u64>(), any::<u64>()),
            name in "[a-zA-Z0-9 _-]{0,255}",
        ) {
            check_round_trip(&Stream {
                id,
                created_at,
                topics_count,
                size_bytes,
                messages_count,
                name,
            })?;
        }

        #[test]
        fn prop_topic_roundtrip(
            (id, partitions_count, message_expiry) in (any::<i32>(), any::<i32>(), any::<i32>()),
            (created_at, size_bytes, messages_count) in (any::<u64>(), any::<u64>(), any::<u64>()),
            name in "[a-zA-Z0-9 _-]{0,255}",
        ) {
            check_round_trip(&Topic {
                id,
                created_at,
                partitions_count,
                message_expiry,
                size_bytes,
                messages_count,
                name,
            })?;
        }

        #[test]
        fn prop_fixed_records_roundtrip(
            (a, b, c) in (any::<i32>(), any::<i32>(), any::<i32>()),
            (x, y) in (any::<u64>(), any::<u64>()),
        ) {
            check_round_trip(&Partition {
                id: a,
                segments_count: b,
                current_offset: c,
                size_bytes: x,
                messages_count: y,
            })?;
            check_round_trip(&ConsumerGroup {
                id: a,
                partitions_count: b,
                members_count: c,
            })?;
            check_round_trip(&Offset {
                partition_id: a,
                current_offset: x,
                stored_offset: y,
            })?;
        }

        #[test]
        fn prop_fixed_records_reencode(
            partition in vec(any::<u8>(), 28),
            group in vec(any::<u8>(), 12),
            offset in vec(any::<u8>(), 20),
        ) {
            check_reencode::<Partition>(Bytes::from(partition))?;
            check_reencode::<ConsumerGroup>(Bytes::from(group))?;
            check_reencode::<Offset>(Bytes::from(offset))?;
        }

        #[test]
        fn prop_stats_roundtrip(
            (process_id, cpu_usage) in (any::<i32>(), -1.0e6f32..1.0e6f32),
            memory in (any::<u64>(), any::<u64>(), any::<u64>(), any::<u64>(), any::<u64>()),
            io in (any::<u64>(), any::<u64>(), any::<u64>(), any::<u64>()),
            counts in (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>()),
            names in ("[a-z0-9.-]{0,64}", "[A-Za-z ]{0,32}", "[0-9.]{0,16}", "[a-z0-9.-]{0,64}"),
        ) {
            let stats = Stats {
                process_id,
                cpu_usage,
                memory_usage: memory.0,
                total_memory: memory.1,
                available_memory: memory.2,
                run_time: memory.3,
                start_time: memory.4,
                read_bytes: io.0,
                written_bytes: io.1,
                messages_size_bytes: io.2,
                streams_count: counts.0,
                topics_count: counts.1,
                partitions_count: counts.2,
                segments_count: counts.3,
                messages_count: io.3,
                clients_count: counts.4,
                consumer_groups_count: counts.5,
                hostname: names.0,
                os_name: names.1,
                os_version: names.2,
                kernel_version: names.3,
            };
            check_round_trip(&stats)?;
        }

        #[test]
        fn prop_stats_reencode_any_header_bits(
            header in vec(any::<u8>(), STATS_HEADER_LEN),
            names in vec("[a-z0-9]{0,16}", 4),
        ) {
            // any bit pattern in the fixed part, NaN cpu usage included
            let mut bytes = BytesMut::from(&header[..]);
            for name in &names {
                bytes.put_i32_le(name.len() as i32);
                bytes.put_slice(name.as_bytes());
            }
            check_reencode::<Stats>(bytes.freeze())?;
        }

        #[test]
        fn prop_message_response_roundtrip(message in arb_message_response()) {
            check_round_trip(&message)?;
        }

        #[test]
        fn prop_polled_messages_roundtrip(
            partition_id in any::<u32>(),
            current_offset in any::<u64>(),
            messages in vec(arb_message_response(), 0..8),
        ) {
            check_round_trip(&PolledMessages {
                partition_id,
                current_offset,
                messages,
            })?;
        }

        #[test]
        fn prop_send_payload_roundtrip(
            stream_id in arb_identifier(),
            topic_id in arb_identifier(),
            partitioning in arb_partitioning(),
            messages in vec(arb_message(), 1..8),
        ) {
            let request = SendRequest::new(stream_id, topic_id, partitioning, messages).unwrap();
            let mut encoded = BytesMut::new();
            encode_send_messages(&request, &mut encoded).unwrap();
            let encoded = encoded.freeze();
            prop_assert_eq!(encoded.len(), send_messages_len(&request));

            let decoded = decode_send_messages(encoded.clone()).unwrap();
            prop_assert_eq!(&decoded, &request);

            let mut reencoded = BytesMut::new();
            encode_send_messages(&decoded, &mut reencoded).unwrap();
            prop_assert_eq!(reencoded.freeze(), encoded);
        }
    }
}
