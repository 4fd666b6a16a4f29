//! HTTP transport: JSON over the broker's REST endpoints
//!
//! Binary fields (payloads, partitioning values, header values) travel as
//! base64 strings. Any non-2xx response is decoded from the broker's error
//! body into [`IggyClientError::Transport`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue as HttpHeaderValue};
use reqwest::Url;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::IggyClientError;
use crate::invoker::MessageInvoker;
use crate::protocol::{
    Header, HeaderKind, HeaderValue, Identifier, MessageResponse, MessageState, PartitioningKind,
    PollRequest, PolledMessages, SendRequest,
};
use crate::Result;

fn encode_base64<S, T>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&STANDARD.encode(value.as_ref()))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Bytes, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(de::Error::custom)
}

#[derive(Debug, Serialize)]
struct PartitioningBody {
    kind: PartitioningKind,
    #[serde(serialize_with = "encode_base64")]
    value: Bytes,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeaderValueBody {
    kind: HeaderKind,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    value: Bytes,
}

/// Headers as a JSON object, keys in insertion order
struct HeaderMapBody<'a>(&'a [Header]);

impl HeaderMapBody<'_> {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for HeaderMapBody<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for header in self.0 {
            map.serialize_entry(
                &header.key,
                &HeaderValueBody {
                    kind: header.value.kind,
                    value: header.value.value.clone(),
                },
            )?;
        }
        map.end()
    }
}

/// Decoded header object; keeps the order the broker wrote them in
#[derive(Debug, Default)]
struct HeaderList(Vec<Header>);

impl<'de> Deserialize<'de> for HeaderList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct HeaderListVisitor;

        impl<'de> Visitor<'de> for HeaderListVisitor {
            type Value = HeaderList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header key to {kind, value}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<HeaderList, A::Error> {
                let mut headers = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, body)) = access.next_entry::<String, HeaderValueBody>()? {
                    headers.push(Header {
                        key,
                        value: HeaderValue {
                            kind: body.kind,
                            value: body.value,
                        },
                    });
                }
                Ok(HeaderList(headers))
            }
        }

        deserializer.deserialize_map(HeaderListVisitor)
    }
}

#[derive(Serialize)]
struct MessageBody<'a> {
    id: u128,
    #[serde(serialize_with = "encode_base64")]
    payload: &'a [u8],
    #[serde(skip_serializing_if = "HeaderMapBody::is_empty")]
    headers: HeaderMapBody<'a>,
}

#[derive(Serialize)]
struct SendMessagesBody<'a> {
    partitioning: PartitioningBody,
    messages: Vec<MessageBody<'a>>,
}

impl<'a> SendMessagesBody<'a> {
    fn from_request(request: &'a SendRequest) -> Self {
        Self {
            partitioning: PartitioningBody {
                kind: request.partitioning().kind(),
                value: request.partitioning().value(),
            },
            messages: request
                .messages()
                .iter()
                .map(|message| MessageBody {
                    id: message.id,
                    payload: &message.payload,
                    headers: HeaderMapBody(&message.headers),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct MessageResponseBody {
    offset: u64,
    state: MessageState,
    timestamp: u64,
    id: u128,
    checksum: u32,
    #[serde(default)]
    headers: Option<HeaderList>,
    #[serde(deserialize_with = "decode_base64")]
    payload: Bytes,
}

#[derive(Deserialize)]
struct PolledMessagesBody {
    partition_id: u32,
    current_offset: u64,
    messages: Vec<MessageResponseBody>,
}

impl From<PolledMessagesBody> for PolledMessages {
    fn from(body: PolledMessagesBody) -> Self {
        PolledMessages {
            partition_id: body.partition_id,
            current_offset: body.current_offset,
            messages: body
                .messages
                .into_iter()
                .map(|message| MessageResponse {
                    offset: message.offset,
                    state: message.state,
                    timestamp: message.timestamp,
                    id: message.id,
                    checksum: message.checksum,
                    headers: message.headers.unwrap_or_default().0,
                    payload: message.payload,
                })
                .collect(),
        }
    }
}

/// Error body returned with every non-2xx response
#[derive(Debug, Deserialize)]
struct ErrorBody {
    id: u32,
    code: String,
    reason: String,
}

fn error_from_body(status: u16, body: &str) -> IggyClientError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error) => IggyClientError::Transport {
            status: error.id,
            code: Some(error.code),
            reason: error.reason,
        },
        Err(_) if body.trim().is_empty() => {
            IggyClientError::transport(status as u32, format!("HTTP {}", status))
        }
        Err(_) => IggyClientError::transport(status as u32, body.trim()),
    }
}

fn polling_kind_name(request: &PollRequest) -> Result<String> {
    match serde_json::to_value(request.strategy.kind)? {
        serde_json::Value::String(name) => Ok(name),
        other => Err(IggyClientError::serialization(format!(
            "unexpected polling kind {}",
            other
        ))),
    }
}

/// Invoker speaking JSON to the broker's HTTP API
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpInvoker {
    /// Build a client for `config.address()` with the configured extra headers
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(config.address()).map_err(|e| {
            IggyClientError::configuration(format!(
                "invalid base address '{}': {}",
                config.address(),
                e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(IggyClientError::configuration(format!(
                "base address '{}' cannot carry a path",
                config.address()
            )));
        }

        let mut headers = HeaderMap::new();
        for header in &config.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| {
                IggyClientError::configuration(format!("invalid header name '{}'", header.name))
            })?;
            let value = HttpHeaderValue::from_str(&header.value).map_err(|_| {
                IggyClientError::configuration(format!(
                    "invalid value for header '{}'",
                    header.name
                ))
            })?;
            headers.append(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connection_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/streams/{stream}/topics/{topic}/messages`
    fn messages_url(&self, stream: &Identifier, topic: &Identifier) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IggyClientError::configuration("base address cannot carry a path"))?
            .pop_if_empty()
            .extend([
                "streams",
                &stream.to_string(),
                "topics",
                &topic.to_string(),
                "messages",
            ]);
        Ok(url)
    }

    fn poll_url(&self, request: &PollRequest) -> Result<Url> {
        let mut url = self.messages_url(&request.stream_id, &request.topic_id)?;
        url.query_pairs_mut()
            .append_pair("consumer_id", &request.consumer.id.to_string())
            .append_pair("partition_id", &request.partition_id.to_string())
            .append_pair("kind", &polling_kind_name(request)?)
            .append_pair("value", &request.strategy.value.to_string())
            .append_pair("count", &request.count.to_string())
            .append_pair("auto_commit", if request.auto_commit { "true" } else { "false" });
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let status = status.as_u16();
        match response.text().await {
            Ok(body) => Err(error_from_body(status, &body)),
            Err(e) => Err(IggyClientError::transport(
                status as u32,
                format!("HTTP {}: failed to read error body: {}", status, e),
            )),
        }
    }
}

#[async_trait]
impl MessageInvoker for HttpInvoker {
    async fn send_messages(&self, request: &SendRequest) -> Result<()> {
        let url = self.messages_url(request.stream_id(), request.topic_id())?;
        debug!(
            url = %url,
            messages = request.messages().len(),
            "Sending messages over HTTP"
        );

        let body = SendMessagesBody::from_request(request);
        let response = self.client.post(url).json(&body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn poll_messages(&self, request: &PollRequest) -> Result<PolledMessages> {
        let url = self.poll_url(request)?;
        let response = self.client.get(url).send().await?;
        let response = Self::check(response).await?;
        let body = response.bytes().await?;
        let polled: PolledMessagesBody = serde_json::from_slice(&body)?;
        Ok(polled.into())
    }
}
