//! Configuration types for the Iggy client

use std::fmt;
use std::time::Duration;

use crate::error::IggyClientError;
use crate::Result;

pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:8090";
pub const DEFAULT_HTTP_ADDRESS: &str = "http://127.0.0.1:3000";

/// Transport used to reach the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    Http,
    #[default]
    Tcp,
}

impl Protocol {
    pub fn default_address(&self) -> &'static str {
        match self {
            Protocol::Http => DEFAULT_HTTP_ADDRESS,
            Protocol::Tcp => DEFAULT_TCP_ADDRESS,
        }
    }
}

/// Capacity of the send channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCapacity {
    /// Enqueue waits (or `try_send_messages` fails) once this many requests are queued
    Bounded(usize),
    Unbounded,
}

impl Default for ChannelCapacity {
    fn default() -> Self {
        ChannelCapacity::Bounded(4096)
    }
}

/// Settings for the background batching dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalBatchingSettings {
    /// When false, every send goes straight to the transport
    pub enabled: bool,
    /// Dispatcher tick period
    pub interval: Duration,
    pub max_messages_per_batch: usize,
    /// Upper bound on requests drained per tick
    pub max_requests: usize,
    pub channel_capacity: ChannelCapacity,
}

impl Default for IntervalBatchingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(100),
            max_messages_per_batch: 1000,
            max_requests: 4096,
            channel_capacity: ChannelCapacity::default(),
        }
    }
}

impl IntervalBatchingSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(IggyClientError::configuration(
                "batching interval must be greater than zero",
            ));
        }
        if self.max_messages_per_batch == 0 {
            return Err(IggyClientError::configuration(
                "max_messages_per_batch must be greater than zero",
            ));
        }
        if self.max_requests == 0 {
            return Err(IggyClientError::configuration(
                "max_requests must be greater than zero",
            ));
        }
        if self.channel_capacity == ChannelCapacity::Bounded(0) {
            return Err(IggyClientError::configuration(
                "bounded channel capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Extra header sent with every HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A parsed `host:port` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    /// Parse `host:port`. Any extra `:`-separated segment is rejected.
    pub fn parse(address: &str) -> Result<Self> {
        let parts: Vec<&str> = address.split(':').collect();
        if parts.len() != 2 {
            return Err(IggyClientError::configuration(format!(
                "invalid base address '{}': expected host:port",
                address
            )));
        }

        let host = parts[0].trim();
        if host.is_empty() {
            return Err(IggyClientError::configuration(format!(
                "invalid base address '{}': empty host",
                address
            )));
        }

        let port = parts[1].trim().parse::<u16>().map_err(|_| {
            IggyClientError::configuration(format!(
                "invalid base address '{}': bad port '{}'",
                address, parts[1]
            ))
        })?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker address; `None` means the protocol's default
    pub base_address: Option<String>,
    pub protocol: Protocol,
    pub batching: IntervalBatchingSettings,
    /// TCP socket send buffer, in bytes
    pub send_buffer_size: u32,
    /// TCP socket receive buffer, in bytes
    pub receive_buffer_size: u32,
    pub headers: Vec<HttpHeader>,
    pub connection_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_address: None,
            protocol: Protocol::Tcp,
            batching: IntervalBatchingSettings::default(),
            send_buffer_size: 4096,
            receive_buffer_size: 4096,
            headers: Vec::new(),
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Configured address, falling back to the protocol default
    pub fn address(&self) -> &str {
        self.base_address
            .as_deref()
            .unwrap_or_else(|| self.protocol.default_address())
    }

    pub fn validate(&self) -> Result<()> {
        match self.protocol {
            Protocol::Tcp => {
                ServerAddress::parse(self.address())?;
            }
            Protocol::Http => {
                reqwest::Url::parse(self.address()).map_err(|e| {
                    IggyClientError::configuration(format!(
                        "invalid base address '{}': {}",
                        self.address(),
                        e
                    ))
                })?;
            }
        }

        if self.send_buffer_size == 0 || self.receive_buffer_size == 0 {
            return Err(IggyClientError::configuration(
                "socket buffer sizes must be greater than zero",
            ));
        }

        if self.batching.enabled {
            self.batching.validate()?;
        }
        Ok(())
    }
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_address<S: Into<String>>(mut self, address: S) -> Self {
        self.config.base_address = Some(address.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn batching(mut self, batching: IntervalBatchingSettings) -> Self {
        self.config.batching = batching;
        self
    }

    pub fn send_buffer_size(mut self, size: u32) -> Self {
        self.config.send_buffer_size = size;
        self
    }

    pub fn receive_buffer_size(mut self, size: u32) -> Self {
        self.config.receive_buffer_size = size;
        self
    }

    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.config.headers.push(HttpHeader::new(name, value));
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
