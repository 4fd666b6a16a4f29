//! Transport invocation seam
//!
//! The dispatcher and the client only ever talk to a [`MessageInvoker`]. The
//! concrete transport is picked once, when the client is built.

use async_trait::async_trait;

use crate::config::{ClientConfig, Protocol};
use crate::connection::TcpInvoker;
use crate::http::HttpInvoker;
use crate::protocol::{PollRequest, PolledMessages, SendRequest};
use crate::Result;

/// Performs the actual network call for a send or a poll
#[async_trait]
pub trait MessageInvoker: Send + Sync {
    /// Send one request or batch; succeeds only if the broker accepted it
    async fn send_messages(&self, request: &SendRequest) -> Result<()>;

    /// Read messages from one partition
    async fn poll_messages(&self, request: &PollRequest) -> Result<PolledMessages>;
}

/// The two transports the broker speaks
#[derive(Debug)]
pub enum TransportInvoker {
    Http(HttpInvoker),
    Tcp(TcpInvoker),
}

impl TransportInvoker {
    /// Build the transport selected by `config.protocol`
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        match config.protocol {
            Protocol::Http => Ok(Self::Http(HttpInvoker::new(config)?)),
            Protocol::Tcp => Ok(Self::Tcp(TcpInvoker::connect(config).await?)),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http(_) => Protocol::Http,
            Self::Tcp(_) => Protocol::Tcp,
        }
    }
}

#[async_trait]
impl MessageInvoker for TransportInvoker {
    async fn send_messages(&self, request: &SendRequest) -> Result<()> {
        match self {
            Self::Http(invoker) => invoker.send_messages(request).await,
            Self::Tcp(invoker) => invoker.send_messages(request).await,
        }
    }

    async fn poll_messages(&self, request: &PollRequest) -> Result<PolledMessages> {
        match self {
            Self::Http(invoker) => invoker.poll_messages(request).await,
            Self::Tcp(invoker) => invoker.poll_messages(request).await,
        }
    }
}
