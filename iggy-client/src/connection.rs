//! TCP transport: one persistent socket to the broker
//!
//! The broker handles exactly one request/response pair at a time on a
//! connection, so every exchange holds the socket lock from the moment the
//! request frame is written until its response frame has been read.
//!
//! The socket is taken out of its slot for the duration of an exchange and
//! only put back once a whole response frame has been read. An exchange that
//! times out, fails on I/O or is dropped by its caller leaves the slot empty,
//! so a late response can never be read as the answer to a later request.
//! The next exchange opens a fresh connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{BinaryRecord, FrameCodec, TcpRequest, TcpResponse};
use crate::config::{ClientConfig, ServerAddress};
use crate::error::IggyClientError;
use crate::invoker::MessageInvoker;
use crate::protocol::{PollRequest, PolledMessages, SendRequest};
use crate::Result;

type FramedSocket = Framed<TcpStream, FrameCodec>;

/// Socket settings kept around for reconnecting
#[derive(Debug, Clone, Copy)]
struct SocketOptions {
    send_buffer_size: u32,
    receive_buffer_size: u32,
    connection_timeout: Duration,
}

impl SocketOptions {
    fn from_config(config: &ClientConfig) -> Self {
        Self {
            send_buffer_size: config.send_buffer_size,
            receive_buffer_size: config.receive_buffer_size,
            connection_timeout: config.connection_timeout,
        }
    }
}

/// Invoker speaking the binary protocol over a single TCP connection
#[derive(Debug)]
pub struct TcpInvoker {
    address: ServerAddress,
    options: SocketOptions,
    request_timeout: Duration,
    /// Empty after an abandoned exchange until the next one reconnects
    socket: Mutex<Option<FramedSocket>>,
}

impl TcpInvoker {
    /// Resolve the configured address and open the socket
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let address = ServerAddress::parse(config.address())?;
        let options = SocketOptions::from_config(config);
        debug!(address = %address, "Connecting to broker");

        let stream = Self::open(&address, options).await?;

        info!(address = %address, "Connected to broker");
        Ok(Self {
            address,
            options,
            request_timeout: config.request_timeout,
            socket: Mutex::new(Some(Framed::new(stream, FrameCodec::new()))),
        })
    }

    async fn open(address: &ServerAddress, options: SocketOptions) -> Result<TcpStream> {
        timeout(options.connection_timeout, Self::dial(address, options))
            .await
            .map_err(|_| IggyClientError::timeout(options.connection_timeout.as_millis() as u64))?
    }

    async fn dial(address: &ServerAddress, options: SocketOptions) -> Result<TcpStream> {
        let candidates = lookup_host((address.host.as_str(), address.port))
            .await
            .map_err(|e| {
                IggyClientError::connection(format!("Failed to resolve {}: {}", address, e))
            })?;

        let mut last_error = None;
        for addr in candidates {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_send_buffer_size(options.send_buffer_size)?;
            socket.set_recv_buffer_size(options.receive_buffer_size)?;

            match socket.connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(address = %addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(IggyClientError::connection(match last_error {
            Some(e) => format!("Failed to connect to {}: {}", address, e),
            None => format!("No addresses resolved for {}", address),
        }))
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Whether a usable socket is held right now
    pub async fn is_connected(&self) -> bool {
        self.socket.lock().await.is_some()
    }

    async fn reconnect(&self) -> Result<FramedSocket> {
        warn!(address = %self.address, "Previous exchange was abandoned, reconnecting");
        let stream = Self::open(&self.address, self.options).await?;
        info!(address = %self.address, "Reconnected to broker");
        Ok(Framed::new(stream, FrameCodec::new()))
    }

    /// Write one request frame and read its response under the socket lock.
    /// A non-zero status becomes a transport error.
    async fn exchange(&self, request: TcpRequest) -> Result<Bytes> {
        let command = request.command;
        let mut slot = self.socket.lock().await;
        let mut framed = match slot.take() {
            Some(framed) => framed,
            None => self.reconnect().await?,
        };

        let response = timeout(self.request_timeout, Self::round_trip(&mut framed, request))
            .await
            .map_err(|_| IggyClientError::timeout(self.request_timeout.as_millis() as u64))?;
        let response = match response {
            Ok(Some(response)) => response,
            Ok(None) => {
                return Err(IggyClientError::connection(format!(
                    "Connection to {} closed by broker",
                    self.address
                )))
            }
            Err(e) => return Err(e),
        };
        // A whole frame was read, the stream is in step again
        *slot = Some(framed);

        if response.status != 0 {
            let reason = if response.payload.is_empty() {
                format!("broker rejected command {}", command)
            } else {
                String::from_utf8_lossy(&response.payload).into_owned()
            };
            return Err(IggyClientError::transport(response.status, reason));
        }

        Ok(response.payload)
    }

    async fn round_trip(
        framed: &mut FramedSocket,
        request: TcpRequest,
    ) -> Result<Option<TcpResponse>> {
        framed.send(request).await?;
        framed.next().await.transpose()
    }
}

#[async_trait]
impl MessageInvoker for TcpInvoker {
    async fn send_messages(&self, request: &SendRequest) -> Result<()> {
        debug!(
            stream = %request.stream_id(),
            topic = %request.topic_id(),
            messages = request.messages().len(),
            "Sending messages over TCP"
        );
        self.exchange(TcpRequest::send_messages(request)?).await?;
        Ok(())
    }

    async fn poll_messages(&self, request: &PollRequest) -> Result<PolledMessages> {
        let payload = self.exchange(TcpRequest::poll_messages(request)?).await?;
        PolledMessages::from_bytes(payload)
    }
}
