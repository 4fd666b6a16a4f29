//! # Iggy Client Library
//!
//! An async Rust client for the Iggy message streaming broker, speaking
//! either its HTTP (JSON) or TCP (binary) protocol.
//!
//! ## Features
//!
//! - **Interval Batching**: sends are queued and flushed on a fixed period,
//!   compatible requests repacked into size-bounded batches
//! - **Failure Isolation**: one rejected batch never blocks the rest of a flush
//! - **Backpressure**: bounded send channel, with a non-blocking variant
//! - **Bit-exact Codec**: little-endian wire records with checked decoding
//! - **Two Transports**: HTTP via reqwest, TCP over one persistent socket
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iggy_client::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = ClientBuilder::new()
//!         .base_address("127.0.0.1:8090")
//!         .protocol(Protocol::Tcp)
//!         .build()
//!         .await?;
//!
//!     client
//!         .send_messages(
//!             Identifier::numeric(1),
//!             Identifier::named("orders")?,
//!             Partitioning::partition_id(1),
//!             vec![Message::new("Hello Iggy!")],
//!         )
//!         .await?;
//!
//!     let polled = client
//!         .poll_messages(&PollRequest {
//!             consumer: Consumer::new(1),
//!             stream_id: Identifier::numeric(1),
//!             topic_id: Identifier::named("orders")?,
//!             partition_id: 1,
//!             strategy: PollingStrategy::first(),
//!             count: 10,
//!             auto_commit: true,
//!         })
//!         .await?;
//!     println!("Polled {} messages", polled.messages.len());
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod invoker;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod records;

pub use client::*;
pub use codec::BinaryRecord;
pub use config::*;
pub use dispatcher::{can_batch, batch_messages, DispatchFailure, DispatcherState, TickReport};
pub use error::*;
pub use invoker::{MessageInvoker, TransportInvoker};
pub use metrics::MetricsSnapshot;
pub use protocol::*;
pub use records::*;

/// Client library result type
pub type Result<T> = std::result::Result<T, IggyClientError>;

/// Client library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
