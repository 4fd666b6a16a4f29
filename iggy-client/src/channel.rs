//! Send channel between callers and the batching dispatcher
//!
//! Any number of tasks hold a cloned [`SendChannel`]; the dispatcher owns the
//! single [`ChannelDrain`]. Arrival order is FIFO per caller.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::config::ChannelCapacity;
use crate::error::IggyClientError;
use crate::protocol::SendRequest;
use crate::Result;

#[derive(Debug, Clone)]
enum Sender {
    Bounded(mpsc::Sender<SendRequest>),
    Unbounded(mpsc::UnboundedSender<SendRequest>),
}

#[derive(Debug)]
enum Receiver {
    Bounded(mpsc::Receiver<SendRequest>),
    Unbounded(mpsc::UnboundedReceiver<SendRequest>),
}

/// Create a connected channel pair
pub fn send_channel(capacity: ChannelCapacity) -> (SendChannel, ChannelDrain) {
    let (sender, receiver) = match capacity {
        ChannelCapacity::Bounded(size) => {
            let (tx, rx) = mpsc::channel(size.max(1));
            (Sender::Bounded(tx), Receiver::Bounded(rx))
        }
        ChannelCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Sender::Unbounded(tx), Receiver::Unbounded(rx))
        }
    };

    (
        SendChannel { sender, capacity },
        ChannelDrain { receiver },
    )
}

/// Producer side of the send channel
#[derive(Debug, Clone)]
pub struct SendChannel {
    sender: Sender,
    capacity: ChannelCapacity,
}

impl SendChannel {
    /// Enqueue a request, waiting for space if the channel is bounded and full
    pub async fn enqueue(&self, request: SendRequest) -> Result<()> {
        match &self.sender {
            Sender::Bounded(tx) => tx
                .send(request)
                .await
                .map_err(|_| IggyClientError::ChannelClosed),
            Sender::Unbounded(tx) => tx
                .send(request)
                .map_err(|_| IggyClientError::ChannelClosed),
        }
    }

    /// Enqueue without waiting; a full bounded channel rejects the request
    pub fn try_enqueue(&self, request: SendRequest) -> Result<()> {
        match &self.sender {
            Sender::Bounded(tx) => tx.try_send(request).map_err(|e| match e {
                TrySendError::Full(_) => IggyClientError::ChannelFull {
                    capacity: tx.max_capacity(),
                },
                TrySendError::Closed(_) => IggyClientError::ChannelClosed,
            }),
            Sender::Unbounded(tx) => tx
                .send(request)
                .map_err(|_| IggyClientError::ChannelClosed),
        }
    }

    pub fn capacity(&self) -> ChannelCapacity {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        match &self.sender {
            Sender::Bounded(tx) => tx.is_closed(),
            Sender::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Dispatcher side of the send channel
#[derive(Debug)]
pub struct ChannelDrain {
    receiver: Receiver,
}

impl ChannelDrain {
    fn try_next(&mut self) -> Option<SendRequest> {
        let next = match &mut self.receiver {
            Receiver::Bounded(rx) => rx.try_recv(),
            Receiver::Unbounded(rx) => rx.try_recv(),
        };
        match next {
            Ok(request) => Some(request),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Move up to `max` queued requests into `buffer` without waiting.
    /// Returns how many were moved.
    pub fn drain_into(&mut self, buffer: &mut Vec<SendRequest>, max: usize) -> usize {
        let mut drained = 0;
        while drained < max {
            match self.try_next() {
                Some(request) => {
                    buffer.push(request);
                    drained += 1;
                }
                None => break,
            }
        }
        drained
    }

    /// Close the channel and drop whatever is still queued.
    /// Returns the number of requests discarded.
    pub fn discard_pending(&mut self) -> usize {
        match &mut self.receiver {
            Receiver::Bounded(rx) => rx.close(),
            Receiver::Unbounded(rx) => rx.close(),
        }
        let mut discarded = 0;
        while self.try_next().is_some() {
            discarded += 1;
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Identifier, Message, Partitioning};
    use std::time::Duration;

    fn request(id: u128) -> SendRequest {
        SendRequest::new(
            Identifier::numeric(1),
            Identifier::numeric(1),
            Partitioning::partition_id(1),
            vec![Message::with_id(id, "x")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_drain_respects_max_and_order() {
        let (channel, mut drain) = send_channel(ChannelCapacity::Bounded(16));
        for id in 0..5 {
            channel.enqueue(request(id)).await.unwrap();
        }

        let mut buffer = Vec::new();
        assert_eq!(drain.drain_into(&mut buffer, 3), 3);
        assert_eq!(drain.drain_into(&mut buffer, 3), 2);
        assert_eq!(drain.drain_into(&mut buffer, 3), 0);

        let ids: Vec<u128> = buffer.iter().map(|r| r.messages()[0].id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_try_enqueue_rejects_when_full() {
        let (channel, mut drain) = send_channel(ChannelCapacity::Bounded(2));
        channel.try_enqueue(request(1)).unwrap();
        channel.try_enqueue(request(2)).unwrap();

        let err = channel.try_enqueue(request(3)).unwrap_err();
        assert!(matches!(err, IggyClientError::ChannelFull { capacity: 2 }));

        let mut buffer = Vec::new();
        drain.drain_into(&mut buffer, 1);
        channel.try_enqueue(request(3)).unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_waits_for_space() {
        let (channel, mut drain) = send_channel(ChannelCapacity::Bounded(1));
        channel.enqueue(request(1)).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), channel.enqueue(request(2))).await;
        assert!(blocked.is_err());

        let mut buffer = Vec::new();
        drain.drain_into(&mut buffer, 1);
        tokio::time::timeout(Duration::from_millis(50), channel.enqueue(request(2)))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_never_rejects() {
        let (channel, _drain) = send_channel(ChannelCapacity::Unbounded);
        for id in 0..10_000 {
            channel.try_enqueue(request(id)).unwrap();
        }
    }

    #[tokio::test]
    async fn test_discard_pending_closes_channel() {
        let (channel, mut drain) = send_channel(ChannelCapacity::Bounded(8));
        channel.enqueue(request(1)).await.unwrap();
        channel.enqueue(request(2)).await.unwrap();

        assert_eq!(drain.discard_pending(), 2);
        assert!(matches!(
            channel.enqueue(request(3)).await,
            Err(IggyClientError::ChannelClosed)
        ));
    }
}
