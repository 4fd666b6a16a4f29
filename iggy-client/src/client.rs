//! High-level client interface

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::channel::{send_channel, SendChannel};
use crate::config::{ClientConfig, ClientConfigBuilder, IntervalBatchingSettings, Protocol};
use crate::dispatcher::{DispatchWorker, DispatcherState, FailureHook, MessageDispatcher};
use crate::error::IggyClientError;
use crate::invoker::{MessageInvoker, TransportInvoker};
use crate::metrics::{ClientMetrics, MetricsSnapshot, Timer};
use crate::pool::{BufferPool, PoolStats};
use crate::protocol::{Identifier, Message, Partitioning, PollRequest, PolledMessages, SendRequest};
use crate::Result;

/// Idle batch buffers kept by the dispatcher's pool
const IDLE_BATCH_BUFFERS: usize = 16;

struct Batching {
    channel: SendChannel,
    dispatcher: MessageDispatcher,
    pool: BufferPool,
}

/// Main client for sending to and polling from an Iggy broker.
///
/// With batching enabled, sends are queued and flushed by a background
/// dispatcher; errors for queued sends are logged by the dispatcher, not
/// returned to the caller. With batching disabled every send goes straight
/// to the transport and its error comes back from the call.
pub struct IggyClient {
    invoker: Arc<dyn MessageInvoker>,
    batching: Option<Batching>,
    metrics: Arc<ClientMetrics>,
}

impl IggyClient {
    /// Connect with the given configuration
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let invoker = TransportInvoker::connect(&config).await?;
        info!(
            address = config.address(),
            protocol = ?invoker.protocol(),
            batching = config.batching.enabled,
            "Iggy client connected"
        );
        Self::with_invoker(config.batching, Arc::new(invoker))
    }

    /// Wire a client around an existing invoker
    pub fn with_invoker(
        settings: IntervalBatchingSettings,
        invoker: Arc<dyn MessageInvoker>,
    ) -> Result<Self> {
        Self::assemble(settings, invoker, None)
    }

    fn assemble(
        settings: IntervalBatchingSettings,
        invoker: Arc<dyn MessageInvoker>,
        failure_hook: Option<FailureHook>,
    ) -> Result<Self> {
        let metrics = Arc::new(ClientMetrics::default());
        if !settings.enabled {
            return Ok(Self {
                invoker,
                batching: None,
                metrics,
            });
        }

        settings.validate()?;
        let (channel, drain) = send_channel(settings.channel_capacity);
        let pool = BufferPool::new(settings.max_messages_per_batch, IDLE_BATCH_BUFFERS);
        let interval = settings.interval;

        let mut worker = DispatchWorker::new(
            settings,
            Arc::clone(&invoker),
            drain,
            pool.clone(),
            Arc::clone(&metrics),
        );
        if let Some(hook) = failure_hook {
            worker = worker.with_failure_hook(hook);
        }

        let dispatcher = MessageDispatcher::new(worker, interval);
        dispatcher.start()?;

        Ok(Self {
            invoker,
            batching: Some(Batching {
                channel,
                dispatcher,
                pool,
            }),
            metrics,
        })
    }

    /// Send messages to a stream/topic.
    ///
    /// Queues the request when batching is enabled, waiting for space if the
    /// channel is bounded and full. Otherwise performs exactly one transport
    /// call carrying exactly these messages.
    pub async fn send_messages(
        &self,
        stream_id: Identifier,
        topic_id: Identifier,
        partitioning: Partitioning,
        messages: Vec<Message>,
    ) -> Result<()> {
        let request = SendRequest::new(stream_id, topic_id, partitioning, messages)?;
        match &self.batching {
            Some(batching) => batching.channel.enqueue(request).await,
            None => self.send_direct(&request).await,
        }
    }

    /// Queue messages without waiting; a full bounded channel fails with
    /// [`IggyClientError::ChannelFull`]. Requires batching.
    pub fn try_send_messages(
        &self,
        stream_id: Identifier,
        topic_id: Identifier,
        partitioning: Partitioning,
        messages: Vec<Message>,
    ) -> Result<()> {
        let batching = self.batching.as_ref().ok_or_else(|| {
            IggyClientError::dispatcher("batching is disabled, use send_messages")
        })?;
        let request = SendRequest::new(stream_id, topic_id, partitioning, messages)?;
        batching.channel.try_enqueue(request)
    }

    async fn send_direct(&self, request: &SendRequest) -> Result<()> {
        let timer = Timer::start();
        match self.invoker.send_messages(request).await {
            Ok(()) => {
                self.metrics
                    .record_send(request.messages().len(), timer.elapsed());
                Ok(())
            }
            Err(e) => {
                self.metrics.record_send_error();
                Err(e)
            }
        }
    }

    /// Read messages from one partition
    pub async fn poll_messages(&self, request: &PollRequest) -> Result<PolledMessages> {
        match self.invoker.poll_messages(request).await {
            Ok(polled) => {
                debug!(
                    stream = %request.stream_id,
                    topic = %request.topic_id,
                    partition = request.partition_id,
                    messages = polled.messages.len(),
                    "Polled messages"
                );
                self.metrics.record_poll(polled.messages.len());
                Ok(polled)
            }
            Err(e) => {
                self.metrics.record_poll_error();
                Err(e)
            }
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batching.is_some()
    }

    pub fn dispatcher_state(&self) -> Option<DispatcherState> {
        self.batching
            .as_ref()
            .map(|batching| batching.dispatcher.state())
    }

    /// Stop the dispatcher. Requests still queued are discarded.
    pub async fn shutdown(&self) {
        if let Some(batching) = &self.batching {
            batching.dispatcher.stop().await;
        }
        info!("Iggy client shut down");
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn buffer_pool_stats(&self) -> Option<PoolStats> {
        self.batching.as_ref().map(|batching| batching.pool.stats())
    }
}

impl std::fmt::Debug for IggyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IggyClient")
            .field("batching", &self.is_batching())
            .field("dispatcher", &self.dispatcher_state())
            .finish()
    }
}

/// Builder for IggyClient
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfigBuilder,
    invoker: Option<Arc<dyn MessageInvoker>>,
    failure_hook: Option<FailureHook>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_address<S: Into<String>>(mut self, address: S) -> Self {
        self.config = self.config.base_address(address);
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config = self.config.protocol(protocol);
        self
    }

    pub fn batching(mut self, batching: IntervalBatchingSettings) -> Self {
        self.config = self.config.batching(batching);
        self
    }

    /// Send every request directly instead of queueing it
    pub fn without_batching(self) -> Self {
        self.batching(IntervalBatchingSettings::disabled())
    }

    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.config = self.config.header(name, value);
        self
    }

    pub fn socket_buffer_sizes(mut self, send: u32, receive: u32) -> Self {
        self.config = self.config.send_buffer_size(send).receive_buffer_size(receive);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connection_timeout(timeout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.request_timeout(timeout);
        self
    }

    /// Use this invoker instead of connecting a transport
    pub fn invoker(mut self, invoker: Arc<dyn MessageInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Called for every unit the dispatcher fails to send, instead of logging
    pub fn failure_hook(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    pub async fn build(self) -> Result<IggyClient> {
        let config = self.config.build();
        let invoker: Arc<dyn MessageInvoker> = match self.invoker {
            Some(invoker) => invoker,
            None => {
                config.validate()?;
                Arc::new(TransportInvoker::connect(&config).await?)
            }
        };
        IggyClient::assemble(config.batching, invoker, self.failure_hook)
    }
}
