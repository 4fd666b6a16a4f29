//! Interval batching dispatcher
//!
//! A background task wakes on a fixed period, drains whatever callers have
//! queued, repacks compatible requests into size-bounded batches and hands
//! each unit to the invoker. A unit that fails is reported and skipped; it
//! never stops the rest of the tick.
//!
//! The batching decisions ([`can_batch`], [`batch_messages`]) are pure and
//! the per-tick work lives on [`DispatchWorker`], so both can be driven
//! directly without a timer.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelDrain;
use crate::config::IntervalBatchingSettings;
use crate::error::IggyClientError;
use crate::invoker::MessageInvoker;
use crate::metrics::{ClientMetrics, Timer};
use crate::pool::BufferPool;
use crate::protocol::{Identifier, Partitioning, SendRequest};
use crate::Result;

/// True iff the run is non-empty, every request routes to an explicit
/// partition, and each adjacent pair shares stream, topic and partition.
pub fn can_batch(requests: &[SendRequest]) -> bool {
    !requests.is_empty()
        && requests
            .iter()
            .all(|request| matches!(request.partitioning(), Partitioning::PartitionId(_)))
        && requests
            .windows(2)
            .all(|pair| pair[0].same_target(&pair[1]))
}

/// Repack the messages of a batchable run into batches of at most
/// `max_per_batch` messages, preserving order across and within requests.
///
/// Every batch inherits the target of the first request; callers check
/// [`can_batch`] first.
pub fn batch_messages(
    requests: Vec<SendRequest>,
    max_per_batch: usize,
    pool: &BufferPool,
) -> Vec<SendRequest> {
    let template = match requests.first() {
        Some(first) => first.retarget(Vec::new()),
        None => return Vec::new(),
    };
    let max_per_batch = max_per_batch.max(1);
    let total: usize = requests.iter().map(|r| r.messages().len()).sum();

    let mut batches = Vec::with_capacity(total.div_ceil(max_per_batch));
    let mut buffer = pool.rent();
    for request in requests {
        for message in request.into_messages() {
            buffer.push(message);
            if buffer.len() == max_per_batch {
                batches.push(template.retarget(buffer.take_messages()));
            }
        }
    }
    if !buffer.is_empty() {
        batches.push(template.retarget(buffer.take_messages()));
    }
    batches
}

/// One unit the invoker rejected during a tick
#[derive(Debug)]
pub struct DispatchFailure {
    pub stream_id: Identifier,
    pub topic_id: Identifier,
    /// Only known for explicit partition routing
    pub partition_id: Option<u32>,
    pub messages: usize,
    pub error: IggyClientError,
}

impl DispatchFailure {
    fn new(unit: &SendRequest, error: IggyClientError) -> Self {
        Self {
            stream_id: unit.stream_id().clone(),
            topic_id: unit.topic_id().clone(),
            partition_id: unit.partitioning().partition(),
            messages: unit.messages().len(),
            error,
        }
    }

    /// Partition id for logs, `"unknown"` unless the unit used explicit routing
    pub fn partition_label(&self) -> String {
        match self.partition_id {
            Some(id) => id.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Called once per failed unit
pub type FailureHook = Arc<dyn Fn(&DispatchFailure) + Send + Sync>;

/// Default failure hook: one structured error event per failed unit
pub fn log_failure(failure: &DispatchFailure) {
    error!(
        stream = %failure.stream_id,
        topic = %failure.topic_id,
        partition = %failure.partition_label(),
        messages = failure.messages,
        error = %failure.error,
        "Failed to send messages"
    );
}

/// What one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    /// Requests taken off the channel
    pub drained: usize,
    /// Whether the drained run was repacked into batches
    pub batched: bool,
    /// Units the invoker accepted
    pub sent: usize,
    pub messages_sent: usize,
    pub failures: Vec<DispatchFailure>,
}

impl TickReport {
    /// Units handed to the invoker, successful or not
    pub fn units(&self) -> usize {
        self.sent + self.failures.len()
    }

    pub fn is_idle(&self) -> bool {
        self.drained == 0
    }
}

/// Owns the drain side of the channel and performs the work of one tick
pub struct DispatchWorker {
    settings: IntervalBatchingSettings,
    invoker: Arc<dyn MessageInvoker>,
    drain: ChannelDrain,
    pool: BufferPool,
    pending: Vec<SendRequest>,
    metrics: Arc<ClientMetrics>,
    on_failure: FailureHook,
}

impl DispatchWorker {
    pub fn new(
        settings: IntervalBatchingSettings,
        invoker: Arc<dyn MessageInvoker>,
        drain: ChannelDrain,
        pool: BufferPool,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        let pending = Vec::with_capacity(settings.max_requests.min(1024));
        Self {
            settings,
            invoker,
            drain,
            pool,
            pending,
            metrics,
            on_failure: Arc::new(log_failure),
        }
    }

    /// Replace the default logging hook
    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = hook;
        self
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Drain the channel once and send everything drained
    pub async fn tick(&mut self) -> TickReport {
        let drained = self
            .drain
            .drain_into(&mut self.pending, self.settings.max_requests);
        self.metrics.record_tick(drained);

        let mut report = TickReport {
            drained,
            ..TickReport::default()
        };
        if drained == 0 {
            return report;
        }

        let requests = std::mem::take(&mut self.pending);
        if can_batch(&requests) {
            report.batched = true;
            let batches = batch_messages(
                requests,
                self.settings.max_messages_per_batch,
                &self.pool,
            );
            debug!(drained, batches = batches.len(), "Dispatching batched messages");
            for batch in &batches {
                self.send_unit(batch, &mut report).await;
            }
        } else {
            debug!(drained, "Dispatching requests individually");
            for request in &requests {
                self.send_unit(request, &mut report).await;
            }
        }

        report
    }

    async fn send_unit(&self, unit: &SendRequest, report: &mut TickReport) {
        let timer = Timer::start();
        match self.invoker.send_messages(unit).await {
            Ok(()) => {
                self.metrics.record_send(unit.messages().len(), timer.elapsed());
                report.sent += 1;
                report.messages_sent += unit.messages().len();
            }
            Err(e) => {
                self.metrics.record_send_error();
                let failure = DispatchFailure::new(unit, e);
                (self.on_failure)(&failure);
                report.failures.push(failure);
            }
        }
    }

    /// Close the channel and drop anything still queued
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.drain.discard_pending();
        self.metrics.record_discarded(discarded);
        discarded
    }
}

impl fmt::Debug for DispatchWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("settings", &self.settings)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Lifecycle of the background task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Running,
    Stopped,
}

enum Lifecycle {
    Idle(DispatchWorker),
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Runs a [`DispatchWorker`] on a fixed interval
pub struct MessageDispatcher {
    interval: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl MessageDispatcher {
    pub fn new(worker: DispatchWorker, interval: Duration) -> Self {
        Self {
            interval,
            lifecycle: Mutex::new(Lifecycle::Idle(worker)),
        }
    }

    pub fn state(&self) -> DispatcherState {
        match &*self.lifecycle.lock() {
            Lifecycle::Idle(_) => DispatcherState::Idle,
            Lifecycle::Running { .. } => DispatcherState::Running,
            Lifecycle::Stopped => DispatcherState::Stopped,
        }
    }

    /// Spawn the tick loop. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            IggyClientError::dispatcher("dispatcher must be started inside a Tokio runtime")
        })?;

        let mut lifecycle = self.lifecycle.lock();
        let worker = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(worker) => worker,
            other => {
                let state = match other {
                    Lifecycle::Running { .. } => "running",
                    _ => "stopped",
                };
                *lifecycle = other;
                return Err(IggyClientError::dispatcher(format!(
                    "dispatcher cannot start, it is already {}",
                    state
                )));
            }
        };

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(Self::run(worker, self.interval, cancel.clone()));
        *lifecycle = Lifecycle::Running { cancel, handle };

        info!(interval_ms = self.interval.as_millis() as u64, "Message dispatcher started");
        Ok(())
    }

    /// Stop the tick loop. A tick already in progress finishes its sends
    /// first. Calling this before `start` does nothing.
    pub async fn stop(&self) {
        let running = {
            let mut lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Running { .. } => {
                    match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                        Lifecycle::Running { cancel, handle } => Some((cancel, handle)),
                        _ => None,
                    }
                }
                _ => None,
            }
        };

        if let Some((cancel, handle)) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatcher task ended abnormally");
            }
        }
    }

    async fn run(mut worker: DispatchWorker, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = worker.tick().await;
                    if !report.failures.is_empty() {
                        warn!(
                            units = report.units(),
                            failed = report.failures.len(),
                            "Dispatcher tick finished with failures"
                        );
                    }
                }
            }
        }

        let discarded = worker.discard_pending();
        if discarded > 0 {
            warn!(discarded, "Dispatcher stopped with queued requests, discarding them");
        }
        info!("Message dispatcher stopped");
    }
}

impl Drop for MessageDispatcher {
    fn drop(&mut self) {
        if let Lifecycle::Running { cancel, .. } = &*self.lifecycle.lock() {
            cancel.cancel();
        }
    }
}

impl fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish()
    }
}
