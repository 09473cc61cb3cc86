//! The distributed unit (DASU).
//!
//! A DASU is a single-owner component: every mutation of its buffers,
//! elements and memo happens on one serialization task, fed by a command
//! channel. Two timers post back onto the same task: the periodic
//! auto-refresh and the at-most-one throttling one-shot that coalesces
//! input bursts into one propagation per window.

mod core;

pub use self::core::DasuCore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fxhash::FxHashSet;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use alarmflow_bus::{BusError, InputSubscriber, OutputPublisher};
use alarmflow_cdb::DasuDefinition;
use alarmflow_types::clock::now_millis;
use alarmflow_types::identifier::IdentifierError;
use alarmflow_types::{IasValue, Identifier};

use crate::asce::AsceError;
use crate::stats::StatsSink;
use crate::topology::TopologyError;
use crate::transfer::{TransferError, TransferFunctionRegistry};

/// Errors raised while building, starting or running a DASU.
#[derive(Debug, thiserror::Error)]
pub enum DasuError {
    /// The ASCE definitions do not form a valid topology.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// A transfer function could not be created or configured.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// A computing element could not be built.
    #[error(transparent)]
    Asce(#[from] AsceError),

    /// An identifier in the definition is invalid.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// A transfer function failed to initialize.
    #[error("transfer function of '{asce_id}' failed to initialize")]
    TransferFunctionInit {
        /// The element whose function is broken.
        asce_id: String,
    },

    /// `start` was called twice.
    #[error("DASU already started")]
    AlreadyStarted,

    /// The bus rejected an operation during startup or shutdown.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Runtime knobs of a DASU.
#[derive(Debug, Clone, Copy)]
pub struct DasuOptions {
    /// Period of the auto-refresh re-publication.
    pub auto_send_period: Duration,
    /// Tolerance added to the period by the validity age rule.
    pub tolerance: Duration,
    /// Minimum interval between two propagations; bursts inside one
    /// interval coalesce.
    pub throttling_min_interval: Duration,
}

impl Default for DasuOptions {
    fn default() -> Self {
        Self {
            auto_send_period: Duration::from_secs(5),
            tolerance: Duration::from_secs(1),
            throttling_min_interval: Duration::from_millis(250),
        }
    }
}

impl DasuOptions {
    /// The age threshold applied to published outputs, milliseconds.
    #[must_use]
    pub fn validity_threshold_ms(&self) -> u64 {
        u64::try_from((self.auto_send_period + self.tolerance).as_millis()).unwrap_or(u64::MAX)
    }
}

enum Command {
    Inputs(Vec<IasValue>),
    EnableAutoRefresh(bool),
    Cleanup(oneshot::Sender<()>),
}

/// A distributed unit: the handle owning the serialization task.
pub struct Dasu {
    identifier: Identifier,
    input_ids: FxHashSet<String>,
    options: DasuOptions,
    publisher: Arc<dyn OutputPublisher>,
    subscriber: Arc<dyn InputSubscriber>,
    stats: Arc<dyn StatsSink>,
    core: Mutex<Option<DasuCore>>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    started: AtomicBool,
    cleaned: AtomicBool,
    refresh_on_start: AtomicBool,
}

impl Dasu {
    /// Builds the DASU: topology, computing elements and transfer
    /// function initialization all happen here, so an invalid
    /// configuration fails before anything touches the bus.
    ///
    /// # Errors
    ///
    /// Returns a [`DasuError`] for any configuration problem.
    pub fn new(
        identifier: Identifier,
        definition: &DasuDefinition,
        options: DasuOptions,
        registry: &TransferFunctionRegistry,
        publisher: Arc<dyn OutputPublisher>,
        subscriber: Arc<dyn InputSubscriber>,
        stats: Arc<dyn StatsSink>,
    ) -> Result<Self, DasuError> {
        let core = DasuCore::new(
            identifier.clone(),
            definition,
            registry,
            options.validity_threshold_ms(),
        )?;
        let input_ids = core.dasu_inputs();
        Ok(Self {
            identifier,
            input_ids,
            options,
            publisher,
            subscriber,
            stats,
            core: Mutex::new(Some(core)),
            cmd_tx: Mutex::new(None),
            started: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
            refresh_on_start: AtomicBool::new(false),
        })
    }

    /// The DASU identifier.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The external input ids this DASU consumes.
    #[must_use]
    pub fn input_ids(&self) -> &FxHashSet<String> {
        &self.input_ids
    }

    /// Initializes the publisher and subscriber, spawns the
    /// serialization task and subscribes to the DASU inputs.
    ///
    /// # Errors
    ///
    /// Returns [`DasuError::AlreadyStarted`] on a second call and
    /// [`DasuError::Bus`] when the bus rejects initialization; both
    /// leave the DASU unusable.
    pub async fn start(&self) -> Result<(), DasuError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DasuError::AlreadyStarted);
        }
        self.publisher.initialize().await?;
        self.subscriber.initialize().await?;

        let core = self
            .core
            .lock()
            .take()
            .expect("core present until first start");
        let (tx, rx) = mpsc::unbounded_channel();
        *self.cmd_tx.lock() = Some(tx.clone());

        let task = DasuTask {
            core,
            options: self.options,
            publisher: Arc::clone(&self.publisher),
            stats: Arc::clone(&self.stats),
            refresh_enabled: false,
            refresh_deadline: None,
            throttle_deadline: None,
            last_update: None,
        };
        tokio::spawn(task.run(rx));

        if self.refresh_on_start.load(Ordering::SeqCst) {
            let _ = tx.send(Command::EnableAutoRefresh(true));
        }

        let listener_tx = tx;
        self.subscriber
            .subscribe(
                self.input_ids.clone(),
                Arc::new(move |values| {
                    let _ = listener_tx.send(Command::Inputs(values));
                }),
            )
            .await?;
        info!(dasu = %self.identifier, inputs = self.input_ids.len(), "DASU started");
        Ok(())
    }

    /// Toggles the periodic re-publication of the last output. May be
    /// called before `start`.
    pub fn enable_auto_refresh(&self, enabled: bool) {
        self.refresh_on_start.store(enabled, Ordering::SeqCst);
        if let Some(tx) = self.cmd_tx.lock().as_ref() {
            let _ = tx.send(Command::EnableAutoRefresh(enabled));
        }
    }

    /// Hands a batch of inputs to the serialization task. Entry point
    /// for fan-out callers that bypass the subscriber.
    pub fn inputs_received(&self, values: Vec<IasValue>) {
        if let Some(tx) = self.cmd_tx.lock().as_ref() {
            let _ = tx.send(Command::Inputs(values));
        }
    }

    /// Stops the task, releases the subscriber then the publisher and
    /// shuts every element down. Idempotent.
    pub async fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        let tx = self.cmd_tx.lock().take();
        if let Some(tx) = tx {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Command::Cleanup(ack_tx)).is_ok() {
                let _ = tokio::time::timeout(Duration::from_secs(10), ack_rx).await;
            }
        }
        if let Err(e) = self.subscriber.close().await {
            warn!(dasu = %self.identifier, error = %e, "subscriber close failed");
        }
        if let Err(e) = self.publisher.close().await {
            warn!(dasu = %self.identifier, error = %e, "publisher close failed");
        }
        info!(dasu = %self.identifier, "DASU cleaned up");
    }
}

/// The serialization task: sole owner of the core after start.
struct DasuTask {
    core: DasuCore,
    options: DasuOptions,
    publisher: Arc<dyn OutputPublisher>,
    stats: Arc<dyn StatsSink>,
    refresh_enabled: bool,
    refresh_deadline: Option<Instant>,
    throttle_deadline: Option<Instant>,
    last_update: Option<Instant>,
}

impl DasuTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    None => break,
                    Some(Command::Inputs(values)) => self.on_inputs(values).await,
                    Some(Command::EnableAutoRefresh(enabled)) => {
                        self.refresh_enabled = enabled;
                        self.refresh_deadline = enabled
                            .then(|| Instant::now() + self.options.auto_send_period);
                        debug!(enabled, "auto-refresh toggled");
                    }
                    Some(Command::Cleanup(ack)) => {
                        self.refresh_enabled = false;
                        self.refresh_deadline = None;
                        self.throttle_deadline = None;
                        self.core.shutdown();
                        let _ = ack.send(());
                        break;
                    }
                },
                () = tokio::time::sleep_until(self.throttle_deadline.unwrap_or_else(Instant::now)),
                    if self.throttle_deadline.is_some() =>
                {
                    self.throttle_deadline = None;
                    self.propagate_and_publish().await;
                },
                () = tokio::time::sleep_until(self.refresh_deadline.unwrap_or_else(Instant::now)),
                    if self.refresh_deadline.is_some() =>
                {
                    self.refresh_deadline = Some(Instant::now() + self.options.auto_send_period);
                    self.refresh().await;
                },
            }
        }
        debug!("DASU task terminated");
    }

    /// Buffers a batch and decides between immediate and throttled
    /// propagation.
    async fn on_inputs(&mut self, values: Vec<IasValue>) {
        if self.core.buffer_inputs(values) == 0 {
            return;
        }
        if self.throttle_deadline.is_some() {
            // The scheduled one-shot will drain the buffer.
            return;
        }
        let now = Instant::now();
        match self.last_update {
            Some(last) if now.duration_since(last) < self.options.throttling_min_interval => {
                self.throttle_deadline = Some(last + self.options.throttling_min_interval);
            }
            _ => self.propagate_and_publish().await,
        }
    }

    /// Runs one propagation over the buffered inputs and publishes the
    /// output if it changed.
    async fn propagate_and_publish(&mut self) {
        let started = Instant::now();
        let (candidate, drained) = self.core.process(now_millis());
        self.last_update = Some(Instant::now());
        if drained > 0 {
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.stats.propagation(elapsed, drained);
        }
        if let Some(value) = candidate {
            self.publish(&value).await;
        }
    }

    /// Re-publishes the last output with recomputed validity.
    async fn refresh(&mut self) {
        if let Some(value) = self.core.refresh(now_millis()) {
            self.publish(&value).await;
        }
    }

    async fn publish(&mut self, value: &IasValue) {
        match self.publisher.publish(value).await {
            Ok(()) => self.stats.published(),
            Err(e) => {
                // Best effort: the auto-refresh will re-send.
                warn!(id = %value.id(), error = %e, "publish failed");
            }
        }
        if self.refresh_enabled {
            self.refresh_deadline = Some(Instant::now() + self.options.auto_send_period);
        }
    }
}
