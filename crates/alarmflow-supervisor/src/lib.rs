//! The supervisor: process-level host of distributed units.
//!
//! One supervisor reads its deployment from the configuration store,
//! builds every DASU it must run, and sits between them and the bus:
//! inbound values are fanned out to the DASUs interested in them, DASU
//! outputs pass through to the single outbound topic, and a heartbeat
//! asserts process liveness on the side.
//!
//! DASUs never see the real bus. Each one publishes through a
//! pass-through handle and subscribes through a fan-out handle, both
//! backed by the supervisor; the supervisor owns the only real
//! subscription, restricted to the union of every DASU's inputs.

mod heartbeat;
mod settings;

pub use heartbeat::HeartbeatEngine;
pub use settings::Settings;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fxhash::FxHashSet;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use alarmflow_bus::{BusError, InputSubscriber, OutputPublisher, ValueListener};
use alarmflow_cdb::{CdbError, CdbReader};
use alarmflow_core::dasu::{Dasu, DasuError};
use alarmflow_core::stats::LoggingStats;
use alarmflow_core::TransferFunctionRegistry;
use alarmflow_types::clock::now_millis;
use alarmflow_types::heartbeat::HeartbeatStatus;
use alarmflow_types::identifier::IdentifierError;
use alarmflow_types::{IasValue, Identifier, IdentifierKind};

/// Errors raised while building or starting a supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The configuration store rejected a lookup.
    #[error(transparent)]
    Cdb(#[from] CdbError),

    /// A DASU could not be built or started.
    #[error(transparent)]
    Dasu(#[from] DasuError),

    /// The bus rejected an operation.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// An identifier in the configuration is invalid.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// `start` was called twice.
    #[error("supervisor already started")]
    AlreadyStarted,
}

/// Fan-out table: one `(dasu id, filter, listener)` row per hosted DASU.
#[derive(Default)]
struct FanOut {
    rows: Mutex<Vec<(String, FxHashSet<String>, ValueListener)>>,
}

impl FanOut {
    fn register(&self, dasu_id: String, filter: FxHashSet<String>, listener: ValueListener) {
        self.rows.lock().push((dasu_id, filter, listener));
    }

    /// Forwards to every DASU the subset of `values` it consumes,
    /// preserving batch arrival order.
    fn dispatch(&self, values: &[IasValue]) {
        let rows = self.rows.lock().clone();
        for (dasu_id, filter, listener) in rows {
            let subset: Vec<IasValue> = values
                .iter()
                .filter(|v| filter.contains(v.id()))
                .cloned()
                .collect();
            if !subset.is_empty() {
                debug!(dasu = %dasu_id, inputs = subset.len(), "fan-out");
                listener(subset);
            }
        }
    }
}

/// Inbound routing state shared with the bus subscription callback.
struct Router {
    fanout: FanOut,
    /// Values whose bus stamp is older than this are reported as a
    /// processing delay, milliseconds.
    liveness_threshold_ms: u64,
    received: AtomicU64,
}

impl Router {
    fn route(&self, values: Vec<IasValue>) {
        self.received
            .fetch_add(values.len() as u64, Ordering::Relaxed);
        let now = now_millis();
        for value in &values {
            if let Some(sent) = value.sent_to_bsdb {
                if now.saturating_sub(sent) > self.liveness_threshold_ms {
                    // Observation only: the age rule already degrades
                    // the validity of anything built from this value.
                    warn!(
                        id = %value.id(),
                        age_ms = now.saturating_sub(sent),
                        "supervisor too slow consuming the bus"
                    );
                }
            }
        }
        self.fanout.dispatch(&values);
    }
}

/// The DASU-facing publish handle: delegates to the supervisor's real
/// publisher, but its lifecycle calls are no-ops because the supervisor
/// owns the connection.
struct PassThroughPublisher {
    publisher: Arc<dyn OutputPublisher>,
}

#[async_trait]
impl OutputPublisher for PassThroughPublisher {
    async fn initialize(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn publish(&self, value: &IasValue) -> Result<(), BusError> {
        self.publisher.publish(value).await
    }

    async fn publish_raw(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        self.publisher.publish_raw(topic, key, payload).await
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// The DASU-facing subscription handle: registers the DASU's listener
/// in the supervisor's fan-out table.
struct FanOutSubscriber {
    dasu_id: String,
    router: Arc<Router>,
}

#[async_trait]
impl InputSubscriber for FanOutSubscriber {
    async fn initialize(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: FxHashSet<String>,
        listener: ValueListener,
    ) -> Result<(), BusError> {
        self.router
            .fanout
            .register(self.dasu_id.clone(), filter, listener);
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// A supervisor hosting the DASUs of one deployment entry.
pub struct Supervisor {
    identifier: Identifier,
    publisher: Arc<dyn OutputPublisher>,
    subscriber: Arc<dyn InputSubscriber>,
    heartbeat: HeartbeatEngine,
    dasus: Vec<Arc<Dasu>>,
    router: Arc<Router>,
    global_inputs: FxHashSet<String>,
    stats: Arc<LoggingStats>,
    stats_period: std::time::Duration,
    stats_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    cleaned: AtomicBool,
}

impl Supervisor {
    /// Reads the supervisor's deployment from the store and builds
    /// every DASU, wired to publish and subscribe through the
    /// supervisor.
    ///
    /// # Errors
    ///
    /// Returns a [`SupervisorError`] for unknown documents, template
    /// instances out of bounds, invalid topologies, unknown transfer
    /// function names, or functions failing to initialize. All of these
    /// are configuration errors: the process should exit.
    pub fn new(
        identifier: Identifier,
        cdb: &dyn CdbReader,
        publisher: Arc<dyn OutputPublisher>,
        subscriber: Arc<dyn InputSubscriber>,
        registry: &TransferFunctionRegistry,
        settings: &Settings,
    ) -> Result<Self, SupervisorError> {
        let config = cdb.supervisor(identifier.id())?;
        let refresh_ms =
            u64::try_from(settings.dasu_options.auto_send_period.as_millis()).unwrap_or(u64::MAX);
        let router = Arc::new(Router {
            fanout: FanOut::default(),
            liveness_threshold_ms: 2 * refresh_ms,
            received: AtomicU64::new(0),
        });
        let stats = LoggingStats::new();
        let sup_ident = Arc::new(identifier.clone());

        let mut dasus = Vec::with_capacity(config.dasus_to_deploy.len());
        let mut global_inputs = FxHashSet::default();
        for deploy in &config.dasus_to_deploy {
            let definition = cdb.resolved_dasu(deploy)?;
            let dasu_ident = Identifier::new(
                definition.id.clone(),
                IdentifierKind::Dasu,
                Some(Arc::clone(&sup_ident)),
            )?;
            let dasu = Dasu::new(
                dasu_ident,
                &definition,
                settings.dasu_options,
                registry,
                Arc::new(PassThroughPublisher {
                    publisher: Arc::clone(&publisher),
                }),
                Arc::new(FanOutSubscriber {
                    dasu_id: definition.id.clone(),
                    router: Arc::clone(&router),
                }),
                Arc::<LoggingStats>::clone(&stats),
            )?;
            global_inputs.extend(dasu.input_ids().iter().cloned());
            dasus.push(Arc::new(dasu));
        }
        info!(
            supervisor = %identifier,
            dasus = dasus.len(),
            inputs = global_inputs.len(),
            "supervisor built"
        );

        let heartbeat = HeartbeatEngine::new(
            identifier.full_running_id(),
            settings.hb_period,
            Arc::clone(&publisher),
        );

        Ok(Self {
            identifier,
            publisher,
            subscriber,
            heartbeat,
            dasus,
            router,
            global_inputs,
            stats,
            stats_period: settings.stats_period,
            stats_task: Mutex::new(None),
            started: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
        })
    }

    /// The supervisor identifier.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The union of every hosted DASU's input ids.
    #[must_use]
    pub fn global_inputs(&self) -> &FxHashSet<String> {
        &self.global_inputs
    }

    /// The hosted DASUs.
    #[must_use]
    pub fn dasus(&self) -> &[Arc<Dasu>] {
        &self.dasus
    }

    /// Starts the heartbeat, every DASU (with auto-refresh enabled) and
    /// the inbound subscription restricted to the global input set.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyStarted`] on a second call and
    /// any bus error from the connections; bus errors at this stage are
    /// fatal.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyStarted);
        }
        self.publisher.initialize().await?;
        self.heartbeat.start();

        for dasu in &self.dasus {
            dasu.start().await?;
            dasu.enable_auto_refresh(true);
        }

        self.subscriber.initialize().await?;
        let router = Arc::clone(&self.router);
        self.subscriber
            .subscribe(
                self.global_inputs.clone(),
                Arc::new(move |values| router.route(values)),
            )
            .await?;

        if !self.stats_period.is_zero() {
            let stats = Arc::<LoggingStats>::clone(&self.stats);
            let router = Arc::clone(&self.router);
            let scope = self.identifier.running_id();
            let period = self.stats_period;
            *self.stats_task.lock() = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let received = router.received.swap(0, Ordering::Relaxed);
                    info!(scope = %scope, received, "inbound statistics");
                    stats.log_summary(&scope);
                }
            }));
        }

        self.heartbeat.set_status(HeartbeatStatus::Running);
        info!(supervisor = %self.identifier, "supervisor started");
        Ok(())
    }

    /// Feeds a batch as if it had been read from the bus: fan-out to
    /// the hosted DASUs plus the liveness check.
    pub fn inputs_received(&self, values: Vec<IasValue>) {
        self.router.route(values);
    }

    /// Publishes a value on the outbound topic on behalf of a hosted
    /// DASU (the pass-through handles delegate here through the shared
    /// publisher).
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Bus`] on delivery failure; callers
    /// treat publication as best-effort.
    pub async fn publish(&self, value: &IasValue) -> Result<(), SupervisorError> {
        self.publisher.publish(value).await.map_err(Into::into)
    }

    /// Orderly shutdown: statistics, heartbeat to exiting, DASUs,
    /// subscriber, heartbeat, publisher. Idempotent; installed on the
    /// process termination signals by the binary.
    pub async fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(supervisor = %self.identifier, "supervisor shutting down");
        let stats_task = self.stats_task.lock().take();
        if let Some(task) = stats_task {
            task.abort();
        }
        self.stats.log_summary(&self.identifier.running_id());

        self.heartbeat.set_status(HeartbeatStatus::Exiting);
        for dasu in &self.dasus {
            dasu.cleanup().await;
        }
        if let Err(e) = self.subscriber.close().await {
            warn!(error = %e, "subscriber close failed");
        }
        // The final beat needs the publisher, so the publisher closes
        // last.
        self.heartbeat.shutdown().await;
        if let Err(e) = self.publisher.close().await {
            warn!(error = %e, "publisher close failed");
        }
        info!(supervisor = %self.identifier, "supervisor shut down");
    }
}
