//! Heartbeat engine.
//!
//! Emits the supervisor's liveness on the heartbeat topic at a fixed
//! wall-clock period, independently of whether any DASU is processing:
//! the beat asserts that the process is alive, not that it is busy.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use alarmflow_bus::{OutputPublisher, HEARTBEAT_TOPIC};
use alarmflow_types::clock::now_millis;
use alarmflow_types::heartbeat::{Heartbeat, HeartbeatStatus};

/// Periodic emitter of [`Heartbeat`] messages.
pub struct HeartbeatEngine {
    id: String,
    period: Duration,
    publisher: Arc<dyn OutputPublisher>,
    status: Arc<Mutex<HeartbeatStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatEngine {
    /// An engine beating under the given full running id.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        period: Duration,
        publisher: Arc<dyn OutputPublisher>,
    ) -> Self {
        Self {
            id: id.into(),
            period,
            publisher,
            status: Arc::new(Mutex::new(HeartbeatStatus::StartingUp)),
            task: Mutex::new(None),
        }
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> HeartbeatStatus {
        *self.status.lock()
    }

    /// Changes the status carried by subsequent beats.
    pub fn set_status(&self, status: HeartbeatStatus) {
        *self.status.lock() = status;
        debug!(?status, "heartbeat status changed");
    }

    /// Starts beating. A second call replaces the previous task.
    pub fn start(&self) {
        let id = self.id.clone();
        let period = self.period;
        let publisher = Arc::clone(&self.publisher);
        let status = Arc::clone(&self.status);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let current_status = *status.lock();
                emit(&publisher, &id, current_status).await;
            }
        });
        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Emits one final `ShutDown` beat and stops the task. Idempotent.
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        self.set_status(HeartbeatStatus::ShutDown);
        emit(&self.publisher, &self.id, HeartbeatStatus::ShutDown).await;
    }
}

async fn emit(publisher: &Arc<dyn OutputPublisher>, id: &str, status: HeartbeatStatus) {
    let beat = Heartbeat::new(id, now_millis(), status);
    match beat.encode() {
        Ok(payload) => {
            if let Err(e) = publisher.publish_raw(HEARTBEAT_TOPIC, id, &payload).await {
                warn!(error = %e, "heartbeat publish failed");
            }
        }
        Err(e) => warn!(error = %e, "heartbeat encode failed"),
    }
}
