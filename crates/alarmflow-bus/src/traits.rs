//! Publisher and subscriber contracts.
//!
//! Both traits follow the same lifecycle: `initialize` once, use, then
//! `close` once. Every method is fallible and best-effort callers (the
//! DASU publish path) decide whether a failure is fatal.

use std::sync::Arc;

use async_trait::async_trait;
use fxhash::FxHashSet;

use alarmflow_types::IasValue;

use crate::error::BusError;

/// Callback invoked by a subscriber for every batch of decoded values.
///
/// The subscriber calls listeners synchronously on its polling task, so
/// implementations must hand work off quickly.
pub type ValueListener = Arc<dyn Fn(Vec<IasValue>) + Send + Sync>;

/// Sends values (and raw payloads such as heartbeats) to the bus.
#[async_trait]
pub trait OutputPublisher: Send + Sync {
    /// Connects to the bus. Called once before the first publish.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] when the brokers are not
    /// reachable and [`BusError::InvalidState`] on a second call.
    async fn initialize(&self) -> Result<(), BusError>;

    /// Publishes one value on the core topic.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PublishFailed`] on delivery failure.
    async fn publish(&self, value: &IasValue) -> Result<(), BusError>;

    /// Publishes a raw payload on an arbitrary topic (heartbeats).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PublishFailed`] on delivery failure.
    async fn publish_raw(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError>;

    /// Releases the connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PublishFailed`] when pending deliveries could
    /// not be flushed.
    async fn close(&self) -> Result<(), BusError>;
}

/// Receives values from the bus and forwards them to a listener.
#[async_trait]
pub trait InputSubscriber: Send + Sync {
    /// Connects to the bus. Called once before subscribing.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] when the brokers are not
    /// reachable and [`BusError::InvalidState`] on a second call.
    async fn initialize(&self) -> Result<(), BusError>;

    /// Starts forwarding values whose plain id is in `filter` to the
    /// listener. An empty filter accepts every value.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SubscribeFailed`] when the subscription
    /// cannot be established.
    async fn subscribe(
        &self,
        filter: FxHashSet<String>,
        listener: ValueListener,
    ) -> Result<(), BusError>;

    /// Stops the polling loop and releases the connection. Idempotent;
    /// waits a bounded time for the loop to drain, then cancels hard.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SubscribeFailed`] when shutdown did not
    /// complete cleanly.
    async fn close(&self) -> Result<(), BusError>;
}
