//! In-process bus used by tests and internal wiring.
//!
//! [`InMemoryBus`] implements both bus contracts over shared state:
//! published values are recorded and delivered synchronously to every
//! subscription whose filter matches, and tests can inject inbound
//! batches with [`InMemoryBus::inject`].

use std::sync::Arc;

use async_trait::async_trait;
use fxhash::FxHashSet;
use parking_lot::Mutex;

use alarmflow_types::IasValue;

use crate::error::BusError;
use crate::traits::{InputSubscriber, OutputPublisher, ValueListener};

#[derive(Default)]
struct Inner {
    subscriptions: Mutex<Vec<(FxHashSet<String>, ValueListener)>>,
    published: Mutex<Vec<IasValue>>,
    raw: Mutex<Vec<(String, String, String)>>,
}

/// A cloneable, fully in-process bus double.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    /// A fresh, empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an inbound batch to every matching subscription, as if
    /// it had been read from the core topic.
    pub fn inject(&self, values: Vec<IasValue>) {
        let subs = self.inner.subscriptions.lock().clone();
        for (filter, listener) in subs {
            let matching: Vec<IasValue> = values
                .iter()
                .filter(|v| filter.is_empty() || filter.contains(v.id()))
                .cloned()
                .collect();
            if !matching.is_empty() {
                listener(matching);
            }
        }
    }

    /// Snapshot of every value published so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<IasValue> {
        self.inner.published.lock().clone()
    }

    /// Snapshot of every raw `(topic, key, payload)` published so far.
    #[must_use]
    pub fn raw_messages(&self) -> Vec<(String, String, String)> {
        self.inner.raw.lock().clone()
    }

    /// Drops every recorded value and raw message.
    pub fn clear_recorded(&self) {
        self.inner.published.lock().clear();
        self.inner.raw.lock().clear();
    }
}

#[async_trait]
impl OutputPublisher for InMemoryBus {
    async fn initialize(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn publish(&self, value: &IasValue) -> Result<(), BusError> {
        self.inner.published.lock().push(value.clone());
        Ok(())
    }

    async fn publish_raw(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        self.inner
            .raw
            .lock()
            .push((topic.to_string(), key.to_string(), payload.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

#[async_trait]
impl InputSubscriber for InMemoryBus {
    async fn initialize(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: FxHashSet<String>,
        listener: ValueListener,
    ) -> Result<(), BusError> {
        self.inner.subscriptions.lock().push((filter, listener));
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.inner.subscriptions.lock().clear();
        Ok(())
    }
}
