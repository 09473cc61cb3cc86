//! Kafka implementations of the bus contracts.
//!
//! [`KafkaPublisher`] writes wire-encoded values to the core topic with
//! a `FutureProducer`; [`KafkaSubscriber`] drives a `StreamConsumer`
//! from a spawned polling task, decoding records and forwarding matching
//! values to the registered listener. Malformed records are logged and
//! skipped: one bad producer must not stall the evaluation of everything
//! else on the topic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fxhash::FxHashSet;
use parking_lot::Mutex;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use alarmflow_types::clock::now_millis;
use alarmflow_types::{codec, IasValue};

use crate::error::BusError;
use crate::traits::{InputSubscriber, OutputPublisher, ValueListener};
use crate::CORE_TOPIC;

/// Delivery timeout of a single publish.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `close` waits for in-flight work before cancelling hard.
const AWAIT_TERMINATION: Duration = Duration::from_secs(10);

/// Publisher backed by an rdkafka `FutureProducer`.
pub struct KafkaPublisher {
    brokers: String,
    producer: Mutex<Option<FutureProducer>>,
}

impl KafkaPublisher {
    /// A publisher for the given broker list (`host:port,...`).
    #[must_use]
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            producer: Mutex::new(None),
        }
    }

    fn current_producer(&self) -> Result<FutureProducer, BusError> {
        self.producer.lock().clone().ok_or(BusError::InvalidState {
            expected: "initialized",
            actual: "created",
        })
    }

    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        let producer = self.current_producer()?;
        let record = FutureRecord::to(topic).key(key).payload(payload);
        producer
            .send(record, SEND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| BusError::PublishFailed(e.to_string()))
    }
}

#[async_trait]
impl OutputPublisher for KafkaPublisher {
    async fn initialize(&self) -> Result<(), BusError> {
        let mut guard = self.producer.lock();
        if guard.is_some() {
            return Err(BusError::InvalidState {
                expected: "created",
                actual: "initialized",
            });
        }
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BusError::ConnectionFailed(e.to_string()))?;
        *guard = Some(producer);
        info!(brokers = %self.brokers, "kafka publisher initialized");
        Ok(())
    }

    async fn publish(&self, value: &IasValue) -> Result<(), BusError> {
        let payload = codec::encode(value)?;
        self.send(CORE_TOPIC, value.id(), &payload).await
    }

    async fn publish_raw(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        self.send(topic, key, payload).await
    }

    async fn close(&self) -> Result<(), BusError> {
        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            producer
                .flush(AWAIT_TERMINATION)
                .map_err(|e| BusError::PublishFailed(e.to_string()))?;
            info!("kafka publisher closed");
        }
        Ok(())
    }
}

/// Subscriber backed by an rdkafka `StreamConsumer`.
pub struct KafkaSubscriber {
    brokers: String,
    group_id: String,
    topic: String,
    consumer: Mutex<Option<StreamConsumer>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl KafkaSubscriber {
    /// A subscriber of the core topic for the given consumer group.
    #[must_use]
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self::for_topic(brokers, group_id, CORE_TOPIC)
    }

    /// A subscriber of an arbitrary topic.
    #[must_use]
    pub fn for_topic(
        brokers: impl Into<String>,
        group_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            topic: topic.into(),
            consumer: Mutex::new(None),
            poll_task: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl InputSubscriber for KafkaSubscriber {
    async fn initialize(&self) -> Result<(), BusError> {
        let mut guard = self.consumer.lock();
        if guard.is_some() {
            return Err(BusError::InvalidState {
                expected: "created",
                actual: "initialized",
            });
        }
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| BusError::ConnectionFailed(e.to_string()))?;
        *guard = Some(consumer);
        info!(brokers = %self.brokers, group = %self.group_id, "kafka subscriber initialized");
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: FxHashSet<String>,
        listener: ValueListener,
    ) -> Result<(), BusError> {
        let consumer = self.consumer.lock().take().ok_or(BusError::InvalidState {
            expected: "initialized",
            actual: "created or subscribed",
        })?;
        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;
        info!(topic = %self.topic, filtered_ids = filter.len(), "kafka subscription started");

        // The consumer moves into the polling task; `close` stops it
        // through the shutdown notification.
        let shutdown = Arc::clone(&self.shutdown);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.notified() => break,
                    msg = consumer.recv() => match msg {
                        Ok(msg) => {
                            let Some(Ok(payload)) = msg.payload_view::<str>() else {
                                warn!("skipping record with non-utf8 payload");
                                continue;
                            };
                            match codec::decode(payload) {
                                Ok(value) => {
                                    if filter.is_empty() || filter.contains(value.id()) {
                                        let value = value.with_read_from_bsdb(now_millis());
                                        listener(vec![value]);
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "skipping malformed record");
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "kafka receive error");
                        }
                    }
                }
            }
            debug!("kafka poll loop terminated");
        });
        *self.poll_task.lock() = Some(task);
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.shutdown.notify_waiters();
        let task = self.poll_task.lock().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(AWAIT_TERMINATION, &mut task)
                .await
                .is_err()
            {
                warn!("kafka poll loop did not stop in time, cancelling");
                task.abort();
            }
        }
        self.consumer.lock().take();
        info!("kafka subscriber closed");
        Ok(())
    }
}
