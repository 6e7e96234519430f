//! Connection, consumer, and message handles.

use {
    std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    tokio::sync::mpsc,
};

use crate::{
    Result,
    broker::{Broker, ConnectionId},
    error::MqError,
};

/// An owned broker connection. Queues declared exclusively through it are torn
/// down when it closes, on every exit path: explicit [`close`](Self::close),
/// drop, or broker shutdown.
pub struct Connection {
    broker: Broker,
    id: ConnectionId,
    open: Arc<AtomicBool>,
}

impl Connection {
    pub(crate) fn new(broker: Broker, id: ConnectionId, open: Arc<AtomicBool>) -> Self {
        Self { broker, id, open }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Idempotent; settles nothing itself — unacked deliveries return to their
    /// queues broker-side.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.remove_connection(self.id);
        }
    }

    /// Declare a durable shared queue. Re-declaring an existing one is a no-op.
    pub fn declare_queue(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.broker.declare_queue_on(self.id, name)
    }

    /// Declare a private reply queue with a generated name, exclusive to this
    /// connection.
    pub fn declare_reply_queue(&self) -> Result<String> {
        self.ensure_open()?;
        self.broker.declare_reply_queue_on(self.id)
    }

    pub fn publish(&self, queue: &str, publication: Publication) -> Result<()> {
        self.ensure_open()?;
        self.broker.publish_on(self.id, queue, publication)
    }

    pub fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer> {
        self.ensure_open()?;
        self.broker.consume_on(self.id, queue, options)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() { Ok(()) } else { Err(MqError::ConnectionClosed) }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// A message handed to `publish`.
#[derive(Debug, Clone)]
pub struct Publication {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub persistent: bool,
}

impl Publication {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into(), correlation_id: None, reply_to: None, persistent: false }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumeOptions {
    /// Deliveries are settled at send time; no acks, no prefetch bound.
    pub auto_ack: bool,
    /// Max unsettled deliveries outstanding at once; 0 means unbounded.
    pub prefetch: u16,
}

impl ConsumeOptions {
    pub fn auto_ack() -> Self {
        Self { auto_ack: true, prefetch: 0 }
    }

    pub fn manual(prefetch: u16) -> Self {
        Self { auto_ack: false, prefetch }
    }
}

/// A message delivered to a consumer, with the properties its publisher set.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub persistent: bool,
    pub delivery_tag: u64,
    /// How many times this message has been returned to the queue.
    pub redelivered: u32,
}

/// Receiving half of a subscription. `recv` returning `None` means the
/// connection or broker went away.
pub struct Consumer {
    broker: Broker,
    queue: String,
    consumer_id: u64,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue)
            .field("consumer_id", &self.consumer_id)
            .finish_non_exhaustive()
    }
}

impl Consumer {
    pub(crate) fn new(
        broker: Broker,
        queue: String,
        consumer_id: u64,
        rx: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self { broker, queue, consumer_id, rx }
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Non-blocking variant; `None` when nothing is ready right now.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    pub fn ack(&self, delivery: &Delivery) {
        self.broker.settle(delivery.delivery_tag, false);
    }

    pub fn nack_requeue(&self, delivery: &Delivery) {
        self.broker.settle(delivery.delivery_tag, true);
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.broker.cancel_consumer(&self.queue, self.consumer_id);
    }
}
