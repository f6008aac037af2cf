//! In-process topic-based publish/subscribe.
//!
//! Every subscription owns an unbounded queue, so [`EventBus::publish`] never
//! waits on a subscriber. Handler subscriptions drain their queue from a
//! dedicated Tokio task, one event at a time, which keeps per-subscriber
//! delivery in publish order. Channel subscriptions hand the queue's receiver
//! straight to the caller (push feeds).
//!
//! Each handler call runs in its own spawned task under a timeout. A handler
//! that errors, panics or hangs is logged and skipped; later events and other
//! subscribers are unaffected.
//!
//! Subscribing to `*` matches every topic.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Topic that matches every event.
pub const WILDCARD_TOPIC: &str = "*";

/// Identifier returned by a subscribe call.
pub type SubscriptionId = Uuid;

/// An ephemeral state-change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic, e.g. `task_submitted`.
    pub topic: String,
    /// Opaque event data.
    pub payload: Value,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// Component that published the event.
    pub source: String,
}

/// Receives events for a subscription.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event. Errors are logged by the bus and otherwise ignored.
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

/// Wrap `f` as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        (self.0)(event).await
    }
}

struct Subscriber {
    topic: String,
    tx: mpsc::UnboundedSender<Event>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Subscriber {
    fn matches(&self, topic: &str) -> bool {
        self.topic == WILDCARD_TOPIC || self.topic == topic
    }
}

/// Topic-based fan-out to handlers and channel feeds.
pub struct EventBus {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    handler_timeout: Duration,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl EventBus {
    /// Create a bus whose handler calls are cut off after `handler_timeout`.
    pub fn new(handler_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            handler_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `topic` (or `*`).
    ///
    /// Must be called from within a Tokio runtime: the subscription's
    /// dispatcher is spawned here.
    pub fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(id, rx, handler, self.handler_timeout));
        self.lock().insert(
            id,
            Subscriber {
                topic: topic.to_owned(),
                tx,
                dispatcher: Some(dispatcher),
            },
        );
        debug!(subscription_id = %id, topic, "handler subscribed");
        id
    }

    /// Register a push feed for `topic` (or `*`).
    ///
    /// Dropping the receiver ends the subscription on the next publish.
    pub fn subscribe_channel(
        &self,
        topic: &str,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            Subscriber {
                topic: topic.to_owned(),
                tx,
                dispatcher: None,
            },
        );
        debug!(subscription_id = %id, topic, "channel subscribed");
        (id, rx)
    }

    /// Remove a subscription. Events already queued for it are still delivered.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!(subscription_id = %id, "unsubscribed");
        }
        removed
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Publish an event to every matching subscriber; returns how many were reached.
    pub fn publish(&self, topic: &str, payload: Value, source: &str) -> usize {
        let event = Event {
            topic: topic.to_owned(),
            payload,
            timestamp: Utc::now(),
            source: source.to_owned(),
        };

        let mut subscribers = self.lock();
        let mut delivered: usize = 0;
        let mut closed = Vec::new();
        for (id, subscriber) in subscribers.iter() {
            if !subscriber.matches(topic) {
                continue;
            }
            if subscriber.tx.send(event.clone()).is_ok() {
                delivered = delivered.saturating_add(1);
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            subscribers.remove(&id);
            debug!(subscription_id = %id, "dropped closed subscription");
        }

        debug!(topic, source, delivered, "event published");
        delivered
    }

    /// Drop every subscription and wait for handler dispatchers to drain.
    pub async fn shutdown(&self) {
        let dispatchers: Vec<JoinHandle<()>> = self
            .lock()
            .drain()
            .filter_map(|(_, subscriber)| subscriber.dispatcher)
            .collect();
        for dispatcher in dispatchers {
            if let Err(e) = dispatcher.await {
                warn!(error = %e, "event dispatcher ended abnormally");
            }
        }
    }
}

/// Deliver queued events to `handler` in order until the queue closes.
async fn dispatch(
    id: SubscriptionId,
    mut rx: mpsc::UnboundedReceiver<Event>,
    handler: Arc<dyn EventHandler>,
    timeout: Duration,
) {
    while let Some(event) = rx.recv().await {
        let topic = event.topic.clone();
        let handler = Arc::clone(&handler);
        let mut call = tokio::spawn(async move { handler.handle(event).await });

        match tokio::time::timeout(timeout, &mut call).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                warn!(subscription_id = %id, topic = %topic, error = %e, "event handler failed");
            }
            Ok(Err(e)) => {
                warn!(subscription_id = %id, topic = %topic, error = %e, "event handler panicked");
            }
            Err(_) => {
                call.abort();
                warn!(
                    subscription_id = %id,
                    topic = %topic,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "event handler timed out"
                );
            }
        }
    }
    debug!(subscription_id = %id, "dispatcher stopped");
}
