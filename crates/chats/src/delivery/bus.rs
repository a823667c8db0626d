//! In-process publish/subscribe between the router and live subscribers.

use crate::types::DeliveryEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Receives events published for the conversation it subscribed to.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    async fn handle(&self, event: DeliveryEvent);
}

/// Identifies one handler registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusToken {
    conversation_id: String,
    id: u64,
}

impl BusToken {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

/// What happened to a single publish.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub queued: usize,
    pub dropped: usize,
}

struct HandlerSlot {
    id: u64,
    queue: mpsc::Sender<DeliveryEvent>,
}

struct BusInner {
    handlers: DashMap<String, Vec<HandlerSlot>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

/// Best-effort, at-most-once event bus.
///
/// Every handler owns a bounded FIFO queue drained by its own task, so
/// `publish` never waits on a handler. A full queue loses the event for that
/// handler only; a queue whose task has gone away is removed.
#[derive(Clone)]
pub struct DeliveryBus {
    inner: Arc<BusInner>,
}

impl DeliveryBus {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: DashMap::new(),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Register `handler` for events of `conversation_id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, conversation_id: &str, handler: Arc<dyn DeliveryHandler>) -> BusToken {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue, mut events) = mpsc::channel::<DeliveryEvent>(self.inner.queue_capacity);

        let conversation = conversation_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                handler.handle(event).await;
            }
            debug!(conversation_id = %conversation, handler_id = id, "bus handler drained");
        });

        self.inner
            .handlers
            .entry(conversation_id.to_string())
            .or_default()
            .push(HandlerSlot { id, queue });

        debug!(conversation_id, handler_id = id, "bus handler subscribed");
        BusToken {
            conversation_id: conversation_id.to_string(),
            id,
        }
    }

    /// Remove a handler. Events already queued for it are still handled.
    pub fn unsubscribe(&self, token: &BusToken) -> bool {
        let mut removed = false;
        if let Some(mut slots) = self.inner.handlers.get_mut(&token.conversation_id) {
            let before = slots.len();
            slots.retain(|slot| slot.id != token.id);
            removed = slots.len() != before;
        }
        self.inner
            .handlers
            .remove_if(&token.conversation_id, |_, slots| slots.is_empty());

        if removed {
            debug!(
                conversation_id = %token.conversation_id,
                handler_id = token.id,
                "bus handler unsubscribed"
            );
        }
        removed
    }

    /// Queue `event` for every handler of its conversation without waiting.
    pub fn publish(&self, event: DeliveryEvent) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();

        let Some(mut slots) = self.inner.handlers.get_mut(&event.conversation_id) else {
            return outcome;
        };

        slots.retain(|slot| match slot.queue.try_send(event.clone()) {
            Ok(()) => {
                outcome.queued += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                outcome.dropped += 1;
                warn!(
                    conversation_id = %event.conversation_id,
                    handler_id = slot.id,
                    message_id = event.message.id,
                    "bus queue full, dropping event"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    conversation_id = %event.conversation_id,
                    handler_id = slot.id,
                    "bus handler gone, removing"
                );
                false
            }
        });
        drop(slots);

        self.inner
            .handlers
            .remove_if(&event.conversation_id, |_, slots| slots.is_empty());
        outcome
    }

    pub fn handler_count(&self, conversation_id: &str) -> usize {
        self.inner
            .handlers
            .get(conversation_id)
            .map_or(0, |slots| slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buzzhub_database::ChatMessage;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::{Mutex, Notify};

    fn event(conversation_id: &str, id: i64) -> DeliveryEvent {
        DeliveryEvent::message_sent(ChatMessage {
            id,
            public_id: format!("m{id}"),
            conversation_id: conversation_id.to_string(),
            sender_id: 1,
            body: format!("body {id}"),
            created_at: Utc::now(),
        })
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
        notify: Notify,
    }

    #[async_trait]
    impl DeliveryHandler for Recorder {
        async fn handle(&self, event: DeliveryEvent) {
            self.seen.lock().await.push(event.message.id);
            self.notify.notify_one();
        }
    }

    impl Recorder {
        async fn wait_for(&self, count: usize) -> Vec<i64> {
            tokio::time::timeout(Duration::from_secs(2), async {
                loop {
                    let notified = self.notify.notified();
                    {
                        let seen = self.seen.lock().await;
                        if seen.len() >= count {
                            return seen.clone();
                        }
                    }
                    notified.await;
                }
            })
            .await
            .expect("handler did not receive events in time")
        }
    }

    /// Blocks inside `handle` until released.
    struct Gate {
        release: Arc<Notify>,
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl DeliveryHandler for Gate {
        async fn handle(&self, _event: DeliveryEvent) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[tokio::test]
    async fn events_reach_handlers_in_publish_order() {
        let bus = DeliveryBus::new(16);
        let recorder = Arc::new(Recorder::default());
        bus.subscribe("c1", recorder.clone());

        for id in 1..=5 {
            let outcome = bus.publish(event("c1", id));
            assert_eq!(outcome.queued, 1);
        }

        assert_eq!(recorder.wait_for(5).await, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn publish_only_targets_the_event_conversation() {
        let bus = DeliveryBus::new(16);
        let here = Arc::new(Recorder::default());
        let elsewhere = Arc::new(Recorder::default());
        bus.subscribe("c1", here.clone());
        bus.subscribe("c2", elsewhere.clone());

        bus.publish(event("c1", 1));
        assert_eq!(here.wait_for(1).await, vec![1]);
        assert!(elsewhere.seen.lock().await.is_empty());

        assert_eq!(bus.publish(event("c3", 2)), PublishOutcome::default());
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_handler_only() {
        let bus = DeliveryBus::new(1);
        let release = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        bus.subscribe(
            "c1",
            Arc::new(Gate {
                release: release.clone(),
                entered: entered.clone(),
            }),
        );
        let healthy = Arc::new(Recorder::default());
        bus.subscribe("c1", healthy.clone());

        // First event parks the gate inside `handle`, the second fills its queue.
        bus.publish(event("c1", 1));
        entered.notified().await;
        bus.publish(event("c1", 2));
        healthy.wait_for(2).await;

        let outcome = bus.publish(event("c1", 3));
        assert_eq!(outcome.dropped, 1);
        assert_eq!(healthy.wait_for(3).await, vec![1, 2, 3]);

        release.notify_waiters();
    }

    #[tokio::test]
    async fn unsubscribe_removes_handler() {
        let bus = DeliveryBus::new(4);
        let recorder = Arc::new(Recorder::default());
        let token = bus.subscribe("c1", recorder.clone());
        assert_eq!(token.conversation_id(), "c1");
        assert_eq!(bus.handler_count("c1"), 1);

        assert!(bus.unsubscribe(&token));
        assert!(!bus.unsubscribe(&token));
        assert_eq!(bus.handler_count("c1"), 0);
        assert_eq!(bus.publish(event("c1", 1)).queued, 0);
    }
}
