//! Live subscriptions of client connections to conversations.

use super::bus::{BusToken, DeliveryBus, DeliveryHandler};
use crate::types::{ChatError, ChatResult, DeliveryEvent};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Sending half of a connection's delivery channel. The connection keeps the
/// only strong handles; the registry stores a weak one.
pub type DeliverySender = mpsc::Sender<DeliveryEvent>;
pub type DeliveryReceiver = mpsc::Receiver<DeliveryEvent>;

/// Create a bounded delivery channel for one connection.
pub fn delivery_channel(capacity: usize) -> (DeliverySender, DeliveryReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Returned by [`SubscriptionRegistry::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    conversation_id: String,
    session_id: String,
    id: u64,
}

impl SubscriptionHandle {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Counts for one dispatched event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dropped: usize,
    pub stale: usize,
}

struct Subscription {
    session_id: String,
    channel: mpsc::WeakSender<DeliveryEvent>,
}

struct ConversationSubscribers {
    bus_token: BusToken,
    subscriptions: BTreeMap<u64, Subscription>,
}

struct RegistryInner {
    conversations: DashMap<String, ConversationSubscribers>,
    bus: DeliveryBus,
    next_id: AtomicU64,
}

/// Tracks which connection channels want events of which conversation.
///
/// The registry attaches to the [`DeliveryBus`] for a conversation when the
/// first subscription arrives and detaches when the last one goes away.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryHandler {
    registry: Weak<RegistryInner>,
}

#[async_trait]
impl DeliveryHandler for RegistryHandler {
    async fn handle(&self, event: DeliveryEvent) {
        if let Some(inner) = self.registry.upgrade() {
            SubscriptionRegistry { inner }.dispatch(&event);
        }
    }
}

impl SubscriptionRegistry {
    pub fn new(bus: DeliveryBus) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                conversations: DashMap::new(),
                bus,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `channel` for events of `conversation_id`.
    ///
    /// A session may subscribe to the same conversation more than once; each
    /// subscription receives its own copy of every event.
    pub fn subscribe(
        &self,
        conversation_id: &str,
        session_id: &str,
        channel: &DeliverySender,
    ) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut entry = self
            .inner
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                let handler = Arc::new(RegistryHandler {
                    registry: Arc::downgrade(&self.inner),
                });
                ConversationSubscribers {
                    bus_token: self.inner.bus.subscribe(conversation_id, handler),
                    subscriptions: BTreeMap::new(),
                }
            });
        entry.subscriptions.insert(
            id,
            Subscription {
                session_id: session_id.to_string(),
                channel: channel.downgrade(),
            },
        );
        drop(entry);

        debug!(conversation_id, session_id, subscription_id = id, "subscribed");
        SubscriptionHandle {
            conversation_id: conversation_id.to_string(),
            session_id: session_id.to_string(),
            id,
        }
    }

    /// Remove one subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.remove_subscription(&handle.conversation_id, handle.id);
        if removed {
            debug!(
                conversation_id = %handle.conversation_id,
                session_id = %handle.session_id,
                subscription_id = handle.id,
                "unsubscribed"
            );
        }
        removed
    }

    /// Remove every subscription held by `session_id`.
    pub fn unsubscribe_session(&self, session_id: &str) -> usize {
        let owned: Vec<(String, u64)> = self
            .inner
            .conversations
            .iter()
            .flat_map(|entry| {
                entry
                    .subscriptions
                    .iter()
                    .filter(|(_, sub)| sub.session_id == session_id)
                    .map(|(id, _)| (entry.key().clone(), *id))
                    .collect::<Vec<_>>()
            })
            .collect();

        let removed = owned
            .iter()
            .filter(|(conversation_id, id)| self.remove_subscription(conversation_id, *id))
            .count();

        if removed > 0 {
            debug!(session_id, removed, "session subscriptions removed");
        }
        removed
    }

    /// Push `event` into every channel subscribed to its conversation.
    ///
    /// Never waits: a full channel loses this event, a closed one is removed.
    pub fn dispatch(&self, event: &DeliveryEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        let targets: Vec<(u64, String, Option<DeliverySender>)> =
            match self.inner.conversations.get(&event.conversation_id) {
                Some(subscribers) => subscribers
                    .subscriptions
                    .iter()
                    .map(|(id, sub)| (*id, sub.session_id.clone(), sub.channel.upgrade()))
                    .collect(),
                None => return report,
            };

        let mut stale = Vec::new();
        for (id, session_id, channel) in targets {
            match offer(channel, event) {
                Ok(true) => report.delivered += 1,
                Ok(false) => {
                    report.dropped += 1;
                    warn!(
                        conversation_id = %event.conversation_id,
                        session_id = %session_id,
                        message_id = event.message.id,
                        "delivery channel full, dropping event"
                    );
                }
                Err(_) => stale.push(id),
            }
        }

        for id in stale {
            if self.remove_subscription(&event.conversation_id, id) {
                report.stale += 1;
                debug!(
                    conversation_id = %event.conversation_id,
                    subscription_id = id,
                    "removed subscription with closed channel"
                );
            }
        }
        report
    }

    pub fn subscription_count(&self, conversation_id: &str) -> usize {
        self.inner
            .conversations
            .get(conversation_id)
            .map_or(0, |subscribers| subscribers.subscriptions.len())
    }

    pub fn bus(&self) -> &DeliveryBus {
        &self.inner.bus
    }

    fn remove_subscription(&self, conversation_id: &str, id: u64) -> bool {
        let mut removed = false;
        let mut detached = None;

        if let Entry::Occupied(mut entry) = self.inner.conversations.entry(conversation_id.to_string()) {
            removed = entry.get_mut().subscriptions.remove(&id).is_some();
            if entry.get().subscriptions.is_empty() {
                detached = Some(entry.remove().bus_token);
            }
        }

        if let Some(token) = detached {
            self.inner.bus.unsubscribe(&token);
        }
        removed
    }
}

/// Queue `event` on one subscription's channel. `Ok(false)` means the queue
/// was full and the event was dropped.
fn offer(channel: Option<DeliverySender>, event: &DeliveryEvent) -> ChatResult<bool> {
    let channel = channel.ok_or(ChatError::ChannelClosed)?;
    match channel.try_send(event.clone()) {
        Ok(()) => Ok(true),
        Err(TrySendError::Full(_)) => Ok(false),
        Err(TrySendError::Closed(_)) => Err(ChatError::ChannelClosed),
    }
}
