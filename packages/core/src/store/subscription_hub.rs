//! Subscription Hub
//!
//! Explicit observer registry with per-node and wildcard subscriptions.
//! Every committed mutation is fanned out synchronously, in the same call
//! that committed it, so observers always see consistent post-write state.
//!
//! Cleanup is explicit: the caller owns the returned
//! [`SubscriptionHandle`] and must call [`SubscriptionHandle::release`] on
//! teardown. There is no Drop-based cleanup - a leaked handle keeps its
//! callback registered (and running) for the life of the hub, which is
//! exactly what `subscription_count` makes testable.

use crate::store::events::EventEnvelope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

type EventCallback = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

struct Registration {
    id: u64,
    callback: EventCallback,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    node_subscribers: HashMap<String, Vec<Registration>>,
    wildcard_subscribers: Vec<Registration>,
}

/// Per-node and wildcard observer registry with synchronous fan-out
#[derive(Default)]
pub struct SubscriptionHub {
    state: Mutex<HubState>,
}

#[derive(Debug, Clone)]
enum SubscriptionKey {
    Node(String),
    Wildcard,
}

/// Unsubscribe capability returned to the caller.
///
/// `release` is idempotent; releasing twice is a no-op, never a
/// double-decrement. Dropping the handle without releasing leaks the
/// registration by design.
#[derive(Debug)]
pub struct SubscriptionHandle {
    registration: Option<(Weak<SubscriptionHub>, SubscriptionKey, u64)>,
}

impl SubscriptionHandle {
    /// Remove the registration from the hub. Safe to call repeatedly.
    pub fn release(&mut self) {
        let Some((hub, key, id)) = self.registration.take() else {
            return;
        };
        let Some(hub) = hub.upgrade() else {
            return;
        };
        let mut state = hub.state.lock().unwrap();
        match key {
            SubscriptionKey::Node(node_id) => {
                if let Some(registrations) = state.node_subscribers.get_mut(&node_id) {
                    registrations.retain(|r| r.id != id);
                    if registrations.is_empty() {
                        state.node_subscribers.remove(&node_id);
                    }
                }
            }
            SubscriptionKey::Wildcard => {
                state.wildcard_subscribers.retain(|r| r.id != id);
            }
        }
    }

    /// Whether the handle still holds a live registration
    pub fn is_active(&self) -> bool {
        self.registration.is_some()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events concerning a single node id
    pub fn subscribe_node(
        self: &Arc<Self>,
        node_id: impl Into<String>,
        callback: impl Fn(&EventEnvelope) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let node_id = node_id.into();
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state
            .node_subscribers
            .entry(node_id.clone())
            .or_default()
            .push(Registration {
                id,
                callback: Arc::new(callback),
            });
        SubscriptionHandle {
            registration: Some((Arc::downgrade(self), SubscriptionKey::Node(node_id), id)),
        }
    }

    /// Subscribe to every event published through this hub
    pub fn subscribe_all(
        self: &Arc<Self>,
        callback: impl Fn(&EventEnvelope) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.wildcard_subscribers.push(Registration {
            id,
            callback: Arc::new(callback),
        });
        SubscriptionHandle {
            registration: Some((Arc::downgrade(self), SubscriptionKey::Wildcard, id)),
        }
    }

    /// Fan an envelope out to wildcard subscribers and to per-node
    /// subscribers of every id the envelope concerns.
    ///
    /// Callbacks are invoked after the registry lock is dropped, so a
    /// callback may freely read the store or manage subscriptions.
    pub fn publish(&self, envelope: &EventEnvelope) {
        let callbacks: Vec<EventCallback> = {
            let state = self.state.lock().unwrap();
            let mut seen = std::collections::HashSet::new();
            let mut callbacks = Vec::new();
            for registration in &state.wildcard_subscribers {
                if seen.insert(registration.id) {
                    callbacks.push(registration.callback.clone());
                }
            }
            for node_id in envelope.node_ids() {
                if let Some(registrations) = state.node_subscribers.get(node_id) {
                    for registration in registrations {
                        if seen.insert(registration.id) {
                            callbacks.push(registration.callback.clone());
                        }
                    }
                }
            }
            callbacks
        };
        for callback in callbacks {
            callback(envelope);
        }
    }

    /// Total live registrations (wildcard + per-node), for leak tests
    pub fn subscription_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.wildcard_subscribers.len()
            + state.node_subscribers.values().map(Vec::len).sum::<usize>()
    }
}
