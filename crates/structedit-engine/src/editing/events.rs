//! Per-node notification bus.
//!
//! Constructs don't hold callbacks themselves; the session owns one bus
//! keyed by node handle. Callbacks may ask to be removed by returning
//! [`Subscription::Unsubscribe`], and external unsubscriptions requested
//! mid-pass land in a pending set drained after the pass, so the subscriber
//! list is never mutated while it is being iterated.

use crate::ast::node::NodeId;
use std::collections::{HashMap, HashSet};

/// Event kinds a construct can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    /// Content changed in place (text edit, compound growth).
    Change,
    /// The node is about to leave the tree.
    Delete,
    /// A child of the node was swapped out.
    Replace,
    /// A text edit was rejected by the token's validator.
    Fail,
    /// Focus moved off the node.
    FocusOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub node: NodeId,
    pub kind: NotifyKind,
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// What a callback wants done with its registration after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Keep,
    Unsubscribe,
}

type Callback = Box<dyn FnMut(&Notification) -> Subscription>;

struct Entry {
    id: CallbackId,
    kind: NotifyKind,
    callback: Callback,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<NodeId, Vec<Entry>>,
    pending_removal: HashSet<CallbackId>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        node: NodeId,
        kind: NotifyKind,
        callback: impl FnMut(&Notification) -> Subscription + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.subscribers.entry(node).or_default().push(Entry {
            id,
            kind,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove a registration. Deferred to the end of the current dispatch
    /// pass; outside a pass the next dispatch drains it.
    pub fn unsubscribe(&mut self, id: CallbackId) {
        self.pending_removal.insert(id);
    }

    /// Invoke every live callback registered for the notification's node and
    /// kind, then drain deferred removals.
    pub fn dispatch(&mut self, notification: &Notification) {
        let Some(mut entries) = self.subscribers.remove(&notification.node) else {
            self.drain_pending();
            return;
        };
        for entry in &mut entries {
            if self.pending_removal.contains(&entry.id) || entry.kind != notification.kind {
                continue;
            }
            if (entry.callback)(notification) == Subscription::Unsubscribe {
                self.pending_removal.insert(entry.id);
            }
        }
        if !entries.is_empty() {
            self.subscribers.insert(notification.node, entries);
        }
        self.drain_pending();
    }

    fn drain_pending(&mut self) {
        if self.pending_removal.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_removal);
        self.subscribers.retain(|_, entries| {
            entries.retain(|e| !pending.contains(&e.id));
            !entries.is_empty()
        });
    }

    #[cfg(test)]
    fn subscriber_count(&self, node: NodeId) -> usize {
        self.subscribers.get(&node).map_or(0, |v| v.len())
    }
}
