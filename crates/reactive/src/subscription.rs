//! Callback subscriptions.

use crate::change_set::ChangeSet;

/// Handle returned by [`SubscriptionManager::subscribe`], used to
/// unsubscribe later. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn(&ChangeSet)>;

/// Fans change sets out to registered callbacks in subscription order.
#[derive(Default)]
pub struct SubscriptionManager {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: impl Fn(&ChangeSet) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscription. Returns false if the id was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Delivers a change set to every subscriber. Empty change sets are
    /// not delivered.
    pub fn notify(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        for (_, callback) in &self.subscribers {
            callback(changes);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
