use super::{ConnectionId, WatchTarget};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Viewer interest, indexed both ways.
///
/// `by_target` answers "who watches this device" on every frame;
/// `by_viewer` makes viewer disconnect cleanup proportional to that
/// viewer's own subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    by_target: HashMap<WatchTarget, HashSet<ConnectionId>>,
    by_viewer: HashMap<ConnectionId, HashSet<WatchTarget>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the viewer already had this subscription.
    pub fn subscribe(&mut self, viewer: &ConnectionId, target: WatchTarget) -> bool {
        let added = self
            .by_viewer
            .entry(viewer.clone())
            .or_default()
            .insert(target.clone());
        if added {
            self.by_target
                .entry(target)
                .or_default()
                .insert(viewer.clone());
        }
        added
    }

    pub fn unsubscribe(&mut self, viewer: &ConnectionId, target: &WatchTarget) -> bool {
        let removed = match self.by_viewer.get_mut(viewer) {
            Some(targets) => {
                let removed = targets.remove(target);
                if targets.is_empty() {
                    self.by_viewer.remove(viewer);
                }
                removed
            }
            None => false,
        };
        if removed {
            self.detach(viewer, target);
        }
        removed
    }

    /// Drop every subscription held by `viewer`. Returns how many were removed.
    pub fn remove_viewer(&mut self, viewer: &ConnectionId) -> usize {
        let Some(targets) = self.by_viewer.remove(viewer) else {
            return 0;
        };
        for target in &targets {
            self.detach(viewer, target);
        }
        targets.len()
    }

    /// Viewers of `device_id` plus viewers of "all", each listed once.
    pub fn watchers_of(&self, device_id: &str) -> BTreeSet<ConnectionId> {
        let mut watchers = BTreeSet::new();
        if let Some(viewers) = self.by_target.get(&WatchTarget::Device(device_id.to_string())) {
            watchers.extend(viewers.iter().cloned());
        }
        if let Some(viewers) = self.by_target.get(&WatchTarget::All) {
            watchers.extend(viewers.iter().cloned());
        }
        watchers
    }

    pub fn targets_of(&self, viewer: &ConnectionId) -> Vec<WatchTarget> {
        self.by_viewer
            .get(viewer)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of viewers holding at least one subscription.
    pub fn viewer_count(&self) -> usize {
        self.by_viewer.len()
    }

    fn detach(&mut self, viewer: &ConnectionId, target: &WatchTarget) {
        if let Some(viewers) = self.by_target.get_mut(target) {
            viewers.remove(viewer);
            if viewers.is_empty() {
                self.by_target.remove(target);
            }
        }
    }
}
