//! Registry of connected page contexts and broadcast fan-out.
//!
//! Delivery is fire-and-forget: one dead recipient never blocks or fails
//! the others, it just gets pruned from the registry.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::Broadcast;

/// Identifier the embedder assigns to each page context.
pub type TabId = u32;

pub struct TabRegistry {
    tabs: RwLock<HashMap<TabId, mpsc::UnboundedSender<Broadcast>>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self {
            tabs: RwLock::new(HashMap::new()),
        }
    }

    /// Register `tab` and hand back its broadcast receiver. Re-registering
    /// replaces the previous channel, which goes dead.
    pub fn register(&self, tab: TabId) -> mpsc::UnboundedReceiver<Broadcast> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tabs.write().insert(tab, tx);
        debug!(tab, "page registered");
        rx
    }

    pub fn unregister(&self, tab: TabId) {
        if self.tabs.write().remove(&tab).is_some() {
            debug!(tab, "page unregistered");
        }
    }

    /// Fan `message` out to every registered page. Returns how many pages
    /// actually received it; disconnected pages are pruned along the way.
    pub fn broadcast(&self, message: &Broadcast) -> usize {
        let mut dead = Vec::new();
        let delivered = {
            let tabs = self.tabs.read();
            let mut delivered = 0;
            for (&tab, sender) in tabs.iter() {
                if sender.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(tab);
                }
            }
            delivered
        };
        self.prune(dead);
        delivered
    }

    /// Deliver to a single page. False when the tab is unknown or gone.
    pub fn send_to(&self, tab: TabId, message: Broadcast) -> bool {
        let sent = {
            let tabs = self.tabs.read();
            match tabs.get(&tab) {
                Some(sender) => sender.send(message).is_ok(),
                None => return false,
            }
        };
        if !sent {
            self.prune(vec![tab]);
        }
        sent
    }

    fn prune(&self, dead: Vec<TabId>) {
        if dead.is_empty() {
            return;
        }
        let mut tabs = self.tabs.write();
        for tab in dead {
            tabs.remove(&tab);
            debug!(tab, "dead page channel pruned");
        }
    }

    pub fn len(&self) -> usize {
        self.tabs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.read().is_empty()
    }
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_every_registered_page() {
        let registry = TabRegistry::new();
        let mut a = registry.register(1);
        let mut b = registry.register(2);

        let delivered = registry.broadcast(&Broadcast::ClearTip);
        assert_eq!(delivered, 2);
        assert_eq!(a.try_recv().unwrap(), Broadcast::ClearTip);
        assert_eq!(b.try_recv().unwrap(), Broadcast::ClearTip);
    }

    #[test]
    fn test_dead_recipient_is_skipped_and_pruned() {
        let registry = TabRegistry::new();
        let mut alive = registry.register(1);
        let gone = registry.register(2);
        drop(gone);

        let delivered = registry.broadcast(&Broadcast::ClearTip);
        assert_eq!(delivered, 1);
        assert_eq!(alive.try_recv().unwrap(), Broadcast::ClearTip);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_send_to_unknown_tab_is_false() {
        let registry = TabRegistry::new();
        assert!(!registry.send_to(99, Broadcast::ClearTip));
    }

    #[test]
    fn test_send_to_delivers_only_to_the_target() {
        let registry = TabRegistry::new();
        let mut target = registry.register(1);
        let mut other = registry.register(2);

        assert!(registry.send_to(1, Broadcast::Toggle { is_active: false }));
        assert_eq!(target.try_recv().unwrap(), Broadcast::Toggle { is_active: false });
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_reregistering_replaces_the_old_channel() {
        let registry = TabRegistry::new();
        let mut old = registry.register(1);
        let mut new = registry.register(1);

        assert_eq!(registry.len(), 1);
        let delivered = registry.broadcast(&Broadcast::ClearTip);
        assert_eq!(delivered, 1);
        assert!(old.try_recv().is_err());
        assert_eq!(new.try_recv().unwrap(), Broadcast::ClearTip);
    }
}
