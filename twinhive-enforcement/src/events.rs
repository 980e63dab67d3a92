//! Cluster-wide enforcement events.
//!
//! Policy changes and namespace blocklist changes are broadcast to every
//! enforcement unit. Receivers get all events; filtering by policy id is
//! the receiver's responsibility (allows uniform broadcast channel usage).

use tokio::sync::broadcast;

use twinhive_model::PolicyId;

/// Notification that a policy's content changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyChangeTag {
    pub policy_id: PolicyId,
    /// The revision the policy was changed to.
    pub revision: u64,
}

/// An event delivered over the cluster broadcast.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// A policy's content changed; enforcers bound to it must not keep
    /// using their cached compiled form.
    PolicyModified(PolicyChangeTag),
    /// The namespace blocklist changed. Informational at the enforcement
    /// layer.
    NamespaceBlocklistChanged { namespaces: Vec<String> },
}

/// Handle to the in-process cluster event channel.
#[derive(Debug, Clone)]
pub struct ClusterEvents {
    sender: broadcast::Sender<ClusterEvent>,
}

impl ClusterEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers. Returns the number of
    /// subscribers the event reached.
    pub fn publish(&self, event: ClusterEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.sender.subscribe()
    }
}

impl Default for ClusterEvents {
    fn default() -> Self {
        Self::new(128)
    }
}
