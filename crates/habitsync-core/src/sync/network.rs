//! Connectivity signal shared between the platform and the sync engine.

use std::sync::Arc;

use tokio::sync::watch;

/// Online/offline flag backed by a watch channel.
///
/// The platform layer calls [`NetworkMonitor::set_online`] whenever
/// reachability changes; the engine subscribes to see offline→online
/// transitions.
#[derive(Clone, Debug)]
pub struct NetworkMonitor {
    status: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (status, _) = watch::channel(online);
        Self {
            status: Arc::new(status),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.status.borrow()
    }

    /// Report the current reachability. Returns `true` when the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Network is now {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
