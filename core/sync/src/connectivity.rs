//! Online/offline signal shared by the coordinator and the scheduler.

use tokio::sync::watch;
use tracing::info;

use fragments_storage::RemoteFragments;

/// Source of the current connectivity state.
pub trait Connectivity: Send + Sync {
    /// Whether the remote API is believed reachable right now.
    fn is_online(&self) -> bool;

    /// Receiver that observes every online/offline transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state backed by a watch channel.
///
/// Subscribers are only woken on transitions, never on repeated reports of
/// the same state.
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    pub fn always_online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Record the current state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        changed
    }

    /// Ping the API and record whether it answered.
    pub async fn probe(&self, remote: &dyn RemoteFragments) -> bool {
        let online = remote.ping().await.is_ok();
        self.set_online(online);
        online
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
