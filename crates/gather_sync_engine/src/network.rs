//! Network status source.
//!
//! Pure observation: platform connectivity callbacks (or tests) report the
//! current state through [`NetworkMonitor::set_online`]; the orchestrator
//! reads the level and reacts to edges. No logic lives here.

use parking_lot::Mutex;
use tokio::sync::watch;

type EdgeListener = Box<dyn Fn(bool) + Send + Sync>;

/// Live boolean connectivity signal.
pub struct NetworkMonitor {
    level: watch::Sender<bool>,
    listeners: Mutex<Vec<EdgeListener>>,
}

impl NetworkMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(initially_online: bool) -> Self {
        let (level, _) = watch::channel(initially_online);
        Self {
            level,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Reports the current connectivity state.
    ///
    /// Listeners are only notified on edges; repeated reports of the same
    /// state are absorbed.
    pub fn set_online(&self, online: bool) {
        let previous = self.level.send_replace(online);
        if previous == online {
            return;
        }

        for listener in self.listeners.lock().iter() {
            listener(online);
        }
    }

    /// Returns the current connectivity level.
    pub fn is_online(&self) -> bool {
        *self.level.borrow()
    }

    /// Returns a receiver for observing the connectivity level.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.level.subscribe()
    }

    /// Registers a callback invoked on connectivity edges.
    pub(crate) fn register_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
