//! Environment signals and the lock-down monitor seam.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Integrity signal reported by the exam environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSignal {
    VisibilityLost,
    FocusLost,
    FullscreenExited,
    ContextMenu,
    Clipboard,
}

impl EnvironmentSignal {
    pub const ALL: [EnvironmentSignal; 5] = [
        EnvironmentSignal::VisibilityLost,
        EnvironmentSignal::FocusLost,
        EnvironmentSignal::FullscreenExited,
        EnvironmentSignal::ContextMenu,
        EnvironmentSignal::Clipboard,
    ];

    /// Reason shown in the violation warning.
    pub fn reason(&self) -> &'static str {
        match self {
            EnvironmentSignal::VisibilityLost => {
                "Visual attention loss detected (Tab Switch). Focus is required."
            }
            EnvironmentSignal::FocusLost => {
                "Focus lost (Window Click-away). Remain in the exam environment."
            }
            EnvironmentSignal::FullscreenExited => "Secure environment breach (Fullscreen Exit).",
            EnvironmentSignal::ContextMenu => "Unauthorized interface interaction (Right Click).",
            EnvironmentSignal::Clipboard => "External data injection (Paste/Copy) prohibited.",
        }
    }
}

impl fmt::Display for EnvironmentSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvironmentSignal::VisibilityLost => "visibility_lost",
            EnvironmentSignal::FocusLost => "focus_lost",
            EnvironmentSignal::FullscreenExited => "fullscreen_exited",
            EnvironmentSignal::ContextMenu => "context_menu",
            EnvironmentSignal::Clipboard => "clipboard",
        };
        f.write_str(name)
    }
}

/// Callback invoked when a subscribed signal fires.
pub type SignalHandler = Arc<dyn Fn(EnvironmentSignal) + Send + Sync>;

/// Token returned by [`EnvironmentMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Lock-down and signal source for a proctored session.
pub trait EnvironmentMonitor: Send + Sync {
    /// Enter the locked (full-screen) mode. Called synchronously from `start`.
    fn request_lock(&self) -> Result<(), String>;
    fn release_lock(&self);
    fn subscribe(&self, signal: EnvironmentSignal, handler: SignalHandler) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Subscription table shared by monitor implementations.
#[derive(Default)]
pub struct SignalRegistry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, EnvironmentSignal, SignalHandler)>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, signal: EnvironmentSignal, handler: SignalHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, signal, handler));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.lock().retain(|(existing, _, _)| *existing != id);
    }

    /// Invoke every handler subscribed to `signal`; returns how many ran.
    pub fn dispatch(&self, signal: EnvironmentSignal) -> usize {
        let handlers: Vec<SignalHandler> = self
            .handlers
            .lock()
            .iter()
            .filter(|(_, subscribed, _)| *subscribed == signal)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in &handlers {
            handler(signal);
        }
        handlers.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

/// Monitor driven by signals a remote client reports, e.g. a browser over HTTP.
pub struct ClientReportedMonitor {
    registry: SignalRegistry,
    lock_available: AtomicBool,
    locked: AtomicBool,
}

impl Default for ClientReportedMonitor {
    fn default() -> Self {
        Self {
            registry: SignalRegistry::new(),
            lock_available: AtomicBool::new(true),
            locked: AtomicBool::new(false),
        }
    }
}

impl ClientReportedMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record whether the client managed to enter full-screen mode.
    pub fn set_lock_available(&self, available: bool) {
        self.lock_available.store(available, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Deliver a client-reported signal to subscribers.
    pub fn report(&self, signal: EnvironmentSignal) -> usize {
        self.registry.dispatch(signal)
    }
}

impl EnvironmentMonitor for ClientReportedMonitor {
    fn request_lock(&self) -> Result<(), String> {
        if !self.lock_available.load(Ordering::SeqCst) {
            return Err("client could not enter fullscreen".to_string());
        }
        self.locked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release_lock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    fn subscribe(&self, signal: EnvironmentSignal, handler: SignalHandler) -> SubscriptionId {
        self.registry.subscribe(signal, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unsubscribe(id);
    }
}
