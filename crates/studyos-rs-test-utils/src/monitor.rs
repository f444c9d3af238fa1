use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use studyos_rs_core::exam::{
    EnvironmentMonitor, EnvironmentSignal, SignalHandler, SignalRegistry, SubscriptionId,
};

/// Scriptable environment monitor for exam tests.
#[derive(Default)]
pub struct FakeEnvironmentMonitor {
    registry: SignalRegistry,
    deny_lock: AtomicBool,
    exit_on_release: AtomicBool,
    locked: AtomicBool,
    lock_requests: AtomicUsize,
    releases: AtomicUsize,
}

impl FakeEnvironmentMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor whose lock requests are refused.
    pub fn denying() -> Self {
        let monitor = Self::default();
        monitor.deny_lock.store(true, Ordering::SeqCst);
        monitor
    }

    /// Monitor that reports leaving full-screen whenever the lock is released,
    /// like a browser does when the page exits full-screen mode.
    pub fn exiting_fullscreen_on_release() -> Self {
        let monitor = Self::default();
        monitor.exit_on_release.store(true, Ordering::SeqCst);
        monitor
    }

    /// Fire a signal synchronously; returns how many handlers ran.
    pub fn fire(&self, signal: EnvironmentSignal) -> usize {
        self.registry.dispatch(signal)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn lock_requests(&self) -> usize {
        self.lock_requests.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.registry.subscription_count()
    }
}

impl EnvironmentMonitor for FakeEnvironmentMonitor {
    fn request_lock(&self) -> Result<(), String> {
        self.lock_requests.fetch_add(1, Ordering::SeqCst);
        if self.deny_lock.load(Ordering::SeqCst) {
            return Err("fullscreen request denied".to_string());
        }
        self.locked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release_lock(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.locked.store(false, Ordering::SeqCst);
        if self.exit_on_release.load(Ordering::SeqCst) {
            self.registry.dispatch(EnvironmentSignal::FullscreenExited);
        }
    }

    fn subscribe(&self, signal: EnvironmentSignal, handler: SignalHandler) -> SubscriptionId {
        self.registry.subscribe(signal, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unsubscribe(id);
    }
}
