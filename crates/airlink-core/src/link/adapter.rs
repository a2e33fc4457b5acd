//! The local link radio: discovery plus an on/off switch

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::discovery::Discovery;

pub struct LinkAdapter {
    discovery: Arc<dyn Discovery>,
    enabled: AtomicBool,
}

impl LinkAdapter {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self {
            discovery,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// A disabled adapter refuses new sessions; running ones are unaffected.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn discovery(&self) -> Arc<dyn Discovery> {
        self.discovery.clone()
    }
}
