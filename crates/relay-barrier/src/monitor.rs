use std::sync::{Condvar, Mutex};

use relay_timing::Duration;

/// A value with a condition variable attached, so a waiter can block until
/// it reaches a target without polling. Mirrors the reference
/// implementation's `lunchbox::Monitor<uint32_t>`, used here purely as the
/// barrier's leave-notification counter.
pub struct Monitor {
    value: Mutex<u32>,
    changed: Condvar,
}

impl Monitor {
    pub fn new() -> Self {
        Self { value: Mutex::new(0), changed: Condvar::new() }
    }

    pub fn current(&self) -> u32 {
        *self.value.lock().unwrap()
    }

    pub fn increment(&self) {
        let mut value = self.value.lock().unwrap();
        *value += 1;
        self.changed.notify_all();
    }

    pub fn wait_eq(&self, target: u32) {
        let mut value = self.value.lock().unwrap();
        while *value < target {
            value = self.changed.wait(value).unwrap();
        }
    }

    /// Returns `true` if `target` was reached before `timeout` elapsed.
    pub fn timed_wait_eq(&self, target: u32, timeout: Duration) -> bool {
        let mut value = self.value.lock().unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from(timeout);
        while *value < target {
            let now = std::time::Instant::now();
            if now >= deadline {
                return *value >= target;
            }
            let (guard, result) = self.changed.wait_timeout(value, deadline - now).unwrap();
            value = guard;
            if result.timed_out() && *value < target {
                return false;
            }
        }
        true
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
