//! A controllable clock shared by the backend test modules, so long-press
//! and tap-tempo timing tests advance logical time instead of sleeping real
//! wall-clock time.
#![cfg(test)]

use std::sync::atomic::{AtomicU64, Ordering};

use bridge_types::Clock;

pub struct FakeClock {
    now_us: AtomicU64,
}

impl FakeClock {
    pub fn new(start_ms: u32) -> Self {
        Self { now_us: AtomicU64::new(start_ms as u64 * 1000) }
    }

    pub fn advance_ms(&self, delta_ms: u32) {
        self.now_us.fetch_add(delta_ms as u64 * 1000, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        (self.now_us.load(Ordering::SeqCst) / 1000) as u32
    }

    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}
