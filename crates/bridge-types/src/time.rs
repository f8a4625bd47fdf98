use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic millisecond counter, rebased to zero at first call. Saturates
/// rather than panics on overflow (not reachable before ~49 days of
/// continuous runtime given `u32`, which matches the embedded original).
pub fn monotonic_ms() -> u32 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis().min(u32::MAX as u128) as u32
}

/// Monotonic microsecond counter, rebased to the same epoch as
/// [`monotonic_ms`]. Used by the libinput backend, which derives tap-tempo
/// instants from the per-event µs timestamp rather than this directly, but
/// backends without a hardware timestamp (tests, fakes) can use this.
pub fn monotonic_us() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros().min(u64::MAX as u128) as u64
}

/// Injectable time source so tests can drive long-press/tap-tempo timing
/// deterministically instead of sleeping real wall-clock time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u32;
    fn now_us(&self) -> u64;
}

/// The real monotonic clock, backed by [`monotonic_ms`]/[`monotonic_us`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        monotonic_ms()
    }

    fn now_us(&self) -> u64 {
        monotonic_us()
    }
}
