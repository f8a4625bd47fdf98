//! Shared data model for the event bridge: event kinds, per-actuator state,
//! the error taxonomy, monotonic time helpers, and the derived-gesture logic
//! (long-press sweep, tap-tempo estimator) used identically by every
//! threaded input backend.

mod error;
pub mod gesture;
mod time;

pub use error::BridgeError;
pub use gesture::{update_tap_tempo, TapTempoOutcome, TimingConfig, LONG_PRESS_MS,
    TAP_TEMPO_HYSTERESIS_MS, TAP_TEMPO_TIMEOUT_MS, TAP_TEMPO_TIMEOUT_OVERFLOW_MS};
pub use time::{monotonic_ms, monotonic_us, Clock, SystemClock};

/// Number of rotary encoders the bridge tracks by default.
pub const NUM_ENCODERS: u8 = 6;
/// Number of momentary footswitches the bridge tracks by default.
pub const NUM_FOOTSWITCHES: u8 = 3;
/// Number of RGB LED outputs the bridge tracks by default.
pub const NUM_LEDS: u8 = 3;

/// Tagged kind of event, shared by both the input and output surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Null,
    Encoder,
    Footswitch,
    Led,
}

impl EventType {
    /// Routing key used by [`crate::fingerprint`]: `(type as u32) * 256`.
    pub fn tag(self) -> u32 {
        match self {
            EventType::Null => 0,
            EventType::Encoder => 1,
            EventType::Footswitch => 2,
            EventType::Led => 3,
        }
    }
}

/// Lifecycle phase of a press-capable actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Released,
    Pressed,
    LongPressed,
    /// Synthetic: reports a tempo estimate rather than a press edge.
    TapTempo,
}

/// The quantum delivered to the user callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub etype: EventType,
    pub state: EventState,
    pub index: u8,
    pub value: i32,
}

impl Event {
    pub fn new(etype: EventType, state: EventState, index: u8, value: i32) -> Self {
        Self { etype, state, index, value }
    }
}

/// Routing key for output backends: `(type as u32) * 256 + index`.
pub fn fingerprint(etype: EventType, index: u8) -> u32 {
    etype.tag() * 256 + index as u32
}

/// Per-actuator press/release/long-press state plus the serial backend's
/// rotation accumulator. Encoders and footswitches both use this record;
/// libinput-style backends size their array `NUM_ENCODERS + NUM_FOOTSWITCHES`
/// and rebase footswitch indices to `[0, NUM_FOOTSWITCHES)` at the callback
/// boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActuatorState {
    /// Monotonic ms of the most recent press; `0` if released or already
    /// promoted to long-press.
    pub press_started_ms: u32,
    pub state_released: bool,
    pub state_pressed: bool,
    pub state_long_pressed: bool,
    /// Set by the serial backend when `value` holds unread accumulation.
    pub changed: bool,
    /// Rotation deltas summed since the last poll (serial backend only).
    pub value: i32,
}

impl ActuatorState {
    pub fn state(&self) -> EventState {
        if self.state_long_pressed {
            EventState::LongPressed
        } else if self.state_pressed {
            EventState::Pressed
        } else {
            EventState::Released
        }
    }

    pub fn set_state(&mut self, state: EventState) {
        self.state_released = matches!(state, EventState::Released);
        self.state_pressed = matches!(state, EventState::Pressed);
        self.state_long_pressed = matches!(state, EventState::LongPressed);
    }

    pub fn press(&mut self, now_ms: u32) {
        self.press_started_ms = now_ms;
        self.set_state(EventState::Pressed);
    }

    pub fn release(&mut self) {
        self.press_started_ms = 0;
        self.set_state(EventState::Released);
    }

    /// Promote to long-press if held long enough. Returns `true` if the
    /// transition happened this call.
    pub fn sweep_long_press(&mut self, now_ms: u32, threshold_ms: u32) -> bool {
        if !self.state_pressed {
            return false;
        }
        if now_ms.wrapping_sub(self.press_started_ms) < threshold_ms {
            return false;
        }
        self.press_started_ms = 0;
        self.set_state(EventState::LongPressed);
        true
    }
}

impl Default for EventState {
    fn default() -> Self {
        EventState::Released
    }
}

/// Per-actuator tap-tempo running estimate, only meaningful for indices the
/// caller enabled via `enable_tap_tempo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TapTempoState {
    pub enabled: bool,
    /// Last tap instant, in the backend's native time unit (µs for
    /// libinput, ms for serial); `0` means "no prior tap".
    pub last_tap_time: u64,
    /// Running period estimate, in the backend's native time unit.
    pub estimate: u32,
    /// Set when `estimate` has a fresh value not yet delivered to a caller.
    pub updated: bool,
}

impl TapTempoState {
    pub fn enable(&mut self, enable: bool) {
        self.last_tap_time = 0;
        self.estimate = 0;
        self.enabled = enable;
        self.updated = false;
    }

    pub fn clear(&mut self) {
        self.last_tap_time = 0;
        self.estimate = 0;
        self.updated = false;
    }
}
