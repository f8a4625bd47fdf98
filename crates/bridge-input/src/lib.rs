//! Input backends for the event bridge: a capability trait plus concrete
//! drivers for evdev keyboard-style devices, a line-oriented serial
//! protocol, and sysfs GPIO value files.

mod gpio;
mod libinput;
mod serial;
#[cfg(test)]
mod test_support;

pub use gpio::GpioInputBackend;
pub use libinput::{KeySource, LibinputBackend, LibinputKeymap};
pub use serial::{SerialBackend, SerialReader};

use bridge_types::{Event, EventType};

/// Narrow capability interface every input driver implements. The set of
/// concrete backends is closed and fixed at compile time; dispatch happens
/// through `Box<dyn InputBackend>` in [`EventBridge`].
///
/// [`EventBridge`]: https://docs.rs/bridge-core
pub trait InputBackend: Send {
    /// Drain queued events in hardware arrival order. If the backend has no
    /// reader thread running, this performs one bounded inline read first.
    /// Never blocks longer than the backend's configured timeout.
    fn poll(&mut self) -> Vec<Event>;

    /// Reset all press state and drop any queued events.
    fn clear(&mut self);

    /// Toggle tap-tempo capture for a specific actuator. No-op for backends
    /// or indices that do not support it.
    fn enable_tap_tempo(&mut self, etype: EventType, index: u8, enable: bool);
}
