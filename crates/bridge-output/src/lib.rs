//! Output backends for the event bridge: GPIO sysfs value files and
//! per-colour RGB LED sysfs brightness files.

mod gpio;
mod sysfs_led;

pub use gpio::GpioOutputBackend;
pub use sysfs_led::SysfsLedBackend;

/// Narrow capability interface every output driver implements. Output
/// backends have no shared state and no lock; `emit` is called directly
/// from `EventBridge::send_event`.
pub trait OutputBackend: Send {
    /// Apply a new value, encoded per the backend's convention (e.g. packed
    /// RGB nibbles for [`SysfsLedBackend`]).
    fn emit(&mut self, value: i32);
}
