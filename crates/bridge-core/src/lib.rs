//! `EventBridge`, the facade that owns input and output backends, routes
//! `send_event` calls by `(type, index)` fingerprint, and delivers received
//! events to a user-supplied callback. `poll` is the sole entry point that
//! ever invokes the callback — never a reader thread.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_input::{GpioInputBackend, InputBackend, LibinputBackend, LibinputKeymap, SerialBackend};
use bridge_output::{GpioOutputBackend, OutputBackend, SysfsLedBackend};
use bridge_types::{fingerprint, Event, EventType, SystemClock, TimingConfig};

/// Which concrete driver to construct for [`EventBridge::add_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Libinput,
    Serial,
    Gpio,
}

/// Which concrete driver to construct for [`EventBridge::add_output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Gpio,
    SysfsLed,
}

/// Receives events drained by [`EventBridge::poll`]. A plain `FnMut(Event)`
/// closure satisfies this via the blanket impl below.
pub trait EventCallback: Send {
    fn on_event(&mut self, event: Event);
}

impl<F: FnMut(Event) + Send> EventCallback for F {
    fn on_event(&mut self, event: Event) {
        self(event)
    }
}

pub struct EventBridge<C: EventCallback> {
    callback: C,
    inputs: Vec<Box<dyn InputBackend>>,
    outputs: HashMap<u32, Box<dyn OutputBackend>>,
    last_error: Option<String>,
    timing: TimingConfig,
}

impl<C: EventCallback> EventBridge<C> {
    /// Build a bridge with the stock long-press/tap-tempo thresholds. Use
    /// [`EventBridge::with_timing`] to override them (e.g. from a loaded
    /// config file).
    pub fn new(callback: C) -> Self {
        Self::with_timing(callback, TimingConfig::default())
    }

    pub fn with_timing(callback: C, timing: TimingConfig) -> Self {
        Self {
            callback,
            inputs: Vec::new(),
            outputs: HashMap::new(),
            last_error: None,
            timing,
        }
    }

    /// The most recent diagnostic from a failed `add_input`/`add_output`
    /// call. Not cleared on success — it is a running diagnostic, not a
    /// single-shot error slot.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Register an already-constructed input backend directly, bypassing
    /// [`EventBridge::add_input`]'s device-open step. Exists for tests that
    /// script a fake [`InputBackend`] instead of touching real hardware.
    #[doc(hidden)]
    pub fn add_input_for_test(&mut self, backend: Box<dyn InputBackend>) {
        self.inputs.push(backend);
    }

    /// Construct and register an input backend. `index` is only meaningful
    /// for [`InputKind::Gpio`] (one footswitch index per instance); it is
    /// ignored for backends that self-determine their actuator indices from
    /// the wire protocol (libinput keycodes, serial message prefixes).
    pub fn add_input(&mut self, kind: InputKind, id: &str, index: u8) -> bool {
        let result: Result<Box<dyn InputBackend>, bridge_types::BridgeError> = match kind {
            InputKind::Libinput => {
                LibinputBackend::with_options(id, LibinputKeymap::default(), self.timing, Arc::new(SystemClock))
                    .map(|b| Box::new(b) as _)
            }
            InputKind::Serial => {
                SerialBackend::with_options(id, self.timing, Arc::new(SystemClock)).map(|b| Box::new(b) as _)
            }
            InputKind::Gpio => GpioInputBackend::new(id, index).map(|b| Box::new(b) as _),
        };

        match result {
            Ok(backend) => {
                self.inputs.push(backend);
                true
            }
            Err(err) => {
                tracing::warn!(target: "bridge.core", %err, "add_input failed");
                self.last_error = Some(format!("{err:#}"));
                false
            }
        }
    }

    /// Construct and register an output backend at `(EventType::Led, index)`.
    /// Overwrites any prior output already registered at that fingerprint.
    pub fn add_output(&mut self, kind: OutputKind, id: &str, index: u8) -> bool {
        let result: Result<Box<dyn OutputBackend>, bridge_types::BridgeError> = match kind {
            OutputKind::Gpio => GpioOutputBackend::new(id).map(|b| Box::new(b) as _),
            OutputKind::SysfsLed => SysfsLedBackend::new(id).map(|b| Box::new(b) as _),
        };

        match result {
            Ok(backend) => {
                self.outputs.insert(fingerprint(EventType::Led, index), backend);
                true
            }
            Err(err) => {
                tracing::warn!(target: "bridge.core", %err, "add_output failed");
                self.last_error = Some(format!("{err:#}"));
                false
            }
        }
    }

    /// Reset all press state and queued events across every input backend.
    /// Call this after startup or a hot-reset to suppress spurious
    /// long-press events from buttons that were already held down.
    pub fn clear(&mut self) {
        for input in &mut self.inputs {
            input.clear();
        }
    }

    /// Toggle tap-tempo capture for a specific actuator. Forwarded to every
    /// registered input backend; backends that don't recognise the
    /// `(type, index)` pair (or don't support tap-tempo at all) ignore it.
    pub fn enable_tap_tempo(&mut self, etype: EventType, index: u8, enable: bool) {
        for input in &mut self.inputs {
            input.enable_tap_tempo(etype, index, enable);
        }
    }

    /// Drain every input backend, in the order they were added, and invoke
    /// the callback once per event in queue insertion order. Never blocks
    /// beyond each backend's own configured timeout, and never invokes the
    /// callback while any internal backend lock is held.
    pub fn poll(&mut self) {
        for input in &mut self.inputs {
            for event in input.poll() {
                self.callback.on_event(event);
            }
        }
    }

    /// Deliver `value` to every output registered at `(etype, index)`.
    /// Returns `false` (non-fatal) if nothing is registered there.
    pub fn send_event(&mut self, etype: EventType, index: u8, value: i32) -> bool {
        let key = fingerprint(etype, index);
        match self.outputs.get_mut(&key) {
            Some(output) => {
                output.emit(value);
                true
            }
            None => {
                tracing::debug!(target: "bridge.core", fingerprint = key, "send_event: no output registered");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn with_timing_stores_custom_thresholds_for_later_backend_construction() {
        let custom = TimingConfig { long_press_ms: 10, ..TimingConfig::default() };
        let bridge = EventBridge::with_timing(|_event: Event| {}, custom);
        assert_eq!(bridge.timing, custom);
    }

    #[test]
    fn add_input_with_unreachable_device_records_last_error_and_returns_false() {
        let mut bridge = EventBridge::new(|_event: Event| {});
        let ok = bridge.add_input(InputKind::Gpio, "nonexistent-does-not-exist", 0);
        assert!(!ok);
        assert!(bridge.last_error().is_some());
    }

    #[test]
    fn send_event_with_no_output_is_non_fatal() {
        let mut bridge = EventBridge::new(|_event: Event| {});
        assert!(!bridge.send_event(EventType::Led, 0, 0));
    }

    #[test]
    fn poll_drains_backends_in_registration_order() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let mut bridge = EventBridge::new(move |event: Event| {
            received_clone.lock().unwrap().push(event);
        });

        // no backends registered: poll is a no-op, never panics
        bridge.poll();
        assert!(received.lock().unwrap().is_empty());
    }
}
