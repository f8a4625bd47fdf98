//! Line-oriented serial protocol backend. Tracks `NUM_ENCODERS` actuators,
//! accumulating rotation deltas until the next `poll` instead of emitting
//! them immediately.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bridge_types::{
    gesture, ActuatorState, BridgeError, Clock, Event, EventState, EventType, SystemClock,
    TapTempoState, TimingConfig, NUM_ENCODERS,
};

use crate::InputBackend;

#[derive(Default)]
struct Shared {
    state: Vec<ActuatorState>,
    tap_tempo: Vec<TapTempoState>,
}

impl Shared {
    fn new(len: usize) -> Self {
        Self {
            state: vec![ActuatorState::default(); len],
            tap_tempo: vec![TapTempoState::default(); len],
        }
    }
}

/// Narrow view of a byte source: reads exactly `dst.len()` bytes or reports
/// "nothing available" (a timeout, for the real port; end of buffer, for the
/// in-memory fake used in tests).
pub trait SerialReader: Send {
    fn read_chunk(&mut self, dst: &mut [u8]) -> Option<usize>;
}

impl SerialReader for dyn serialport::SerialPort {
    fn read_chunk(&mut self, dst: &mut [u8]) -> Option<usize> {
        match self.read_exact(dst) {
            Ok(()) => Some(dst.len()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => None,
            Err(_) => None,
        }
    }
}

pub struct SerialBackend {
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    inline_port: Option<Box<dyn serialport::SerialPort>>,
    timing: TimingConfig,
    clock: Arc<dyn Clock>,
    path: String,
}

const BAUD_RATE: u32 = 115_200;

impl SerialBackend {
    pub fn new(path: &str) -> Result<Self, BridgeError> {
        Self::with_options(path, TimingConfig::default(), Arc::new(SystemClock))
    }

    /// Full constructor: lets callers override the long-press/tap-tempo
    /// thresholds and the time source in one call.
    pub fn with_options(path: &str, timing: TimingConfig, clock: Arc<dyn Clock>) -> Result<Self, BridgeError> {
        let open = || open_port(path);

        let port = open()?;
        let shared = Arc::new(Mutex::new(Shared::new(NUM_ENCODERS as usize)));
        let running = Arc::new(AtomicBool::new(true));

        let thread_shared = shared.clone();
        let thread_running = running.clone();
        let thread_clock = clock.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("serial-{path}"))
            .spawn(move || reader_loop(port, thread_shared, thread_running, thread_clock, timing));

        match spawned {
            Ok(thread) => Ok(Self {
                shared,
                running,
                thread: Some(thread),
                inline_port: None,
                timing,
                clock,
                path: path.to_string(),
            }),
            Err(source) => {
                tracing::warn!(target: "bridge.input.serial", %path, %source, "reader thread start failed, degrading to inline poll");
                running.store(false, Ordering::SeqCst);
                let inline_port = open().ok();
                Ok(Self {
                    shared,
                    running,
                    thread: None,
                    inline_port,
                    timing,
                    clock,
                    path: path.to_string(),
                })
            }
        }
    }
}

fn open_port(path: &str) -> Result<Box<dyn serialport::SerialPort>, BridgeError> {
    serialport::new(path, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|err| BridgeError::BackendUnavailable {
            backend: "serial",
            id: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, err),
        })
}

impl Drop for SerialBackend {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl InputBackend for SerialBackend {
    fn poll(&mut self) -> Vec<Event> {
        if self.thread.is_none() {
            if let Some(port) = self.inline_port.as_mut() {
                read_line(port.as_mut(), &self.shared, self.clock.as_ref(), self.timing);
            } else {
                sweep_long_presses(&self.shared, self.clock.as_ref(), self.timing.long_press_ms);
            }
        }

        let mut guard = self.shared.lock().expect("serial backend mutex poisoned");
        let mut events = Vec::new();

        for (index, state) in guard.state.iter_mut().enumerate() {
            if !state.changed {
                continue;
            }
            state.changed = false;
            let value = state.value;
            state.value = 0;
            events.push(Event::new(EventType::Encoder, state.state(), index as u8, value));
        }

        for (index, tap) in guard.tap_tempo.iter_mut().enumerate() {
            if !tap.updated {
                continue;
            }
            tap.updated = false;
            // promote serial's millisecond-native estimate to microseconds so
            // every `TapTempo` event shares units across backends.
            events.push(Event::new(
                EventType::Encoder,
                EventState::TapTempo,
                index as u8,
                tap.estimate as i32 * 1000,
            ));
        }

        events
    }

    fn clear(&mut self) {
        let mut guard = self.shared.lock().expect("serial backend mutex poisoned");
        for state in guard.state.iter_mut() {
            *state = ActuatorState::default();
        }
        for tap in guard.tap_tempo.iter_mut() {
            tap.clear();
        }
    }

    fn enable_tap_tempo(&mut self, etype: EventType, index: u8, enable: bool) {
        if etype != EventType::Encoder || index >= NUM_ENCODERS {
            return;
        }
        let mut guard = self.shared.lock().expect("serial backend mutex poisoned");
        guard.tap_tempo[index as usize].enable(enable);
    }
}

fn reader_loop(
    mut port: Box<dyn serialport::SerialPort>,
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
) {
    while running.load(Ordering::Acquire) {
        read_line(port.as_mut(), &shared, clock.as_ref(), timing);
    }
}

/// Reads one `"<letter> <payload>\n"` message, tolerating the startup noise
/// of stray leading newlines. Malformed lines are dropped; parsing
/// resynchronises at the next `\n`.
fn read_line<R: SerialReader + ?Sized>(port: &mut R, shared: &Arc<Mutex<Shared>>, clock: &dyn Clock, timing: TimingConfig) {
    let mut buf = [0u8; 255];
    let mut offs;

    match port.read_chunk(&mut buf[..2]) {
        Some(2) => {}
        _ => {
            sweep_long_presses(shared, clock, timing.long_press_ms);
            return;
        }
    }
    offs = 2;

    // resynchronize: a stale trailing newline from the previous message
    // shifts the buffer left by one byte.
    if buf[0] == b'\n' && buf[1] != b'\n' {
        buf[0] = buf[1];
        offs = 1;
    } else if buf[1] == b'\n' {
        // flush artifact: two newlines in a row, nothing to parse.
        sweep_long_presses(shared, clock, timing.long_press_ms);
        return;
    }

    loop {
        if offs >= buf.len() {
            sweep_long_presses(shared, clock, timing.long_press_ms);
            return;
        }
        match port.read_chunk(&mut buf[offs..offs + 1]) {
            Some(1) => {}
            _ => {
                sweep_long_presses(shared, clock, timing.long_press_ms);
                return;
            }
        }

        if buf[offs] != b'\n' {
            offs += 1;
            continue;
        }

        apply_line(&buf[..offs], shared, clock, timing);
        break;
    }

    sweep_long_presses(shared, clock, timing.long_press_ms);
}

fn apply_line(line: &[u8], shared: &Arc<Mutex<Shared>>, clock: &dyn Clock, timing: TimingConfig) {
    if line.len() < 3 || line[1] != b' ' {
        tracing::debug!(target: "bridge.input.serial", line = %String::from_utf8_lossy(line), "dropping malformed line");
        return;
    }

    let c = line[0];
    let payload = &line[2..];

    if c.is_ascii_uppercase() {
        let index = (c - b'A') as usize;
        if index >= NUM_ENCODERS as usize {
            tracing::debug!(target: "bridge.input.serial", index, "encoder index out of range");
            return;
        }
        let text = match std::str::from_utf8(payload) {
            Ok(t) => t,
            Err(_) => return,
        };
        let Ok(value) = text.trim().parse::<i32>() else {
            tracing::debug!(target: "bridge.input.serial", payload = text, "malformed rotation payload");
            return;
        };

        let mut guard = shared.lock().expect("serial backend mutex poisoned");
        guard.state[index].value += value;
        guard.state[index].changed = true;
    } else if c.is_ascii_lowercase() {
        let index = (c - b'a') as usize;
        if index >= NUM_ENCODERS as usize {
            tracing::debug!(target: "bridge.input.serial", index, "encoder index out of range");
            return;
        }
        if payload != b"0" && payload != b"1" {
            tracing::debug!(target: "bridge.input.serial", "malformed click payload");
            return;
        }

        let mut guard = shared.lock().expect("serial backend mutex poisoned");
        let now_ms = clock.now_ms();

        if payload == b"1" {
            guard.state[index].press(now_ms);
            if guard.tap_tempo[index].enabled {
                update_tap_tempo_slot(&mut guard.tap_tempo[index], now_ms as u64, timing);
            }
        } else {
            guard.state[index].release();
        }
        guard.state[index].changed = true;
    } else {
        tracing::debug!(target: "bridge.input.serial", byte = c, "unrecognised message prefix");
    }
}

fn update_tap_tempo_slot(tap: &mut TapTempoState, now_ms: u64, timing: TimingConfig) {
    let (last, estimate, outcome) = gesture::update_tap_tempo(
        tap.last_tap_time,
        tap.estimate,
        now_ms,
        timing.tap_timeout_ms,
        timing.tap_timeout_overflow_ms,
        timing.tap_hysteresis_ms,
    );
    tap.last_tap_time = last;
    tap.estimate = estimate;
    if let gesture::TapTempoOutcome::Updated { .. } = outcome {
        tap.updated = true;
    }
}

fn sweep_long_presses(shared: &Arc<Mutex<Shared>>, clock: &dyn Clock, threshold_ms: u32) {
    let mut guard = shared.lock().expect("serial backend mutex poisoned");
    let now_ms = clock.now_ms();
    for state in guard.state.iter_mut() {
        if state.sweep_long_press(now_ms, threshold_ms) {
            state.changed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeClock;

    /// In-memory stand-in for a real serial port, fed a fixed byte buffer —
    /// reads past the end report "nothing available", the same as a real
    /// port timing out.
    struct FakeSerialReader {
        buf: Vec<u8>,
        pos: usize,
    }

    impl FakeSerialReader {
        fn new(data: &[u8]) -> Self {
            Self { buf: data.to_vec(), pos: 0 }
        }
    }

    impl SerialReader for FakeSerialReader {
        fn read_chunk(&mut self, dst: &mut [u8]) -> Option<usize> {
            if self.pos + dst.len() > self.buf.len() {
                return None;
            }
            dst.copy_from_slice(&self.buf[self.pos..self.pos + dst.len()]);
            self.pos += dst.len();
            Some(dst.len())
        }
    }

    fn fresh_shared() -> Arc<Mutex<Shared>> {
        Arc::new(Mutex::new(Shared::new(NUM_ENCODERS as usize)))
    }

    #[test]
    fn rotation_line_accumulates_into_value() {
        let shared = fresh_shared();
        let clock = FakeClock::new(0);
        let timing = TimingConfig::default();
        apply_line(b"A +1", &shared, &clock, timing);
        apply_line(b"A +2", &shared, &clock, timing);
        let guard = shared.lock().unwrap();
        assert_eq!(guard.state[0].value, 3);
        assert!(guard.state[0].changed);
    }

    #[test]
    fn click_line_presses_and_releases() {
        let shared = fresh_shared();
        let clock = FakeClock::new(0);
        let timing = TimingConfig::default();
        apply_line(b"a 1", &shared, &clock, timing);
        {
            let guard = shared.lock().unwrap();
            assert_eq!(guard.state[0].state(), EventState::Pressed);
        }
        apply_line(b"a 0", &shared, &clock, timing);
        let guard = shared.lock().unwrap();
        assert_eq!(guard.state[0].state(), EventState::Released);
    }

    #[test]
    fn malformed_line_is_dropped_without_panicking() {
        let shared = fresh_shared();
        let clock = FakeClock::new(0);
        let timing = TimingConfig::default();
        apply_line(b"?", &shared, &clock, timing);
        apply_line(b"A", &shared, &clock, timing);
        apply_line(b"Z garbage", &shared, &clock, timing);
        let guard = shared.lock().unwrap();
        assert!(guard.state.iter().all(|s| !s.changed));
    }

    #[test]
    fn long_press_sweep_marks_changed_without_using_accumulator_field() {
        let shared = fresh_shared();
        let clock = FakeClock::new(0);
        let timing = TimingConfig::default();
        apply_line(b"a 1", &shared, &clock, timing);
        {
            let mut guard = shared.lock().unwrap();
            // backdate the press so the sweep promotes it immediately,
            // regardless of whatever happens to be in `value`.
            guard.state[0].press_started_ms = 0;
            guard.state[0].value = 0;
            guard.state[0].changed = false;
        }
        sweep_long_presses(&shared, &clock, timing.long_press_ms);
        let guard = shared.lock().unwrap();
        assert_eq!(guard.state[0].state(), EventState::LongPressed);
        assert!(guard.state[0].changed);
    }

    #[test]
    fn long_press_does_not_promote_before_threshold_elapses() {
        let shared = fresh_shared();
        let clock = FakeClock::new(0);
        let timing = TimingConfig { long_press_ms: 500, ..TimingConfig::default() };
        apply_line(b"a 1", &shared, &clock, timing);

        clock.advance_ms(300);
        sweep_long_presses(&shared, &clock, timing.long_press_ms);
        assert_eq!(shared.lock().unwrap().state[0].state(), EventState::Pressed);

        clock.advance_ms(400);
        sweep_long_presses(&shared, &clock, timing.long_press_ms);
        assert_eq!(shared.lock().unwrap().state[0].state(), EventState::LongPressed);
    }

    #[test]
    fn read_line_over_a_fake_in_memory_buffer_parses_a_click_message() {
        let shared = fresh_shared();
        let clock = FakeClock::new(0);
        let timing = TimingConfig::default();
        let mut reader = FakeSerialReader::new(b"a 1\n");

        read_line(&mut reader, &shared, &clock, timing);

        let guard = shared.lock().unwrap();
        assert_eq!(guard.state[0].state(), EventState::Pressed);
        assert!(guard.state[0].changed);
    }

    #[test]
    fn read_line_resynchronises_after_a_stray_leading_newline() {
        let shared = fresh_shared();
        let clock = FakeClock::new(0);
        let timing = TimingConfig::default();
        // a stray trailing '\n' from a previous message, then a real message
        let mut reader = FakeSerialReader::new(b"\na 1\n");

        read_line(&mut reader, &shared, &clock, timing);

        let guard = shared.lock().unwrap();
        assert_eq!(guard.state[0].state(), EventState::Pressed);
    }
}
