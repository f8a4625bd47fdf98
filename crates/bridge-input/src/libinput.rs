//! Keyboard-style input backend over a single evdev device node, mirroring
//! the original libinput-path-context driver: rotary encoders report
//! click/left/right keycodes, footswitches report a single click keycode.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, UNIX_EPOCH};

use bridge_types::{
    gesture, ActuatorState, BridgeError, Clock, Event, EventState, EventType, SystemClock,
    TapTempoState, TimingConfig, NUM_ENCODERS, NUM_FOOTSWITCHES,
};
use evdev::{Device, InputEventKind};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::InputBackend;

/// Raw evdev keycode base addresses. Defaults match the reference hardware
/// mapping; override via [`LibinputBackend::with_keymap`].
#[derive(Debug, Clone, Copy)]
pub struct LibinputKeymap {
    pub encoder_click_base: u16,
    pub encoder_left_base: u16,
    pub encoder_right_base: u16,
    pub footswitch_click_base: u16,
}

impl Default for LibinputKeymap {
    fn default() -> Self {
        Self {
            encoder_click_base: 16,
            encoder_left_base: 30,
            encoder_right_base: 44,
            footswitch_click_base: 101,
        }
    }
}

/// Narrow view of an evdev-like device: yields `(keycode, pressed, time_us)`
/// tuples observed within `timeout`. Implemented for the real [`Device`] and,
/// in tests, for a fake fed from an in-memory queue — standing in for the
/// pipe a real kernel device node would otherwise require.
pub trait KeySource: Send {
    fn poll_events(&mut self, timeout: Duration) -> Vec<(u16, bool, u64)>;
}

impl KeySource for Device {
    fn poll_events(&mut self, timeout: Duration) -> Vec<(u16, bool, u64)> {
        if !fd_ready(self, timeout) {
            return Vec::new();
        }
        match self.fetch_events() {
            Ok(events) => events
                .filter_map(|ev| {
                    let InputEventKind::Key(key) = ev.kind() else {
                        return None;
                    };
                    // evdev autorepeat (value 2) has no libinput keyboard-key
                    // equivalent; only press (1) and release (0) are dispatched.
                    if ev.value() == 2 {
                        return None;
                    }
                    let pressed = ev.value() == 1;
                    let time_us = ev
                        .timestamp()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_micros() as u64;
                    Some((key.code(), pressed, time_us))
                })
                .collect(),
            Err(source) => {
                tracing::debug!(target: "bridge.input.libinput", %source, "fetch_events failed");
                Vec::new()
            }
        }
    }
}

#[derive(Default)]
struct Shared {
    state: Vec<ActuatorState>,
    tap_tempo: Vec<TapTempoState>,
    events: Vec<Event>,
}

impl Shared {
    fn new(len: usize) -> Self {
        Self {
            state: vec![ActuatorState::default(); len],
            tap_tempo: vec![TapTempoState::default(); len],
            events: Vec::new(),
        }
    }
}

pub struct LibinputBackend {
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    inline_source: Option<Box<dyn KeySource>>,
    keymap: LibinputKeymap,
    timing: TimingConfig,
    clock: Arc<dyn Clock>,
    path: String,
}

const SLOTS: usize = NUM_ENCODERS as usize + NUM_FOOTSWITCHES as usize;

impl LibinputBackend {
    pub fn new(path: &str) -> Result<Self, BridgeError> {
        Self::with_keymap(path, LibinputKeymap::default())
    }

    pub fn with_keymap(path: &str, keymap: LibinputKeymap) -> Result<Self, BridgeError> {
        Self::with_options(path, keymap, TimingConfig::default(), Arc::new(SystemClock))
    }

    /// Full constructor: lets callers override the keycode map, the
    /// long-press/tap-tempo thresholds, and the time source in one call.
    pub fn with_options(
        path: &str,
        keymap: LibinputKeymap,
        timing: TimingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BridgeError> {
        let open = || -> Result<Box<dyn KeySource>, BridgeError> {
            Device::open(path)
                .map(|device| Box::new(device) as Box<dyn KeySource>)
                .map_err(|source| BridgeError::BackendUnavailable {
                    backend: "libinput",
                    id: path.to_string(),
                    source,
                })
        };

        let source = open()?;
        let shared = Arc::new(Mutex::new(Shared::new(SLOTS)));
        let running = Arc::new(AtomicBool::new(true));

        let thread_shared = shared.clone();
        let thread_running = running.clone();
        let thread_clock = clock.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("libinput-{path}"))
            .spawn(move || reader_loop(source, keymap, thread_shared, thread_running, thread_clock, timing));

        match spawned {
            Ok(thread) => Ok(Self {
                shared,
                running,
                thread: Some(thread),
                inline_source: None,
                keymap,
                timing,
                clock,
                path: path.to_string(),
            }),
            Err(source) => {
                tracing::warn!(target: "bridge.input.libinput", %path, %source, "reader thread start failed, degrading to inline poll");
                running.store(false, Ordering::SeqCst);
                let inline_source = open().ok();
                Ok(Self {
                    shared,
                    running,
                    thread: None,
                    inline_source,
                    keymap,
                    timing,
                    clock,
                    path: path.to_string(),
                })
            }
        }
    }
}

impl Drop for LibinputBackend {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl InputBackend for LibinputBackend {
    fn poll(&mut self) -> Vec<Event> {
        if self.thread.is_none() {
            if let Some(source) = self.inline_source.as_mut() {
                read_once(
                    source.as_mut(),
                    self.keymap,
                    &self.shared,
                    Duration::from_millis(1),
                    self.clock.as_ref(),
                    self.timing,
                );
            } else {
                sweep_long_presses(&self.shared, self.clock.as_ref(), self.timing.long_press_ms);
            }
        }

        let (mut events, tap_snapshots) = {
            let mut guard = self.shared.lock().expect("libinput backend mutex poisoned");
            let events = std::mem::take(&mut guard.events);
            let mut snapshots = Vec::new();
            for (i, tap) in guard.tap_tempo.iter_mut().enumerate() {
                if tap.updated {
                    tap.updated = false;
                    snapshots.push((i, tap.estimate));
                }
            }
            (events, snapshots)
        };

        for (i, estimate) in tap_snapshots {
            let (etype, index) = rebase(i);
            events.push(Event::new(etype, EventState::TapTempo, index, estimate as i32));
        }

        events
    }

    fn clear(&mut self) {
        let mut guard = self.shared.lock().expect("libinput backend mutex poisoned");
        for state in guard.state.iter_mut() {
            *state = ActuatorState::default();
        }
        for tap in guard.tap_tempo.iter_mut() {
            tap.clear();
        }
        guard.events.clear();
    }

    fn enable_tap_tempo(&mut self, etype: EventType, index: u8, enable: bool) {
        let Some(slot) = combined_index(etype, index) else {
            return;
        };
        let mut guard = self.shared.lock().expect("libinput backend mutex poisoned");
        if let Some(tap) = guard.tap_tempo.get_mut(slot) {
            tap.enable(enable);
        }
    }
}

/// Footswitch indices occupy `[NUM_ENCODERS, NUM_ENCODERS + NUM_FOOTSWITCHES)`
/// internally and are rebased to `[0, NUM_FOOTSWITCHES)` at the boundary.
fn combined_index(etype: EventType, index: u8) -> Option<usize> {
    match etype {
        EventType::Encoder if index < NUM_ENCODERS => Some(index as usize),
        EventType::Footswitch if index < NUM_FOOTSWITCHES => {
            Some(NUM_ENCODERS as usize + index as usize)
        }
        _ => None,
    }
}

fn rebase(slot: usize) -> (EventType, u8) {
    if slot < NUM_ENCODERS as usize {
        (EventType::Encoder, slot as u8)
    } else {
        (EventType::Footswitch, (slot - NUM_ENCODERS as usize) as u8)
    }
}

fn reader_loop(
    mut source: Box<dyn KeySource>,
    keymap: LibinputKeymap,
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
) {
    while running.load(Ordering::Acquire) {
        read_once(source.as_mut(), keymap, &shared, Duration::from_millis(100), clock.as_ref(), timing);
    }
}

fn read_once(
    source: &mut dyn KeySource,
    keymap: LibinputKeymap,
    shared: &Arc<Mutex<Shared>>,
    timeout: Duration,
    clock: &dyn Clock,
    timing: TimingConfig,
) {
    for (keycode, pressed, time_us) in source.poll_events(timeout) {
        dispatch_keycode(keymap, keycode, pressed, time_us, shared, clock, timing);
    }

    sweep_long_presses(shared, clock, timing.long_press_ms);
}

fn fd_ready(device: &Device, timeout: Duration) -> bool {
    let raw = device.as_raw_fd();
    // SAFETY: `raw` is borrowed for the duration of this poll call only, and
    // the device outlives it (owned by the caller's stack frame).
    let borrowed = unsafe { BorrowedFd::borrow_raw(raw) };
    let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
    let timeout_ms: i32 = timeout.as_millis().min(i32::MAX as u128) as i32;
    let poll_timeout = PollTimeout::try_from(timeout_ms).unwrap_or(PollTimeout::MAX);
    match poll(&mut fds, poll_timeout) {
        Ok(n) => n > 0,
        Err(_) => false,
    }
}

fn dispatch_keycode(
    keymap: LibinputKeymap,
    keycode: u16,
    pressed: bool,
    time_us: u64,
    shared: &Arc<Mutex<Shared>>,
    clock: &dyn Clock,
    timing: TimingConfig,
) {
    let mut guard = shared.lock().expect("libinput backend mutex poisoned");
    let now_ms = clock.now_ms();

    if in_range(keycode, keymap.encoder_click_base, NUM_ENCODERS) {
        let index = (keycode - keymap.encoder_click_base) as u8;
        let slot = index as usize;
        if pressed {
            guard.state[slot].press(now_ms);
            if guard.tap_tempo[slot].enabled {
                update_tap_tempo_slot(&mut guard.tap_tempo[slot], time_us, timing);
            }
        } else {
            guard.state[slot].release();
        }
        let state = guard.state[slot].state();
        guard.events.push(Event::new(EventType::Encoder, state, index, 0));
    } else if in_range(keycode, keymap.encoder_left_base, NUM_ENCODERS) {
        if pressed {
            let index = (keycode - keymap.encoder_left_base) as u8;
            let state = guard.state[index as usize].state();
            guard.events.push(Event::new(EventType::Encoder, state, index, -1));
        }
    } else if in_range(keycode, keymap.encoder_right_base, NUM_ENCODERS) {
        if pressed {
            let index = (keycode - keymap.encoder_right_base) as u8;
            let state = guard.state[index as usize].state();
            guard.events.push(Event::new(EventType::Encoder, state, index, 1));
        }
    } else if in_range(keycode, keymap.footswitch_click_base, NUM_FOOTSWITCHES) {
        let index = (keycode - keymap.footswitch_click_base) as u8;
        let slot = NUM_ENCODERS as usize + index as usize;
        if pressed {
            guard.state[slot].press(now_ms);
            if guard.tap_tempo[slot].enabled {
                update_tap_tempo_slot(&mut guard.tap_tempo[slot], time_us, timing);
            }
        } else {
            guard.state[slot].release();
        }
        let state = guard.state[slot].state();
        guard.events.push(Event::new(EventType::Footswitch, state, index, 0));
    } else {
        tracing::warn!(target: "bridge.input.libinput", keycode, "unused event keycode");
    }
}

/// Half-open `[base, base+count)`, correcting the original's inclusive
/// `case base ... base+count:` off-by-one.
fn in_range(keycode: u16, base: u16, count: u8) -> bool {
    keycode >= base && keycode < base + count as u16
}

fn update_tap_tempo_slot(tap: &mut TapTempoState, time_us: u64, timing: TimingConfig) {
    let (last, estimate, outcome) = gesture::update_tap_tempo(
        tap.last_tap_time,
        tap.estimate,
        time_us,
        timing.tap_timeout_ms * 1000,
        timing.tap_timeout_overflow_ms * 1000,
        timing.tap_hysteresis_ms * 1000,
    );
    tap.last_tap_time = last;
    tap.estimate = estimate;
    if let gesture::TapTempoOutcome::Updated { .. } = outcome {
        tap.updated = true;
    }
}

fn sweep_long_presses(shared: &Arc<Mutex<Shared>>, clock: &dyn Clock, threshold_ms: u32) {
    let mut guard = shared.lock().expect("libinput backend mutex poisoned");
    let now_ms = clock.now_ms();
    for slot in 0..guard.state.len() {
        if guard.state[slot].sweep_long_press(now_ms, threshold_ms) {
            let (etype, index) = rebase(slot);
            guard.events.push(Event::new(etype, EventState::LongPressed, index, 0));
        }
    }
}
