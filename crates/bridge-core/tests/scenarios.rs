//! End-to-end exercises of `EventBridge` against fake backends, standing in
//! for the scenario walkthroughs: a press/release pair, a long press, and a
//! tap-tempo sequence all flow through `poll` and reach the callback in
//! arrival order.

use std::sync::{Arc, Mutex};

use bridge_core::EventBridge;
use bridge_input::InputBackend;
use bridge_types::{Event, EventState, EventType};

/// A scripted input backend: each `poll()` call returns the next queued
/// batch of events, mimicking a single backend's reader thread handing off
/// whatever accumulated since the last drain.
struct ScriptedInput {
    batches: Vec<Vec<Event>>,
    cursor: usize,
    cleared: bool,
}

impl ScriptedInput {
    fn new(batches: Vec<Vec<Event>>) -> Self {
        Self {
            batches,
            cursor: 0,
            cleared: false,
        }
    }
}

impl InputBackend for ScriptedInput {
    fn poll(&mut self) -> Vec<Event> {
        if self.cursor >= self.batches.len() {
            return Vec::new();
        }
        let batch = self.batches[self.cursor].clone();
        self.cursor += 1;
        batch
    }

    fn clear(&mut self) {
        self.cleared = true;
        self.cursor = self.batches.len();
    }

    fn enable_tap_tempo(&mut self, _etype: EventType, _index: u8, _enable: bool) {}
}

fn collecting_bridge() -> (EventBridge<impl FnMut(Event) + Send>, Arc<Mutex<Vec<Event>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let bridge = EventBridge::new(move |event: Event| {
        sink.lock().unwrap().push(event);
    });
    (bridge, received)
}

#[test]
fn press_then_release_arrives_in_order() {
    let (mut bridge, received) = collecting_bridge();
    bridge.add_input_for_test(Box::new(ScriptedInput::new(vec![
        vec![Event::new(EventType::Footswitch, EventState::Pressed, 0, 0)],
        vec![Event::new(EventType::Footswitch, EventState::Released, 0, 0)],
    ])));

    bridge.poll();
    bridge.poll();

    let events = received.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].state, EventState::Pressed);
    assert_eq!(events[1].state, EventState::Released);
}

#[test]
fn long_press_follows_the_initial_press_event() {
    let (mut bridge, received) = collecting_bridge();
    bridge.add_input_for_test(Box::new(ScriptedInput::new(vec![
        vec![Event::new(EventType::Footswitch, EventState::Pressed, 1, 0)],
        vec![Event::new(EventType::Footswitch, EventState::LongPressed, 1, 0)],
        vec![Event::new(EventType::Footswitch, EventState::Released, 1, 0)],
    ])));

    bridge.poll();
    bridge.poll();
    bridge.poll();

    let events = received.lock().unwrap();
    assert_eq!(
        events.iter().map(|e| e.state).collect::<Vec<_>>(),
        vec![EventState::Pressed, EventState::LongPressed, EventState::Released]
    );
}

#[test]
fn tap_tempo_estimate_rides_on_the_encoder_click_event() {
    let (mut bridge, received) = collecting_bridge();
    bridge.add_input_for_test(Box::new(ScriptedInput::new(vec![
        vec![Event::new(EventType::Encoder, EventState::TapTempo, 2, 500)],
    ])));

    bridge.poll();

    let events = received.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, EventState::TapTempo);
    assert_eq!(events[0].value, 500);
}

#[test]
fn clear_stops_further_delivery_from_that_backend() {
    let (mut bridge, received) = collecting_bridge();
    bridge.add_input_for_test(Box::new(ScriptedInput::new(vec![
        vec![Event::new(EventType::Footswitch, EventState::Pressed, 0, 0)],
        vec![Event::new(EventType::Footswitch, EventState::Released, 0, 0)],
    ])));

    bridge.clear();
    bridge.poll();
    bridge.poll();

    assert!(received.lock().unwrap().is_empty());
}
