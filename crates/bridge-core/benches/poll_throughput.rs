//! Exercises `EventBridge::poll` throughput when every registered backend's
//! queue is already saturated, i.e. the steady-state case of a busy session
//! rather than the empty-poll idle case.

use std::hint::black_box;

use bridge_core::EventBridge;
use bridge_input::InputBackend;
use bridge_types::{Event, EventState, EventType};
use criterion::{criterion_group, criterion_main, Criterion};

/// Hands back a fixed batch of events on every `poll` call, standing in for
/// a backend whose queue never runs dry under load.
struct SaturatedBackend {
    batch: Vec<Event>,
}

impl SaturatedBackend {
    fn new(batch_size: usize) -> Self {
        let batch = (0..batch_size)
            .map(|i| Event::new(EventType::Encoder, EventState::Pressed, (i % 6) as u8, 1))
            .collect();
        Self { batch }
    }
}

impl InputBackend for SaturatedBackend {
    fn poll(&mut self) -> Vec<Event> {
        self.batch.clone()
    }

    fn clear(&mut self) {}

    fn enable_tap_tempo(&mut self, _etype: EventType, _index: u8, _enable: bool) {}
}

fn poll_with_saturated_queue(c: &mut Criterion) {
    let mut bridge = EventBridge::new(|event: Event| {
        black_box(event);
    });
    bridge.add_input_for_test(Box::new(SaturatedBackend::new(256)));

    c.bench_function("poll_saturated_256", |b| {
        b.iter(|| bridge.poll());
    });
}

criterion_group!(benches, poll_with_saturated_queue);
criterion_main!(benches);
