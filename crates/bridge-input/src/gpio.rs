//! Minimal sysfs GPIO input driver: edge-triggered only, no long-press (see
//! the open question in the design notes — left out of scope deliberately).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};

use bridge_types::{BridgeError, Event, EventState, EventType};

use crate::InputBackend;

pub struct GpioInputBackend {
    index: u8,
    file: Option<File>,
    last_value: Option<i32>,
}

impl GpioInputBackend {
    pub fn new(gpio_id: &str, index: u8) -> Result<Self, BridgeError> {
        let path = format!("/sys/class/gpio/gpio{gpio_id}/value");
        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|source| BridgeError::BackendUnavailable {
                backend: "gpio-input",
                id: gpio_id.to_string(),
                source,
            })?;
        Ok(Self { index, file: Some(file), last_value: None })
    }
}

impl InputBackend for GpioInputBackend {
    fn poll(&mut self) -> Vec<Event> {
        let Some(file) = self.file.as_mut() else {
            return Vec::new();
        };

        let mut text = String::new();
        if file.seek(SeekFrom::Start(0)).is_err() {
            return Vec::new();
        }
        if file.read_to_string(&mut text).is_err() {
            return Vec::new();
        }

        let value: i32 = match text.trim().parse() {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        if self.last_value == Some(value) {
            return Vec::new();
        }
        self.last_value = Some(value);

        let state = if value != 0 { EventState::Pressed } else { EventState::Released };
        vec![Event::new(EventType::Footswitch, state, self.index, 0)]
    }

    fn clear(&mut self) {
        self.last_value = None;
    }

    fn enable_tap_tempo(&mut self, _etype: EventType, _index: u8, _enable: bool) {
        // no tap-tempo support on the GPIO backend; matches the original,
        // which has no tap-tempo state array for this driver at all.
    }
}
