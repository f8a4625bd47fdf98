use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use bridge_types::BridgeError;

use crate::OutputBackend;

pub struct GpioOutputBackend {
    file: File,
}

impl GpioOutputBackend {
    pub fn new(gpio_id: &str) -> Result<Self, BridgeError> {
        let path = format!("/sys/class/gpio/gpio{gpio_id}/value");
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|source| BridgeError::BackendUnavailable {
                backend: "gpio-output",
                id: gpio_id.to_string(),
                source,
            })?;
        Ok(Self { file })
    }
}

impl OutputBackend for GpioOutputBackend {
    fn emit(&mut self, value: i32) {
        if self.file.seek(SeekFrom::Start(0)).is_err() {
            return;
        }
        if let Err(source) = write!(self.file, "{value}") {
            tracing::warn!(target: "bridge.output.gpio", %source, "write failed");
            return;
        }
        let _ = self.file.flush();
    }
}
