use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use bridge_types::BridgeError;

use crate::OutputBackend;

const COLORS: [&str; 3] = ["red", "green", "blue"];

struct Channel {
    file: Option<File>,
    max_brightness: i32,
    last_value: i32,
}

/// An RGB LED exposed as three sysfs brightness files. `emit(value)` unpacks
/// `value` into three 4-bit nibbles (`r = (value >> 8) & 0xf`, etc.) and
/// writes each changed channel scaled to a tenth of its hardware maximum —
/// the full range is uncomfortably bright on the reference panel.
pub struct SysfsLedBackend {
    channels: [Channel; 3],
}

impl SysfsLedBackend {
    pub fn new(id: &str) -> Result<Self, BridgeError> {
        let channels = COLORS
            .iter()
            .map(|color| init_channel(id, color))
            .collect::<Result<Vec<_>, _>>()?;
        let channels: [Channel; 3] = channels
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly three colors"));
        Ok(Self { channels })
    }
}

fn init_channel(id: &str, color: &str) -> Result<Channel, BridgeError> {
    let max_path = format!("/sys/class/leds/{id}:{color}/max_brightness");
    let mut max_file = File::open(&max_path).map_err(|source| BridgeError::BackendUnavailable {
        backend: "sysfs-led",
        id: format!("{id}:{color}"),
        source,
    })?;

    let mut text = String::new();
    max_file
        .read_to_string(&mut text)
        .map_err(|source| BridgeError::BackendUnavailable {
            backend: "sysfs-led",
            id: format!("{id}:{color}"),
            source,
        })?;
    let max_brightness: i32 = text.trim().parse().unwrap_or(0);

    let brightness_path = format!("/sys/class/leds/{id}:{color}/brightness");
    let mut file = OpenOptions::new()
        .write(true)
        .open(&brightness_path)
        .map_err(|source| BridgeError::BackendUnavailable {
            backend: "sysfs-led",
            id: format!("{id}:{color}"),
            source,
        })?;

    // start at minimum brightness
    let _ = write!(file, "0");
    let _ = file.flush();

    Ok(Channel { file: Some(file), max_brightness, last_value: 0 })
}

fn scale(component: i32, max_brightness: i32) -> i32 {
    ((component as f64 / 15.0) * max_brightness as f64 * 0.1).round() as i32
}

impl OutputBackend for SysfsLedBackend {
    fn emit(&mut self, value: i32) {
        let components = [
            (value >> 8) & 0xf,
            (value >> 4) & 0xf,
            value & 0xf,
        ];

        for (channel, component) in self.channels.iter_mut().zip(components) {
            if channel.last_value == component {
                continue;
            }
            channel.last_value = component;

            let Some(file) = channel.file.as_mut() else {
                continue;
            };
            let brightness = scale(component, channel.max_brightness);

            if file.seek(SeekFrom::Start(0)).is_err() {
                continue;
            }
            if let Err(source) = write!(file, "{brightness}") {
                tracing::warn!(target: "bridge.output.led", %source, "write failed");
                continue;
            }
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_fixture(dir: &Path, id: &str, color: &str, max_brightness: &str) {
        let led_dir = dir.join(format!("{id}:{color}"));
        std::fs::create_dir_all(&led_dir).unwrap();
        std::fs::write(led_dir.join("max_brightness"), max_brightness).unwrap();
        std::fs::write(led_dir.join("brightness"), "0").unwrap();
    }

    fn read_brightness(dir: &Path, id: &str, color: &str) -> String {
        std::fs::read_to_string(dir.join(format!("{id}:{color}")).join("brightness")).unwrap()
    }

    fn backend_over(dir: &Path, id: &str) -> SysfsLedBackend {
        let channels: Vec<Channel> = COLORS
            .iter()
            .map(|color| {
                let brightness_path = dir.join(format!("{id}:{color}")).join("brightness");
                let max_path = dir.join(format!("{id}:{color}")).join("max_brightness");
                let max_brightness: i32 =
                    std::fs::read_to_string(max_path).unwrap().trim().parse().unwrap();
                let file = OpenOptions::new().write(true).open(brightness_path).unwrap();
                Channel { file: Some(file), max_brightness, last_value: 0 }
            })
            .collect();
        SysfsLedBackend {
            channels: channels.try_into().unwrap_or_else(|_| unreachable!()),
        }
    }

    #[test]
    fn pure_green_scales_to_a_tenth_of_max_brightness() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "panel", "red", "100");
        write_fixture(dir.path(), "panel", "green", "100");
        write_fixture(dir.path(), "panel", "blue", "100");

        let mut backend = backend_over(dir.path(), "panel");
        backend.emit(0x0F0);

        assert_eq!(read_brightness(dir.path(), "panel", "red"), "0");
        assert_eq!(read_brightness(dir.path(), "panel", "green"), "10");
        assert_eq!(read_brightness(dir.path(), "panel", "blue"), "0");
    }

    #[test]
    fn unchanged_channel_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "panel", "red", "100");
        write_fixture(dir.path(), "panel", "green", "100");
        write_fixture(dir.path(), "panel", "blue", "100");

        let mut backend = backend_over(dir.path(), "panel");
        backend.emit(0x0F0);
        backend.channels[1].last_value = 99; // force a sentinel we'd notice if rewritten
        backend.emit(0x0F0); // identical packed value: green component (0xf) unchanged

        // sentinel untouched because emit() saw no change in the packed nibble
        assert_eq!(backend.channels[1].last_value, 99);
    }

    #[test]
    fn scale_rounds_to_nearest() {
        assert_eq!(scale(15, 100), 10);
        assert_eq!(scale(0, 100), 0);
        assert_eq!(scale(8, 100), 5); // 8/15*10 = 5.33 -> rounds to 5
    }
}
