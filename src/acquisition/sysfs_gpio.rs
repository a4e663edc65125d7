//! Linux sysfs GPIO backend (`/sys/class/gpio`).
//!
//! Pins in the config use physical header numbering (as printed on the
//! Raspberry Pi 40-pin header). They are translated to kernel line numbers
//! here, offset by `chip_base` on kernels that number the SoC lines from a
//! non-zero base.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DigitalIo, GpioError};

/// Time udev needs to apply permissions to a freshly exported pin.
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

/// Physical header pin to BCM line number for the 40-pin header.
pub fn board_to_bcm(pin: u32) -> Option<u32> {
    let bcm = match pin {
        3 => 2,
        5 => 3,
        7 => 4,
        8 => 14,
        10 => 15,
        11 => 17,
        12 => 18,
        13 => 27,
        15 => 22,
        16 => 23,
        18 => 24,
        19 => 10,
        21 => 9,
        22 => 25,
        23 => 11,
        24 => 8,
        26 => 7,
        27 => 0,
        28 => 1,
        29 => 5,
        31 => 6,
        32 => 12,
        33 => 13,
        35 => 19,
        36 => 16,
        37 => 26,
        38 => 20,
        40 => 21,
        _ => return None,
    };
    Some(bcm)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

struct ExportedPin {
    line: u32,
    value_path: PathBuf,
    exported_by_us: bool,
}

/// sysfs-backed GPIO gateway.
pub struct SysfsGpio {
    root: PathBuf,
    pins: HashMap<u32, ExportedPin>,
}

impl SysfsGpio {
    /// Export and configure every pin the line uses.
    ///
    /// Failing to acquire any pin is fatal: the line must not run with a
    /// partially wired actuator bank.
    pub fn open(
        root: &Path,
        chip_base: u32,
        outputs: &[u32],
        inputs: &[u32],
    ) -> Result<Self, GpioError> {
        let mut gpio = Self {
            root: root.to_path_buf(),
            pins: HashMap::new(),
        };

        let wanted = outputs
            .iter()
            .map(|&p| (p, Direction::Out))
            .chain(inputs.iter().map(|&p| (p, Direction::In)));
        for (pin, direction) in wanted {
            let line = board_to_bcm(pin).ok_or(GpioError::UnmappedPin(pin))? + chip_base;
            let exported = gpio.export(pin, line, direction)?;
            gpio.pins.insert(pin, exported);
        }

        info!(
            root = %root.display(),
            outputs = outputs.len(),
            inputs = inputs.len(),
            "[GPIO] sysfs pins exported"
        );
        Ok(gpio)
    }

    fn export(&self, pin: u32, line: u32, direction: Direction) -> Result<ExportedPin, GpioError> {
        let dir = self.root.join(format!("gpio{line}"));
        let exported_by_us = if dir.exists() {
            debug!(pin, line, "[GPIO] line already exported");
            false
        } else {
            fs::write(self.root.join("export"), line.to_string())
                .map_err(|source| GpioError::Export { pin, source })?;
            thread::sleep(EXPORT_SETTLE);
            true
        };

        fs::write(dir.join("direction"), direction.as_str())
            .map_err(|source| GpioError::Direction { pin, source })?;

        Ok(ExportedPin {
            line,
            value_path: dir.join("value"),
            exported_by_us,
        })
    }

    fn pin(&self, pin: u32) -> Result<&ExportedPin, GpioError> {
        self.pins.get(&pin).ok_or(GpioError::UnknownPin(pin))
    }
}

impl DigitalIo for SysfsGpio {
    fn read(&self, pin: u32) -> Result<bool, GpioError> {
        let exported = self.pin(pin)?;
        let raw = fs::read_to_string(&exported.value_path)
            .map_err(|source| GpioError::Read { pin, source })?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(GpioError::InvalidLevel {
                pin,
                raw: other.to_string(),
            }),
        }
    }

    fn write(&self, pin: u32, level: bool) -> Result<(), GpioError> {
        let exported = self.pin(pin)?;
        fs::write(&exported.value_path, if level { "1" } else { "0" })
            .map_err(|source| GpioError::Write { pin, source })
    }

    fn backend_name(&self) -> &str {
        "sysfs"
    }

    fn release(&self) -> Result<(), GpioError> {
        let mut first_error = None;
        for (&pin, exported) in &self.pins {
            if !exported.exported_by_us {
                continue;
            }
            if let Err(source) = fs::write(self.root.join("unexport"), exported.line.to_string()) {
                warn!(pin, line = exported.line, error = %source, "[GPIO] Failed to unexport pin");
                first_error.get_or_insert(GpioError::Unexport { pin, source });
            }
        }
        info!("[GPIO] sysfs pins released");
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay out a fake sysfs tree where every line is already exported.
    fn fake_root(lines: &[u32]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for line in lines {
            let gpio = dir.path().join(format!("gpio{line}"));
            fs::create_dir_all(&gpio).unwrap();
            fs::write(gpio.join("direction"), "in").unwrap();
            fs::write(gpio.join("value"), "1\n").unwrap();
        }
        dir
    }

    #[test]
    fn test_board_mapping_covers_default_pins() {
        for pin in [11, 13, 15, 12, 8, 7, 5, 29, 31] {
            assert!(board_to_bcm(pin).is_some(), "pin {pin} should map");
        }
        assert_eq!(board_to_bcm(11), Some(17));
        assert_eq!(board_to_bcm(1), None);
    }

    #[test]
    fn test_open_sets_directions() {
        let root = fake_root(&[17, 3]);
        let _gpio = SysfsGpio::open(root.path(), 0, &[11], &[5]).unwrap();

        let out_dir = fs::read_to_string(root.path().join("gpio17/direction")).unwrap();
        let in_dir = fs::read_to_string(root.path().join("gpio3/direction")).unwrap();
        assert_eq!(out_dir, "out");
        assert_eq!(in_dir, "in");
    }

    #[test]
    fn test_read_and_write_values() {
        let root = fake_root(&[517]);
        let gpio = SysfsGpio::open(root.path(), 500, &[11], &[]).unwrap();

        assert!(gpio.read(11).unwrap());
        gpio.write(11, false).unwrap();
        assert!(!gpio.read(11).unwrap());
    }

    #[test]
    fn test_invalid_level_and_unknown_pin() {
        let root = fake_root(&[17]);
        let gpio = SysfsGpio::open(root.path(), 0, &[11], &[]).unwrap();
        fs::write(root.path().join("gpio17/value"), "x").unwrap();

        assert!(matches!(gpio.read(11), Err(GpioError::InvalidLevel { pin: 11, .. })));
        assert!(matches!(gpio.read(13), Err(GpioError::UnknownPin(13))));
    }

    #[test]
    fn test_unmapped_pin_is_rejected() {
        let root = fake_root(&[]);
        assert!(matches!(
            SysfsGpio::open(root.path(), 0, &[2], &[]),
            Err(GpioError::UnmappedPin(2))
        ));
    }
}
