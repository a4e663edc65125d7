//! Digital I/O acquisition module
//!
//! Raw pin access lives behind [`DigitalIo`]. Everything above this module
//! talks to [`ActuatorBank`], which applies the configured polarity so the
//! coordinator only deals in logical "engaged" and "item present" booleans.

pub mod actuators;
pub mod simulated;
pub mod sysfs_gpio;

pub use actuators::{ActuatorBank, LaneReading};
pub use simulated::{PinWrite, SimulatedIo};
pub use sysfs_gpio::SysfsGpio;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum GpioError {
    #[error("failed to export pin {pin}: {source}")]
    Export {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to unexport pin {pin}: {source}")]
    Unexport {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set direction of pin {pin}: {source}")]
    Direction {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read pin {pin}: {source}")]
    Read {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write pin {pin}: {source}")]
    Write {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("pin {pin} returned unexpected value {raw:?}")]
    InvalidLevel { pin: u32, raw: String },

    #[error("pin {0} has no board-to-line mapping")]
    UnmappedPin(u32),

    #[error("lane {0} does not exist")]
    UnknownLane(usize),

    #[error("pin {0} is not configured")]
    UnknownPin(u32),
}

// ============================================================================
// Gateway Trait
// ============================================================================

/// Pin-level access to the line's sensors and relays.
///
/// Levels are electrical (`true` = high). No debouncing and no retries:
/// timeouts and polling live in the coordinator. Writing the same level
/// twice must be harmless.
pub trait DigitalIo: Send + Sync + 'static {
    /// Read the current level of an input or output pin.
    fn read(&self, pin: u32) -> Result<bool, GpioError>;

    /// Drive an output pin.
    fn write(&self, pin: u32, level: bool) -> Result<(), GpioError>;

    /// Human-readable backend name for logging (e.g. "sysfs", "simulated").
    fn backend_name(&self) -> &str;

    /// Give the pins back to the system. Called once during shutdown.
    fn release(&self) -> Result<(), GpioError> {
        Ok(())
    }
}

/// The three pins that belong to one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanePins {
    pub push: u32,
    pub pull: u32,
    pub sensor: u32,
}

impl From<&crate::config::LaneConfig> for LanePins {
    fn from(lane: &crate::config::LaneConfig) -> Self {
        Self {
            push: lane.push_pin,
            pull: lane.pull_pin,
            sensor: lane.sensor_pin,
        }
    }
}
