//! Logical view of the relays and sensors, per lane.

use std::sync::Arc;
use tracing::{info, warn};

use super::{DigitalIo, GpioError, LanePins};
use crate::config::{GpioConfig, SorterConfig};

/// One sample of a lane's I/O, already translated to logical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneReading {
    /// An item is in front of the lane sensor
    pub sensor: bool,
    /// Pull (retract-hold) actuator is engaged
    pub relay_grab: bool,
    /// Push actuator is engaged
    pub relay_push: bool,
}

/// Lane-indexed relays and sensors with polarity applied.
pub struct ActuatorBank {
    io: Arc<dyn DigitalIo>,
    lanes: Vec<LanePins>,
    relay_active_low: bool,
    sensor_active_low: bool,
}

impl ActuatorBank {
    pub fn new(io: Arc<dyn DigitalIo>, lanes: Vec<LanePins>, gpio: &GpioConfig) -> Self {
        Self {
            io,
            lanes,
            relay_active_low: gpio.relay_active_low,
            sensor_active_low: gpio.sensor_active_low,
        }
    }

    pub fn from_config(io: Arc<dyn DigitalIo>, config: &SorterConfig) -> Self {
        let lanes = config.lanes.iter().map(LanePins::from).collect();
        Self::new(io, lanes, &config.gpio)
    }

    pub fn pins(&self, lane: usize) -> Result<LanePins, GpioError> {
        self.lanes.get(lane).copied().ok_or(GpioError::UnknownLane(lane))
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn backend_name(&self) -> &str {
        self.io.backend_name()
    }

    /// Electrical level that engages a relay.
    pub const fn engaged_level(&self) -> bool {
        !self.relay_active_low
    }

    /// Electrical level a sensor shows when an item is present.
    pub const fn present_level(&self) -> bool {
        !self.sensor_active_low
    }

    pub fn engage(&self, pin: u32) -> Result<(), GpioError> {
        self.io.write(pin, self.engaged_level())
    }

    pub fn release(&self, pin: u32) -> Result<(), GpioError> {
        self.io.write(pin, !self.engaged_level())
    }

    pub fn is_engaged(&self, pin: u32) -> Result<bool, GpioError> {
        Ok(self.io.read(pin)? == self.engaged_level())
    }

    pub fn item_present(&self, lane: usize) -> Result<bool, GpioError> {
        let pins = self.pins(lane)?;
        Ok(self.io.read(pins.sensor)? == self.present_level())
    }

    pub fn read_lane(&self, lane: usize) -> Result<LaneReading, GpioError> {
        let pins = self.pins(lane)?;
        Ok(LaneReading {
            sensor: self.io.read(pins.sensor)? == self.present_level(),
            relay_grab: self.is_engaged(pins.pull)?,
            relay_push: self.is_engaged(pins.push)?,
        })
    }

    /// Put one lane in its resting state: push released, pull engaged.
    ///
    /// Both writes are attempted even if the first fails; the first error
    /// is returned.
    pub fn rest_lane(&self, lane: usize) -> Result<(), GpioError> {
        let pins = self.pins(lane)?;
        let push = self.release(pins.push);
        let pull = self.engage(pins.pull);
        push.and(pull)
    }

    /// Force every lane to its resting state, logging failures.
    ///
    /// Returns the number of lanes that could not be rested.
    pub fn rest_all(&self) -> usize {
        info!("[GPIO] Resetting all relays to resting state (pull engaged, push released)");
        let mut failures = 0;
        for lane in 0..self.lanes.len() {
            if let Err(e) = self.rest_lane(lane) {
                warn!(lane, error = %e, "[GPIO] Failed to rest lane");
                failures += 1;
            }
        }
        failures
    }

    pub fn release_io(&self) -> Result<(), GpioError> {
        self.io.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SimulatedIo;

    fn bank(sim: &Arc<SimulatedIo>, active_low: bool) -> ActuatorBank {
        let gpio = GpioConfig {
            relay_active_low: active_low,
            sensor_active_low: active_low,
            ..GpioConfig::default()
        };
        let lanes = vec![LanePins { push: 11, pull: 12, sensor: 5 }];
        ActuatorBank::new(sim.clone(), lanes, &gpio)
    }

    #[test]
    fn test_active_low_engage_drives_pin_low() {
        let sim = Arc::new(SimulatedIo::new());
        let bank = bank(&sim, true);

        bank.engage(11).unwrap();
        assert_eq!(sim.level(11), Some(false));
        assert!(bank.is_engaged(11).unwrap());

        bank.release(11).unwrap();
        assert_eq!(sim.level(11), Some(true));
        assert!(!bank.is_engaged(11).unwrap());
    }

    #[test]
    fn test_active_high_engage_drives_pin_high() {
        let sim = Arc::new(SimulatedIo::new());
        let bank = bank(&sim, false);

        bank.engage(12).unwrap();
        assert_eq!(sim.level(12), Some(true));
    }

    #[test]
    fn test_sensor_polarity() {
        let sim = Arc::new(SimulatedIo::new());
        let bank = bank(&sim, true);

        // Pull-up idle level: nothing in front of the sensor
        assert!(!bank.item_present(0).unwrap());
        sim.set_input(5, false);
        assert!(bank.item_present(0).unwrap());
    }

    #[test]
    fn test_rest_lane_sets_resting_state() {
        let sim = Arc::new(SimulatedIo::new());
        let bank = bank(&sim, true);

        bank.engage(11).unwrap();
        bank.release(12).unwrap();
        tokio_test::assert_ok!(bank.rest_lane(0));

        let reading = bank.read_lane(0).unwrap();
        assert!(reading.relay_grab);
        assert!(!reading.relay_push);
    }

    #[test]
    fn test_rest_lane_attempts_pull_after_push_failure() {
        let sim = Arc::new(SimulatedIo::new());
        let bank = bank(&sim, true);
        sim.fail_writes_to(11);

        tokio_test::assert_err!(bank.rest_lane(0));
        assert!(bank.is_engaged(12).unwrap());
    }

    #[test]
    fn test_unknown_lane() {
        let sim = Arc::new(SimulatedIo::new());
        let bank = bank(&sim, true);
        assert!(matches!(bank.item_present(4), Err(GpioError::UnknownLane(4))));
    }
}
