//! Sorter Configuration - lane table, pin map, timing and I/O settings
//!
//! Every constant the stock line hardcoded is a field here. Each struct
//! implements `Default` with the values from [`super::defaults`], so a
//! deployment without a config file behaves exactly like the stock line.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::pipeline::LANE_COUNT;

/// File looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "sorter_config.toml";

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "SORTER_CONFIG";

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one sorting line.
///
/// Load with [`SorterConfig::load`], which searches:
/// 1. an explicit path (`--config`)
/// 2. `$SORTER_CONFIG`
/// 3. `./sorter_config.toml`
/// 4. built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SorterConfig {
    /// Cycle dwell and every polling interval
    #[serde(default)]
    pub timing: TimingSettings,

    /// Lane table, in lane order
    #[serde(default = "default_lanes")]
    pub lanes: Vec<LaneConfig>,

    /// Non-lane payloads
    #[serde(default)]
    pub codes: CodeConfig,

    /// Digital I/O backend and polarity
    #[serde(default)]
    pub gpio: GpioConfig,

    /// Frame source and stream rates
    #[serde(default)]
    pub camera: CameraConfig,

    /// Dashboard server
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            timing: TimingSettings::default(),
            lanes: default_lanes(),
            codes: CodeConfig::default(),
            gpio: GpioConfig::default(),
            camera: CameraConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl SorterConfig {
    /// Load configuration using the standard search order.
    ///
    /// An explicit path that does not exist is an error: the operator asked
    /// for a specific file and the line must not silently run on defaults.
    /// A file that exists but fails to load is logged and skipped, as is a
    /// `$SORTER_CONFIG` pointing nowhere; the built-in defaults are always a
    /// valid last resort.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut candidates: Vec<(PathBuf, &str)> = Vec::new();
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Io(
                    path.to_path_buf(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "config file does not exist"),
                ));
            }
            candidates.push((path.to_path_buf(), "--config"));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                candidates.push((path, CONFIG_ENV_VAR));
            } else {
                warn!(path = %path.display(), "SORTER_CONFIG points to non-existent file, falling back");
            }
        }
        candidates.push((PathBuf::from(DEFAULT_CONFIG_FILE), "working directory"));

        for (path, origin) in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        origin,
                        cycle_delay = config.timing.cycle_delay_secs,
                        "Loaded sorter config"
                    );
                    return Ok(config);
                }
                Err(e) => {
                    warn!(path = %path.display(), origin, error = %e, "Failed to load sorter config, falling back");
                }
            }
        }

        info!(
            cycle_delay = defaults::CYCLE_DELAY_SECS,
            "No sorter config found, using built-in defaults"
        );
        Ok(Self::default())
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the config to disk.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Sorter config saved");
        Ok(())
    }

    /// Validate the whole config, reporting every problem at once.
    ///
    /// Rules:
    /// - exactly three lanes
    /// - lane codes non-empty and unique after normalization, none equal to the reject code
    /// - every pin used once
    /// - `cycle_delay_secs` finite and within (0, 10]
    /// - all intervals and rates non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.lanes.len() != LANE_COUNT {
            errors.push(format!(
                "lanes: expected exactly {LANE_COUNT} lanes, got {}",
                self.lanes.len()
            ));
        }

        let reject = normalize_code(&self.codes.reject);
        if reject.is_empty() {
            errors.push("codes.reject: must not be empty".to_string());
        }

        let mut seen_codes = HashSet::new();
        let mut seen_pins = HashSet::new();
        for (idx, lane) in self.lanes.iter().enumerate() {
            let code = normalize_code(&lane.code);
            if code.is_empty() {
                errors.push(format!("lanes[{idx}].code: must not be empty"));
            } else if code == reject {
                errors.push(format!("lanes[{idx}].code: '{code}' collides with the reject code"));
            } else if !seen_codes.insert(code.clone()) {
                errors.push(format!("lanes[{idx}].code: '{code}' is used by another lane"));
            }

            for (label, pin) in [
                ("push_pin", lane.push_pin),
                ("pull_pin", lane.pull_pin),
                ("sensor_pin", lane.sensor_pin),
            ] {
                if !seen_pins.insert(pin) {
                    errors.push(format!("lanes[{idx}].{label}: pin {pin} is already assigned"));
                }
            }
        }

        let t = &self.timing;
        if !t.cycle_delay_secs.is_finite()
            || t.cycle_delay_secs <= 0.0
            || t.cycle_delay_secs > defaults::MAX_CYCLE_DELAY_SECS
        {
            errors.push(format!(
                "timing.cycle_delay_secs: must be within (0, {}], got {}",
                defaults::MAX_CYCLE_DELAY_SECS,
                t.cycle_delay_secs
            ));
        }
        for (name, value) in [
            ("timing.settle_ms", t.settle_ms),
            ("timing.scan_interval_ms", t.scan_interval_ms),
            ("timing.dedup_window_secs", t.dedup_window_secs),
            ("timing.arrival_timeout_secs", t.arrival_timeout_secs),
            ("timing.arrival_poll_ms", t.arrival_poll_ms),
            ("timing.broadcast_interval_ms", t.broadcast_interval_ms),
            ("camera.reconnect_delay_ms", self.camera.reconnect_delay_ms),
        ] {
            if value == 0 {
                errors.push(format!("{name}: must be greater than zero"));
            }
        }
        if t.arrival_poll_ms >= t.arrival_timeout_secs.saturating_mul(1_000) {
            errors.push("timing.arrival_poll_ms: must be shorter than the arrival timeout".to_string());
        }

        if self.camera.capture_fps == 0 {
            errors.push("camera.capture_fps: must be greater than zero".to_string());
        }
        if self.camera.stream_fps == 0 {
            errors.push("camera.stream_fps: must be greater than zero".to_string());
        }
        if self.server.client_buffer == 0 {
            errors.push("server.client_buffer: must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Normalize a scanned or configured code: trimmed and uppercased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ============================================================================
// Timing
// ============================================================================

/// Dwell time and every polling interval the coordinator uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Push actuator dwell (seconds)
    pub cycle_delay_secs: f64,
    /// Pause between actuator changes (ms)
    pub settle_ms: u64,
    /// Detection loop period (ms)
    pub scan_interval_ms: u64,
    /// Repeat-payload suppression window (seconds)
    pub dedup_window_secs: u64,
    /// Arrival wait bound (seconds)
    pub arrival_timeout_secs: u64,
    /// Arrival sensor polling period (ms)
    pub arrival_poll_ms: u64,
    /// Snapshot broadcast period (ms)
    pub broadcast_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            cycle_delay_secs: defaults::CYCLE_DELAY_SECS,
            settle_ms: defaults::SETTLE_MS,
            scan_interval_ms: defaults::SCAN_INTERVAL_MS,
            dedup_window_secs: defaults::DEDUP_WINDOW_SECS,
            arrival_timeout_secs: defaults::ARRIVAL_TIMEOUT_SECS,
            arrival_poll_ms: defaults::ARRIVAL_POLL_MS,
            broadcast_interval_ms: defaults::BROADCAST_INTERVAL_MS,
        }
    }
}

impl TimingSettings {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_delay_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn arrival_timeout(&self) -> Duration {
        Duration::from_secs(self.arrival_timeout_secs)
    }

    pub fn arrival_poll(&self) -> Duration {
        Duration::from_millis(self.arrival_poll_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }
}

// ============================================================================
// Lanes
// ============================================================================

/// One sorting destination: its label, its QR code and its three pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub name: String,
    pub code: String,
    pub push_pin: u32,
    pub pull_pin: u32,
    pub sensor_pin: u32,
}

fn default_lanes() -> Vec<LaneConfig> {
    (0..LANE_COUNT)
        .map(|i| LaneConfig {
            name: defaults::LANE_NAMES[i].to_string(),
            code: defaults::LANE_CODES[i].to_string(),
            push_pin: defaults::PUSH_PINS[i],
            pull_pin: defaults::PULL_PINS[i],
            sensor_pin: defaults::SENSOR_PINS[i],
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Payload marking a product as rejected (logged, never sorted)
    #[serde(default = "default_reject_code")]
    pub reject: String,
}

fn default_reject_code() -> String {
    defaults::REJECT_CODE.to_string()
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            reject: default_reject_code(),
        }
    }
}

// ============================================================================
// GPIO
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpioBackend {
    /// Linux `/sys/class/gpio`
    Sysfs,
    /// In-memory pins, for bench runs without hardware
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub backend: GpioBackend,
    /// Relays engage when the pin is driven low
    pub relay_active_low: bool,
    /// Sensors report an item by pulling the pin low
    pub sensor_active_low: bool,
    /// Root of the sysfs GPIO tree
    pub sysfs_root: PathBuf,
    /// Kernel number of the first SoC GPIO line (512 on recent Pi kernels)
    pub chip_base: u32,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: GpioBackend::Sysfs,
            relay_active_low: true,
            sensor_active_low: true,
            sysfs_root: PathBuf::from(defaults::SYSFS_GPIO_ROOT),
            chip_base: 0,
        }
    }
}

// ============================================================================
// Camera
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// JPEG continuously rewritten by the capture process
    pub snapshot_path: PathBuf,
    pub capture_fps: u32,
    pub stream_fps: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(defaults::SNAPSHOT_PATH),
            capture_fps: defaults::CAPTURE_FPS,
            stream_fps: defaults::STREAM_FPS,
            reconnect_delay_ms: defaults::CAMERA_RECONNECT_DELAY_MS,
        }
    }
}

impl CameraConfig {
    pub fn capture_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.capture_fps.max(1)))
    }

    pub fn stream_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.stream_fps.max(1)))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address.
    ///
    /// Can be overridden by `SORTER_ADDR` env var or `--addr` CLI flag.
    pub addr: String,
    /// Outbound messages queued per dashboard client
    pub client_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            client_buffer: defaults::CLIENT_BUFFER,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
