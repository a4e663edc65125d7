//! System-wide default constants.
//!
//! Every interval and timeout the coordinator depends on lives here so the
//! behavioural contract is visible in one place. All of them can be
//! overridden from `sorter_config.toml`.

// ============================================================================
// Actuation
// ============================================================================

/// Dwell time the push actuator stays engaged during a sort (seconds).
pub const CYCLE_DELAY_SECS: f64 = 0.3;

/// Upper bound accepted for `cycle_delay_secs` (seconds).
pub const MAX_CYCLE_DELAY_SECS: f64 = 10.0;

/// Pause between actuator state changes (ms).
pub const SETTLE_MS: u64 = 200;

// ============================================================================
// Detection
// ============================================================================

/// Delay between detection loop iterations (ms).
///
/// Bounds decode rate to 4 Hz regardless of capture rate.
pub const SCAN_INTERVAL_MS: u64 = 250;

/// Window during which a repeated payload is ignored (seconds).
pub const DEDUP_WINDOW_SECS: u64 = 3;

/// Lane codes recognised by default, in lane order.
pub const LANE_CODES: [&str; 3] = ["LOAI1", "LOAI2", "LOAI3"];

/// Default lane display names, in lane order.
pub const LANE_NAMES: [&str; 3] = ["Loai 1", "Loai 2", "Loai 3"];

/// Payload marking a rejected product.
pub const REJECT_CODE: &str = "NG";

// ============================================================================
// Arrival wait
// ============================================================================

/// How long a lane waits for its sensor after a trigger (seconds).
pub const ARRIVAL_TIMEOUT_SECS: u64 = 15;

/// Sensor polling interval while waiting for arrival (ms).
pub const ARRIVAL_POLL_MS: u64 = 50;

// ============================================================================
// Broadcaster
// ============================================================================

/// State snapshot broadcast period (ms).
pub const BROADCAST_INTERVAL_MS: u64 = 500;

/// Per-client outbound queue depth before the client is considered stuck.
pub const CLIENT_BUFFER: usize = 64;

// ============================================================================
// GPIO (board pin numbers)
// ============================================================================

/// Push actuator pins, in lane order.
pub const PUSH_PINS: [u32; 3] = [11, 13, 15];

/// Pull (retract-hold) actuator pins, in lane order.
pub const PULL_PINS: [u32; 3] = [12, 8, 7];

/// Arrival sensor pins, in lane order.
pub const SENSOR_PINS: [u32; 3] = [5, 29, 31];

/// Linux sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

// ============================================================================
// Camera
// ============================================================================

/// Capture rate of the frame source (frames per second).
pub const CAPTURE_FPS: u32 = 30;

/// Maximum rate of the MJPEG dashboard stream (frames per second).
pub const STREAM_FPS: u32 = 20;

/// Wait before reopening a camera that stopped delivering frames (ms).
pub const CAMERA_RECONNECT_DELAY_MS: u64 = 1_000;

/// JPEG written by the external capture process.
pub const SNAPSHOT_PATH: &str = "/dev/shm/lane-sorter/frame.jpg";

// ============================================================================
// Server / lifecycle
// ============================================================================

/// Dashboard bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:5000";

/// Grace period between stopping the loops and forcing actuators to rest (ms).
pub const SHUTDOWN_SETTLE_MS: u64 = 500;

// ============================================================================
// Simulation
// ============================================================================

/// How long a `qr <PAYLOAD>` console command keeps the code in view (ms).
pub const SIM_CODE_VISIBLE_MS: u64 = 1_000;

/// How long an `item <lane>` console command holds the sensor active (ms).
pub const SIM_ITEM_PULSE_MS: u64 = 500;

/// Writes the simulated GPIO bank remembers for inspection.
pub const SIM_JOURNAL_CAPACITY: usize = 4_096;
