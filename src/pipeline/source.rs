//! Frame source abstraction for camera ingestion.
//!
//! A [`FrameSource`] produces camera frames; the [`CaptureLoop`] paces it
//! and overwrites the single-slot [`FrameSlot`]. Readers (detection loop,
//! video stream) sample the slot without ever blocking the capture side,
//! so a slow reader loses frames instead of building a backlog.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Encoded JPEG image
    Jpeg,
    /// Already-decoded text, produced by scripted sources
    Payload,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub format: FrameFormat,
    pub data: Vec<u8>,
    /// Position in the capture stream, assigned by the capture loop
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(format: FrameFormat, data: Vec<u8>) -> Self {
        Self {
            format,
            data,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        Self::new(FrameFormat::Jpeg, data)
    }

    pub fn payload(text: &str) -> Self {
        Self::new(FrameFormat::Payload, text.as_bytes().to_vec())
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("failed to read frame from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Source Trait
// ============================================================================

/// Where camera frames come from.
///
/// `read_frame` returning `Ok(None)` means "nothing new yet" and is not an
/// error. An `Err` makes the capture loop wait and call [`open`] again.
///
/// [`open`]: FrameSource::open
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Acquire (or re-acquire) the underlying device.
    async fn open(&mut self) -> Result<(), FrameError>;

    /// Grab the next frame, if one is available.
    async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError>;

    /// Human-readable name for logging (e.g. "snapshot", "scripted").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Latest-Frame Slot
// ============================================================================

/// Single-slot, overwrite-on-write holder of the newest frame.
pub struct FrameSlot {
    tx: watch::Sender<Option<Arc<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the held frame. Never blocks, never fails.
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.tx.subscribe()
    }

    pub fn has_frame(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Capture Loop
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub read_errors: u64,
    pub reopens: u64,
}

/// Pulls frames from a source at a fixed rate into the frame slot.
pub struct CaptureLoop<S: FrameSource> {
    source: S,
    slot: Arc<FrameSlot>,
    period: Duration,
    reconnect_delay: Duration,
    cancel_token: CancellationToken,
}

impl<S: FrameSource> CaptureLoop<S> {
    pub fn new(
        source: S,
        slot: Arc<FrameSlot>,
        period: Duration,
        reconnect_delay: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            slot,
            period,
            reconnect_delay,
            cancel_token,
        }
    }

    /// Capture until cancelled. Read failures are never fatal.
    pub async fn run(mut self) -> CaptureStats {
        let mut stats = CaptureStats::default();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            source = self.source.source_name(),
            period = ?self.period,
            "📷 Frame capture started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.source.read_frame().await {
                Ok(Some(mut frame)) => {
                    stats.frames_captured += 1;
                    frame.sequence = stats.frames_captured;
                    self.slot.publish(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    stats.read_errors += 1;
                    warn!(source = self.source.source_name(), error = %e, "Frame read failed, reopening");
                    tokio::select! {
                        () = self.cancel_token.cancelled() => break,
                        () = sleep(self.reconnect_delay) => {}
                    }
                    stats.reopens += 1;
                    if let Err(e) = self.source.open().await {
                        warn!(source = self.source.source_name(), error = %e, "Frame source reopen failed");
                    }
                }
            }
        }

        info!(
            frames = stats.frames_captured,
            errors = stats.read_errors,
            "Frame capture stopped"
        );
        stats
    }
}

// ============================================================================
// Snapshot File Source (external capture process)
// ============================================================================

/// Re-reads a JPEG that an external capture process keeps overwriting
/// (for example `ffmpeg -i /dev/video0 -update 1 frame.jpg`).
pub struct SnapshotFileSource {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl SnapshotFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FrameSource for SnapshotFileSource {
    async fn open(&mut self) -> Result<(), FrameError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {
                self.last_modified = None;
                debug!(path = %self.path.display(), "Snapshot source opened");
                Ok(())
            }
            Ok(_) => Err(FrameError::Unavailable {
                source_name: self.source_name().to_string(),
                reason: format!("{} is not a directory", dir.display()),
            }),
            Err(e) => Err(FrameError::Unavailable {
                source_name: self.source_name().to_string(),
                reason: format!("{}: {e}", dir.display()),
            }),
        }
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            // Capture process not started yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(FrameError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let modified = meta.modified().ok();
        if modified.is_some() && modified == self.last_modified {
            return Ok(None);
        }

        let data = tokio::fs::read(&self.path).await.map_err(|source| FrameError::Read {
            path: self.path.clone(),
            source,
        })?;
        // Caught mid-rewrite
        if data.is_empty() {
            return Ok(None);
        }
        self.last_modified = modified;
        Ok(Some(Frame::jpeg(data)))
    }

    fn source_name(&self) -> &str {
        "snapshot"
    }
}

// ============================================================================
// Scripted Source (simulation)
// ============================================================================

#[derive(Debug, Clone)]
struct Shown {
    payload: String,
    until: Instant,
}

/// Controls what a [`ScriptedSource`] camera "sees".
#[derive(Clone, Default)]
pub struct ScriptHandle {
    shown: Arc<Mutex<Option<Shown>>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Option<Shown>> {
        self.shown.lock().unwrap_or_else(|e| {
            warn!("ScriptHandle mutex poisoned, recovering");
            e.into_inner()
        })
    }

    /// Hold `payload` in front of the camera for `duration`.
    pub fn show(&self, payload: impl Into<String>, duration: Duration) {
        *self.lock() = Some(Shown {
            payload: payload.into(),
            until: Instant::now() + duration,
        });
    }

    /// Take whatever is shown out of view.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn visible(&self) -> Option<String> {
        let mut shown = self.lock();
        match shown.as_ref() {
            Some(s) if Instant::now() < s.until => Some(s.payload.clone()),
            Some(_) => {
                *shown = None;
                None
            }
            None => None,
        }
    }
}

/// Camera stand-in whose frames carry a text payload instead of pixels.
///
/// An empty payload is a frame with no code in view.
pub struct ScriptedSource {
    handle: ScriptHandle,
}

impl ScriptedSource {
    pub fn new() -> (Self, ScriptHandle) {
        let handle = ScriptHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn open(&mut self) -> Result<(), FrameError> {
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let text = self.handle.visible().unwrap_or_default();
        Ok(Some(Frame::payload(&text)))
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}
