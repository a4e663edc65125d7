//! Detection loop: sample the latest frame, decode, classify, trigger.
//!
//! Runs on a fixed period and never waits on an arrival or a cycle. The
//! same frame may be decoded on several iterations in a row; repeat
//! payloads are suppressed by the [`Deduplicator`] instead.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::coordinator::SortingCoordinator;
use super::decoder::QrDecoder;
use super::events::SorterEvent;
use super::source::{Frame, FrameSlot};
use crate::config::{normalize_code, SorterConfig};

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Nothing left after trimming
    Empty,
    /// Matches a lane code
    Lane { lane: usize, code: String },
    /// The reject code
    Reject(String),
    /// Anything else
    Unknown(String),
}

/// Normalized lane codes in lane order, plus the reject code.
#[derive(Debug, Clone)]
pub struct LaneCodeTable {
    codes: Vec<String>,
    reject: String,
}

impl LaneCodeTable {
    pub fn new<S: AsRef<str>>(codes: impl IntoIterator<Item = S>, reject: &str) -> Self {
        Self {
            codes: codes
                .into_iter()
                .map(|c| normalize_code(c.as_ref()))
                .collect(),
            reject: normalize_code(reject),
        }
    }

    pub fn from_config(config: &SorterConfig) -> Self {
        Self::new(config.lanes.iter().map(|l| l.code.as_str()), &config.codes.reject)
    }

    pub fn classify(&self, raw: &str) -> Classification {
        let code = normalize_code(raw);
        if code.is_empty() {
            return Classification::Empty;
        }
        if let Some(lane) = self.codes.iter().position(|c| *c == code) {
            return Classification::Lane { lane, code };
        }
        if code == self.reject {
            Classification::Reject(code)
        } else {
            Classification::Unknown(code)
        }
    }
}

// ============================================================================
// Deduplication
// ============================================================================

/// Suppresses a payload seen again within the window.
///
/// Only accepted payloads move the window, so a code held in view keeps
/// firing once per window.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl Deduplicator {
    pub const fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns `true` if `payload` should be acted on, recording it if so.
    pub fn accept(&mut self, payload: &str, now: Instant) -> bool {
        if let Some((previous, at)) = &self.last {
            if previous == payload && now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((payload.to_string(), now));
        true
    }
}

// ============================================================================
// Detection Loop
// ============================================================================

/// Result of one detection iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// No frame captured yet
    NoFrame,
    /// Frame held no payload
    Nothing,
    /// Same payload inside the dedup window
    Duplicate,
    /// Lane armed and arrival wait started
    Triggered(usize),
    /// Lane code for a lane that is not Ready
    Busy(usize),
    Rejected,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub iterations: u64,
    pub payloads: u64,
    pub duplicates: u64,
    pub triggers: u64,
    pub busy: u64,
    pub rejected: u64,
    pub unknown: u64,
}

pub struct DetectionLoop {
    coordinator: SortingCoordinator,
    frames: Arc<FrameSlot>,
    decoder: Arc<dyn QrDecoder>,
    table: LaneCodeTable,
    dedup: Deduplicator,
    scan_interval: Duration,
    stats: DetectionStats,
}

impl DetectionLoop {
    pub fn new(
        coordinator: SortingCoordinator,
        frames: Arc<FrameSlot>,
        decoder: Arc<dyn QrDecoder>,
        config: &SorterConfig,
    ) -> Self {
        Self {
            coordinator,
            frames,
            decoder,
            table: LaneCodeTable::from_config(config),
            dedup: Deduplicator::new(config.timing.dedup_window()),
            scan_interval: config.timing.scan_interval(),
            stats: DetectionStats::default(),
        }
    }

    pub const fn stats(&self) -> DetectionStats {
        self.stats
    }

    /// Act on one decoded payload.
    pub async fn process_payload(&mut self, payload: &str) -> Detection {
        let classification = self.table.classify(payload);
        if classification == Classification::Empty {
            return Detection::Nothing;
        }
        self.stats.payloads += 1;

        if !self.dedup.accept(payload, Instant::now()) {
            self.stats.duplicates += 1;
            return Detection::Duplicate;
        }

        let hub = self.coordinator.hub();
        match classification {
            Classification::Empty => Detection::Nothing,
            Classification::Lane { lane, code } => {
                if self.coordinator.trigger(lane, &code).await.is_some() {
                    self.stats.triggers += 1;
                    info!(lane, code = %code, "Lane armed");
                    Detection::Triggered(lane)
                } else {
                    self.stats.busy += 1;
                    Detection::Busy(lane)
                }
            }
            Classification::Reject(code) => {
                self.stats.rejected += 1;
                hub.emit(SorterEvent::QrNg { data: code });
                Detection::Rejected
            }
            Classification::Unknown(code) => {
                self.stats.unknown += 1;
                hub.emit(SorterEvent::UnknownQr { data: code });
                Detection::Unknown
            }
        }
    }

    async fn decode(&self, frame: Arc<Frame>) -> Option<String> {
        if !self.decoder.is_blocking(&frame) {
            return self.decoder.decode(&frame);
        }
        let decoder = Arc::clone(&self.decoder);
        match tokio::task::spawn_blocking(move || decoder.decode(&frame)).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "QR decode task failed");
                None
            }
        }
    }

    /// One iteration: sample, decode, act.
    pub async fn scan_once(&mut self) -> Detection {
        self.stats.iterations += 1;
        let Some(frame) = self.frames.latest() else {
            return Detection::NoFrame;
        };
        match self.decode(frame).await {
            Some(payload) => self.process_payload(&payload).await,
            None => Detection::Nothing,
        }
    }

    /// Scan until cancelled.
    pub async fn run(mut self) -> DetectionStats {
        let mut ticker = interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.coordinator.cancel_token().clone();

        info!(
            decoder = self.decoder.decoder_name(),
            interval = ?self.scan_interval,
            "🔍 Detection loop started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let detection = self.scan_once().await;
            if !matches!(detection, Detection::NoFrame | Detection::Nothing) {
                debug!(?detection, "Detection");
            }
        }

        info!(
            iterations = self.stats.iterations,
            triggers = self.stats.triggers,
            "Detection loop stopped"
        );
        self.stats
    }
}
