//! In-memory digital I/O for bench runs and tests.
//!
//! Unwritten pins read high, like inputs with the pull-up enabled. Every
//! successful write is journaled with its time so tests can check the
//! actuation sequence and its dwell times. The journal keeps only the most
//! recent writes so long bench runs stay bounded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use super::{DigitalIo, GpioError};
use crate::config::defaults::SIM_JOURNAL_CAPACITY;

/// One journaled output change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: u32,
    pub level: bool,
    pub at: Instant,
}

#[derive(Default)]
struct SimState {
    levels: HashMap<u32, bool>,
    journal: VecDeque<PinWrite>,
    journal_capacity: usize,
    failing_writes: HashSet<u32>,
    failing_reads: HashSet<u32>,
    panicking_writes: HashSet<u32>,
}

/// Simulated GPIO bank.
pub struct SimulatedIo {
    state: Mutex<SimState>,
}

impl Default for SimulatedIo {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedIo {
    pub fn new() -> Self {
        Self::with_journal_capacity(SIM_JOURNAL_CAPACITY)
    }

    /// Keep at most `capacity` journaled writes, dropping the oldest.
    pub fn with_journal_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SimState {
                journal_capacity: capacity.max(1),
                ..SimState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("SimulatedIo mutex poisoned, recovering");
            e.into_inner()
        })
    }

    /// Current level of a pin, `None` if it was never written or set.
    pub fn level(&self, pin: u32) -> Option<bool> {
        self.lock().levels.get(&pin).copied()
    }

    /// Drive an input from the outside (a sensor seeing an item, a wire pulled).
    pub fn set_input(&self, pin: u32, level: bool) {
        self.lock().levels.insert(pin, level);
    }

    /// Hold an input at `level` for `duration`, then restore its previous level.
    pub async fn pulse_input(&self, pin: u32, level: bool, duration: Duration) {
        let previous = self.level(pin).unwrap_or(true);
        self.set_input(pin, level);
        tokio::time::sleep(duration).await;
        self.set_input(pin, previous);
    }

    /// Make every subsequent write to `pin` fail.
    pub fn fail_writes_to(&self, pin: u32) {
        self.lock().failing_writes.insert(pin);
    }

    /// Make every subsequent read of `pin` fail.
    pub fn fail_reads_from(&self, pin: u32) {
        self.lock().failing_reads.insert(pin);
    }

    /// Make the next write to `pin` panic, as a driver bug would.
    pub fn panic_on_write_to(&self, pin: u32) {
        self.lock().panicking_writes.insert(pin);
    }

    /// Clear injected faults.
    pub fn heal(&self) {
        let mut state = self.lock();
        state.failing_writes.clear();
        state.failing_reads.clear();
        state.panicking_writes.clear();
    }

    /// Most recent successful writes, oldest first.
    pub fn journal(&self) -> Vec<PinWrite> {
        self.lock().journal.iter().copied().collect()
    }

    /// Successful writes to one pin, oldest first.
    pub fn writes_to(&self, pin: u32) -> Vec<PinWrite> {
        self.lock()
            .journal
            .iter()
            .filter(|w| w.pin == pin)
            .copied()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }
}

impl DigitalIo for SimulatedIo {
    fn read(&self, pin: u32) -> Result<bool, GpioError> {
        let state = self.lock();
        if state.failing_reads.contains(&pin) {
            return Err(GpioError::Read {
                pin,
                source: std::io::Error::other("injected read fault"),
            });
        }
        Ok(state.levels.get(&pin).copied().unwrap_or(true))
    }

    #[allow(clippy::panic)]
    fn write(&self, pin: u32, level: bool) -> Result<(), GpioError> {
        let mut state = self.lock();
        if state.panicking_writes.remove(&pin) {
            drop(state);
            panic!("injected panic writing pin {pin}");
        }
        if state.failing_writes.contains(&pin) {
            return Err(GpioError::Write {
                pin,
                source: std::io::Error::other("injected write fault"),
            });
        }
        state.levels.insert(pin, level);
        if state.journal.len() >= state.journal_capacity {
            state.journal.pop_front();
        }
        state.journal.push_back(PinWrite {
            pin,
            level,
            at: Instant::now(),
        });
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "simulated"
    }
}
