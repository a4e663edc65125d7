//! Actuation cycle: the timed push/pull stroke for one lane.
//!
//! ```text
//! release pull ─ settle ─ engage push ─ cycle_delay ─ release push ─ settle ─ engage pull
//! ```
//!
//! The stroke runs on its own task so a panic inside it is caught at the
//! join. Whatever happens to the stroke, [`run_cycle`] then returns the lane
//! to Ready, counts the item and emits the `sort` event. The electrical
//! resting state is restored by [`StrokeGuard`] when the stroke unwinds or
//! bails out early.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::coordinator::{CycleTimings, SortingCoordinator};
use super::events::SorterEvent;
use crate::acquisition::{ActuatorBank, GpioError};

/// What a finished cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub lane: usize,
    /// The lane's count after this cycle, `None` if the cycle never started
    pub count: Option<u64>,
    /// Fault raised by the stroke, if any
    pub fault: Option<String>,
}

/// Rests the lane when dropped, unless disarmed.
pub struct StrokeGuard<'a> {
    bank: &'a ActuatorBank,
    lane: usize,
    armed: bool,
}

impl<'a> StrokeGuard<'a> {
    pub const fn new(bank: &'a ActuatorBank, lane: usize) -> Self {
        Self {
            bank,
            lane,
            armed: true,
        }
    }

    /// The stroke ended in the resting state on its own.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StrokeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(lane = self.lane, "Stroke interrupted, restoring resting state");
        if let Err(e) = self.bank.rest_lane(self.lane) {
            error!(lane = self.lane, error = %e, "Failed to restore resting state");
        }
    }
}

/// Drive the relays through one divert stroke.
async fn stroke(bank: Arc<ActuatorBank>, lane: usize, timings: CycleTimings) -> Result<(), GpioError> {
    let pins = bank.pins(lane)?;
    let guard = StrokeGuard::new(&bank, lane);

    bank.release(pins.pull)?;
    sleep(timings.settle).await;

    bank.engage(pins.push)?;
    sleep(timings.cycle_delay).await;

    bank.release(pins.push)?;
    sleep(timings.settle).await;

    bank.engage(pins.pull)?;
    guard.disarm();
    Ok(())
}

/// Run one full cycle for `lane`, which must be AwaitingItem.
///
/// Never cancelled from outside. A stroke fault is logged and the cycle is
/// still completed and counted.
pub async fn run_cycle(coordinator: SortingCoordinator, lane: usize) -> CycleReport {
    let name = {
        let mut board = coordinator.board().write().await;
        if !board.begin_sort(lane) {
            warn!(lane, status = ?board.status(lane), "Cycle requested for a lane that is not awaiting an item");
            return CycleReport {
                lane,
                count: None,
                fault: None,
            };
        }
        board.name(lane).unwrap_or_default().to_string()
    };

    let hub = coordinator.hub();
    hub.emit(SorterEvent::info(format!("Starting cycle for {name}")));

    let stroke_task = tokio::spawn(stroke(
        coordinator.actuators().clone(),
        lane,
        coordinator.timings(),
    ));
    let fault = match stroke_task.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            error!(lane, error = %e, "Actuation fault");
            Some(e.to_string())
        }
        Err(e) => {
            error!(lane, error = %e, "Actuation stroke aborted");
            Some(format!("stroke aborted: {e}"))
        }
    };

    let count = {
        let mut board = coordinator.board().write().await;
        let count = board.finish_sort(lane);
        if let Some(count) = count {
            hub.emit(SorterEvent::Sort {
                name: name.clone(),
                count,
            });
        }
        count
    };

    hub.emit(SorterEvent::info(format!("Finished cycle for {name}")));
    info!(lane, count = ?count, faulted = fault.is_some(), "Cycle complete");

    CycleReport { lane, count, fault }
}
