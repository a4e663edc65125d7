//! Arrival wait: confirm an item reached an armed lane before actuating.

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::actuation::{self, CycleReport};
use super::coordinator::SortingCoordinator;
use super::events::SorterEvent;

/// How an arrival wait ended.
#[derive(Debug)]
pub enum ArrivalOutcome {
    /// The sensor saw the item; the cycle runs on its own task.
    Dispatched(JoinHandle<CycleReport>),
    /// Nothing arrived in time; the lane is Ready again.
    TimedOut,
    /// Shutdown interrupted the wait; the lane is Ready again.
    Cancelled,
}

/// Poll the lane sensor until an item shows up or the timeout expires.
///
/// A failed sensor read skips that poll. The lane stays AwaitingItem for
/// the whole wait and is only reverted here on timeout or shutdown; once
/// the cycle is dispatched the status belongs to the cycle.
pub async fn wait_for_arrival(coordinator: SortingCoordinator, lane: usize) -> ArrivalOutcome {
    let timings = coordinator.timings();
    let deadline = Instant::now() + timings.arrival_timeout;
    let mut read_failures = 0u32;

    loop {
        match coordinator.actuators().item_present(lane) {
            Ok(true) => {
                info!(lane, "Item arrived, dispatching cycle");
                let handle = tokio::spawn(actuation::run_cycle(coordinator.clone(), lane));
                return ArrivalOutcome::Dispatched(handle);
            }
            Ok(false) => {}
            Err(e) => {
                read_failures += 1;
                if read_failures == 1 {
                    warn!(lane, error = %e, "Sensor read failed while waiting for item");
                } else {
                    debug!(lane, read_failures, error = %e, "Sensor read failed");
                }
            }
        }

        if Instant::now() >= deadline {
            break;
        }

        tokio::select! {
            () = coordinator.cancel_token().cancelled() => {
                revert(&coordinator, lane).await;
                debug!(lane, "Arrival wait cancelled");
                return ArrivalOutcome::Cancelled;
            }
            () = sleep(timings.arrival_poll) => {}
        }
    }

    if let Some(name) = revert(&coordinator, lane).await {
        warn!(lane, "Timed out waiting for item");
        coordinator
            .hub()
            .emit(SorterEvent::info(format!("Timeout waiting for item on {name}")));
    }
    ArrivalOutcome::TimedOut
}

/// AwaitingItem -> Ready. Returns the lane name if the lane was reverted.
async fn revert(coordinator: &SortingCoordinator, lane: usize) -> Option<String> {
    let mut board = coordinator.board().write().await;
    if board.abandon(lane) {
        board.name(lane).map(str::to_string)
    } else {
        None
    }
}
