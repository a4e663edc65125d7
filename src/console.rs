//! Bench console for simulate mode.
//!
//! Reads one command per line (normally from stdin):
//!
//! - `qr <PAYLOAD>`: hold a code in front of the scripted camera
//! - `item <lane>`: pulse a lane sensor (lanes numbered from 1)
//!
//! A bad command or an unreadable line is logged and skipped. The console
//! never takes the line down; when its input fails it simply stops.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::acquisition::SimulatedIo;
use crate::config::defaults;
use crate::pipeline::{ScriptHandle, SortingCoordinator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Show a payload to the camera
    ShowCode(String),
    /// An item reaches a lane (0-based)
    Item(usize),
    /// Blank line
    Empty,
}

impl ConsoleCommand {
    /// Parse one console line. `None` if the line is not a command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        match (parts.next(), parts.next().map(str::trim)) {
            (Some(""), None) => Some(Self::Empty),
            (Some("qr"), Some(payload)) if !payload.is_empty() => {
                Some(Self::ShowCode(payload.to_string()))
            }
            (Some("item"), Some(lane)) => lane
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .map(Self::Item),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleStats {
    pub commands: u64,
    pub rejected: u64,
    pub read_errors: u64,
}

pub struct BenchConsole {
    coordinator: SortingCoordinator,
    sim: Arc<SimulatedIo>,
    script: ScriptHandle,
}

impl BenchConsole {
    pub const fn new(
        coordinator: SortingCoordinator,
        sim: Arc<SimulatedIo>,
        script: ScriptHandle,
    ) -> Self {
        Self {
            coordinator,
            sim,
            script,
        }
    }

    /// Carry out one command. Returns `false` if it named a lane that does not exist.
    pub fn execute(&self, command: &ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Empty => true,
            ConsoleCommand::ShowCode(payload) => {
                info!("[Console] Showing code {:?}", payload);
                self.script
                    .show(payload.as_str(), Duration::from_millis(defaults::SIM_CODE_VISIBLE_MS));
                true
            }
            ConsoleCommand::Item(lane) => {
                let Ok(pins) = self.coordinator.actuators().pins(*lane) else {
                    warn!("[Console] No lane {}", lane + 1);
                    return false;
                };
                info!("[Console] Item at lane {}", lane + 1);
                let sim = self.sim.clone();
                let level = self.coordinator.actuators().present_level();
                tokio::spawn(async move {
                    sim.pulse_input(
                        pins.sensor,
                        level,
                        Duration::from_millis(defaults::SIM_ITEM_PULSE_MS),
                    )
                    .await;
                });
                true
            }
        }
    }

    /// Read commands until the input ends, fails, or shutdown.
    pub async fn run<R: AsyncBufRead + Unpin>(self, input: R) -> ConsoleStats {
        let cancel = self.coordinator.cancel_token().clone();
        let mut lines = input.lines();
        let mut stats = ConsoleStats::default();

        loop {
            let line = tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("[Console] Input closed");
                    break;
                }
                // The offending line is consumed; the next one reads normally
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    stats.read_errors += 1;
                    warn!(error = %e, "[Console] Skipping unreadable line");
                    continue;
                }
                Err(e) => {
                    stats.read_errors += 1;
                    warn!(error = %e, "[Console] Input failed, console stopped");
                    break;
                }
            };

            match ConsoleCommand::parse(&line) {
                Some(ConsoleCommand::Empty) => {}
                Some(command) => {
                    if self.execute(&command) {
                        stats.commands += 1;
                    } else {
                        stats.rejected += 1;
                    }
                }
                None => {
                    stats.rejected += 1;
                    warn!("[Console] Unknown command {:?} (try: qr LOAI1, item 1)", line.trim());
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SorterConfig;
    use crate::pipeline::{ClientHub, FrameSource, ScriptedSource};
    use tokio_util::sync::CancellationToken;

    fn console() -> (BenchConsole, Arc<SimulatedIo>, ScriptedSource) {
        let sim = Arc::new(SimulatedIo::new());
        let coordinator = SortingCoordinator::new(
            &SorterConfig::default(),
            sim.clone(),
            Arc::new(ClientHub::new(8)),
            CancellationToken::new(),
        );
        let (source, script) = ScriptedSource::new();
        (BenchConsole::new(coordinator, sim.clone(), script), sim, source)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ConsoleCommand::parse("qr  LOAI2 "),
            Some(ConsoleCommand::ShowCode("LOAI2".into()))
        );
        assert_eq!(ConsoleCommand::parse("item 2"), Some(ConsoleCommand::Item(1)));
        assert_eq!(ConsoleCommand::parse("   "), Some(ConsoleCommand::Empty));
        assert_eq!(ConsoleCommand::parse("item 0"), None);
        assert_eq!(ConsoleCommand::parse("item two"), None);
        assert_eq!(ConsoleCommand::parse("qr"), None);
        assert_eq!(ConsoleCommand::parse("launch"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_line_is_skipped() {
        let (console, sim, mut camera) = console();
        let input: &[u8] = b"\xff\xfe garbage\nqr LOAI2\nitem 2\nitem 9\nbogus\n";

        let stats = console.run(input).await;

        assert_eq!(stats.read_errors, 1);
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.rejected, 2);

        let frame = camera.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.data, b"LOAI2");

        // Active-low sensor on lane 2 is held low by the pulse
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sim.level(29), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let (console, _sim, _camera) = console();
        console.coordinator.cancel_token().cancel();

        let (_writer, reader) = tokio::io::duplex(64);
        let stats = console.run(tokio::io::BufReader::new(reader)).await;
        assert_eq!(stats, ConsoleStats::default());
    }
}
