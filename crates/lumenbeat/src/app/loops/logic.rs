//! Control loop: advance the board and send a frame every period

use crate::app::worker::{RunFlag, Worker};
use anyhow::Result;
use lumenbeat_control::{FrameSink, ShowOutput};
use lumenbeat_core::{BoardSnapshot, ShowClock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Periodic status line
pub struct StatusReporter {
    interval: f64,
    next_due: f64,
}

impl StatusReporter {
    /// Report every `interval` seconds; zero or less disables reporting
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            next_due: interval,
        }
    }

    /// Whether a report is due at `now`; advances the schedule when it is
    pub fn due(&mut self, now: f64) -> bool {
        if !self.interval.is_finite() || self.interval <= 0.0 || now < self.next_due {
            return false;
        }
        self.next_due = now + self.interval;
        true
    }
}

/// One-line summary of the show state
pub fn status_line(snapshot: &BoardSnapshot, frames: u64, errors: u64) -> String {
    let theme = snapshot.theme.as_deref().unwrap_or("-");
    let arrangement = snapshot
        .arrangement
        .map_or_else(|| "-".to_string(), |a| a.to_string());
    let tempo = snapshot
        .tempo
        .map_or_else(|| "-".to_string(), |t| format!("{:.1} BPM", t.bpm));
    let energy = snapshot
        .energy
        .map_or_else(|| "-".to_string(), |e| e.to_string());
    let kicks = snapshot.fixtures.iter().filter(|f| f.kick_active).count();

    format!(
        "theme {} ({}), tempo {}, energy {}, intensity {:.0}%{}, {} flashing, {} frame(s) sent, {} send error(s)",
        theme,
        arrangement,
        tempo,
        energy,
        snapshot.intensity * 100.0,
        if snapshot.resting { ", resting" } else { "" },
        kicks,
        frames,
        errors
    )
}

/// Run `output` every `period` until stopped
pub fn spawn_control_loop<S>(
    mut output: ShowOutput<S>,
    clock: ShowClock,
    period: Duration,
    status_interval: f64,
) -> Result<Worker>
where
    S: FrameSink + 'static,
{
    let period = period.max(Duration::from_millis(1));

    Worker::spawn("control-loop", move |flag: RunFlag| {
        info!("Control loop running every {:?}", period);
        let mut status = StatusReporter::new(status_interval);

        while flag.is_running() {
            let started = Instant::now();
            let now = clock.now();
            output.tick(now);

            if status.due(now) {
                let snapshot = output.board().snapshot();
                info!(
                    "{}",
                    status_line(&snapshot, output.frames_sent(), output.send_errors())
                );
                if let Ok(json) = snapshot.to_json() {
                    debug!("Board snapshot: {}", json);
                }
            }

            let elapsed = started.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            }
        }

        info!(
            "Control loop done: {} frame(s) sent, {} send error(s)",
            output.frames_sent(),
            output.send_errors()
        );
    })
}
