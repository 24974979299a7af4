//! App wiring: board, output and workers.

pub mod detectors;
pub mod loops;
pub mod worker;

use anyhow::{Context, Result};
use lumenbeat_control::{ArtNetSender, ShowOutput};
use lumenbeat_core::{SharedBoard, ShowClock, ShowConfig};
use std::time::Duration;
use tracing::info;
use worker::Worker;

/// Queue depth between the kick and tempo workers
#[cfg(feature = "audio")]
const ONSET_QUEUE: usize = 64;

/// A running show
pub struct App {
    clock: ShowClock,
    board: SharedBoard,
    workers: Vec<Worker>,
}

impl App {
    /// Build the board, open the Art-Net output and start every worker
    pub fn start(show: &ShowConfig) -> Result<Self> {
        let settings = &show.settings;
        let clock = ShowClock::start();

        let board = SharedBoard::new(
            show.build_board(clock.now())
                .context("Failed to build the fixture board")?,
        );

        let artnet = &settings.artnet;
        let mut sender = ArtNetSender::new(artnet.universe, &artnet.target)
            .context("Failed to open the Art-Net output")?;
        sender.set_refresh_rate(artnet.refresh_hz);

        let mut workers = Vec::new();

        #[cfg(feature = "audio")]
        {
            use detectors::{spawn_energy_worker, spawn_kick_worker, spawn_tempo_worker};

            let (onset_tx, onset_rx) = crossbeam_channel::bounded(ONSET_QUEUE);
            workers.push(spawn_kick_worker(settings, clock, board.clone(), onset_tx)?);
            workers.push(spawn_tempo_worker(settings, clock, board.clone(), onset_rx)?);
            workers.push(spawn_energy_worker(settings, clock, board.clone())?);
        }
        #[cfg(not(feature = "audio"))]
        tracing::warn!("Built without audio support, the board runs on its default timing only");

        workers.push(loops::logic::spawn_control_loop(
            ShowOutput::new(board.clone(), sender),
            clock,
            Duration::from_millis(settings.control_period_ms),
            settings.status_interval_secs,
        )?);

        info!(
            "Show running: {} worker(s), Art-Net universe {} -> {}",
            workers.len(),
            artnet.universe,
            artnet.target
        );

        Ok(Self {
            clock,
            board,
            workers,
        })
    }

    /// The shared board
    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    /// Seconds since the show started
    pub fn uptime(&self) -> f64 {
        self.clock.now()
    }

    /// Stop every worker, then wait for all of them
    pub fn shutdown(self) {
        info!("Shutting down after {:.1}s", self.uptime());
        for worker in &self.workers {
            worker.stop();
        }
        for worker in self.workers {
            let name = worker.name().to_string();
            if !worker.is_finished() {
                info!("Waiting for {}", name);
            }
            worker.join();
        }
        let snapshot = self.board.snapshot();
        info!(
            "All workers stopped, last theme {}",
            snapshot.theme.as_deref().unwrap_or("-")
        );
    }
}
