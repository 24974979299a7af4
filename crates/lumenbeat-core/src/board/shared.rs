//! Board shared between detector workers and the control loop

use super::{Board, BoardSnapshot};
use crate::audio::{EnergySnapshot, TempoEstimate};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::trace;

/// Sink for detector results
pub trait ShowEvents: Send + Sync {
    /// A kick was detected at `timestamp`
    fn on_kick(&self, timestamp: f64);

    /// A tempo was published at `now`
    fn on_tempo(&self, estimate: &TempoEstimate, now: f64);

    /// An energy classification was published at `now`
    fn on_energy(&self, snapshot: &EnergySnapshot, now: f64);
}

/// The board behind one mutex.
///
/// Every method is a single short critical section.
#[derive(Clone)]
pub struct SharedBoard {
    inner: Arc<Mutex<Board>>,
}

impl SharedBoard {
    /// Share `board`
    pub fn new(board: Board) -> Self {
        Self {
            inner: Arc::new(Mutex::new(board)),
        }
    }

    /// Lock the board for a compound operation
    pub fn lock(&self) -> MutexGuard<'_, Board> {
        self.inner.lock()
    }

    /// Run `f` with the board locked
    pub fn with<R>(&self, f: impl FnOnce(&mut Board) -> R) -> R {
        let mut board = self.inner.lock();
        f(&mut board)
    }

    /// Serializable view of the current state
    pub fn snapshot(&self) -> BoardSnapshot {
        self.inner.lock().snapshot()
    }
}

impl ShowEvents for SharedBoard {
    fn on_kick(&self, timestamp: f64) {
        let flashed = self.inner.lock().activate_kick(timestamp);
        trace!("Kick at {:.3}s flashed {} fixture(s)", timestamp, flashed);
    }

    fn on_tempo(&self, estimate: &TempoEstimate, now: f64) {
        self.inner
            .lock()
            .update_tempo(estimate.bpm, estimate.last_beat, now);
    }

    fn on_energy(&self, snapshot: &EnergySnapshot, now: f64) {
        self.inner.lock().update_energy(snapshot, now);
    }
}
