//! Control-loop output: advance the board, render a frame, send it

use crate::dmx::{ArtNetSender, DmxUniverse};
use crate::Result;
use lumenbeat_core::SharedBoard;
use tracing::{debug, info, warn};

/// Destination for rendered frames
pub trait FrameSink: Send {
    /// Ship one frame; `Ok(false)` when the sink chose to drop it
    fn send_frame(&mut self, universe: &DmxUniverse) -> Result<bool>;
}

impl FrameSink for ArtNetSender {
    fn send_frame(&mut self, universe: &DmxUniverse) -> Result<bool> {
        self.send_universe(universe)
    }
}

/// Drives one sink from the shared board
pub struct ShowOutput<S: FrameSink = ArtNetSender> {
    board: SharedBoard,
    sink: S,
    frames_sent: u64,
    send_errors: u64,
    failing: bool,
}

impl<S: FrameSink> ShowOutput<S> {
    /// Output `board` through `sink`
    pub fn new(board: SharedBoard, sink: S) -> Self {
        Self {
            board,
            sink,
            frames_sent: 0,
            send_errors: 0,
            failing: false,
        }
    }

    /// One control-loop step at show time `now`.
    ///
    /// The board is locked only while advancing and rendering. Send errors
    /// are logged and swallowed; returns whether a frame went out.
    pub fn tick(&mut self, now: f64) -> bool {
        let universe = self.board.with(|board| {
            board.advance(now);
            DmxUniverse::from_board(board)
        });

        match self.sink.send_frame(&universe) {
            Ok(sent) => {
                if self.failing {
                    info!("DMX output recovered after {} failed send(s)", self.send_errors);
                    self.failing = false;
                }
                if sent {
                    self.frames_sent += 1;
                }
                sent
            }
            Err(e) => {
                self.send_errors += 1;
                if self.failing {
                    debug!("DMX send failed again: {}", e);
                } else {
                    warn!("DMX send failed: {}", e);
                    self.failing = true;
                }
                false
            }
        }
    }

    /// Frames handed to the sink successfully
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Failed sends so far
    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }

    /// The board this output renders
    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    /// The sink
    pub fn sink(&self) -> &S {
        &self.sink
    }
}
