//! Lumenbeat Control - DMX output for the lighting board
//!
//! This crate turns the board state of `lumenbeat-core` into DMX512 frames
//! and ships them over Art-Net:
//! - **Universe**: 512-channel buffer built from the fixtures' current colors
//! - **Art-Net**: OpDmx packet codec and a rate-limited UDP sender
//! - **Output**: one control-loop tick (advance, encode, send)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumenbeat_control::dmx::{ArtNetSender, DmxUniverse};
//!
//! # fn main() -> lumenbeat_control::Result<()> {
//! let mut sender = ArtNetSender::new(0, "255.255.255.255:6454")?;
//! let mut universe = DmxUniverse::new();
//! universe.set(0, 255);
//! sender.send_universe(&universe)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// DMX output (universe buffer, Art-Net)
pub mod dmx;
/// Error types
pub mod error;
/// Board to wire glue driven by the control loop
pub mod output;

pub use dmx::{ArtDmxPacket, ArtNetSender, DmxUniverse};
pub use error::{ControlError, Result};
pub use output::{FrameSink, ShowOutput};
