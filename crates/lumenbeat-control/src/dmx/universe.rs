//! 512-channel DMX universe buffer

use lumenbeat_core::board::{Board, Fixture};
use std::fmt;

/// Channels in one DMX universe
pub const UNIVERSE_SIZE: usize = 512;

/// One DMX512 frame, addressed 0-based
#[derive(Clone, PartialEq, Eq)]
pub struct DmxUniverse {
    channels: [u8; UNIVERSE_SIZE],
}

impl DmxUniverse {
    /// All channels at zero
    pub fn new() -> Self {
        Self {
            channels: [0; UNIVERSE_SIZE],
        }
    }

    /// Wrap raw channel values
    pub fn from_channels(channels: [u8; UNIVERSE_SIZE]) -> Self {
        Self { channels }
    }

    /// Render every fixture of `board` into a fresh frame
    pub fn from_board(board: &Board) -> Self {
        let mut universe = Self::new();
        for fixture in board.fixtures() {
            universe.write_fixture(fixture);
        }
        universe
    }

    /// Write a fixture's dimmer and current color.
    ///
    /// Addresses outside the universe are skipped.
    pub fn write_fixture(&mut self, fixture: &Fixture) {
        let addresses = fixture.addresses();
        let color = fixture.output();

        if let Some(dimmer) = addresses.dimmer {
            self.set(dimmer, fixture.dimmer_value());
        }
        for (address, value) in [
            (addresses.red, color.red),
            (addresses.green, color.green),
            (addresses.blue, color.blue),
        ] {
            if let Some(address) = address {
                self.set(address, value);
            }
        }
    }

    /// Set one channel; returns false when `address` is out of range
    pub fn set(&mut self, address: usize, value: u8) -> bool {
        match self.channels.get_mut(address) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Channel value, `None` when out of range
    pub fn get(&self, address: usize) -> Option<u8> {
        self.channels.get(address).copied()
    }

    /// Raw channel values
    pub fn channels(&self) -> &[u8; UNIVERSE_SIZE] {
        &self.channels
    }

    /// Zero every channel
    pub fn clear(&mut self) {
        self.channels = [0; UNIVERSE_SIZE];
    }

    /// Number of non-zero channels
    pub fn active_channels(&self) -> usize {
        self.channels.iter().filter(|&&v| v != 0).count()
    }
}

impl Default for DmxUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DmxUniverse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmxUniverse")
            .field("active_channels", &self.active_channels())
            .finish()
    }
}
