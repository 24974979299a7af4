//! Art-Net protocol implementation (Art-Net 4)
//!
//! Art-Net is a UDP-based protocol for transmitting DMX512 over Ethernet.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use super::universe::{DmxUniverse, UNIVERSE_SIZE};
use crate::{error::ControlError, Result};

/// Packet identifier, "Art-Net" plus a NUL
pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";
/// OpDmx opcode, sent little-endian
pub const OP_DMX: u16 = 0x5000;
/// Protocol revision, sent big-endian
pub const PROTOCOL_VERSION: u16 = 14;
/// Bytes before the DMX data
pub const HEADER_LEN: usize = 18;
/// Default Art-Net UDP port
pub const ARTNET_PORT: u16 = 6454;
/// Highest 15-bit Port-Address
pub const MAX_UNIVERSE: u16 = 0x7FFF;

/// A decoded OpDmx packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtDmxPacket {
    /// Sequence counter, 0 means disabled
    pub sequence: u8,
    /// Physical input port
    pub physical: u8,
    /// 15-bit Port-Address
    pub universe: u16,
    /// Channels carried by the packet
    pub length: u16,
    /// Channel values, zero past `length`
    pub data: [u8; UNIVERSE_SIZE],
}

impl ArtDmxPacket {
    /// Build an OpDmx packet carrying the full universe
    pub fn encode(universe_id: u16, sequence: u8, universe: &DmxUniverse) -> Vec<u8> {
        let mut packet = vec![0u8; HEADER_LEN + UNIVERSE_SIZE];

        // Header: "Art-Net\0"
        packet[0..8].copy_from_slice(ARTNET_ID);

        // OpCode: OpDmx (0x5000)
        packet[8..10].copy_from_slice(&OP_DMX.to_le_bytes());

        // Protocol version (14)
        packet[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());

        packet[12] = sequence;

        // Physical (0)
        packet[13] = 0;

        // Universe (Port-Address)
        packet[14..16].copy_from_slice(&universe_id.to_le_bytes());

        // Length (512 channels, big-endian)
        packet[16..18].copy_from_slice(&(UNIVERSE_SIZE as u16).to_be_bytes());

        packet[HEADER_LEN..].copy_from_slice(universe.channels());

        packet
    }

    /// Parse an OpDmx packet
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ControlError::InvalidMessage(format!(
                "Art-Net packet too short: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..8] != ARTNET_ID {
            return Err(ControlError::InvalidMessage(
                "missing Art-Net identifier".to_string(),
            ));
        }

        let opcode = u16::from_le_bytes([bytes[8], bytes[9]]);
        if opcode != OP_DMX {
            return Err(ControlError::InvalidMessage(format!(
                "unexpected opcode 0x{:04x}",
                opcode
            )));
        }

        let length = u16::from_be_bytes([bytes[16], bytes[17]]);
        let end = HEADER_LEN + length as usize;
        if length as usize > UNIVERSE_SIZE || bytes.len() < end {
            return Err(ControlError::InvalidMessage(format!(
                "bad DMX length {} for a {} byte packet",
                length,
                bytes.len()
            )));
        }

        let mut data = [0u8; UNIVERSE_SIZE];
        data[..length as usize].copy_from_slice(&bytes[HEADER_LEN..end]);

        Ok(Self {
            sequence: bytes[12],
            physical: bytes[13],
            universe: u16::from_le_bytes([bytes[14], bytes[15]]),
            length,
            data,
        })
    }

    /// Packet data as a universe
    pub fn to_universe(&self) -> DmxUniverse {
        DmxUniverse::from_channels(self.data)
    }
}

/// Art-Net sender for outputting DMX data
pub struct ArtNetSender {
    socket: UdpSocket,
    target: SocketAddr,
    universe: u16,
    sequence: u8,
    last_send: Option<Instant>,
    min_interval: Duration,
    packets_sent: u64,
}

impl ArtNetSender {
    /// Create a new Art-Net sender
    ///
    /// # Arguments
    /// * `universe` - Art-Net universe (0-32767)
    /// * `target` - Destination, typically "255.255.255.255:6454"
    pub fn new(universe: u16, target: &str) -> Result<Self> {
        if universe > MAX_UNIVERSE {
            return Err(ControlError::InvalidParameter(format!(
                "Art-Net universe {} above {}",
                universe, MAX_UNIVERSE
            )));
        }

        let target: SocketAddr = target.parse().map_err(|e| {
            ControlError::DmxError(format!("Invalid Art-Net target address: {}", e))
        })?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;

        tracing::info!("Art-Net sender created for universe {} -> {}", universe, target);

        Ok(Self {
            socket,
            target,
            universe,
            sequence: 0,
            last_send: None,
            min_interval: Duration::ZERO,
            packets_sent: 0,
        })
    }

    /// Send one universe.
    ///
    /// Returns `Ok(false)` when the frame was dropped by the refresh limit.
    pub fn send_universe(&mut self, universe: &DmxUniverse) -> Result<bool> {
        let now = Instant::now();
        if let Some(last) = self.last_send {
            if now.duration_since(last) < self.min_interval {
                return Ok(false);
            }
        }

        // sequence 0 disables reordering on the receiver, skip it
        let sequence = self.sequence.wrapping_add(1).max(1);
        let packet = ArtDmxPacket::encode(self.universe, sequence, universe);

        // failed attempts count against the refresh limit too
        self.last_send = Some(now);
        self.socket.send_to(&packet, self.target)?;
        self.sequence = sequence;
        self.packets_sent += 1;

        tracing::trace!(
            "Sent Art-Net DMX packet {} for universe {}",
            self.sequence,
            self.universe
        );

        Ok(true)
    }

    /// Get the current universe
    pub fn universe(&self) -> u16 {
        self.universe
    }

    /// Destination address
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Sequence number of the last packet, 0 before the first one
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Packets sent so far
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Limit the packet rate; `hz <= 0` removes the limit
    pub fn set_refresh_rate(&mut self, hz: f64) {
        self.min_interval = if hz.is_finite() && hz > 0.0 {
            Duration::from_secs_f64(1.0 / hz)
        } else {
            Duration::ZERO
        };
    }
}
