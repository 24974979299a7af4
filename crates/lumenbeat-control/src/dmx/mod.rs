//! DMX output system
//!
//! ## Art-Net
//!
//! Art-Net is a UDP broadcast protocol for DMX transmission over Ethernet.
//! - Uses UDP broadcast (255.255.255.255:6454)
//! - One OpDmx packet carries a full 512-channel universe
//! - Includes sequence numbering
//!
//! ## Example Usage
//!
//! ```rust
//! use lumenbeat_control::dmx::{ArtDmxPacket, DmxUniverse};
//!
//! let mut universe = DmxUniverse::new();
//! universe.set(0, 255);
//!
//! let bytes = ArtDmxPacket::encode(0, 1, &universe);
//! let packet = ArtDmxPacket::decode(&bytes).unwrap();
//! assert_eq!(packet.data[0], 255);
//! ```

pub mod artnet;
pub mod universe;

pub use artnet::{ArtDmxPacket, ArtNetSender};
pub use universe::{DmxUniverse, UNIVERSE_SIZE};
