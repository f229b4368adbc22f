//! CARMA Protocol Module
//!
//! Identifier types, wire primitives and the closed catalog of packets
//! exchanged between CARMA nodes.

pub mod error;
pub mod packet;
pub mod types;
pub mod wire;

pub use error::{ErrorKind, ProtocolError, Result};
pub use packet::{Packet, PacketBody, PacketType, WireParams};
pub use types::{
    ChannelId, Guid, LinkAddress, NodeCount, Provenance, Psn, PsnHash, Role, GUID_SIZE,
    PSN_HASH_SIZE, PSN_HASH_TAG,
};
pub use wire::{Reader, WireFormat};
