//! Packet catalog
//!
//! Every packet starts with its type tag as a varint. The tag values are
//! fixed by the order of [`PacketType::ALL`]; adding a packet kind means
//! appending a new tag, and every node must agree on the catalog.
//!
//! Packets carrying mix values need the negotiated [`WireParams`] to encode
//! and decode, since neither the big-integer width nor the mix size is
//! written on the wire.

mod control;
mod mix;
mod relay;

pub use control::{
    AddContactRequest, EndorsementRequest, LinkAddressPacket, PacketPacket,
    RegistrationComplete,
};
pub use mix::{McLeaderInitPacket, McVPacket};
pub use relay::{
    ClientMbPacket, MbClientPacket, MbMcUpBundlePacket, MbMcUpPacket, McMbDownPacket,
};

use crate::error::{ProtocolError, Result};
use crate::types::Provenance;
use crate::wire::{put_varint, varint_size, Reader};

/// Sizes negotiated from the global configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireParams {
    /// Width in bytes of every encoded big integer
    pub prime_size: usize,
    /// Number of entries in a mix batch
    pub mixsize: usize,
}

impl WireParams {
    pub fn new(prime_size: usize, mixsize: usize) -> Self {
        WireParams {
            prime_size,
            mixsize,
        }
    }
}

/// Packet type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PacketType {
    AddContactRequest,
    ClientMbPacket,
    EndorsementRequest,
    LinkAddressPacket,
    MbClientPacket,
    MbMcUpBundlePacket,
    MbMcUpPacket,
    McLeaderInitPacket,
    McMbDownPacket,
    McVPacket,
    PacketPacket,
    RegistrationComplete,
}

impl PacketType {
    pub const ALL: [PacketType; 12] = [
        PacketType::AddContactRequest,
        PacketType::ClientMbPacket,
        PacketType::EndorsementRequest,
        PacketType::LinkAddressPacket,
        PacketType::MbClientPacket,
        PacketType::MbMcUpBundlePacket,
        PacketType::MbMcUpPacket,
        PacketType::McLeaderInitPacket,
        PacketType::McMbDownPacket,
        PacketType::McVPacket,
        PacketType::PacketPacket,
        PacketType::RegistrationComplete,
    ];

    pub fn to_u64(self) -> u64 {
        self as u64
    }

    pub fn from_u64(value: u64) -> Result<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| PacketType::ALL.get(i).copied())
            .ok_or(ProtocolError::UnknownPacketType(value))
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketType::AddContactRequest => "add_contact_request",
            PacketType::ClientMbPacket => "client_mb_packet",
            PacketType::EndorsementRequest => "endorsement_request",
            PacketType::LinkAddressPacket => "link_address_packet",
            PacketType::MbClientPacket => "mb_client_packet",
            PacketType::MbMcUpBundlePacket => "mb_mc_up_bundle_packet",
            PacketType::MbMcUpPacket => "mb_mc_up_packet",
            PacketType::McLeaderInitPacket => "mc_leader_init_packet",
            PacketType::McMbDownPacket => "mc_mb_down_packet",
            PacketType::McVPacket => "mc_v_packet",
            PacketType::PacketPacket => "packet_packet",
            PacketType::RegistrationComplete => "registration_complete",
        }
    }

    pub fn tag_size(self) -> usize {
        varint_size(self.to_u64())
    }

    /// Read and validate a type tag
    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Self::from_u64(reader.read_varint()?)
    }

    /// Type of an encoded packet, without decoding its body
    pub fn peek(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut Reader::new(bytes))
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Field layout of one packet variant, excluding the type tag
pub trait PacketBody: Sized {
    const TYPE: PacketType;

    fn body_size(&self, params: &WireParams) -> usize;

    fn write_body(&self, out: &mut Vec<u8>, params: &WireParams) -> Result<()>;

    fn read_body(reader: &mut Reader<'_>, params: &WireParams) -> Result<Self>;

    fn provenance(&self) -> &Provenance;

    /// Exact encoded size including the type tag
    fn to_bytes_size(&self, params: &WireParams) -> usize {
        Self::TYPE.tag_size() + self.body_size(params)
    }

    fn to_bytes(&self, params: &WireParams) -> Result<Vec<u8>> {
        let size = self.to_bytes_size(params);
        let mut out = Vec::with_capacity(size);
        put_varint(&mut out, Self::TYPE.to_u64());
        self.write_body(&mut out, params)?;
        debug_assert_eq!(out.len(), size, "{} size mismatch", Self::TYPE);
        Ok(out)
    }

    /// Decode a packet that must be of this type and fill `bytes` exactly
    fn from_bytes(bytes: &[u8], params: &WireParams) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let found = PacketType::read(&mut reader)?;
        if found != Self::TYPE {
            return Err(ProtocolError::UnexpectedPacketType {
                expected: Self::TYPE.name(),
                found: found.name(),
            });
        }
        let packet = Self::read_body(&mut reader, params)?;
        reader.finish()?;
        Ok(packet)
    }
}

pub(crate) fn check_mixsize(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ProtocolError::MixSizeMismatch { expected, actual });
    }
    Ok(())
}

macro_rules! packet_catalog {
    ($($variant:ident),* $(,)?) => {
        /// Any packet of the catalog
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($variant),)*
        }

        impl Packet {
            pub fn packet_type(&self) -> PacketType {
                match self {
                    $(Packet::$variant(_) => <$variant as PacketBody>::TYPE,)*
                }
            }

            pub fn provenance(&self) -> &Provenance {
                match self {
                    $(Packet::$variant(p) => p.provenance(),)*
                }
            }

            /// Exact encoded size including the type tag
            pub fn to_bytes_size(&self, params: &WireParams) -> usize {
                match self {
                    $(Packet::$variant(p) => p.to_bytes_size(params),)*
                }
            }

            pub fn to_bytes(&self, params: &WireParams) -> Result<Vec<u8>> {
                match self {
                    $(Packet::$variant(p) => p.to_bytes(params),)*
                }
            }

            /// Decode one packet from the reader, dispatching on its tag
            pub fn read_from(reader: &mut Reader<'_>, params: &WireParams) -> Result<Self> {
                let packet_type = PacketType::read(reader)?;
                $(
                    if packet_type == <$variant as PacketBody>::TYPE {
                        return Ok(Packet::$variant($variant::read_body(reader, params)?));
                    }
                )*
                Err(ProtocolError::UnknownPacketType(packet_type.to_u64()))
            }

            /// Decode a packet that fills `bytes` exactly
            pub fn from_bytes(bytes: &[u8], params: &WireParams) -> Result<Self> {
                let mut reader = Reader::new(bytes);
                let packet = Self::read_from(&mut reader, params)?;
                reader.finish()?;
                Ok(packet)
            }
        }

        $(
            impl From<$variant> for Packet {
                fn from(packet: $variant) -> Self {
                    Packet::$variant(packet)
                }
            }
        )*
    };
}

packet_catalog!(
    AddContactRequest,
    ClientMbPacket,
    EndorsementRequest,
    LinkAddressPacket,
    MbClientPacket,
    MbMcUpBundlePacket,
    MbMcUpPacket,
    McLeaderInitPacket,
    McMbDownPacket,
    McVPacket,
    PacketPacket,
    RegistrationComplete,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values_follow_catalog_order() {
        for (i, packet_type) in PacketType::ALL.iter().enumerate() {
            assert_eq!(packet_type.to_u64(), i as u64);
            assert_eq!(PacketType::from_u64(i as u64).unwrap(), *packet_type);
        }
        assert_eq!(PacketType::ClientMbPacket.to_u64(), 1);
        assert_eq!(PacketType::RegistrationComplete.to_u64(), 11);
    }

    #[test]
    fn test_unknown_tag_message() {
        let err = PacketType::peek(&[12]).unwrap_err();
        assert_eq!(err.to_string(), "unknown packet type: 12");
        assert_eq!(err.kind(), crate::ErrorKind::Corrupt);
    }

    #[test]
    fn test_empty_input_is_truncated() {
        let params = WireParams::new(8, 2);
        assert!(matches!(
            Packet::from_bytes(&[], &params),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_typed_decode_rejects_other_type() {
        let params = WireParams::new(8, 2);
        let packet = AddContactRequest::new(vec![1, 2, 3]);
        let bytes = packet.to_bytes(&params).unwrap();
        let err = PacketPacket::from_bytes(&bytes, &params).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedPacketType {
                expected: "packet_packet",
                found: "add_contact_request",
            }
        );
    }
}
