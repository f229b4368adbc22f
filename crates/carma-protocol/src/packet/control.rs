//! Registration, addressing and forwarding packets

use super::{PacketBody, PacketType, WireParams};
use crate::error::Result;
use crate::types::{ChannelId, LinkAddress, Provenance, Psn, PsnHash, PSN_HASH_SIZE};
use crate::wire::{bytes_size, put_bytes, Reader, WireFormat};

/// Mailbox server → client: a contact request addressed to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddContactRequest {
    pub data: Vec<u8>,
    pub provenance: Provenance,
}

impl AddContactRequest {
    pub fn new(data: Vec<u8>) -> Self {
        AddContactRequest {
            data,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for AddContactRequest {
    const TYPE: PacketType = PacketType::AddContactRequest;

    fn body_size(&self, _params: &WireParams) -> usize {
        bytes_size(self.data.len())
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        put_bytes(out, &self.data);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        Ok(AddContactRequest::new(reader.read_bytes()?))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Bootstrapper → mailbox server: request to endorse a new client
///
/// `b` carries one sealed new-client notice per receiving mailbox server,
/// `c` the matching mailbox hashes sealed for the chosen MC leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementRequest {
    pub mc_leader_hash: PsnHash,
    pub a: Vec<u8>,
    pub b: Vec<u8>,
    pub c: Vec<u8>,
    pub provenance: Provenance,
}

impl EndorsementRequest {
    pub fn new(mc_leader_hash: PsnHash, a: Vec<u8>, b: Vec<u8>, c: Vec<u8>) -> Self {
        EndorsementRequest {
            mc_leader_hash,
            a,
            b,
            c,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for EndorsementRequest {
    const TYPE: PacketType = PacketType::EndorsementRequest;

    fn body_size(&self, _params: &WireParams) -> usize {
        PSN_HASH_SIZE + bytes_size(self.a.len()) + bytes_size(self.b.len()) + bytes_size(self.c.len())
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        self.mc_leader_hash.write_wire(out);
        put_bytes(out, &self.a);
        put_bytes(out, &self.b);
        put_bytes(out, &self.c);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        let mc_leader_hash = PsnHash::read_wire(reader)?;
        let a = reader.read_bytes()?;
        let b = reader.read_bytes()?;
        let c = reader.read_bytes()?;
        Ok(EndorsementRequest::new(mc_leader_hash, a, b, c))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Advertises the address of a freshly created link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAddressPacket {
    pub channel_id: ChannelId,
    pub link_address: LinkAddress,
    pub provenance: Provenance,
}

impl LinkAddressPacket {
    pub fn new(channel_id: ChannelId, link_address: LinkAddress) -> Self {
        LinkAddressPacket {
            channel_id,
            link_address,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for LinkAddressPacket {
    const TYPE: PacketType = PacketType::LinkAddressPacket;

    fn body_size(&self, _params: &WireParams) -> usize {
        self.channel_id.wire_size() + self.link_address.wire_size()
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        self.channel_id.write_wire(out);
        self.link_address.write_wire(out);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        let channel_id = ChannelId::read_wire(reader)?;
        let link_address = LinkAddress::read_wire(reader)?;
        Ok(LinkAddressPacket::new(channel_id, link_address))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// An addressed, already encoded packet travelling one more hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketPacket {
    pub receiver: Psn,
    pub packet: Vec<u8>,
    pub provenance: Provenance,
}

impl PacketPacket {
    pub fn new(receiver: Psn, packet: Vec<u8>) -> Self {
        PacketPacket {
            receiver,
            packet,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for PacketPacket {
    const TYPE: PacketType = PacketType::PacketPacket;

    fn body_size(&self, _params: &WireParams) -> usize {
        self.receiver.wire_size() + bytes_size(self.packet.len())
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        self.receiver.write_wire(out);
        put_bytes(out, &self.packet);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        let receiver = Psn::read_wire(reader)?;
        let packet = reader.read_bytes()?;
        Ok(PacketPacket::new(receiver, packet))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Mailbox server → bootstrappee: registration accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationComplete {
    pub channel_id: ChannelId,
    pub cookie: Vec<u8>,
    pub provenance: Provenance,
}

impl RegistrationComplete {
    pub fn new(channel_id: ChannelId, cookie: Vec<u8>) -> Self {
        RegistrationComplete {
            channel_id,
            cookie,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for RegistrationComplete {
    const TYPE: PacketType = PacketType::RegistrationComplete;

    fn body_size(&self, _params: &WireParams) -> usize {
        self.channel_id.wire_size() + bytes_size(self.cookie.len())
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        self.channel_id.write_wire(out);
        put_bytes(out, &self.cookie);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        let channel_id = ChannelId::read_wire(reader)?;
        let cookie = reader.read_bytes()?;
        Ok(RegistrationComplete::new(channel_id, cookie))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_link_address_layout() {
        let packet = LinkAddressPacket::new(
            ChannelId("twoSixDirectCpp".to_string()),
            LinkAddress("{\"hostname\":\"x\"}".to_string()),
        );
        let params = WireParams::new(8, 1);
        let bytes = packet.to_bytes(&params).unwrap();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[1] as usize, "twoSixDirectCpp".len());
        assert_eq!(&bytes[2..17], b"twoSixDirectCpp");
        assert_eq!(bytes.len(), packet.to_bytes_size(&params));
    }

    #[test]
    fn test_endorsement_rejects_bad_hash_tag() {
        let hash = PsnHash::from_digest(&[3u8; 15]);
        let packet = EndorsementRequest::new(hash, vec![1], vec![2], vec![3]);
        let params = WireParams::new(8, 1);
        let mut bytes = packet.to_bytes(&params).unwrap();
        bytes[1] = 0x00;
        assert!(matches!(
            EndorsementRequest::from_bytes(&bytes, &params),
            Err(ProtocolError::InvalidPsnHash(_))
        ));
    }

    #[test]
    fn test_packet_packet_nests_encoded_packet() {
        let params = WireParams::new(8, 1);
        let inner = AddContactRequest::new(b"hello".to_vec());
        let outer = PacketPacket::new(Psn::from("bob"), inner.to_bytes(&params).unwrap());
        let bytes = outer.to_bytes(&params).unwrap();

        let decoded = PacketPacket::from_bytes(&bytes, &params).unwrap();
        assert_eq!(decoded.receiver, Psn::from("bob"));
        assert_eq!(
            AddContactRequest::from_bytes(&decoded.packet, &params).unwrap(),
            inner
        );
    }
}
