//! Packets exchanged between clients, mailbox servers and MC groups

use num_bigint::BigUint;

use super::{check_mixsize, PacketBody, PacketType, WireParams};
use crate::error::Result;
use crate::types::{Guid, NodeCount, Provenance, GUID_SIZE};
use crate::wire::{bytes_size, put_biguint, put_bytes, put_varint, varint_size, Reader, WireFormat};

/// Client → mailbox server: one masked mix value for an MC group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMbPacket {
    pub cid: Guid,
    pub x: BigUint,
    pub mc_group_number: NodeCount,
    pub provenance: Provenance,
}

impl ClientMbPacket {
    pub fn new(cid: Guid, x: BigUint, mc_group_number: NodeCount) -> Self {
        ClientMbPacket {
            cid,
            x,
            mc_group_number,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for ClientMbPacket {
    const TYPE: PacketType = PacketType::ClientMbPacket;

    fn body_size(&self, params: &WireParams) -> usize {
        GUID_SIZE + params.prime_size + varint_size(self.mc_group_number)
    }

    fn write_body(&self, out: &mut Vec<u8>, params: &WireParams) -> Result<()> {
        self.cid.write_wire(out);
        put_biguint(out, &self.x, params.prime_size)?;
        put_varint(out, self.mc_group_number);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, params: &WireParams) -> Result<Self> {
        let cid = Guid::read_wire(reader)?;
        let x = reader.read_biguint(params.prime_size)?;
        let mc_group_number = reader.read_varint()?;
        Ok(ClientMbPacket::new(cid, x, mc_group_number))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Mailbox server → client delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbClientPacket {
    pub a: Vec<u8>,
    pub oid: Guid,
    pub provenance: Provenance,
}

impl MbClientPacket {
    pub fn new(a: Vec<u8>, oid: Guid) -> Self {
        MbClientPacket {
            a,
            oid,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for MbClientPacket {
    const TYPE: PacketType = PacketType::MbClientPacket;

    fn body_size(&self, _params: &WireParams) -> usize {
        bytes_size(self.a.len()) + GUID_SIZE
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        put_bytes(out, &self.a);
        self.oid.write_wire(out);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        let a = reader.read_bytes()?;
        let oid = Guid::read_wire(reader)?;
        Ok(MbClientPacket::new(a, oid))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Mailbox server → one MC group member: that member's shares of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbMcUpPacket {
    pub cid: Guid,
    /// One share per mix slot
    pub z: Vec<BigUint>,
    pub provenance: Provenance,
}

impl MbMcUpPacket {
    pub fn new(cid: Guid, z: Vec<BigUint>) -> Self {
        MbMcUpPacket {
            cid,
            z,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for MbMcUpPacket {
    const TYPE: PacketType = PacketType::MbMcUpPacket;

    fn body_size(&self, params: &WireParams) -> usize {
        GUID_SIZE + params.mixsize * params.prime_size
    }

    fn write_body(&self, out: &mut Vec<u8>, params: &WireParams) -> Result<()> {
        check_mixsize(params.mixsize, self.z.len())?;
        self.cid.write_wire(out);
        for share in &self.z {
            put_biguint(out, share, params.prime_size)?;
        }
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, params: &WireParams) -> Result<Self> {
        let cid = Guid::read_wire(reader)?;
        let mut z = Vec::new();
        for _ in 0..params.mixsize {
            z.push(reader.read_biguint(params.prime_size)?);
        }
        Ok(MbMcUpPacket::new(cid, z))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Mailbox server → MC leader: encoded up packets for the whole group
///
/// Part 0 is the leader's own up packet; the rest are sealed for the
/// followers, in group order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbMcUpBundlePacket {
    pub parts: Vec<Vec<u8>>,
    pub provenance: Provenance,
}

impl MbMcUpBundlePacket {
    pub fn new(parts: Vec<Vec<u8>>) -> Self {
        MbMcUpBundlePacket {
            parts,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for MbMcUpBundlePacket {
    const TYPE: PacketType = PacketType::MbMcUpBundlePacket;

    fn body_size(&self, _params: &WireParams) -> usize {
        varint_size(self.parts.len() as u64)
            + self
                .parts
                .iter()
                .map(|part| bytes_size(part.len()))
                .sum::<usize>()
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        put_varint(out, self.parts.len() as u64);
        for part in &self.parts {
            put_bytes(out, part);
        }
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        let count = reader.read_count()?;
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            parts.push(reader.read_bytes()?);
        }
        Ok(MbMcUpBundlePacket::new(parts))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// MC group → mailbox server: mixed output for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McMbDownPacket {
    pub a: Vec<u8>,
    pub b: Vec<u8>,
    pub oid: Guid,
    pub provenance: Provenance,
}

impl McMbDownPacket {
    pub fn new(a: Vec<u8>, b: Vec<u8>, oid: Guid) -> Self {
        McMbDownPacket {
            a,
            b,
            oid,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for McMbDownPacket {
    const TYPE: PacketType = PacketType::McMbDownPacket;

    fn body_size(&self, _params: &WireParams) -> usize {
        bytes_size(self.a.len()) + bytes_size(self.b.len()) + GUID_SIZE
    }

    fn write_body(&self, out: &mut Vec<u8>, _params: &WireParams) -> Result<()> {
        put_bytes(out, &self.a);
        put_bytes(out, &self.b);
        self.oid.write_wire(out);
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, _params: &WireParams) -> Result<Self> {
        let a = reader.read_bytes()?;
        let b = reader.read_bytes()?;
        let oid = Guid::read_wire(reader)?;
        Ok(McMbDownPacket::new(a, b, oid))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}
