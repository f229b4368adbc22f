//! Packets internal to an MC group

use num_bigint::BigUint;

use super::{check_mixsize, PacketBody, PacketType, WireParams};
use crate::error::Result;
use crate::types::{Guid, Provenance, GUID_SIZE};
use crate::wire::{put_biguint, Reader, WireFormat};

/// MC leader → followers: start of a mix batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McLeaderInitPacket {
    pub mpcid: Guid,
    /// Correlation IDs of the batch, exactly `mixsize` of them
    pub cids: Vec<Guid>,
    pub provenance: Provenance,
}

impl McLeaderInitPacket {
    pub fn new(mpcid: Guid, cids: Vec<Guid>) -> Self {
        McLeaderInitPacket {
            mpcid,
            cids,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for McLeaderInitPacket {
    const TYPE: PacketType = PacketType::McLeaderInitPacket;

    fn body_size(&self, params: &WireParams) -> usize {
        GUID_SIZE + params.mixsize * GUID_SIZE
    }

    fn write_body(&self, out: &mut Vec<u8>, params: &WireParams) -> Result<()> {
        check_mixsize(params.mixsize, self.cids.len())?;
        self.mpcid.write_wire(out);
        for cid in &self.cids {
            cid.write_wire(out);
        }
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, params: &WireParams) -> Result<Self> {
        let mpcid = Guid::read_wire(reader)?;
        let mut cids = Vec::new();
        for _ in 0..params.mixsize {
            cids.push(Guid::read_wire(reader)?);
        }
        Ok(McLeaderInitPacket::new(mpcid, cids))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// MC member → leader: a member's vector of combined values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McVPacket {
    pub mpcid: Guid,
    pub v: Vec<BigUint>,
    pub provenance: Provenance,
}

impl McVPacket {
    pub fn new(mpcid: Guid, v: Vec<BigUint>) -> Self {
        McVPacket {
            mpcid,
            v,
            provenance: Provenance::default(),
        }
    }
}

impl PacketBody for McVPacket {
    const TYPE: PacketType = PacketType::McVPacket;

    fn body_size(&self, params: &WireParams) -> usize {
        GUID_SIZE + params.mixsize * params.prime_size
    }

    fn write_body(&self, out: &mut Vec<u8>, params: &WireParams) -> Result<()> {
        check_mixsize(params.mixsize, self.v.len())?;
        self.mpcid.write_wire(out);
        for value in &self.v {
            put_biguint(out, value, params.prime_size)?;
        }
        Ok(())
    }

    fn read_body(reader: &mut Reader<'_>, params: &WireParams) -> Result<Self> {
        let mpcid = Guid::read_wire(reader)?;
        let mut v = Vec::new();
        for _ in 0..params.mixsize {
            v.push(reader.read_biguint(params.prime_size)?);
        }
        Ok(McVPacket::new(mpcid, v))
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}
