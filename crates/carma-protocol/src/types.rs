//! Core identifier types

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// Node counts, group numbers, orders and buckets
pub type NodeCount = u64;

/// Size of a GUID in bytes
pub const GUID_SIZE: usize = 16;

/// Size of a serialized PSN hash in bytes
pub const PSN_HASH_SIZE: usize = 16;

/// Leading tag byte of a version-1 PSN hash
pub const PSN_HASH_TAG: u8 = 0x0F;

/// Placeholder PSN carried by a staged bootstrap configuration
pub const PLACEHOLDER_PSN: &str = "None";

/// Persona (peer) name, the unique key of a phonebook entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Psn(String);

impl Psn {
    pub fn new(name: impl Into<String>) -> Self {
        Psn(name.into())
    }

    /// PSN used by a node that has not been assigned its identity yet
    pub fn placeholder() -> Self {
        Psn(PLACEHOLDER_PSN.to_string())
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_PSN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Psn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Psn {
    fn from(s: &str) -> Self {
        Psn(s.to_string())
    }
}

/// Role of a node within one configuration epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    IdleServer,
    MbServer,
    McFollower,
    McLeader,
    RsServer,
    Server,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Client,
        Role::IdleServer,
        Role::MbServer,
        Role::McFollower,
        Role::McLeader,
        Role::RsServer,
        Role::Server,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::IdleServer => "idle_server",
            Role::MbServer => "mb_server",
            Role::McFollower => "mc_follower",
            Role::McLeader => "mc_leader",
            Role::RsServer => "rs_server",
            Role::Server => "server",
        }
    }

    /// Members of a mixing-combining group
    pub fn is_mc(&self) -> bool {
        matches!(self, Role::McLeader | Role::McFollower)
    }

    /// Roles that are assigned to a bucket
    pub fn has_bucket(&self) -> bool {
        matches!(self, Role::Client | Role::MbServer)
    }

    /// Roles that carry a group number (MC group or routing layer)
    pub fn has_group(&self) -> bool {
        matches!(self, Role::McLeader | Role::McFollower | Role::RsServer)
    }

    pub fn is_server(&self) -> bool {
        !matches!(self, Role::Client)
    }

    pub fn to_u64(self) -> u64 {
        match self {
            Role::Client => 0,
            Role::IdleServer => 1,
            Role::MbServer => 2,
            Role::McFollower => 3,
            Role::McLeader => 4,
            Role::RsServer => 5,
            Role::Server => 6,
        }
    }

    pub fn from_u64(value: u64) -> Option<Self> {
        Role::ALL.get(usize::try_from(value).ok()?).copied()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// 16-byte random correlation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Guid([u8; GUID_SIZE]);

impl Guid {
    /// Generate a fresh random GUID
    pub fn generate() -> Self {
        Guid(rand::random())
    }

    pub fn from_bytes(bytes: [u8; GUID_SIZE]) -> Self {
        Guid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; GUID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| ProtocolError::InvalidGuid(e.to_string()))?;
        let array: [u8; GUID_SIZE] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidGuid(format!("expected {} bytes", GUID_SIZE)))?;
        Ok(Guid(array))
    }
}

/// Offsets a GUID, treating it as a big-endian 128-bit counter that wraps.
impl std::ops::Add<u64> for Guid {
    type Output = Guid;

    fn add(self, rhs: u64) -> Guid {
        let value = u128::from_be_bytes(self.0).wrapping_add(u128::from(rhs));
        Guid(value.to_be_bytes())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Identifier of a host channel (transport plugin)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ChannelId(pub String);

/// Transport-specific address of a link
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct LinkAddress(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compact, salted digest of a PSN
///
/// Byte 0 is the hash version tag; comparisons only look at the digest bytes
/// and run in time independent of where the first difference is.
#[derive(Clone, Copy)]
pub struct PsnHash([u8; PSN_HASH_SIZE]);

impl PsnHash {
    /// Build a hash from the leading digest bytes
    pub fn from_digest(prefix: &[u8; PSN_HASH_SIZE - 1]) -> Self {
        let mut bytes = [0u8; PSN_HASH_SIZE];
        bytes[0] = PSN_HASH_TAG;
        bytes[1..].copy_from_slice(prefix);
        PsnHash(bytes)
    }

    /// Parse a serialized hash, checking the tag byte
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PSN_HASH_SIZE {
            return Err(ProtocolError::Truncated {
                needed: PSN_HASH_SIZE,
                available: bytes.len(),
            });
        }
        if bytes[0] != PSN_HASH_TAG {
            return Err(ProtocolError::InvalidPsnHash(format!(
                "unknown hash tag {:#04x}",
                bytes[0]
            )));
        }
        let mut array = [0u8; PSN_HASH_SIZE];
        array.copy_from_slice(&bytes[..PSN_HASH_SIZE]);
        Ok(PsnHash(array))
    }

    pub fn as_bytes(&self) -> &[u8; PSN_HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| ProtocolError::InvalidPsnHash(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    fn digest(&self) -> &[u8] {
        &self.0[1..]
    }
}

impl PartialEq for PsnHash {
    fn eq(&self, other: &Self) -> bool {
        self.digest()
            .iter()
            .zip(other.digest())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for PsnHash {}

impl PartialOrd for PsnHash {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PsnHash {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.digest().cmp(other.digest())
    }
}

impl std::hash::Hash for PsnHash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest().hash(state);
    }
}

impl fmt::Debug for PsnHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PsnHash({})", self.to_hex())
    }
}

impl fmt::Display for PsnHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PsnHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PsnHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PsnHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Local correlation metadata attached to a packet
///
/// Never serialized and never part of packet equality: two packets that
/// differ only in where they came from are the same packet.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    /// Host request handle that produced or delivered the packet
    pub origin_handle: Option<u64>,
    /// Tracing span the packet belongs to
    pub origin_span: Option<Guid>,
}

impl PartialEq for Provenance {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Provenance {}
