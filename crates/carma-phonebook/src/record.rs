//! Phonebook entries

use crate::cache::CacheCell;
use crate::error::{PhonebookError, Result};
use carma_crypto::{psn_hash, PUBLIC_KEY_SIZE};
use carma_protocol::{NodeCount, Psn, PsnHash, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Handle to a phonebook entry
///
/// A reference names an entry by PSN and is resolved through
/// [`crate::Phonebook::at`]. References order by PSN, so sets of them
/// iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerRef(Psn);

impl PeerRef {
    pub fn new(psn: Psn) -> Self {
        PeerRef(psn)
    }

    pub fn psn(&self) -> &Psn {
        &self.0
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&Psn> for PeerRef {
    fn from(psn: &Psn) -> Self {
        PeerRef(psn.clone())
    }
}

pub type PeerSet = BTreeSet<PeerRef>;

pub(crate) fn set_to_psns(set: &PeerSet) -> Vec<Psn> {
    set.iter().map(|r| r.psn().clone()).collect()
}

pub(crate) fn psns_to_set(psns: Vec<Psn>) -> PeerSet {
    psns.into_iter().map(PeerRef::new).collect()
}

/// Values derived from the directory and cached on an entry
#[derive(Debug, Clone, Default)]
pub struct RecordCaches {
    pub bucket: CacheCell<NodeCount>,
    pub bucket_clients: CacheCell<PeerSet>,
    pub bucket_mb_servers: CacheCell<PeerSet>,
    pub mc_leaders: CacheCell<PeerSet>,
}

impl RecordCaches {
    pub fn clear_buckets(&self) {
        self.bucket_clients.clear();
        self.bucket_mb_servers.clear();
    }

    pub fn clear(&self) {
        self.bucket.clear();
        self.clear_buckets();
        self.mc_leaders.clear();
    }
}

/// One node as known to the directory
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub psn: Psn,
    pub role: Role,
    pub public_key: Vec<u8>,
    /// MC group number or routing layer number
    pub group: Option<NodeCount>,
    /// Position within an MC group, 0 for the leader
    pub order: Option<NodeCount>,
    /// Explicit MC leader set of a mailbox server
    pub stored_mc_leaders: Option<PeerSet>,
    hash: PsnHash,
    caches: RecordCaches,
}

impl PeerRecord {
    pub fn new(psn: Psn, role: Role, public_key: Vec<u8>) -> Self {
        let hash = psn_hash(&psn);
        PeerRecord {
            psn,
            role,
            public_key,
            group: None,
            order: None,
            stored_mc_leaders: None,
            hash,
            caches: RecordCaches::default(),
        }
    }

    pub fn with_group(mut self, group: NodeCount) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_order(mut self, order: NodeCount) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_mc_leaders(mut self, mc_leaders: PeerSet) -> Self {
        self.stored_mc_leaders = Some(mc_leaders);
        self
    }

    pub fn peer_ref(&self) -> PeerRef {
        PeerRef::from(&self.psn)
    }

    pub fn hash(&self) -> PsnHash {
        self.hash
    }

    pub fn caches(&self) -> &RecordCaches {
        &self.caches
    }

    pub fn group(&self) -> Result<NodeCount> {
        self.group.ok_or_else(|| {
            PhonebookError::Config(format!("{} {} has no group number", self.role, self.psn))
        })
    }

    pub fn order(&self) -> Result<NodeCount> {
        self.order.ok_or_else(|| {
            PhonebookError::Config(format!("{} {} has no MC order", self.role, self.psn))
        })
    }

    pub fn clear_deducible(&self) {
        self.caches.clear();
    }

    /// Check that the fields the role depends on are present
    pub fn validate(&self) -> Result<()> {
        if self.public_key.len() != PUBLIC_KEY_SIZE {
            return Err(PhonebookError::corrupt(
                format!("record {}", self.psn),
                format!(
                    "public key is {} bytes, expected {}",
                    self.public_key.len(),
                    PUBLIC_KEY_SIZE
                ),
            ));
        }
        if self.role.has_group() {
            self.group()?;
        }
        if self.role.is_mc() {
            self.order()?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> RecordJson {
        RecordJson {
            psn: self.psn.clone(),
            role: self.role,
            pk: self.public_key.clone(),
            group: self.group.filter(|_| self.role.has_group()),
            order: self.order.filter(|_| self.role.is_mc()),
            mc_leaders: match self.role {
                Role::MbServer => self.stored_mc_leaders.as_ref().map(set_to_psns),
                _ => None,
            },
        }
    }

    pub fn from_json(json: RecordJson) -> Result<Self> {
        let mut record = PeerRecord::new(json.psn, json.role, json.pk);
        record.group = json.group;
        record.order = json.order;
        record.stored_mc_leaders = json.mc_leaders.map(psns_to_set);
        record.validate()?;
        Ok(record)
    }
}

/// On-disk form of a [`PeerRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordJson {
    pub psn: Psn,
    pub role: Role,
    #[serde(with = "hex_bytes")]
    pub pk: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<NodeCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<NodeCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc_leaders: Option<Vec<Psn>>,
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Vec<u8> {
        vec![7u8; PUBLIC_KEY_SIZE]
    }

    #[test]
    fn test_json_keys() {
        let record = PeerRecord::new(Psn::from("mc-1"), Role::McFollower, key())
            .with_group(3)
            .with_order(2);
        let value = serde_json::to_value(record.to_json()).unwrap();
        assert_eq!(value["psn"], "mc-1");
        assert_eq!(value["role"], "mc_follower");
        assert_eq!(value["pk"], hex::encode(key()));
        assert_eq!(value["group"], 3);
        assert_eq!(value["order"], 2);
        assert!(value.get("mc_leaders").is_none());
    }

    #[test]
    fn test_meaningless_fields_are_not_written() {
        let record = PeerRecord::new(Psn::from("c"), Role::Client, key()).with_group(1);
        let value = serde_json::to_value(record.to_json()).unwrap();
        assert!(value.get("group").is_none());
    }

    #[test]
    fn test_mc_roles_require_group_and_order() {
        let json = RecordJson {
            psn: Psn::from("l"),
            role: Role::McLeader,
            pk: key(),
            group: Some(0),
            order: None,
            mc_leaders: None,
        };
        let err = PeerRecord::from_json(json).unwrap_err();
        assert_eq!(err.kind(), carma_protocol::ErrorKind::ConfigInvariantViolation);
    }

    #[test]
    fn test_short_key_is_corrupt() {
        let json = RecordJson {
            psn: Psn::from("c"),
            role: Role::Client,
            pk: vec![1, 2, 3],
            group: None,
            order: None,
            mc_leaders: None,
        };
        let err = PeerRecord::from_json(json).unwrap_err();
        assert_eq!(err.kind(), carma_protocol::ErrorKind::Corrupt);
    }

    #[test]
    fn test_mailbox_leaders_survive_json() {
        let leaders: PeerSet = ["b", "a"].iter().map(|s| PeerRef::new(Psn::from(*s))).collect();
        let record = PeerRecord::new(Psn::from("mb"), Role::MbServer, key()).with_mc_leaders(leaders.clone());
        let text = serde_json::to_string(&record.to_json()).unwrap();
        let back = PeerRecord::from_json(serde_json::from_str(&text).unwrap()).unwrap();
        assert_eq!(back.stored_mc_leaders, Some(leaders));
        assert_eq!(back.hash(), record.hash());
    }
}
