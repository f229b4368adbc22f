//! This node's own configuration

use crate::cache::CacheCell;
use crate::error::{PhonebookError, Result};
use crate::record::{hex_bytes, psns_to_set, set_to_psns, PeerRecord, PeerRef, PeerSet, RecordJson};
use carma_crypto::{KeyPair, SECRET_KEY_SIZE};
use carma_protocol::{NodeCount, Psn, Role};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Relationship sets derived for the local node
#[derive(Debug, Default)]
pub struct LocalCaches {
    /// MC groups by group number, leader first
    pub mc_groups: Mutex<BTreeMap<NodeCount, Arc<Vec<PeerRef>>>>,
    pub mc_leader: CacheCell<PeerRef>,
    pub tx_nodes: CacheCell<PeerSet>,
    pub rx_nodes: CacheCell<PeerSet>,
    pub next_layer: CacheCell<PeerSet>,
    pub prev_layer: CacheCell<PeerSet>,
    pub mb_servers: CacheCell<PeerSet>,
}

impl Clone for LocalCaches {
    fn clone(&self) -> Self {
        LocalCaches {
            mc_groups: Mutex::new(self.mc_groups.lock().clone()),
            mc_leader: self.mc_leader.clone(),
            tx_nodes: self.tx_nodes.clone(),
            rx_nodes: self.rx_nodes.clone(),
            next_layer: self.next_layer.clone(),
            prev_layer: self.prev_layer.clone(),
            mb_servers: self.mb_servers.clone(),
        }
    }
}

impl LocalCaches {
    pub fn clear(&self) {
        self.mc_groups.lock().clear();
        self.mc_leader.clear();
        self.tx_nodes.clear();
        self.rx_nodes.clear();
        self.next_layer.clear();
        self.prev_layer.clear();
        self.mb_servers.clear();
    }
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub record: PeerRecord,
    pub secret_key: Vec<u8>,
    pub next_layer: Option<PeerSet>,
    pub prev_layer: Option<PeerSet>,
    pub other_servers: Option<PeerSet>,
    pub mb_servers: Option<PeerSet>,
    caches: LocalCaches,
}

impl LocalConfig {
    pub fn new(record: PeerRecord, secret_key: Vec<u8>) -> Self {
        LocalConfig {
            record,
            secret_key,
            next_layer: None,
            prev_layer: None,
            other_servers: None,
            mb_servers: None,
            caches: LocalCaches::default(),
        }
    }

    pub fn psn(&self) -> &Psn {
        &self.record.psn
    }

    pub fn role(&self) -> Role {
        self.record.role
    }

    pub fn key_pair(&self) -> KeyPair {
        KeyPair::new(self.record.public_key.clone(), self.secret_key.clone())
    }

    pub fn caches(&self) -> &LocalCaches {
        &self.caches
    }

    /// Drop the relationship sets derived from directory membership
    pub fn clear_derived(&self) {
        self.caches.clear();
    }

    /// Drop every derived value, including those of the local record
    pub fn clear_deducible(&self) {
        self.record.clear_deducible();
        self.caches.clear();
    }

    /// Copy of this configuration suitable for a node that has not been
    /// assigned an identity yet: placeholder PSN and zero-filled keys
    pub fn placeholder(&self) -> Self {
        let mut record = self.record.clone();
        record.psn = Psn::placeholder();
        record.public_key = vec![0u8; self.record.public_key.len()];
        let record = rebuild(record);
        let mut local = self.clone();
        local.record = record;
        local.secret_key = vec![0u8; self.secret_key.len()];
        local.clear_deducible();
        local
    }

    pub fn to_json(&self) -> LocalJson {
        LocalJson {
            record: self.record.to_json(),
            sk: self.secret_key.clone(),
            next_layer: self.next_layer.as_ref().map(set_to_psns),
            prev_layer: self.prev_layer.as_ref().map(set_to_psns),
            other_servers: self.other_servers.as_ref().map(set_to_psns),
            mb_servers: self.mb_servers.as_ref().map(set_to_psns),
        }
    }

    pub fn from_json(json: LocalJson) -> Result<Self> {
        let record = PeerRecord::from_json(json.record)?;
        if json.sk.len() != SECRET_KEY_SIZE {
            return Err(PhonebookError::corrupt(
                "local configuration",
                format!("secret key is {} bytes, expected {}", json.sk.len(), SECRET_KEY_SIZE),
            ));
        }
        let mut local = LocalConfig::new(record, json.sk);
        local.next_layer = json.next_layer.map(psns_to_set);
        local.prev_layer = json.prev_layer.map(psns_to_set);
        local.other_servers = json.other_servers.map(psns_to_set);
        local.mb_servers = json.mb_servers.map(psns_to_set);
        Ok(local)
    }
}

/// The PSN hash is cached on a record, so a record whose PSN changed is
/// rebuilt from its fields.
fn rebuild(record: PeerRecord) -> PeerRecord {
    let mut fresh = PeerRecord::new(record.psn, record.role, record.public_key);
    fresh.group = record.group;
    fresh.order = record.order;
    fresh.stored_mc_leaders = record.stored_mc_leaders;
    fresh
}

/// On-disk form of a [`LocalConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalJson {
    #[serde(flatten)]
    pub record: RecordJson,
    #[serde(with = "hex_bytes")]
    pub sk: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_layer: Option<Vec<Psn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_layer: Option<Vec<Psn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_servers: Option<Vec<Psn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_servers: Option<Vec<Psn>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use carma_crypto::PUBLIC_KEY_SIZE;

    fn local() -> LocalConfig {
        let record = PeerRecord::new(Psn::from("mb-0"), Role::MbServer, vec![5; PUBLIC_KEY_SIZE]);
        let mut local = LocalConfig::new(record, vec![6; SECRET_KEY_SIZE]);
        local.other_servers = Some(psns_to_set(vec![Psn::from("mc-0")]));
        local
    }

    #[test]
    fn test_json_carries_secret_and_sets() {
        let value = serde_json::to_value(local().to_json()).unwrap();
        assert_eq!(value["psn"], "mb-0");
        assert_eq!(value["sk"], hex::encode([6u8; SECRET_KEY_SIZE]));
        assert_eq!(value["other_servers"], serde_json::json!(["mc-0"]));
        assert!(value.get("next_layer").is_none());

        let back = LocalConfig::from_json(serde_json::from_value(value).unwrap()).unwrap();
        assert_eq!(back.other_servers, local().other_servers);
        assert_eq!(back.secret_key, local().secret_key);
    }

    #[test]
    fn test_placeholder_zeroes_identity() {
        let original = local();
        let staged = original.placeholder();
        assert!(staged.psn().is_placeholder());
        assert!(staged.record.public_key.iter().all(|b| *b == 0));
        assert!(staged.secret_key.iter().all(|b| *b == 0));
        assert_eq!(staged.other_servers, original.other_servers);
        assert_eq!(staged.record.hash(), carma_crypto::psn_hash(&Psn::placeholder()));
        assert_eq!(original.psn(), &Psn::from("mb-0"));
    }

    #[test]
    fn test_clear_deducible_empties_caches() {
        let local = local();
        local.caches().tx_nodes.set(PeerSet::new());
        local.record.caches().bucket.set(3);
        local.clear_deducible();
        assert!(!local.caches().tx_nodes.is_set());
        assert!(!local.record.caches().bucket.is_set());
    }
}
