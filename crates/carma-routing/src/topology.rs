//! Role-based relationship sets
//!
//! Every set is derived from the phonebook on first use and cached on the
//! local configuration or on the record it belongs to. The caches are
//! dropped by `Phonebook::add_slow` and `clear_deducible` whenever the
//! membership they depend on changes.

use crate::error::{Result, RoutingError};
use carma_phonebook::{GlobalConfig, LocalConfig, PeerRecord, PeerRef, PeerSet, Phonebook};
use carma_protocol::{NodeCount, Role};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// View of one node's position in the overlay
#[derive(Debug, Clone, Copy)]
pub struct Topology<'a> {
    phonebook: &'a Phonebook,
    global: &'a GlobalConfig,
    local: &'a LocalConfig,
}

impl<'a> Topology<'a> {
    pub fn new(phonebook: &'a Phonebook, global: &'a GlobalConfig, local: &'a LocalConfig) -> Self {
        Topology {
            phonebook,
            global,
            local,
        }
    }

    fn expect_role(record: &PeerRecord, allowed: &[Role], expected: &'static str) -> Result<()> {
        if allowed.contains(&record.role) {
            Ok(())
        } else {
            Err(RoutingError::WrongRole {
                psn: record.psn.clone(),
                role: record.role,
                expected,
            })
        }
    }

    fn scan(&self, mut keep: impl FnMut(&PeerRecord) -> Result<bool>) -> Result<PeerSet> {
        let mut set = PeerSet::new();
        for record in self.phonebook.records()? {
            if keep(&record)? {
                set.insert(record.peer_ref());
            }
        }
        Ok(set)
    }

    fn all_with_role(&self, role: Role) -> Result<PeerSet> {
        self.scan(|record| Ok(record.role == role))
    }

    /// Members of MC group `group` ordered by MC order, leader first
    pub fn mc_group(&self, group: NodeCount) -> Result<Arc<Vec<PeerRef>>> {
        let mut groups = self.local.caches().mc_groups.lock();
        if let Some(members) = groups.get(&group) {
            return Ok(members.clone());
        }
        let members = Arc::new(self.build_mc_group(group)?);
        debug!("Derived MC group {} with {} members", group, members.len());
        groups.insert(group, members.clone());
        Ok(members)
    }

    fn build_mc_group(&self, group: NodeCount) -> Result<Vec<PeerRef>> {
        let mut by_order: BTreeMap<NodeCount, PeerRef> = BTreeMap::new();
        for record in self.phonebook.records()? {
            if !record.role.is_mc() || record.group != Some(group) {
                continue;
            }
            let order = record.order()?;
            if record.role == Role::McLeader && order != 0 {
                return Err(RoutingError::Config(format!(
                    "MC leader \"{}\" in group {} has order {}",
                    record.psn, group, order
                )));
            }
            if record.role == Role::McFollower && order == 0 {
                return Err(RoutingError::Config(format!(
                    "MC follower \"{}\" in group {} has order {}",
                    record.psn, group, order
                )));
            }
            if let Some(existing) = by_order.get(&order) {
                return Err(RoutingError::Config(format!(
                    "MC servers \"{}\" and \"{}\" in group {} both have order {}",
                    existing, record.psn, group, order
                )));
            }
            by_order.insert(order, record.peer_ref());
        }

        let size = by_order.len() as NodeCount;
        if size < self.global.min_mc_size {
            return Err(RoutingError::Config(format!(
                "MC group {} only has {} servers, which is fewer than the minimum of {}",
                group, size, self.global.min_mc_size
            )));
        }
        if let Some((max_order, member)) = by_order.iter().next_back() {
            if *max_order >= size {
                return Err(RoutingError::Config(format!(
                    "MC server \"{}\" in group {} has order {}, which is not less than the size of its group, {}",
                    member, group, max_order, size
                )));
            }
        }
        Ok(by_order.into_values().collect())
    }

    /// MC group of an MC leader or follower
    pub fn mc_group_of(&self, server: &PeerRecord) -> Result<Arc<Vec<PeerRef>>> {
        Self::expect_role(server, &[Role::McLeader, Role::McFollower], "mc_leader or mc_follower")?;
        self.mc_group(server.group()?)
    }

    /// Leader of the local node's MC group. Only defined for followers.
    pub fn mc_leader(&self) -> Result<Arc<PeerRef>> {
        let record = &self.local.record;
        Self::expect_role(record, &[Role::McFollower], "mc_follower")?;
        let group = record.group()?;
        self.local.caches().mc_leader.get_or_try_publish(|| -> Result<PeerRef> {
            for candidate in self.phonebook.records()? {
                if candidate.role == Role::McLeader && candidate.group == Some(group) {
                    return Ok(candidate.peer_ref());
                }
            }
            Err(RoutingError::Config(format!(
                "MC group {} is missing an MC leader",
                group
            )))
        })
    }

    /// Bucket of a client or mailbox server
    pub fn bucket(&self, record: &PeerRecord) -> Result<NodeCount> {
        Self::expect_role(record, &[Role::Client, Role::MbServer], "client or mb_server")?;
        let bucket = record
            .caches()
            .bucket
            .get_or_try_publish(|| self.global.bucket_of(&record.psn))?;
        Ok(*bucket)
    }

    fn same_bucket(&self, record: &PeerRecord, role: Role) -> Result<PeerSet> {
        let bucket = self.bucket(record)?;
        self.scan(|candidate| Ok(candidate.role == role && self.bucket(candidate)? == bucket))
    }

    /// Clients sharing the bucket of a client or mailbox server
    pub fn bucket_clients(&self, record: &PeerRecord) -> Result<Arc<PeerSet>> {
        Self::expect_role(record, &[Role::Client, Role::MbServer], "client or mb_server")?;
        record
            .caches()
            .bucket_clients
            .get_or_try_publish(|| self.same_bucket(record, Role::Client))
    }

    /// Mailbox servers sharing the bucket of a client or mailbox server
    pub fn bucket_mb_servers(&self, record: &PeerRecord) -> Result<Arc<PeerSet>> {
        Self::expect_role(record, &[Role::Client, Role::MbServer], "client or mb_server")?;
        record
            .caches()
            .bucket_mb_servers
            .get_or_try_publish(|| self.same_bucket(record, Role::MbServer))
    }

    /// MC leaders a mailbox server may send upstream to
    pub fn mc_leaders(&self, record: &PeerRecord) -> Result<Arc<PeerSet>> {
        Self::expect_role(record, &[Role::MbServer], "mb_server")?;
        record.caches().mc_leaders.get_or_try_publish(|| {
            match &record.stored_mc_leaders {
                Some(stored) => Ok(stored.clone()),
                None if self.global.rigid => self.all_with_role(Role::McLeader),
                None => Err(RoutingError::Config(format!(
                    "MB server \"{}\" has no mc_leaders and the configuration is not rigid",
                    record.psn
                ))),
            }
        })
    }

    /// Mailbox servers the local MC leader receives from
    pub fn mb_servers(&self) -> Result<Arc<PeerSet>> {
        let record = &self.local.record;
        Self::expect_role(record, &[Role::McLeader], "mc_leader")?;
        self.local.caches().mb_servers.get_or_try_init(|| {
            match &self.local.mb_servers {
                Some(stored) => Ok(stored.clone()),
                None if self.global.rigid => self.all_with_role(Role::MbServer),
                None => Err(RoutingError::Config(format!(
                    "MC leader \"{}\" has no mb_servers and the configuration is not rigid",
                    record.psn
                ))),
            }
        })
    }

    pub fn next_layer(&self) -> Result<Arc<PeerSet>> {
        let record = &self.local.record;
        Self::expect_role(record, &[Role::McLeader, Role::RsServer], "mc_leader or rs_server")?;
        self.local.caches().next_layer.get_or_try_init(|| {
            match &self.local.next_layer {
                Some(stored) => Ok(stored.clone()),
                None if self.global.rigid => self.all_with_role(Role::MbServer),
                None => Err(RoutingError::Config(format!(
                    "{} \"{}\" has no next_layer and the configuration is not rigid",
                    record.role, record.psn
                ))),
            }
        })
    }

    pub fn prev_layer(&self) -> Result<Arc<PeerSet>> {
        let record = &self.local.record;
        Self::expect_role(record, &[Role::MbServer, Role::RsServer], "mb_server or rs_server")?;
        self.local.caches().prev_layer.get_or_try_init(|| {
            match &self.local.prev_layer {
                Some(stored) => Ok(stored.clone()),
                None if self.global.rigid && record.role == Role::MbServer => {
                    self.all_with_role(Role::McLeader)
                }
                None => Err(RoutingError::Config(format!(
                    "{} \"{}\" has no prev_layer",
                    record.role, record.psn
                ))),
            }
        })
    }

    pub fn other_servers(&self) -> Result<&'a PeerSet> {
        let record = &self.local.record;
        if record.role == Role::Client {
            return Err(RoutingError::WrongRole {
                psn: record.psn.clone(),
                role: record.role,
                expected: "a server role",
            });
        }
        self.local.other_servers.as_ref().ok_or_else(|| {
            RoutingError::Config(format!(
                "{} \"{}\" has no other_servers",
                record.role, record.psn
            ))
        })
    }

    /// Peers the local node may send to
    pub fn tx_nodes(&self) -> Result<Arc<PeerSet>> {
        self.local.caches().tx_nodes.get_or_try_init(|| -> Result<PeerSet> {
            let record = &self.local.record;
            let mut set = PeerSet::new();
            match record.role {
                Role::Client => {
                    set.extend(self.bucket_mb_servers(record)?.iter().cloned());
                }
                Role::IdleServer => {
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::MbServer => {
                    set.extend(self.mc_leaders(record)?.iter().cloned());
                    set.extend(self.bucket_clients(record)?.iter().cloned());
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::McFollower => {
                    set.insert(PeerRef::clone(&*self.mc_leader()?));
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::McLeader => {
                    set.extend(self.mc_group_of(record)?.iter().skip(1).cloned());
                    set.extend(self.next_layer()?.iter().cloned());
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::RsServer => {
                    set.extend(self.next_layer()?.iter().cloned());
                    set.extend(self.other_servers()?.iter().cloned());
                }
                role @ Role::Server => return Err(RoutingError::UnsupportedRole(role)),
            }
            debug!("Derived tx_nodes for {} ({} peers)", record.psn, set.len());
            Ok(set)
        })
    }

    /// Peers the local node accepts packets from
    pub fn rx_nodes(&self) -> Result<Arc<PeerSet>> {
        self.local.caches().rx_nodes.get_or_try_init(|| -> Result<PeerSet> {
            let record = &self.local.record;
            let mut set = PeerSet::new();
            match record.role {
                Role::Client => {
                    set.extend(self.bucket_mb_servers(record)?.iter().cloned());
                }
                Role::IdleServer => {
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::MbServer => {
                    set.extend(self.bucket_clients(record)?.iter().cloned());
                    set.extend(self.prev_layer()?.iter().cloned());
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::McFollower => {
                    set.insert(PeerRef::clone(&*self.mc_leader()?));
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::McLeader => {
                    set.extend(self.mc_group_of(record)?.iter().skip(1).cloned());
                    set.extend(self.mb_servers()?.iter().cloned());
                    set.extend(self.other_servers()?.iter().cloned());
                }
                Role::RsServer => {
                    set.extend(self.prev_layer()?.iter().cloned());
                    set.extend(self.other_servers()?.iter().cloned());
                }
                role @ Role::Server => return Err(RoutingError::UnsupportedRole(role)),
            }
            debug!("Derived rx_nodes for {} ({} peers)", record.psn, set.len());
            Ok(set)
        })
    }

    pub fn may_send_to(&self, peer: &PeerRef) -> Result<bool> {
        Ok(self.tx_nodes()?.contains(peer))
    }

    pub fn may_receive_from(&self, peer: &PeerRef) -> Result<bool> {
        Ok(self.rx_nodes()?.contains(peer))
    }
}
