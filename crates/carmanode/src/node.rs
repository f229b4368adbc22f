//! CARMA node runtime
//!
//! A [`Node`] owns one loaded [`Config`] and a [`Transport`]. Outbound
//! packets are sealed for their destination and wrapped in a
//! `packet_packet` frame:
//!
//! ```text
//! packet_packet { receiver: dest PSN, packet: sender PSN (bytes) ‖ auth envelope }
//! ```
//!
//! The sender PSN travels in the clear so the receiver can pick the key to
//! open the envelope with and check the sender against its rx set before
//! doing any decryption.

use carma_crypto::{auth_decrypt, auth_encrypt, KeyPair};
use carma_phonebook::{PeerRecord, PeerRef, RecordJson};
use carma_protocol::packet::PacketPacket;
use carma_protocol::wire::{bytes_size, put_bytes};
use carma_protocol::{ErrorKind, Packet, PacketBody, Psn, Reader, WireParams};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{NodeError, Result};
use crate::plugin::{PackageStatus, PluginStatus};
use crate::transport::{SendHandle, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Loaded, but the relationship sets have not been derived yet
    NotReady,
    Ready,
    /// The configuration violates an invariant; only a new configuration
    /// recovers from this
    Broken,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeState::NotReady => "not ready",
            NodeState::Ready => "ready",
            NodeState::Broken => "broken",
        };
        f.write_str(name)
    }
}

/// A packet accepted from a peer in the rx set
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub sender: PeerRef,
    pub packet: Packet,
}

pub struct Node {
    config: Config,
    transport: Arc<dyn Transport>,
    state: RwLock<NodeState>,
    pack_on_flush: bool,
    pending: Mutex<BTreeMap<SendHandle, Psn>>,
    last_maintenance: Mutex<Option<DateTime<Utc>>>,
}

impl Node {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            state: RwLock::new(NodeState::NotReady),
            pack_on_flush: false,
            pending: Mutex::new(BTreeMap::new()),
            last_maintenance: Mutex::new(None),
        }
    }

    pub fn with_pack_on_flush(mut self, pack: bool) -> Self {
        self.pack_on_flush = pack;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn psn(&self) -> &Psn {
        self.config.local.psn()
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn plugin_status(&self) -> PluginStatus {
        match self.state() {
            NodeState::Ready => PluginStatus::Ready,
            NodeState::NotReady | NodeState::Broken => PluginStatus::NotReady,
        }
    }

    pub fn last_maintenance(&self) -> Option<DateTime<Utc>> {
        *self.last_maintenance.lock()
    }

    fn set_state(&self, next: NodeState) {
        let mut state = self.state.write();
        if *state != next {
            info!("Node {} is now {} (was {})", self.psn(), next, *state);
            *state = next;
        }
    }

    fn require_ready(&self) -> Result<()> {
        match self.state() {
            NodeState::Ready => Ok(()),
            state => Err(NodeError::NotReady(state)),
        }
    }

    fn wire_params(&self) -> WireParams {
        self.config.global.wire_params()
    }

    /// Seal `packet` for `dest` and hand it to the transport
    pub fn send_packet(&self, dest: &Psn, packet: &Packet) -> Result<SendHandle> {
        self.require_ready()?;
        let phonebook = self.config.phonebook();
        let peer = phonebook.expect(dest)?;
        if !self.config.topology().may_send_to(&peer)? {
            return Err(NodeError::Forbidden {
                peer: dest.clone(),
                direction: "tx",
            });
        }

        let params = self.wire_params();
        let record = phonebook.at(&peer)?;
        let plaintext = packet.to_bytes(&params)?;
        let frame = seal_frame(
            self.psn(),
            &self.config.local.key_pair(),
            &record,
            &plaintext,
            &params,
        )?;

        let handle = self.transport.send(dest, frame)?;
        self.pending.lock().insert(handle, dest.clone());
        debug!(
            "Sent {} to {} (handle {})",
            packet.packet_type(),
            dest,
            handle
        );
        Ok(handle)
    }

    /// Open an inbound frame
    ///
    /// Frames that are corrupt, misaddressed, from an unknown peer or from a
    /// peer outside the rx set are logged and dropped (`Ok(None)`).
    pub fn receive(&self, bytes: &[u8]) -> Result<Option<Inbound>> {
        self.require_ready()?;
        match self.open_frame(bytes) {
            Ok(inbound) => {
                debug!(
                    "Received {} from {}",
                    inbound.packet.packet_type(),
                    inbound.sender
                );
                Ok(Some(inbound))
            }
            Err(e @ NodeError::Forbidden { .. }) => {
                warn!("Dropping packet: {}", e);
                Ok(None)
            }
            Err(e) if matches!(e.kind(), ErrorKind::Corrupt | ErrorKind::NotFound) => {
                warn!("Dropping corrupt packet ({} bytes): {}", bytes.len(), e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn open_frame(&self, bytes: &[u8]) -> Result<Inbound> {
        let params = self.wire_params();
        let frame = PacketPacket::from_bytes(bytes, &params)?;
        if &frame.receiver != self.psn() {
            return Err(NodeError::Misaddressed(frame.receiver));
        }

        let mut reader = Reader::new(&frame.packet);
        let sender = Psn::new(reader.read_string("sender PSN")?);
        let envelope = reader.take(reader.avail())?;

        let phonebook = self.config.phonebook();
        let peer = phonebook.expect(&sender)?;
        if !self.config.topology().may_receive_from(&peer)? {
            return Err(NodeError::Forbidden {
                peer: sender,
                direction: "rx",
            });
        }

        let record = phonebook.at(&peer)?;
        let plaintext = auth_decrypt(envelope, &self.config.local.key_pair(), &record.public_key)?;
        let packet = Packet::from_bytes(&plaintext, &params)?;
        Ok(Inbound {
            sender: peer,
            packet,
        })
    }

    /// Record the outcome of a package sent earlier and forget its handle
    ///
    /// Returns the destination the package was sent to, if the handle was
    /// still pending.
    pub fn package_status_changed(&self, handle: SendHandle, status: PackageStatus) -> Option<Psn> {
        let dest = self.pending.lock().remove(&handle);
        match (&dest, status) {
            (Some(dest), PackageStatus::Failed) => warn!("Package {} to {} failed", handle, dest),
            (None, PackageStatus::Failed) => warn!("Package {} failed", handle),
            (Some(dest), status) => debug!("Package {} to {} {:?}", handle, dest, status),
            (None, status) => debug!("Unknown package {} {:?}", handle, status),
        }
        dest
    }

    /// Handles sent but not yet reported on
    pub fn pending(&self) -> Vec<SendHandle> {
        self.pending.lock().keys().copied().collect()
    }

    /// Enter a peer learned at runtime, e.g. a newly bootstrapped node
    ///
    /// `record` is the JSON form of a phonebook entry. Every relationship
    /// set the new peer can change is dropped and rederived on demand, and
    /// the configuration is flushed.
    pub fn add_peer(&self, record: &[u8]) -> Result<PeerRef> {
        let json: RecordJson = serde_json::from_slice(record).map_err(NodeError::PeerRecord)?;
        let record = PeerRecord::from_json(json)?;
        let psn = record.psn.clone();
        let role = record.role;
        let peer = self
            .config
            .phonebook()
            .add_slow(record, &self.config.global, &self.config.local)?;
        info!("Added {} ({}) to the phonebook of {}", psn, role, self.psn());
        self.config.flush(self.pack_on_flush)?;
        Ok(peer)
    }

    /// One maintenance pass: validate the local MC group, rederive the
    /// relationship sets and flush the configuration
    ///
    /// A configuration error leaves the node broken for good; any other
    /// failure is returned and the next pass tries again.
    pub fn maintain(&self) -> Result<()> {
        if self.state() == NodeState::Broken {
            return Err(NodeError::NotReady(NodeState::Broken));
        }
        match self.run_maintenance() {
            Ok(ready) => {
                *self.last_maintenance.lock() = Some(Utc::now());
                self.set_state(if ready {
                    NodeState::Ready
                } else {
                    NodeState::NotReady
                });
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::ConfigInvariantViolation => {
                error!("Configuration of {} is invalid: {}", self.psn(), e);
                self.set_state(NodeState::Broken);
                Err(e)
            }
            Err(e) => {
                warn!("Maintenance of {} failed: {}", self.psn(), e);
                Err(e)
            }
        }
    }

    fn run_maintenance(&self) -> Result<bool> {
        let local = &self.config.local;
        if local.psn().is_placeholder() {
            // Staged bootstrap configuration, waiting for an identity
            self.config.flush(self.pack_on_flush)?;
            return Ok(false);
        }

        local.clear_derived();
        let topology = self.config.topology();
        if local.role().is_mc() {
            let group = topology.mc_group_of(&local.record)?;
            debug!("MC group of {} has {} members", local.psn(), group.len());
        }
        let tx = topology.tx_nodes()?;
        let rx = topology.rx_nodes()?;
        debug!(
            "{} ({}) sends to {} peers, receives from {}",
            local.psn(),
            local.role(),
            tx.len(),
            rx.len()
        );

        self.config.flush(self.pack_on_flush)?;
        Ok(true)
    }

    pub fn prepare_to_bootstrap(
        &self,
        dir: &str,
        channel_id: carma_protocol::ChannelId,
        link_address: carma_protocol::LinkAddress,
    ) -> Result<()> {
        self.config
            .prepare_to_bootstrap(dir, channel_id, link_address)
            .map(|_| ())
    }

    pub fn shutdown(&self) -> Result<()> {
        self.config.flush(self.pack_on_flush)?;
        info!("Node {} shut down", self.psn());
        Ok(())
    }
}

fn seal_frame(
    sender: &Psn,
    keys: &KeyPair,
    dest: &PeerRecord,
    plaintext: &[u8],
    params: &WireParams,
) -> Result<Vec<u8>> {
    let envelope = auth_encrypt(plaintext, keys, &dest.public_key)?;
    let mut payload = Vec::with_capacity(bytes_size(sender.as_bytes().len()) + envelope.len());
    put_bytes(&mut payload, sender.as_bytes());
    payload.extend_from_slice(&envelope);
    Ok(PacketPacket::new(dest.psn.clone(), payload).to_bytes(params)?)
}
