//! Host plugin boundary
//!
//! A host runtime drives a comms plugin through [`CommsPlugin`] and is told
//! about status changes through [`Host`]. [`CarmaPlugin`] is the adapter
//! between that boundary and a [`Node`]; it is the only place where errors
//! are turned into host-visible status.

use carma_protocol::{ChannelId, LinkAddress};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::node::{Inbound, Node, NodeState};
use crate::transport::SendHandle;

pub type LinkId = String;
pub type ConnectionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    NotReady,
    Ready,
}

/// Outcome of one host callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginResponse {
    Ok,
    /// The call failed; the plugin keeps running
    Error,
    /// The plugin cannot continue with its current configuration
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Available,
    Unavailable,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Created,
    Loaded,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Sent,
    Received,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStatus {
    Prepared,
    Failed,
}

/// Callbacks into the host runtime
pub trait Host: Send + Sync {
    fn plugin_status_changed(&self, status: PluginStatus);

    /// A packet accepted from a peer in the rx set
    fn package_delivered(&self, inbound: Inbound);

    fn bootstrap_status_changed(&self, _dir: &str, _status: BootstrapStatus) {}
}

/// Lifecycle callbacks a host delivers to a comms plugin
pub trait CommsPlugin: Send + Sync {
    fn activate_channel(&self, channel: &ChannelId) -> PluginResponse;

    fn channel_status_changed(&self, channel: &ChannelId, status: ChannelStatus) -> PluginResponse;

    fn link_status_changed(&self, link: &LinkId, status: LinkStatus) -> PluginResponse;

    fn connection_status_changed(
        &self,
        connection: &ConnectionId,
        status: ConnectionStatus,
    ) -> PluginResponse;

    fn package_received(&self, bytes: &[u8]) -> PluginResponse;

    fn package_status_changed(&self, handle: SendHandle, status: PackageStatus) -> PluginResponse;

    /// A bootstrap package carrying the phonebook record of a joining node
    fn bootstrap_package_received(&self, record: &[u8]) -> PluginResponse;

    fn prepare_to_bootstrap(
        &self,
        dir: &str,
        channel: ChannelId,
        link_address: LinkAddress,
    ) -> PluginResponse;

    fn shutdown(&self) -> PluginResponse;
}

pub struct CarmaPlugin {
    node: Arc<Node>,
    host: Arc<dyn Host>,
    channels: Mutex<BTreeMap<ChannelId, ChannelStatus>>,
    links: Mutex<BTreeMap<LinkId, LinkStatus>>,
    connections: Mutex<BTreeMap<ConnectionId, ConnectionStatus>>,
    reported: Mutex<Option<PluginStatus>>,
}

impl CarmaPlugin {
    pub fn new(node: Arc<Node>, host: Arc<dyn Host>) -> Self {
        Self {
            node,
            host,
            channels: Mutex::new(BTreeMap::new()),
            links: Mutex::new(BTreeMap::new()),
            connections: Mutex::new(BTreeMap::new()),
            reported: Mutex::new(None),
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn channel_status(&self, channel: &ChannelId) -> Option<ChannelStatus> {
        self.channels.lock().get(channel).copied()
    }

    pub fn link_status(&self, link: &LinkId) -> Option<LinkStatus> {
        self.links.lock().get(link).copied()
    }

    pub fn open_connections(&self) -> usize {
        self.connections.lock().len()
    }

    /// Tell the host about the node status if it changed since the last
    /// report
    pub fn report_status(&self) {
        let status = self.node.plugin_status();
        let mut reported = self.reported.lock();
        if *reported != Some(status) {
            *reported = Some(status);
            drop(reported);
            info!("Plugin status: {:?}", status);
            self.host.plugin_status_changed(status);
        }
    }

    fn respond(&self, what: &str, result: Result<()>) -> PluginResponse {
        let response = match result {
            Ok(()) => PluginResponse::Ok,
            Err(e) if self.node.state() == NodeState::Broken => {
                error!("{} failed: {}", what, e);
                PluginResponse::Fatal
            }
            Err(e) => {
                warn!("{} failed: {}", what, e);
                PluginResponse::Error
            }
        };
        self.report_status();
        response
    }
}

impl CommsPlugin for CarmaPlugin {
    fn activate_channel(&self, channel: &ChannelId) -> PluginResponse {
        self.channels
            .lock()
            .entry(channel.clone())
            .or_insert(ChannelStatus::Unavailable);
        debug!("Activating channel {}", channel);
        self.respond("activate_channel", Ok(()))
    }

    fn channel_status_changed(&self, channel: &ChannelId, status: ChannelStatus) -> PluginResponse {
        self.channels.lock().insert(channel.clone(), status);
        debug!("Channel {} is {:?}", channel, status);
        let result = if status == ChannelStatus::Available && self.node.state() == NodeState::NotReady {
            self.node.maintain()
        } else {
            Ok(())
        };
        self.respond("channel_status_changed", result)
    }

    fn link_status_changed(&self, link: &LinkId, status: LinkStatus) -> PluginResponse {
        let mut links = self.links.lock();
        match status {
            LinkStatus::Destroyed => {
                links.remove(link);
            }
            status => {
                links.insert(link.clone(), status);
            }
        }
        drop(links);
        debug!("Link {} is {:?}", link, status);
        self.respond("link_status_changed", Ok(()))
    }

    fn connection_status_changed(
        &self,
        connection: &ConnectionId,
        status: ConnectionStatus,
    ) -> PluginResponse {
        let mut connections = self.connections.lock();
        match status {
            ConnectionStatus::Open => {
                connections.insert(connection.clone(), status);
            }
            ConnectionStatus::Closed => {
                connections.remove(connection);
            }
        }
        drop(connections);
        self.respond("connection_status_changed", Ok(()))
    }

    fn package_received(&self, bytes: &[u8]) -> PluginResponse {
        let result = self.node.receive(bytes).map(|inbound| {
            if let Some(inbound) = inbound {
                self.host.package_delivered(inbound);
            }
        });
        self.respond("package_received", result)
    }

    fn package_status_changed(&self, handle: SendHandle, status: PackageStatus) -> PluginResponse {
        self.node.package_status_changed(handle, status);
        self.respond("package_status_changed", Ok(()))
    }

    fn bootstrap_package_received(&self, record: &[u8]) -> PluginResponse {
        let result = self.node.add_peer(record).map(|_| ());
        self.respond("bootstrap_package_received", result)
    }

    fn prepare_to_bootstrap(
        &self,
        dir: &str,
        channel: ChannelId,
        link_address: LinkAddress,
    ) -> PluginResponse {
        let result = self.node.prepare_to_bootstrap(dir, channel, link_address);
        let status = if result.is_ok() {
            BootstrapStatus::Prepared
        } else {
            BootstrapStatus::Failed
        };
        self.host.bootstrap_status_changed(dir, status);
        self.respond("prepare_to_bootstrap", result)
    }

    fn shutdown(&self) -> PluginResponse {
        let result = self.node.shutdown();
        self.respond("shutdown", result)
    }
}
