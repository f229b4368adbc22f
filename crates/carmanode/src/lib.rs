//! CARMA node
//!
//! Loads a node's CARMA configuration, derives where it may send and
//! receive, seals and opens packets at the host boundary and keeps the
//! configuration maintained and flushed.

pub mod config;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod node;
pub mod plugin;
pub mod settings;
pub mod transport;

pub use config::{BootstrapRecord, Config};
pub use error::{NodeError, Result};
pub use maintenance::Maintenance;
pub use node::{Inbound, Node, NodeState};
pub use plugin::{
    BootstrapStatus, CarmaPlugin, ChannelStatus, CommsPlugin, ConnectionId, ConnectionStatus,
    Host, LinkId, LinkStatus, PackageStatus, PluginResponse, PluginStatus,
};
pub use settings::NodeSettings;
pub use transport::{OutboundPackage, QueueTransport, SendHandle, Transport};
