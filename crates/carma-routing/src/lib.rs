//! CARMA Routing
//!
//! Derives, from the phonebook and the local configuration, which peers a
//! node may exchange packets with:
//! - MC group membership and leadership
//! - Bucket assignment of clients and mailbox servers
//! - Layer sets between mailbox servers, MC leaders and routing servers
//! - The per-role `tx_nodes` and `rx_nodes` sets

pub mod error;
pub mod topology;

pub use error::{Result, RoutingError};
pub use topology::Topology;
