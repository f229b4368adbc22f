//! Outbound side of the host boundary
//!
//! The node hands sealed, addressed packages to a [`Transport`]. Whether a
//! package made it is reported later through
//! `CommsPlugin::package_status_changed` with the handle returned here.

use carma_protocol::Psn;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Identifies one outbound package until its status is reported
pub type SendHandle = u64;

pub trait Transport: Send + Sync {
    fn send(&self, dest: &Psn, payload: Vec<u8>) -> Result<SendHandle>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPackage {
    pub handle: SendHandle,
    pub dest: Psn,
    pub payload: Vec<u8>,
}

/// Transport that queues packages for the host to drain
#[derive(Debug, Default)]
pub struct QueueTransport {
    next_handle: AtomicU64,
    queue: Mutex<VecDeque<OutboundPackage>>,
}

impl QueueTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every queued package, oldest first
    pub fn drain(&self) -> Vec<OutboundPackage> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Transport for QueueTransport {
    fn send(&self, dest: &Psn, payload: Vec<u8>) -> Result<SendHandle> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        self.queue.lock().push_back(OutboundPackage {
            handle,
            dest: dest.clone(),
            payload,
        });
        Ok(handle)
    }
}
