//! Port allocation for new projects.
//!
//! Ports are assigned once at creation and stored on the project record, so
//! occupancy is a store question: the first port at or above the base with
//! no record is free. Deleting a record is all it takes to make its port
//! allocatable again.

use anyhow::Result;

use super::db::HostDb;
use crate::errors::{HostError, HostResult};

pub const DEFAULT_BASE_PORT: u16 = 3000;
pub const DEFAULT_MAX_SCAN: u32 = 1000;

/// Anything that can answer "is this port already assigned to a project".
pub trait PortLedger {
    fn port_taken(&self, port: u16) -> Result<bool>;
}

impl PortLedger for HostDb {
    fn port_taken(&self, port: u16) -> Result<bool> {
        self.port_in_use(port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocator {
    base: u16,
    max_scan: u32,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT, DEFAULT_MAX_SCAN)
    }
}

impl PortAllocator {
    pub fn new(base: u16, max_scan: u32) -> Self {
        Self {
            base,
            max_scan: max_scan.max(1),
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// Return the first port with no existing record.
    ///
    /// Callers must hold the store lock across this call and the insert that
    /// claims the port; `LifecycleManager::create_project` does both inside a
    /// single `DbHandle::call`.
    pub fn allocate(&self, ledger: &impl PortLedger) -> HostResult<u16> {
        let mut scanned = 0u32;
        let mut port = self.base;
        while scanned < self.max_scan {
            scanned += 1;
            if !ledger.port_taken(port)? {
                return Ok(port);
            }
            match port.checked_add(1) {
                Some(next) => port = next,
                None => break,
            }
        }
        Err(HostError::PortExhausted {
            base: self.base,
            scanned,
        })
    }
}
