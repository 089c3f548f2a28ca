//! In-memory table of running project servers.
//!
//! The registry owns every [`ServerHandle`]; the lifecycle manager is the
//! only writer. Nothing here is persisted, so after a restart the table is
//! empty until the reconciler rebuilds it from the store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use super::static_server::ServerHandle;
use crate::errors::{HostError, HostResult};

#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: Mutex<HashMap<i64, ServerHandle>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, ServerHandle>> {
        // Critical sections are single map operations; poison is safe to ignore.
        self.servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take ownership of a running server.
    ///
    /// On `AlreadyRunning` the handle is handed back so the caller can stop
    /// it instead of leaking a bound listener.
    pub fn register(&self, id: i64, handle: ServerHandle) -> Result<(), (HostError, ServerHandle)> {
        let mut servers = self.lock();
        if servers.contains_key(&id) {
            return Err((HostError::AlreadyRunning { id }, handle));
        }
        servers.insert(id, handle);
        Ok(())
    }

    /// Remove and return the handle for `id`. The caller stops it.
    pub fn unregister(&self, id: i64) -> HostResult<ServerHandle> {
        self.lock()
            .remove(&id)
            .ok_or(HostError::NotRunning { id })
    }

    /// Address of the running server for `id`, if any.
    pub fn get(&self, id: i64) -> Option<SocketAddr> {
        self.lock().get(&id).map(ServerHandle::addr)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn running_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every handle, e.g. for process shutdown.
    pub fn drain(&self) -> Vec<(i64, ServerHandle)> {
        self.lock().drain().collect()
    }
}
