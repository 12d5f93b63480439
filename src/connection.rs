//! Per-connection state and the server-side registry of live connections.
//!
//! All state lives in RAM. A connection owns a [`ConnectionHandle`]; dropping
//! the handle removes the entry, so the registry never outgrows the set of
//! open connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::crypto::{PublicKey, RecordCipher};
use crate::error::{Error, Result};
use crate::handshake::{HandshakePhase, Negotiated};

/// Unique connection identifier.
pub type ConnectionId = u64;

/// Negotiated state of one connection.
///
/// Created empty, populated exactly once by a successful handshake, immutable
/// afterwards.
pub struct ConnectionState {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    created_at: Instant,
    phase: Mutex<HandshakePhase>,
    negotiated: Mutex<Option<Negotiated>>,
}

impl ConnectionState {
    fn new(id: ConnectionId, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer_addr,
            created_at: Instant::now(),
            phase: Mutex::new(HandshakePhase::Idle),
            negotiated: Mutex::new(None),
        }
    }

    /// Get connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, if the underlying stream has one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Current handshake phase.
    pub fn phase(&self) -> HandshakePhase {
        *self.phase.lock()
    }

    /// Record handshake progress.
    pub fn set_phase(&self, phase: HandshakePhase) {
        *self.phase.lock() = phase;
    }

    /// Store the handshake result.
    ///
    /// Fails if the state was already populated.
    pub fn populate(&self, negotiated: Negotiated) -> Result<()> {
        let mut slot = self.negotiated.lock();
        if slot.is_some() {
            return Err(Error::handshake(format!(
                "connection {} already has negotiated keys",
                self.id
            )));
        }
        *slot = Some(negotiated);
        drop(slot);

        self.set_phase(HandshakePhase::Derived);
        Ok(())
    }

    /// The peer's public key once negotiated.
    pub fn peer_public_key(&self) -> Option<PublicKey> {
        self.negotiated
            .lock()
            .as_ref()
            .map(|n| n.peer_public_key.clone())
    }

    /// The connection's record cipher once negotiated.
    pub fn cipher(&self) -> Option<Arc<RecordCipher>> {
        self.negotiated.lock().as_ref().map(|n| Arc::clone(&n.cipher))
    }
}

/// Concurrency-safe registry of live connections.
///
/// Shared through `Arc` by every accept path.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionState>>>,
    next_id: AtomicU64,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a registry holding at most `max_connections` live entries.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_connections,
        }
    }

    /// Register a new, empty connection state.
    ///
    /// The returned handle removes the entry when dropped.
    pub fn register(self: &Arc<Self>, peer_addr: Option<SocketAddr>) -> Result<ConnectionHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(ConnectionState::new(id, peer_addr));

        {
            let mut connections = self.connections.write();
            if connections.len() >= self.max_connections {
                return Err(Error::RegistryFull(connections.len()));
            }
            connections.insert(id, Arc::clone(&state));
        }

        Ok(ConnectionHandle {
            registry: Arc::clone(self),
            state,
        })
    }

    /// Check whether a connection is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.connections.write().remove(&id).is_some()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Configured capacity.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Scoped ownership of one registry entry.
pub struct ConnectionHandle {
    registry: Arc<ConnectionRegistry>,
    state: Arc<ConnectionState>,
}

impl ConnectionHandle {
    /// Get connection ID.
    pub fn id(&self) -> ConnectionId {
        self.state.id
    }

    /// The registered state.
    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.registry.remove(self.state.id) {
            tracing::trace!(
                "Released connection {} from {:?} in phase {:?} after {:?}",
                self.state.id,
                self.state.peer_addr(),
                self.state.phase(),
                self.state.created_at.elapsed()
            );
        }
    }
}
