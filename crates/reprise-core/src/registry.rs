//! Owner registry view used for provenance checks.
//!
//! The surrounding engine knows which owners (libraries) are live once its
//! own registration has completed. The dispatcher only ever asks whether an
//! owner id is known; it never mutates the registry.
//!
//! [`OwnerTable`] is the engine-side table. It keeps owner → connections and
//! connection → owner maps in step so either direction is an O(1) lookup.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::event::{ConnectionId, OwnerId};

/// Read-only lookup of live owners.
pub trait OwnerRegistry: Send + Sync {
    /// Returns true if `owner_id` is registered.
    fn contains(&self, owner_id: OwnerId) -> bool;

    /// All registered owner ids, ascending.
    fn owner_ids(&self) -> Vec<OwnerId>;
}

impl<V, S> OwnerRegistry for HashMap<OwnerId, V, S>
where
    V: Send + Sync,
    S: std::hash::BuildHasher + Send + Sync,
{
    fn contains(&self, owner_id: OwnerId) -> bool {
        self.contains_key(&owner_id)
    }

    fn owner_ids(&self) -> Vec<OwnerId> {
        let mut ids: Vec<_> = self.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Lets the engine keep registering owners while the dispatcher reads.
impl<R: OwnerRegistry> OwnerRegistry for RwLock<R> {
    fn contains(&self, owner_id: OwnerId) -> bool {
        self.read().unwrap_or_else(PoisonError::into_inner).contains(owner_id)
    }

    fn owner_ids(&self) -> Vec<OwnerId> {
        self.read().unwrap_or_else(PoisonError::into_inner).owner_ids()
    }
}

/// Registration state of a live owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveOwnerInfo {
    /// Owner id
    pub owner_id: OwnerId,
    /// Human-readable owner name
    pub name: String,
    /// Transport session the owner is attached through
    pub session_id: i32,
    /// Connections currently held by the owner
    pub connections: HashSet<ConnectionId>,
}

impl LiveOwnerInfo {
    /// Create registration state with no connections.
    pub fn new(owner_id: OwnerId, name: impl Into<String>, session_id: i32) -> Self {
        Self { owner_id, name: name.into(), session_id, connections: HashSet::new() }
    }
}

/// Table of live owners and the connections they hold.
#[derive(Debug, Default)]
pub struct OwnerTable {
    /// Owner id → registration
    owners: BTreeMap<OwnerId, LiveOwnerInfo>,
    /// Connection id → owner id (reverse index)
    connection_owners: HashMap<ConnectionId, OwnerId>,
}

impl OwnerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an owner.
    ///
    /// Returns `false` if the owner id is already registered.
    pub fn register(&mut self, info: LiveOwnerInfo) -> bool {
        if self.owners.contains_key(&info.owner_id) {
            return false;
        }

        for connection_id in &info.connections {
            self.connection_owners.insert(*connection_id, info.owner_id);
        }

        self.owners.insert(info.owner_id, info);
        true
    }

    /// Unregister an owner and release all of its connections.
    pub fn unregister(&mut self, owner_id: OwnerId) -> Option<LiveOwnerInfo> {
        let info = self.owners.remove(&owner_id)?;

        for connection_id in &info.connections {
            self.connection_owners.remove(connection_id);
        }

        Some(info)
    }

    /// Registration state of an owner. `None` if not registered.
    pub fn get(&self, owner_id: OwnerId) -> Option<&LiveOwnerInfo> {
        self.owners.get(&owner_id)
    }

    /// Hand a connection to an owner, moving it from any previous owner.
    ///
    /// Returns `false` if the owner is not registered.
    pub fn assign_connection(&mut self, owner_id: OwnerId, connection_id: ConnectionId) -> bool {
        if !self.owners.contains_key(&owner_id) {
            return false;
        }

        if let Some(previous) = self.connection_owners.insert(connection_id, owner_id)
            && previous != owner_id
            && let Some(info) = self.owners.get_mut(&previous)
        {
            info.connections.remove(&connection_id);
        }

        if let Some(info) = self.owners.get_mut(&owner_id) {
            info.connections.insert(connection_id);
        }

        true
    }

    /// Release a connection from whichever owner holds it.
    ///
    /// Returns the owner that held it.
    pub fn release_connection(&mut self, connection_id: ConnectionId) -> Option<OwnerId> {
        let owner_id = self.connection_owners.remove(&connection_id)?;

        if let Some(info) = self.owners.get_mut(&owner_id) {
            info.connections.remove(&connection_id);
        }

        Some(owner_id)
    }

    /// Owner currently holding a connection.
    pub fn owner_of(&self, connection_id: ConnectionId) -> Option<OwnerId> {
        self.connection_owners.get(&connection_id).copied()
    }

    /// Number of registered owners.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if no owners are registered.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl OwnerRegistry for OwnerTable {
    fn contains(&self, owner_id: OwnerId) -> bool {
        self.owners.contains_key(&owner_id)
    }

    fn owner_ids(&self) -> Vec<OwnerId> {
        self.owners.keys().copied().collect()
    }
}
