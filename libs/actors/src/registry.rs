//! Actor Registry
//!
//! Name and id based discovery of live actors.

use crate::cell::CellHandle;
use crate::{ActorError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique actor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId {
    id: Uuid,
}

impl ActorId {
    /// Create new actor ID
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Create from UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self { id }
    }

    /// Get UUID
    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.id.simple())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque address of an actor.
///
/// Carries no state and no message type; delivery goes through the
/// [`ActorSystem`](crate::ActorSystem) that spawned it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    id: ActorId,
    name: String,
}

impl ActorRef {
    pub(crate) fn new(id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, ActorRef>,
    cells: HashMap<ActorId, Arc<dyn CellHandle>>,
}

/// Registry of live actors owned by one system
#[derive(Default)]
pub struct ActorRegistry {
    inner: RwLock<RegistryInner>,
}

impl fmt::Debug for ActorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ActorRegistry")
            .field("actors", &inner.by_name.len())
            .finish()
    }
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor under its name.
    ///
    /// Name check and insertion happen under one write lock.
    pub(crate) fn register(&self, actor_ref: ActorRef, cell: Arc<dyn CellHandle>) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(actor_ref.name()) {
            return Err(ActorError::NameTaken {
                name: actor_ref.name().to_string(),
            });
        }

        tracing::debug!(actor_id = %actor_ref.id(), actor_name = %actor_ref.name(), "Registering actor");
        inner.cells.insert(actor_ref.id(), cell);
        inner.by_name.insert(actor_ref.name().to_string(), actor_ref);
        Ok(())
    }

    /// Remove an actor, returning its cell if it was registered
    pub(crate) fn unregister(&self, actor_ref: &ActorRef) -> Option<Arc<dyn CellHandle>> {
        let mut inner = self.inner.write();
        let cell = inner.cells.remove(&actor_ref.id())?;

        // Only drop the name entry if it still points at this actor.
        if inner
            .by_name
            .get(actor_ref.name())
            .is_some_and(|r| r.id() == actor_ref.id())
        {
            inner.by_name.remove(actor_ref.name());
        }
        tracing::debug!(actor_id = %actor_ref.id(), actor_name = %actor_ref.name(), "Unregistered actor");
        Some(cell)
    }

    /// Drain every registered cell
    pub(crate) fn drain(&self) -> Vec<(ActorRef, Arc<dyn CellHandle>)> {
        let mut inner = self.inner.write();
        let refs: Vec<ActorRef> = inner.by_name.drain().map(|(_, r)| r).collect();
        refs.into_iter()
            .filter_map(|r| inner.cells.remove(&r.id()).map(|cell| (r, cell)))
            .collect()
    }

    pub(crate) fn cell(&self, id: &ActorId) -> Option<Arc<dyn CellHandle>> {
        self.inner.read().cells.get(id).cloned()
    }

    /// Find a live actor by name
    pub fn lookup(&self, name: &str) -> Option<ActorRef> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// Check if actor exists
    pub fn contains(&self, actor_ref: &ActorRef) -> bool {
        self.inner.read().cells.contains_key(&actor_ref.id())
    }

    /// List all live actors, sorted by name
    pub fn list(&self) -> Vec<ActorRef> {
        let mut refs: Vec<ActorRef> = self.inner.read().by_name.values().cloned().collect();
        refs.sort_by(|a, b| a.name().cmp(b.name()));
        refs
    }

    pub fn len(&self) -> usize {
        self.inner.read().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
