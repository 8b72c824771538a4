use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::session::Session;
use crate::errors::RelayError;
use crate::shared_types::SessionId;

// -----------------------------------------------------------------------------
// ----- SessionRegistry -------------------------------------------------------

/// Maps session ids to live sessions for every endpoint of a relay.
///
/// Lookups, inserts and removes may race freely. An insert must be visible to
/// every later lookup through any endpoint sharing the registry.
pub trait SessionRegistry: Send + Sync + 'static {
    fn insert(&self, session: Arc<Session>);

    fn lookup(&self, id: &SessionId) -> Result<Arc<Session>, RelayError>;

    /// Idempotent; returns the session only for the call that removed it.
    fn remove(&self, id: &SessionId) -> Option<Arc<Session>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -----------------------------------------------------------------------------
// ----- InMemoryRegistry ------------------------------------------------------

/// Single-process registry. All listeners of one relay process share it.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    inner: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRegistry for InMemoryRegistry {
    fn insert(&self, session: Arc<Session>) {
        self.inner.write().insert(session.id(), session);
    }

    fn lookup(&self, id: &SessionId) -> Result<Arc<Session>, RelayError> {
        self.inner
            .read()
            .get(id)
            .cloned()
            .ok_or(RelayError::SessionNotFound(*id))
    }

    fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner.write().remove(id)
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
