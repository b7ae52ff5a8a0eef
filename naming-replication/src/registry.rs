use std::collections::HashMap;

use parking_lot::RwLock;

use naming_tree::{Replica, StorageId};

/// The set of storage servers currently registered with the naming
/// service, independent of which files they happen to hold. The replication controller consults this to find a
/// candidate that does not already hold a given file.
#[derive(Default)]
pub struct StorageRegistry {
    servers: RwLock<HashMap<StorageId, Replica>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-registering the same [`StorageId`] replaces its
    /// stubs, which matters if a storage server restarts with a new
    /// transport handle but keeps its identity.
    pub fn register(&self, replica: Replica) {
        self.servers.write().insert(replica.id(), replica);
    }

    pub fn get(&self, id: &StorageId) -> Option<Replica> {
        self.servers.read().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Replica> {
        self.servers.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}
