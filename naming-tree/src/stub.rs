//! The storage-server contract consumed by the naming core.
//!
//! Storage servers are external collaborators: they hold file bytes and
//! expose a client-facing [`StorageStub`] (`size`/`read`/`write`) and a
//! privileged [`CommandStub`] (`create`/`delete`/`copy`). Both are modeled
//! as object-safe `async_trait`s, the same way `tvix_castore::DirectoryService`
//! and `BlobService` are, so storage servers can be swapped for in-memory
//! fakes in tests without a real RPC transport.

use std::fmt;
use std::sync::Arc;

use naming_path::Path;

/// A stable identity for a registered storage server, independent of which
/// `Arc<dyn StorageStub>`/`Arc<dyn CommandStub>` pointer currently represents
/// it. Used to de-duplicate replicas by identity and to find
/// storage servers that do not already hold a given path.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageId(pub String);

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("storage server rpc failed: {0}")]
pub struct StubError(pub String);

/// Client-facing capability handle for one storage server.
#[async_trait::async_trait]
pub trait StorageStub: Send + Sync + fmt::Debug {
    fn id(&self) -> StorageId;

    async fn size(&self, path: &Path) -> Result<u64, StubError>;
    async fn read(&self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, StubError>;
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> Result<(), StubError>;
}

/// Privileged capability handle for one storage server, used only by the
/// naming core itself, never handed to clients.
#[async_trait::async_trait]
pub trait CommandStub: Send + Sync + fmt::Debug {
    fn id(&self) -> StorageId;

    async fn create(&self, path: &Path) -> Result<bool, StubError>;
    async fn delete(&self, path: &Path) -> Result<bool, StubError>;
    async fn copy(&self, path: &Path, source: Arc<dyn StorageStub>) -> Result<bool, StubError>;
}

/// A registered storage server's pair of capability handles, as stored per
/// replica on a [`crate::DirectoryNode`].
#[derive(Clone)]
pub struct Replica {
    pub storage: Arc<dyn StorageStub>,
    pub command: Arc<dyn CommandStub>,
}

impl Replica {
    pub fn new(storage: Arc<dyn StorageStub>, command: Arc<dyn CommandStub>) -> Self {
        Self { storage, command }
    }

    pub fn id(&self) -> StorageId {
        self.storage.id()
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica").field("id", &self.id()).finish()
    }
}
