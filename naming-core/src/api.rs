use std::sync::Arc;

use naming_path::{Path, PathComponent};
use naming_tree::{CommandStub, StorageStub};

use crate::error::NamingError;

/// The client-facing role interface.
///
/// A wire transport binding (tonic, a bespoke framing protocol) is an
/// integrator's job and out of scope here; this is the in-process
/// contract such a binding would sit on top of.
#[async_trait::async_trait]
pub trait NamingServiceApi {
    async fn lock(&self, path: &Path, exclusive: bool) -> Result<(), NamingError>;
    async fn unlock(&self, path: &Path, exclusive: bool) -> Result<(), NamingError>;
    async fn is_directory(&self, path: &Path) -> Result<bool, NamingError>;
    async fn list(&self, path: &Path) -> Result<Vec<PathComponent>, NamingError>;
    async fn create_file(&self, path: &Path) -> Result<bool, NamingError>;
    async fn create_directory(&self, path: &Path) -> Result<bool, NamingError>;
    async fn delete(&self, path: &Path) -> Result<bool, NamingError>;
    async fn get_storage(&self, path: &Path) -> Result<Arc<dyn StorageStub>, NamingError>;
}

/// The storage-server-facing role interface.
#[async_trait::async_trait]
pub trait RegistrationApi {
    async fn register(
        &self,
        storage: Arc<dyn StorageStub>,
        command: Arc<dyn CommandStub>,
        files: Vec<Path>,
    ) -> Result<Vec<Path>, NamingError>;
}
