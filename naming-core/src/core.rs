use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;

use naming_lock_manager::LockManager;
use naming_path::{Path, PathComponent};
use naming_replication::{ReplicationController, StorageRegistry};
use naming_tree::{CommandStub, DirectoryNode, DirectoryTree, LockMode, Lookup, Replica, StorageStub, StubError};

use crate::api::{NamingServiceApi, RegistrationApi};
use crate::config::NamingConfig;
use crate::error::NamingError;

/// The process-wide state backing the naming service: the directory
/// tree, the hierarchical lock manager, the storage-server registry, and
/// the background replication pool.
///
/// Its lifecycle is bounded by the service: construct it before the RPC
/// endpoints start, keep it alive for as long as they run.
pub struct NamingCore {
    tree: Arc<DirectoryTree>,
    lock_manager: Arc<LockManager>,
    registry: Arc<StorageRegistry>,
    #[allow(dead_code)] // kept alive for the background workers it owns
    replication: ReplicationController,
}

impl NamingCore {
    pub fn new(config: NamingConfig) -> Self {
        let tree = Arc::new(DirectoryTree::new());
        let registry = Arc::new(StorageRegistry::new());
        let (growth_tx, growth_rx) = mpsc::channel(config.replication_channel_capacity);
        let lock_manager = Arc::new(LockManager::new(config.replica_threshold, Some(growth_tx)));
        let replication = ReplicationController::spawn(
            tree.clone(),
            registry.clone(),
            growth_rx,
            config.replication_workers,
        );

        Self {
            tree,
            lock_manager,
            registry,
            replication,
        }
    }

    fn resolve(&self, path: &Path) -> Result<Arc<DirectoryNode>, NamingError> {
        match self.tree.lookup(path) {
            Lookup::Found(node) => Ok(node),
            Lookup::BlockedByFile(_) | Lookup::NotFound => {
                Err(NamingError::PathNotFound(path.clone()))
            }
        }
    }

    /// Candidates for a new file's sole initial replica: the storage
    /// servers already serving the parent directory's existing children,
    /// if any (data locality), else the full registered set.
    fn candidates_for_new_file(parent: &Arc<DirectoryNode>, registry: &StorageRegistry) -> Vec<Replica> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (_, child) in parent.children() {
            if child.is_directory() {
                continue;
            }
            for replica in child.live_replicas() {
                if seen.insert(replica.id()) {
                    candidates.push(replica);
                }
            }
        }
        if candidates.is_empty() {
            candidates = registry.all();
        }
        candidates
    }

    fn pick_random(candidates: &[Replica]) -> Option<Replica> {
        if candidates.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..candidates.len());
        Some(candidates[idx].clone())
    }

    async fn create_node(&self, path: &Path, as_directory: bool) -> Result<bool, NamingError> {
        if path.is_root() {
            return Ok(false);
        }
        if !as_directory && self.registry.is_empty() {
            return Err(NamingError::InvalidState(
                "no storage servers are registered".into(),
            ));
        }

        let parent_path = path.parent()?;
        let name = path.last()?.clone();
        let target_path = path.clone();
        let registry = self.registry.clone();
        let parent_path_for_error = parent_path.clone();

        self.lock_manager
            .with_lock(&self.tree, &parent_path, LockMode::Exclusive, move |parent_node| async move {
                if !parent_node.is_directory() {
                    return Err(NamingError::PathNotFound(parent_path_for_error));
                }
                if parent_node.child(name.as_str()).is_some() {
                    return Ok(false);
                }

                if as_directory {
                    let child = DirectoryNode::new_directory(name.clone(), &parent_node);
                    parent_node.insert_child(name.as_str().to_string(), child);
                    tracing::info!(path = %target_path, "created directory");
                    return Ok(true);
                }

                Self::create_file_under(&parent_node, &name, &target_path, &registry).await
            })
            .await
    }

    async fn create_file_under(
        parent_node: &Arc<DirectoryNode>,
        name: &PathComponent,
        target_path: &Path,
        registry: &StorageRegistry,
    ) -> Result<bool, NamingError> {
        let candidates = Self::candidates_for_new_file(parent_node, registry);
        let Some(chosen) = Self::pick_random(&candidates) else {
            return Err(NamingError::InvalidState(
                "no storage servers are registered".into(),
            ));
        };

        match chosen.command.create(target_path).await {
            Ok(true) => {
                let child = DirectoryNode::new_file(name.clone(), parent_node, chosen.clone());
                parent_node.insert_child(name.as_str().to_string(), child);
                tracing::info!(path = %target_path, storage = %chosen.id(), "created file");
                Ok(true)
            }
            Ok(false) => {
                tracing::warn!(path = %target_path, storage = %chosen.id(), "storage server declined file creation");
                Err(NamingError::Remote(StubError(format!(
                    "{} declined to create {}",
                    chosen.id(),
                    target_path
                ))))
            }
            Err(err) => {
                tracing::warn!(path = %target_path, storage = %chosen.id(), %err, "file creation rpc failed");
                Err(NamingError::Remote(err))
            }
        }
    }
}

#[cfg(feature = "fixtures")]
impl NamingCore {
    /// Test-only window into replica bookkeeping that the client-facing
    /// API deliberately doesn't expose.
    pub fn debug_live_replica_count(&self, path: &Path) -> Option<usize> {
        match self.tree.lookup(path) {
            Lookup::Found(node) => Some(node.live_replica_count()),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl NamingServiceApi for NamingCore {
    async fn lock(&self, path: &Path, exclusive: bool) -> Result<(), NamingError> {
        let mode = if exclusive { LockMode::Exclusive } else { LockMode::Shared };
        self.lock_manager.acquire(&self.tree, path, mode).await?;
        Ok(())
    }

    async fn unlock(&self, path: &Path, exclusive: bool) -> Result<(), NamingError> {
        let mode = if exclusive { LockMode::Exclusive } else { LockMode::Shared };
        self.lock_manager.release(&self.tree, path, mode).await?;
        Ok(())
    }

    async fn is_directory(&self, path: &Path) -> Result<bool, NamingError> {
        Ok(self.resolve(path)?.is_directory())
    }

    async fn list(&self, path: &Path) -> Result<Vec<PathComponent>, NamingError> {
        let node = self.resolve(path)?;
        if !node.is_directory() {
            return Err(NamingError::InvalidArgument(format!(
                "{path} is a file, not a directory"
            )));
        }
        Ok(node
            .children()
            .into_iter()
            .map(|(name, _)| PathComponent::try_from(name).expect("child names are valid components"))
            .collect())
    }

    async fn create_file(&self, path: &Path) -> Result<bool, NamingError> {
        self.create_node(path, false).await
    }

    async fn create_directory(&self, path: &Path) -> Result<bool, NamingError> {
        self.create_node(path, true).await
    }

    async fn delete(&self, path: &Path) -> Result<bool, NamingError> {
        if path.is_root() {
            return Ok(false);
        }
        let parent_path = path.parent()?;
        let target_path = path.clone();
        let tree = self.tree.clone();

        self.lock_manager
            .with_lock(&self.tree, &parent_path, LockMode::Exclusive, move |_parent_node| async move {
                let removed = tree.remove(&target_path).await;
                if removed {
                    tracing::info!(path = %target_path, "deleted subtree");
                }
                Ok(removed)
            })
            .await
    }

    async fn get_storage(&self, path: &Path) -> Result<Arc<dyn StorageStub>, NamingError> {
        let node = self.resolve(path)?;
        if node.is_directory() {
            return Err(NamingError::InvalidArgument(format!(
                "{path} is a directory, not a file"
            )));
        }
        let live = node.live_replicas();
        Self::pick_random(&live)
            .map(|replica| replica.storage)
            .ok_or_else(|| NamingError::InvalidState(format!("{path} has no live replicas")))
    }
}

#[async_trait::async_trait]
impl RegistrationApi for NamingCore {
    async fn register(
        &self,
        storage: Arc<dyn StorageStub>,
        command: Arc<dyn CommandStub>,
        files: Vec<Path>,
    ) -> Result<Vec<Path>, NamingError> {
        let id = storage.id();
        if self.registry.get(&id).is_some() {
            return Err(NamingError::AlreadyRegistered(id));
        }

        // Effectively serialised with other tree mutations by taking the
        // root's own exclusive lock for the duration of the merge
        //.
        let root_path = Path::root();
        let tree = self.tree.clone();
        let storage_for_merge = storage.clone();
        let command_for_merge = command.clone();
        let duplicates = self
            .lock_manager
            .with_lock(&self.tree, &root_path, LockMode::Exclusive, move |_root| async move {
                let dup = tree.merge_register(&files, storage_for_merge, command_for_merge);
                Ok::<_, NamingError>(dup)
            })
            .await?;

        self.registry.register(Replica::new(storage, command));
        tracing::info!(storage = %id, registered = %duplicates.len(), "storage server registered");
        Ok(duplicates)
    }
}
