//! The hierarchical lock protocol layered on top of [`naming_tree`]'s
//! per-node primitive.
//!
//! Acquiring `path` in mode `m` means acquiring every strict ancestor of
//! `path` in shared mode (top-down, root first) and then `path` itself in
//! `m`. Release runs in the opposite order: `path` first, then ancestors
//! bottom-up. A failure partway through acquire rolls back everything
//! already held, in reverse order, before returning the error.
//!
//! This crate never calls back into a replication controller directly — it
//! only ever sends a [`naming_path::Path`] down an optional channel. That
//! inversion is what keeps `naming-replication`, which *does* depend on
//! this crate to take its own locks, from creating a dependency cycle.

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;

use naming_path::Path;
use naming_tree::{DirectoryNode, DirectoryTree, LockMode, Lookup};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("path not found: {0}")]
    NotFound(Path),
    #[error("lock not held in the requested mode at {0}")]
    NotHeld(Path),
    #[error("lock acquisition was interrupted")]
    Interrupted,
}

/// How many read acquisitions of a file must elapse before a growth
/// request is sent for it. Every second read is aggressive enough to
/// matter in short-lived tests and conservative enough not to grow on a
/// single cold read.
pub const DEFAULT_REPLICA_THRESHOLD: u64 = 2;

pub struct LockManager {
    replica_threshold: u64,
    growth_trigger: Option<mpsc::Sender<Path>>,
}

impl LockManager {
    pub fn new(replica_threshold: u64, growth_trigger: Option<mpsc::Sender<Path>>) -> Self {
        Self {
            replica_threshold,
            growth_trigger,
        }
    }

    /// Acquires `path` in `mode`, blocking until it is granted. Exclusive
    /// acquisition on a file invalidates every replica but the first.
    pub async fn acquire(
        &self,
        tree: &DirectoryTree,
        path: &Path,
        mode: LockMode,
    ) -> Result<Arc<DirectoryNode>, LockError> {
        let cancelled = AtomicBool::new(false);
        self.acquire_cancelable(tree, path, mode, &cancelled).await
    }

    /// As [`acquire`](Self::acquire), but returns [`LockError::Interrupted`]
    /// instead of blocking forever once `cancelled` flips to `true`.
    pub async fn acquire_cancelable(
        &self,
        tree: &DirectoryTree,
        path: &Path,
        mode: LockMode,
        cancelled: &AtomicBool,
    ) -> Result<Arc<DirectoryNode>, LockError> {
        let node = Self::resolve(tree, path)?;

        let mut acquired: Vec<Arc<DirectoryNode>> = Vec::new();
        for ancestor_path in path.strict_ancestors() {
            let ancestor = match Self::resolve(tree, &ancestor_path) {
                Ok(n) => n,
                Err(err) => {
                    Self::rollback(&acquired);
                    return Err(err);
                }
            };
            if !ancestor.lock_acquire_cancelable(LockMode::Shared, cancelled) {
                Self::rollback(&acquired);
                return Err(LockError::Interrupted);
            }
            acquired.push(ancestor);
        }

        if !node.lock_acquire_cancelable(mode, cancelled) {
            Self::rollback(&acquired);
            return Err(LockError::Interrupted);
        }

        match mode {
            LockMode::Exclusive => Self::invalidate_replicas(&node, path).await,
            LockMode::Shared => self.maybe_trigger_growth(&node, path),
        }

        Ok(node)
    }

    /// Releases `path` in `mode`. Exclusive release restores every replica
    /// that was invalidated at acquire time before the locks themselves are
    /// dropped, so a reader admitted immediately afterward never observes a
    /// half-restored replica set.
    pub async fn release(
        &self,
        tree: &DirectoryTree,
        path: &Path,
        mode: LockMode,
    ) -> Result<(), LockError> {
        let node = Self::resolve(tree, path)?;
        if !node.lock_is_held(mode) {
            return Err(LockError::NotHeld(path.clone()));
        }

        if mode == LockMode::Exclusive {
            Self::restore_replicas(&node, path).await;
        }
        node.lock_release(mode);

        for ancestor_path in path.strict_ancestors().iter().rev() {
            if let Ok(ancestor) = Self::resolve(tree, ancestor_path) {
                ancestor.lock_release(LockMode::Shared);
            }
        }

        Ok(())
    }

    /// Acquires `path` in `mode`, runs `f` with the locked node, then
    /// releases unconditionally — the idiomatic stand-in for an RAII guard
    /// here, since release is async and `Drop` cannot await. Used by
    /// `naming-core`'s multi-step operations (create, delete) to guarantee
    /// the lock is dropped on every return path, including early errors
    /// from `f`.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        tree: &DirectoryTree,
        path: &Path,
        mode: LockMode,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Arc<DirectoryNode>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let node = self.acquire(tree, path, mode).await.map_err(E::from)?;
        let result = f(node).await;
        if let Err(err) = self.release(tree, path, mode).await {
            tracing::error!(%path, %err, "failed to release lock after scoped operation");
        }
        result
    }

    fn resolve(tree: &DirectoryTree, path: &Path) -> Result<Arc<DirectoryNode>, LockError> {
        match tree.lookup(path) {
            Lookup::Found(node) => Ok(node),
            Lookup::BlockedByFile(_) | Lookup::NotFound => Err(LockError::NotFound(path.clone())),
        }
    }

    fn rollback(acquired: &[Arc<DirectoryNode>]) {
        for ancestor in acquired.iter().rev() {
            ancestor.lock_release(LockMode::Shared);
        }
    }

    async fn invalidate_replicas(node: &Arc<DirectoryNode>, path: &Path) {
        if node.is_directory() {
            return;
        }
        let replicas = node.replicas();
        if replicas.len() <= 1 {
            return;
        }
        node.set_live_replica_count(1);
        for stale in &replicas[1..] {
            if let Err(err) = stale.command.delete(path).await {
                tracing::warn!(%path, storage = %stale.id(), %err, "failed to invalidate stale replica");
            }
        }
    }

    async fn restore_replicas(node: &Arc<DirectoryNode>, path: &Path) {
        if node.is_directory() {
            return;
        }
        let replicas = node.replicas();
        if replicas.len() <= 1 {
            return;
        }
        let primary = replicas[0].clone();
        let mut restored = vec![primary.clone()];
        for stale in &replicas[1..] {
            match stale.command.copy(path, primary.storage.clone()).await {
                Ok(true) => restored.push(stale.clone()),
                Ok(false) => {
                    tracing::warn!(%path, storage = %stale.id(), "replica declined restore copy, dropping it")
                }
                Err(err) => {
                    tracing::warn!(%path, storage = %stale.id(), %err, "failed to restore replica, dropping it")
                }
            }
        }
        let live = restored.len();
        node.set_replicas(restored);
        node.set_live_replica_count(live);
    }

    fn maybe_trigger_growth(&self, node: &Arc<DirectoryNode>, path: &Path) {
        if node.is_directory() {
            return;
        }
        let live = node.live_replica_count();
        if live == 0 {
            return;
        }
        let hits = node.bump_read_hits();
        if hits < self.replica_threshold {
            return;
        }
        node.reset_read_hits();

        let Some(tx) = &self.growth_trigger else {
            return;
        };
        // Non-critical background work: never block the caller's lock
        // acquisition on the replication channel having room.
        match tx.try_send(path.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%path, "replication channel full, dropping growth request");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(%path, "replication channel closed, dropping growth request");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use naming_tree::testutil::FakeStorage;
    use naming_tree::Replica;
    use std::time::Duration;

    fn replica(id: &str) -> Replica {
        let storage = FakeStorage::new(id);
        Replica::new(storage.clone(), storage)
    }

    fn manager() -> LockManager {
        LockManager::new(DEFAULT_REPLICA_THRESHOLD, None)
    }

    #[tokio::test]
    async fn acquire_locks_ancestor_chain_shared() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/a/b").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();

        let manager = manager();
        let node = manager
            .acquire(&tree, &path, LockMode::Shared)
            .await
            .unwrap();
        assert!(node.lock_is_held(LockMode::Shared));

        let ancestor = match tree.lookup(&Path::of_string("/a").unwrap()) {
            Lookup::Found(n) => n,
            _ => panic!("expected /a"),
        };
        assert!(ancestor.lock_is_held(LockMode::Shared));

        manager.release(&tree, &path, LockMode::Shared).await.unwrap();
        assert!(!ancestor.lock_is_held(LockMode::Shared));
    }

    #[tokio::test]
    async fn acquire_missing_path_errors() {
        let tree = DirectoryTree::new();
        let manager = manager();
        let err = manager
            .acquire(&tree, &Path::of_string("/nope").unwrap(), LockMode::Shared)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::NotFound(_)));
    }

    #[tokio::test]
    async fn exclusive_acquire_invalidates_and_release_restores() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/f").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();
        tree.insert(&path, replica("s2"), false).unwrap();
        tree.insert(&path, replica("s3"), false).unwrap();

        let node = match tree.lookup(&path) {
            Lookup::Found(n) => n,
            _ => panic!("expected /f"),
        };
        assert_eq!(node.live_replica_count(), 3);

        let manager = manager();
        manager.acquire(&tree, &path, LockMode::Exclusive).await.unwrap();
        assert_eq!(node.live_replica_count(), 1);

        manager.release(&tree, &path, LockMode::Exclusive).await.unwrap();
        assert_eq!(node.live_replica_count(), 3);
    }

    #[tokio::test]
    async fn release_without_matching_acquire_errors() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/f").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();

        let manager = manager();
        let err = manager
            .release(&tree, &path, LockMode::Exclusive)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::NotHeld(_)));
    }

    #[tokio::test]
    async fn repeated_reads_trigger_growth_request() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/f").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let manager = LockManager::new(2, Some(tx));

        manager.acquire(&tree, &path, LockMode::Shared).await.unwrap();
        manager.release(&tree, &path, LockMode::Shared).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(10), rx.recv())
            .await
            .is_err());

        manager.acquire(&tree, &path, LockMode::Shared).await.unwrap();
        manager.release(&tree, &path, LockMode::Shared).await.unwrap();
        let grown = tokio::time::timeout(Duration::from_millis(10), rx.recv())
            .await
            .expect("growth request expected")
            .expect("channel open");
        assert_eq!(grown, path);
    }

    #[tokio::test]
    async fn with_lock_releases_on_error() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/f").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();

        let manager = manager();
        let result: Result<(), LockError> = manager
            .with_lock(&tree, &path, LockMode::Exclusive, |_node| async {
                Err(LockError::Interrupted)
            })
            .await;
        assert!(result.is_err());

        // A subsequent acquire must not deadlock — the lock was released.
        manager.acquire(&tree, &path, LockMode::Shared).await.unwrap();
    }
}
