use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use naming_lock_manager::LockManager;
use naming_path::Path;
use naming_tree::{DirectoryTree, LockMode, Lookup};

use crate::registry::StorageRegistry;

/// Grows the replica set of one file by one, if it is not already fully
/// replicated, or returns `false` if there was nothing to do.
///
/// The path is held in shared mode for the duration of the copy, which
/// excludes concurrent exclusive holders (and thus concurrent
/// invalidation) without excluding concurrent readers.
pub async fn grow_once(
    tree: &DirectoryTree,
    lock_manager: &LockManager,
    registry: &StorageRegistry,
    path: &Path,
) -> bool {
    let node = match tree.lookup(path) {
        Lookup::Found(node) if !node.is_directory() => node,
        _ => return false,
    };

    let acquired = match lock_manager.acquire(tree, path, LockMode::Shared).await {
        Ok(node) => node,
        Err(err) => {
            tracing::warn!(%path, %err, "could not acquire path for replica growth");
            return false;
        }
    };

    let grown = grow_locked(&acquired, registry, path).await;

    if let Err(err) = lock_manager.release(tree, path, LockMode::Shared).await {
        tracing::error!(%path, %err, "failed to release lock after replica growth attempt");
    }

    grown
}

async fn grow_locked(
    node: &Arc<naming_tree::DirectoryNode>,
    registry: &StorageRegistry,
    path: &Path,
) -> bool {
    let live = node.live_replicas();
    let Some(primary) = live.first().cloned() else {
        return false;
    };

    let held: std::collections::HashSet<_> = node.replicas().iter().map(|r| r.id()).collect();
    let candidates: Vec<_> = registry
        .all()
        .into_iter()
        .filter(|r| !held.contains(&r.id()))
        .collect();
    if candidates.is_empty() {
        return false;
    }

    let candidate = {
        let mut rng = rand::rng();
        let idx = rng.random_range(0..candidates.len());
        candidates[idx].clone()
    };

    match candidate.command.copy(path, primary.storage.clone()).await {
        Ok(true) => {
            node.push_replica(candidate.clone());
            node.set_live_replica_count(node.live_replica_count() + 1);
            tracing::debug!(%path, storage = %candidate.id(), "grew replica set");
            true
        }
        Ok(false) => {
            tracing::warn!(%path, storage = %candidate.id(), "candidate declined replica growth copy");
            false
        }
        Err(err) => {
            tracing::warn!(%path, storage = %candidate.id(), %err, "replica growth copy failed");
            false
        }
    }
}

/// A bounded pool of background workers draining growth requests.
/// Workers share one channel receiver rather than each owning an
/// unbounded `tokio::spawn`, so the number of concurrent replication
/// copies is capped regardless of how bursty read traffic is.
pub struct ReplicationController {
    workers: Vec<JoinHandle<()>>,
}

impl ReplicationController {
    /// Spawns `worker_count` background workers sharing one receiver.
    ///
    /// Workers take their own internal [`LockManager`], rather than the
    /// one the public API uses, with no growth-trigger sender of its own:
    /// a replication copy's internal shared-lock acquisition must not
    /// itself count as a client read and recursively request more growth,
    /// and — just as importantly — it means worker shutdown (on channel
    /// close) is never blocked on a `LockManager` the workers themselves
    /// keep alive.
    pub fn spawn(
        tree: Arc<DirectoryTree>,
        registry: Arc<StorageRegistry>,
        receiver: mpsc::Receiver<Path>,
        worker_count: usize,
    ) -> Self {
        let shared_rx = Arc::new(tokio::sync::Mutex::new(receiver));
        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let shared_rx = shared_rx.clone();
            let tree = tree.clone();
            let lock_manager = Arc::new(LockManager::new(u64::MAX, None));
            let registry = registry.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = shared_rx.lock().await.recv().await;
                    let Some(path) = next else {
                        tracing::debug!(worker = id, "replication worker shutting down");
                        return;
                    };
                    grow_once(&tree, &lock_manager, &registry, &path).await;
                }
            }));
        }

        Self { workers }
    }

    /// Waits for every worker to exit. Workers exit once every growth-request
    /// sender (held by `naming-lock-manager`) has been dropped and the
    /// channel drains, so callers should drop those senders before awaiting
    /// this.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(err) = worker.await {
                tracing::error!(%err, "replication worker panicked");
            }
        }
    }
}
