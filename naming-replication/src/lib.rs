//! Read-triggered replica growth.
//!
//! `naming-lock-manager` decides *when* a file needs another replica and
//! sends its path down a channel; this crate decides *where* to grow it
//! to and does the copy. It depends on `naming-lock-manager` (to take the
//! same shared lock a reader would) rather than the other way around, so
//! there is no cycle between the two crates.

mod controller;
mod registry;

pub use controller::{grow_once, ReplicationController};
pub use registry::StorageRegistry;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use naming_lock_manager::LockManager;
    use naming_path::Path;
    use naming_tree::testutil::FakeStorage;
    use naming_tree::{DirectoryTree, Replica};
    use tokio::sync::mpsc;

    use super::*;

    fn replica(id: &str) -> Replica {
        let storage = FakeStorage::new(id);
        Replica::new(storage.clone(), storage)
    }

    #[tokio::test]
    async fn grow_once_adds_an_unheld_registered_server() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/f").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();

        let registry = StorageRegistry::new();
        registry.register(replica("s1"));
        registry.register(replica("s2"));

        let lock_manager = LockManager::new(2, None);
        let grown = grow_once(&tree, &lock_manager, &registry, &path).await;
        assert!(grown);

        let node = match tree.lookup(&path) {
            naming_tree::Lookup::Found(n) => n,
            _ => panic!("expected /f"),
        };
        assert_eq!(node.live_replica_count(), 2);
    }

    #[tokio::test]
    async fn grow_once_is_noop_when_fully_replicated() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/f").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();

        let registry = StorageRegistry::new();
        registry.register(replica("s1"));

        let lock_manager = LockManager::new(2, None);
        let grown = grow_once(&tree, &lock_manager, &registry, &path).await;
        assert!(!grown);
    }

    #[tokio::test]
    async fn controller_drains_growth_requests_from_lock_manager() {
        let tree = Arc::new(DirectoryTree::new());
        let path = Path::of_string("/f").unwrap();
        tree.insert(&path, replica("s1"), false).unwrap();

        let registry = Arc::new(StorageRegistry::new());
        registry.register(replica("s1"));
        registry.register(replica("s2"));

        let (tx, rx) = mpsc::channel(8);
        let lock_manager = Arc::new(LockManager::new(1, Some(tx)));
        let controller = ReplicationController::spawn(tree.clone(), registry, rx, 2);

        lock_manager
            .acquire(&tree, &path, naming_tree::LockMode::Shared)
            .await
            .unwrap();
        lock_manager
            .release(&tree, &path, naming_tree::LockMode::Shared)
            .await
            .unwrap();

        // Give the worker pool a moment to drain the request.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let node = match tree.lookup(&path) {
            naming_tree::Lookup::Found(n) => n,
            _ => panic!("expected /f"),
        };
        assert_eq!(node.live_replica_count(), 2);

        // Dropping the sender-owning lock manager lets the workers drain
        // and exit instead of blocking this test's shutdown.
        drop(lock_manager);
        controller.join().await;
    }
}
