//! The in-memory directory tree and its per-node locking primitive.
//! `naming-lock-manager` builds the ancestor-chain protocol on top of the
//! single-node primitives exposed here.

mod lock;
mod node;
mod stub;
mod tree;

pub use lock::LockMode;
pub use node::{DirectoryNode, NodeKind};
pub use stub::{CommandStub, Replica, StorageId, StorageStub, StubError};
pub use tree::{DirectoryTree, InsertOutcome, Lookup, TreeError};

#[cfg(any(test, feature = "testutil"))]
pub mod testutil {
    //! An in-memory [`StorageStub`]/[`CommandStub`] pair for tests that do
    //! not need a real storage-server transport.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use naming_path::Path;

    use crate::stub::{CommandStub, StorageId, StorageStub, StubError};

    #[derive(Debug)]
    pub struct FakeStorage {
        id: StorageId,
        files: Mutex<HashMap<String, Vec<u8>>>,
        fail_next: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeStorage {
        pub fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: StorageId(id.to_string()),
                files: Mutex::new(HashMap::new()),
                fail_next: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn fail_next_call(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        /// Every `CommandStub`/`StorageStub` call made against this server
        /// so far, as `"{method} {path}"` strings, in order. Lets tests
        /// assert on which remote calls a scenario produced without a real
        /// transport to sniff.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }

        fn maybe_fail(&self) -> Result<(), StubError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(StubError("injected failure".into()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl StorageStub for FakeStorage {
        fn id(&self) -> StorageId {
            self.id.clone()
        }

        async fn size(&self, path: &Path) -> Result<u64, StubError> {
            self.maybe_fail()?;
            Ok(self
                .files
                .lock()
                .get(&path.to_string())
                .map(|b| b.len() as u64)
                .unwrap_or_default())
        }

        async fn read(&self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, StubError> {
            self.maybe_fail()?;
            let files = self.files.lock();
            let bytes = files
                .get(&path.to_string())
                .ok_or_else(|| StubError(format!("no such file: {path}")))?;
            let start = (offset as usize).min(bytes.len());
            let end = start.saturating_add(length as usize).min(bytes.len());
            Ok(bytes[start..end].to_vec())
        }

        async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> Result<(), StubError> {
            self.maybe_fail()?;
            let mut files = self.files.lock();
            let bytes = files.entry(path.to_string()).or_default();
            let end = (offset as usize) + data.len();
            if bytes.len() < end {
                bytes.resize(end, 0);
            }
            bytes[offset as usize..end].copy_from_slice(data);
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl CommandStub for FakeStorage {
        fn id(&self) -> StorageId {
            self.id.clone()
        }

        async fn create(&self, path: &Path) -> Result<bool, StubError> {
            self.log(format!("create {path}"));
            self.maybe_fail()?;
            let mut files = self.files.lock();
            if files.contains_key(&path.to_string()) {
                return Ok(false);
            }
            files.insert(path.to_string(), Vec::new());
            Ok(true)
        }

        async fn delete(&self, path: &Path) -> Result<bool, StubError> {
            self.log(format!("delete {path}"));
            self.maybe_fail()?;
            Ok(self.files.lock().remove(&path.to_string()).is_some())
        }

        async fn copy(&self, path: &Path, source: Arc<dyn StorageStub>) -> Result<bool, StubError> {
            self.log(format!("copy {path} from {}", source.id()));
            self.maybe_fail()?;
            let size = source.size(path).await?;
            let bytes = source.read(path, 0, size).await?;
            self.files.lock().insert(path.to_string(), bytes);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use naming_path::Path;

    use crate::testutil::FakeStorage;
    use crate::tree::{DirectoryTree, InsertOutcome, Lookup};
    use crate::NodeKind;
    use crate::Replica;

    fn replica(id: &str) -> Replica {
        let storage = FakeStorage::new(id);
        Replica::new(storage.clone(), storage)
    }

    #[test]
    fn insert_creates_intermediate_directories() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/a/b/c").unwrap();
        let outcome = tree.insert(&path, replica("s1"), false).unwrap();
        assert_eq!(outcome, InsertOutcome::Created);

        match tree.lookup(&Path::of_string("/a").unwrap()) {
            Lookup::Found(node) => assert!(node.is_directory()),
            _ => panic!("expected /a to exist as a directory"),
        }
        match tree.lookup(&path) {
            Lookup::Found(node) => assert_eq!(node.kind(), NodeKind::File),
            _ => panic!("expected /a/b/c to resolve"),
        }
    }

    #[test]
    fn insert_duplicate_file_merges_replicas() {
        let tree = DirectoryTree::new();
        let path = Path::of_string("/a").unwrap();
        assert_eq!(
            tree.insert(&path, replica("s1"), false).unwrap(),
            InsertOutcome::Created
        );
        assert_eq!(
            tree.insert(&path, replica("s2"), false).unwrap(),
            InsertOutcome::Duplicate
        );

        match tree.lookup(&path) {
            Lookup::Found(node) => assert_eq!(node.replica_count(), 2),
            _ => panic!("expected /a to resolve"),
        }
    }

    #[test]
    fn insert_through_file_is_rejected_as_duplicate() {
        let tree = DirectoryTree::new();
        tree.insert(&Path::of_string("/a").unwrap(), replica("s1"), false)
            .unwrap();

        let outcome = tree
            .insert(&Path::of_string("/a/b").unwrap(), replica("s2"), false)
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Duplicate);

        match tree.lookup(&Path::of_string("/a/b").unwrap()) {
            Lookup::BlockedByFile(node) => assert_eq!(node.kind(), NodeKind::File),
            _ => panic!("expected resolution to stop at the file /a"),
        }
    }

    #[test]
    fn lookup_missing_path_is_not_found() {
        let tree = DirectoryTree::new();
        assert!(matches!(
            tree.lookup(&Path::of_string("/nope").unwrap()),
            Lookup::NotFound
        ));
    }

    #[tokio::test]
    async fn remove_detaches_and_commands_delete_on_descendants() {
        let tree = DirectoryTree::new();
        tree.insert(&Path::of_string("/dir/file").unwrap(), replica("s1"), false)
            .unwrap();

        let removed = tree.remove(&Path::of_string("/dir").unwrap()).await;
        assert!(removed);
        assert!(matches!(
            tree.lookup(&Path::of_string("/dir").unwrap()),
            Lookup::NotFound
        ));
    }

    #[tokio::test]
    async fn remove_root_is_rejected() {
        let tree = DirectoryTree::new();
        assert!(!tree.remove(&Path::root()).await);
    }

    #[test]
    fn merge_register_reports_duplicates() {
        let tree = DirectoryTree::new();
        let storage = FakeStorage::new("s1");
        let storage2: Arc<FakeStorage> = FakeStorage::new("s1");

        let dup = tree.merge_register(
            &[Path::of_string("/a").unwrap()],
            storage.clone(),
            storage.clone(),
        );
        assert!(dup.is_empty());

        let dup = tree.merge_register(
            &[Path::of_string("/a").unwrap(), Path::of_string("/b").unwrap()],
            storage2.clone(),
            storage2,
        );
        assert_eq!(dup, vec![Path::of_string("/a").unwrap()]);
    }
}
