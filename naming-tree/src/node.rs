use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use naming_path::PathComponent;

use crate::lock::{LockMode, NodeLock};
use crate::stub::Replica;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// One entry in the [`crate::DirectoryTree`].
///
/// Nodes are owned by their parent's `children` map; the back-reference to
/// the parent is a non-owning [`Weak`], the same shape
/// `tvix_castore`/`fuchsia`-style in-memory vnode trees use to avoid
/// reference cycles — the root is the only node with no parent.
pub struct DirectoryNode {
    kind: NodeKind,
    name: Option<PathComponent>,
    parent: Option<Weak<DirectoryNode>>,

    /// Only meaningfully populated for directories (invariant ii).
    children: RwLock<HashMap<String, Arc<DirectoryNode>>>,

    /// Only meaningfully populated for files (invariant ii). Replicas
    /// `0..live_replica_count` are authoritative (invariant iv).
    replicas: RwLock<Vec<Replica>>,
    live_replica_count: AtomicUsize,

    pub(crate) lock: NodeLock,
    read_hits: AtomicU64,
}

impl DirectoryNode {
    pub fn new_root() -> Arc<DirectoryNode> {
        Arc::new(DirectoryNode {
            kind: NodeKind::Directory,
            name: None,
            parent: None,
            children: RwLock::new(HashMap::new()),
            replicas: RwLock::new(Vec::new()),
            live_replica_count: AtomicUsize::new(0),
            lock: NodeLock::new(),
            read_hits: AtomicU64::new(0),
        })
    }

    pub fn new_directory(name: PathComponent, parent: &Arc<DirectoryNode>) -> Arc<DirectoryNode> {
        Arc::new(DirectoryNode {
            kind: NodeKind::Directory,
            name: Some(name),
            parent: Some(Arc::downgrade(parent)),
            children: RwLock::new(HashMap::new()),
            replicas: RwLock::new(Vec::new()),
            live_replica_count: AtomicUsize::new(0),
            lock: NodeLock::new(),
            read_hits: AtomicU64::new(0),
        })
    }

    pub fn new_file(
        name: PathComponent,
        parent: &Arc<DirectoryNode>,
        replica: Replica,
    ) -> Arc<DirectoryNode> {
        Arc::new(DirectoryNode {
            kind: NodeKind::File,
            name: Some(name),
            parent: Some(Arc::downgrade(parent)),
            children: RwLock::new(HashMap::new()),
            replicas: RwLock::new(vec![replica]),
            live_replica_count: AtomicUsize::new(1),
            lock: NodeLock::new(),
            read_hits: AtomicU64::new(0),
        })
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn name(&self) -> Option<&PathComponent> {
        self.name.as_ref()
    }

    pub fn parent(&self) -> Option<Arc<DirectoryNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> Vec<(String, Arc<DirectoryNode>)> {
        self.children
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn child(&self, name: &str) -> Option<Arc<DirectoryNode>> {
        self.children.read().get(name).cloned()
    }

    pub fn insert_child(&self, name: String, child: Arc<DirectoryNode>) {
        self.children.write().insert(name, child);
    }

    pub fn remove_child(&self, name: &str) -> Option<Arc<DirectoryNode>> {
        self.children.write().remove(name)
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    // -- replica bookkeeping --------------------

    pub fn replicas(&self) -> Vec<Replica> {
        self.replicas.read().clone()
    }

    pub fn live_replica_count(&self) -> usize {
        self.live_replica_count.load(Ordering::SeqCst)
    }

    /// Live (authoritative) replicas: `replicas[0..live_replica_count]`.
    pub fn live_replicas(&self) -> Vec<Replica> {
        let n = self.live_replica_count();
        self.replicas.read().iter().take(n).cloned().collect()
    }

    /// Adds `replica` unless a replica with the same [`StorageId`] is
    /// already present (idempotent by stub identity).
    ///
    /// [`StorageId`]: crate::stub::StorageId
    pub fn add_replica_if_absent(&self, replica: Replica) {
        let mut replicas = self.replicas.write();
        if replicas.iter().any(|r| r.id() == replica.id()) {
            return;
        }
        replicas.push(replica);
        self.live_replica_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Appends `replica` to the tail, beyond `live_replica_count` (used by
    /// the replication controller to record a newly materialised, already
    /// live, replica — the count is bumped separately by the caller once the
    /// remote `copy` has actually succeeded).
    pub fn push_replica(&self, replica: Replica) {
        self.replicas.write().push(replica);
    }

    pub fn set_live_replica_count(&self, n: usize) {
        self.live_replica_count.store(n, Ordering::SeqCst);
    }

    /// Wholesale replacement of the replica set, used when restoring after
    /// an exclusive write drops replicas that failed to catch up.
    pub fn set_replicas(&self, replicas: Vec<Replica>) {
        *self.replicas.write() = replicas;
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.read().len()
    }

    // -- read-hit bookkeeping -----------------------------

    /// Increments the read-hit counter and returns the new value.
    pub fn bump_read_hits(&self) -> u64 {
        self.read_hits.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_read_hits(&self) {
        self.read_hits.store(0, Ordering::SeqCst);
    }

    // -- lock primitive ----------------------------------------------------

    pub fn lock_acquire(&self, mode: LockMode) {
        self.lock.acquire(mode);
    }

    /// Returns `false` instead of blocking forever once `cancelled` flips to
    /// `true`.
    pub fn lock_acquire_cancelable(
        &self,
        mode: LockMode,
        cancelled: &std::sync::atomic::AtomicBool,
    ) -> bool {
        self.lock.acquire_cancelable(mode, cancelled)
    }

    pub fn lock_release(&self, mode: LockMode) {
        self.lock.release(mode);
    }

    pub fn lock_is_held(&self, mode: LockMode) -> bool {
        self.lock.is_held(mode)
    }
}

impl std::fmt::Debug for DirectoryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryNode")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}
