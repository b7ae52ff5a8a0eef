use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use naming_path::Path;

use crate::node::{DirectoryNode, NodeKind};
use crate::stub::{CommandStub, Replica, StorageStub};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("the root path cannot be inserted, removed, or registered directly")]
    RootNotInsertable,
}

/// The result of [`DirectoryTree::lookup`].
pub enum Lookup {
    Found(Arc<DirectoryNode>),
    /// Resolution stopped early because an intermediate path component names
    /// a file, not a directory. The file node reached is
    /// still returned so callers can report the right error.
    BlockedByFile(Arc<DirectoryNode>),
    NotFound,
}

/// The outcome of [`DirectoryTree::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    /// Either the file already existed (its replica set was updated), or an
    /// intermediate/leaf component already names a file of the wrong kind —
    /// both are reported identically as a duplicate with no tree change, so
    /// a file never becomes an implicit directory.
    Duplicate,
}

/// The in-memory trie mapping paths to [`DirectoryNode`]s.
///
/// Structural mutations (`insert`, `remove`, `merge_register`) serialize
/// behind a single coarse mutex; this is sound because they are always
/// short and, at the semantic level, are additionally guarded by the
/// caller holding an exclusive lock on the mutated node's parent.
pub struct DirectoryTree {
    root: Arc<DirectoryNode>,
    structural: Mutex<()>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTree {
    pub fn new() -> Self {
        Self {
            root: DirectoryNode::new_root(),
            structural: Mutex::new(()),
        }
    }

    pub fn root(&self) -> Arc<DirectoryNode> {
        self.root.clone()
    }

    /// Walks from the root; stops early and returns the file node if an
    /// intermediate component is a file.
    pub fn lookup(&self, path: &Path) -> Lookup {
        let mut current = self.root.clone();
        for component in path.iterate() {
            if current.kind() == NodeKind::File {
                return Lookup::BlockedByFile(current);
            }
            match current.child(component.as_str()) {
                Some(child) => current = child,
                None => return Lookup::NotFound,
            }
        }
        Lookup::Found(current)
    }

    /// Creates missing intermediate directories implicitly along the chain;
    /// the leaf becomes a file iff `as_directory == false`. If the leaf
    /// already exists, the replica is added to it (idempotent by storage
    /// identity).
    pub fn insert(
        &self,
        path: &Path,
        replica: Replica,
        as_directory: bool,
    ) -> Result<InsertOutcome, TreeError> {
        if path.is_root() {
            return Err(TreeError::RootNotInsertable);
        }

        let _guard = self.structural.lock();

        let components: Vec<_> = path.iterate().cloned().collect();
        let mut current = self.root.clone();

        for (i, component) in components.iter().enumerate() {
            let is_last = i == components.len() - 1;

            if current.kind() == NodeKind::File {
                // A file never becomes an implicit directory.
                return Ok(InsertOutcome::Duplicate);
            }

            match current.child(component.as_str()) {
                Some(existing) => {
                    if is_last {
                        let leaf_is_file = !as_directory;
                        if leaf_is_file && existing.kind() == NodeKind::File {
                            existing.add_replica_if_absent(replica);
                            return Ok(InsertOutcome::Duplicate);
                        }
                        // Either kinds match (directory/directory: no-op) or
                        // they mismatch (file/directory conflict): both are
                        // reported as a duplicate with no tree change.
                        return Ok(InsertOutcome::Duplicate);
                    }
                    current = existing;
                }
                None => {
                    let child = if is_last && !as_directory {
                        DirectoryNode::new_file(component.clone(), &current, replica.clone())
                    } else {
                        DirectoryNode::new_directory(component.clone(), &current)
                    };
                    current.insert_child(component.as_str().to_string(), child.clone());
                    current = child;
                }
            }
        }

        Ok(InsertOutcome::Created)
    }

    /// For each path, if already present as a file node, records it as a
    /// duplicate and leaves the tree untouched; otherwise inserts it fresh
    /// with `(storage, command)` as its sole replica. Returns the
    /// duplicates, which the caller returns to the registering server so
    /// it can reclaim local bytes.
    ///
    /// Unlike [`insert`](Self::insert) called directly, a duplicate here
    /// never merges `(storage, command)` into the existing node's replica
    /// set — re-registering the same file from a second server does not,
    /// by itself, replicate it there.
    pub fn merge_register(
        &self,
        paths: &[Path],
        storage: Arc<dyn StorageStub>,
        command: Arc<dyn CommandStub>,
    ) -> Vec<Path> {
        let mut duplicates = Vec::new();
        for path in paths {
            if path.is_root() {
                duplicates.push(path.clone());
                continue;
            }
            match self.lookup(path) {
                Lookup::Found(_) | Lookup::BlockedByFile(_) => duplicates.push(path.clone()),
                Lookup::NotFound => {
                    let replica = Replica::new(storage.clone(), command.clone());
                    match self.insert(path, replica, false) {
                        Ok(InsertOutcome::Created) => {}
                        Ok(InsertOutcome::Duplicate) | Err(TreeError::RootNotInsertable) => {
                            duplicates.push(path.clone())
                        }
                    }
                }
            }
        }
        duplicates
    }

    /// Recursively removes the subtree at `path`, commanding every replica
    /// of every descendant file to drop its bytes. Propagation continues
    /// even if individual remote `delete` calls fail.
    ///
    /// Returns `false` if `path` is the root or does not exist. The caller
    /// is expected to already hold the exclusive lock on `path`'s parent.
    pub async fn remove(&self, path: &Path) -> bool {
        if path.is_root() {
            return false;
        }

        let node = match self.lookup(path) {
            Lookup::Found(node) => node,
            Lookup::BlockedByFile(_) | Lookup::NotFound => return false,
        };

        let detached = {
            let _guard = self.structural.lock();
            let parent = match node.parent() {
                Some(parent) => parent,
                None => return false,
            };
            let name = node
                .name()
                .expect("non-root node has a name")
                .as_str()
                .to_string();
            parent.remove_child(&name)
        };

        if detached.is_none() {
            return false;
        }

        Self::delete_subtree_remote(&node, path.clone()).await;
        true
    }

    fn delete_subtree_remote(
        node: &Arc<DirectoryNode>,
        path: Path,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if node.is_directory() {
                for (name, child) in node.children() {
                    let child_path = path.append(&name).expect("child names are valid components");
                    Self::delete_subtree_remote(&child, child_path).await;
                }
            } else {
                for replica in node.replicas() {
                    if let Err(err) = replica.command.delete(&path).await {
                        tracing::warn!(
                            %path,
                            storage = %replica.id(),
                            %err,
                            "replica delete failed during cascading delete"
                        );
                    }
                }
            }
        })
    }
}
