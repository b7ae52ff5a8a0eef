//! Immutable, component-structured filesystem paths for the naming core.
//!
//! Paths are always absolute in string form (`/a/b`) but are represented
//! internally as the component sequence alone — the root is the empty
//! sequence. This mirrors the castore `Path`/`PathBuf` split in spirit, but
//! keeps components as validated `String`s rather than raw bytes, since the
//! wire format here is explicitly out of scope.

mod component;

pub use component::PathComponent;

use std::fmt::{self, Display};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// An immutable, value-compared, hashable filesystem path.
///
/// `Path::root()` is the only path with no parent and no last component.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Path {
    // Lexicographic, component-wise comparison (including the derived Ord
    // above) makes every strict ancestor compare less than its descendants,
    // since an ancestor's components are always a strict prefix (and thus
    // shorter) of the descendant's. Lock acquisition in sorted-ancestor
    // order relies on that property.
    components: Vec<PathComponent>,
}

impl Path {
    /// The root path: the empty component sequence.
    pub fn root() -> Path {
        Path {
            components: Vec::new(),
        }
    }

    /// Parses the slash-delimited string form. Fails if `s` is empty, does
    /// not start with `/`, or contains a `:` anywhere.
    pub fn of_string(s: &str) -> Result<Path, PathError> {
        if s.is_empty() {
            return Err(PathError::InvalidPath("path must not be empty".into()));
        }
        if !s.starts_with('/') {
            return Err(PathError::InvalidPath(format!(
                "path must start with '/': {:?}",
                s
            )));
        }
        if s.contains(':') {
            return Err(PathError::InvalidPath(format!(
                "path must not contain ':': {:?}",
                s
            )));
        }

        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(PathComponent::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Path { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns a new path with `component` adjoined to the end of `self`.
    pub fn append(&self, component: &str) -> Result<Path, PathError> {
        let component = PathComponent::try_from(component)?;
        let mut components = self.components.clone();
        components.push(component);
        Ok(Path { components })
    }

    /// The one-shorter prefix of `self`. Fails on the root.
    pub fn parent(&self) -> Result<Path, PathError> {
        if self.is_root() {
            return Err(PathError::InvalidPath("root has no parent".into()));
        }
        let components = self.components[..self.components.len() - 1].to_vec();
        Ok(Path { components })
    }

    /// The final component of `self`. Fails on the root.
    pub fn last(&self) -> Result<&PathComponent, PathError> {
        self.components
            .last()
            .ok_or_else(|| PathError::InvalidPath("root has no last component".into()))
    }

    /// True iff `other`'s components are a prefix of `self`'s — i.e. `other`
    /// is an ancestor of (or equal to) `self`. Every path is its own
    /// subpath.
    pub fn is_subpath(&self, other: &Path) -> bool {
        other.components.len() <= self.components.len()
            && self.components[..other.components.len()] == other.components[..]
    }

    /// A lazy, restartable iterator over components from root toward leaf.
    pub fn iterate(&self) -> impl Iterator<Item = &PathComponent> + Clone {
        self.components.iter()
    }

    /// The ancestor chain from the root up to and including `self`, in
    /// top-down order: `[root, /a, /a/b, ..., self]`. Used by the lock
    /// manager to build its acquire/release order.
    pub fn ancestor_chain(&self) -> Vec<Path> {
        let mut chain = Vec::with_capacity(self.components.len() + 1);
        chain.push(Path::root());
        for i in 1..=self.components.len() {
            chain.push(Path {
                components: self.components[..i].to_vec(),
            });
        }
        chain
    }

    /// Strict ancestors of `self`, top-down, excluding `self`.
    pub fn strict_ancestors(&self) -> Vec<Path> {
        let mut chain = self.ancestor_chain();
        chain.pop();
        chain
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Path, Self::Err> {
        Path::of_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::root("/", 0)]
    #[case("/a", 1)]
    #[case("/a/b", 2)]
    #[case("/a/b/c", 3)]
    // Empty components between slashes are discarded on parsing.
    #[case::double_slash("/a//b", 2)]
    #[case::trailing_slash("/a/b/", 2)]
    fn of_string_component_count(#[case] s: &str, #[case] expected: usize) {
        let p = Path::of_string(s).expect("must parse");
        assert_eq!(expected, p.iterate().count());
    }

    #[rstest]
    #[case::empty("")]
    #[case::no_leading_slash("a/b")]
    #[case::colon("/a:b")]
    fn of_string_rejects(#[case] s: &str) {
        Path::of_string(s).expect_err("must fail");
    }

    #[test]
    fn round_trip() {
        for s in ["/", "/a", "/a/b", "/a/b/c"] {
            let p = Path::of_string(s).expect("must parse");
            assert_eq!(p, Path::of_string(&p.to_string()).expect("must re-parse"));
        }
    }

    #[test]
    fn root_has_no_parent_or_last() {
        let root = Path::root();
        assert!(root.is_root());
        assert!(root.parent().is_err());
        assert!(root.last().is_err());
    }

    #[test]
    fn parent_and_last() {
        let p = Path::of_string("/a/b/c").unwrap();
        assert_eq!(Path::of_string("/a/b").unwrap(), p.parent().unwrap());
        assert_eq!("c", p.last().unwrap().as_str());
    }

    #[test]
    fn append_matches_of_string() {
        let p = Path::of_string("/a/b").unwrap().append("c").unwrap();
        assert_eq!(Path::of_string("/a/b/c").unwrap(), p);
    }

    #[test]
    fn is_subpath() {
        let root = Path::root();
        let a = Path::of_string("/a").unwrap();
        let ab = Path::of_string("/a/b").unwrap();
        let x = Path::of_string("/x").unwrap();

        assert!(ab.is_subpath(&root));
        assert!(ab.is_subpath(&a));
        assert!(ab.is_subpath(&ab));
        assert!(!a.is_subpath(&ab));
        assert!(!ab.is_subpath(&x));
    }

    #[test]
    fn ancestor_chain_is_top_down() {
        let p = Path::of_string("/a/b").unwrap();
        let chain = p.ancestor_chain();
        assert_eq!(
            vec![
                Path::root(),
                Path::of_string("/a").unwrap(),
                Path::of_string("/a/b").unwrap(),
            ],
            chain
        );
    }

    #[test]
    fn ordering_preserves_ancestor_before_descendant() {
        let root = Path::root();
        let a = Path::of_string("/a").unwrap();
        let ab = Path::of_string("/a/b").unwrap();
        let b = Path::of_string("/b").unwrap();

        assert!(root < a);
        assert!(a < ab);
        assert!(a < b);
    }
}
