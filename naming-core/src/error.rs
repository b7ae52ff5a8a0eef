use naming_lock_manager::LockError;
use naming_path::{Path, PathError};
use naming_tree::{StorageId, StubError, TreeError};

/// The facade error returned from [`crate::NamingServiceApi`] and
/// [`crate::RegistrationApi`].
/// `AlreadyExists` is deliberately absent: it is encoded as a `false`
/// return from `create_file`/`create_directory`, not an error variant.
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("path not found: {0}")]
    PathNotFound(Path),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("storage server already registered: {0}")]
    AlreadyRegistered(StorageId),
    #[error("operation interrupted")]
    Interrupted,
    #[error(transparent)]
    Remote(#[from] StubError),
}

impl From<LockError> for NamingError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::NotFound(path) => NamingError::PathNotFound(path),
            LockError::NotHeld(path) => NamingError::InvalidArgument(format!(
                "{path} is not locked in the requested mode"
            )),
            LockError::Interrupted => NamingError::Interrupted,
        }
    }
}

impl From<TreeError> for NamingError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::RootNotInsertable => {
                NamingError::InvalidArgument("the root path is not a valid target".into())
            }
        }
    }
}
