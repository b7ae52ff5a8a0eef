//! The public facade tying the directory tree, the hierarchical lock
//! manager, and the replication controller into one naming service.

mod api;
mod config;
mod core;
mod error;

pub use api::{NamingServiceApi, RegistrationApi};
pub use config::NamingConfig;
pub use core::NamingCore;
pub use error::NamingError;

pub use naming_replication::StorageRegistry;
pub use naming_tree::{CommandStub, Replica, StorageId, StorageStub, StubError};

#[cfg(feature = "fixtures")]
pub mod testutil {
    //! Re-exported so facade- and replication-level tests can exercise
    //! `NamingCore` without a real storage-server transport.
    pub use naming_tree::testutil::FakeStorage;
}
