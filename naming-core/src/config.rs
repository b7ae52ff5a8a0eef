/// Runtime tunables for replica growth and the background worker pool.
/// Constructed programmatically; reading these from a file or environment
/// is a caller's job and stays out of scope here.
#[derive(Debug, Clone)]
pub struct NamingConfig {
    /// Shared-lock acquisitions on a file between replica grows.
    pub replica_threshold: u64,
    /// Size of the bounded replication worker pool.
    pub replication_workers: usize,
    /// Capacity of the growth-request channel feeding that pool.
    pub replication_channel_capacity: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            replica_threshold: 2,
            replication_workers: 4,
            replication_channel_capacity: 256,
        }
    }
}

impl NamingConfig {
    pub fn with_replica_threshold(mut self, value: u64) -> Self {
        self.replica_threshold = value;
        self
    }

    pub fn with_replication_workers(mut self, value: usize) -> Self {
        self.replication_workers = value;
        self
    }

    pub fn with_replication_channel_capacity(mut self, value: usize) -> Self {
        self.replication_channel_capacity = value;
        self
    }
}
