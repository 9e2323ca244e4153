/// Configuration for the QuarryDB buffer pool.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Number of frames each buffer pool instance owns. Default: 64.
    pub pool_size: usize,
    /// Number of buffer pool instances the page-id space is sharded over.
    /// Default: 1 (a single, unsharded instance).
    pub num_instances: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool_size: 64,
            num_instances: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = StorageConfig::default();
        assert_eq!(config.pool_size, 64);
        assert_eq!(config.num_instances, 1);
    }

    #[test]
    fn custom_config() {
        let config = StorageConfig {
            pool_size: 1024,
            num_instances: 4,
        };
        assert_eq!(config.pool_size, 1024);
        assert_eq!(config.num_instances, 4);
    }
}
