//! quarry-common: shared types, error taxonomy, configuration.

pub mod config;
pub mod error;
pub mod id;
pub mod transaction;

pub use config::StorageConfig;
pub use error::{QuarryError, QuarryResult};
pub use id::{Lsn, Rid};
pub use transaction::Transaction;
