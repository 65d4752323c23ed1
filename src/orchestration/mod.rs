pub mod refresh;
pub mod service;

pub use refresh::{RefreshCoordinator, RefreshError, RefreshOutcome};
pub use service::{ChainService, ChainSource, ServedChains, ServiceError};
