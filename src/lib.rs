pub mod api;
pub mod cache;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use cache::{ChainCache, InMemoryChainCache, LayeredChainCache, RedisChainCache};
pub use config::Config;
pub use datasource::{DataSourceError, HttpOrderFeed, MockOrderFeed, OrderFeed};
pub use db::{init_db, Repository};
pub use domain::{Chain, ChainFilter, ChainStatus, Decimal, DetectionMethod, Order, TimeMs, UserId};
pub use engine::{ChainDetector, DetectionOutput, DetectionParams};
pub use error::AppError;
pub use orchestration::{ChainService, RefreshCoordinator};
