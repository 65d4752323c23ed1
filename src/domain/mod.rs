//! Domain types for roll-chain reconstruction.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, UserId, Symbol and the leg enums
//! - Canonical Order/Leg values and the derived Chain
//! - Stable order ordering helper for deterministic processing
//! - Read-side filter and pagination types

pub mod chain;
pub mod decimal;
pub mod order;
pub mod ordering;
pub mod primitives;
pub mod query;

pub use chain::{Chain, ChainStatus, DetectionMethod, LatestPosition, OpenerAmbiguity};
pub use decimal::Decimal;
pub use order::{ContractKey, Leg, Order};
pub use ordering::{sort_orders_deterministic, OrderOrderingKey};
pub use primitives::{Direction, OptionType, PositionEffect, Side, Symbol, TimeMs, UserId};
pub use query::{ChainFilter, Page};
