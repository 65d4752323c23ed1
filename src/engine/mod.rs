//! Pure computation engine for roll-chain detection.
//!
//! Data flows one way: normalizer -> classifier -> grouper -> tracer ->
//! assembler. `ChainDetector` wires the stages together.

pub mod assembler;
pub mod classifier;
pub mod detector;
pub mod fallback;
pub mod grouper;
pub mod normalizer;
pub mod tracer;

pub use assembler::{assemble_chain, find_open_position, merge_groups, DisjointSet};
pub use classifier::{classify, is_roll, OrderKind};
pub use detector::{ChainDetector, DetectionOutput, DetectionParams, DEFAULT_MIN_ORDERS};
pub use grouper::{group_by_strategy_code, StrategyCodeGroup};
pub use normalizer::{normalize_orders, NormalizeReport};
pub use tracer::{trace_opener, TraceOutcome};
