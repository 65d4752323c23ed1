//! Chain detection over one user's order snapshot.
//!
//! Pure and synchronous: no I/O, no shared state. Identical input yields an
//! identical, identically ordered chain set.

use crate::datasource::RawOrder;
use crate::domain::{
    sort_orders_deterministic, Chain, ChainStatus, DetectionMethod, OpenerAmbiguity, Order, Symbol,
    TimeMs,
};
use crate::engine::assembler::{assemble_chain, merge_groups};
use crate::engine::fallback::link_uncoded_rolls;
use crate::engine::grouper::group_by_strategy_code;
use crate::engine::normalizer::{normalize_orders, NormalizeReport};
use crate::engine::tracer::{trace_opener, TraceOutcome};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

pub const DEFAULT_MIN_ORDERS: usize = 2;

/// Knobs for one detection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionParams {
    /// Reference instant for the lookback window.
    pub as_of: TimeMs,
    /// Only orders created within this many days of `as_of` participate.
    pub lookback_days: Option<u32>,
    pub symbol: Option<String>,
    pub status: Option<ChainStatus>,
    pub min_orders: usize,
    pub enable_fallback: bool,
}

impl DetectionParams {
    pub fn new(as_of: TimeMs) -> Self {
        Self {
            as_of,
            lookback_days: None,
            symbol: None,
            status: None,
            min_orders: DEFAULT_MIN_ORDERS,
            enable_fallback: true,
        }
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = Some(days);
        self
    }

    pub fn with_symbol(mut self, symbol: Option<String>) -> Self {
        self.symbol = symbol.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_status(mut self, status: Option<ChainStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_min_orders(mut self, min_orders: usize) -> Self {
        self.min_orders = min_orders.max(1);
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.enable_fallback = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOutput {
    /// Chains ordered by start date, then chain id.
    pub chains: Vec<Chain>,
    pub ambiguities: Vec<OpenerAmbiguity>,
    pub report: NormalizeReport,
}

/// Candidate chain before tracing: member indices and how they were found.
struct Candidate {
    members: Vec<usize>,
    method: DetectionMethod,
}

pub struct ChainDetector;

impl ChainDetector {
    /// Normalize raw feed records and detect chains.
    pub fn detect(raw_orders: &[RawOrder], params: &DetectionParams) -> DetectionOutput {
        let (orders, report) = normalize_orders(raw_orders);
        let mut output = Self::detect_normalized(orders, params);
        output.report = report;
        output
    }

    /// Detect chains over already-normalized orders.
    pub fn detect_normalized(orders: Vec<Order>, params: &DetectionParams) -> DetectionOutput {
        let cutoff = params.lookback_days.map(|d| params.as_of.days_before(d));
        let symbol_filter = params.symbol.as_deref().map(Symbol::new);

        let mut by_symbol: BTreeMap<Symbol, Vec<Order>> = BTreeMap::new();
        for order in orders {
            if order.underlying_symbol.is_unknown() {
                continue;
            }
            if cutoff.is_some_and(|c| order.created_at < c) {
                continue;
            }
            if symbol_filter
                .as_ref()
                .is_some_and(|s| *s != order.underlying_symbol)
            {
                continue;
            }
            by_symbol
                .entry(order.underlying_symbol.clone())
                .or_default()
                .push(order);
        }

        let mut output = DetectionOutput::default();
        for (symbol, mut symbol_orders) in by_symbol {
            sort_orders_deterministic(&mut symbol_orders);
            let (chains, ambiguities) = detect_symbol(&symbol, &symbol_orders, params);
            output.chains.extend(chains);
            output.ambiguities.extend(ambiguities);
        }

        output
            .chains
            .sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.chain_id.cmp(&b.chain_id)));
        output
            .ambiguities
            .sort_by(|a, b| a.chain_id.cmp(&b.chain_id));

        debug!(
            chains = output.chains.len(),
            ambiguities = output.ambiguities.len(),
            "Chain detection complete"
        );
        output
    }
}

/// Detect chains for one underlying. `orders` must be sorted chronologically.
fn detect_symbol(
    symbol: &Symbol,
    orders: &[Order],
    params: &DetectionParams,
) -> (Vec<Chain>, Vec<OpenerAmbiguity>) {
    let groups = group_by_strategy_code(orders);
    let coded = merge_groups(&groups, orders.len());

    let mut claimed: HashSet<usize> = coded.iter().flatten().copied().collect();
    let mut candidates: Vec<Candidate> = coded
        .into_iter()
        .map(|members| Candidate {
            members,
            method: DetectionMethod::StrategyCode,
        })
        .collect();

    let mut traced = trace_candidates(orders, &mut candidates, &mut claimed);

    if params.enable_fallback {
        let mut fallback: Vec<Candidate> = link_uncoded_rolls(orders, &mut claimed)
            .into_iter()
            .map(|members| Candidate {
                members,
                method: DetectionMethod::Fallback,
            })
            .collect();
        traced.extend(trace_candidates(orders, &mut fallback, &mut claimed));
        candidates.extend(fallback);
    }

    let mut chains = Vec::new();
    let mut ambiguities = Vec::new();
    for (candidate, ambiguous) in candidates.into_iter().zip(traced) {
        if candidate.members.len() < params.min_orders {
            continue;
        }

        let member_orders: Vec<Order> = candidate
            .members
            .iter()
            .map(|idx| orders[*idx].clone())
            .collect();
        let Some(chain) =
            assemble_chain(symbol, member_orders, candidate.method, ambiguous.is_some())
        else {
            continue;
        };

        if let Some(candidate_ids) = ambiguous {
            warn!(
                chain_id = %chain.chain_id,
                symbol = %symbol,
                candidates = ?candidate_ids,
                "Ambiguous opener: several candidates share the nearest timestamp"
            );
            ambiguities.push(OpenerAmbiguity {
                chain_id: chain.chain_id.clone(),
                underlying_symbol: symbol.clone(),
                chosen_order_id: chain.orders[0].id.clone(),
                candidate_order_ids: candidate_ids,
            });
        }

        if params.status.is_some_and(|s| s != chain.status) {
            continue;
        }
        chains.push(chain);
    }

    (chains, ambiguities)
}

/// Run the tracer once per candidate, oldest candidate first, prepending any
/// opener found. Returns, per candidate, the tied opener ids when ambiguous.
fn trace_candidates(
    orders: &[Order],
    candidates: &mut [Candidate],
    claimed: &mut HashSet<usize>,
) -> Vec<Option<Vec<String>>> {
    let mut sequence: Vec<usize> = (0..candidates.len()).collect();
    sequence.sort_by_key(|pos| candidates[*pos].members.first().copied());

    let mut ambiguous = vec![None; candidates.len()];
    for pos in sequence {
        let candidate = &mut candidates[pos];
        let Some(&earliest) = candidate.members.first() else {
            continue;
        };

        let outcome = trace_opener(&orders[earliest], orders, |idx| !claimed.contains(&idx));
        let Some(opener) = outcome.opener() else {
            continue;
        };

        claimed.insert(opener);
        candidate.members.insert(0, opener);
        if candidate.method == DetectionMethod::StrategyCode {
            candidate.method = DetectionMethod::StrategyCodeContinuity;
        }
        if let TraceOutcome::Ambiguous { candidates: tied, .. } = outcome {
            ambiguous[pos] = Some(tied.iter().map(|idx| orders[*idx].id.clone()).collect());
        }
    }
    ambiguous
}
