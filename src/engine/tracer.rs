//! Backward opener tracer.
//!
//! Strategy codes only appear from the first roll onward, so a coded chain
//! whose earliest order is a roll is missing the plain ticket that opened the
//! position. The tracer looks backwards for it.

use crate::domain::{ContractKey, Order, Side};
use crate::engine::classifier::is_roll;

/// Result of searching for a chain's opening order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    /// The earliest order is not a roll; there is nothing to trace.
    NotApplicable,
    /// No qualifying opener in history; the chain starts at the roll.
    NotFound,
    Found(usize),
    /// Several openers share the latest qualifying timestamp. `chosen` is the
    /// one with the smallest order id.
    Ambiguous { chosen: usize, candidates: Vec<usize> },
}

impl TraceOutcome {
    /// Index of the order to prepend, if any.
    pub fn opener(&self) -> Option<usize> {
        match self {
            TraceOutcome::Found(idx) => Some(*idx),
            TraceOutcome::Ambiguous { chosen, .. } => Some(*chosen),
            TraceOutcome::NotApplicable | TraceOutcome::NotFound => None,
        }
    }
}

/// The (contract, side) an opener must have to be closed by `earliest`.
fn opener_targets(earliest: &Order) -> Vec<(ContractKey, Side)> {
    earliest
        .close_legs()
        .map(|leg| (leg.contract(), leg.side.opposite()))
        .collect()
}

/// Find the single-leg opener for a chain starting at `earliest`.
///
/// Candidates are single-leg opening orders on the same underlying, created
/// strictly before `earliest`, matching strike, type, expiration and the side
/// opposite the closing leg. The nearest one in time wins. `is_available`
/// lets the caller exclude orders already claimed by other chains.
pub fn trace_opener<F>(earliest: &Order, orders: &[Order], is_available: F) -> TraceOutcome
where
    F: Fn(usize) -> bool,
{
    if !is_roll(earliest) {
        return TraceOutcome::NotApplicable;
    }

    let targets = opener_targets(earliest);
    if targets.is_empty() {
        return TraceOutcome::NotFound;
    }

    let candidates: Vec<usize> = orders
        .iter()
        .enumerate()
        .filter(|(idx, order)| {
            order.is_single_leg_open()
                && order.underlying_symbol == earliest.underlying_symbol
                && order.created_at < earliest.created_at
                && order.id != earliest.id
                && is_available(*idx)
        })
        .filter(|(_, order)| {
            let leg = &order.legs[0];
            targets
                .iter()
                .any(|(contract, side)| leg.contract() == *contract && leg.side == *side)
        })
        .map(|(idx, _)| idx)
        .collect();

    let Some(latest) = candidates.iter().map(|idx| orders[*idx].created_at).max() else {
        return TraceOutcome::NotFound;
    };

    let mut nearest: Vec<usize> = candidates
        .into_iter()
        .filter(|idx| orders[*idx].created_at == latest)
        .collect();
    nearest.sort_by(|a, b| orders[*a].id.cmp(&orders[*b].id));

    match nearest.as_slice() {
        [only] => TraceOutcome::Found(*only),
        [first, ..] => TraceOutcome::Ambiguous {
            chosen: *first,
            candidates: nearest.clone(),
        },
        [] => TraceOutcome::NotFound,
    }
}
