//! Order normalizer: raw feed records to canonical `Order`/`Leg` values.
//!
//! Defective records are skipped and counted, never raised. A bad leg only
//! costs that leg; the order survives as long as one leg remains.

use crate::datasource::{RawLeg, RawOrder};
use crate::domain::{
    sort_orders_deterministic, Decimal, Direction, Leg, OptionType, Order, PositionEffect, Side,
    Symbol, TimeMs,
};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

const FILLED_STATE: &str = "filled";
const NONE_SYMBOL: &str = "NONE";

/// What the normalizer dropped and why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeReport {
    pub accepted: usize,
    pub skipped_not_filled: usize,
    pub skipped_missing_id: usize,
    pub skipped_bad_timestamp: usize,
    pub skipped_bad_direction: usize,
    pub skipped_no_legs: usize,
    pub dropped_legs: usize,
    /// Orders kept with an `UNKNOWN` underlying; they never join a chain.
    pub unknown_symbol_order_ids: Vec<String>,
}

impl NormalizeReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped_not_filled
            + self.skipped_missing_id
            + self.skipped_bad_timestamp
            + self.skipped_bad_direction
            + self.skipped_no_legs
    }
}

/// Normalize a batch of raw orders, returning them sorted chronologically.
pub fn normalize_orders(raw_orders: &[RawOrder]) -> (Vec<Order>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut orders = Vec::with_capacity(raw_orders.len());

    for raw in raw_orders {
        if let Some(order) = normalize_order(raw, &mut report) {
            if order.underlying_symbol.is_unknown() {
                report.unknown_symbol_order_ids.push(order.id.clone());
            }
            orders.push(order);
        }
    }

    sort_orders_deterministic(&mut orders);
    report.accepted = orders.len();

    if report.skipped_total() > 0 || report.dropped_legs > 0 {
        debug!(
            accepted = report.accepted,
            skipped = report.skipped_total(),
            dropped_legs = report.dropped_legs,
            unknown_symbols = report.unknown_symbol_order_ids.len(),
            "Normalized orders with defects"
        );
    }

    (orders, report)
}

fn normalize_order(raw: &RawOrder, report: &mut NormalizeReport) -> Option<Order> {
    let state = raw.state.as_deref().map(str::trim).unwrap_or_default();
    if !state.eq_ignore_ascii_case(FILLED_STATE) {
        report.skipped_not_filled += 1;
        return None;
    }

    let id = match raw.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            report.skipped_missing_id += 1;
            return None;
        }
    };

    let Some(created_at) = raw.created_at.as_ref().and_then(parse_timestamp) else {
        warn!(order_id = %id, "Skipping order with unparseable created_at");
        report.skipped_bad_timestamp += 1;
        return None;
    };

    let Some(direction) = raw.direction.as_deref().and_then(Direction::parse) else {
        warn!(order_id = %id, direction = ?raw.direction, "Skipping order with unknown direction");
        report.skipped_bad_direction += 1;
        return None;
    };

    let processed_premium = match raw.processed_premium.as_ref().and_then(Decimal::from_json) {
        Some(p) => p.abs(),
        None => {
            warn!(order_id = %id, "Missing processed_premium, using zero");
            Decimal::zero()
        }
    };
    let processed_quantity = raw
        .processed_quantity
        .as_ref()
        .and_then(Decimal::from_json)
        .unwrap_or_default();

    let mut legs = Vec::with_capacity(raw.legs.len());
    for raw_leg in &raw.legs {
        match normalize_leg(raw_leg, processed_quantity) {
            Some(leg) => legs.push(leg),
            None => {
                debug!(order_id = %id, "Dropping malformed leg");
                report.dropped_legs += 1;
            }
        }
    }
    if legs.is_empty() {
        report.skipped_no_legs += 1;
        return None;
    }

    let strategy_labels = [&raw.strategy, &raw.opening_strategy, &raw.closing_strategy]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Some(Order {
        id,
        underlying_symbol: resolve_symbol(raw),
        created_at,
        direction,
        processed_premium,
        processed_quantity,
        legs,
        form_source: raw
            .form_source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        strategy_labels,
    })
}

/// First usable symbol among the direct field, the alternate field and the
/// nested instrument, else `UNKNOWN`.
pub fn resolve_symbol(raw: &RawOrder) -> Symbol {
    let candidates = [
        raw.underlying_symbol.as_deref(),
        raw.symbol.as_deref(),
        raw.instrument.as_ref().and_then(|i| i.symbol.as_deref()),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty() && !s.eq_ignore_ascii_case(NONE_SYMBOL))
        .map(Symbol::new)
        .unwrap_or_else(Symbol::unknown)
}

fn normalize_leg(raw: &RawLeg, order_quantity: Decimal) -> Option<Leg> {
    let option_type = raw.option_type.as_deref().and_then(OptionType::parse)?;
    let strike_price = raw.strike_price.as_ref().and_then(Decimal::from_json)?;
    let position_effect = raw.position_effect.as_deref().and_then(PositionEffect::parse)?;
    let side = raw.side.as_deref().and_then(Side::parse)?;
    let expiration_date = raw
        .expiration_date
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())?;
    let quantity = raw
        .quantity
        .as_ref()
        .and_then(Decimal::from_json)
        .unwrap_or(order_quantity);

    Some(Leg {
        option_type,
        strike_price,
        expiration_date,
        side,
        position_effect,
        quantity,
        long_strategy_code: clean_code(raw.long_strategy_code.as_deref()),
        short_strategy_code: clean_code(raw.short_strategy_code.as_deref()),
    })
}

fn clean_code(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn parse_timestamp(value: &serde_json::Value) -> Option<TimeMs> {
    match value {
        serde_json::Value::String(s) => TimeMs::from_rfc3339(s),
        serde_json::Value::Number(n) => n.as_i64().map(TimeMs::new),
        _ => None,
    }
}
