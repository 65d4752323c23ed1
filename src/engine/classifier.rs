//! Roll classifier.

use crate::domain::Order;

/// Broker form markers that identify a roll ticket.
pub const ROLL_FORM_VALUES: &[&str] = &["strategy_roll", "option_roll", "roll"];

/// Label fragments that imply a roll when structured evidence is missing.
const ROLL_LABEL_HINTS: &[&str] = &["roll", "calendar_spread"];

/// Shape of an order as far as chain detection cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    SingleLegOpen,
    SingleLegClose,
    Roll,
    /// Multi-leg order that is not a roll (e.g. a vertical opened in one ticket).
    Other,
}

/// True if the order closes one position and opens another.
///
/// A single-leg order is never a roll, whatever its labels say.
pub fn is_roll(order: &Order) -> bool {
    if order.legs.len() < 2 {
        return false;
    }

    let marked = order.form_source.as_deref().is_some_and(|form| {
        ROLL_FORM_VALUES
            .iter()
            .any(|v| form.eq_ignore_ascii_case(v))
    });
    if marked {
        return true;
    }

    if order.open_legs().next().is_some() && order.close_legs().next().is_some() {
        return true;
    }

    order.strategy_labels.iter().any(|label| {
        let label = label.to_ascii_lowercase();
        ROLL_LABEL_HINTS.iter().any(|hint| label.contains(hint))
    })
}

pub fn classify(order: &Order) -> OrderKind {
    if order.is_single_leg_open() {
        OrderKind::SingleLegOpen
    } else if order.is_single_leg_close() {
        OrderKind::SingleLegClose
    } else if is_roll(order) {
        OrderKind::Roll
    } else {
        OrderKind::Other
    }
}
