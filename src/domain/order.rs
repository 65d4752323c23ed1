//! Canonical option order and leg types produced by the normalizer.

use crate::domain::{Decimal, Direction, OptionType, PositionEffect, Side, Symbol, TimeMs};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identity of a listed option contract on one underlying.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractKey {
    pub strike_price: Decimal,
    pub option_type: OptionType,
    pub expiration_date: NaiveDate,
}

/// One option contract line item within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub option_type: OptionType,
    pub strike_price: Decimal,
    pub expiration_date: NaiveDate,
    pub side: Side,
    pub position_effect: PositionEffect,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_strategy_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_strategy_code: Option<String>,
}

impl Leg {
    pub fn contract(&self) -> ContractKey {
        ContractKey {
            strike_price: self.strike_price,
            option_type: self.option_type,
            expiration_date: self.expiration_date,
        }
    }

    pub fn is_open(&self) -> bool {
        self.position_effect == PositionEffect::Open
    }

    pub fn is_close(&self) -> bool {
        self.position_effect == PositionEffect::Close
    }

    /// Non-empty strategy codes carried by this leg.
    pub fn strategy_codes(&self) -> impl Iterator<Item = &str> {
        self.long_strategy_code
            .as_deref()
            .into_iter()
            .chain(self.short_strategy_code.as_deref())
            .filter(|c| !c.is_empty())
    }
}

/// A filled option order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub underlying_symbol: Symbol,
    pub created_at: TimeMs,
    pub direction: Direction,
    /// Total dollars collected or paid for the whole order.
    pub processed_premium: Decimal,
    pub processed_quantity: Decimal,
    pub legs: Vec<Leg>,
    /// Broker form marker; `strategy_roll` and friends flag a roll ticket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_source: Option<String>,
    /// Free-text strategy labels reported by the broker.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strategy_labels: Vec<String>,
}

impl Order {
    pub fn open_legs(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter().filter(|l| l.is_open())
    }

    pub fn close_legs(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter().filter(|l| l.is_close())
    }

    pub fn is_single_leg(&self) -> bool {
        self.legs.len() == 1
    }

    /// A plain one-leg opening ticket, the only shape the tracer accepts.
    pub fn is_single_leg_open(&self) -> bool {
        self.is_single_leg() && self.legs[0].is_open()
    }

    pub fn is_single_leg_close(&self) -> bool {
        self.is_single_leg() && self.legs[0].is_close()
    }

    /// Signed cash flow: positive for credits, negative for debits.
    pub fn signed_premium(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.processed_premium,
            Direction::Debit => -self.processed_premium,
        }
    }

    /// Distinct strategy codes across every leg, sorted.
    pub fn strategy_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .legs
            .iter()
            .flat_map(|l| l.strategy_codes())
            .map(str::to_string)
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(effect: PositionEffect, long: Option<&str>, short: Option<&str>) -> Leg {
        Leg {
            option_type: OptionType::Put,
            strike_price: Decimal::from_str_canonical("150").unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            side: Side::Sell,
            position_effect: effect,
            quantity: Decimal::from_str_canonical("1").unwrap(),
            long_strategy_code: long.map(str::to_string),
            short_strategy_code: short.map(str::to_string),
        }
    }

    fn order(legs: Vec<Leg>, direction: Direction, premium: &str) -> Order {
        Order {
            id: "o1".to_string(),
            underlying_symbol: Symbol::new("AAPL"),
            created_at: TimeMs::new(0),
            direction,
            processed_premium: Decimal::from_str_canonical(premium).unwrap(),
            processed_quantity: Decimal::from_str_canonical("1").unwrap(),
            legs,
            form_source: None,
            strategy_labels: Vec::new(),
        }
    }

    #[test]
    fn test_strategy_codes_skip_empty_and_dedup() {
        let o = order(
            vec![
                leg(PositionEffect::Close, Some(""), Some("X")),
                leg(PositionEffect::Open, Some("X"), Some("Y")),
            ],
            Direction::Credit,
            "10",
        );
        assert_eq!(o.strategy_codes(), vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_signed_premium() {
        let credit = order(vec![leg(PositionEffect::Open, None, None)], Direction::Credit, "120");
        let debit = order(vec![leg(PositionEffect::Close, None, None)], Direction::Debit, "45");
        assert_eq!(credit.signed_premium().to_canonical_string(), "120");
        assert_eq!(debit.signed_premium().to_canonical_string(), "-45");
    }

    #[test]
    fn test_single_leg_shape() {
        let o = order(vec![leg(PositionEffect::Open, None, None)], Direction::Credit, "1");
        assert!(o.is_single_leg_open());
        assert!(!o.is_single_leg_close());
    }
}
