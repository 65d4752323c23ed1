//! Strategy-code grouper.
//!
//! Partitions orders by the broker's continuity tokens. An order whose legs
//! carry two different codes lands in two groups; that overlap is what lets
//! the assembler bridge an old code to a new one. No merging happens here.

use crate::domain::{Order, OrderOrderingKey};
use std::collections::BTreeMap;

/// Orders sharing one strategy code, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCodeGroup {
    pub code: String,
    /// Indices into the order slice the group was built from.
    pub members: Vec<usize>,
}

/// Build code groups over `orders`, dropping codes seen on fewer than two orders.
pub fn group_by_strategy_code(orders: &[Order]) -> Vec<StrategyCodeGroup> {
    let mut by_code: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for (idx, order) in orders.iter().enumerate() {
        for code in order.strategy_codes() {
            let members = by_code.entry(code).or_default();
            if members.last() != Some(&idx) {
                members.push(idx);
            }
        }
    }

    by_code
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(code, mut members)| {
            members.sort_by(|a, b| {
                OrderOrderingKey::from_order(&orders[*a])
                    .cmp(&OrderOrderingKey::from_order(&orders[*b]))
            });
            StrategyCodeGroup { code, members }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Decimal, Direction, Leg, OptionType, PositionEffect, Side, Symbol, TimeMs,
    };
    use chrono::NaiveDate;

    fn leg(effect: PositionEffect, code: Option<&str>) -> Leg {
        Leg {
            option_type: OptionType::Put,
            strike_price: Decimal::from_str_canonical("50").unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            side: Side::Sell,
            position_effect: effect,
            quantity: Decimal::from_str_canonical("1").unwrap(),
            long_strategy_code: None,
            short_strategy_code: code.map(str::to_string),
        }
    }

    fn order(id: &str, t: i64, legs: Vec<Leg>) -> Order {
        Order {
            id: id.to_string(),
            underlying_symbol: Symbol::new("F"),
            created_at: TimeMs::new(t),
            direction: Direction::Credit,
            processed_premium: Decimal::zero(),
            processed_quantity: Decimal::zero(),
            legs,
            form_source: None,
            strategy_labels: Vec::new(),
        }
    }

    #[test]
    fn test_singleton_codes_discarded() {
        let orders = vec![
            order("a", 1, vec![leg(PositionEffect::Open, Some("X"))]),
            order("b", 2, vec![leg(PositionEffect::Open, Some("Y"))]),
        ];
        assert!(group_by_strategy_code(&orders).is_empty());
    }

    #[test]
    fn test_roll_bridges_two_groups() {
        let orders = vec![
            order("a", 1, vec![leg(PositionEffect::Open, Some("X"))]),
            order(
                "b",
                2,
                vec![
                    leg(PositionEffect::Close, Some("X")),
                    leg(PositionEffect::Open, Some("Y")),
                ],
            ),
            order("c", 3, vec![leg(PositionEffect::Close, Some("Y"))]),
        ];

        let groups = group_by_strategy_code(&orders);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].code, "X");
        assert_eq!(groups[0].members, vec![0, 1]);
        assert_eq!(groups[1].code, "Y");
        assert_eq!(groups[1].members, vec![1, 2]);
    }

    #[test]
    fn test_same_code_on_both_legs_counts_once() {
        let orders = vec![order(
            "a",
            1,
            vec![
                leg(PositionEffect::Close, Some("X")),
                leg(PositionEffect::Open, Some("X")),
            ],
        )];
        assert!(group_by_strategy_code(&orders).is_empty());
    }

    #[test]
    fn test_uncoded_orders_ignored() {
        let orders = vec![
            order("a", 1, vec![leg(PositionEffect::Open, None)]),
            order("b", 2, vec![leg(PositionEffect::Close, None)]),
        ];
        assert!(group_by_strategy_code(&orders).is_empty());
    }
}
