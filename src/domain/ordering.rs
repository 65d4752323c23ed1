//! Stable order ordering for deterministic chain assembly.

use crate::domain::Order;

/// Stable ordering key for orders.
///
/// Ordering: created_at -> id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderOrderingKey<'a> {
    pub created_at_ms: i64,
    pub id: &'a str,
}

impl<'a> OrderOrderingKey<'a> {
    pub fn from_order(order: &'a Order) -> Self {
        OrderOrderingKey {
            created_at_ms: order.created_at.as_ms(),
            id: order.id.as_str(),
        }
    }
}

/// Sort orders chronologically, breaking timestamp ties by id.
pub fn sort_orders_deterministic(orders: &mut [Order]) {
    orders.sort_by(|a, b| OrderOrderingKey::from_order(a).cmp(&OrderOrderingKey::from_order(b)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, Direction, Symbol, TimeMs};

    fn make_order(id: &str, created_at: i64) -> Order {
        Order {
            id: id.to_string(),
            underlying_symbol: Symbol::new("SPY"),
            created_at: TimeMs::new(created_at),
            direction: Direction::Credit,
            processed_premium: Decimal::zero(),
            processed_quantity: Decimal::zero(),
            legs: Vec::new(),
            form_source: None,
            strategy_labels: Vec::new(),
        }
    }

    #[test]
    fn test_sort_orders_by_time_then_id() {
        let mut orders = vec![
            make_order("c", 2000),
            make_order("b", 1000),
            make_order("a", 1000),
        ];
        sort_orders_deterministic(&mut orders);
        let ids: Vec<&str> = orders.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
