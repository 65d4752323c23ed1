//! Fallback linker for rolls that carry no usable strategy code.
//!
//! Each roll's close leg is matched against the legs left open by earlier
//! uncoded rolls on the same underlying. A match extends that chain; no match
//! starts a new one. Single-leg closes can terminate a chain but never start one.

use crate::domain::{ContractKey, Order, Side};
use crate::engine::classifier::{classify, OrderKind};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenLeg {
    contract: ContractKey,
    side: Side,
}

#[derive(Debug, Clone)]
struct PendingChain {
    members: Vec<usize>,
    open: Vec<OpenLeg>,
}

impl PendingChain {
    /// Position in `open` of the leg closed by `(contract, closing_side)`.
    fn matching_open(&self, contract: &ContractKey, closing_side: Side) -> Option<usize> {
        self.open
            .iter()
            .position(|o| o.contract == *contract && o.side == closing_side.opposite())
    }
}

/// Link unclaimed rolls (and their terminating closes) into chains.
///
/// `orders` must be one underlying's orders sorted chronologically. Orders in
/// `claimed` are skipped; every order linked here is added to it. Returns
/// member index lists, each chronological.
pub fn link_uncoded_rolls(orders: &[Order], claimed: &mut HashSet<usize>) -> Vec<Vec<usize>> {
    let mut chains: Vec<PendingChain> = Vec::new();

    for (idx, order) in orders.iter().enumerate() {
        if claimed.contains(&idx) {
            continue;
        }

        match classify(order) {
            OrderKind::Roll => {
                let target = order
                    .close_legs()
                    .find_map(|leg| find_chain(&chains, orders, &leg.contract(), leg.side));

                let chain = match target {
                    Some(pos) => &mut chains[pos],
                    None => {
                        chains.push(PendingChain {
                            members: Vec::new(),
                            open: Vec::new(),
                        });
                        let last = chains.len() - 1;
                        &mut chains[last]
                    }
                };

                for leg in order.close_legs() {
                    if let Some(pos) = chain.matching_open(&leg.contract(), leg.side) {
                        chain.open.remove(pos);
                    }
                }
                chain.open.extend(order.open_legs().map(|leg| OpenLeg {
                    contract: leg.contract(),
                    side: leg.side,
                }));
                chain.members.push(idx);
                claimed.insert(idx);
            }
            OrderKind::SingleLegClose => {
                let leg = &order.legs[0];
                if let Some(pos) = find_chain(&chains, orders, &leg.contract(), leg.side) {
                    let chain = &mut chains[pos];
                    if let Some(open_pos) = chain.matching_open(&leg.contract(), leg.side) {
                        chain.open.remove(open_pos);
                    }
                    chain.members.push(idx);
                    claimed.insert(idx);
                }
            }
            OrderKind::SingleLegOpen | OrderKind::Other => {}
        }
    }

    chains.into_iter().map(|c| c.members).collect()
}

/// The most recently extended chain with an open leg closed by this leg.
fn find_chain(
    chains: &[PendingChain],
    orders: &[Order],
    contract: &ContractKey,
    closing_side: Side,
) -> Option<usize> {
    chains
        .iter()
        .enumerate()
        .filter(|(_, chain)| chain.matching_open(contract, closing_side).is_some())
        .max_by(|(ia, a), (ib, b)| {
            let ta = a.members.last().map(|m| orders[*m].created_at);
            let tb = b.members.last().map(|m| orders[*m].created_at);
            // Equal times prefer the older chain (lower index).
            ta.cmp(&tb).then_with(|| ib.cmp(ia))
        })
        .map(|(pos, _)| pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, Direction, Leg, OptionType, PositionEffect, Symbol, TimeMs};
    use chrono::NaiveDate;

    fn leg(strike: &str, side: Side, effect: PositionEffect) -> Leg {
        Leg {
            option_type: OptionType::Call,
            strike_price: Decimal::from_str_canonical(strike).unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
            side,
            position_effect: effect,
            quantity: Decimal::from_str_canonical("1").unwrap(),
            long_strategy_code: None,
            short_strategy_code: None,
        }
    }

    fn order(id: &str, t: i64, legs: Vec<Leg>) -> Order {
        Order {
            id: id.to_string(),
            underlying_symbol: Symbol::new("NVDA"),
            created_at: TimeMs::new(t),
            direction: Direction::Credit,
            processed_premium: Decimal::zero(),
            processed_quantity: Decimal::zero(),
            legs,
            form_source: None,
            strategy_labels: Vec::new(),
        }
    }

    fn roll(id: &str, t: i64, from: &str, to: &str) -> Order {
        order(
            id,
            t,
            vec![
                leg(from, Side::Buy, PositionEffect::Close),
                leg(to, Side::Sell, PositionEffect::Open),
            ],
        )
    }

    #[test]
    fn test_links_consecutive_rolls_and_close() {
        let orders = vec![
            order("open", 1, vec![leg("500", Side::Sell, PositionEffect::Open)]),
            roll("r1", 2, "500", "510"),
            roll("r2", 3, "510", "520"),
            order("close", 4, vec![leg("520", Side::Buy, PositionEffect::Close)]),
        ];
        let mut claimed = HashSet::new();
        let chains = link_uncoded_rolls(&orders, &mut claimed);
        assert_eq!(chains, vec![vec![1, 2, 3]]);
        // The opener is left for the tracer.
        assert!(!claimed.contains(&0));
    }

    #[test]
    fn test_unrelated_rolls_start_separate_chains() {
        let orders = vec![roll("r1", 1, "500", "510"), roll("r2", 2, "600", "610")];
        let mut claimed = HashSet::new();
        let chains = link_uncoded_rolls(&orders, &mut claimed);
        assert_eq!(chains, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_claimed_orders_are_skipped() {
        let orders = vec![roll("r1", 1, "500", "510"), roll("r2", 2, "510", "520")];
        let mut claimed: HashSet<usize> = [0].into_iter().collect();
        let chains = link_uncoded_rolls(&orders, &mut claimed);
        assert_eq!(chains, vec![vec![1]]);
    }

    #[test]
    fn test_orphan_close_is_not_linked() {
        let orders = vec![order("close", 1, vec![leg("520", Side::Buy, PositionEffect::Close)])];
        let mut claimed = HashSet::new();
        assert!(link_uncoded_rolls(&orders, &mut claimed).is_empty());
        assert!(claimed.is_empty());
    }
}
