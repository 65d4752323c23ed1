//! Chain assembler: merges overlapping code groups and computes chain economics.

use crate::domain::{
    sort_orders_deterministic, Chain, ChainStatus, Decimal, DetectionMethod, Direction,
    LatestPosition, Order, Symbol,
};
use crate::engine::grouper::StrategyCodeGroup;
use std::collections::BTreeMap;

/// Union-find over order indices.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression.
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Merge groups with overlapping membership into equivalence classes.
///
/// Returns member index lists, each ascending, ordered by smallest member.
/// `order_count` is the length of the order slice the groups index into.
pub fn merge_groups(groups: &[StrategyCodeGroup], order_count: usize) -> Vec<Vec<usize>> {
    let mut set = DisjointSet::new(order_count);
    for group in groups {
        if let Some((first, rest)) = group.members.split_first() {
            for member in rest {
                set.union(*first, *member);
            }
        }
    }

    let mut classes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for member in groups.iter().flat_map(|g| g.members.iter().copied()) {
        let root = set.find(member);
        classes.entry(root).or_default().push(member);
    }

    let mut merged: Vec<Vec<usize>> = classes
        .into_values()
        .map(|mut members| {
            members.sort_unstable();
            members.dedup();
            members
        })
        .collect();
    merged.sort_by_key(|members| members[0]);
    merged
}

/// Build a chain from its member orders.
pub fn assemble_chain(
    symbol: &Symbol,
    mut orders: Vec<Order>,
    detection_method: DetectionMethod,
    opener_ambiguous: bool,
) -> Option<Chain> {
    sort_orders_deterministic(&mut orders);
    let first = orders.first()?;
    let last = orders.last()?;

    let chain_id = Chain::compute_chain_id(symbol, &first.id);
    let start_date = first.created_at;
    let last_activity_date = last.created_at;

    let total_credits_collected: Decimal = orders
        .iter()
        .filter(|o| o.direction == Direction::Credit)
        .map(|o| o.processed_premium)
        .sum();
    let total_debits_paid: Decimal = orders
        .iter()
        .filter(|o| o.direction == Direction::Debit)
        .map(|o| o.processed_premium)
        .sum();
    let net_premium = total_credits_collected - total_debits_paid;

    let latest_position = find_open_position(&orders);
    let status = if latest_position.is_some() {
        ChainStatus::Active
    } else {
        ChainStatus::Closed
    };

    Some(Chain {
        chain_id,
        underlying_symbol: symbol.clone(),
        roll_count: orders.len().saturating_sub(1),
        orders,
        detection_method,
        status,
        total_credits_collected,
        total_debits_paid,
        net_premium,
        // Realized cash flow only; no mark-to-market.
        total_pnl: net_premium,
        start_date,
        last_activity_date,
        latest_position,
        opener_ambiguous,
    })
}

/// Newest open leg not closed by any later order in the chain.
///
/// Walks from the most recent order backwards so a leg opened several orders
/// ago still counts when only unrelated legs were closed since.
pub fn find_open_position(orders: &[Order]) -> Option<LatestPosition> {
    for (idx, order) in orders.iter().enumerate().rev() {
        let later = &orders[idx + 1..];
        for leg in order.open_legs() {
            let contract = leg.contract();
            let closed_later = later
                .iter()
                .flat_map(|o| o.close_legs())
                .any(|close| close.contract() == contract);
            if !closed_later {
                return Some(LatestPosition {
                    strike_price: leg.strike_price,
                    expiration_date: leg.expiration_date,
                    option_type: leg.option_type,
                    side: leg.side,
                    quantity: leg.quantity,
                });
            }
        }
    }
    None
}
