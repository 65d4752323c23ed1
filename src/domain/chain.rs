//! Roll chain: the reconstructed sequence of orders behind one rolled position.

use crate::domain::{Decimal, OptionType, Order, Side, Symbol, TimeMs};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How a chain's membership was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Linked purely by broker strategy codes.
    StrategyCode,
    /// Strategy-code chain with its uncoded opener recovered by backward tracing.
    StrategyCodeContinuity,
    /// Linked by matching close legs to previously opened legs.
    Fallback,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::StrategyCode => "strategy_code",
            DetectionMethod::StrategyCodeContinuity => "strategy_code_continuity",
            DetectionMethod::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strategy_code" => Some(DetectionMethod::StrategyCode),
            "strategy_code_continuity" => Some(DetectionMethod::StrategyCodeContinuity),
            "fallback" => Some(DetectionMethod::Fallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Active,
    Closed,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Active => "active",
            ChainStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(ChainStatus::Active),
            "closed" => Some(ChainStatus::Closed),
            _ => None,
        }
    }
}

/// The currently-open leg of an active chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPosition {
    pub strike_price: Decimal,
    pub expiration_date: NaiveDate,
    pub option_type: OptionType,
    pub side: Side,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub chain_id: String,
    pub underlying_symbol: Symbol,
    /// Member orders, oldest first.
    pub orders: Vec<Order>,
    pub detection_method: DetectionMethod,
    pub status: ChainStatus,
    pub roll_count: usize,
    pub total_credits_collected: Decimal,
    pub total_debits_paid: Decimal,
    pub net_premium: Decimal,
    pub total_pnl: Decimal,
    pub start_date: TimeMs,
    pub last_activity_date: TimeMs,
    pub latest_position: Option<LatestPosition>,
    /// Set when the recovered opener was picked among equally-timed candidates.
    #[serde(default)]
    pub opener_ambiguous: bool,
}

impl Chain {
    /// Deterministic id derived from the earliest member order and the symbol.
    pub fn compute_chain_id(symbol: &Symbol, earliest_order_id: &str) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(symbol.as_str());
        hasher.update(b"|");
        hasher.update(earliest_order_id);
        let hash = hasher.finalize();
        format!("chain:{}", hex::encode(&hash[..16]))
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn contains_order(&self, order_id: &str) -> bool {
        self.orders.iter().any(|o| o.id == order_id)
    }
}

/// Audit record for an opener picked among exact timestamp ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenerAmbiguity {
    pub chain_id: String,
    pub underlying_symbol: Symbol,
    pub chosen_order_id: String,
    pub candidate_order_ids: Vec<String>,
}
