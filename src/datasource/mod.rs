//! Order feed abstraction for fetching raw option orders from the upstream order store.

use crate::domain::{TimeMs, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpOrderFeed;
pub use mock::MockOrderFeed;

/// Upper bound on pages followed in one fetch, guards against cursor loops.
const MAX_PAGES: usize = 1_000;

/// Raw option order as delivered by the order feed.
///
/// Every field is optional: the normalizer decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOrder {
    pub id: Option<String>,
    pub underlying_symbol: Option<String>,
    pub symbol: Option<String>,
    pub instrument: Option<RawInstrument>,
    /// RFC 3339 string or integer epoch milliseconds.
    pub created_at: Option<serde_json::Value>,
    pub state: Option<String>,
    pub direction: Option<String>,
    pub processed_premium: Option<serde_json::Value>,
    pub processed_quantity: Option<serde_json::Value>,
    pub form_source: Option<String>,
    pub strategy: Option<String>,
    pub opening_strategy: Option<String>,
    pub closing_strategy: Option<String>,
    pub legs: Vec<RawLeg>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInstrument {
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLeg {
    pub option_type: Option<String>,
    pub strike_price: Option<serde_json::Value>,
    pub expiration_date: Option<String>,
    pub side: Option<String>,
    pub position_effect: Option<String>,
    pub quantity: Option<serde_json::Value>,
    pub long_strategy_code: Option<String>,
    pub short_strategy_code: Option<String>,
}

/// Query for one page of a user's orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub user: UserId,
    /// Inclusive lower bound on `created_at`.
    pub since: TimeMs,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<RawOrder>,
    /// Opaque cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Paginated, filterable feed of a user's option orders.
#[async_trait]
pub trait OrderFeed: Send + Sync + fmt::Debug {
    /// Fetch one page of orders matching `query`, starting at `cursor`.
    async fn fetch_orders_page(
        &self,
        query: &OrderQuery,
        cursor: Option<&str>,
    ) -> Result<OrderPage, DataSourceError>;

    /// Follow the cursor until the feed is exhausted.
    async fn fetch_all_orders(&self, query: &OrderQuery) -> Result<Vec<RawOrder>, DataSourceError> {
        let mut orders = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self.fetch_orders_page(query, cursor.as_deref()).await?;
            orders.extend(page.orders);
            match page.next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => return Ok(orders),
            }
        }

        Err(DataSourceError::Other(format!(
            "order feed exceeded {} pages for user {}",
            MAX_PAGES, query.user
        )))
    }
}

/// Error type for order feed operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}
