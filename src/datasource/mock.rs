//! Mock order feed for testing without network calls.

use super::{DataSourceError, OrderFeed, OrderPage, OrderQuery, RawOrder};
use crate::domain::{TimeMs, UserId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock order feed that serves predefined raw orders, paginated.
#[derive(Debug, Clone)]
pub struct MockOrderFeed {
    orders: Vec<(UserId, RawOrder)>,
    page_size: usize,
    delay: Option<Duration>,
    fail_with: Option<DataSourceError>,
    page_requests: Arc<AtomicUsize>,
}

impl MockOrderFeed {
    pub fn new() -> Self {
        Self {
            orders: Vec::new(),
            page_size: 50,
            delay: None,
            fail_with: None,
            page_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_order(mut self, user: &UserId, order: RawOrder) -> Self {
        self.orders.push((user.clone(), order));
        self
    }

    pub fn with_orders(mut self, user: &UserId, orders: Vec<RawOrder>) -> Self {
        self.orders
            .extend(orders.into_iter().map(|o| (user.clone(), o)));
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sleep before answering each page request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every page request with `err`.
    pub fn with_failure(mut self, err: DataSourceError) -> Self {
        self.fail_with = Some(err);
        self
    }

    /// Number of page requests served so far.
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    fn matches(query: &OrderQuery, user: &UserId, order: &RawOrder) -> bool {
        if user != &query.user {
            return false;
        }
        if let Some(symbol) = query.symbol.as_deref() {
            let order_symbol = order
                .underlying_symbol
                .as_deref()
                .or(order.symbol.as_deref())
                .or_else(|| order.instrument.as_ref().and_then(|i| i.symbol.as_deref()));
            if !order_symbol.is_some_and(|s| s.eq_ignore_ascii_case(symbol)) {
                return false;
            }
        }
        // Unparseable timestamps pass through; the normalizer deals with them.
        let created_at = order.created_at.as_ref().and_then(|v| match v {
            serde_json::Value::String(s) => TimeMs::from_rfc3339(s),
            serde_json::Value::Number(n) => n.as_i64().map(TimeMs::new),
            _ => None,
        });
        created_at.map_or(true, |t| t >= query.since)
    }
}

impl Default for MockOrderFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderFeed for MockOrderFeed {
    async fn fetch_orders_page(
        &self,
        query: &OrderQuery,
        cursor: Option<&str>,
    ) -> Result<OrderPage, DataSourceError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }

        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| DataSourceError::ParseError(format!("bad cursor {}", c)))?,
            None => 0,
        };

        let matching: Vec<&RawOrder> = self
            .orders
            .iter()
            .filter(|(user, order)| Self::matches(query, user, order))
            .map(|(_, order)| order)
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let orders = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|o| (*o).clone())
            .collect();
        let next_cursor = (end < matching.len()).then(|| end.to_string());

        Ok(OrderPage {
            orders,
            next_cursor,
        })
    }
}
