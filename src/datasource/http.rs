//! HTTP client for the upstream order-ingestion service.

use super::{DataSourceError, OrderFeed, OrderPage, OrderQuery, RawOrder};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Order feed backed by the order store's REST API.
///
/// `GET {base_url}/users/{user}/orders?since=..&symbol=..&cursor=..` answering
/// `{"results": [...], "next": "<cursor>" | null}`.
#[derive(Debug, Clone)]
pub struct HttpOrderFeed {
    client: Client,
    base_url: String,
}

impl HttpOrderFeed {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_page(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, DataSourceError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(url)
                .query(params)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl OrderFeed for HttpOrderFeed {
    async fn fetch_orders_page(
        &self,
        query: &OrderQuery,
        cursor: Option<&str>,
    ) -> Result<OrderPage, DataSourceError> {
        debug!(
            user = %query.user,
            since = query.since.as_ms(),
            symbol = ?query.symbol,
            cursor = ?cursor,
            "Fetching order page"
        );

        let url = format!("{}/users/{}/orders", self.base_url, query.user);
        let mut params = vec![("since", query.since.as_ms().to_string())];
        if let Some(symbol) = &query.symbol {
            params.push(("symbol", symbol.clone()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let response = self.get_page(&url, &params).await?;
        parse_page(&response)
    }
}

/// Parse a page body, skipping individual records that are not objects.
fn parse_page(body: &serde_json::Value) -> Result<OrderPage, DataSourceError> {
    let results = body
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| DataSourceError::ParseError("Missing results array".to_string()))?;

    let mut orders = Vec::with_capacity(results.len());
    for order_json in results {
        match serde_json::from_value::<RawOrder>(order_json.clone()) {
            Ok(order) => orders.push(order),
            Err(e) => warn!("Failed to parse order record: {}", e),
        }
    }

    let next_cursor = body
        .get("next")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(OrderPage {
        orders,
        next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_valid() {
        let body = serde_json::json!({
            "results": [
                {"id": "o1", "state": "filled", "legs": []},
                "garbage",
                {"id": "o2", "state": "cancelled"}
            ],
            "next": "cursor-2"
        });

        let page = parse_page(&body).unwrap();
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.orders[0].id.as_deref(), Some("o1"));
        assert_eq!(page.next_cursor.as_deref(), Some("cursor-2"));
    }

    #[test]
    fn test_parse_page_last_page() {
        let body = serde_json::json!({"results": [], "next": null});
        let page = parse_page(&body).unwrap();
        assert!(page.orders.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_parse_page_missing_results() {
        let body = serde_json::json!({"detail": "nope"});
        assert!(matches!(
            parse_page(&body),
            Err(DataSourceError::ParseError(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let feed = HttpOrderFeed::new("http://orders.local/".to_string());
        assert_eq!(feed.base_url, "http://orders.local");
    }
}
