use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::Broker;
use crate::models::{AccountInfo, BrokerPosition, OrderConfirmation, OrderType, Side};

const LITEFINANCE_API_BASE: &str = "https://api.litefinance.com";
const RATE_LIMIT_RPS: u32 = 10;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT_MS: u64 = 1000;
const DEFAULT_LEVERAGE: &str = "1:100";

type LiteFinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// REST client for the LiteFinance brokerage API
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct LiteFinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<LiteFinanceRateLimiter>,
    request_timeout: Duration,
    initial_backoff: Duration,
}

/// `/prices/{symbol}` answers with a bare number, an object, or a short series
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceResponse {
    Scalar(f64),
    Quote { price: f64 },
    Series(Vec<f64>),
}

impl PriceResponse {
    fn latest(self) -> Option<f64> {
        match self {
            PriceResponse::Scalar(price) | PriceResponse::Quote { price } => Some(price),
            PriceResponse::Series(prices) => prices.last().copied(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    #[serde(rename = "type")]
    order_type: OrderType,
    side: Side,
    amount: f64,
    leverage: &'a str,
}

impl LiteFinanceClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(LITEFINANCE_API_BASE, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Scale per-request timeout and backoff so a fully retried price
    /// fetch finishes inside `budget`
    ///
    /// Half of the budget goes to the attempts and three eighths to the
    /// backoff sleeps; the rest covers rate limiting.
    pub fn fit_to_budget(mut self, budget: Duration) -> Self {
        let backoff_steps = 2_u32.pow(MAX_RETRIES - 1) - 1;
        self.request_timeout = budget / (2 * MAX_RETRIES);
        self.initial_backoff = budget * 3 / (8 * backoff_steps.max(1));
        self
    }

    /// Longest a `get_price` call can take when every attempt times out
    pub fn worst_case_price_latency(&self) -> Duration {
        let backoff: Duration = (1..MAX_RETRIES)
            .map(|attempt| self.initial_backoff * 2_u32.pow(attempt - 1))
            .sum();
        self.request_timeout * MAX_RETRIES + backoff
    }

    /// Override the first retry delay (doubles on each attempt)
    pub fn with_retry_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_key)
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .authorized(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?
            .error_for_status()
            .with_context(|| format!("{} rejected by broker", what))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode {} response", what))
    }

    /// Internal method to fetch price once (without retry logic)
    async fn fetch_price_once(&self, symbol: &str) -> Result<f64> {
        let url = self.url(&format!("/prices/{}", path_symbol(symbol)));
        let response: PriceResponse = self.send(self.client.get(&url), "price").await?;

        response
            .latest()
            .with_context(|| format!("Empty price series for {}", symbol))
    }
}

/// Symbols such as "BTC/USDT" are addressed without the slash
fn path_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

#[async_trait]
impl Broker for LiteFinanceClient {
    /// Includes retry logic with exponential backoff for transient failures
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_price_once(symbol).await {
                Ok(price) => {
                    if attempt > 1 {
                        tracing::info!(symbol, attempt, "Fetched price after retry");
                    }
                    return Ok(price);
                }
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {:#}. Retrying in {:?}...",
                            attempt,
                            MAX_RETRIES,
                            symbol,
                            e,
                            backoff
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        self.send(self.client.get(self.url("/account")), "account").await
    }

    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: Side,
        size: f64,
    ) -> Result<OrderConfirmation> {
        let body = OrderRequest {
            symbol,
            order_type,
            side,
            amount: size,
            leverage: DEFAULT_LEVERAGE,
        };

        let confirmation: OrderConfirmation = self
            .send(self.client.post(self.url("/orders")).json(&body), "order")
            .await?;

        tracing::info!(
            symbol,
            side = %side,
            size,
            order_id = %confirmation.id,
            "Order accepted"
        );
        Ok(confirmation)
    }

    async fn close_position(&self, position_id: Option<&str>, symbol: &str) -> Result<OrderConfirmation> {
        let id = match position_id {
            Some(id) => id.to_string(),
            None => self
                .open_positions()
                .await?
                .into_iter()
                .find(|p| p.symbol == symbol)
                .map(|p| p.id)
                .with_context(|| format!("No open position at broker for {}", symbol))?,
        };

        let url = self.url(&format!("/positions/{}/close", id));
        self.send(self.client.post(&url), "close").await
    }

    async fn open_positions(&self) -> Result<Vec<BrokerPosition>> {
        self.send(self.client.get(self.url("/positions")), "positions").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn client_for(server: &mockito::ServerGuard) -> LiteFinanceClient {
        LiteFinanceClient::with_base_url(&server.url(), "test-key".to_string())
            .unwrap()
            .with_retry_backoff(Duration::from_millis(1))
    }

    #[test]
    fn test_default_retries_fit_default_call_timeout() {
        let client = LiteFinanceClient::new("key".to_string()).unwrap();
        let call_timeout = crate::settings::TradingConfig::default().call_timeout();

        assert_eq!(client.worst_case_price_latency(), Duration::from_millis(4500));
        assert!(client.worst_case_price_latency() < call_timeout);
    }

    #[test]
    fn test_fit_to_budget() {
        for budget_ms in [200, 800, 2000, 5000] {
            let budget = Duration::from_millis(budget_ms);
            let client = LiteFinanceClient::new("key".to_string())
                .unwrap()
                .fit_to_budget(budget);

            assert!(client.worst_case_price_latency() < budget);
            assert!(client.request_timeout > Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn test_get_price_gives_up_within_budget() {
        // Nothing listens here, so every attempt fails fast
        let client = LiteFinanceClient::with_base_url("http://127.0.0.1:9", "key".to_string())
            .unwrap()
            .fit_to_budget(Duration::from_millis(400));

        let started = std::time::Instant::now();
        let result = client.get_price("XAUUSD").await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_path_symbol() {
        assert_eq!(path_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(path_symbol("XAUUSD"), "XAUUSD");
    }

    #[test]
    fn test_price_response_shapes() {
        let scalar: PriceResponse = serde_json::from_str("101.5").unwrap();
        let quote: PriceResponse = serde_json::from_str(r#"{"price": 102.5}"#).unwrap();
        let series: PriceResponse = serde_json::from_str("[100.0, 101.0, 103.5]").unwrap();
        let empty: PriceResponse = serde_json::from_str("[]").unwrap();

        assert_eq!(scalar.latest(), Some(101.5));
        assert_eq!(quote.latest(), Some(102.5));
        assert_eq!(series.latest(), Some(103.5));
        assert_eq!(empty.latest(), None);
    }

    #[tokio::test]
    async fn test_get_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/prices/BTCUSDT")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"price": 64250.5}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let price = client.get_price("BTC/USDT").await.unwrap();

        assert_eq!(price, 64250.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_price_retries_then_fails() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/prices/XAUUSD")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let result = client.get_price("XAUUSD").await;

        assert!(result.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_account_info() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/account")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"balance": 10000.0, "equity": 10120.0, "openPositions": 1, "dailyPnL": 120.0}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let account = client.account_info().await.unwrap();

        assert_eq!(account.balance, 10000.0);
        assert_eq!(account.open_positions, 1);
    }

    #[tokio::test]
    async fn test_create_order_sends_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "symbol": "XAUUSD",
                "type": "market",
                "side": "buy",
                "amount": 0.25,
                "leverage": "1:100"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "ord-42", "price": 2001.5}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let confirmation = client
            .create_order("XAUUSD", OrderType::Market, Side::Buy, 0.25)
            .await
            .unwrap();

        assert_eq!(confirmation.id, "ord-42");
        assert_eq!(confirmation.fill_price, Some(2001.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_close_position_by_symbol_looks_up_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/positions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": "p-9", "symbol": "XAUUSD", "side": "buy", "entryPrice": 1990.0}]"#)
            .create_async()
            .await;
        let close = server
            .mock("POST", "/positions/p-9/close")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "p-9"}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let confirmation = client.close_position(None, "XAUUSD").await.unwrap();

        assert_eq!(confirmation.id, "p-9");
        close.assert_async().await;
    }

    #[tokio::test]
    async fn test_close_position_unknown_symbol() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/positions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let client = client_for(&server).await;
        let result = client.close_position(None, "XAUUSD").await;

        assert!(result.unwrap_err().to_string().contains("No open position"));
    }
}
