use crate::config::QuoteConfig;
use crate::types::{QuoteSet, Result, Route, SwapError};
use crate::utils::{self, decimal_from_json, f64_from_json, first_field};
use async_trait::async_trait;
use futures::future::join_all;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rate assumed when a quote carries neither an output nor a rate (2% haircut)
fn default_assumed_rate() -> Decimal {
    Decimal::new(98, 2)
}

const DEFAULT_SLIPPAGE_PERCENT: f64 = 1.0;
const DEFAULT_FEE_PERCENT: f64 = 0.3;

/// Body sent to a quoting service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub from_token: String,
    pub to_token: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// A liquidity source that can produce candidate routes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Venue name stamped on every route this source returns
    fn name(&self) -> String;

    async fn fetch_quotes(&self, request: &QuoteRequest) -> Result<Vec<Route>>;
}

/// Quoting service reached over HTTP (`POST {base}/swap/quote`)
pub struct HttpQuoteSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    name: String,
}

impl HttpQuoteSource {
    pub fn new(base_url: &str, config: &QuoteConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            name: "SaucerSwap".to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn fetch_quotes(&self, request: &QuoteRequest) -> Result<Vec<Route>> {
        let url = format!("{}/swap/quote", self.base_url);
        debug!("Requesting quotes from {}", url);

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder.send().await?.error_for_status()?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SwapError::QuoteService(format!("Malformed quote body: {}", e)))?;

        Ok(normalize_quote_response(&body, &self.name, request))
    }
}

/// Turn a quoting service body into routes.
///
/// The body is either `{ routes: [...] }` or a single bare record. Field names
/// vary between services, so each value is looked up under all known spellings.
/// Records whose path does not connect the requested pair are dropped.
pub fn normalize_quote_response(body: &Value, source: &str, request: &QuoteRequest) -> Vec<Route> {
    if body.is_null() {
        return Vec::new();
    }

    let records: Vec<&Value> = match body.get("routes").and_then(Value::as_array) {
        Some(routes) => routes.iter().collect(),
        None => vec![body],
    };

    let id_prefix = source.to_lowercase();
    let mut routes = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        if !record.is_object() {
            debug!("Skipping non-object quote record at index {}", index);
            continue;
        }

        let route = match normalize_record(record, index, &id_prefix, source, request) {
            Some(route) => route,
            None => continue,
        };
        if !route.matches_pair(&request.from_token, &request.to_token) {
            warn!(
                "Dropping quote {} from {}: path {} does not connect {} to {}",
                route.id,
                source,
                route.describe_path(),
                request.from_token,
                request.to_token
            );
            continue;
        }
        if route.estimated_out.is_sign_negative() {
            warn!("Dropping quote {} from {}: negative output", route.id, source);
            continue;
        }

        routes.push(route);
    }

    routes
}

fn normalize_record(
    record: &Value,
    index: usize,
    id_prefix: &str,
    source: &str,
    request: &QuoteRequest,
) -> Option<Route> {
    let id = match record.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => format!("{}-{}", id_prefix, index),
    };

    let path = record
        .get("path")
        .and_then(Value::as_array)
        .map(|hops| {
            hops.iter()
                .filter_map(|hop| hop.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .filter(|hops| hops.len() >= 2)
        .unwrap_or_else(|| vec![request.from_token.clone(), request.to_token.clone()]);

    let estimated_out = match first_field(record, &["estimatedOut", "output", "out"])
        .and_then(decimal_from_json)
    {
        Some(out) => out,
        None => {
            let rate = record
                .get("rate")
                .and_then(decimal_from_json)
                .unwrap_or_else(default_assumed_rate);
            match request.amount.checked_mul(rate) {
                Some(out) => out,
                None => {
                    warn!(
                        "Dropping quote {} from {}: {} x rate {} overflows",
                        id, source, request.amount, rate
                    );
                    return None;
                }
            }
        }
    };

    let slippage_percent = first_field(record, &["slippage", "slippagePercent"])
        .and_then(f64_from_json)
        .unwrap_or(DEFAULT_SLIPPAGE_PERCENT);

    let fee_percent = first_field(record, &["fee", "feePercent"])
        .and_then(f64_from_json)
        .unwrap_or(DEFAULT_FEE_PERCENT);

    let metadata = first_field(record, &["meta", "metadata"])
        .and_then(Value::as_object)
        .cloned();

    Some(Route {
        id,
        source: source.to_string(),
        path,
        estimated_out,
        slippage_percent,
        fee_percent,
        metadata,
    })
}

/// Deterministic routes appended to every quote set
pub fn fallback_routes(from: &str, to: &str, amount: Decimal) -> Vec<Route> {
    vec![
        Route {
            id: "saucerswap-fallback".to_string(),
            source: "SaucerSwap".to_string(),
            path: vec![from.to_string(), "WHBAR".to_string(), to.to_string()],
            estimated_out: utils::scale_amount(amount, Decimal::new(98, 2)),
            slippage_percent: 1.5,
            fee_percent: 0.3,
            metadata: None,
        },
        Route {
            id: "mockdex2-fallback".to_string(),
            source: "MockDEX2".to_string(),
            path: vec![from.to_string(), to.to_string()],
            estimated_out: utils::scale_amount(amount, Decimal::new(985, 3)),
            slippage_percent: 1.2,
            fee_percent: 0.25,
            metadata: None,
        },
    ]
}

/// Collects candidate routes from every configured source
pub struct QuoteAggregator {
    sources: Vec<Arc<dyn QuoteSource>>,
}

impl QuoteAggregator {
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>) -> Self {
        Self { sources }
    }

    /// Build from configuration; no API URL means synthetic routes only
    pub fn from_config(config: &QuoteConfig) -> Result<Self> {
        let mut sources: Vec<Arc<dyn QuoteSource>> = Vec::new();
        if let Some(url) = &config.api_url {
            sources.push(Arc::new(HttpQuoteSource::new(url, config)?));
        }
        Ok(Self::new(sources))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Gather routes for a pair. Source failures are logged and skipped; the
    /// fallback routes are always appended, so the result is never empty.
    pub async fn aggregate(&self, from: &str, to: &str, amount: Decimal) -> QuoteSet {
        info!("Aggregating quotes for {} {} -> {}", amount, from, to);

        let request = QuoteRequest {
            from_token: from.to_string(),
            to_token: to.to_string(),
            amount,
        };

        let results = join_all(self.sources.iter().map(|source| {
            let request = &request;
            async move { (source.name(), source.fetch_quotes(request).await) }
        }))
        .await;

        let mut routes = Vec::new();
        for (name, result) in results {
            match result {
                Ok(live) => {
                    debug!("{} returned {} routes", name, live.len());
                    routes.extend(live);
                }
                Err(e) => {
                    warn!("{} quote failed, falling back: {}", name, e);
                }
            }
        }

        let live_count = routes.len();
        routes.extend(fallback_routes(from, to, amount));

        info!(
            "Collected {} routes ({} live, {} fallback)",
            routes.len(),
            live_count,
            routes.len() - live_count
        );

        QuoteSet {
            amount,
            from: from.to_string(),
            to: to.to_string(),
            routes,
        }
    }

    /// Natural-language entry point; parsing never fails
    pub async fn aggregate_query(&self, query: &str) -> QuoteSet {
        let parsed = utils::parse_swap_query(query);
        debug!("Parsed query {:?} as {:?}", query, parsed);
        self.aggregate(&parsed.from, &parsed.to, parsed.amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn request(amount: &str) -> QuoteRequest {
        QuoteRequest {
            from_token: "HBAR".to_string(),
            to_token: "USDC".to_string(),
            amount: dec(amount),
        }
    }

    fn live_route(id: &str, out: &str) -> Route {
        Route {
            id: id.to_string(),
            source: "Live".to_string(),
            path: vec!["HBAR".to_string(), "USDC".to_string()],
            estimated_out: dec(out),
            slippage_percent: 0.5,
            fee_percent: 0.2,
            metadata: None,
        }
    }

    #[test]
    fn test_fallback_routes() {
        let routes = fallback_routes("HBAR", "USDC", dec("10"));
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].estimated_out.to_string(), "9.800000");
        assert_eq!(routes[1].estimated_out.to_string(), "9.850000");
        assert_ne!(routes[0].id, routes[1].id);
        assert_eq!(routes[0].path, vec!["HBAR", "WHBAR", "USDC"]);
        assert!(routes.iter().all(|r| r.matches_pair("HBAR", "USDC")));
    }

    #[test]
    fn test_normalize_routes_array() {
        let body = json!({
            "routes": [
                {"id": "a", "path": ["HBAR", "USDC"], "output": "9.91", "slippagePercent": 0.4, "fee": 0.25},
                {"out": 9.7, "meta": {"pool": "0.0.42"}}
            ]
        });

        let routes = normalize_quote_response(&body, "SaucerSwap", &request("10"));
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].id, "a");
        assert_eq!(routes[0].estimated_out, dec("9.91"));
        assert_eq!(routes[0].slippage_percent, 0.4);
        assert_eq!(routes[1].id, "saucerswap-1");
        assert_eq!(routes[1].path, vec!["HBAR", "USDC"]);
        assert_eq!(routes[1].slippage_percent, DEFAULT_SLIPPAGE_PERCENT);
        assert_eq!(routes[1].fee_percent, DEFAULT_FEE_PERCENT);
        assert!(routes[1].metadata.is_some());
    }

    #[test]
    fn test_normalize_single_record_with_rate() {
        let body = json!({"rate": 0.5});
        let routes = normalize_quote_response(&body, "SaucerSwap", &request("10"));
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].estimated_out, dec("5"));
        assert_eq!(routes[0].id, "saucerswap-0");
    }

    #[test]
    fn test_normalize_assumed_rate() {
        let routes = normalize_quote_response(&json!({}), "SaucerSwap", &request("10"));
        assert_eq!(routes[0].estimated_out, dec("9.8"));
    }

    #[test]
    fn test_normalize_drops_overflowing_rate() {
        let body = json!({"routes": [
            {"id": "huge", "rate": 1e20},
            {"id": "sane", "rate": 0.99}
        ]});
        let routes = normalize_quote_response(&body, "SaucerSwap", &request("10000000000"));
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, "sane");
        assert_eq!(routes[0].estimated_out, dec("9900000000"));

        let single = normalize_quote_response(&json!({"rate": 1e20}), "SaucerSwap", &request("10000000000"));
        assert!(single.is_empty());
    }

    #[test]
    fn test_normalize_drops_mismatched_path() {
        let body = json!({"routes": [
            {"path": ["USDC", "HBAR"], "estimatedOut": "1"},
            {"path": ["HBAR", "USDC"], "estimatedOut": "-1"},
            "garbage"
        ]});
        assert!(normalize_quote_response(&body, "SaucerSwap", &request("10")).is_empty());
        assert!(normalize_quote_response(&Value::Null, "SaucerSwap", &request("10")).is_empty());
    }

    #[test]
    fn test_quote_request_body() {
        let body = serde_json::to_value(request("10.5")).unwrap();
        assert_eq!(body, json!({"fromToken": "HBAR", "toToken": "USDC", "amount": 10.5}));
    }

    #[tokio::test]
    async fn test_aggregate_without_sources() {
        let aggregator = QuoteAggregator::new(vec![]);
        let quotes = aggregator.aggregate("HBAR", "USDC", dec("10")).await;
        assert_eq!(quotes.routes.len(), 2);
        assert_eq!(quotes.amount, dec("10"));
    }

    #[tokio::test]
    async fn test_aggregate_live_routes_come_first() {
        let mut source = MockQuoteSource::new();
        source.expect_name().return_const("Live".to_string());
        source
            .expect_fetch_quotes()
            .times(1)
            .returning(|_| Ok(vec![live_route("live-0", "9.95")]));

        let aggregator = QuoteAggregator::new(vec![Arc::new(source)]);
        let quotes = aggregator.aggregate("HBAR", "USDC", dec("10")).await;

        assert_eq!(quotes.routes.len(), 3);
        assert_eq!(quotes.routes[0].id, "live-0");
        assert_eq!(quotes.routes[2].id, "mockdex2-fallback");
    }

    #[tokio::test]
    async fn test_aggregate_swallows_source_failure() {
        let mut failing = MockQuoteSource::new();
        failing.expect_name().return_const("Down".to_string());
        failing
            .expect_fetch_quotes()
            .returning(|_| Err(SwapError::QuoteService("connection refused".to_string())));

        let mut healthy = MockQuoteSource::new();
        healthy.expect_name().return_const("Up".to_string());
        healthy
            .expect_fetch_quotes()
            .returning(|_| Ok(vec![live_route("up-0", "9.9")]));

        let aggregator = QuoteAggregator::new(vec![Arc::new(failing), Arc::new(healthy)]);
        let quotes = aggregator.aggregate("HBAR", "USDC", dec("10")).await;

        assert_eq!(quotes.routes.len(), 3);
        assert_eq!(quotes.routes[0].id, "up-0");
    }

    #[tokio::test]
    async fn test_aggregate_query() {
        let aggregator = QuoteAggregator::new(vec![]);
        let quotes = aggregator.aggregate_query("swap 4 SAUCE for USDT").await;
        assert_eq!(quotes.amount, dec("4"));
        assert_eq!(quotes.from, "SAUCE");
        assert_eq!(quotes.to, "USDT");

        let fallback = aggregator.aggregate_query("gibberish").await;
        assert_eq!(fallback.amount, Decimal::ONE);
        assert_eq!(fallback.from, "HBAR");
        assert!(!fallback.routes.is_empty());
    }

    #[tokio::test]
    async fn test_http_source_normalizes_response() {
        let mut server = mockito::Server::new_async().await;
        let mocked = server
            .mock("POST", "/swap/quote")
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"routes":[{"estimatedOut":"9.93","slippage":0.8}]}"#)
            .create_async()
            .await;

        let config = QuoteConfig {
            api_url: Some(server.url()),
            api_key: Some("secret".to_string()),
            ..QuoteConfig::default()
        };
        let source = HttpQuoteSource::new(&server.url(), &config).unwrap();
        let routes = source.fetch_quotes(&request("10")).await.unwrap();

        mocked.assert_async().await;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, "saucerswap-0");
        assert_eq!(routes[0].source, "SaucerSwap");
        assert_eq!(routes[0].estimated_out, dec("9.93"));
    }

    #[tokio::test]
    async fn test_aggregate_survives_overflowing_quote() {
        let mut server = mockito::Server::new_async().await;
        let _mocked = server
            .mock("POST", "/swap/quote")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"rate": 100000000000000000000}"#)
            .create_async()
            .await;

        let config = QuoteConfig {
            api_url: Some(server.url()),
            ..QuoteConfig::default()
        };
        let aggregator = QuoteAggregator::from_config(&config).unwrap();
        let quotes = aggregator.aggregate("HBAR", "USDC", dec("10000000000")).await;

        let ids: Vec<&str> = quotes.routes.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["saucerswap-fallback", "mockdex2-fallback"]);
    }

    #[tokio::test]
    async fn test_http_source_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mocked = server
            .mock("POST", "/swap/quote")
            .with_status(503)
            .create_async()
            .await;

        let source = HttpQuoteSource::new(&server.url(), &QuoteConfig::default()).unwrap();
        assert!(source.fetch_quotes(&request("10")).await.is_err());
    }
}
