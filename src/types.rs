use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Custom error types for the swap optimizer
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Quote service error: {0}")]
    QuoteService(String),

    #[error("Scoring service error: {0}")]
    ScoringService(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwapError {
    /// Errors caused by the caller's request rather than by this service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SwapError::InvalidInput(_)
                | SwapError::InvalidAmount(_)
                | SwapError::UnknownTool(_)
                | SwapError::ParseError(_)
        )
    }
}

/// Result type alias for swap optimizer operations
pub type Result<T> = std::result::Result<T, SwapError>;

/// A candidate path for converting an amount of one token into another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Unique within a single aggregation call
    #[serde(default)]
    pub id: String,

    /// Liquidity venue name (e.g. "SaucerSwap")
    #[serde(default, alias = "dex")]
    pub source: String,

    /// Token symbols or identifiers, first = from-token, last = to-token
    pub path: Vec<String>,

    /// Expected output amount
    pub estimated_out: Decimal,

    /// Slippage in percent
    #[serde(default, alias = "slippage")]
    pub slippage_percent: f64,

    /// Fee in percent
    #[serde(default, alias = "fee")]
    pub fee_percent: f64,

    /// Source-specific extra data
    #[serde(default, alias = "meta", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Route {
    /// First token of the path
    pub fn from_token(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }

    /// Last token of the path
    pub fn to_token(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    /// Check the path endpoints against the requested pair (symbols compare case-insensitively)
    pub fn matches_pair(&self, from: &str, to: &str) -> bool {
        match (self.from_token(), self.to_token()) {
            (Some(first), Some(last)) if self.path.len() >= 2 => {
                first.eq_ignore_ascii_case(from) && last.eq_ignore_ascii_case(to)
            }
            _ => false,
        }
    }

    /// Human-readable route path
    pub fn describe_path(&self) -> String {
        self.path.join(" → ")
    }
}

/// Output of the quote aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSet {
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub routes: Vec<Route>,
}

/// Selected route plus the tag of the strategy that selected it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub best: Route,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Input to the optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    #[serde(default)]
    pub routes: Vec<Route>,
    pub amount: Decimal,
    pub from: String,
    pub to: String,
}

/// Settlement status reported by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "SUCCESS"),
            ExecutionStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// What the executor needs to settle a swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(alias = "fromToken")]
    pub from: String,
    #[serde(alias = "toToken")]
    pub to: String,
    #[serde(default)]
    pub amount_in: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_out: Option<Decimal>,
}

impl ExecutionRequest {
    /// Map a selected route to execution input.
    ///
    /// The path endpoints give the token pair and the route's estimated output
    /// is the amount handed to settlement. `amount_out` is left for the executor
    /// to derive.
    pub fn from_route(route: &Route) -> Result<Self> {
        let (from, to) = match (route.from_token(), route.to_token()) {
            (Some(from), Some(to)) if route.path.len() >= 2 => (from, to),
            _ => {
                return Err(SwapError::InvalidInput(format!(
                    "Route {} has no usable path",
                    route.id
                )))
            }
        };

        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            amount_in: Some(route.estimated_out),
            amount_out: None,
        })
    }

    /// Accept either a route object (has `path`) or explicit execution fields
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(SwapError::InvalidInput(
                "Execution input must be a JSON object".to_string(),
            ));
        }

        if value.get("path").is_some() {
            let route: Route = serde_json::from_value(value.clone())
                .map_err(|e| SwapError::InvalidInput(format!("Invalid route: {}", e)))?;
            return Self::from_route(&route);
        }

        serde_json::from_value(value.clone())
            .map_err(|e| SwapError::InvalidInput(format!("Invalid execution input: {}", e)))
    }
}

/// Receipt produced by the execution simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    pub transaction_id: String,
    pub status: ExecutionStatus,
    pub from_token: String,
    pub to_token: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Record of an action appended to the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub action: String,
    pub payload: Value,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub const STATUS_NO_TOPIC: &'static str = "no-topic";
    pub const STATUS_ERROR: &'static str = "error";

    pub fn is_error(&self) -> bool {
        self.status == Self::STATUS_ERROR
    }
}
