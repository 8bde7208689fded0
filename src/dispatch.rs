use crate::types::{ExecutionRequest, OptimizeRequest, Result, SwapError};
use crate::SwapOptimizer;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Operations exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    GetSwapRoutes,
    OptimizeSwap,
    ExecuteSwap,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::GetSwapRoutes => "get_swap_routes",
            Tool::OptimizeSwap => "optimize_swap",
            Tool::ExecuteSwap => "execute_swap",
        }
    }
}

impl FromStr for Tool {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "get_swap_routes" => Ok(Tool::GetSwapRoutes),
            "optimize_swap" => Ok(Tool::OptimizeSwap),
            "execute_swap" => Ok(Tool::ExecuteSwap),
            other => Err(SwapError::UnknownTool(other.to_string())),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// `{ "tool": ..., "arguments": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// HTTP-style status plus JSON body
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    pub status: u16,
    pub body: Value,
}

impl DispatchResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn from_error(err: &SwapError) -> Self {
        let status = if err.is_client_error() { 400 } else { 500 };
        Self {
            status,
            body: json!({ "error": err.to_string() }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRoutesArgs {
    #[serde(default, alias = "from")]
    from_token: Option<String>,
    #[serde(default, alias = "to")]
    to_token: Option<String>,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    query: Option<String>,
}

/// Routes tool requests to the pipeline stages
pub struct Dispatcher {
    optimizer: Arc<SwapOptimizer>,
}

impl Dispatcher {
    pub fn new(optimizer: Arc<SwapOptimizer>) -> Self {
        Self { optimizer }
    }

    /// Parse a raw request body and dispatch it
    pub async fn handle(&self, body: &str) -> DispatchResponse {
        match serde_json::from_str::<ToolRequest>(body) {
            Ok(request) => self.handle_request(&request).await,
            Err(e) => {
                warn!("Rejecting malformed request body: {}", e);
                DispatchResponse::from_error(&SwapError::ParseError(format!(
                    "Malformed request body: {}",
                    e
                )))
            }
        }
    }

    pub async fn handle_request(&self, request: &ToolRequest) -> DispatchResponse {
        match self.dispatch(request).await {
            Ok(body) => DispatchResponse::ok(body),
            Err(e) => {
                if e.is_client_error() {
                    warn!("Tool {} rejected: {}", request.tool, e);
                } else {
                    error!("Tool {} failed: {}", request.tool, e);
                }
                DispatchResponse::from_error(&e)
            }
        }
    }

    pub async fn dispatch(&self, request: &ToolRequest) -> Result<Value> {
        let tool: Tool = request.tool.parse()?;
        debug!("Dispatching {}", tool);

        match tool {
            Tool::GetSwapRoutes => self.get_swap_routes(&request.arguments).await,
            Tool::OptimizeSwap => self.optimize_swap(&request.arguments).await,
            Tool::ExecuteSwap => self.execute_swap(&request.arguments).await,
        }
    }

    async fn get_swap_routes(&self, arguments: &Value) -> Result<Value> {
        let args: GetRoutesArgs = parse_arguments(arguments, Tool::GetSwapRoutes)?;

        let quotes = match args {
            GetRoutesArgs {
                query: Some(query), ..
            } => self.optimizer.get_routes_for_query(&query).await,
            GetRoutesArgs {
                from_token: Some(from),
                to_token: Some(to),
                amount: Some(amount),
                ..
            } => self.optimizer.get_routes(&from, &to, amount).await?,
            _ => {
                return Err(SwapError::InvalidInput(
                    "get_swap_routes needs fromToken, toToken and amount, or a query".to_string(),
                ))
            }
        };

        Ok(serde_json::to_value(quotes)?)
    }

    async fn optimize_swap(&self, arguments: &Value) -> Result<Value> {
        let request: OptimizeRequest = parse_arguments(arguments, Tool::OptimizeSwap)?;
        let result = self.optimizer.optimize(&request).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn execute_swap(&self, arguments: &Value) -> Result<Value> {
        let best = arguments
            .get("best")
            .filter(|best| !best.is_null())
            .ok_or_else(|| SwapError::InvalidInput("execute_swap needs a best route".to_string()))?;

        let request = ExecutionRequest::from_value(best)?;
        let outcome = self.optimizer.execute_and_log(&request).await?;

        Ok(json!({
            "status": "executed",
            "receipt": outcome.receipt,
            "log": outcome.log,
        }))
    }
}

fn parse_arguments<T: serde::de::DeserializeOwned>(arguments: &Value, tool: Tool) -> Result<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| SwapError::InvalidInput(format!("Invalid arguments for {}: {}", tool, e)))
}
