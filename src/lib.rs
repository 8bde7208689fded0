// HBAR Swap Optimizer Library
//
// Gathers candidate swap routes, picks the best one with a fallback-resilient
// strategy chain, simulates execution and records the action on a ledger.

pub mod config;
pub mod dispatch;
pub mod executor;
pub mod ledger;
pub mod optimizer;
pub mod quote;
pub mod scorer;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, LedgerConfig, QuoteConfig, ScorerConfig};
pub use dispatch::{DispatchResponse, Dispatcher, Tool, ToolRequest};
pub use executor::ExecutionSimulator;
pub use ledger::{ActionLogger, HttpTopicSink, JournalSink, LedgerSink};
pub use optimizer::{RouteOptimizer, Strategy};
pub use quote::{HttpQuoteSource, QuoteAggregator, QuoteSource};
pub use scorer::{HttpScorer, RouteScorer};
pub use types::{
    ExecutionReceipt, ExecutionRequest, ExecutionStatus, LogEntry, OptimizationResult,
    OptimizeRequest, QuoteSet, Result, Route, SwapError,
};

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::info;

/// Ledger action tag for executed swaps
pub const EXECUTE_SWAP_ACTION: &str = "execute_swap";

/// Receipt plus the ledger entry written for it
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub receipt: ExecutionReceipt,
    pub log: LogEntry,
}

/// Everything produced by one full pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub quotes: QuoteSet,
    pub optimization: OptimizationResult,
    pub receipt: ExecutionReceipt,
    pub log: LogEntry,
}

/// Main optimizer interface: aggregate -> optimize -> execute -> log
pub struct SwapOptimizer {
    aggregator: QuoteAggregator,
    optimizer: RouteOptimizer,
    executor: ExecutionSimulator,
    logger: ActionLogger,
    config: Config,
}

impl SwapOptimizer {
    /// Create a new optimizer instance with every component built from `config`
    pub fn new(config: Config) -> Result<Self> {
        let aggregator = QuoteAggregator::from_config(&config.quote)?;
        let optimizer = RouteOptimizer::from_config(&config.scorer)?;
        let logger = ActionLogger::from_config(&config.ledger)?;

        info!(
            "Swap optimizer ready: {} quote source(s), remote scoring {}, ledger {}",
            aggregator.source_count(),
            if optimizer.has_remote_scorer() { "on" } else { "off" },
            if logger.is_enabled() { "on" } else { "off" }
        );

        Ok(Self {
            aggregator,
            optimizer,
            executor: ExecutionSimulator::default(),
            logger,
            config,
        })
    }

    /// Assemble from ready-made components
    pub fn from_parts(
        aggregator: QuoteAggregator,
        optimizer: RouteOptimizer,
        executor: ExecutionSimulator,
        logger: ActionLogger,
    ) -> Self {
        Self {
            aggregator,
            optimizer,
            executor,
            logger,
            config: Config::default(),
        }
    }

    /// Candidate routes for a structured request
    pub async fn get_routes(&self, from: &str, to: &str, amount: Decimal) -> Result<QuoteSet> {
        validate_swap(from, to, amount)?;
        Ok(self.aggregator.aggregate(from, to, amount).await)
    }

    /// Candidate routes for a free-text request
    pub async fn get_routes_for_query(&self, query: &str) -> QuoteSet {
        self.aggregator.aggregate_query(query).await
    }

    /// Pick the best route; the pair and amount are checked like `get_routes`
    pub async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizationResult> {
        validate_swap(&request.from, &request.to, request.amount)?;
        Ok(self.optimizer.optimize(request).await)
    }

    /// Settle a swap and record it; a logging failure never fails the call
    pub async fn execute_and_log(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let receipt = self.executor.execute(request)?;
        let log = self
            .logger
            .record(EXECUTE_SWAP_ACTION, json!({ "best": request, "receipt": &receipt }))
            .await;

        Ok(ExecutionOutcome { receipt, log })
    }

    /// Run the whole pipeline for a free-text request
    pub async fn run(&self, query: &str) -> Result<PipelineReport> {
        let quotes = self.get_routes_for_query(query).await;

        let optimization = self
            .optimize(&OptimizeRequest {
                routes: quotes.routes.clone(),
                amount: quotes.amount,
                from: quotes.from.clone(),
                to: quotes.to.clone(),
            })
            .await?;

        let request = ExecutionRequest::from_route(&optimization.best)?;
        let ExecutionOutcome { receipt, log } = self.execute_and_log(&request).await?;

        Ok(PipelineReport {
            quotes,
            optimization,
            receipt,
            log,
        })
    }

    /// Get configuration
    pub fn get_config(&self) -> &Config {
        &self.config
    }
}

fn validate_swap(from: &str, to: &str, amount: Decimal) -> Result<()> {
    if from.trim().is_empty() || to.trim().is_empty() {
        return Err(SwapError::InvalidInput(
            "fromToken and toToken are required".to_string(),
        ));
    }
    if amount <= Decimal::ZERO {
        return Err(SwapError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_create_optimizer() {
        let result = SwapOptimizer::new(Config::default());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_get_routes_rejects_bad_amount() {
        let optimizer = SwapOptimizer::new(Config::default()).unwrap();
        let result = optimizer.get_routes("HBAR", "USDC", Decimal::ZERO).await;
        assert!(matches!(result, Err(SwapError::InvalidAmount(_))));

        let result = optimizer.get_routes("", "USDC", Decimal::ONE).await;
        assert!(matches!(result, Err(SwapError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_optimize_rejects_bad_request() {
        let optimizer = SwapOptimizer::new(Config::default()).unwrap();
        let request = OptimizeRequest {
            routes: vec![],
            amount: Decimal::from(-10),
            from: "HBAR".to_string(),
            to: "USDC".to_string(),
        };
        let result = optimizer.optimize(&request).await;
        assert!(matches!(result, Err(SwapError::InvalidAmount(_))));

        let request = OptimizeRequest {
            amount: Decimal::TEN,
            from: " ".to_string(),
            ..request
        };
        let result = optimizer.optimize(&request).await;
        assert!(matches!(result, Err(SwapError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_run_pipeline_offline() {
        let optimizer = SwapOptimizer::new(Config::default()).unwrap();
        let report = optimizer.run("swap 10 HBAR to USDC").await.unwrap();

        assert_eq!(report.optimization.best.id, "mockdex2-fallback");
        assert_eq!(report.optimization.reason, "fallback_deterministic");
        assert_eq!(report.receipt.amount_in, Decimal::from_str("9.85").unwrap());
        assert_eq!(report.receipt.amount_out, Decimal::from_str("9.7515").unwrap());
        assert_eq!(report.log.status, "no-topic");
    }
}
