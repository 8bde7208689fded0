use crate::config::ScorerConfig;
use crate::scorer::{self, HttpScorer, RouteScorer};
use crate::types::{OptimizationResult, OptimizeRequest, Result, Route};
use crate::utils;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Named selection strategies, tried in chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No candidates at all: return the synthetic mock route
    EmptyInputGuard,

    /// No remote scorer configured: highest estimated output wins
    Deterministic,

    /// Ask the remote scorer
    RemoteScoring,

    /// Scorer answered without a usable route
    ParseFallback,

    /// Scorer call failed
    ErrorFallbackWithMock,
}

/// Order in which strategies are attempted
pub const STRATEGY_CHAIN: [Strategy; 5] = [
    Strategy::EmptyInputGuard,
    Strategy::Deterministic,
    Strategy::RemoteScoring,
    Strategy::ParseFallback,
    Strategy::ErrorFallbackWithMock,
];

impl Strategy {
    /// Reason tag reported when this strategy selects the route
    pub fn tag(&self) -> &'static str {
        match self {
            Strategy::EmptyInputGuard => "mock_fallback",
            Strategy::Deterministic => "fallback_deterministic",
            Strategy::RemoteScoring => "comput3",
            Strategy::ParseFallback => "comput3_parse_fallback",
            Strategy::ErrorFallbackWithMock => "comput3_error_fallback_with_mock",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Outcome of the remote scoring attempt, read by the later fallbacks
#[derive(Debug, Clone, PartialEq)]
enum RemoteOutcome {
    Unparseable,
    CallFailed(String),
}

/// State carried along the chain for one optimize call
struct Attempt<'a> {
    request: &'a OptimizeRequest,
    remote: Option<RemoteOutcome>,
}

/// A route picked by one strategy
#[derive(Debug, Clone)]
struct Selection {
    best: Route,
    choice_index: Option<usize>,
    reason: Option<String>,
    error: Option<String>,
}

impl Selection {
    fn indexed(best: Route, choice_index: usize) -> Self {
        Self {
            best,
            choice_index: Some(choice_index),
            reason: None,
            error: None,
        }
    }

    fn into_result(self, strategy: Strategy) -> OptimizationResult {
        OptimizationResult {
            best: self.best,
            reason: self.reason.unwrap_or_else(|| strategy.tag().to_string()),
            choice_index: self.choice_index,
            error: self.error,
        }
    }
}

/// Synthetic last-resort route: 95% of the input amount
pub fn mock_route(from: &str, to: &str, amount: Decimal) -> Route {
    Route {
        id: "mock-fallback".to_string(),
        source: "MockDEX".to_string(),
        path: vec![from.to_string(), to.to_string()],
        estimated_out: utils::scale_amount(amount, Decimal::new(95, 2)),
        slippage_percent: 1.5,
        fee_percent: 0.25,
        metadata: None,
    }
}

/// Route with the greatest estimated output; the first one wins ties
pub fn select_max_output(routes: &[Route]) -> Option<(usize, &Route)> {
    routes
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, &Route)>, (index, route)| match best {
            Some((_, current)) if route.estimated_out <= current.estimated_out => best,
            _ => Some((index, route)),
        })
}

/// Picks the best route, degrading through the strategy chain
pub struct RouteOptimizer {
    scorer: Option<Arc<dyn RouteScorer>>,
}

impl RouteOptimizer {
    pub fn new(scorer: Option<Arc<dyn RouteScorer>>) -> Self {
        Self { scorer }
    }

    /// Remote scoring is used only when both endpoint and key are configured
    pub fn from_config(config: &ScorerConfig) -> Result<Self> {
        let scorer: Option<Arc<dyn RouteScorer>> = if config.is_configured() {
            Some(Arc::new(HttpScorer::new(config)?))
        } else {
            None
        };
        Ok(Self::new(scorer))
    }

    pub fn has_remote_scorer(&self) -> bool {
        self.scorer.is_some()
    }

    pub async fn optimize(&self, request: &OptimizeRequest) -> OptimizationResult {
        self.run_chain(&STRATEGY_CHAIN, request).await
    }

    async fn run_chain(&self, chain: &[Strategy], request: &OptimizeRequest) -> OptimizationResult {
        info!(
            "Optimizing {} routes for {} {} -> {}",
            request.routes.len(),
            request.amount,
            request.from,
            request.to
        );

        let mut attempt = Attempt {
            request,
            remote: None,
        };

        for &strategy in chain {
            if let Some(selection) = self.attempt(strategy, &mut attempt).await {
                let result = selection.into_result(strategy);
                info!(
                    "Selected {} ({}) via {}: {}",
                    result.best.id, result.best.estimated_out, strategy, result.reason
                );
                return result;
            }
        }

        // Nothing claimed the request: highest output, or the mock when there are no routes
        warn!("No strategy selected a route, falling back to highest estimated output");
        match self.deterministic(request) {
            Some(selection) => selection.into_result(Strategy::Deterministic),
            None => Selection {
                best: mock_route(&request.from, &request.to, request.amount),
                choice_index: None,
                reason: None,
                error: None,
            }
            .into_result(Strategy::EmptyInputGuard),
        }
    }

    async fn attempt(&self, strategy: Strategy, attempt: &mut Attempt<'_>) -> Option<Selection> {
        match strategy {
            Strategy::EmptyInputGuard => self.empty_input_guard(attempt.request),
            Strategy::Deterministic => match self.scorer {
                None => self.deterministic(attempt.request),
                Some(_) => None,
            },
            Strategy::RemoteScoring => match &self.scorer {
                Some(scorer) => self.remote_scoring(scorer.as_ref(), attempt).await,
                None => None,
            },
            Strategy::ParseFallback => match attempt.remote {
                Some(RemoteOutcome::Unparseable) => self.deterministic(attempt.request),
                _ => None,
            },
            Strategy::ErrorFallbackWithMock => match &attempt.remote {
                Some(RemoteOutcome::CallFailed(message)) => {
                    self.error_fallback(attempt.request, message)
                }
                _ => None,
            },
        }
    }

    fn empty_input_guard(&self, request: &OptimizeRequest) -> Option<Selection> {
        if !request.routes.is_empty() {
            return None;
        }

        warn!("No candidate routes supplied, using mock route");
        Some(Selection {
            best: mock_route(&request.from, &request.to, request.amount),
            choice_index: None,
            reason: None,
            error: None,
        })
    }

    fn deterministic(&self, request: &OptimizeRequest) -> Option<Selection> {
        select_max_output(&request.routes)
            .map(|(index, route)| Selection::indexed(route.clone(), index))
    }

    async fn remote_scoring(
        &self,
        scorer: &dyn RouteScorer,
        attempt: &mut Attempt<'_>,
    ) -> Option<Selection> {
        let request = attempt.request;
        let prompt = scorer::build_prompt(&request.routes);

        let body = match scorer.score(&prompt).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Remote scoring failed: {}", e);
                attempt.remote = Some(RemoteOutcome::CallFailed(e.to_string()));
                return None;
            }
        };

        let choice = match scorer::parse_scoring_output(&body) {
            Some(choice) if Self::is_usable(&choice.best, request) => choice,
            _ => {
                warn!("Remote scoring returned no usable route");
                attempt.remote = Some(RemoteOutcome::Unparseable);
                return None;
            }
        };

        let choice_index = choice.choice_index.filter(|index| {
            let in_range = *index < request.routes.len();
            if !in_range {
                debug!("Ignoring out-of-range choice index {}", index);
            }
            in_range
        });

        Some(Selection {
            best: choice.best,
            choice_index,
            reason: choice.rationale,
            error: None,
        })
    }

    fn error_fallback(&self, request: &OptimizeRequest, message: &str) -> Option<Selection> {
        if let Some((index, route)) = select_max_output(&request.routes) {
            debug!(
                "Deterministic pick would have been {} at index {}; returning mock instead",
                route.id, index
            );
        }

        Some(Selection {
            best: mock_route(&request.from, &request.to, request.amount),
            choice_index: None,
            reason: None,
            error: Some(message.to_string()),
        })
    }

    /// A remote pick must connect the requested pair with a non-negative output
    fn is_usable(route: &Route, request: &OptimizeRequest) -> bool {
        route.matches_pair(&request.from, &request.to) && !route.estimated_out.is_sign_negative()
    }
}
