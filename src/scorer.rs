use crate::config::ScorerConfig;
use crate::types::{Result, Route, SwapError};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Remote reasoning service that ranks candidate routes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RouteScorer: Send + Sync {
    /// Send a prompt and return the raw response body
    async fn score(&self, prompt: &str) -> Result<Value>;
}

/// Scoring service reached over HTTP with a bearer credential
pub struct HttpScorer {
    client: Client,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
}

impl HttpScorer {
    pub fn new(config: &ScorerConfig) -> Result<Self> {
        let (endpoint, api_key) = match (&config.endpoint, &config.api_key) {
            (Some(endpoint), Some(key)) => (endpoint.clone(), key.clone()),
            _ => {
                return Err(SwapError::ConfigError(
                    "Scoring endpoint and key must both be set".to_string(),
                ))
            }
        };

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl RouteScorer for HttpScorer {
    async fn score(&self, prompt: &str) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "prompt": prompt, "max_tokens": self.max_tokens }))
            .send()
            .await?
            .error_for_status()?;

        // Free-text bodies are kept as strings for the parser to dig through
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// What the scoring service picked
#[derive(Debug, Clone)]
pub struct ScoringChoice {
    pub best: Route,
    pub choice_index: Option<usize>,
    pub rationale: Option<String>,
}

/// Prompt listing the candidates and the lexicographic priority order
pub fn build_prompt(routes: &[Route]) -> String {
    let routes_json = serde_json::to_string(routes).unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are a swap optimizer. Given candidate routes, pick the best route for the user,\n\
         prioritizing estimatedOut (higher better), then slippagePercent (lower better), \
         then feePercent (lower better).\n\
         Return JSON: {{\"choiceIndex\": <index>, \"best\": <route object>, \"rationale\": \"<reason>\"}}\n\
         \n\
         Routes: {}",
        routes_json
    )
}

/// Extract a choice from a scoring response body.
///
/// The payload lives under `output`, else `result`, else is the body itself.
/// String payloads are decoded as JSON directly, then by pulling out the
/// first brace-delimited object. Returns `None` when no decodable `best`
/// route is present.
pub fn parse_scoring_output(body: &Value) -> Option<ScoringChoice> {
    let output = ["output", "result"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find(|value| !value.is_null())
        .unwrap_or(body);

    let parsed = match output {
        Value::String(text) => decode_text(text)?,
        other => other.clone(),
    };

    let best_value = parsed.get("best").filter(|best| !best.is_null())?;
    let best: Route = match serde_json::from_value(best_value.clone()) {
        Ok(route) => route,
        Err(e) => {
            debug!("Scoring response has an undecodable best route: {}", e);
            return None;
        }
    };

    let choice_index = parsed
        .get("choiceIndex")
        .and_then(Value::as_u64)
        .map(|index| index as usize);

    let rationale = parsed
        .get("rationale")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    Some(ScoringChoice {
        best,
        choice_index,
        rationale,
    })
}

fn decode_text(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let candidate = JSON_OBJECT.find(text)?;
    serde_json::from_str(candidate.as_str()).ok()
}
