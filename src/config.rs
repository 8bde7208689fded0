use crate::types::{Result, SwapError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_QUOTE_API: &str = "https://test-api.saucerswap.finance";

/// Quoting service settings
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Base URL of the quoting service; `None` disables live quotes
    pub api_url: Option<String>,

    pub api_key: Option<String>,

    pub timeout: Duration,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout: Duration::from_secs(8),
        }
    }
}

/// Remote scoring service settings
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    pub timeout: Duration,

    /// Token budget sent with every scoring prompt
    pub max_tokens: u32,
}

impl ScorerConfig {
    /// Remote scoring needs both an endpoint and a key
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout: Duration::from_secs(15),
            max_tokens: 400,
        }
    }
}

/// Ledger sink settings
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub operator_id: Option<String>,

    pub operator_key: Option<String>,

    /// Destination topic; `None` disables ledger logging
    pub topic_id: Option<String>,

    /// Topic relay base URL; when unset messages go to the local journal
    pub relay_url: Option<String>,

    pub journal_dir: PathBuf,

    pub timeout: Duration,
}

impl LedgerConfig {
    pub fn has_operator(&self) -> bool {
        self.operator_id.is_some() && self.operator_key.is_some()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            operator_id: None,
            operator_key: None,
            topic_id: None,
            relay_url: None,
            journal_dir: PathBuf::from("./ledger"),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Process configuration, read once and handed to each component
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub quote: QuoteConfig,

    pub scorer: ScorerConfig,

    pub ledger: LedgerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let quote = QuoteConfig {
            api_url: Some(var("SAUCER_TEST_API").unwrap_or_else(|| DEFAULT_QUOTE_API.to_string())),
            api_key: var("SAUCER_API_KEY"),
            timeout: Duration::from_secs(Self::parse_or(var("QUOTE_TIMEOUT_SECS"), "QUOTE_TIMEOUT_SECS", 8)?),
        };

        let scorer = ScorerConfig {
            endpoint: var("COMPUT3_API_ENDPOINT"),
            api_key: var("COMPUT3_API_KEY"),
            timeout: Duration::from_secs(Self::parse_or(
                var("COMPUT3_TIMEOUT_SECS"),
                "COMPUT3_TIMEOUT_SECS",
                15,
            )?),
            max_tokens: Self::parse_or(var("COMPUT3_MAX_TOKENS"), "COMPUT3_MAX_TOKENS", 400)?,
        };

        let ledger = LedgerConfig {
            operator_id: var("HEDERA_OPERATOR_ID"),
            operator_key: var("HEDERA_OPERATOR_KEY"),
            topic_id: var("HEDERA_TOPIC_ID"),
            relay_url: var("LEDGER_RELAY_URL"),
            journal_dir: var("LEDGER_JOURNAL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./ledger")),
            timeout: Duration::from_secs(Self::parse_or(
                var("LEDGER_TIMEOUT_SECS"),
                "LEDGER_TIMEOUT_SECS",
                10,
            )?),
        };

        Ok(Self { quote, scorer, ledger })
    }

    fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
        match value {
            Some(raw) => raw
                .parse()
                .map_err(|_| SwapError::ConfigError(format!("Invalid {}: {}", key, raw))),
            None => Ok(default),
        }
    }
}
