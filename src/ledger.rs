use crate::config::LedgerConfig;
use crate::types::{LogEntry, Result, SwapError};
use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Acknowledgement from a ledger sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkReceipt {
    pub status: String,
    pub transaction_id: String,
}

/// Append-only destination for action records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Append one message to a topic
    async fn submit(&self, topic_id: &str, message: &str) -> Result<SinkReceipt>;
}

/// Submits messages through an HTTP topic relay that signs for the operator
pub struct HttpTopicSink {
    client: Client,
    base_url: String,
    operator_id: String,
    operator_key: String,
}

impl HttpTopicSink {
    pub fn new(base_url: &str, operator_id: &str, operator_key: &str, config: &LedgerConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            operator_id: operator_id.to_string(),
            operator_key: operator_key.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(alias = "txId")]
    transaction_id: String,
}

#[async_trait]
impl LedgerSink for HttpTopicSink {
    async fn submit(&self, topic_id: &str, message: &str) -> Result<SinkReceipt> {
        let url = format!("{}/topics/{}/messages", self.base_url, topic_id);
        debug!("Submitting ledger message to {}", url);

        let response: RelayResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.operator_key)
            .json(&json!({ "operatorId": self.operator_id, "message": message }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| SwapError::Ledger(format!("Malformed relay response: {}", e)))?;

        Ok(SinkReceipt {
            status: response.status.unwrap_or_else(|| "SUCCESS".to_string()),
            transaction_id: response.transaction_id,
        })
    }
}

/// One line of a journal file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRecord {
    pub transaction_id: String,
    pub topic_id: String,
    pub message: String,
    pub consensus_timestamp: String,
}

/// Appends messages as JSON lines to `<dir>/<topic>.jsonl`
pub struct JournalSink {
    dir: PathBuf,
    operator_id: String,
}

impl JournalSink {
    pub fn new(dir: impl Into<PathBuf>, operator_id: &str) -> Self {
        Self {
            dir: dir.into(),
            operator_id: operator_id.to_string(),
        }
    }

    /// Journal file for a topic; path separators in the id are replaced
    pub fn topic_path(&self, topic_id: &str) -> PathBuf {
        let file_name: String = topic_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.jsonl", file_name))
    }

    /// Read back every record written to a topic
    pub fn read_topic(&self, topic_id: &str) -> Result<Vec<JournalRecord>> {
        let path = self.topic_path(topic_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| SwapError::Ledger(format!("Failed to read journal: {}", e)))?;

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| SwapError::Ledger(format!("Failed to parse journal: {}", e)))
            })
            .collect()
    }
}

#[async_trait]
impl LedgerSink for JournalSink {
    async fn submit(&self, topic_id: &str, message: &str) -> Result<SinkReceipt> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SwapError::Ledger(format!("Failed to create journal directory: {}", e)))?;

        let now = Utc::now();
        let transaction_id = format!(
            "{}@{}.{:09}",
            self.operator_id,
            now.timestamp(),
            now.timestamp_subsec_nanos()
        );

        let record = JournalRecord {
            transaction_id: transaction_id.clone(),
            topic_id: topic_id.to_string(),
            message: message.to_string(),
            consensus_timestamp: now.to_rfc3339(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let path = self.topic_path(topic_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SwapError::Ledger(format!("Failed to open journal: {}", e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SwapError::Ledger(format!("Failed to write journal: {}", e)))?;

        debug!("Journaled {} to {}", transaction_id, path.display());
        Ok(SinkReceipt {
            status: "SUCCESS".to_string(),
            transaction_id,
        })
    }
}

/// Best-effort action recorder; never returns an error
pub struct ActionLogger {
    topic_id: Option<String>,
    sink: Option<Arc<dyn LedgerSink>>,
}

impl ActionLogger {
    pub fn new(topic_id: Option<String>, sink: Option<Arc<dyn LedgerSink>>) -> Self {
        Self { topic_id, sink }
    }

    /// Logger that acknowledges every record with `no-topic`
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Relay URL selects the HTTP sink, otherwise the local journal.
    /// Missing operator credentials leave the sink unset.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let sink: Option<Arc<dyn LedgerSink>> = match (&config.operator_id, &config.operator_key) {
            (Some(id), Some(key)) => match &config.relay_url {
                Some(url) => Some(Arc::new(HttpTopicSink::new(url, id, key, config)?)),
                None => Some(Arc::new(JournalSink::new(config.journal_dir.clone(), id))),
            },
            _ => None,
        };

        Ok(Self::new(config.topic_id.clone(), sink))
    }

    pub fn is_enabled(&self) -> bool {
        self.topic_id.is_some()
    }

    pub async fn record(&self, action: &str, payload: Value) -> LogEntry {
        let timestamp = Utc::now();

        let topic_id = match &self.topic_id {
            Some(topic_id) => topic_id,
            None => {
                debug!("No ledger topic configured, skipping {}", action);
                return LogEntry {
                    action: action.to_string(),
                    payload,
                    status: LogEntry::STATUS_NO_TOPIC.to_string(),
                    tx_id: None,
                    error: None,
                    timestamp,
                };
            }
        };

        let result = match &self.sink {
            Some(sink) => {
                let message = json!({
                    "action": action,
                    "payload": &payload,
                    "timestamp": timestamp,
                })
                .to_string();
                sink.submit(topic_id, &message).await
            }
            None => Err(SwapError::Ledger(
                "Ledger operator credentials not set".to_string(),
            )),
        };

        match result {
            Ok(receipt) => {
                info!("Logged {} to topic {} as {}", action, topic_id, receipt.transaction_id);
                LogEntry {
                    action: action.to_string(),
                    payload,
                    status: receipt.status,
                    tx_id: Some(receipt.transaction_id),
                    error: None,
                    timestamp,
                }
            }
            Err(e) => {
                warn!("Failed to log {} to topic {}: {}", action, topic_id, e);
                LogEntry {
                    action: action.to_string(),
                    payload,
                    status: LogEntry::STATUS_ERROR.to_string(),
                    tx_id: None,
                    error: Some(e.to_string()),
                    timestamp,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn ledger_config(dir: &Path) -> LedgerConfig {
        LedgerConfig {
            operator_id: Some("0.0.1001".to_string()),
            operator_key: Some("operator-key".to_string()),
            topic_id: Some("0.0.5005".to_string()),
            relay_url: None,
            journal_dir: dir.to_path_buf(),
            ..LedgerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_topic_is_noop() {
        let logger = ActionLogger::disabled();
        let entry = logger.record("execute_swap", json!({"x": 1})).await;
        assert_eq!(entry.status, "no-topic");
        assert_eq!(entry.payload, json!({"x": 1}));
        assert!(entry.tx_id.is_none());
        assert!(!logger.is_enabled());
    }

    #[tokio::test]
    async fn test_missing_operator_is_error_entry() {
        let config = LedgerConfig {
            topic_id: Some("0.0.5005".to_string()),
            ..LedgerConfig::default()
        };
        let logger = ActionLogger::from_config(&config).unwrap();
        let entry = logger.record("execute_swap", json!({})).await;
        assert!(entry.is_error());
        assert!(entry.error.unwrap().contains("credentials"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_error_entry() {
        let mut sink = MockLedgerSink::new();
        sink.expect_submit()
            .times(1)
            .returning(|_, _| Err(SwapError::Ledger("topic deleted".to_string())));

        let logger = ActionLogger::new(Some("0.0.5005".to_string()), Some(Arc::new(sink)));
        let entry = logger.record("execute_swap", json!({})).await;
        assert_eq!(entry.status, "error");
        assert!(entry.error.unwrap().contains("topic deleted"));
    }

    #[tokio::test]
    async fn test_sink_receipt_is_returned() {
        let mut sink = MockLedgerSink::new();
        sink.expect_submit().returning(|topic, message| {
            assert_eq!(topic, "0.0.5005");
            let parsed: Value = serde_json::from_str(message).unwrap();
            assert_eq!(parsed["action"], "execute_swap");
            Ok(SinkReceipt {
                status: "SUCCESS".to_string(),
                transaction_id: "0.0.1001@1700000000.000000001".to_string(),
            })
        });

        let logger = ActionLogger::new(Some("0.0.5005".to_string()), Some(Arc::new(sink)));
        let entry = logger.record("execute_swap", json!({"amount": "10"})).await;
        assert_eq!(entry.status, "SUCCESS");
        assert_eq!(entry.tx_id.as_deref(), Some("0.0.1001@1700000000.000000001"));
    }

    #[tokio::test]
    async fn test_journal_sink_appends() {
        let dir = TempDir::new().unwrap();
        let logger = ActionLogger::from_config(&ledger_config(dir.path())).unwrap();

        let first = logger.record("execute_swap", json!({"n": 1})).await;
        let second = logger.record("execute_swap", json!({"n": 2})).await;
        assert_eq!(first.status, "SUCCESS");
        assert!(first.tx_id.unwrap().starts_with("0.0.1001@"));
        assert_eq!(second.status, "SUCCESS");

        let journal = JournalSink::new(dir.path(), "0.0.1001");
        let records = journal.read_topic("0.0.5005").unwrap();
        assert_eq!(records.len(), 2);
        let message: Value = serde_json::from_str(&records[1].message).unwrap();
        assert_eq!(message["payload"]["n"], 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_journal_sink_concurrent_submits() {
        let dir = TempDir::new().unwrap();
        let journal = JournalSink::new(dir.path().join("nested").join("ledger"), "0.0.1001");

        let messages: Vec<String> = (0..8).map(|n| json!({"n": n}).to_string()).collect();
        let receipts = futures::future::join_all(
            messages.iter().map(|m| journal.submit("0.0.5005", m)),
        )
        .await;
        assert!(receipts.iter().all(|r| r.as_ref().unwrap().status == "SUCCESS"));

        let records = journal.read_topic("0.0.5005").unwrap();
        assert_eq!(records.len(), 8);
        assert!(records.iter().all(|r| r.topic_id == "0.0.5005"));
    }

    #[tokio::test]
    async fn test_journal_sink_unwritable_dir() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let journal = JournalSink::new(&blocker, "0.0.1001");
        let result = journal.submit("0.0.5005", "{}").await;
        assert!(matches!(result, Err(SwapError::Ledger(_))));
    }

    #[test]
    fn test_journal_topic_path_is_flat() {
        let journal = JournalSink::new("/tmp/ledger", "0.0.1");
        assert_eq!(
            journal.topic_path("a/b"),
            PathBuf::from("/tmp/ledger/a_b.jsonl")
        );
        assert!(journal.read_topic("missing").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_sink_submits_to_relay() {
        let mut server = mockito::Server::new_async().await;
        let mocked = server
            .mock("POST", "/topics/0.0.5005/messages")
            .match_header("authorization", "Bearer operator-key")
            .match_body(mockito::Matcher::PartialJson(json!({"operatorId": "0.0.1001"})))
            .with_status(200)
            .with_body(r#"{"status":"SUCCESS","txId":"0.0.1001@1.2"}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            relay_url: Some(server.url()),
            ..ledger_config(dir.path())
        };
        let logger = ActionLogger::from_config(&config).unwrap();
        let entry = logger.record("execute_swap", json!({})).await;

        mocked.assert_async().await;
        assert_eq!(entry.tx_id.as_deref(), Some("0.0.1001@1.2"));
    }

    #[tokio::test]
    async fn test_http_sink_unreachable() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            relay_url: Some("http://127.0.0.1:1".to_string()),
            ..ledger_config(dir.path())
        };
        let logger = ActionLogger::from_config(&config).unwrap();
        let entry = logger.record("execute_swap", json!({})).await;
        assert!(entry.is_error());
    }
}
