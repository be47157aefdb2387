//! Transaction-line records
//!
//! Every deposit the pipeline acts on and every fill it broadcasts is written
//! as a [`TxLine`] keyed by transaction hash. A fill line points back at its
//! deposit through `related_tx_hash`. Status starts at `pending` and is
//! flipped once the receipt is known.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethereum_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLine {
    pub tx_hash: H256,
    pub chain_id: u64,
    pub kind: TxKind,
    pub from: H160,
    pub to: H160,
    pub token: H160,
    pub amount: U256,
    pub status: TxStatus,
    /// For fills, the deposit transaction this pays out
    pub related_tx_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait TxLineStore: Send + Sync {
    async fn append(&self, line: TxLine) -> Result<(), RelayError>;
    async fn mark_confirmed(&self, tx_hash: H256) -> Result<(), RelayError>;
    async fn mark_failed(&self, tx_hash: H256, reason: &str) -> Result<(), RelayError>;
}

// ============================================================================
// JSON LINES FILE
// ============================================================================

/// One journal entry; status changes are appended, never rewritten in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JournalEntry {
    Line(TxLine),
    Status {
        tx_hash: H256,
        status: TxStatus,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Append-only JSON lines journal.
pub struct JsonlTxLineStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTxLineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_entry(&self, entry: &JournalEntry) -> Result<(), RelayError> {
        let mut line = serde_json::to_string(entry).map_err(|e| RelayError::Persistence(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RelayError::Persistence(format!("create {}: {}", parent.display(), e)))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| RelayError::Persistence(format!("open {}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| RelayError::Persistence(format!("write {}: {}", self.path.display(), e)))?;
        file.flush().await.map_err(|e| RelayError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn write_status(&self, tx_hash: H256, status: TxStatus, reason: Option<String>) -> Result<(), RelayError> {
        self.write_entry(&JournalEntry::Status { tx_hash, status, reason, timestamp: Utc::now() })
            .await
    }

    /// Replays the journal into the current state of every line, in first-seen order.
    pub async fn load(&self) -> Result<Vec<TxLine>, RelayError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RelayError::Persistence(format!("read {}: {}", self.path.display(), e))),
        };

        let mut lines: Vec<TxLine> = Vec::new();
        let mut index: HashMap<H256, usize> = HashMap::new();
        for (number, raw) in content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            let entry: JournalEntry = serde_json::from_str(raw)
                .map_err(|e| RelayError::Persistence(format!("{}:{}: {}", self.path.display(), number + 1, e)))?;
            match entry {
                JournalEntry::Line(line) => {
                    index.insert(line.tx_hash, lines.len());
                    lines.push(line);
                }
                JournalEntry::Status { tx_hash, status, reason, .. } => {
                    if let Some(&i) = index.get(&tx_hash) {
                        lines[i].status = status;
                        lines[i].failure_reason = reason;
                    }
                }
            }
        }
        Ok(lines)
    }
}

#[async_trait]
impl TxLineStore for JsonlTxLineStore {
    async fn append(&self, line: TxLine) -> Result<(), RelayError> {
        debug!("Recording {:?} {:?} on chain {}", line.kind, line.tx_hash, line.chain_id);
        self.write_entry(&JournalEntry::Line(line)).await
    }

    async fn mark_confirmed(&self, tx_hash: H256) -> Result<(), RelayError> {
        self.write_status(tx_hash, TxStatus::Confirmed, None).await
    }

    async fn mark_failed(&self, tx_hash: H256, reason: &str) -> Result<(), RelayError> {
        self.write_status(tx_hash, TxStatus::Failed, Some(reason.to_string())).await
    }
}

// ============================================================================
// IN MEMORY
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryTxLineStore {
    lines: Mutex<Vec<TxLine>>,
}

impl MemoryTxLineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lines(&self) -> Vec<TxLine> {
        self.lines.lock().await.clone()
    }

    pub async fn find(&self, tx_hash: H256) -> Option<TxLine> {
        self.lines.lock().await.iter().find(|l| l.tx_hash == tx_hash).cloned()
    }

    async fn set_status(&self, tx_hash: H256, status: TxStatus, reason: Option<String>) -> Result<(), RelayError> {
        let mut lines = self.lines.lock().await;
        let line = lines
            .iter_mut()
            .find(|l| l.tx_hash == tx_hash)
            .ok_or_else(|| RelayError::Persistence(format!("unknown transaction {:?}", tx_hash)))?;
        line.status = status;
        line.failure_reason = reason;
        Ok(())
    }
}

#[async_trait]
impl TxLineStore for MemoryTxLineStore {
    async fn append(&self, line: TxLine) -> Result<(), RelayError> {
        self.lines.lock().await.push(line);
        Ok(())
    }

    async fn mark_confirmed(&self, tx_hash: H256) -> Result<(), RelayError> {
        self.set_status(tx_hash, TxStatus::Confirmed, None).await
    }

    async fn mark_failed(&self, tx_hash: H256, reason: &str) -> Result<(), RelayError> {
        self.set_status(tx_hash, TxStatus::Failed, Some(reason.to_string())).await
    }
}
