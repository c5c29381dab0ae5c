//! Issuance progress log
//!
//! Bounded most-recent-N buffer of progress lines per certificate, polled by
//! clients while a record is Issuing. Transient by design; buffers are dropped
//! with their certificate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::ca::ProgressSink;
use crate::config::env::constants::ISSUE_LOG_CAPACITY;

/// One progress line
#[derive(Clone, Debug, Serialize)]
pub struct ProgressLine {
    pub at: DateTime<Utc>,
    pub line: String,
}

/// Progress log buffers, keyed by certificate id
pub struct IssueLog {
    buffers: RwLock<HashMap<i64, VecDeque<ProgressLine>>>,
    capacity: usize,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::with_capacity(ISSUE_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Append a line, evicting the oldest once the buffer is full
    pub async fn append(&self, cert_id: i64, line: impl Into<String>) {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(cert_id).or_default();
        buffer.push_back(ProgressLine {
            at: Utc::now(),
            line: line.into(),
        });
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    /// All retained lines, oldest first
    pub async fn lines(&self, cert_id: i64) -> Vec<ProgressLine> {
        self.buffers
            .read()
            .await
            .get(&cert_id)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a certificate's buffer
    pub async fn remove(&self, cert_id: i64) {
        self.buffers.write().await.remove(&cert_id);
    }
}

impl Default for IssueLog {
    fn default() -> Self {
        Self::new()
    }
}

/// `ProgressSink` adapter binding the shared log to one certificate
pub struct IssueProgress {
    log: Arc<IssueLog>,
    cert_id: i64,
}

impl IssueProgress {
    pub fn new(log: Arc<IssueLog>, cert_id: i64) -> Self {
        Self { log, cert_id }
    }
}

#[async_trait]
impl ProgressSink for IssueProgress {
    async fn append(&self, line: &str) {
        self.log.append(self.cert_id, line).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read() {
        let log = IssueLog::new();
        log.append(1, "first").await;
        log.append(1, "second").await;

        let lines = log.lines(1).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, "first");
        assert_eq!(lines[1].line, "second");
        assert!(log.lines(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let log = IssueLog::with_capacity(3);
        for i in 0..5 {
            log.append(1, format!("line-{}", i)).await;
        }
        let lines = log.lines(1).await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, "line-2");
        assert_eq!(lines[2].line, "line-4");
    }

    #[tokio::test]
    async fn test_remove_drops_buffer() {
        let log = IssueLog::new();
        log.append(7, "x").await;
        log.remove(7).await;
        assert!(log.lines(7).await.is_empty());
    }

    #[tokio::test]
    async fn test_progress_sink_adapter() {
        let log = Arc::new(IssueLog::new());
        let sink = IssueProgress::new(log.clone(), 42);
        use crate::ca::ProgressSink as _;
        sink.append("from the CA").await;
        assert_eq!(log.lines(42).await[0].line, "from the CA");
    }
}
