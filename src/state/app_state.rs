//! Application state

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Global shutdown token for graceful termination of background tasks
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// Get the global shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN.get_or_init(CancellationToken::new).clone()
}

/// Trigger global shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

use crate::ca::{CertAuthority, HttpCertAuthority, MemoryCertAuthority};
use crate::config::{AdapterMode, EnvConfig};
use crate::dns::{DnsResolver, HickoryDns, MemoryDns};
use crate::panel::{HttpPanelConnector, MemoryPanelConnector, PanelConnector};
use crate::services::notify::{Notifier, WebhookNotifier};

use super::hosting_store::HostingStore;
use super::issue_log::IssueLog;
use super::ssl_store::SslStore;

/// Key identifying one in-flight lifecycle operation
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum OpKey {
    Hosting(i64),
    Ssl(i64),
}

/// A registered in-flight operation
pub struct RunningOp {
    pub started_at: DateTime<Utc>,
    pub cancel_token: CancellationToken,
}

/// Application state
pub struct AppState {
    /// API key guarding mutating endpoints
    pub api_key: String,
    /// Environment configuration
    pub config: EnvConfig,
    /// Service start time
    pub started_at: DateTime<Utc>,

    // ---- records ----
    pub hostings: HostingStore,
    pub ssl: SslStore,
    /// Issuance progress buffers
    pub issue_log: Arc<IssueLog>,

    // ---- external collaborators ----
    pub panel: Arc<dyn PanelConnector>,
    pub ca: Arc<dyn CertAuthority>,
    pub dns: Arc<dyn DnsResolver>,
    pub notifier: Arc<dyn Notifier>,

    /// In-flight operations; a retry while its record sits in an intermediate
    /// state must not fire a duplicate remote mutation
    running_ops: RwLock<HashMap<OpKey, RunningOp>>,
}

impl AppState {
    /// Build state from environment configuration, wiring adapters by mode
    pub fn from_env(config: EnvConfig) -> Result<Arc<Self>, String> {
        let panel: Arc<dyn PanelConnector> = match config.panel_mode {
            AdapterMode::Live => Arc::new(HttpPanelConnector::new(
                config.panel_base_url.clone(),
                config.reseller_username.clone(),
                config.reseller_password.clone(),
            )),
            AdapterMode::Memory => Arc::new(MemoryPanelConnector::new()),
        };

        let ca: Arc<dyn CertAuthority> = match config.ca_mode {
            AdapterMode::Live => Arc::new(
                HttpCertAuthority::new(config.ca_base_url.clone(), config.ca_api_token.clone())
                    .map_err(|e| e.to_string())?,
            ),
            AdapterMode::Memory => Arc::new(MemoryCertAuthority::new()),
        };

        let dns: Arc<dyn DnsResolver> = match config.ca_mode {
            AdapterMode::Live => Arc::new(HickoryDns::new().map_err(|e| e.to_string())?),
            AdapterMode::Memory => Arc::new(MemoryDns::new()),
        };

        let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(config.notify_url.clone()));

        tracing::info!(
            port = config.port,
            panel_mode = ?config.panel_mode,
            ca_mode = ?config.ca_mode,
            notify = config.notify_url.is_some(),
            "Loaded configuration"
        );

        Ok(Arc::new(Self::with_adapters(config, panel, ca, dns, notifier)))
    }

    /// Build state with explicit adapters (tests, embedding)
    pub fn with_adapters(
        config: EnvConfig,
        panel: Arc<dyn PanelConnector>,
        ca: Arc<dyn CertAuthority>,
        dns: Arc<dyn DnsResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api_key: config.api_key.clone(),
            started_at: Utc::now(),
            hostings: HostingStore::new(),
            ssl: SslStore::new(),
            issue_log: Arc::new(IssueLog::new()),
            panel,
            ca,
            dns,
            notifier,
            running_ops: RwLock::new(HashMap::new()),
            config,
        }
    }

    // ---- in-flight operation registry ----

    /// Register an operation unless one is already running for the key
    pub async fn try_begin_op(&self, key: OpKey) -> Option<CancellationToken> {
        let mut ops = self.running_ops.write().await;
        if ops.contains_key(&key) {
            return None;
        }
        let token = CancellationToken::new();
        ops.insert(
            key,
            RunningOp {
                started_at: Utc::now(),
                cancel_token: token.clone(),
            },
        );
        Some(token)
    }

    /// Unregister a finished operation
    pub async fn end_op(&self, key: OpKey) {
        if let Some(op) = self.running_ops.write().await.remove(&key) {
            let elapsed = Utc::now() - op.started_at;
            tracing::debug!(key = ?key, elapsed_ms = elapsed.num_milliseconds(), "Operation finished");
        }
    }

    pub async fn op_in_flight(&self, key: OpKey) -> bool {
        self.running_ops.read().await.contains_key(&key)
    }

    pub async fn running_op_count(&self) -> usize {
        self.running_ops.read().await.len()
    }

    /// Signal every in-flight operation to stop (shutdown path)
    pub async fn cancel_running_ops(&self) {
        for op in self.running_ops.read().await.values() {
            op.cancel_token.cancel();
        }
    }
}
