//! External reseller-panel session contract
//!
//! Every remote panel operation runs through a short-lived authenticated
//! session that must be explicitly closed on every exit path. The pipeline
//! never touches HTTP or cookies directly, only this interface.

pub mod http;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub use http::HttpPanelConnector;
pub use memory::MemoryPanelConnector;

/// Panel adapter errors
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("panel login failed: {0}")]
    LoginFailed(String),
    #[error("panel call failed: {0}")]
    CallFailed(String),
    #[error("remote account not found: {0}")]
    AccountNotFound(String),
    #[error("panel transport error: {0}")]
    Transport(String),
}

/// Who a session is opened as
#[derive(Clone, Copy, Debug)]
pub enum PanelLogin<'a> {
    /// Reseller credentials from configuration; account-management scope
    Reseller,
    /// A hosting account's own credentials; feature-operation scope
    Account {
        username: &'a str,
        password: &'a str,
    },
}

/// One authenticated panel session
///
/// Methods mirror the remote panel's operations. Which subset a remote login
/// may actually perform depends on its scope; adapters surface scope misuse as
/// `CallFailed`.
#[async_trait]
pub trait PanelSession: Send + Sync {
    // Account management (reseller scope)
    async fn create_account(
        &mut self,
        username: &str,
        password: &str,
        domain: &str,
        package: &str,
    ) -> Result<(), PanelError>;
    async fn suspend_account(&mut self, username: &str) -> Result<(), PanelError>;
    async fn unsuspend_account(&mut self, username: &str) -> Result<(), PanelError>;
    async fn delete_account(&mut self, username: &str) -> Result<(), PanelError>;

    // Feature operations (account scope)
    async fn list_databases(&mut self) -> Result<Vec<String>, PanelError>;
    async fn create_database(&mut self, name: &str) -> Result<(), PanelError>;
    async fn drop_database(&mut self, name: &str) -> Result<(), PanelError>;
    async fn upload_certificate(
        &mut self,
        domain: &str,
        private_key: &str,
        certificate: &str,
        ca_bundle: Option<&str>,
    ) -> Result<(), PanelError>;
    async fn remove_certificate(&mut self, domain: &str) -> Result<(), PanelError>;

    /// Log out. Consumes the session; failure to close is logged, not fatal.
    async fn close(self: Box<Self>) -> Result<(), PanelError>;
}

/// Opens sessions against the panel
#[async_trait]
pub trait PanelConnector: Send + Sync {
    async fn open(&self, login: PanelLogin<'_>) -> Result<Box<dyn PanelSession>, PanelError>;
}

/// Boxed future returned by session closures
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PanelError>> + Send + 'a>>;

/// Scoped session acquisition: open, run a bounded sequence of calls, and log
/// out on every exit path including errors.
pub async fn with_session<T>(
    connector: &Arc<dyn PanelConnector>,
    login: PanelLogin<'_>,
    op: impl for<'a> FnOnce(&'a mut dyn PanelSession) -> SessionFuture<'a, T>,
) -> Result<T, PanelError> {
    let mut session = connector.open(login).await?;
    let result = op(session.as_mut()).await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "Panel session logout failed");
    }
    result
}
