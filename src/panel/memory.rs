//! In-memory panel adapter
//!
//! Backs tests and the `memory` adapter mode with a deterministic fake of the
//! remote panel: accounts, databases, installed certificates, plus switches to
//! simulate login and call failures.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;

use super::{PanelConnector, PanelError, PanelLogin, PanelSession};

#[derive(Default)]
struct MemoryAccount {
    password: String,
    #[allow(dead_code)]
    domain: String,
    suspended: bool,
    databases: BTreeSet<String>,
    /// domain -> (private key, certificate)
    certificates: HashMap<String, (String, String)>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, MemoryAccount>,
    /// Operations forced to fail, by method name
    failing_ops: HashSet<String>,
    fail_logins: bool,
    /// Every remote call in invocation order, for assertions
    call_log: Vec<String>,
}

/// Connector handing out sessions over shared in-memory panel state
pub struct MemoryPanelConnector {
    inner: Arc<Mutex<Inner>>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryPanelConnector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed an existing remote account
    pub fn seed_account(&self, username: &str, password: &str, domain: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.accounts.insert(
            username.to_string(),
            MemoryAccount {
                password: password.to_string(),
                domain: domain.to_string(),
                ..Default::default()
            },
        );
    }

    /// Replace an account's remote database list
    pub fn set_databases(&self, username: &str, names: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(username) {
            account.databases = names.iter().map(|n| n.to_string()).collect();
        }
    }

    pub fn databases(&self, username: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(username)
            .map(|a| a.databases.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_suspended(&self, username: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.accounts.get(username).map_or(false, |a| a.suspended)
    }

    pub fn has_account(&self, username: &str) -> bool {
        self.inner.lock().unwrap().accounts.contains_key(username)
    }

    pub fn installed_certificate_domains(&self, username: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(username)
            .map(|a| a.certificates.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Force an operation to fail until cleared
    pub fn set_failing(&self, op: &str, failing: bool) {
        let mut inner = self.inner.lock().unwrap();
        if failing {
            inner.failing_ops.insert(op.to_string());
        } else {
            inner.failing_ops.remove(op);
        }
    }

    /// Make every login attempt fail
    pub fn set_fail_logins(&self, fail: bool) {
        self.inner.lock().unwrap().fail_logins = fail;
    }

    /// Count of calls to a given operation
    pub fn call_count(&self, op: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.call_log.iter().filter(|c| c.as_str() == op).count()
    }

    /// Sessions currently open (opened, not yet closed)
    pub fn open_session_count(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

impl Default for MemoryPanelConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PanelConnector for MemoryPanelConnector {
    async fn open(&self, login: PanelLogin<'_>) -> Result<Box<dyn PanelSession>, PanelError> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.fail_logins {
                return Err(PanelError::LoginFailed("simulated login failure".into()));
            }
            if let PanelLogin::Account { username, password } = login {
                match inner.accounts.get(username) {
                    Some(account) if account.password == password => {}
                    Some(_) => {
                        return Err(PanelError::LoginFailed(format!(
                            "bad credentials for {}",
                            username
                        )))
                    }
                    None => return Err(PanelError::AccountNotFound(username.to_string())),
                }
            }
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        let scope = match login {
            PanelLogin::Reseller => None,
            PanelLogin::Account { username, .. } => Some(username.to_string()),
        };
        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
            open_sessions: self.open_sessions.clone(),
            scope,
        }))
    }
}

struct MemorySession {
    inner: Arc<Mutex<Inner>>,
    open_sessions: Arc<AtomicUsize>,
    /// Account username for account-scoped sessions
    scope: Option<String>,
}

impl MemorySession {
    fn record(&self, op: &str) -> Result<(), PanelError> {
        let mut inner = self.inner.lock().unwrap();
        inner.call_log.push(op.to_string());
        if inner.failing_ops.contains(op) {
            return Err(PanelError::CallFailed(format!("simulated {} failure", op)));
        }
        Ok(())
    }

    fn account_scope(&self) -> Result<String, PanelError> {
        self.scope
            .clone()
            .ok_or_else(|| PanelError::CallFailed("operation requires an account session".into()))
    }
}

#[async_trait]
impl PanelSession for MemorySession {
    async fn create_account(
        &mut self,
        username: &str,
        password: &str,
        domain: &str,
        _package: &str,
    ) -> Result<(), PanelError> {
        self.record("create_account")?;
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.contains_key(username) {
            return Err(PanelError::CallFailed(format!(
                "account {} already exists",
                username
            )));
        }
        inner.accounts.insert(
            username.to_string(),
            MemoryAccount {
                password: password.to_string(),
                domain: domain.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn suspend_account(&mut self, username: &str) -> Result<(), PanelError> {
        self.record("suspend_account")?;
        let mut inner = self.inner.lock().unwrap();
        match inner.accounts.get_mut(username) {
            Some(account) => {
                account.suspended = true;
                Ok(())
            }
            None => Err(PanelError::AccountNotFound(username.to_string())),
        }
    }

    async fn unsuspend_account(&mut self, username: &str) -> Result<(), PanelError> {
        self.record("unsuspend_account")?;
        let mut inner = self.inner.lock().unwrap();
        match inner.accounts.get_mut(username) {
            Some(account) => {
                account.suspended = false;
                Ok(())
            }
            None => Err(PanelError::AccountNotFound(username.to_string())),
        }
    }

    async fn delete_account(&mut self, username: &str) -> Result<(), PanelError> {
        self.record("delete_account")?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .accounts
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| PanelError::AccountNotFound(username.to_string()))
    }

    async fn list_databases(&mut self) -> Result<Vec<String>, PanelError> {
        self.record("list_databases")?;
        let username = self.account_scope()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .accounts
            .get(&username)
            .map(|a| a.databases.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_database(&mut self, name: &str) -> Result<(), PanelError> {
        self.record("create_database")?;
        let username = self.account_scope()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(&username) {
            account.databases.insert(name.to_string());
        }
        Ok(())
    }

    async fn drop_database(&mut self, name: &str) -> Result<(), PanelError> {
        self.record("drop_database")?;
        let username = self.account_scope()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(&username) {
            account.databases.remove(name);
        }
        Ok(())
    }

    async fn upload_certificate(
        &mut self,
        domain: &str,
        private_key: &str,
        certificate: &str,
        _ca_bundle: Option<&str>,
    ) -> Result<(), PanelError> {
        self.record("upload_certificate")?;
        let username = self.account_scope()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(&username) {
            account.certificates.insert(
                domain.to_string(),
                (private_key.to_string(), certificate.to_string()),
            );
        }
        Ok(())
    }

    async fn remove_certificate(&mut self, domain: &str) -> Result<(), PanelError> {
        self.record("remove_certificate")?;
        let username = self.account_scope()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(&username) {
            account.certificates.remove(domain);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), PanelError> {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
