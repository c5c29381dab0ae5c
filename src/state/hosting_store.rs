//! Hosting record store
//!
//! Owns every mutation of hosting records and their database children. Status
//! writes go through `transition`, which enforces the legal edge set under one
//! write lock so concurrent callers cannot race a record past a precondition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Database, Hosting, HostingStatus};

/// Illegal store mutations
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("record not found")]
    NotFound,
    #[error("expected status {expected:?}, found {actual:?}")]
    WrongState {
        expected: HostingStatus,
        actual: HostingStatus,
    },
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalEdge {
        from: HostingStatus,
        to: HostingStatus,
    },
}

/// Hosting store
pub struct HostingStore {
    hostings: RwLock<HashMap<i64, Hosting>>,
    databases: RwLock<HashMap<i64, Vec<Database>>>,
    next_id: AtomicI64,
}

impl HostingStore {
    pub fn new() -> Self {
        Self {
            hostings: RwLock::new(HashMap::new()),
            databases: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Create a hosting in Pending with a derived panel username
    pub async fn create(&self, user_id: i64, domain: String, package: String) -> Hosting {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let vp_username = derive_vp_username();
        let hosting = Hosting::new(id, user_id, vp_username, domain, package);
        self.hostings.write().await.insert(id, hosting.clone());
        hosting
    }

    pub async fn get(&self, id: i64) -> Option<Hosting> {
        self.hostings.read().await.get(&id).cloned()
    }

    pub async fn get_by_vp(&self, vp_username: &str) -> Option<Hosting> {
        self.hostings
            .read()
            .await
            .values()
            .find(|h| h.vp_username == vp_username)
            .cloned()
    }

    pub async fn all(&self) -> Vec<Hosting> {
        self.hostings.read().await.values().cloned().collect()
    }

    /// Mutate a record without touching its status
    pub async fn update(&self, id: i64, f: impl FnOnce(&mut Hosting)) -> Option<Hosting> {
        let mut hostings = self.hostings.write().await;
        let hosting = hostings.get_mut(&id)?;
        f(hosting);
        hosting.updated_at = Utc::now();
        Some(hosting.clone())
    }

    /// Atomically move a record along a legal edge
    ///
    /// `expect_from` pins the current status; a concurrent caller who got
    /// there first makes this fail with `WrongState` instead of double-firing.
    pub async fn transition(
        &self,
        id: i64,
        expect_from: HostingStatus,
        to: HostingStatus,
        mutate: impl FnOnce(&mut Hosting),
    ) -> Result<Hosting, TransitionError> {
        let mut hostings = self.hostings.write().await;
        let hosting = hostings.get_mut(&id).ok_or(TransitionError::NotFound)?;
        if hosting.status != expect_from {
            return Err(TransitionError::WrongState {
                expected: expect_from,
                actual: hosting.status,
            });
        }
        if !hosting.status.can_transition(to) {
            return Err(TransitionError::IllegalEdge {
                from: hosting.status,
                to,
            });
        }
        hosting.status = to;
        mutate(hosting);
        hosting.updated_at = Utc::now();
        Ok(hosting.clone())
    }

    // ---- database children ----

    pub async fn databases(&self, hosting_id: i64) -> Vec<Database> {
        self.databases
            .read()
            .await
            .get(&hosting_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn add_database(&self, hosting_id: i64, database: Database) {
        let mut map = self.databases.write().await;
        let list = map.entry(hosting_id).or_default();
        if !list.iter().any(|d| d.name == database.name) {
            list.push(database);
        }
    }

    pub async fn remove_database(&self, hosting_id: i64, name: &str) {
        if let Some(list) = self.databases.write().await.get_mut(&hosting_id) {
            list.retain(|d| d.name != name);
        }
    }
}

impl Default for HostingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn derive_vp_username() -> String {
    let tag = Uuid::new_v4().simple().to_string();
    format!("vp_{}", &tag[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_starts_pending() {
        let store = HostingStore::new();
        let h = store.create(1, "example.com".into(), "starter".into()).await;
        assert_eq!(h.status, HostingStatus::Pending);
        assert!(h.vp_username.starts_with("vp_"));
        assert_eq!(store.get(h.id).await.unwrap().id, h.id);
    }

    #[tokio::test]
    async fn test_transition_enforces_expected_state() {
        let store = HostingStore::new();
        let h = store.create(1, "example.com".into(), "starter".into()).await;

        // Pending record cannot be suspended directly.
        let err = store
            .transition(h.id, HostingStatus::Active, HostingStatus::Suspending, |_| {})
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransitionError::WrongState { .. }));
    }

    #[tokio::test]
    async fn test_transition_rejects_illegal_edge() {
        let store = HostingStore::new();
        let h = store.create(1, "example.com".into(), "starter".into()).await;

        let err = store
            .transition(h.id, HostingStatus::Pending, HostingStatus::Suspended, |_| {})
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransitionError::IllegalEdge { .. }));
    }

    #[tokio::test]
    async fn test_full_edge_walk() {
        let store = HostingStore::new();
        let h = store.create(1, "example.com".into(), "starter".into()).await;
        let id = h.id;

        store
            .transition(id, HostingStatus::Pending, HostingStatus::Active, |h| {
                h.password = Some("pw".into());
            })
            .await
            .unwrap();
        store
            .transition(id, HostingStatus::Active, HostingStatus::Suspending, |_| {})
            .await
            .unwrap();
        store
            .transition(id, HostingStatus::Suspending, HostingStatus::Suspended, |_| {})
            .await
            .unwrap();
        store
            .transition(id, HostingStatus::Suspended, HostingStatus::Reactivating, |_| {})
            .await
            .unwrap();
        let h = store
            .transition(id, HostingStatus::Reactivating, HostingStatus::Active, |_| {})
            .await
            .unwrap();
        assert_eq!(h.status, HostingStatus::Active);
    }

    #[tokio::test]
    async fn test_database_children() {
        let store = HostingStore::new();
        let h = store.create(1, "example.com".into(), "starter".into()).await;

        store
            .add_database(h.id, Database::new(&h.vp_username, "shop"))
            .await;
        // Duplicate adds are ignored.
        store
            .add_database(h.id, Database::new(&h.vp_username, "shop"))
            .await;
        assert_eq!(store.databases(h.id).await.len(), 1);

        store.remove_database(h.id, "shop").await;
        assert!(store.databases(h.id).await.is_empty());
    }
}
