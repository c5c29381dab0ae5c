//! Hosting account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hosting account status
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HostingStatus {
    Pending,
    Active,
    Suspending,
    Suspended,
    Reactivating,
    Deleted,
}

impl HostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostingStatus::Pending => "pending",
            HostingStatus::Active => "active",
            HostingStatus::Suspending => "suspending",
            HostingStatus::Suspended => "suspended",
            HostingStatus::Reactivating => "reactivating",
            HostingStatus::Deleted => "deleted",
        }
    }

    /// Whether an admin-initiated transition is currently running
    pub fn is_transitioning(&self) -> bool {
        matches!(self, HostingStatus::Suspending | HostingStatus::Reactivating)
    }

    /// No further automatic transition occurs from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, HostingStatus::Deleted)
    }

    /// Legal status edges; all stores reject anything else.
    pub fn can_transition(&self, to: HostingStatus) -> bool {
        use HostingStatus::*;
        matches!(
            (self, to),
            (Pending, Active)
                | (Active, Suspending)
                | (Suspending, Suspended)
                | (Suspended, Reactivating)
                | (Reactivating, Active)
                | (Active, Deleted)
                | (Suspended, Deleted)
        )
    }
}

/// Why a hosting was suspended
///
/// A tagged kind instead of a marker hidden inside free text, so the API can
/// distinguish admin suspensions without string sniffing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuspendKind {
    AdminSuspended,
    UserRequested,
    PolicyViolation,
}

/// Suspension reason: machine-readable kind plus a free-text note
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuspendReason {
    pub kind: SuspendKind,
    pub note: String,
}

impl SuspendReason {
    pub fn admin(note: impl Into<String>) -> Self {
        Self {
            kind: SuspendKind::AdminSuspended,
            note: note.into(),
        }
    }
}

/// Hosting account
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hosting {
    pub id: i64,
    /// Remote panel username, assigned at creation
    pub vp_username: String,
    /// Owning control-panel user
    pub user_id: i64,
    pub domain: String,
    pub package: String,
    pub status: HostingStatus,
    pub suspend_reason: Option<SuspendReason>,
    /// Remote panel credential. Required whenever the status is one that a
    /// remote session must drive out of (active/suspending/suspended/reactivating).
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Panel login approval flag; feature operations are refused without it
    pub panel_approved: bool,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Hosting {
    pub fn new(id: i64, user_id: i64, vp_username: String, domain: String, package: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            vp_username,
            user_id,
            domain,
            package,
            status: HostingStatus::Pending,
            suspend_reason: None,
            password: None,
            panel_approved: false,
            created_at: now,
            activated_at: None,
            suspended_at: None,
            updated_at: now,
        }
    }
}

/// Database owned by a hosting account
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Short name as entered by the user
    pub name: String,
    /// Remote name, `{vp_username}_{name}`
    pub full_name: String,
}

impl Database {
    pub fn new(vp_username: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        let full_name = format!("{}_{}", vp_username, name);
        Self { name, full_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_edges() {
        use HostingStatus::*;
        assert!(Pending.can_transition(Active));
        assert!(Active.can_transition(Suspending));
        assert!(Suspending.can_transition(Suspended));
        assert!(Suspended.can_transition(Reactivating));
        assert!(Reactivating.can_transition(Active));
        assert!(Active.can_transition(Deleted));
        assert!(Suspended.can_transition(Deleted));
    }

    #[test]
    fn test_illegal_edges() {
        use HostingStatus::*;
        // No shortcut past the intermediate states.
        assert!(!Pending.can_transition(Suspended));
        assert!(!Active.can_transition(Suspended));
        assert!(!Suspended.can_transition(Active));
        assert!(!Suspending.can_transition(Active));
        assert!(!Deleted.can_transition(Active));
        assert!(!Pending.can_transition(Deleted));
    }

    #[test]
    fn test_transitioning_statuses() {
        assert!(HostingStatus::Suspending.is_transitioning());
        assert!(HostingStatus::Reactivating.is_transitioning());
        assert!(!HostingStatus::Active.is_transitioning());
        assert!(!HostingStatus::Suspended.is_transitioning());
    }

    #[test]
    fn test_database_full_name() {
        let db = Database::new("vp_a1b2c3", "shop");
        assert_eq!(db.full_name, "vp_a1b2c3_shop");
    }

    #[test]
    fn test_new_hosting_is_pending() {
        let h = Hosting::new(1, 7, "vp_x".into(), "example.com".into(), "starter".into());
        assert_eq!(h.status, HostingStatus::Pending);
        assert!(h.password.is_none());
        assert!(!h.panel_approved);
    }
}
