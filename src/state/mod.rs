//! Runtime state
//!
//! Application state, record stores, and issuance log buffers

pub mod app_state;
pub mod hosting_store;
pub mod issue_log;
pub mod ssl_store;

pub use app_state::{get_shutdown_token, trigger_shutdown, AppState, OpKey};
pub use hosting_store::{HostingStore, TransitionError};
pub use issue_log::{IssueLog, IssueProgress, ProgressLine};
pub use ssl_store::{SslStore, SslTransitionError};
