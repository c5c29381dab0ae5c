//! Lifecycle and pipeline services

pub mod hosting;
pub mod notify;
pub mod poller;
pub mod ssl;
pub mod sweep;

pub use notify::{Notifier, NotifyEvent, WebhookNotifier};
pub use poller::StatusPoller;
