//! Domain models
//!
//! Plain data structures, no axum/tokio dependencies

pub mod hosting;
pub mod ssl;

// Re-exports for convenience
pub use hosting::{Database, Hosting, HostingStatus, SuspendKind, SuspendReason};
pub use ssl::{CertProvider, DomainType, SslCertificate, SslStatus};
