//! Environment variable configuration loading

use std::env;

/// Which adapter set to wire in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterMode {
    /// Talk to the real remote systems over HTTP
    Live,
    /// In-memory fakes, for local development and tests
    Memory,
}

impl AdapterMode {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("memory") {
            AdapterMode::Memory
        } else {
            AdapterMode::Live
        }
    }
}

/// Environment configuration
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// API key guarding mutating endpoints
    pub api_key: String,
    /// Listen port
    pub port: u16,
    /// Reseller panel base URL
    pub panel_base_url: String,
    /// Reseller credentials for account-management sessions
    pub reseller_username: String,
    pub reseller_password: String,
    /// Panel adapter selection
    pub panel_mode: AdapterMode,
    /// Certificate provider API base URL
    pub ca_base_url: String,
    pub ca_api_token: Option<String>,
    /// CA adapter selection
    pub ca_mode: AdapterMode,
    /// Notification webhook target; None disables notifications
    pub notify_url: Option<String>,
    /// Seconds an intermediate status may sit untouched before the sweep acts
    pub stale_op_timeout_secs: u64,
    /// Sweep cadence
    pub sweep_interval_secs: u64,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let api_key = env::var("PROVISION_AGENT_API_KEY")
            .unwrap_or_else(|_| "change-me-in-production".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9310);

        let panel_base_url =
            env::var("PANEL_BASE_URL").unwrap_or_else(|_| "https://panel.example.net".to_string());
        let reseller_username = env::var("PANEL_RESELLER_USER").unwrap_or_default();
        let reseller_password = env::var("PANEL_RESELLER_PASSWORD").unwrap_or_default();
        let panel_mode = env::var("PANEL_MODE")
            .map(|v| AdapterMode::parse(&v))
            .unwrap_or(AdapterMode::Live);

        let ca_base_url =
            env::var("CA_BASE_URL").unwrap_or_else(|_| "https://ca.example.net".to_string());
        let ca_api_token = env::var("CA_API_TOKEN").ok().filter(|s| !s.is_empty());
        let ca_mode = env::var("CA_MODE")
            .map(|v| AdapterMode::parse(&v))
            .unwrap_or(AdapterMode::Live);

        let notify_url = env::var("NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.is_empty());

        let stale_op_timeout_secs = env::var("STALE_OP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(constants::STALE_OP_TIMEOUT_SECS);

        let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(constants::SWEEP_INTERVAL_SECS);

        Self {
            api_key,
            port,
            panel_base_url,
            reseller_username,
            reseller_password,
            panel_mode,
            ca_base_url,
            ca_api_token,
            ca_mode,
            notify_url,
            stale_op_timeout_secs,
            sweep_interval_secs,
        }
    }

    /// Config suitable for tests: memory adapters, no webhook
    pub fn for_tests() -> Self {
        Self {
            api_key: "test-key".to_string(),
            port: 0,
            panel_base_url: String::new(),
            reseller_username: "reseller".to_string(),
            reseller_password: "reseller-pass".to_string(),
            panel_mode: AdapterMode::Memory,
            ca_base_url: String::new(),
            ca_api_token: None,
            ca_mode: AdapterMode::Memory,
            notify_url: None,
            stale_op_timeout_secs: constants::STALE_OP_TIMEOUT_SECS,
            sweep_interval_secs: constants::SWEEP_INTERVAL_SECS,
        }
    }
}

/// Constants
pub mod constants {
    use std::time::Duration;

    /// Floor polling interval; clients and internal pollers never go below this
    pub const POLL_FLOOR: Duration = Duration::from_secs(3);

    /// Issuance progress log lines kept per certificate (most recent first out)
    pub const ISSUE_LOG_CAPACITY: usize = 200;

    /// Intermediate statuses older than this with no running operation are
    /// re-driven or failed by the sweep
    pub const STALE_OP_TIMEOUT_SECS: u64 = 900;

    /// Sweep cadence
    pub const SWEEP_INTERVAL_SECS: u64 = 60;

    /// Attempts for webhook notification delivery
    pub const NOTIFY_ATTEMPTS: u32 = 3;

    /// Certificate validity assumed when the provider omits an expiry
    pub const DEFAULT_CERT_VALIDITY_DAYS: i64 = 90;

    /// Version
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_mode_parse() {
        assert_eq!(AdapterMode::parse("memory"), AdapterMode::Memory);
        assert_eq!(AdapterMode::parse("Memory"), AdapterMode::Memory);
        assert_eq!(AdapterMode::parse("live"), AdapterMode::Live);
        assert_eq!(AdapterMode::parse("anything-else"), AdapterMode::Live);
    }

    #[test]
    fn test_test_config_uses_memory_adapters() {
        let cfg = EnvConfig::for_tests();
        assert_eq!(cfg.panel_mode, AdapterMode::Memory);
        assert_eq!(cfg.ca_mode, AdapterMode::Memory);
        assert!(cfg.notify_url.is_none());
    }
}
