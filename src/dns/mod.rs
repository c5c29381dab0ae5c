//! DNS TXT lookups for challenge verification
//!
//! The pipeline checks that the caller published the challenge token before
//! asking the CA to validate. Lookups go to public resolvers with caching
//! disabled so a freshly published record is seen as soon as it propagates.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};

/// DNS lookup errors
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("dns lookup failed: {0}")]
    Lookup(String),
}

/// TXT record resolver
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// All TXT values published under `name`; empty when none exist
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;
}

/// Live resolver querying public nameservers over UDP
pub struct HickoryDns {
    resolver: TokioResolver,
}

impl HickoryDns {
    pub fn new() -> Result<Self, DnsError> {
        let nameservers = [
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
        ];

        let mut config = ResolverConfig::new();
        for ip in nameservers {
            config.add_name_server(NameServerConfig::new(SocketAddr::new(ip, 53), Protocol::Udp));
        }

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 3;
        // Stale cached answers would make verification lie about propagation.
        opts.cache_size = 0;

        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolver for HickoryDns {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup.iter().map(|txt| txt.to_string()).collect()),
            Err(e) => {
                let message = e.to_string();
                // An empty name is an answer, not a lookup failure.
                if message.contains("no records found") {
                    Ok(Vec::new())
                } else {
                    Err(DnsError::Lookup(message))
                }
            }
        }
    }
}

/// In-memory zone for tests and the memory adapter mode
#[derive(Default)]
pub struct MemoryDns {
    records: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a TXT value under a name
    pub fn publish_txt(&self, name: &str, value: &str) {
        self.records
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn clear(&self, name: &str) {
        self.records.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl DnsResolver for MemoryDns {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_dns_publish_and_lookup() {
        let dns = MemoryDns::new();
        assert!(dns.lookup_txt("_acme-challenge.example.com").await.unwrap().is_empty());

        dns.publish_txt("_acme-challenge.example.com", "token-1");
        dns.publish_txt("_acme-challenge.example.com", "token-2");
        let values = dns.lookup_txt("_acme-challenge.example.com").await.unwrap();
        assert_eq!(values, vec!["token-1", "token-2"]);

        dns.clear("_acme-challenge.example.com");
        assert!(dns.lookup_txt("_acme-challenge.example.com").await.unwrap().is_empty());
    }
}
