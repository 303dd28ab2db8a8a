//! Aggregated, file-loadable configuration for every engine. Each engine
//! crate's own `*Config` struct stays free of a `serde` dependency (it is
//! constructed programmatically by an embedding application, per
//! `ezk-session`'s `StunConfig::new()` convention); this module is the one
//! place a `libre`-level caller loads overrides from a TOML file and turns
//! them into the engine structs.

use serde::Deserialize;
use std::time::Duration;

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StunConfigToml {
    pub initial_rto_ms: u64,
    pub max_retransmits: u32,
    pub max_rto_ms: u64,
}

impl Default for StunConfigToml {
    fn default() -> Self {
        let d = libre_stun::TransactionConfig::stun_defaults();
        Self {
            initial_rto_ms: d.initial_rto.as_millis() as u64,
            max_retransmits: d.max_retransmits,
            max_rto_ms: d.max_rto.as_millis() as u64,
        }
    }
}

impl StunConfigToml {
    pub fn resolve(&self) -> libre_stun::TransactionConfig {
        libre_stun::TransactionConfig {
            initial_rto: millis(self.initial_rto_ms),
            max_retransmits: self.max_retransmits,
            max_rto: millis(self.max_rto_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IceConfigToml {
    pub rto_ms: u64,
    pub rc: u32,
}

impl Default for IceConfigToml {
    fn default() -> Self {
        let d = libre_ice::AgentConfig::new();
        Self { rto_ms: d.rto.as_millis() as u64, rc: d.rc }
    }
}

impl IceConfigToml {
    pub fn resolve(&self) -> libre_ice::AgentConfig {
        libre_ice::AgentConfig { nomination: libre_ice::Nomination::Regular, rto: millis(self.rto_ms), rc: self.rc }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfigToml {
    pub idle_timeout_secs: u64,
    pub accept_timeout_secs: u64,
    pub keepalive_response_timeout_secs: u64,
    pub reassembly_cap: usize,
}

impl Default for TransportConfigToml {
    fn default() -> Self {
        let d = libre_transport::ConnectionConfig::new();
        Self {
            idle_timeout_secs: d.idle_timeout.as_secs(),
            accept_timeout_secs: d.accept_timeout.as_secs(),
            keepalive_response_timeout_secs: d.keepalive_response_timeout.as_secs(),
            reassembly_cap: d.reassembly_cap,
        }
    }
}

impl TransportConfigToml {
    pub fn resolve(&self) -> libre_transport::ConnectionConfig {
        libre_transport::ConnectionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            accept_timeout: Duration::from_secs(self.accept_timeout_secs),
            keepalive_interval: None,
            keepalive_response_timeout: Duration::from_secs(self.keepalive_response_timeout_secs),
            reassembly_cap: self.reassembly_cap,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SipEventConfigToml {
    pub expires: u32,
    pub retry_on_failure: bool,
}

impl Default for SipEventConfigToml {
    fn default() -> Self {
        Self { expires: 3600, retry_on_failure: true }
    }
}

impl SipEventConfigToml {
    pub fn resolve(&self) -> libre_sip_event::SubscriptionConfig {
        libre_sip_event::SubscriptionConfig { expires: self.expires, retry_on_failure: self.retry_on_failure }
    }
}

/// Per-engine tunables, loadable from a TOML document (any table the caller
/// omits falls back to the RFC defaults each engine already carries).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LibreConfig {
    pub stun: StunConfigToml,
    pub ice: IceConfigToml,
    pub transport: TransportConfigToml,
    pub sip_event: SipEventConfigToml,
}

impl LibreConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, crate::Error> {
        toml::from_str(text).map_err(|e| crate::Error::msg(crate::ErrorKind::Config, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tables_fall_back_to_rfc_defaults() {
        let cfg = LibreConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.stun.resolve().max_retransmits, 7);
        assert_eq!(cfg.ice.resolve().rc, 7);
    }

    #[test]
    fn a_partial_override_only_changes_what_it_names() {
        let cfg = LibreConfig::from_toml_str("[stun]\nmax_retransmits = 3\n").unwrap();
        assert_eq!(cfg.stun.resolve().max_retransmits, 3);
        assert_eq!(cfg.stun.resolve().initial_rto, Duration::from_millis(500));
    }
}
