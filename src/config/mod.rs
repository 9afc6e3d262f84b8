//! Configuration management for the gateway.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the panel listener binds to.
    pub listen_addr: SocketAddr,

    /// Capacity of the application notification channel.
    pub events_buffer: usize,

    /// Shared secrets provisioned on the panels.
    pub integration: IntegrationConfig,

    /// Timeouts and heartbeat cadence.
    pub timing: TimingConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", crate::DEFAULT_PORT).parse().unwrap(),
            events_buffer: 256,
            integration: IntegrationConfig::default(),
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.port() == 0 {
            return Err(Error::Config("listen port must be non-zero".into()));
        }
        if !self.integration.type1_configured() && !self.integration.type2_configured() {
            return Err(Error::Config(
                "no integration secrets configured: set access_code_type1 + \
                 identification_number, or access_code_type2"
                    .into(),
            ));
        }
        self.timing.validate()
    }
}

/// Shared secrets for the two key-negotiation schemes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// 8+ digit decimal string for Type 1 keying.
    pub access_code_type1: Option<String>,

    /// 8+ digit decimal string for Type 1 keying.
    pub identification_number: Option<String>,

    /// 32 hex characters for Type 2 keying.
    pub access_code_type2: Option<String>,
}

impl IntegrationConfig {
    pub fn type1_configured(&self) -> bool {
        self.access_code_type1.is_some() && self.identification_number.is_some()
    }

    pub fn type2_configured(&self) -> bool {
        self.access_code_type2.is_some()
    }
}

/// Timeouts and heartbeat cadence, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub transaction_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub lock_timeout_secs: u64,
    pub version_probe_delay_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_secs: 30,
            handshake_timeout_secs: 60,
            lock_timeout_secs: 30,
            version_probe_delay_secs: 10,
            poll_interval_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn version_probe_delay(&self) -> Duration {
        Duration::from_secs(self.version_probe_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.transaction_timeout_secs == 0
            || self.handshake_timeout_secs == 0
            || self.lock_timeout_secs == 0
            || self.poll_interval_secs == 0
        {
            return Err(Error::Config("timing values must be non-zero".into()));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (tracing EnvFilter syntax).
    pub level: String,

    /// ANSI color output.
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            color: true,
        }
    }
}

/// Initialize the tracing subscriber from the logging configuration.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("invalid log level: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.color)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to init logging: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_standard_port() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr.port(), 3072);
    }

    #[test]
    fn validation_requires_secrets() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.integration.access_code_type2 = Some("00112233445566778899aabbccddeeff".into());
        assert!(config.validate().is_ok());

        let mut config = GatewayConfig::default();
        config.integration.access_code_type1 = Some("12345678".into());
        // IIN missing: Type 1 needs both secrets.
        assert!(config.validate().is_err());
        config.integration.identification_number = Some("87654321".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_round_trip() {
        let mut config = GatewayConfig::default();
        config.integration.access_code_type2 = Some("00112233445566778899aabbccddeeff".into());
        config.timing.poll_interval_secs = 15;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: GatewayConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.listen_addr, config.listen_addr);
        assert_eq!(parsed.timing.poll_interval_secs, 15);
        assert_eq!(
            parsed.integration.access_code_type2,
            config.integration.access_code_type2
        );
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let parsed: GatewayConfig = toml::from_str(
            r#"
            [integration]
            access_code_type2 = "00112233445566778899aabbccddeeff"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.listen_addr.port(), 3072);
        assert_eq!(parsed.timing.transaction_timeout_secs, 30);
        assert!(parsed.validate().is_ok());
    }
}
