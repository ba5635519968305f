use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::connection::WriterConfig;
use crate::distributor::DistributorConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    /// JWT validation for WebSocket upgrades; upgrades are not authenticated when absent
    #[serde(default)]
    pub jwt: Option<JwtConfig>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub distributor: DistributorConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub inbound: InboundConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Where the session key of a new connection comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// The `sub` claim of the validated JWT
    #[default]
    Principal,
    /// A query parameter of the upgrade request
    Query,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub key_source: KeySource,
    #[serde(default = "default_query_param")]
    pub query_param: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundConfig {
    /// Reply with an `error` frame when a frame cannot be routed
    #[serde(default = "default_true")]
    pub reply_on_unroutable: bool,
    /// Allow clients to publish through the `relay` frame type
    #[serde(default)]
    pub client_relay: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_query_param() -> String {
    "session".to_string()
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("redis.url", default_redis_url())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // RELAY__SERVER__PORT, RELAY__WRITER__OVERFLOW_POLICY, ...
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_source: KeySource::default(),
            query_param: default_query_param(),
        }
    }
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            reply_on_unroutable: true,
            client_relay: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            redis: RedisConfig::default(),
            jwt: None,
            session: SessionConfig::default(),
            distributor: DistributorConfig::default(),
            writer: WriterConfig::default(),
            inbound: InboundConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OverflowPolicy;
    use crate::distributor::DistributorStrategy;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8090);
        assert_eq!(settings.server_addr(), "0.0.0.0:8090");
        assert!(settings.jwt.is_none());
        assert_eq!(settings.session.key_source, KeySource::Principal);
        assert!(settings.inbound.reply_on_unroutable);
        assert!(!settings.inbound.client_relay);
    }

    #[test]
    fn test_deserialize_from_sources() {
        let settings: Settings = Config::builder()
            .set_override("distributor.strategy", "queue")
            .unwrap()
            .set_override("writer.overflow_policy", "drop_oldest")
            .unwrap()
            .set_override("writer.buffer_size_limit_bytes", 1024)
            .unwrap()
            .set_override("session.key_source", "query")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.distributor.strategy, DistributorStrategy::Queue);
        assert_eq!(settings.writer.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(settings.writer.buffer_size_limit_bytes, 1024);
        assert_eq!(settings.session.key_source, KeySource::Query);
        assert_eq!(settings.session.query_param, "session");
    }
}
