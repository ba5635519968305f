mod settings;

pub use settings::{
    InboundConfig, JwtConfig, KeySource, LogFormat, LoggingConfig, RedisConfig, ServerConfig,
    SessionConfig, Settings,
};
