//! [`Config`]-related definitions.

use std::time;

use common::money::Currency;
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use secrecy::SecretString;
use serde::Deserialize;
use smart_default::SmartDefault;

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: Server,

    /// Service configuration.
    pub service: Service,

    /// Postgres configuration.
    pub postgres: Postgres,

    /// Log configuration.
    pub log: Log,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Server {
    /// Host to bind the server to.
    #[default("0.0.0.0".to_owned())]
    pub host: String,

    /// Port to bind the server to.
    #[default(8080)]
    pub port: u16,

    /// [CORS] configuration.
    ///
    /// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
    pub cors: Cors,
}

/// [CORS] configuration.
///
/// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cors {
    /// List of allowed origins.
    #[default(vec!["*".to_owned()])]
    pub origins: Vec<String>,
}

/// Service configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Service {
    /// [JWT] secret.
    ///
    /// [JWT]: https://wikipedia.org/wiki/JSON_Web_Token
    #[default("secret".to_owned())]
    pub jwt_secret: String,

    /// Payment gateway configuration.
    pub gateway: Gateway,
}

impl From<Service> for service::Config {
    fn from(value: Service) -> Self {
        let Service {
            jwt_secret,
            gateway:
                Gateway {
                    key_id,
                    key_secret,
                    currency,
                    ..
                },
        } = value;
        Self {
            jwt_decoding_key: jsonwebtoken::DecodingKey::from_secret(
                jwt_secret.as_bytes(),
            ),
            gateway_key_id: key_id,
            gateway_key_secret: SecretString::from(key_secret),
            currency,
        }
    }
}

/// Payment gateway configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Gateway {
    /// Base URL of the gateway API, without the version segment.
    #[default("https://api.razorpay.com".to_owned())]
    pub base_url: String,

    /// Public ID of the API key.
    pub key_id: String,

    /// Secret of the API key.
    pub key_secret: String,

    /// Currency payments are requested in.
    #[default(Currency::Inr)]
    pub currency: Currency,

    /// Timeout of a single gateway request.
    #[default(time::Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub timeout: time::Duration,
}

impl From<Gateway> for service::infra::gateway::razorpay::Config {
    fn from(value: Gateway) -> Self {
        let Gateway {
            base_url,
            key_id,
            key_secret,
            currency: _,
            timeout,
        } = value;
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            key_id,
            key_secret: SecretString::from(key_secret),
            timeout,
        }
    }
}

/// Postgres configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Postgres {
    /// Host to connect to.
    #[default("127.0.0.1".to_owned())]
    pub host: String,

    /// Port to connect to.
    #[default(5432)]
    pub port: u16,

    /// User to connect as.
    #[default("postgres".to_owned())]
    pub user: String,

    /// Password to connect with.
    #[default("postgres".to_owned())]
    pub password: String,

    /// Database name to connect to.
    #[default("postgres".to_owned())]
    pub dbname: String,
}

impl From<Postgres> for service::infra::postgres::Config {
    fn from(value: Postgres) -> Self {
        let Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } = value;

        Self {
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            dbname: Some(dbname),
            ..Self::default()
        }
    }
}

/// Log configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace,

    /// Designates lower priority information.
    Debug,

    /// Designates useful information.
    #[default]
    Info,

    /// Designates hazardous situations.
    Warn,

    /// Designates very serious errors.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::money::Currency;
    use secrecy::ExposeSecret as _;
    use service::infra::gateway::razorpay;

    use super::{Config, Gateway};

    #[test]
    fn falls_back_to_defaults() {
        let config = Config::new("does-not-exist.toml").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.service.gateway.currency, Currency::Inr);
        assert_eq!(config.service.gateway.timeout, Duration::from_secs(10));
    }

    #[test]
    fn converts_gateway() {
        let gw = razorpay::Config::from(Gateway {
            base_url: "https://gw.test/".into(),
            key_id: "rzp_test".into(),
            key_secret: "shh".into(),
            ..Gateway::default()
        });

        assert_eq!(gw.base_url, "https://gw.test");
        assert_eq!(gw.key_id, "rzp_test");
        assert_eq!(gw.key_secret.expose_secret(), "shh");
    }
}
