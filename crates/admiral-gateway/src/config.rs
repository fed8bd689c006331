//! Server configuration
//!
//! Loaded once at startup from a TOML, YAML or JSON file with environment
//! overrides, then treated as immutable.
//!
//! Environment variables with the `ADMIRAL__` prefix override file settings;
//! nested keys are separated by `__`, e.g. `ADMIRAL__SECURITY__USE_AUTH=false`
//! or `ADMIRAL__AUTH__COOKIE__SIGNING_KEY=...`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use admiral_auth::AuthConfig;
use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ADMIRAL";

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address; the only listener in secure mode
    #[serde(default = "default_http_address")]
    pub http_address: SocketAddr,
    /// RPC listen address, used in insecure mode only
    #[serde(default = "default_grpc_address")]
    pub grpc_address: SocketAddr,
    /// TLS, authentication and CORS settings
    #[serde(default)]
    pub security: SecurityConfig,
    /// Authentication settings; required when `security.use_auth` is set
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transport security and authentication switches
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Serve everything over one TLS listener
    #[serde(default)]
    pub secure: bool,
    /// Require verified credentials on every RPC
    #[serde(default = "default_true")]
    pub use_auth: bool,
    /// Certificate and key, required in secure mode
    #[serde(default)]
    pub tls: Option<TlsFiles>,
    /// Origins allowed by CORS; empty allows any origin without credentials
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secure: false,
            use_auth: true,
            tls: None,
            allowed_origins: Vec::new(),
        }
    }
}

/// PEM certificate chain and private key
#[derive(Debug, Clone, Deserialize)]
pub struct TlsFiles {
    /// Certificate chain
    pub cert_file: PathBuf,
    /// Private key
    pub key_file: PathBuf,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_http_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_grpc_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerConfig {
    /// Load configuration from a file (TOML, YAML, or JSON) plus environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration with a custom environment prefix
    ///
    /// # Errors
    ///
    /// See [`Self::from_file`].
    pub fn from_file_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> GatewayResult<Self> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(GatewayError::ConfigNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(GatewayError::UnsupportedConfigFormat(path.to_path_buf())),
        };
        let path_str = path
            .to_str()
            .ok_or_else(|| GatewayError::UnsupportedConfigFormat(path.to_path_buf()))?;

        let config = Config::builder()
            .add_source(File::new(path_str, format))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("security.allowed_origins"),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] describing the first violation.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.security.secure && self.security.tls.is_none() {
            return Err(GatewayError::Config(
                "security.secure requires security.tls.cert_file and security.tls.key_file".into(),
            ));
        }
        if !self.security.secure && self.http_address == self.grpc_address && self.http_address.port() != 0 {
            return Err(GatewayError::Config(
                "http_address and grpc_address must differ in insecure mode".into(),
            ));
        }
        match &self.auth {
            Some(auth) => auth.validate()?,
            None if self.security.use_auth => {
                return Err(GatewayError::Config(
                    "security.use_auth requires an [auth] section".into(),
                ));
            }
            None => {}
        }
        Ok(())
    }

    /// The auth section, when authentication is enabled
    pub fn active_auth(&self) -> Option<&AuthConfig> {
        if self.security.use_auth { self.auth.as_ref() } else { None }
    }
}
