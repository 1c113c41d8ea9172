//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use kiz_session::auth::{CodecConfig, CookiePolicy, SameSite, TokenDuration, codec};
use kiz_session::db::DatabaseConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
const MIN_SECRET_LEN: usize = 32;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Token lifetimes and cookie attributes
    pub session: SessionConfig,
    /// Prometheus listener, disabled when `None`
    pub metrics_bind: Option<SocketAddr>,
    /// Keep sessions and users in memory instead of PostgreSQL
    pub ephemeral: bool,
}

/// Security-related configuration
#[derive(Clone)]
pub struct SecurityConfig {
    /// Access token signing secret (required)
    pub access_secret: String,
    /// Refresh token signing secret (required, distinct from the access secret)
    pub refresh_secret: String,
    /// Password hashing pepper
    pub password_pepper: String,
    pub issuer: String,
    pub audience: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Token lifetimes and cookie attributes
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub access_ttl: TokenDuration,
    pub refresh_ttl: TokenDuration,
    /// `APP_ENV=production`: cookies get the `Secure` attribute
    pub production: bool,
    pub same_site: SameSite,
}

/// Values given on the command line, which win over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub metrics_bind: Option<SocketAddr>,
    pub ephemeral: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(
            |key| std::env::var(key).ok(),
            DatabaseConfig::from_env(),
            overrides,
        )
    }

    /// Load configuration through `lookup` instead of the process environment
    ///
    /// # Arguments
    ///
    /// * `lookup` - Variable reader
    /// * `database` - Pool settings; its URL is replaced by `--db-url` if given
    /// * `overrides` - Command line values
    pub fn from_lookup<F>(
        lookup: F,
        mut database: DatabaseConfig,
        overrides: CliOverrides,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => parse_var(&lookup, "SERVER_BIND")?.unwrap_or(DEFAULT_BIND),
        };

        if let Some(url) = overrides.database_url {
            database.database_url = url;
        }

        let access_secret = lookup("JWT_ACCESS_SECRET").ok_or_else(|| ConfigError::MissingRequired {
            var: "JWT_ACCESS_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;
        let refresh_secret =
            lookup("JWT_REFRESH_SECRET").ok_or_else(|| ConfigError::MissingRequired {
                var: "JWT_REFRESH_SECRET".to_string(),
                hint: "Generate with: openssl rand -hex 32".to_string(),
            })?;

        let security = SecurityConfig {
            access_secret,
            refresh_secret,
            password_pepper: lookup("PASSWORD_PEPPER").unwrap_or_default(),
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| codec::DEFAULT_ISSUER.to_string()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| codec::DEFAULT_AUDIENCE.to_string()),
        };

        let session = SessionConfig {
            access_ttl: parse_var(&lookup, "JWT_ACCESS_EXPIRES_IN")?
                .unwrap_or(TokenDuration::minutes(15)),
            refresh_ttl: parse_var(&lookup, "JWT_REFRESH_EXPIRES_IN")?
                .unwrap_or(TokenDuration::days(7)),
            production: lookup("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production")),
            same_site: parse_var(&lookup, "COOKIE_SAME_SITE")?.unwrap_or_default(),
        };

        let metrics_bind = match overrides.metrics_bind {
            Some(addr) => Some(addr),
            None => parse_var(&lookup, "METRICS_BIND")?,
        };

        Ok(ServerConfig {
            bind,
            database,
            security,
            session,
            metrics_bind,
            ephemeral: overrides.ephemeral,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, secret) in [
            ("JWT_ACCESS_SECRET", &self.security.access_secret),
            ("JWT_REFRESH_SECRET", &self.security.refresh_secret),
        ] {
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: format!("Must be at least {MIN_SECRET_LEN} characters"),
                });
            }
        }

        if self.security.access_secret == self.security.refresh_secret {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_SECRET".to_string(),
                reason: "Must differ from JWT_ACCESS_SECRET".to_string(),
            });
        }

        if self.session.access_ttl.as_secs() >= self.session.refresh_ttl.as_secs() {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_EXPIRES_IN".to_string(),
                reason: format!(
                    "Must be longer than the access token lifetime ({})",
                    self.session.access_ttl
                ),
            });
        }

        Ok(())
    }

    /// Settings for the token codec
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            access_secret: self.security.access_secret.clone(),
            refresh_secret: self.security.refresh_secret.clone(),
            issuer: self.security.issuer.clone(),
            audience: self.security.audience.clone(),
            access_ttl: self.session.access_ttl,
            refresh_ttl: self.session.refresh_ttl,
        }
    }

    /// Attributes for the session cookies; `Max-Age` follows the token lifetimes
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            secure: self.session.production,
            same_site: self.session.same_site,
            access_ttl: self.session.access_ttl,
            refresh_ttl: self.session.refresh_ttl,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Parse an optional variable; a present but unparsable value is an error
fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ACCESS: &str = "access-secret-0123456789abcdef0123456789";
    const REFRESH: &str = "refresh-secret-0123456789abcdef012345678";

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(
            |key| vars.get(key).cloned(),
            DatabaseConfig::development(),
            CliOverrides::default(),
        )
    }

    fn secrets() -> Vec<(&'static str, &'static str)> {
        vec![("JWT_ACCESS_SECRET", ACCESS), ("JWT_REFRESH_SECRET", REFRESH)]
    }

    #[test]
    fn test_defaults() {
        let config = load(&secrets()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.session.access_ttl.as_secs(), 900);
        assert_eq!(config.session.refresh_ttl.as_secs(), 604_800);
        assert!(!config.session.production);
        assert_eq!(config.session.same_site, SameSite::Lax);
        assert!(config.metrics_bind.is_none());
        assert!(!config.cookie_policy().secure);
    }

    #[test]
    fn test_missing_secret() {
        let err = load(&[("JWT_ACCESS_SECRET", ACCESS)]).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingRequired { ref var, .. } if var == "JWT_REFRESH_SECRET")
        );
    }

    #[test]
    fn test_production_cookies() {
        let mut vars = secrets();
        vars.push(("APP_ENV", "Production"));
        vars.push(("COOKIE_SAME_SITE", "strict"));

        let policy = load(&vars).unwrap().cookie_policy();
        assert!(policy.secure);
        assert_eq!(policy.same_site, SameSite::Strict);
    }

    #[test]
    fn test_custom_lifetimes() {
        let mut vars = secrets();
        vars.push(("JWT_ACCESS_EXPIRES_IN", "5m"));
        vars.push(("JWT_REFRESH_EXPIRES_IN", "12h"));

        let config = load(&vars).unwrap();
        config.validate().unwrap();
        let codec = config.codec_config();
        assert_eq!(codec.access_ttl.as_secs(), 300);
        assert_eq!(codec.refresh_ttl.as_secs(), 43_200);
        assert_eq!(config.cookie_policy().access_ttl.as_secs(), 300);
    }

    #[test]
    fn test_unparsable_values_are_rejected() {
        let mut vars = secrets();
        vars.push(("JWT_ACCESS_EXPIRES_IN", "15x"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = secrets();
        vars.push(("COOKIE_SAME_SITE", "none"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = secrets();
        vars.push(("SERVER_BIND", "not-an-address"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validation_short_secret() {
        let config = load(&[
            ("JWT_ACCESS_SECRET", "short"),
            ("JWT_REFRESH_SECRET", REFRESH),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "JWT_ACCESS_SECRET"));
    }

    #[test]
    fn test_validation_shared_secret() {
        let config = load(&[
            ("JWT_ACCESS_SECRET", ACCESS),
            ("JWT_REFRESH_SECRET", ACCESS),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_refresh_must_outlive_access() {
        let mut vars = secrets();
        vars.push(("JWT_ACCESS_EXPIRES_IN", "2d"));
        vars.push(("JWT_REFRESH_EXPIRES_IN", "1d"));
        assert!(load(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("JWT_ACCESS_SECRET", ACCESS),
            ("JWT_REFRESH_SECRET", REFRESH),
            ("SERVER_BIND", "0.0.0.0:9000"),
        ]
        .into_iter()
        .collect();
        let overrides = CliOverrides {
            bind: Some("127.0.0.1:7000".parse().unwrap()),
            database_url: Some("postgres://override/db".to_string()),
            metrics_bind: None,
            ephemeral: true,
        };

        let config = ServerConfig::from_lookup(
            |key| vars.get(key).map(|v| v.to_string()),
            DatabaseConfig::development(),
            overrides,
        )
        .unwrap();

        assert_eq!(config.bind.port(), 7000);
        assert_eq!(config.database.database_url, "postgres://override/db");
        assert!(config.ephemeral);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_ACCESS_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_ACCESS_SECRET"));
        assert!(msg.contains("Use openssl"));
    }
}
