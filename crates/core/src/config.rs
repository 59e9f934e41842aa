//! Configuration management for the campus session client

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix; nested keys use a double underscore,
/// e.g. `CAMPUS__API__BASE_URL`.
pub const ENV_PREFIX: &str = "CAMPUS";

/// Main client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend API configuration
    pub api: ApiConfig,

    /// Session lifecycle configuration
    pub session: SessionConfig,

    /// View-layer paths used for redirects
    pub routes: RouteConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST backend
    pub base_url: String,

    /// Default request timeout in seconds
    pub timeout_secs: u64,

    /// Timeout for the login call in seconds
    pub login_timeout_secs: u64,

    /// Timeout for the token refresh call in seconds
    pub refresh_timeout_secs: u64,

    /// CSRF token sent on unsafe methods
    pub csrf_token: Option<String>,
}

/// Session lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long before access token expiry the refresh fires
    pub refresh_skew_secs: u64,

    /// File used to persist tokens across restarts; in-memory when unset
    pub storage_path: Option<PathBuf>,
}

/// Redirect targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub login: String,
    pub home: String,
    pub vendor_dashboard: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
            login_timeout_secs: 30,
            refresh_timeout_secs: 30,
            csrf_token: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_skew_secs: 60,
            storage_path: None,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            home: "/home".to_string(),
            vendor_dashboard: "/vendor/dashboard".to_string(),
        }
    }
}

impl ApiConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub const fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

impl SessionConfig {
    pub const fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }
}

impl ClientConfig {
    /// Load configuration from file
    ///
    /// The file is layered over the defaults, and `CAMPUS__*` environment
    /// variables override both.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read, parsed or
    /// validated
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let settings = Self::builder_with_defaults()?
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with defaults and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed or the
    /// result does not validate
    pub fn from_env() -> CoreResult<Self> {
        let settings = Self::builder_with_defaults()?
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the loader cannot express
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for an unparsable base URL or a
    /// zero timeout
    pub fn validate(&self) -> CoreResult<()> {
        let url = url::Url::parse(&self.api.base_url).map_err(|e| {
            CoreError::invalid_config(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::invalid_config(format!(
                "api.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        for (name, value) in [
            ("api.timeout_secs", self.api.timeout_secs),
            ("api.login_timeout_secs", self.api.login_timeout_secs),
            ("api.refresh_timeout_secs", self.api.refresh_timeout_secs),
        ] {
            if value == 0 {
                return Err(CoreError::invalid_config(format!("{name} must be positive")));
            }
        }

        Ok(())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
    }

    fn builder_with_defaults()
    -> CoreResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();

        Ok(config::Config::builder()
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs)?
            .set_default("api.login_timeout_secs", defaults.api.login_timeout_secs)?
            .set_default("api.refresh_timeout_secs", defaults.api.refresh_timeout_secs)?
            .set_default("session.refresh_skew_secs", defaults.session.refresh_skew_secs)?
            .set_default("routes.login", defaults.routes.login)?
            .set_default("routes.home", defaults.routes.home)?
            .set_default("routes.vendor_dashboard", defaults.routes.vendor_dashboard)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_backend_policy() {
        let config = ClientConfig::default();
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.api.login_timeout(), Duration::from_secs(30));
        assert_eq!(config.session.refresh_skew(), Duration::from_secs(60));
        assert_eq!(config.routes.login, "/login");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "https://api.campus.test"
login_timeout_secs = 15

[session]
refresh_skew_secs = 30
storage_path = "/tmp/campus-tokens.json"
"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://api.campus.test");
        assert_eq!(config.api.login_timeout_secs, 15);
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.session.refresh_skew_secs, 30);
        assert_eq!(
            config.session.storage_path,
            Some(PathBuf::from("/tmp/campus-tokens.json"))
        );
        assert_eq!(config.routes.vendor_dashboard, "/vendor/dashboard");
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = ClientConfig::default();
        config.api.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig { .. })
        ));

        config.api.base_url = "ftp://files.campus.test".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ClientConfig::default();
        config.api.refresh_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api.refresh_timeout_secs"));
    }
}
