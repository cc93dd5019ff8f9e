//! Layered application settings.
//!
//! Sources, lowest precedence first: built-in defaults, the settings file
//! (`appsettings.json`, or any `.json`/`.yaml` given with `--config`), then
//! `GRAPHD_*` environment variables (`__` separates nested keys, e.g.
//! `GRAPHD_LOGGING__LEVEL=debug`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Yaml};
use graphd_auth::{OAuthClientConfig, SecretString};
use graphd_http::{HttpClientConfig, TransportSecurity};
use serde::{Deserialize, Serialize};

/// Settings file read from the working directory when `--config` is absent.
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";

const ENV_PREFIX: &str = "GRAPHD_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `graphd_auth=debug,info`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

/// Application settings.
///
/// Key names follow the `appsettings.json` convention (camelCase).
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Application (client) id of the app registration.
    pub application_id: String,
    /// Client secret of the app registration.
    pub application_secret: String,
    /// Directory (tenant) id; the tenant `domain` is used when empty.
    pub tenant_id: String,
    /// Tenant domain, e.g. `contoso.onmicrosoft.com`.
    pub domain: String,
    /// Accepted for compatibility with existing settings files; app-only
    /// auth never redirects.
    pub redirect_uri: Option<String>,
    pub authority_host: String,
    pub graph_base_url: String,
    pub scope: String,
    pub request_timeout_secs: u64,
    /// Permit plain `http://` endpoints (local mock servers only).
    pub allow_insecure_http: bool,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            application_secret: String::new(),
            tenant_id: String::new(),
            domain: String::new(),
            redirect_uri: None,
            authority_host: graphd_auth::DEFAULT_AUTHORITY_HOST.to_owned(),
            graph_base_url: "https://graph.microsoft.com/v1.0".to_owned(),
            scope: "https://graph.microsoft.com/.default".to_owned(),
            request_timeout_secs: 30,
            allow_insecure_http: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("application_id", &self.application_id)
            .field("application_secret", &"[REDACTED]")
            .field("tenant_id", &self.tenant_id)
            .field("domain", &self.domain)
            .field("redirect_uri", &self.redirect_uri)
            .field("authority_host", &self.authority_host)
            .field("graph_base_url", &self.graph_base_url)
            .field("scope", &self.scope)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("allow_insecure_http", &self.allow_insecure_http)
            .field("logging", &self.logging)
            .finish()
    }
}

impl AppConfig {
    /// Load settings from `path` (or `appsettings.json` if present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `path` does not exist, the file has
    /// an unsupported extension, or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.is_file() {
                    bail!("config file does not exist: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => Some(PathBuf::from(DEFAULT_SETTINGS_FILE)).filter(|p| p.is_file()),
        };

        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(ref file) = file {
            figment = match file.extension().and_then(|e| e.to_str()) {
                Some("json") => figment.merge(Json::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                _ => bail!(
                    "unsupported config file type (expected .json, .yaml or .yml): {}",
                    file.display()
                ),
            };
        }

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .lowercase(false)
                .map(|key| env_key_to_path(key.as_str()).into()),
        );

        let config: Self = figment.extract().with_context(|| match file {
            Some(ref f) => format!("invalid configuration in {}", f.display()),
            None => "invalid configuration".to_owned(),
        })?;

        Ok(config)
    }

    /// Check that the credentials needed for token acquisition are present.
    ///
    /// # Errors
    ///
    /// Names every missing setting.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.application_id.trim().is_empty() {
            missing.push("applicationId");
        }
        if self.application_secret.trim().is_empty() {
            missing.push("applicationSecret");
        }
        if self.tenant().is_none() {
            missing.push("tenantId (or domain)");
        }

        if !missing.is_empty() {
            bail!(
                "missing or invalid settings: {}; see README.md for configuration instructions",
                missing.join(", ")
            );
        }

        url::Url::parse(&self.graph_base_url)
            .with_context(|| format!("graphBaseUrl is not a URL: {}", self.graph_base_url))?;

        Ok(())
    }

    /// Tenant used in the token endpoint path.
    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        [self.tenant_id.trim(), self.domain.trim()]
            .into_iter()
            .find(|t| !t.is_empty())
    }

    /// HTTP settings shared by the token and Graph clients.
    #[must_use]
    pub fn http_config(&self, base: HttpClientConfig) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            transport: if self.allow_insecure_http {
                TransportSecurity::AllowInsecureHttp
            } else {
                TransportSecurity::TlsOnly
            },
            ..base
        }
    }

    /// Client-credentials configuration for the tenant's token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the tenant is missing or the authority
    /// host is not a URL.
    pub fn oauth_config(&self) -> Result<OAuthClientConfig, graphd_auth::AuthError> {
        let tenant = self.tenant().unwrap_or_default();
        let mut oauth = OAuthClientConfig::azure_ad(
            &self.authority_host,
            tenant,
            self.application_id.trim(),
            SecretString::new(self.application_secret.as_str()),
            self.scope.as_str(),
        )?;
        oauth.http_config = Some(self.http_config(HttpClientConfig::token_endpoint()));
        Ok(oauth)
    }
}

/// Map an environment key (prefix stripped) to a figment key path.
///
/// `APPLICATION_ID` → `applicationId`, `LOGGING__LEVEL` → `logging.level`.
fn env_key_to_path(key: &str) -> String {
    key.to_ascii_lowercase()
        .split("__")
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            let mut upper = false;
            for c in segment.chars() {
                if c == '_' {
                    upper = !out.is_empty();
                } else if upper {
                    out.push(c.to_ascii_uppercase());
                    upper = false;
                } else {
                    out.push(c);
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}
