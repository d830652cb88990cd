/*
 * Responsibility
 * - 環境変数 (.env 含む) から設定を読み込む (CLIENT_ID, issuer, JWKS URI など)
 * - CLI からの上書きを適用する
 * - 設定値のバリデーション (不正なら起動失敗)
 */
use std::fmt;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
pub const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Which capability performs the actual token verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyBackend {
    // Local signature check against the issuer's JWK Set.
    Jwks,
    // Remote check through Google's tokeninfo endpoint.
    TokenInfo,
}

impl FromStr for VerifyBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwks" => Ok(Self::Jwks),
            "tokeninfo" | "token-info" => Ok(Self::TokenInfo),
            _ => Err(ConfigError::Invalid("VERIFY_BACKEND")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacebookConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnv,

    // Expected audience. Optional here; `verify` requires it, `authorize` does not.
    pub client_id: Option<String>,
    pub issuers: Vec<String>,
    pub algorithms: Vec<Algorithm>,
    pub leeway_seconds: u64,

    pub backend: VerifyBackend,
    pub jwks_uri: String,
    pub jwks_cache_ttl_seconds: u64,
    // Minimum gap between JWKS fetches triggered by an unknown `kid`.
    pub jwks_min_refresh_seconds: u64,
    pub tokeninfo_url: String,
    pub http_timeout_seconds: u64,

    pub facebook: Option<FacebookConfig>,
}

/// Values supplied on the command line. `None` / empty keeps the environment value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub client_id: Option<String>,
    pub issuers: Vec<String>,
    pub jwks_uri: Option<String>,
    pub leeway_seconds: Option<u64>,
    pub backend: Option<VerifyBackend>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup (the process environment in
    /// production, a map in tests).
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = AppEnv::parse(var("APP_ENV"));

        let client_id = non_empty(var("CLIENT_ID"));

        let mut issuers = split_list(var("ID_TOKEN_ISSUERS").unwrap_or_default());
        if issuers.is_empty() {
            issuers = GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect();
        }

        let algorithms = split_list(var("ID_TOKEN_ALGORITHMS").unwrap_or_default())
            .iter()
            .map(|s| {
                Algorithm::from_str(s).map_err(|_| ConfigError::Invalid("ID_TOKEN_ALGORITHMS"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let algorithms = if algorithms.is_empty() {
            vec![Algorithm::RS256]
        } else {
            algorithms
        };

        let leeway_seconds =
            parse_or(var("ID_TOKEN_LEEWAY_SECONDS"), "ID_TOKEN_LEEWAY_SECONDS", 0)?;

        let backend = match non_empty(var("VERIFY_BACKEND")) {
            Some(v) => v.parse()?,
            None => VerifyBackend::Jwks,
        };

        let jwks_uri = non_empty(var("ID_TOKEN_JWKS_URI"))
            .unwrap_or_else(|| GOOGLE_JWKS_URI.to_string());
        validate_url(&jwks_uri, "ID_TOKEN_JWKS_URI")?;

        let jwks_cache_ttl_seconds =
            parse_or(var("JWKS_CACHE_TTL_SECONDS"), "JWKS_CACHE_TTL_SECONDS", 300)?;
        let jwks_min_refresh_seconds =
            parse_or(var("JWKS_MIN_REFRESH_SECONDS"), "JWKS_MIN_REFRESH_SECONDS", 60)?;

        let tokeninfo_url = non_empty(var("TOKENINFO_URL"))
            .unwrap_or_else(|| GOOGLE_TOKENINFO_URL.to_string());
        validate_url(&tokeninfo_url, "TOKENINFO_URL")?;

        let http_timeout_seconds =
            parse_or(var("HTTP_TIMEOUT_SECONDS"), "HTTP_TIMEOUT_SECONDS", 10)?;
        if http_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("HTTP_TIMEOUT_SECONDS"));
        }

        let facebook = match (
            non_empty(var("FACEBOOK_CLIENT_ID")),
            non_empty(var("FACEBOOK_CLIENT_SECRET")),
        ) {
            (Some(client_id), Some(client_secret)) => Some(FacebookConfig {
                client_id,
                client_secret,
            }),
            (Some(_), None) => return Err(ConfigError::Missing("FACEBOOK_CLIENT_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("FACEBOOK_CLIENT_ID")),
            (None, None) => None,
        };

        Ok(Self {
            app_env,
            client_id,
            issuers,
            algorithms,
            leeway_seconds,
            backend,
            jwks_uri,
            jwks_cache_ttl_seconds,
            jwks_min_refresh_seconds,
            tokeninfo_url,
            http_timeout_seconds,
            facebook,
        })
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(client_id) = non_empty(overrides.client_id) {
            self.client_id = Some(client_id);
        }

        let issuers = overrides
            .issuers
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if !issuers.is_empty() {
            self.issuers = issuers;
        }

        if let Some(jwks_uri) = non_empty(overrides.jwks_uri) {
            validate_url(&jwks_uri, "--jwks-uri")?;
            self.jwks_uri = jwks_uri;
        }

        if let Some(leeway) = overrides.leeway_seconds {
            self.leeway_seconds = leeway;
        }

        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }

        Ok(self)
    }

    pub fn require_client_id(&self) -> Result<&str, ConfigError> {
        self.client_id
            .as_deref()
            .ok_or(ConfigError::Missing("CLIENT_ID"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn split_list(value: String) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match non_empty(value) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn validate_url(value: &str, key: &'static str) -> Result<(), ConfigError> {
    let url = url::Url::parse(value).map_err(|_| ConfigError::Invalid(key))?;
    match url.scheme() {
        "https" | "http" => Ok(()),
        _ => Err(ConfigError::Invalid(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_target_google() {
        let config = config(&[]).unwrap();

        assert_eq!(config.app_env, AppEnv::Development);
        assert_eq!(config.client_id, None);
        assert_eq!(config.issuers, vec!["accounts.google.com", "https://accounts.google.com"]);
        assert_eq!(config.algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.leeway_seconds, 0);
        assert_eq!(config.backend, VerifyBackend::Jwks);
        assert_eq!(config.jwks_uri, GOOGLE_JWKS_URI);
        assert_eq!(config.jwks_cache_ttl_seconds, 300);
        assert_eq!(config.jwks_min_refresh_seconds, 60);
        assert_eq!(config.http_timeout_seconds, 10);
        assert!(config.facebook.is_none());
        assert_eq!(config.require_client_id(), Err(ConfigError::Missing("CLIENT_ID")));
    }

    #[test]
    fn reads_named_variables() {
        let config = config(&[
            ("APP_ENV", "prod"),
            ("CLIENT_ID", " my-client-id "),
            ("ID_TOKEN_ISSUERS", "https://issuer.example, ,https://other.example"),
            ("ID_TOKEN_ALGORITHMS", "RS256,EdDSA"),
            ("ID_TOKEN_LEEWAY_SECONDS", "30"),
            ("VERIFY_BACKEND", "tokeninfo"),
            ("ID_TOKEN_JWKS_URI", "http://localhost:8080/certs"),
            ("JWKS_MIN_REFRESH_SECONDS", "0"),
        ])
        .unwrap();

        assert!(config.app_env.is_production());
        assert_eq!(config.require_client_id(), Ok("my-client-id"));
        assert_eq!(config.issuers, vec!["https://issuer.example", "https://other.example"]);
        assert_eq!(config.algorithms, vec![Algorithm::RS256, Algorithm::EdDSA]);
        assert_eq!(config.leeway_seconds, 30);
        assert_eq!(config.backend, VerifyBackend::TokenInfo);
        assert_eq!(config.jwks_uri, "http://localhost:8080/certs");
        assert_eq!(config.jwks_min_refresh_seconds, 0);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            config(&[("ID_TOKEN_LEEWAY_SECONDS", "soon")]).unwrap_err(),
            ConfigError::Invalid("ID_TOKEN_LEEWAY_SECONDS")
        );
        assert_eq!(
            config(&[("ID_TOKEN_ALGORITHMS", "ROT13")]).unwrap_err(),
            ConfigError::Invalid("ID_TOKEN_ALGORITHMS")
        );
        assert_eq!(
            config(&[("ID_TOKEN_JWKS_URI", "ftp://example.com/certs")]).unwrap_err(),
            ConfigError::Invalid("ID_TOKEN_JWKS_URI")
        );
        assert_eq!(
            config(&[("VERIFY_BACKEND", "magic")]).unwrap_err(),
            ConfigError::Invalid("VERIFY_BACKEND")
        );
        assert_eq!(
            config(&[("HTTP_TIMEOUT_SECONDS", "0")]).unwrap_err(),
            ConfigError::Invalid("HTTP_TIMEOUT_SECONDS")
        );
    }

    #[test]
    fn facebook_needs_both_halves() {
        assert_eq!(
            config(&[("FACEBOOK_CLIENT_ID", "fb")]).unwrap_err(),
            ConfigError::Missing("FACEBOOK_CLIENT_SECRET")
        );

        let config = config(&[
            ("FACEBOOK_CLIENT_ID", "fb"),
            ("FACEBOOK_CLIENT_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(
            config.facebook,
            Some(FacebookConfig {
                client_id: "fb".into(),
                client_secret: "s3cret".into(),
            })
        );
    }

    #[test]
    fn overrides_take_precedence() {
        let config = config(&[("CLIENT_ID", "from-env"), ("ID_TOKEN_LEEWAY_SECONDS", "5")])
            .unwrap()
            .with_overrides(Overrides {
                client_id: Some("from-cli".into()),
                issuers: vec!["https://issuer.example".into()],
                jwks_uri: Some("https://issuer.example/jwks".into()),
                leeway_seconds: None,
                backend: Some(VerifyBackend::TokenInfo),
            })
            .unwrap();

        assert_eq!(config.require_client_id(), Ok("from-cli"));
        assert_eq!(config.issuers, vec!["https://issuer.example"]);
        assert_eq!(config.jwks_uri, "https://issuer.example/jwks");
        assert_eq!(config.leeway_seconds, 5);
        assert_eq!(config.backend, VerifyBackend::TokenInfo);
    }

    #[test]
    fn empty_override_keeps_environment_value() {
        let config = config(&[("CLIENT_ID", "from-env")])
            .unwrap()
            .with_overrides(Overrides {
                client_id: Some("  ".into()),
                ..Overrides::default()
            })
            .unwrap();

        assert_eq!(config.require_client_id(), Ok("from-env"));
    }
}
