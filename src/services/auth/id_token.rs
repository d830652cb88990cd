use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::services::auth::jwks::{KeySource, KeySourceError};

/// Errors returned by ID token verification.
///
/// Everything except `KeySource` means "token verification failed"; `KeySource` means we
/// could not reach (or understand) the issuer and the token was never judged.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token has expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token audience does not match the client id")]
    AudienceMismatch,
    #[error("token issuer is not accepted")]
    IssuerMismatch,
    #[error("unsupported token algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("no signing key matches kid '{0}'")]
    UnknownKey(String),
    #[error("empty '{0}' claim")]
    EmptyClaim(&'static str),
    #[error("token rejected by verifier: {0}")]
    Rejected(String),
    #[error("key source unavailable: {0}")]
    KeySource(#[from] KeySourceError),
}

impl VerifyError {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::KeySource(_))
    }
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience => Self::AudienceMismatch,
            ErrorKind::InvalidIssuer => Self::IssuerMismatch,
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::Malformed(format!("missing required claim '{}'", claim))
            }
            _ => Self::Malformed(e.to_string()),
        }
    }
}

/// Verified ID token payload.
///
/// - `aud` may be a string or an array in the token; it is always a list here.
/// - `exp` / `iat` accept numbers or numeric strings (tokeninfo returns strings).
/// - Claims without a dedicated field are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub exp: u64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub iat: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_flag"
    )]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl IdTokenClaims {
    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|a| a == audience)
    }

    // Required (non-empty) checks on top of what the decoder enforces.
    fn ensure_present(&self) -> Result<(), VerifyError> {
        if self.iss.trim().is_empty() {
            return Err(VerifyError::EmptyClaim("iss"));
        }
        if self.sub.trim().is_empty() {
            return Err(VerifyError::EmptyClaim("sub"));
        }
        if self.exp == 0 {
            return Err(VerifyError::EmptyClaim("exp"));
        }
        if !self.aud.iter().any(|a| !a.trim().is_empty()) {
            return Err(VerifyError::EmptyClaim("aud"));
        }
        Ok(())
    }

    /// Checks a verifier that does not go through `jsonwebtoken::Validation` must do itself.
    pub fn ensure_valid_for(&self, audience: &str, issuers: &[String]) -> Result<(), VerifyError> {
        self.ensure_present()?;
        if !self.has_audience(audience) {
            return Err(VerifyError::AudienceMismatch);
        }
        if !issuers.iter().any(|i| i == &self.iss) {
            return Err(VerifyError::IssuerMismatch);
        }
        Ok(())
    }
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Audience::deserialize(deserializer)? {
        Audience::One(aud) => vec![aud],
        Audience::Many(auds) => auds,
    })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Number(u64),
        Text(String),
    }

    match Timestamp::deserialize(deserializer)? {
        Timestamp::Number(n) => Ok(n),
        Timestamp::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Text(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(serde::de::Error::custom(format!("invalid boolean '{}'", s))),
        },
    }
}

/// The identity-provider verification capability.
///
/// Contract: verify signature, audience, expiry and issuer; return the claims or fail.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<IdTokenClaims, VerifyError>;
}

/// Local signature verifier backed by the issuer's JWK Set.
///
/// `jsonwebtoken::Validation` checks signature, `exp`, `iss` and `aud`; on top of that the
/// header `alg` must be allow-listed and `iss`/`sub`/`aud` must not be empty.
#[derive(Clone)]
pub struct JwksVerifier {
    keys: Arc<dyn KeySource>,
    audience: String,
    issuers: Vec<String>,
    algorithms: Vec<Algorithm>,
    leeway_seconds: u64,
}

impl std::fmt::Debug for JwksVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksVerifier")
            .field("audience", &self.audience)
            .field("issuers", &self.issuers)
            .field("algorithms", &self.algorithms)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl JwksVerifier {
    pub fn new(
        keys: Arc<dyn KeySource>,
        audience: impl Into<String>,
        issuers: Vec<String>,
    ) -> Self {
        Self {
            keys,
            audience: audience.into(),
            issuers,
            algorithms: vec![Algorithm::RS256],
            leeway_seconds: 0,
        }
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&self.issuers);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.leeway_seconds;
        validation
    }

    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, VerifyError> {
        let unknown = || VerifyError::UnknownKey(kid.unwrap_or("<none>").to_string());
        let current = self.keys.keys().await?;

        let jwk = match find_key(&current.jwks, kid) {
            Some(jwk) => jwk.clone(),
            // Just fetched: asking again would return the same set.
            None if current.fetched => return Err(unknown()),
            None => {
                // Unknown kid: the issuer may have rotated keys since we cached them.
                debug!(kid = ?kid, "signing key not cached, refreshing JWKS");
                let set = self.keys.refresh().await?.ok_or_else(unknown)?;
                find_key(&set, kid).cloned().ok_or_else(unknown)?
            }
        };

        DecodingKey::from_jwk(&jwk)
            .map_err(|e| VerifyError::KeySource(KeySourceError::InvalidKey(e.to_string())))
    }
}

// Without a `kid` we only trust a single-key set.
fn find_key<'a>(set: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => set.find(kid),
        None if set.keys.len() == 1 => set.keys.first(),
        None => None,
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<IdTokenClaims, VerifyError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerifyError::Malformed("empty token".into()));
        }

        let header = jsonwebtoken::decode_header(token)?;
        if !self.algorithms.contains(&header.alg) {
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }

        let key = self.decoding_key(header.kid.as_deref()).await?;
        let data =
            jsonwebtoken::decode::<IdTokenClaims>(token, &key, &self.validation(header.alg))?;

        data.claims.ensure_present()?;
        Ok(data.claims)
    }
}
