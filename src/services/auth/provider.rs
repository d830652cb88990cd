//! Credential-prefix authorization providers.
//!
//! A credential is `<prefix><provider payload>`, e.g. `G<google id token>`. The first
//! registered provider whose prefix matches handles it; nothing matching means the
//! credential itself is corrupted.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::services::auth::id_token::TokenVerifier;

pub const GOOGLE_PREFIX: &str = "G";
pub const FACEBOOK_PREFIX: &str = "F";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    CorruptedCredentials,
    Error,
}

impl AuthorizationStatus {
    /// Single-letter wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authorized => "S",
            Self::CorruptedCredentials => "C",
            Self::Error => "E",
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorized => f.write_str("authorized"),
            Self::CorruptedCredentials => f.write_str("corrupted credentials"),
            Self::Error => f.write_str("authorization error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub status: AuthorizationStatus,
    // `<provider prefix><subject>`, only set when authorized.
    pub user_id: Option<String>,
}

impl AuthorizationResponse {
    pub fn authorized(user_id: String) -> Self {
        Self {
            status: AuthorizationStatus::Authorized,
            user_id: Some(user_id),
        }
    }

    pub fn with_status(status: AuthorizationStatus) -> Self {
        Self {
            status,
            user_id: None,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.status == AuthorizationStatus::Authorized
    }
}

#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    fn prefix(&self) -> &'static str;

    fn accepts(&self, credential: &str) -> bool {
        credential.starts_with(self.prefix())
    }

    async fn authorize(&self, credential: &str) -> AuthorizationResponse;
}

pub struct GoogleProvider {
    client_id: String,
    verifier: Arc<dyn TokenVerifier>,
}

impl GoogleProvider {
    pub fn new(client_id: impl Into<String>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            client_id: client_id.into(),
            verifier,
        }
    }
}

#[async_trait]
impl AuthorizationProvider for GoogleProvider {
    fn prefix(&self) -> &'static str {
        GOOGLE_PREFIX
    }

    async fn authorize(&self, credential: &str) -> AuthorizationResponse {
        let token = credential.strip_prefix(GOOGLE_PREFIX).unwrap_or(credential);

        match self.verifier.verify(token).await {
            Ok(claims) if claims.has_audience(&self.client_id) => {
                AuthorizationResponse::authorized(format!("{}{}", GOOGLE_PREFIX, claims.subject()))
            }
            Ok(_) => {
                warn!(client_id = %self.client_id, "google token issued for another client");
                AuthorizationResponse::with_status(AuthorizationStatus::Error)
            }
            Err(err) => {
                warn!(error = %err, "google token verification failed");
                AuthorizationResponse::with_status(AuthorizationStatus::Error)
            }
        }
    }
}

/// Facebook login is registered but not implemented: every credential is refused.
pub struct FacebookProvider {
    client_id: String,
    client_secret: String,
}

impl fmt::Debug for FacebookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the app secret
        f.debug_struct("FacebookProvider")
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl FacebookProvider {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl AuthorizationProvider for FacebookProvider {
    fn prefix(&self) -> &'static str {
        FACEBOOK_PREFIX
    }

    async fn authorize(&self, _credential: &str) -> AuthorizationResponse {
        warn!(
            client_id = %self.client_id,
            has_secret = !self.client_secret.is_empty(),
            "facebook authorization is not supported"
        );
        AuthorizationResponse::with_status(AuthorizationStatus::Error)
    }
}

/// Ordered provider registry.
#[derive(Clone, Default)]
pub struct Authorizer {
    providers: Vec<Arc<dyn AuthorizationProvider>>,
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn AuthorizationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn authorize(&self, credential: &str) -> AuthorizationResponse {
        let Some(provider) = self.providers.iter().find(|p| p.accepts(credential)) else {
            warn!("no provider accepts credential");
            return AuthorizationResponse::with_status(AuthorizationStatus::CorruptedCredentials);
        };

        let response = provider.authorize(credential).await;
        info!(
            provider = provider.prefix(),
            status = response.status.code(),
            "authorization finished"
        );
        response
    }
}
