use async_trait::async_trait;
use tracing::debug;

use crate::services::auth::id_token::{IdTokenClaims, TokenVerifier, VerifyError};
use crate::services::auth::jwks::KeySourceError;

/// Remote verifier: lets the issuer's `tokeninfo` endpoint judge the token.
///
/// The endpoint checks signature and expiry; audience and issuer are still checked here.
#[derive(Clone, Debug)]
pub struct TokenInfoVerifier {
    http: reqwest::Client,
    endpoint: String,
    audience: String,
    issuers: Vec<String>,
}

impl TokenInfoVerifier {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        audience: impl Into<String>,
        issuers: Vec<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            audience: audience.into(),
            issuers,
        }
    }
}

#[async_trait]
impl TokenVerifier for TokenInfoVerifier {
    async fn verify(&self, token: &str) -> Result<IdTokenClaims, VerifyError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerifyError::Malformed("empty token".into()));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .form(&[("id_token", token)])
            .send()
            .await
            .map_err(|source| KeySourceError::Http {
                uri: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(KeySourceError::Status {
                uri: self.endpoint.clone(),
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            debug!(status = status.as_u16(), "tokeninfo rejected token");
            return Err(VerifyError::Rejected(format!(
                "tokeninfo returned HTTP {}",
                status.as_u16()
            )));
        }

        // A 200 we cannot read is the endpoint's fault, not the token's.
        let claims: IdTokenClaims = response.json().await.map_err(|e| {
            KeySourceError::InvalidDocument(format!("invalid tokeninfo response: {}", e))
        })?;

        claims.ensure_valid_for(&self.audience, &self.issuers)?;
        Ok(claims)
    }
}
