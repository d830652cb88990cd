pub mod factory;
pub mod id_token;
pub mod jwks;
pub mod provider;
pub mod tokeninfo;

pub use factory::{build_authorizer, build_http_client, build_verifier};
pub use id_token::{IdTokenClaims, JwksVerifier, TokenVerifier, VerifyError};
pub use jwks::{HttpKeySource, KeySet, KeySource, KeySourceError};
pub use provider::{AuthorizationResponse, AuthorizationStatus, Authorizer};
pub use tokeninfo::TokenInfoVerifier;
