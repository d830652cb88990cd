use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, Overrides, VerifyBackend};

/// Verify OpenID Connect ID tokens (Google by default) and print the subject.
///
/// Settings come from the environment (and `.env`); the global options below override them.
#[derive(Parser, Debug)]
#[command(name = "idtoken-verifier", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Expected audience, i.e. the OAuth2 client id (overrides CLIENT_ID)
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Accepted issuer; repeat for several (overrides ID_TOKEN_ISSUERS)
    #[arg(long = "issuer", value_name = "ISSUER", global = true)]
    pub issuers: Vec<String>,

    /// JWK Set URL (overrides ID_TOKEN_JWKS_URI)
    #[arg(long, value_name = "URL", global = true)]
    pub jwks_uri: Option<String>,

    /// Allowed clock skew for exp, seconds (overrides ID_TOKEN_LEEWAY_SECONDS)
    #[arg(long, value_name = "SECONDS", global = true)]
    pub leeway: Option<u64>,

    /// Verification backend: jwks or tokeninfo (overrides VERIFY_BACKEND)
    #[arg(long, value_parser = parse_backend, global = true)]
    pub backend: Option<VerifyBackend>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Verify an ID token and print its subject
    Verify {
        /// The ID token; `-` reads it from stdin
        token: String,

        /// Print all verified claims as JSON instead of the subject
        #[arg(long, default_value_t = false)]
        claims: bool,
    },

    /// Authorize a provider-prefixed credential (`G<google id token>`, `F<...>`)
    Authorize {
        credential: String,
    },
}

impl GlobalArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            client_id: self.client_id.clone(),
            issuers: self.issuers.clone(),
            jwks_uri: self.jwks_uri.clone(),
            leeway_seconds: self.leeway,
            backend: self.backend,
        }
    }
}

fn parse_backend(value: &str) -> Result<VerifyBackend, ConfigError> {
    value.parse()
}
