use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::Parser;
use ed25519_dalek::{Signer, SigningKey, pkcs8::DecodePrivateKey};
use sha2::{Digest, Sha256};

/// Mint an Ed25519-signed ID token and the JWK Set that verifies it.
///
/// Meant for exercising `idtoken-verifier` against a local issuer:
/// - serve the printed JWKS somewhere and point ID_TOKEN_JWKS_URI at it
/// - set ID_TOKEN_ALGORITHMS=EdDSA and ID_TOKEN_ISSUERS to `--iss`
/// - kid defaults to the RFC 7638 thumbprint of the public key
#[derive(Parser, Debug)]
#[command(name = "idtoken-gen", version, about)]
struct Args {
    /// Path to the issuer's Ed25519 private key in PEM (PKCS#8)
    #[arg(long, value_name = "FILE")]
    private_pem: PathBuf,

    /// Subject (`sub`)
    #[arg(long)]
    sub: String,

    /// Audience (`aud`), i.e. the client id the token is issued for
    #[arg(long)]
    aud: String,

    /// Issuer (`iss`)
    #[arg(long, default_value = "https://accounts.google.com")]
    iss: String,

    /// Lifetime in seconds; negative values mint an already expired token
    #[arg(long, default_value_t = 3600, allow_hyphen_values = true)]
    ttl: i64,

    /// Override iat (unix seconds). Default: now.
    #[arg(long)]
    iat: Option<i64>,

    /// Override kid. Default: JWK thumbprint.
    #[arg(long)]
    kid: Option<String>,

    /// Optional email claim
    #[arg(long)]
    email: Option<String>,

    /// Print only the token (no JWKS)
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn b64url_json(value: &serde_json::Value) -> Result<String> {
    let s = serde_json::to_string(value).context("serialize json")?;
    Ok(URL_SAFE_NO_PAD.encode(s.as_bytes()))
}

fn now_unix() -> Result<i64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time before unix epoch")?
        .as_secs() as i64)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let pem = fs::read_to_string(&args.private_pem)
        .with_context(|| format!("read {}", args.private_pem.display()))?;
    let signing_key = SigningKey::from_pkcs8_pem(&pem).context("parse Ed25519 PKCS#8 PEM")?;
    let x_b64 = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().as_bytes());

    // RFC7638 canonical JSON for OKP keys: {crv,kty,x}, lexicographic, no whitespace.
    let thumbprint_input = format!("{{\"crv\":\"Ed25519\",\"kty\":\"OKP\",\"x\":\"{}\"}}", x_b64);
    let kid = args
        .kid
        .clone()
        .unwrap_or_else(|| URL_SAFE_NO_PAD.encode(Sha256::digest(thumbprint_input.as_bytes())));

    let iat = match args.iat {
        Some(iat) => iat,
        None => now_unix()?,
    };
    let exp = iat + args.ttl;

    let header = serde_json::json!({
        "alg": "EdDSA",
        "typ": "JWT",
        "kid": kid,
    });

    let mut claims = serde_json::Map::new();
    claims.insert("iss".to_string(), args.iss.clone().into());
    claims.insert("azp".to_string(), args.aud.clone().into());
    claims.insert("aud".to_string(), args.aud.clone().into());
    claims.insert("sub".to_string(), args.sub.clone().into());
    claims.insert("iat".to_string(), iat.into());
    claims.insert("exp".to_string(), exp.into());
    if let Some(email) = args.email.clone() {
        claims.insert("email".to_string(), email.into());
        claims.insert("email_verified".to_string(), true.into());
    }

    let signing_input = format!(
        "{}.{}",
        b64url_json(&header)?,
        b64url_json(&serde_json::Value::Object(claims))?
    );
    let signature = signing_key.sign(signing_input.as_bytes());
    let token = format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature.to_bytes()));

    if args.quiet {
        println!("{}", token);
        return Ok(());
    }

    let jwks = serde_json::json!({
        "keys": [{
            "kty": "OKP",
            "crv": "Ed25519",
            "x": x_b64,
            "kid": kid,
            "alg": "EdDSA",
            "use": "sig",
        }]
    });

    println!("token: {}", token);
    println!("kid: {}", kid);
    println!("exp: {}", exp);
    println!("jwks: {}", serde_json::to_string_pretty(&jwks)?);

    Ok(())
}
