//! Shared helpers: Ed25519-signed ID tokens and a wiremock JWKS endpoint.
#![allow(dead_code)]

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{Signer, SigningKey};
use idtoken_verifier::config::Config;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "my-client-id";
pub const ISSUER: &str = "https://accounts.google.com";
pub const SUBJECT: &str = "110169484474386276334";

pub struct TestKey {
    pub kid: String,
    signing_key: SigningKey,
}

impl TestKey {
    pub fn new(kid: &str, seed: u8) -> Self {
        Self {
            kid: kid.to_string(),
            signing_key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().as_bytes()),
            "kid": self.kid,
            "alg": "EdDSA",
            "use": "sig",
        })
    }

    /// Compact JWS over `claims`, header `{alg: EdDSA, typ: JWT, kid}`.
    pub fn sign(&self, claims: &Value) -> String {
        let header = json!({"alg": "EdDSA", "typ": "JWT", "kid": self.kid});
        let signing_input = format!("{}.{}", b64_json(&header), b64_json(claims));
        let signature = self.signing_key.sign(signing_input.as_bytes());
        format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature.to_bytes()))
    }
}

fn b64_json(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}

pub fn jwks(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Google-shaped ID token claims expiring `exp_in` seconds from now.
pub fn claims(aud: &str, exp_in: i64) -> Value {
    let now = now();
    json!({
        "iss": ISSUER,
        "azp": aud,
        "aud": aud,
        "sub": SUBJECT,
        "email": "someone@example.com",
        "email_verified": true,
        "iat": now - 60,
        "exp": now + exp_in,
    })
}

/// Mount `GET /certs` serving `body` with the given `Cache-Control`.
pub async fn mount_jwks(server: &MockServer, body: &Value, cache_control: &str) {
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", cache_control)
                .set_body_json(body),
        )
        .mount(server)
        .await;
}

pub async fn jwks_server(keys: &[&TestKey]) -> MockServer {
    let server = MockServer::start().await;
    mount_jwks(&server, &jwks(keys), "public, max-age=3600").await;
    server
}

pub async fn jwks_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/certs")
        .count()
}

/// Config pointing at a local issuer that signs with EdDSA.
pub fn config(server: &MockServer, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("CLIENT_ID".to_string(), CLIENT_ID.to_string()),
        ("ID_TOKEN_ISSUERS".to_string(), ISSUER.to_string()),
        ("ID_TOKEN_ALGORITHMS".to_string(), "EdDSA".to_string()),
        ("ID_TOKEN_JWKS_URI".to_string(), format!("{}/certs", server.uri())),
        ("TOKENINFO_URL".to_string(), format!("{}/tokeninfo", server.uri())),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_vars(|key| vars.get(key).cloned()).unwrap()
}
