// tests/common/mod.rs
#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use nila_sso::prelude::*;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AZURE_TENANT: &str = "test-tenant";
pub const AZURE_CLIENT_ID: &str = "client-123";
pub const AZURE_ISSUER: &str = "https://login.microsoftonline.com/test-tenant/v2.0";
pub const AZURE_KEYS_PATH: &str = "/test-tenant/discovery/v2.0/keys";

pub const OKTA_ISSUER: &str = "https://dev-1.okta.com/oauth2/default";
pub const OKTA_AUDIENCE: &str = "api://default";
pub const OKTA_KEYS_PATH: &str = "/okta/v1/keys";

pub const AUTH0_DOMAIN: &str = "acme.auth0.com";
pub const AUTH0_ISSUER: &str = "https://acme.auth0.com/";
pub const AUTH0_AUDIENCE: &str = "https://api.acme.test";
pub const AUTH0_KEYS_PATH: &str = "/auth0/.well-known/jwks.json";

// Public coordinates of tests/fixtures/signing_key_ec.pem.
const EC_X: &str = "4EQkEg34q231gwx-l4xT_RxbtZ9ofMUgTFT3YOodwQY";
const EC_Y: &str = "PinVNKicxXDmboG2wOrgW-gtewDaWR7t3ZhRdYtzAoI";

/// Signs test tokens and publishes the matching JWK.
pub struct TestSigner {
    encoding_key: EncodingKey,
    algorithm: Algorithm,
    pub kid: String,
    pub jwk: Value,
}

impl TestSigner {
    pub fn primary() -> Self {
        Self::rsa(include_str!("../fixtures/signing_key_primary.pem"))
    }

    pub fn rotated() -> Self {
        Self::rsa(include_str!("../fixtures/signing_key_rotated.pem"))
    }

    pub fn ec() -> Self {
        let encoding_key = EncodingKey::from_ec_pem(include_bytes!("../fixtures/signing_key_ec.pem")).unwrap();
        let kid = thumbprint(&json!({"crv": "P-256", "kty": "EC", "x": EC_X, "y": EC_Y}));
        let jwk = json!({"kty": "EC", "use": "sig", "crv": "P-256", "kid": kid, "x": EC_X, "y": EC_Y});
        Self {
            encoding_key,
            algorithm: Algorithm::ES256,
            kid,
            jwk,
        }
    }

    fn rsa(pem: &str) -> Self {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem).unwrap();
        let n = base64_url::encode(&private_key.n().to_bytes_be());
        let e = base64_url::encode(&private_key.e().to_bytes_be());
        let kid = thumbprint(&json!({"e": e, "kty": "RSA", "n": n}));
        let jwk = json!({"kty": "RSA", "use": "sig", "alg": "RS256", "kid": kid, "n": n, "e": e});

        let der = private_key.to_pkcs1_der().unwrap();
        Self {
            encoding_key: EncodingKey::from_rsa_der(der.as_bytes()),
            algorithm: Algorithm::RS256,
            kid,
            jwk,
        }
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        encode(header, claims, &self.encoding_key).unwrap()
    }

    /// Signs a payload given as raw JSON text, e.g. with repeated members.
    pub fn sign_raw_payload(&self, payload: &str) -> String {
        let header = json!({"alg": format!("{:?}", self.algorithm), "typ": "JWT", "kid": self.kid});
        let message = format!(
            "{}.{}",
            base64_url::encode(header.to_string().as_bytes()),
            base64_url::encode(payload.as_bytes())
        );
        let signature = jsonwebtoken::crypto::sign(message.as_bytes(), &self.encoding_key, self.algorithm).unwrap();
        format!("{}.{}", message, signature)
    }
}

// RFC 7638 thumbprint of the canonical JWK members.
fn thumbprint(canonical_jwk: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_jwk.to_string().as_bytes());
    base64_url::encode(&hasher.finalize())
}

pub fn jwks(signers: &[&TestSigner]) -> Value {
    json!({ "keys": signers.iter().map(|s| s.jwk.clone()).collect::<Vec<_>>() })
}

pub fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

pub fn azure_claims() -> Value {
    json!({
        "iss": AZURE_ISSUER,
        "aud": AZURE_CLIENT_ID,
        "sub": "azure-user-1",
        "email": "ada@contoso.test",
        "name": "Ada Lovelace",
        "iat": now(),
        "exp": now() + 300,
    })
}

pub fn okta_claims() -> Value {
    json!({
        "iss": OKTA_ISSUER,
        "aud": OKTA_AUDIENCE,
        "sub": "00u-okta-user",
        "email": "grace@okta.test",
        "exp": now() + 300,
    })
}

pub fn auth0_claims() -> Value {
    json!({
        "iss": AUTH0_ISSUER,
        "aud": [AUTH0_AUDIENCE, "https://acme.auth0.com/userinfo"],
        "sub": "auth0|42",
        "exp": now() + 300,
    })
}

/// Returns `claims` with `key` set to `value`.
pub fn with(mut claims: Value, key: &str, value: Value) -> Value {
    claims[key] = value;
    claims
}

/// Returns `claims` without `key`.
pub fn without(mut claims: Value, key: &str) -> Value {
    if let Some(map) = claims.as_object_mut() {
        map.remove(key);
    }
    claims
}

/// A builder with all three providers fetching keys from `server`.
pub fn builder_for(server: &MockServer) -> GatewayConfigBuilder {
    let uri = server.uri();
    GatewayConfigBuilder::new()
        .provider_settings(
            Provider::Azure,
            ProviderSettings {
                tenant_or_issuer: Some(AZURE_TENANT.to_string()),
                client_id_or_audience: Some(AZURE_CLIENT_ID.to_string()),
                discovery_base_url: Some(uri.clone()),
                ..Default::default()
            },
        )
        .unwrap()
        .provider_settings(
            Provider::Okta,
            ProviderSettings {
                tenant_or_issuer: Some(OKTA_ISSUER.to_string()),
                discovery_base_url: Some(format!("{}/okta", uri)),
                ..Default::default()
            },
        )
        .unwrap()
        .provider_settings(
            Provider::Auth0,
            ProviderSettings {
                tenant_or_issuer: Some(AUTH0_DOMAIN.to_string()),
                client_id_or_audience: Some(AUTH0_AUDIENCE.to_string()),
                discovery_base_url: Some(format!("{}/auth0", uri)),
                ..Default::default()
            },
        )
        .unwrap()
        .fetch_timeout(Duration::from_secs(2))
}

pub fn validator_for(server: &MockServer) -> TokenValidator {
    TokenValidator::new(builder_for(server).build().unwrap()).unwrap()
}

pub async fn mount_jwks(server: &MockServer, keys_path: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(keys_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serves `signers` on every provider's keys endpoint.
pub async fn mount_all_jwks(server: &MockServer, signers: &[&TestSigner]) {
    for keys_path in [AZURE_KEYS_PATH, OKTA_KEYS_PATH, AUTH0_KEYS_PATH] {
        mount_jwks(server, keys_path, jwks(signers)).await;
    }
}

/// Number of requests `server` received for `keys_path`.
pub async fn requests_to(server: &MockServer, keys_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == keys_path)
        .count()
}
