//! Common test utilities for integration tests
//!
//! A `wiremock` identity provider serving a Keycloak-shaped discovery document
//! and JWKS, RSA signing keys, and JWT helpers.

#![allow(dead_code)]

use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oidc_guard::OidcConfig;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "project-realm";
pub const CLIENT_ID: &str = "project-web";

/// RSA key pair used to sign test tokens
pub struct TestKey {
    pub kid: String,
    pub private_pem: Vec<u8>,
    pub n: String,
    pub e: String,
}

impl TestKey {
    /// Generate a 2048-bit key
    pub fn generate(kid: &str) -> Self {
        use rsa::RsaPrivateKey;
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode private key")
            .as_bytes()
            .to_vec();

        Self {
            kid: kid.to_string(),
            private_pem,
            n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
        }
    }

    /// Public half as a JWKS entry
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": self.n,
            "e": self.e,
        })
    }

    /// Sign `claims` with RS256 under this key's `kid`
    pub fn sign(&self, claims: &Value) -> String {
        generate_test_jwt(claims, &self.private_pem, Algorithm::RS256, Some(&self.kid))
    }
}

/// Generated once per test binary; key generation is slow
pub static PRIMARY_KEY: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate("k1"));

/// Second key for rotation and wrong-key scenarios
pub static SECONDARY_KEY: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate("k2"));

/// Mock OIDC provider hosting one realm
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    /// Start a provider with no endpoints mounted
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start a provider serving discovery and a JWKS holding `keys`
    pub async fn with_keys(keys: &[&TestKey]) -> Self {
        let idp = Self::start().await;
        idp.mock_discovery().await;
        idp.mock_jwks(keys).await;
        idp
    }

    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server.uri(), REALM)
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.server.uri(), Self::jwks_path())
    }

    pub fn discovery_path() -> String {
        format!("/realms/{REALM}/.well-known/openid-configuration")
    }

    pub fn jwks_path() -> String {
        format!("/realms/{REALM}/protocol/openid-connect/certs")
    }

    /// Configuration pointing at this provider
    pub fn config(&self) -> OidcConfig {
        OidcConfig::new(self.base_url(), REALM, CLIENT_ID)
    }

    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "jwks_uri": self.jwks_uri(),
            "authorization_endpoint": format!("{}/protocol/openid-connect/auth", self.issuer()),
            "token_endpoint": format!("{}/protocol/openid-connect/token", self.issuer()),
            "userinfo_endpoint": format!("{}/protocol/openid-connect/userinfo", self.issuer()),
            "end_session_endpoint": format!("{}/protocol/openid-connect/logout", self.issuer()),
            "id_token_signing_alg_values_supported": ["RS256", "PS256"],
            "grant_types_supported": ["authorization_code", "refresh_token"],
        })
    }

    /// Mount the discovery endpoint
    pub async fn mock_discovery(&self) {
        Mock::given(method("GET"))
            .and(path(Self::discovery_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.discovery_document()))
            .mount(&self.server)
            .await;
    }

    /// Mount the JWKS endpoint serving `keys`
    pub async fn mock_jwks(&self, keys: &[&TestKey]) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .mount(&self.server)
            .await;
    }

    /// Mount the JWKS endpoint and require exactly `times` fetches
    ///
    /// Verified when the provider is dropped.
    pub async fn mock_jwks_expect(&self, keys: &[&TestKey], times: u64) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` for the next `times` fetches only
    pub async fn mock_jwks_times(&self, keys: &[&TestKey], times: u64) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint answers with `status`
    pub async fn mock_jwks_failure(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint serving `keys` only after `delay`
    pub async fn mock_jwks_delayed(&self, keys: &[&TestKey], delay: Duration) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks(keys))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Discovery endpoint answering only after `delay`
    pub async fn mock_discovery_delayed(&self, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(Self::discovery_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(self.discovery_document())
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// HTTP client whose requests give up after `timeout`
    pub fn client_with_timeout(&self, timeout: Duration) -> reqwest::Client {
        self.config()
            .with_request_timeout(timeout)
            .http_client()
            .unwrap()
    }

    /// Drop every mounted endpoint
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of JWKS requests received so far
    pub async fn jwks_fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == Self::jwks_path())
            .count()
    }
}

/// JWKS document for `keys`
pub fn jwks(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Encode a JWT with an optional `kid` header
pub fn generate_test_jwt(
    claims: &Value,
    private_key: &[u8],
    algorithm: Algorithm,
    kid: Option<&str>,
) -> String {
    let key = match algorithm {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::PS256 => {
            EncodingKey::from_rsa_pem(private_key).expect("Invalid RSA key")
        }
        Algorithm::HS256 => EncodingKey::from_secret(private_key),
        _ => panic!("Unsupported algorithm for test JWT"),
    };

    let mut header = Header::new(algorithm);
    header.typ = Some("JWT".to_string());
    header.kid = kid.map(String::from);

    encode(&header, claims, &key).expect("Failed to encode test JWT")
}

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Keycloak-style access token claims valid for five minutes
pub fn access_token_claims(issuer: &str, realm_roles: &[&str]) -> Value {
    let now = current_timestamp();
    json!({
        "sub": "f1b7c0de-0000-4000-8000-000000000001",
        "iss": issuer,
        "aud": CLIENT_ID,
        "exp": now + 300,
        "iat": now,
        "nbf": now,
        "preferred_username": "alice",
        "email": "alice@example.com",
        "name": "Alice Example",
        "realm_access": { "roles": realm_roles },
        "resource_access": {
            CLIENT_ID: { "roles": ["editor"] },
            "account": { "roles": ["view-profile"] }
        },
    })
}
