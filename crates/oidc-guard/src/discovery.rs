//! # OpenID Connect Discovery
//!
//! Fetches the realm's provider metadata from
//! `{base_url}/realms/{realm}/.well-known/openid-configuration` exactly once,
//! at startup. The resulting [`DiscoveryDocument`] is immutable for the
//! lifetime of the process; there is no periodic re-fetch.
//!
//! A document can only be constructed with a non-empty `issuer` and
//! `jwks_uri`, so a validator built from one never runs with partial
//! configuration. If discovery fails the caller gets
//! [`AuthError::DiscoveryUnavailable`] or
//! [`AuthError::MalformedDiscoveryDocument`] and has nothing to validate with.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Build the well-known discovery URL for a realm.
///
/// Path segments already in `base_url` are kept. `realm` is a single
/// percent-encoded segment, so `/`, `?` or spaces in it cannot alter the path.
///
/// # Errors
///
/// Returns [`AuthError::InvalidConfiguration`] if `base_url` is not an
/// absolute hierarchical URL.
pub fn discovery_url(base_url: &str, realm: &str) -> AuthResult<String> {
    let mut url = Url::parse(base_url)
        .map_err(|e| AuthError::InvalidConfiguration(format!("invalid base_url: {e}")))?;

    url.path_segments_mut()
        .map_err(|()| {
            AuthError::InvalidConfiguration(format!("base_url cannot be a base: {base_url}"))
        })?
        .pop_if_empty()
        .extend(["realms", realm, ".well-known", "openid-configuration"]);

    Ok(url.into())
}

/// Provider metadata needed by the validation pipeline
///
/// `issuer` and `jwks_uri` are guaranteed non-empty. The other endpoints are
/// kept for callers that need them; any remaining fields are preserved in
/// [`DiscoveryDocument::additional`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDocument {
    issuer: String,
    jwks_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    userinfo_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_session_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    id_token_signing_alg_values_supported: Vec<String>,
    #[serde(flatten)]
    additional: serde_json::Map<String, serde_json::Value>,
}

/// Wire shape: every field optional so absence is reported precisely
#[derive(Debug, Deserialize)]
struct RawDiscoveryDocument {
    issuer: Option<String>,
    jwks_uri: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    end_session_endpoint: Option<String>,
    #[serde(default)]
    id_token_signing_alg_values_supported: Vec<String>,
    #[serde(flatten)]
    additional: serde_json::Map<String, serde_json::Value>,
}

impl DiscoveryDocument {
    /// Create a document from its two required fields.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedDiscoveryDocument`] if either field is empty.
    pub fn new(issuer: impl Into<String>, jwks_uri: impl Into<String>) -> AuthResult<Self> {
        let issuer = require_field("issuer", Some(issuer.into()))?;
        let jwks_uri = require_field("jwks_uri", Some(jwks_uri.into()))?;

        Ok(Self {
            issuer,
            jwks_uri,
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            end_session_endpoint: None,
            id_token_signing_alg_values_supported: Vec::new(),
            additional: serde_json::Map::new(),
        })
    }

    /// Parse a discovery document from its JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedDiscoveryDocument`] if the body is not a
    /// JSON object or lacks a non-empty `issuer` or `jwks_uri`.
    pub fn from_json(body: &[u8]) -> AuthResult<Self> {
        let raw: RawDiscoveryDocument = serde_json::from_slice(body)
            .map_err(|e| AuthError::MalformedDiscoveryDocument(format!("Invalid JSON: {e}")))?;

        Ok(Self {
            issuer: require_field("issuer", raw.issuer)?,
            jwks_uri: require_field("jwks_uri", raw.jwks_uri)?,
            authorization_endpoint: raw.authorization_endpoint,
            token_endpoint: raw.token_endpoint,
            userinfo_endpoint: raw.userinfo_endpoint,
            end_session_endpoint: raw.end_session_endpoint,
            id_token_signing_alg_values_supported: raw.id_token_signing_alg_values_supported,
            additional: raw.additional,
        })
    }

    /// Token issuer; tokens must carry exactly this `iss`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// JWKS endpoint
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Authorization endpoint, if advertised
    pub fn authorization_endpoint(&self) -> Option<&str> {
        self.authorization_endpoint.as_deref()
    }

    /// Token endpoint, if advertised
    pub fn token_endpoint(&self) -> Option<&str> {
        self.token_endpoint.as_deref()
    }

    /// UserInfo endpoint, if advertised
    pub fn userinfo_endpoint(&self) -> Option<&str> {
        self.userinfo_endpoint.as_deref()
    }

    /// RP-initiated logout endpoint, if advertised
    pub fn end_session_endpoint(&self) -> Option<&str> {
        self.end_session_endpoint.as_deref()
    }

    /// ID token signing algorithms the provider supports
    pub fn id_token_signing_alg_values_supported(&self) -> &[String] {
        &self.id_token_signing_alg_values_supported
    }

    /// Fields not modelled explicitly
    pub fn additional(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.additional
    }
}

fn require_field(name: &str, value: Option<String>) -> AuthResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(AuthError::MalformedDiscoveryDocument(format!(
            "'{name}' is empty"
        ))),
        None => Err(AuthError::MalformedDiscoveryDocument(format!(
            "'{name}' is missing"
        ))),
    }
}

/// One-shot discovery document fetcher
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http_client: reqwest::Client,
}

impl DiscoveryClient {
    /// Create a client over a preconfigured HTTP client (timeouts live there)
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Fetch the discovery document for `realm` under `base_url`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidConfiguration`] if `base_url` is not a usable URL
    /// - [`AuthError::DiscoveryUnavailable`] if the endpoint is unreachable,
    ///   times out, or answers with a non-success status
    /// - [`AuthError::MalformedDiscoveryDocument`] if the body is not JSON or
    ///   lacks `issuer` / `jwks_uri`
    pub async fn initialize(&self, base_url: &str, realm: &str) -> AuthResult<DiscoveryDocument> {
        let url = discovery_url(base_url, realm)?;
        self.fetch(&url).await
    }

    /// Fetch a discovery document from an explicit URL.
    ///
    /// # Errors
    ///
    /// Same as [`DiscoveryClient::initialize`].
    pub async fn fetch(&self, url: &str) -> AuthResult<DiscoveryDocument> {
        debug!(discovery_url = %url, "Fetching OIDC discovery document");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            error!(discovery_url = %url, error = %e, "Failed to fetch discovery document");
            AuthError::DiscoveryUnavailable(format!("Request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(
                discovery_url = %url,
                status = %status,
                "Discovery endpoint returned error status"
            );
            return Err(AuthError::DiscoveryUnavailable(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(discovery_url = %url, error = %e, "Failed to read discovery response");
            AuthError::DiscoveryUnavailable(format!("Failed to read response: {e}"))
        })?;

        let document = DiscoveryDocument::from_json(&body).inspect_err(|e| {
            error!(discovery_url = %url, error = %e, "Discovery document rejected");
        })?;

        info!(
            issuer = %document.issuer,
            jwks_uri = %document.jwks_uri,
            "OIDC discovery completed"
        );

        Ok(document)
    }
}
