//! OIDC authenticator
//!
//! [`OidcAuthenticator`] composes the pipeline: discovery runs once inside
//! [`OidcAuthenticator::initialize`], which builds the [`KeyCache`] and
//! [`TokenValidator`] from the discovered metadata. Because construction only
//! succeeds after discovery, there is no "not yet ready" state to check at
//! request time.
//!
//! The authenticator is cheap to clone; clones share one key cache.
//!
//! ```no_run
//! use oidc_guard::{OidcAuthenticator, OidcConfig, role_set};
//!
//! # async fn example(token: &str) -> oidc_guard::AuthResult<()> {
//! let config = OidcConfig::new("https://sso.example.com", "project-realm", "project-web");
//! let authenticator = OidcAuthenticator::initialize(config).await?;
//!
//! let principal = authenticator.authorize(token, &role_set(["admin", "editor"])).await?;
//! println!("hello {:?}", principal.username());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::authz::{RoleSet, require_any_role};
use crate::config::OidcConfig;
use crate::discovery::{DiscoveryClient, DiscoveryDocument};
use crate::error::{AuthError, AuthResult};
use crate::jwks::KeyCache;
use crate::principal::Principal;
use crate::validator::TokenValidator;

/// Bearer-token authenticator for one realm and one client
#[derive(Debug, Clone)]
pub struct OidcAuthenticator {
    config: Arc<OidcConfig>,
    discovery: Arc<DiscoveryDocument>,
    validator: TokenValidator,
}

impl OidcAuthenticator {
    /// Validate `config`, run discovery and build the validation pipeline.
    ///
    /// No JWKS fetch happens here; keys are fetched on first use (or by
    /// [`OidcAuthenticator::warm_up`]).
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidConfiguration`] if `config` is invalid
    /// - [`AuthError::DiscoveryUnavailable`] / [`AuthError::MalformedDiscoveryDocument`]
    ///   if discovery fails
    pub async fn initialize(config: OidcConfig) -> AuthResult<Self> {
        config.validate()?;

        let http_client = config.http_client()?;
        let discovery = DiscoveryClient::new(http_client.clone())
            .initialize(&config.base_url, &config.realm)
            .await?;

        let authenticator = Self::build(config, discovery, http_client);

        info!(
            realm = %authenticator.config.realm,
            client_id = %authenticator.config.client_id,
            issuer = %authenticator.discovery.issuer(),
            "OIDC authenticator initialized"
        );

        Ok(authenticator)
    }

    /// Build from an already obtained discovery document, skipping the
    /// network round trip.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] if `config` is invalid.
    pub fn from_discovery(config: OidcConfig, discovery: DiscoveryDocument) -> AuthResult<Self> {
        config.validate()?;
        let http_client = config.http_client()?;
        Ok(Self::build(config, discovery, http_client))
    }

    fn build(config: OidcConfig, discovery: DiscoveryDocument, http_client: reqwest::Client) -> Self {
        let key_cache = Arc::new(KeyCache::new(
            discovery.jwks_uri(),
            http_client,
            config.jwks_cache_ttl,
            config.min_refresh_interval,
        ));
        let validator = TokenValidator::from_config(&config, &discovery, key_cache);

        Self {
            config: Arc::new(config),
            discovery: Arc::new(discovery),
            validator,
        }
    }

    /// Fetch the key set now instead of on the first request.
    ///
    /// Failure is not fatal: it is logged and the next validation retries
    /// through the normal lazy path.
    pub async fn warm_up(&self) {
        match self.validator.key_cache().refresh().await {
            Ok(set) => debug!(key_count = set.len(), "JWKS warm-up complete"),
            Err(e) => warn!(
                jwks_uri = %self.discovery.jwks_uri(),
                error = %e,
                "JWKS warm-up failed, keys will be fetched on first request"
            ),
        }
    }

    /// Validate `token` and return the caller's principal.
    ///
    /// # Errors
    ///
    /// Any token or key error from [`TokenValidator::validate`].
    pub async fn authenticate(&self, token: &str) -> AuthResult<Principal> {
        let claims = self.validator.validate(token).await?;
        Ok(Principal::extract(claims))
    }

    /// Validate `token` and require any one of `required` realm roles.
    ///
    /// An empty `required` set only requires a valid token.
    ///
    /// # Errors
    ///
    /// Errors of [`OidcAuthenticator::authenticate`], or
    /// [`AuthError::ForbiddenRole`] if the role check fails.
    pub async fn authorize(&self, token: &str, required: &RoleSet) -> AuthResult<Principal> {
        let principal = self.authenticate(token).await?;
        require_any_role(&principal, required)?;
        Ok(principal)
    }

    /// Like [`OidcAuthenticator::authenticate`], but absence or any failure
    /// yields `None`.
    pub async fn authenticate_optional(&self, token: Option<&str>) -> Option<Principal> {
        let token = token?;
        match self.authenticate(token).await {
            Ok(principal) => Some(principal),
            Err(e) => {
                debug!(error = %e, "Optional authentication failed, continuing anonymously");
                None
            }
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Discovered provider metadata
    pub fn discovery(&self) -> &DiscoveryDocument {
        &self.discovery
    }

    /// Token validator
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Shared key cache
    pub fn key_cache(&self) -> &Arc<KeyCache> {
        self.validator.key_cache()
    }
}

/// Missing-token helper for boundaries that pass `Option<&str>`
///
/// # Errors
///
/// Returns [`AuthError::MissingToken`] for `None` or a blank token.
pub fn require_token(token: Option<&str>) -> AuthResult<&str> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}
