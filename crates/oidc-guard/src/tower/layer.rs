//! Tower Layer implementation for authentication

use tower::Layer;

use crate::authenticator::OidcAuthenticator;

use super::service::OidcAuthService;
use super::{AuthLayerConfig, RoleRequirement};

/// Tower Layer that adds OIDC authentication to services
///
/// Wraps inner services with [`OidcAuthService`]. The authenticator is
/// cloned into every service; clones share one key cache.
#[derive(Debug, Clone)]
pub struct OidcAuthLayer {
    authenticator: OidcAuthenticator,
    config: AuthLayerConfig,
}

impl OidcAuthLayer {
    /// Create a layer requiring a valid token on every request
    pub fn new(authenticator: OidcAuthenticator) -> Self {
        Self {
            authenticator,
            config: AuthLayerConfig::default(),
        }
    }

    /// Create a layer with custom configuration
    pub fn with_config(authenticator: OidcAuthenticator, config: AuthLayerConfig) -> Self {
        Self {
            authenticator,
            config,
        }
    }

    /// Set the requirement
    #[must_use]
    pub fn require(mut self, requirement: RoleRequirement) -> Self {
        self.config.requirement = requirement;
        self
    }

    /// Add a path that skips authentication
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.config = self.config.bypass_path(path);
        self
    }

    /// Current configuration
    pub fn config(&self) -> &AuthLayerConfig {
        &self.config
    }
}

impl<S> Layer<S> for OidcAuthLayer {
    type Service = OidcAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OidcAuthService::new(inner, self.authenticator.clone(), self.config.clone())
    }
}
