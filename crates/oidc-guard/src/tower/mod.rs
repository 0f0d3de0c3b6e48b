//! # Tower Middleware Integration
//!
//! [`OidcAuthLayer`] wraps an HTTP service with bearer-token authentication
//! backed by an [`OidcAuthenticator`](crate::OidcAuthenticator):
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use oidc_guard::tower::{OidcAuthLayer, RoleRequirement};
//! use oidc_guard::role_set;
//!
//! let service = ServiceBuilder::new()
//!     .layer(
//!         OidcAuthLayer::new(authenticator)
//!             .require(RoleRequirement::AnyRole(role_set(["admin"])))
//!             .bypass_path("/health"),
//!     )
//!     .service(my_http_handler);
//! ```
//!
//! ## Request Extensions
//!
//! On success the [`Principal`](crate::Principal) is inserted into the
//! request's extensions:
//!
//! ```rust,ignore
//! if let Some(principal) = req.extensions().get::<Principal>() {
//!     println!("Authenticated user: {:?}", principal.username());
//! }
//! ```
//!
//! ## Rejections
//!
//! | Error category | Response |
//! |----------------|----------|
//! | Unauthenticated | `401`, `WWW-Authenticate: Bearer` |
//! | Forbidden | `403` |
//! | Unavailable | `503` |
//! | Configuration | `500` |

mod layer;
mod service;

pub use layer::OidcAuthLayer;
pub use service::{OidcAuthService, OidcAuthServiceFuture, bearer_token};

use crate::authz::RoleSet;

/// What a request must present to reach the inner service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Attach a principal when a valid token is present; never reject
    Optional,
    /// A valid token is required
    #[default]
    Authenticated,
    /// A valid token holding any one of these realm roles is required
    AnyRole(RoleSet),
}

/// Configuration for the auth layer
#[derive(Debug, Clone, Default)]
pub struct AuthLayerConfig {
    /// Requirement applied to every non-bypassed request
    pub requirement: RoleRequirement,
    /// Request paths that skip authentication entirely (exact match)
    pub bypass_paths: Vec<String>,
}

impl AuthLayerConfig {
    /// Config with the given requirement and no bypass paths
    #[must_use]
    pub fn new(requirement: RoleRequirement) -> Self {
        Self {
            requirement,
            bypass_paths: Vec::new(),
        }
    }

    /// Add a path to the bypass list
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.bypass_paths.push(path.into());
        self
    }

    /// Check if a path should bypass authentication
    #[must_use]
    pub fn should_bypass(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }
}
