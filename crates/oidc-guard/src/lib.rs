//! # oidc-guard - OIDC Bearer-Token Validation
//!
//! Validates bearer JWTs issued by an OpenID Connect provider (Keycloak-style
//! realms) and decides role-based access for the caller.
//!
//! ## Pipeline
//!
//! ```text
//! discovery (once) -> JWKS key cache -> token validator -> principal -> authorization
//! ```
//!
//! - [`discovery`] - one-shot fetch of the realm's well-known metadata
//! - [`jwks`] - TTL-based signing key cache with fail-soft refresh
//! - [`validator`] - `kid` lookup, RSA signature check, `aud`/`iss`/`exp`/`nbf`/`iat`
//! - [`principal`] - identity and roles projected from validated claims
//! - [`authz`] - "any one of these roles" authorization, empty set always passes
//! - [`authenticator`] - [`OidcAuthenticator`] composing the above
//!
//! ## Design Principles
//!
//! - **Fail-closed on trust**: any signature or claim failure rejects the token
//! - **Fail-soft on availability**: a failed key refresh keeps serving the
//!   previously fetched keys
//! - **No algorithm confusion**: the accepted algorithms come from
//!   configuration, never from the token
//!
//! ## Quick Start
//!
//! ```no_run
//! use oidc_guard::{OidcAuthenticator, OidcConfig, RoleSet};
//!
//! # async fn run(token: &str) -> oidc_guard::AuthResult<()> {
//! let config = OidcConfig::new("http://localhost:8080", "project-realm", "project-web");
//! let authenticator = OidcAuthenticator::initialize(config).await?;
//!
//! let principal = authenticator.authenticate(token).await?;
//! if oidc_guard::authorize(&principal, &RoleSet::from(["admin".to_string()])) {
//!     println!("{:?} is an admin", principal.username());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` - Tower `Layer`/`Service` for `http` requests ([`tower`])
//!
//! ## Logging
//!
//! All diagnostics go through `tracing`; install a subscriber in the
//! application to see them. Tokens and key material are never logged.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod authenticator;
pub mod authz;
pub mod claims;
pub mod config;
pub mod discovery;
pub mod error;
pub mod jwks;
pub mod principal;
pub mod validator;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

#[doc(inline)]
pub use authenticator::{OidcAuthenticator, require_token};

#[doc(inline)]
pub use authz::{RoleSet, authorize, authorize_client, require_any_role, role_set};

#[doc(inline)]
pub use claims::{Audience, ValidatedClaims};

#[doc(inline)]
pub use config::OidcConfig;

#[doc(inline)]
pub use discovery::{DiscoveryClient, DiscoveryDocument, discovery_url};

#[doc(inline)]
pub use error::{AuthError, AuthResult, ErrorCategory};

#[doc(inline)]
pub use jwks::{KeyCache, KeySet, SigningKey};

#[doc(inline)]
pub use principal::Principal;

#[doc(inline)]
pub use validator::TokenValidator;

// Algorithm appears in OidcConfig's public API
pub use jsonwebtoken::Algorithm;
