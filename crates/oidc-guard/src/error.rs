//! Error taxonomy for the validation pipeline
//!
//! Every failure the pipeline can produce is a variant of [`AuthError`]. The
//! calling boundary usually only needs [`AuthError::category`] to decide on a
//! protocol response:
//!
//! | Category | Variants | Typical HTTP mapping |
//! |----------|----------|----------------------|
//! | [`ErrorCategory::Configuration`] | `InvalidConfiguration` | 500 |
//! | [`ErrorCategory::Unavailable`] | `DiscoveryUnavailable`, `MalformedDiscoveryDocument`, `KeyFetchFailed` | 503 |
//! | [`ErrorCategory::Unauthenticated`] | `MissingToken`, `MalformedToken`, `MissingKeyId`, `UnknownSigningKey`, `SignatureInvalid`, `ClaimInvalid` | 401 |
//! | [`ErrorCategory::Forbidden`] | `ForbiddenRole` | 403 |

use thiserror::Error;

/// Result alias used throughout the crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Configuration is incomplete or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Discovery endpoint unreachable or returned a non-success status
    #[error("Discovery document unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// Discovery document is not JSON or lacks `issuer` / `jwks_uri`
    #[error("Malformed discovery document: {0}")]
    MalformedDiscoveryDocument(String),

    /// JWKS fetch failed and no previously fetched key set could be served
    #[error("JWKS fetch failed: {0}")]
    KeyFetchFailed(String),

    /// No bearer token was presented
    #[error("Authentication required")]
    MissingToken,

    /// Token is not a structurally valid JWS compact serialization
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Token header carries no `kid`
    #[error("Token header is missing 'kid'")]
    MissingKeyId,

    /// No key with this `kid` exists in the provider's key set
    #[error("Unknown signing key '{0}'")]
    UnknownSigningKey(String),

    /// Signature verification failed or the algorithm is not allowed
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// A registered claim failed validation
    #[error("Claim '{claim}' invalid: {reason}")]
    ClaimInvalid {
        /// Name of the failing claim (`exp`, `aud`, ...)
        claim: String,
        /// Human readable reason
        reason: String,
    },

    /// Authenticated, but none of the required roles is held
    #[error("Access denied. Required roles: {}", required.join(", "))]
    ForbiddenRole {
        /// The role set that was required (any one suffices)
        required: Vec<String>,
    },
}

/// Coarse classification of an [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Misconfiguration of this process
    Configuration,
    /// The identity provider could not be reached or answered garbage
    Unavailable,
    /// The presented credential is absent, bad, expired, or forged
    Unauthenticated,
    /// The credential is fine but lacks permission
    Forbidden,
}

impl AuthError {
    /// Build a [`AuthError::ClaimInvalid`]
    pub fn claim(claim: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ClaimInvalid {
            claim: claim.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfiguration(_) => ErrorCategory::Configuration,
            Self::DiscoveryUnavailable(_)
            | Self::MalformedDiscoveryDocument(_)
            | Self::KeyFetchFailed(_) => ErrorCategory::Unavailable,
            Self::MissingToken
            | Self::MalformedToken(_)
            | Self::MissingKeyId
            | Self::UnknownSigningKey(_)
            | Self::SignatureInvalid(_)
            | Self::ClaimInvalid { .. } => ErrorCategory::Unauthenticated,
            Self::ForbiddenRole { .. } => ErrorCategory::Forbidden,
        }
    }

    /// True for the token-level rejections produced by the validator.
    ///
    /// These are never retried: a bad signature or claim cannot become
    /// valid by asking again.
    pub fn is_token_invalid(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::MissingKeyId
                | Self::UnknownSigningKey(_)
                | Self::SignatureInvalid(_)
                | Self::ClaimInvalid { .. }
        )
    }

    /// Name of the failing claim, for [`AuthError::ClaimInvalid`]
    pub fn failing_claim(&self) -> Option<&str> {
        match self {
            Self::ClaimInvalid { claim, .. } => Some(claim),
            _ => None,
        }
    }
}
