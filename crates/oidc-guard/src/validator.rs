//! Token validation
//!
//! [`TokenValidator::validate`] runs a fixed sequence and stops at the first
//! failure:
//!
//! 1. Decode the header without verifying anything; require a `kid`
//!    ([`AuthError::MissingKeyId`]).
//! 2. Resolve the signing key through the [`KeyCache`]
//!    ([`AuthError::UnknownSigningKey`], [`AuthError::KeyFetchFailed`]).
//! 3. Verify the signature against the configured allow-list of RSA
//!    algorithms. The header's `alg` is only checked for membership in that
//!    list, never trusted on its own ([`AuthError::SignatureInvalid`]).
//! 4. Verify `aud`, `iss`, `exp`, `nbf` and `iat` with clock skew tolerance
//!    ([`AuthError::ClaimInvalid`] naming the claim).
//! 5. Return the decoded payload as [`ValidatedClaims`].
//!
//! Apart from the key cache's own refresh, validation touches no shared state.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, TokenData, Validation, decode, decode_header};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::claims::ValidatedClaims;
use crate::config::{OidcConfig, is_rsa_algorithm};
use crate::discovery::DiscoveryDocument;
use crate::error::{AuthError, AuthResult};
use crate::jwks::{KeyCache, SigningKey};

/// JWT validator bound to one issuer, one audience and one key cache
#[derive(Debug, Clone)]
pub struct TokenValidator {
    /// Expected issuer (iss claim), from the discovery document
    expected_issuer: String,
    /// Expected audience (aud claim), the client identifier
    expected_audience: String,
    /// Signing keys
    key_cache: Arc<KeyCache>,
    /// Allowed algorithms (RSA family only)
    allowed_algorithms: Vec<Algorithm>,
    /// Clock skew tolerance
    clock_skew_leeway: Duration,
}

impl TokenValidator {
    /// Create a validator with default settings (RS256, 60 s leeway)
    pub fn new(
        discovery: &DiscoveryDocument,
        expected_audience: impl Into<String>,
        key_cache: Arc<KeyCache>,
    ) -> Self {
        Self {
            expected_issuer: discovery.issuer().to_string(),
            expected_audience: expected_audience.into(),
            key_cache,
            allowed_algorithms: vec![Algorithm::RS256],
            clock_skew_leeway: Duration::from_secs(60),
        }
    }

    /// Create a validator using the audience, algorithms and leeway of `config`
    pub fn from_config(
        config: &OidcConfig,
        discovery: &DiscoveryDocument,
        key_cache: Arc<KeyCache>,
    ) -> Self {
        Self::new(discovery, config.client_id.clone(), key_cache)
            .with_algorithms(config.algorithms.clone())
            .with_clock_skew(config.clock_skew)
    }

    /// Set custom clock skew tolerance
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew_leeway = leeway;
        self
    }

    /// Set allowed algorithms
    ///
    /// Non-RSA entries are never honoured: a token signed with one is
    /// rejected even if it appears in this list.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    /// Expected issuer
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    /// Expected audience
    pub fn expected_audience(&self) -> &str {
        &self.expected_audience
    }

    /// Key cache backing this validator
    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    /// Validate a raw JWT.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] if the header cannot be decoded
    /// - [`AuthError::MissingKeyId`] if the header has no `kid`
    /// - [`AuthError::UnknownSigningKey`] / [`AuthError::KeyFetchFailed`] from the key cache
    /// - [`AuthError::SignatureInvalid`] on signature mismatch or a disallowed algorithm
    /// - [`AuthError::ClaimInvalid`] if `aud`, `iss`, `exp`, `nbf` or `iat` fail
    pub async fn validate(&self, token: &str) -> AuthResult<ValidatedClaims> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::MalformedToken(format!("Invalid JWT format: {e}"))
        })?;

        let key_id = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| {
                warn!("JWT missing kid (key ID) in header");
                AuthError::MissingKeyId
            })?;

        let key = self.key_cache.get_signing_key(key_id).await?;

        let claims = self.verify(token, header.alg, &key).inspect_err(|e| {
            debug!(kid = %key_id, error = %e, "JWT validation failed");
        })?;

        debug!(
            kid = %key_id,
            subject = ?claims.subject(),
            "JWT validation successful"
        );

        Ok(claims)
    }

    /// Signature and claim checks against an already-resolved key
    fn verify(
        &self,
        token: &str,
        header_alg: Algorithm,
        key: &SigningKey,
    ) -> AuthResult<ValidatedClaims> {
        if !is_rsa_algorithm(header_alg) || !self.allowed_algorithms.contains(&header_alg) {
            warn!(
                algorithm = ?header_alg,
                allowed = ?self.allowed_algorithms,
                "JWT algorithm not allowed"
            );
            return Err(AuthError::SignatureInvalid(format!(
                "algorithm {header_alg:?} is not allowed"
            )));
        }

        if let Some(pinned) = key.algorithm()
            && pinned != header_alg
        {
            warn!(
                kid = %key.key_id(),
                key_algorithm = ?pinned,
                algorithm = ?header_alg,
                "JWT algorithm does not match the key's algorithm"
            );
            return Err(AuthError::SignatureInvalid(format!(
                "key '{}' is restricted to {pinned:?}",
                key.key_id()
            )));
        }

        let mut validation = Validation::new(header_alg);
        validation.algorithms = self
            .allowed_algorithms
            .iter()
            .copied()
            .filter(|alg| is_rsa_algorithm(*alg))
            .collect();
        validation.leeway = self.clock_skew_leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_audience(&[&self.expected_audience]);
        validation.set_issuer(&[&self.expected_issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let token_data: TokenData<Map<String, Value>> =
            decode(token, key.decoding_key(), &validation).map_err(map_jwt_error)?;

        check_issued_at(&token_data.claims, self.clock_skew_leeway)?;

        Ok(ValidatedClaims::from_claim_set(token_data.claims))
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature => {
            warn!("JWT signature verification failed");
            AuthError::SignatureInvalid("signature does not match".to_string())
        }
        ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
            AuthError::SignatureInvalid("algorithm not allowed for this key".to_string())
        }
        ErrorKind::ExpiredSignature => AuthError::claim("exp", "token has expired"),
        ErrorKind::ImmatureSignature => AuthError::claim("nbf", "token is not yet valid"),
        ErrorKind::InvalidIssuer => AuthError::claim("iss", "issuer does not match"),
        ErrorKind::InvalidAudience => {
            AuthError::claim("aud", "token was not issued for this client")
        }
        ErrorKind::InvalidSubject => AuthError::claim("sub", "subject does not match"),
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::claim(claim.clone(), "required claim is missing")
        }
        _ => AuthError::MalformedToken(err.to_string()),
    }
}

/// `iat`, when present, must be a number and not lie in the future
fn check_issued_at(claims: &Map<String, Value>, leeway: Duration) -> AuthResult<()> {
    let Some(iat) = claims.get("iat") else {
        return Ok(());
    };

    let iat = iat
        .as_f64()
        .ok_or_else(|| AuthError::claim("iat", "not a numeric date"))?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    if iat > (now + leeway.as_secs()) as f64 {
        return Err(AuthError::claim("iat", "token was issued in the future"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> TokenValidator {
        let discovery =
            DiscoveryDocument::new("https://idp/realms/r", "https://idp/realms/r/jwks").unwrap();
        let cache = Arc::new(KeyCache::new(
            discovery.jwks_uri(),
            reqwest::Client::new(),
            Duration::from_secs(300),
            Duration::from_secs(5),
        ));
        TokenValidator::new(&discovery, "web-client", cache)
    }

    fn now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    #[test]
    fn test_validator_defaults() {
        let validator = validator();
        assert_eq!(validator.expected_issuer(), "https://idp/realms/r");
        assert_eq!(validator.expected_audience(), "web-client");
        assert_eq!(validator.clock_skew_leeway, Duration::from_secs(60));
        assert_eq!(validator.allowed_algorithms, vec![Algorithm::RS256]);
    }

    #[test]
    fn test_validator_builder() {
        let validator = validator()
            .with_clock_skew(Duration::from_secs(5))
            .with_algorithms(vec![Algorithm::PS256]);
        assert_eq!(validator.clock_skew_leeway, Duration::from_secs(5));
        assert_eq!(validator.allowed_algorithms, vec![Algorithm::PS256]);
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let err = validator().validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn test_missing_kid_rejected_before_key_lookup() {
        // {"alg":"RS256","typ":"JWT"} . {"sub":"x"} . bogus signature
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiJ4In0.c2ln";
        let err = validator().validate(token).await.unwrap_err();
        assert_eq!(err, AuthError::MissingKeyId);
    }

    #[test]
    fn test_issued_at_checks() {
        let leeway = Duration::from_secs(60);

        let ok = json!({ "iat": now() }).as_object().cloned().unwrap();
        assert!(check_issued_at(&ok, leeway).is_ok());

        let absent = Map::new();
        assert!(check_issued_at(&absent, leeway).is_ok());

        let future = json!({ "iat": now() + 3600 }).as_object().cloned().unwrap();
        let err = check_issued_at(&future, leeway).unwrap_err();
        assert_eq!(err.failing_claim(), Some("iat"));

        let not_a_number = json!({ "iat": "yesterday" }).as_object().cloned().unwrap();
        assert!(check_issued_at(&not_a_number, leeway).is_err());
    }

    #[test]
    fn test_error_mapping() {
        let expired = map_jwt_error(ErrorKind::ExpiredSignature.into());
        assert_eq!(expired.failing_claim(), Some("exp"));

        let audience = map_jwt_error(ErrorKind::InvalidAudience.into());
        assert_eq!(audience.failing_claim(), Some("aud"));

        let missing = map_jwt_error(ErrorKind::MissingRequiredClaim("iss".to_string()).into());
        assert_eq!(missing.failing_claim(), Some("iss"));

        let signature = map_jwt_error(ErrorKind::InvalidSignature.into());
        assert!(matches!(signature, AuthError::SignatureInvalid(_)));
    }
}
