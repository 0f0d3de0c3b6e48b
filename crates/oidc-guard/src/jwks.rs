//! JWKS (JSON Web Key Set) fetching and caching
//!
//! The [`KeyCache`] holds the provider's signing keys indexed by `kid`:
//!
//! - **Hot path**: a fresh cache containing the requested `kid` answers from
//!   memory, taking only a read lock.
//! - **TTL**: a set older than the configured TTL is refreshed on the next
//!   lookup (`now - fetched_at > ttl`), never on every request.
//! - **Full replacement**: a refresh parses the whole document into a new
//!   [`KeySet`] and swaps it in with a single write. Readers see either the
//!   old generation or the new one, never a mix.
//! - **Fail-soft**: if a refresh fails and a previous set exists, the previous
//!   set keeps being served. Only when nothing was ever fetched does the
//!   fetch error propagate.
//! - **Unknown `kid`**: a miss on a fresh cache triggers one refresh (rate
//!   limited by `min_refresh_interval`); if the `kid` is still absent the
//!   lookup fails with [`AuthError::UnknownSigningKey`].
//! - **Backoff**: after a failed refresh of a stale set, the stale set is
//!   served without refetching until `min_refresh_interval` has passed.
//!
//! Refreshes are serialized by a mutex. A task that waited on the mutex while
//! another refresh completed reuses that result (or that failure) instead of
//! fetching again.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{AuthError, AuthResult};

/// A provider public key usable for signature verification
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

// Manual Debug impl so key material never ends up in logs
impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Build a key from RSA public components (base64url `n` and `e`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFetchFailed`] if the components are not valid base64url.
    pub fn from_rsa_components(
        key_id: impl Into<String>,
        algorithm: Option<Algorithm>,
        modulus: &str,
        exponent: &str,
    ) -> AuthResult<Self> {
        let decoding_key = DecodingKey::from_rsa_components(modulus, exponent)
            .map_err(|e| AuthError::KeyFetchFailed(format!("Invalid RSA components: {e}")))?;

        Ok(Self {
            key_id: key_id.into(),
            algorithm,
            decoding_key,
        })
    }

    /// Key identifier (`kid`)
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm the provider pinned this key to, if any
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Verification material
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// One complete generation of fetched keys
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
    generation: u64,
}

impl KeySet {
    /// Look up a key by `kid`
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Whether a key with this `kid` is present
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All key ids, unordered
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// When this set was fetched
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Monotonic counter distinguishing successive refreshes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// JWKS document as served by the provider
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

/// Individual JSON Web Key; only the members needed for RSA verification
#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl Jwk {
    /// Convert to a [`SigningKey`]; `Ok(None)` means "not a signing key for us"
    fn into_signing_key(self) -> AuthResult<Option<SigningKey>> {
        // Skip encryption keys
        if self.key_use.as_deref() == Some("enc") {
            return Ok(None);
        }

        let Some(kid) = self.kid.filter(|kid| !kid.is_empty()) else {
            return Ok(None);
        };

        if self.kty != "RSA" {
            debug!(kid = %kid, kty = %self.kty, "Skipping non-RSA JWK");
            return Ok(None);
        }

        let algorithm = match self.alg.as_deref() {
            Some(alg) => Some(Algorithm::from_str(alg).map_err(|_| {
                AuthError::KeyFetchFailed(format!("JWK '{kid}' has unsupported alg '{alg}'"))
            })?),
            None => None,
        };

        let n = self
            .n
            .ok_or_else(|| AuthError::KeyFetchFailed(format!("RSA key '{kid}' missing 'n'")))?;
        let e = self
            .e
            .ok_or_else(|| AuthError::KeyFetchFailed(format!("RSA key '{kid}' missing 'e'")))?;

        SigningKey::from_rsa_components(kid, algorithm, &n, &e).map(Some)
    }
}

/// Why a refresh was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    /// No set yet, or the set outlived its TTL
    Stale,
    /// Set is fresh but lacks the requested `kid`
    UnknownKey,
}

/// Outcome of the most recent fetch
#[derive(Debug, Clone)]
struct RefreshAttempt {
    started_at: Instant,
    failure: Option<AuthError>,
}

/// Time-based cache of the provider's signing keys
#[derive(Debug)]
pub struct KeyCache {
    /// JWKS endpoint URL
    jwks_uri: String,
    /// HTTP client (carries the request timeout)
    http_client: reqwest::Client,
    /// Cache TTL
    ttl: Duration,
    /// Minimum spacing between unknown-kid refreshes, and between retries of
    /// a failed stale refresh
    min_refresh_interval: Duration,
    /// Current key set, replaced wholesale on refresh
    current: RwLock<Option<Arc<KeySet>>>,
    /// Serializes refreshes; guards the last fetch attempt
    refresh_lock: Mutex<Option<RefreshAttempt>>,
    /// Source of [`KeySet::generation`]
    generation: AtomicU64,
}

impl KeyCache {
    /// Create an empty cache; nothing is fetched until the first lookup
    pub fn new(
        jwks_uri: impl Into<String>,
        http_client: reqwest::Client,
        ttl: Duration,
        min_refresh_interval: Duration,
    ) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            http_client,
            ttl,
            min_refresh_interval,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// JWKS endpoint URL
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The current key set, if one was ever fetched (fresh or stale)
    pub async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.current.read().await.clone()
    }

    /// Resolve the signing key for `kid`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnknownSigningKey`] if the key set (freshly fetched, or
    ///   stale after a failed refresh) has no such key
    /// - [`AuthError::KeyFetchFailed`] if no key set was ever fetched and the
    ///   fetch fails
    pub async fn get_signing_key(&self, kid: &str) -> AuthResult<Arc<SigningKey>> {
        let snapshot = self.snapshot().await;

        let trigger = match &snapshot {
            Some(set) if !set.is_stale(self.ttl) => {
                if let Some(key) = set.get(kid) {
                    debug!(kid = %kid, "Using cached signing key");
                    return Ok(key);
                }
                RefreshTrigger::UnknownKey
            }
            _ => RefreshTrigger::Stale,
        };

        let observed = snapshot.as_ref().map(|set| set.generation);

        match self.refresh_with(observed, trigger).await {
            Ok(set) => set.get(kid).ok_or_else(|| {
                warn!(
                    kid = %kid,
                    jwks_uri = %self.jwks_uri,
                    "Signing key not found in JWKS"
                );
                AuthError::UnknownSigningKey(kid.to_string())
            }),
            Err(fetch_error) => match self.snapshot().await {
                Some(stale) => {
                    warn!(
                        jwks_uri = %self.jwks_uri,
                        error = %fetch_error,
                        generation = stale.generation,
                        "JWKS refresh failed, serving previously fetched keys"
                    );
                    stale
                        .get(kid)
                        .ok_or_else(|| AuthError::UnknownSigningKey(kid.to_string()))
                }
                None => {
                    error!(
                        jwks_uri = %self.jwks_uri,
                        error = %fetch_error,
                        "JWKS fetch failed and no keys were ever fetched"
                    );
                    Err(fetch_error)
                }
            },
        }
    }

    /// Force a refresh, replacing the cached set on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFetchFailed`] on network, status or parse
    /// failure; the cached set is left untouched in that case.
    pub async fn refresh(&self) -> AuthResult<Arc<KeySet>> {
        let mut last_attempt = self.refresh_lock.lock().await;
        self.fetch_and_store(&mut last_attempt).await
    }

    /// Refresh after acquiring the lock, reconciling with refreshes that ran
    /// while this task was waiting.
    async fn refresh_with(
        &self,
        observed: Option<u64>,
        trigger: RefreshTrigger,
    ) -> AuthResult<Arc<KeySet>> {
        let requested_at = Instant::now();
        let mut last_attempt = self.refresh_lock.lock().await;

        let current = self.snapshot().await;

        // Another task already replaced the set we looked at
        if let Some(set) = &current
            && Some(set.generation) != observed
            && !set.is_stale(self.ttl)
        {
            debug!(generation = set.generation, "Reusing concurrently refreshed JWKS");
            return Ok(Arc::clone(set));
        }

        if let Some(attempt) = &*last_attempt {
            // Another task attempted a fetch while we waited, and it failed
            if attempt.started_at >= requested_at
                && let Some(failure) = &attempt.failure
            {
                return Err(failure.clone());
            }

            if let Some(set) = &current
                && attempt.started_at.elapsed() < self.min_refresh_interval
            {
                match trigger {
                    RefreshTrigger::UnknownKey => {
                        debug!(
                            jwks_uri = %self.jwks_uri,
                            since_last_ms = attempt.started_at.elapsed().as_millis(),
                            "JWKS refresh rate limited, using cache"
                        );
                        return Ok(Arc::clone(set));
                    }
                    RefreshTrigger::Stale => {
                        if let Some(failure) = &attempt.failure {
                            debug!(
                                jwks_uri = %self.jwks_uri,
                                since_last_ms = attempt.started_at.elapsed().as_millis(),
                                "JWKS refresh backing off after failure"
                            );
                            return Err(failure.clone());
                        }
                    }
                }
            }
        }

        self.fetch_and_store(&mut last_attempt).await
    }

    async fn fetch_and_store(
        &self,
        last_attempt: &mut Option<RefreshAttempt>,
    ) -> AuthResult<Arc<KeySet>> {
        let started_at = Instant::now();
        let keys = match self.fetch().await {
            Ok(keys) => keys,
            Err(e) => {
                *last_attempt = Some(RefreshAttempt {
                    started_at,
                    failure: Some(e.clone()),
                });
                return Err(e);
            }
        };
        *last_attempt = Some(RefreshAttempt {
            started_at,
            failure: None,
        });
        let set = Arc::new(KeySet {
            keys,
            fetched_at: Instant::now(),
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
        });

        *self.current.write().await = Some(Arc::clone(&set));

        info!(
            jwks_uri = %self.jwks_uri,
            key_count = set.len(),
            generation = set.generation,
            "JWKS cache refreshed"
        );

        Ok(set)
    }

    /// Fetch and parse the whole document; nothing is stored here
    async fn fetch(&self) -> AuthResult<HashMap<String, Arc<SigningKey>>> {
        debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetchFailed(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::KeyFetchFailed(format!(
                "JWKS endpoint returned status {status}"
            )));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetchFailed(format!("Invalid JWKS format: {e}")))?;

        let keys = parse_key_set(document);
        if keys.is_empty() {
            return Err(AuthError::KeyFetchFailed(
                "No valid signing keys found in JWKS".to_string(),
            ));
        }

        Ok(keys)
    }
}

fn parse_key_set(document: JwksDocument) -> HashMap<String, Arc<SigningKey>> {
    let mut keys = HashMap::new();

    for jwk in document.keys {
        let kid = jwk.kid.clone();
        let kty = jwk.kty.clone();

        match jwk.into_signing_key() {
            Ok(Some(key)) => {
                debug!(kid = %key.key_id, kty = %kty, "Loaded JWK");
                keys.insert(key.key_id.clone(), Arc::new(key));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(kid = ?kid, kty = %kty, error = %e, "Failed to parse JWK, skipping");
            }
        }
    }

    keys
}
