//! Tower Service implementation for authentication
//!
//! [`OidcAuthService`] implements `Service<http::Request<B>>`:
//! - Extracts the token from `Authorization: Bearer <token>` (scheme is
//!   case-insensitive)
//! - Authenticates (and, for [`RoleRequirement::AnyRole`], authorizes) it
//! - Inserts the [`Principal`] into the request extensions
//! - Answers rejected requests itself with an empty body; the inner service
//!   is not called

use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, StatusCode};
use tower_service::Service;
use tracing::debug;

use crate::authenticator::OidcAuthenticator;
use crate::error::{AuthError, ErrorCategory};
use crate::principal::Principal;

use super::{AuthLayerConfig, RoleRequirement};

/// Tower Service that performs OIDC authentication
#[derive(Debug, Clone)]
pub struct OidcAuthService<S> {
    inner: S,
    authenticator: OidcAuthenticator,
    config: AuthLayerConfig,
}

impl<S> OidcAuthService<S> {
    /// Create a new auth service
    pub fn new(inner: S, authenticator: OidcAuthenticator, config: AuthLayerConfig) -> Self {
        Self {
            inner,
            authenticator,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

/// Future type for auth service responses
pub type OidcAuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, B, ResBody> Service<http::Request<B>> for OidcAuthService<S>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = OidcAuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // The clone is not guaranteed ready; keep the one poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.should_bypass(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let token = bearer_token(req.headers()).map(str::to_owned);
        let authenticator = self.authenticator.clone();
        let requirement = self.config.requirement.clone();

        Box::pin(async move {
            let outcome = match (&requirement, token) {
                (RoleRequirement::Optional, token) => {
                    Ok(authenticator.authenticate_optional(token.as_deref()).await)
                }
                (_, None) => Err(AuthError::MissingToken),
                (RoleRequirement::Authenticated, Some(token)) => {
                    authenticator.authenticate(&token).await.map(Some)
                }
                (RoleRequirement::AnyRole(roles), Some(token)) => {
                    authenticator.authorize(&token, roles).await.map(Some)
                }
            };

            match outcome {
                Ok(principal) => {
                    if let Some(principal) = principal {
                        req.extensions_mut().insert::<Principal>(principal);
                    }
                    inner.call(req).await
                }
                Err(e) => {
                    debug!(path = %req.uri().path(), error = %e, "Request rejected");
                    Ok(rejection(&e))
                }
            }
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Build the response for a rejected request
fn rejection<ResBody: Default>(error: &AuthError) -> http::Response<ResBody> {
    let (status, challenge) = match error.category() {
        ErrorCategory::Unauthenticated if error.is_token_invalid() => (
            StatusCode::UNAUTHORIZED,
            Some(r#"Bearer error="invalid_token""#),
        ),
        ErrorCategory::Unauthenticated => (StatusCode::UNAUTHORIZED, Some("Bearer")),
        ErrorCategory::Forbidden => (StatusCode::FORBIDDEN, None),
        ErrorCategory::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, None),
        ErrorCategory::Configuration => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    let mut response = http::Response::new(ResBody::default());
    *response.status_mut() = status;
    if let Some(challenge) = challenge {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
    }
    response
}
