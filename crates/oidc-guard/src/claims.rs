//! Validated token claims
//!
//! [`ValidatedClaims`] is produced only by the token validator after the
//! signature and registered claims have been checked. It exposes the identity
//! claims an OIDC provider commonly issues as named fields, the Keycloak role
//! claims (`realm_access`, `resource_access`) as sets, and keeps the complete
//! decoded payload for provider-specific extensions.
//!
//! Construction is lenient: a claim with an unexpected shape is treated as
//! absent rather than failing the request.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};

/// Audience can be a single string or array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Audience {
    /// No (usable) `aud` claim
    #[default]
    None,
    /// `"aud": "client"`
    Single(String),
    /// `"aud": ["client", "account"]`
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `aud` names this recipient
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }

    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Audience::Single(s.clone()),
            Some(Value::Array(items)) => Audience::Multiple(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => Audience::None,
        }
    }
}

/// Claims of a token that passed validation; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedClaims {
    subject: Option<String>,
    preferred_username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    issuer: Option<String>,
    audience: Audience,
    expires_at: Option<u64>,
    issued_at: Option<u64>,
    realm_roles: BTreeSet<String>,
    client_roles: BTreeMap<String, BTreeSet<String>>,
    #[serde(rename = "token_payload")]
    claim_set: Map<String, Value>,
}

impl ValidatedClaims {
    /// Build from a decoded payload.
    ///
    /// Only the validator should call this with untrusted input; the
    /// function itself performs no verification.
    pub fn from_claim_set(claim_set: Map<String, Value>) -> Self {
        let realm_roles = claim_set
            .get("realm_access")
            .map(roles_of)
            .unwrap_or_default();

        let client_roles = match claim_set.get("resource_access") {
            Some(Value::Object(clients)) => clients
                .iter()
                .map(|(client, access)| (client.clone(), roles_of(access)))
                .collect(),
            _ => BTreeMap::new(),
        };

        Self {
            subject: string_claim(&claim_set, "sub"),
            preferred_username: string_claim(&claim_set, "preferred_username"),
            email: string_claim(&claim_set, "email"),
            name: string_claim(&claim_set, "name"),
            issuer: string_claim(&claim_set, "iss"),
            audience: Audience::from_value(claim_set.get("aud")),
            expires_at: numeric_claim(&claim_set, "exp"),
            issued_at: numeric_claim(&claim_set, "iat"),
            realm_roles,
            client_roles,
            claim_set,
        }
    }

    /// `sub`
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// `preferred_username`
    pub fn preferred_username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }

    /// `email`
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// `name`
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `iss`
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// `aud`
    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// `exp`, seconds since the epoch
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// `iat`, seconds since the epoch
    pub fn issued_at(&self) -> Option<u64> {
        self.issued_at
    }

    /// `realm_access.roles`
    pub fn realm_roles(&self) -> &BTreeSet<String> {
        &self.realm_roles
    }

    /// `resource_access.<client>.roles`, per client
    pub fn client_roles(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.client_roles
    }

    /// Any claim from the payload by name
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claim_set.get(name)
    }

    /// The complete decoded payload
    pub fn claim_set(&self) -> &Map<String, Value> {
        &self.claim_set
    }

    /// Take ownership of the decoded payload
    pub fn into_claim_set(self) -> Map<String, Value> {
        self.claim_set
    }
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(String::from)
}

fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Option<u64> {
    claims.get(name).and_then(|v| match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        _ => None,
    })
}

/// `{"roles": ["a", "b"]}` -> {"a", "b"}; anything else -> {}
fn roles_of(access: &Value) -> BTreeSet<String> {
    access
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|role| role.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> ValidatedClaims {
        match value {
            Value::Object(map) => ValidatedClaims::from_claim_set(map),
            _ => panic!("claims must be an object"),
        }
    }

    #[test]
    fn test_audience_contains() {
        let single = Audience::Single("api".to_string());
        assert!(single.contains("api"));
        assert!(!single.contains("other"));

        let multi = Audience::Multiple(vec!["api".to_string(), "web".to_string()]);
        assert!(multi.contains("api"));
        assert!(multi.contains("web"));
        assert!(!multi.contains("other"));

        let none = Audience::None;
        assert!(!none.contains("anything"));
    }

    #[test]
    fn test_keycloak_access_token() {
        let claims = claims(json!({
            "sub": "f7c2a1d0",
            "iss": "https://sso.example.com/realms/r",
            "aud": ["project-web", "account"],
            "exp": 1_900_000_000u64,
            "iat": 1_899_999_000u64,
            "preferred_username": "alice",
            "email": "alice@example.com",
            "name": "Alice Example",
            "realm_access": { "roles": ["user", "offline_access"] },
            "resource_access": {
                "project-web": { "roles": ["editor"] },
                "account": { "roles": ["manage-account", "view-profile"] }
            },
            "tenant": "acme"
        }));

        assert_eq!(claims.subject(), Some("f7c2a1d0"));
        assert_eq!(claims.preferred_username(), Some("alice"));
        assert_eq!(claims.email(), Some("alice@example.com"));
        assert_eq!(claims.name(), Some("Alice Example"));
        assert!(claims.audience().contains("project-web"));
        assert_eq!(claims.expires_at(), Some(1_900_000_000));
        assert_eq!(claims.issued_at(), Some(1_899_999_000));
        assert!(claims.realm_roles().contains("user"));
        assert_eq!(claims.client_roles()["account"].len(), 2);
        assert_eq!(claims.claim("tenant"), Some(&json!("acme")));
    }

    #[test]
    fn test_malformed_optional_claims_are_absent() {
        let claims = claims(json!({
            "sub": 42,
            "email": null,
            "realm_access": "admin",
            "resource_access": ["not", "an", "object"],
            "aud": 7
        }));

        assert_eq!(claims.subject(), None);
        assert_eq!(claims.email(), None);
        assert!(claims.realm_roles().is_empty());
        assert!(claims.client_roles().is_empty());
        assert_eq!(claims.audience(), &Audience::None);
        // the raw payload is still available untouched
        assert_eq!(claims.claim("sub"), Some(&json!(42)));
    }

    #[test]
    fn test_non_string_roles_are_dropped() {
        let claims = claims(json!({
            "realm_access": { "roles": ["user", 1, null, "admin"] },
            "resource_access": { "web": { "roles": "editor" } }
        }));

        assert_eq!(claims.realm_roles().len(), 2);
        assert!(claims.client_roles()["web"].is_empty());
    }
}
