//! Authenticated principal
//!
//! A [`Principal`] is the request-scoped view of a validated token: who the
//! caller is and which roles they hold. It is a pure projection of
//! [`ValidatedClaims`] and involves no I/O.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::claims::ValidatedClaims;

/// Identity and roles of an authenticated caller
///
/// Serializes to the shape handlers usually return from a "who am I"
/// endpoint: `id`, `username`, `email`, `name`, `roles`, `client_roles` and
/// the complete `token_payload`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    id: Option<String>,
    username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    #[serde(rename = "roles")]
    realm_roles: BTreeSet<String>,
    client_roles: BTreeMap<String, BTreeSet<String>>,
    #[serde(rename = "token_payload")]
    claims: Map<String, Value>,
}

impl Principal {
    /// Project validated claims into a principal.
    ///
    /// Absent optional claims stay absent; absent role claims become empty
    /// sets. Never fails.
    pub fn extract(claims: ValidatedClaims) -> Self {
        let id = claims.subject().map(String::from);
        let username = claims.preferred_username().map(String::from);
        let email = claims.email().map(String::from);
        let name = claims.name().map(String::from);
        let realm_roles = claims.realm_roles().clone();
        let client_roles = claims.client_roles().clone();

        Self {
            id,
            username,
            email,
            name,
            realm_roles,
            client_roles,
            claims: claims.into_claim_set(),
        }
    }

    /// Subject identifier (`sub`)
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Login name (`preferred_username`)
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Email address
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Display name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Realm-level roles
    pub fn realm_roles(&self) -> &BTreeSet<String> {
        &self.realm_roles
    }

    /// Roles per client
    pub fn client_roles(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.client_roles
    }

    /// Roles granted by one client; empty if the token carries none
    pub fn roles_for_client(&self, client_id: &str) -> impl Iterator<Item = &str> {
        self.client_roles
            .get(client_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Whether the principal holds this realm role
    pub fn has_realm_role(&self, role: &str) -> bool {
        self.realm_roles.contains(role)
    }

    /// Whether the principal holds this role on `client_id`
    pub fn has_client_role(&self, client_id: &str, role: &str) -> bool {
        self.client_roles
            .get(client_id)
            .is_some_and(|roles| roles.contains(role))
    }

    /// Any claim from the token by name
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// The complete validated payload
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }
}

impl From<ValidatedClaims> for Principal {
    fn from(claims: ValidatedClaims) -> Self {
        Self::extract(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn principal(value: Value) -> Principal {
        let Value::Object(map) = value else {
            panic!("claims must be an object");
        };
        Principal::extract(ValidatedClaims::from_claim_set(map))
    }

    #[test]
    fn test_extract_full_principal() {
        let principal = principal(json!({
            "sub": "u-1",
            "preferred_username": "alice",
            "email": "alice@example.com",
            "name": "Alice",
            "realm_access": { "roles": ["user", "admin"] },
            "resource_access": { "project-web": { "roles": ["editor"] } }
        }));

        assert_eq!(principal.id(), Some("u-1"));
        assert_eq!(principal.username(), Some("alice"));
        assert_eq!(principal.email(), Some("alice@example.com"));
        assert_eq!(principal.name(), Some("Alice"));
        assert!(principal.has_realm_role("admin"));
        assert!(!principal.has_realm_role("editor"));
        assert!(principal.has_client_role("project-web", "editor"));
        assert!(!principal.has_client_role("other", "editor"));
        assert_eq!(
            principal.roles_for_client("project-web").collect::<Vec<_>>(),
            vec!["editor"]
        );
    }

    #[test]
    fn test_extract_minimal_token() {
        let principal = principal(json!({ "sub": "u-2" }));

        assert_eq!(principal.id(), Some("u-2"));
        assert_eq!(principal.username(), None);
        assert_eq!(principal.email(), None);
        assert!(principal.realm_roles().is_empty());
        assert!(principal.client_roles().is_empty());
        assert_eq!(principal.roles_for_client("project-web").count(), 0);
    }

    #[test]
    fn test_serialized_shape() {
        let principal = principal(json!({
            "sub": "u-1",
            "preferred_username": "alice",
            "realm_access": { "roles": ["user"] },
            "custom": true
        }));

        let value = serde_json::to_value(&principal).unwrap();
        assert_eq!(value["id"], "u-1");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["email"], Value::Null);
        assert_eq!(value["roles"], json!(["user"]));
        assert_eq!(value["client_roles"], json!({}));
        assert_eq!(value["token_payload"]["custom"], true);
    }
}
