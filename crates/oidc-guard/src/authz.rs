//! Role-based authorization
//!
//! A requirement is a set of role names. The empty set means "authenticated
//! is enough"; otherwise holding any one of the roles grants access.
//! Evaluation is pure: no I/O, no shared state.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::principal::Principal;

/// Required role names; order and duplicates are irrelevant
pub type RoleSet = BTreeSet<String>;

/// Build a [`RoleSet`] from anything yielding role names
pub fn role_set<I, S>(roles: I) -> RoleSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    roles.into_iter().map(Into::into).collect()
}

/// Whether `principal` satisfies `required` using realm roles.
///
/// `true` when `required` is empty, or when the principal holds at least one
/// of the required roles.
pub fn authorize(principal: &Principal, required: &RoleSet) -> bool {
    required.is_empty() || required.iter().any(|role| principal.has_realm_role(role))
}

/// Same as [`authorize`] but against the roles granted by `client_id`
pub fn authorize_client(principal: &Principal, client_id: &str, required: &RoleSet) -> bool {
    required.is_empty()
        || required
            .iter()
            .any(|role| principal.has_client_role(client_id, role))
}

/// [`authorize`] as a `Result`, for use with `?`.
///
/// # Errors
///
/// Returns [`AuthError::ForbiddenRole`] listing the required roles when the
/// principal holds none of them.
pub fn require_any_role(principal: &Principal, required: &RoleSet) -> AuthResult<()> {
    if authorize(principal, required) {
        return Ok(());
    }

    debug!(
        subject = ?principal.id(),
        required = ?required,
        "Principal lacks required roles"
    );

    Err(AuthError::ForbiddenRole {
        required: required.iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ValidatedClaims;
    use serde_json::json;

    fn principal_with_roles(roles: &[&str]) -> Principal {
        let claims = json!({
            "sub": "u-1",
            "realm_access": { "roles": roles },
            "resource_access": { "project-web": { "roles": ["editor"] } }
        });
        let serde_json::Value::Object(map) = claims else {
            unreachable!()
        };
        Principal::extract(ValidatedClaims::from_claim_set(map))
    }

    #[test]
    fn test_empty_requirement_always_passes() {
        assert!(authorize(&principal_with_roles(&[]), &RoleSet::new()));
        assert!(authorize(&principal_with_roles(&["user"]), &RoleSet::new()));
    }

    #[test]
    fn test_any_role_semantics() {
        let principal = principal_with_roles(&["user"]);

        assert!(authorize(&principal, &role_set(["admin", "user"])));
        assert!(authorize(&principal, &role_set(["user"])));
        assert!(!authorize(&principal, &role_set(["admin"])));
        assert!(!authorize(&principal_with_roles(&[]), &role_set(["user"])));
    }

    #[test]
    fn test_role_names_are_exact() {
        let principal = principal_with_roles(&["User"]);
        assert!(!authorize(&principal, &role_set(["user"])));
    }

    #[test]
    fn test_client_roles() {
        let principal = principal_with_roles(&["user"]);

        assert!(authorize_client(&principal, "project-web", &role_set(["editor"])));
        assert!(!authorize_client(&principal, "project-web", &role_set(["user"])));
        assert!(!authorize_client(&principal, "account", &role_set(["editor"])));
        assert!(authorize_client(&principal, "account", &RoleSet::new()));
    }

    #[test]
    fn test_require_any_role() {
        let principal = principal_with_roles(&["user"]);
        assert!(require_any_role(&principal, &role_set(["user"])).is_ok());

        let err = require_any_role(&principal, &role_set(["editor", "admin"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Access denied. Required roles: admin, editor"
        );
    }
}
