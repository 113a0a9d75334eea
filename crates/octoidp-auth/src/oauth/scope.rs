//! Scope parsing.
//!
//! Supported scopes:
//!
//! - `openid` (required on authorization requests)
//! - `profile`, `email`
//! - `offline_access`: issue a refresh token
//! - `audience:server:client_id:<peer>`: add `<peer>` to the ID token
//!   audience if it trusts the requesting client

use crate::error::{AuthError, AuthResult};

pub const OPENID: &str = "openid";
pub const PROFILE: &str = "profile";
pub const EMAIL: &str = "email";
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Prefix of cross-client audience scopes.
pub const CROSS_CLIENT_PREFIX: &str = "audience:server:client_id:";

/// Every fixed scope, as advertised in discovery.
pub const SUPPORTED: [&str; 4] = [OPENID, PROFILE, EMAIL, OFFLINE_ACCESS];

/// Splits a space-separated scope string, keeping first-seen order and
/// dropping duplicates.
#[must_use]
pub fn split(raw: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for scope in raw.split_whitespace() {
        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }
    scopes
}

/// Returns `true` for a fixed scope or a well-formed cross-client scope.
#[must_use]
pub fn is_supported(scope: &str) -> bool {
    if SUPPORTED.contains(&scope) {
        return true;
    }
    scope
        .strip_prefix(CROSS_CLIENT_PREFIX)
        .is_some_and(|peer| !peer.is_empty())
}

/// Parses and checks the scope of an authorization request.
///
/// # Errors
///
/// Returns `InvalidScope` if `openid` is missing or any scope is unknown.
pub fn parse_authorization(raw: Option<&str>) -> AuthResult<Vec<String>> {
    let scopes = split(raw.unwrap_or_default());
    if !scopes.iter().any(|s| s == OPENID) {
        return Err(AuthError::invalid_scope("scope must include 'openid'"));
    }
    ensure_supported(&scopes)?;
    Ok(scopes)
}

/// Checks that every scope is supported.
///
/// # Errors
///
/// Returns `InvalidScope` naming the first unsupported scope.
pub fn ensure_supported(scopes: &[String]) -> AuthResult<()> {
    match scopes.iter().find(|s| !is_supported(s)) {
        Some(unknown) => Err(AuthError::invalid_scope(format!(
            "unsupported scope '{unknown}'"
        ))),
        None => Ok(()),
    }
}

/// Returns the peers named by cross-client scopes.
#[must_use]
pub fn requested_peers(scopes: &[String]) -> Vec<String> {
    scopes
        .iter()
        .filter_map(|s| s.strip_prefix(CROSS_CLIENT_PREFIX))
        .filter(|peer| !peer.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns `true` if `scope` is in `scopes`.
#[must_use]
pub fn contains(scopes: &[String], scope: &str) -> bool {
    scopes.iter().any(|s| s == scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_dedupes() {
        assert_eq!(
            split("openid  email openid\tprofile"),
            vec!["openid", "email", "profile"]
        );
        assert!(split("").is_empty());
    }

    #[test]
    fn test_authorization_requires_openid() {
        let err = parse_authorization(Some("profile email")).unwrap_err();
        assert!(matches!(err, AuthError::InvalidScope { .. }));
        assert!(parse_authorization(None).is_err());

        let scopes = parse_authorization(Some("openid profile email offline_access")).unwrap();
        assert_eq!(scopes.len(), 4);
    }

    #[test]
    fn test_unknown_scope_rejected() {
        let err = parse_authorization(Some("openid groups")).unwrap_err();
        assert!(err.to_string().contains("groups"));
    }

    #[test]
    fn test_cross_client_scope() {
        assert!(is_supported("audience:server:client_id:api"));
        assert!(!is_supported("audience:server:client_id:"));

        let scopes = split("openid audience:server:client_id:api audience:server:client_id:cli");
        assert_eq!(requested_peers(&scopes), vec!["api", "cli"]);
    }
}
