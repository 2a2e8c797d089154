//! API credential resolution.
//!
//! The conversion service needs exactly one API key. It is read once at
//! startup from the environment and handed to the client constructor as an
//! immutable [`ApiKey`]; workers never look at the environment themselves.
//!
//! Two variable names are recognised, checked in order:
//!
//! 1. [`PRIMARY_API_KEY_VAR`] (`DATALAB_API_KEY`)
//! 2. [`LEGACY_API_KEY_VAR`]  (`MARKER_PDF_KEY`), kept for older `.env` files
//!
//! Empty values and the template placeholder `your_api_key_here` count as
//! unset, so a freshly copied example `.env` fails loudly at startup instead
//! of producing a batch full of 401s.
//!
//! The `batch2md` binary loads `.env` into the environment before this
//! runs; the library only sees the resulting process environment.

use crate::error::BatchError;
use std::fmt;

/// Primary environment variable holding the API key.
pub const PRIMARY_API_KEY_VAR: &str = "DATALAB_API_KEY";

/// Legacy alias accepted when the primary variable is absent.
pub const LEGACY_API_KEY_VAR: &str = "MARKER_PDF_KEY";

const PLACEHOLDER_KEY: &str = "your_api_key_here";

/// An API key for the conversion service.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap an explicit key, rejecting empty and placeholder values.
    pub fn new(key: impl Into<String>) -> Result<Self, BatchError> {
        let key = key.into();
        let trimmed = key.trim();
        if is_unset(trimmed) {
            return Err(BatchError::CredentialMissing);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Resolve the key from the process environment.
    pub fn from_env() -> Result<Self, BatchError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the key through an arbitrary variable lookup.
    ///
    /// The primary name wins over the legacy alias; an unusable primary
    /// value (empty or placeholder) falls through to the alias.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        [PRIMARY_API_KEY_VAR, LEGACY_API_KEY_VAR]
            .iter()
            .filter_map(|name| lookup(name))
            .find_map(|value| Self::new(value).ok())
            .ok_or(BatchError::CredentialMissing)
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

fn is_unset(value: &str) -> bool {
    value.is_empty() || value == PLACEHOLDER_KEY
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn primary_wins_over_legacy() {
        let key = ApiKey::from_lookup(lookup_from(&[
            ("DATALAB_API_KEY", "primary"),
            ("MARKER_PDF_KEY", "legacy"),
        ]))
        .unwrap();
        assert_eq!(key.expose(), "primary");
    }

    #[test]
    fn legacy_alias_is_accepted() {
        let key = ApiKey::from_lookup(lookup_from(&[("MARKER_PDF_KEY", "legacy")])).unwrap();
        assert_eq!(key.expose(), "legacy");
    }

    #[test]
    fn placeholder_primary_falls_through_to_legacy() {
        let key = ApiKey::from_lookup(lookup_from(&[
            ("DATALAB_API_KEY", "your_api_key_here"),
            ("MARKER_PDF_KEY", "legacy"),
        ]))
        .unwrap();
        assert_eq!(key.expose(), "legacy");
    }

    #[test]
    fn missing_or_blank_is_fatal() {
        assert!(matches!(
            ApiKey::from_lookup(lookup_from(&[])),
            Err(BatchError::CredentialMissing)
        ));
        assert!(matches!(
            ApiKey::from_lookup(lookup_from(&[("DATALAB_API_KEY", "   ")])),
            Err(BatchError::CredentialMissing)
        ));
    }

    #[test]
    fn debug_and_display_redact() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert!(!format!("{key:?}").contains("sk-secret"));
        assert!(!format!("{key}").contains("sk-secret"));
    }
}
