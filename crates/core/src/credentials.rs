//! Credential resolution.
//!
//! Core components never read the process environment. Whatever secrets a
//! run may use are handed to it through a [`CredentialResolver`].

use std::collections::HashMap;
use std::env;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// A secret value that never shows up in debug output.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[inline]
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// Returns the secret value.
    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Resolves credentials by name.
pub trait CredentialResolver: Send + Sync {
    /// Returns the secret for `name`, if present.
    fn resolve(&self, name: &str) -> Option<Secret>;

    /// Returns `true` if a credential named `name` is available.
    #[inline]
    fn has_credential(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// An explicit set of credentials.
#[derive(Clone, Default, Debug)]
pub struct Credentials {
    values: HashMap<String, Secret>,
}

impl Credentials {
    /// Creates an empty set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the named environment variables. Variables that are unset
    /// or empty are skipped; later changes to the environment are not
    /// observed.
    pub fn from_env<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut credentials = Self::new();
        for name in names {
            if let Ok(value) = env::var(name) {
                credentials.insert(name, value);
            }
        }
        credentials
    }

    /// Adds a credential. Empty values are ignored.
    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.values.insert(name.into(), Secret(value));
    }

    /// Adds a credential, builder style.
    #[inline]
    pub fn with<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.insert(name, value);
        self
    }
}

impl CredentialResolver for Credentials {
    fn resolve(&self, name: &str) -> Option<Secret> {
        self.values.get(name).cloned()
    }
}

impl<T: CredentialResolver + ?Sized> CredentialResolver for Arc<T> {
    #[inline]
    fn resolve(&self, name: &str) -> Option<Secret> {
        (**self).resolve(name)
    }
}

/// Consults `primary` first and falls back to `fallback`.
pub struct Layered {
    primary: Arc<dyn CredentialResolver>,
    fallback: Arc<dyn CredentialResolver>,
}

impl Layered {
    /// Layers `primary` over `fallback`.
    #[inline]
    pub fn new(
        primary: Arc<dyn CredentialResolver>,
        fallback: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self { primary, fallback }
    }
}

impl CredentialResolver for Layered {
    fn resolve(&self, name: &str) -> Option<Secret> {
        self.primary
            .resolve(name)
            .or_else(|| self.fallback.resolve(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layered_prefers_primary() {
        let primary = Credentials::new().with("FINANCIAL_DATA_API_KEY", "override");
        let fallback = Credentials::new()
            .with("FINANCIAL_DATA_API_KEY", "process")
            .with("OPENAI_API_KEY", "sk-process");
        let layered = Layered::new(Arc::new(primary), Arc::new(fallback));

        assert_eq!(
            layered.resolve("FINANCIAL_DATA_API_KEY").unwrap().expose(),
            "override"
        );
        assert_eq!(layered.resolve("OPENAI_API_KEY").unwrap().expose(), "sk-process");
        assert!(!layered.has_credential("SEARCH_API_KEY"));
    }

    #[test]
    fn test_empty_values_are_absent() {
        let credentials = Credentials::new().with("OPENAI_API_KEY", "  ");
        assert!(!credentials.has_credential("OPENAI_API_KEY"));
    }

    #[test]
    fn test_secret_is_redacted() {
        let credentials = Credentials::new().with("OPENAI_API_KEY", "sk-live-123");
        assert!(!format!("{credentials:?}").contains("sk-live-123"));
    }
}
