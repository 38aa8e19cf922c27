//! Cookie sets and cookie stores

use crate::error::ImageCreatorError;
use reqwest::header::HeaderValue;
use std::collections::BTreeMap;
use std::sync::RwLock;
use zeroize::Zeroizing;

/// Name of the cookie that proves an authenticated session
pub const AUTH_COOKIE: &str = "_U";

/// A set of cookies, keyed by name
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    entries: BTreeMap<String, String>,
}

impl Cookies {
    /// Create an empty cookie set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` header value such as `"_U=abc; SRCHHPGUSR=xyz"`
    ///
    /// Fragments without a `=` are skipped.
    pub fn parse_header(header: &str) -> Self {
        header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Insert or replace a cookie
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Look up a cookie by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Whether the authentication cookie is present
    ///
    /// An empty `_U` value counts as missing.
    pub fn has_auth(&self) -> bool {
        self.get(AUTH_COOKIE).is_some_and(|v| !v.is_empty())
    }

    /// Number of cookies
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the set as a sensitive `Cookie` header value
    ///
    /// The temporary string holding the secrets is zeroized once the header is built.
    pub fn to_header(&self) -> Result<HeaderValue, ImageCreatorError> {
        let cookie_string = Zeroizing::new(
            self.iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        );
        let mut header = HeaderValue::from_str(&cookie_string)
            .map_err(|_| ImageCreatorError::ClientInit("Invalid cookie format".to_string()))?;
        header.set_sensitive(true);
        Ok(header)
    }
}

impl std::fmt::Debug for Cookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are credentials
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Cookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Source of cookies for a domain, such as a browser profile
pub trait CookieStore: Send + Sync {
    /// Return the cookies stored for `domain`; an empty set when there are none
    fn cookies_for_domain(&self, domain: &str) -> Result<Cookies, ImageCreatorError>;
}

/// Cookie store kept in memory
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    domains: RwLock<BTreeMap<String, Cookies>>,
}

impl MemoryCookieStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cookies stored for `domain`
    pub fn set(&self, domain: impl Into<String>, cookies: Cookies) {
        let mut domains = self
            .domains
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        domains.insert(domain.into(), cookies);
    }
}

impl CookieStore for MemoryCookieStore {
    fn cookies_for_domain(&self, domain: &str) -> Result<Cookies, ImageCreatorError> {
        let domains = self
            .domains
            .read()
            .map_err(|_| ImageCreatorError::CookieStore("cookie store lock poisoned".to_string()))?;
        Ok(domains.get(domain).cloned().unwrap_or_default())
    }
}
