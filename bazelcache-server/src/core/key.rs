//! Cache keys derived from request paths.
//!
//! A key is the request path without its leading slash, so `/cas/deadbeef`
//! becomes `cas/deadbeef`. The namespace prefix keeps action-cache and CAS
//! entries apart without the cache tier knowing about it.

use std::fmt;

/// Key namespace served by the protocol handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Action cache: build-action results keyed by action digest.
    Ac,
    /// Content-addressable storage: immutable blobs keyed by content hash.
    Cas,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ac => "ac",
            Self::Cas => "cas",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Namespaced key shared by the cache tier and the backing store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a namespace and the path remainder after it.
    ///
    /// Returns `None` when the remainder is empty.
    pub fn new(namespace: Namespace, remainder: &str) -> Option<Self> {
        let remainder = remainder.trim_start_matches('/');
        if remainder.is_empty() {
            return None;
        }
        Some(Self(format!("{}/{}", namespace.prefix(), remainder)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
