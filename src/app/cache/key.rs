//! Cache key derivation
//!
//! A cache key is the pair of the request path (leading separator removed)
//! and the raw query string. Keeping the two parts apart means no path or
//! query content can make two different requests share a key, which a
//! delimiter join such as `"{path}?{query}"` cannot guarantee.

use std::fmt;
use std::path::Path;

use url::Url;

use crate::constants::files;
use crate::errors::{KeyError, KeyResult};

/// Stable identifier of a cacheable origin resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    path: String,
    query: String,
}

impl CacheKey {
    /// Request path without its leading separator, still percent-encoded
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the `?`, empty when the request had none
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Build the origin URL for this key
    ///
    /// `base` is joined with the path by a single `/`, and the query is only
    /// appended when present.
    pub fn origin_url(&self, base: &Url) -> KeyResult<Url> {
        let mut joined = format!("{}/{}", base.as_str().trim_end_matches('/'), self.path);
        if !self.query.is_empty() {
            joined.push('?');
            joined.push_str(&self.query);
        }

        Url::parse(&joined).map_err(|e| KeyError::InvalidOriginUrl {
            url: joined.clone(),
            error: e.to_string(),
        })
    }

    /// Extension of the requested resource, including the leading dot
    ///
    /// Taken from the last path segment. Anything that is not a short
    /// alphanumeric extension is dropped so the cache file name stays safe.
    pub fn extension(&self) -> Option<String> {
        let last_segment = self.path.rsplit('/').next()?;
        let ext = Path::new(last_segment).extension()?.to_str()?;

        if ext.is_empty()
            || ext.len() > files::MAX_EXTENSION_LEN
            || !ext.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return None;
        }

        Some(format!(".{}", ext))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            write!(f, "/{}", self.path)
        } else {
            write!(f, "/{}?{}", self.path, self.query)
        }
    }
}

/// Maps inbound request targets onto cache keys
pub struct KeyDeriver;

impl KeyDeriver {
    /// Derive the cache key for a request path and raw query
    ///
    /// # Errors
    ///
    /// Returns `KeyError::MalformedRequest` when the path or query contains
    /// whitespace or control characters, when the path carries a `?` or `#`
    /// or a `.`/`..` segment (percent-encoded or not), or when the query
    /// carries a `#`.
    pub fn derive(path: &str, raw_query: &str) -> KeyResult<CacheKey> {
        let path = path.strip_prefix('/').unwrap_or(path);

        Self::check_component("path", path, &['?', '#'])?;
        Self::check_segments(path)?;
        Self::check_component("query", raw_query, &['#'])?;

        Ok(CacheKey {
            path: path.to_string(),
            query: raw_query.to_string(),
        })
    }

    fn check_component(name: &str, value: &str, forbidden: &[char]) -> KeyResult<()> {
        if let Some(bad) = value
            .chars()
            .find(|c| c.is_control() || c.is_whitespace() || forbidden.contains(c))
        {
            return Err(KeyError::MalformedRequest {
                reason: format!("{} contains {:?}", name, bad),
            });
        }
        Ok(())
    }

    /// Dot segments would be resolved when the origin URL is parsed and
    /// could step outside the origin base path
    fn check_segments(path: &str) -> KeyResult<()> {
        for segment in path.split(['/', '\\']) {
            let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
            if decoded == "." || decoded == ".." {
                return Err(KeyError::MalformedRequest {
                    reason: format!("path contains dot segment {:?}", segment),
                });
            }
        }
        Ok(())
    }
}
