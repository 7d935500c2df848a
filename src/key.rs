//! Cache Key Builder
//!
//! Keys are `namespace:operation[:param...]`. Parameter order is significant
//! and parameter values are formatted with `Display` as-is; a value that itself
//! contains `:` is not escaped.

use std::fmt::{self, Display};

/// Separator between key segments
pub const DELIMITER: char = ':';

/// Trailing wildcard marking a pattern delete
pub const WILDCARD: char = '*';

/// One key parameter
///
/// `Sync` keeps a `&[&id]` argument from making the caller's future `!Send`
/// when it is still alive across an `.await`.
pub type KeyParam<'a> = &'a (dyn Display + Sync);

/// A fully built cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build `namespace:operation:p1:p2...`
    ///
    /// ```
    /// use entity_cache::CacheKey;
    ///
    /// let key = CacheKey::build("user", "byid", &[&5]);
    /// assert_eq!(key.as_str(), "user:byid:5");
    /// ```
    #[must_use]
    pub fn build(namespace: &str, operation: &str, params: &[KeyParam<'_>]) -> Self {
        use fmt::Write;

        let mut key = String::with_capacity(namespace.len() + operation.len() + 1 + params.len() * 8);
        key.push_str(namespace);
        key.push(DELIMITER);
        key.push_str(operation);
        for param in params {
            key.push(DELIMITER);
            // Writing into a String cannot fail
            let _ = write!(key, "{param}");
        }
        Self(key)
    }

    /// Pattern matching every key of a namespace (`namespace:*`)
    #[must_use]
    pub fn namespace_pattern(namespace: &str) -> String {
        format!("{namespace}{DELIMITER}{WILDCARD}")
    }

    /// Keys to delete when invalidating one operation
    ///
    /// Returns the bare key `namespace:operation` (operations called without
    /// params) and the pattern `namespace:operation:*`. A looser
    /// `namespace:operation*` would also hit unrelated operations sharing the prefix.
    #[must_use]
    pub fn operation_keys(namespace: &str, operation: &str) -> [String; 2] {
        let bare = format!("{namespace}{DELIMITER}{operation}");
        let pattern = format!("{bare}{DELIMITER}{WILDCARD}");
        [bare, pattern]
    }

    /// Borrow the key as `&str`
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner `String`
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// `true` when `key` is a trailing-wildcard pattern
#[must_use]
pub fn is_pattern(key: &str) -> bool {
    key.ends_with(WILDCARD)
}

/// Literal prefix of a trailing-wildcard pattern (`user:*` -> `user:`)
#[must_use]
pub fn pattern_prefix(pattern: &str) -> &str {
    pattern.strip_suffix(WILDCARD).unwrap_or(pattern)
}

/// Namespace segment of a key or pattern (`user:byid:5` -> `user`)
#[must_use]
pub fn namespace_of(key: &str) -> &str {
    key.split_once(DELIMITER).map_or(key, |(namespace, _)| namespace)
}

/// Build a [`CacheKey`] from a namespace, an operation and any number of
/// `Display` params.
///
/// ```
/// use entity_cache::cache_key;
///
/// let key = cache_key!("user", "byemail", "ada@example.com");
/// assert_eq!(key.as_str(), "user:byemail:ada@example.com");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($namespace:expr, $operation:expr $(, $param:expr)* $(,)?) => {
        $crate::CacheKey::build($namespace, $operation, &[$(&$param as $crate::key::KeyParam<'_>),*])
    };
}
