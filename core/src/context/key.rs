//! `Key`: comparable keys for the context value map.
//!
//! Keys are a closed set of equality-comparable, hashable primitives. Floats
//! are deliberately absent: they have no total equality and cannot key a map.

use crate::ContextError;
use std::fmt;

/// A key in a [`Context`](crate::Context) value map.
///
/// The empty string is the nil key and is rejected on write.
///
/// # Example
///
/// ```
/// use ruleq::Key;
///
/// let k: Key = "role".into();
/// assert_eq!(k.to_string(), "role");
/// assert!(Key::from("").validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// String key, the common case.
    Str(String),
    /// Signed integer key.
    Int(i64),
    /// Unsigned integer key.
    Uint(u64),
    /// Boolean key.
    Bool(bool),
    /// Single character key.
    Char(char),
}

impl Key {
    /// Returns `true` if this is the nil key (empty string).
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Str(s) if s.is_empty())
    }

    /// Check that this key may be stored.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidKey`] for the nil key.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.is_nil() {
            return Err(ContextError::InvalidKey {
                reason: "nil key".into(),
            });
        }
        Ok(())
    }

    /// Returns the key as a string slice if it is a string key.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Char(c) => write!(f, "{c}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for Key {
    fn from(u: u64) -> Self {
        Self::Uint(u)
    }
}

impl From<u32> for Key {
    fn from(u: u32) -> Self {
        Self::Uint(u64::from(u))
    }
}

impl From<usize> for Key {
    fn from(u: usize) -> Self {
        Self::Uint(u as u64)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        Self::Char(c)
    }
}
