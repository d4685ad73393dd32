//! `Value`: the type-erased payload stored in a context.
//!
//! Primitives are stored inline; anything else goes through the `Custom`
//! variant as a shared `Any`. Typed reads go through [`FromValue`], which
//! applies a fixed coercion order:
//!
//! 1. direct variant match
//! 2. integer and float targets parse a stored string
//! 3. [`Duration`] from a duration string or an `Int` count of nanoseconds
//! 4. [`DateTime<Utc>`] from an RFC 3339 string or `Int` Unix seconds
//!
//! `String` targets never coerce from non-string values.

use super::duration::parse_duration;
use chrono::{DateTime, TimeZone, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A value stored in a [`Context`](crate::Context).
///
/// # Example
///
/// ```
/// use ruleq::Value;
///
/// let v: Value = "admin".into();
/// assert_eq!(v.as_str(), Some("admin"));
/// assert_eq!(Value::from(42i64).type_name(), "int");
/// ```
#[derive(Clone)]
pub enum Value {
    /// UTF-8 string.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Time span.
    Duration(Duration),
    /// Wall clock instant.
    Time(DateTime<Utc>),
    /// Anything else. Compared by pointer identity.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wrap an arbitrary value.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// Returns a short name for the variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Duration(_) => "duration",
            Self::Time(_) => "time",
            Self::Custom(_) => "custom",
        }
    }

    /// Returns `true` for string, integer and boolean values.
    #[inline]
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Str(_) | Self::Int(_) | Self::Uint(_) | Self::Bool(_)
        )
    }

    /// Try to get the value as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the value as a signed integer.
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get the value as a boolean.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get the value as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Downcast a `Custom` value to a concrete type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Custom(c) => Arc::clone(c).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Uint(u) => f.debug_tuple("Uint").field(u).finish(),
            Self::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Duration(d) => f.debug_tuple("Duration").field(d).finish(),
            Self::Time(t) => f.debug_tuple("Time").field(t).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// General-purpose rendering, used as the fingerprint fallback.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Duration(d) => write!(f, "{d:?}"),
            Self::Time(t) => f.write_str(&t.to_rfc3339()),
            Self::Custom(c) => write!(f, "custom@{:p}", Arc::as_ptr(c)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions into Value
// ═══════════════════════════════════════════════════════════════════════════════

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Uint(u)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Self::Uint(u64::from(u))
    }
}

impl From<usize> for Value {
    fn from(u: usize) -> Self {
        Self::Uint(u as u64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Self::Float(f64::from(x))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Time(t)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Typed reads
// ═══════════════════════════════════════════════════════════════════════════════

/// Type-directed coercion out of a [`Value`].
///
/// Used by [`Context::get`](crate::Context::get) and
/// [`Context::try_get`](crate::Context::try_get).
pub trait FromValue: Sized {
    /// Convert, or `None` when the value cannot represent `Self`.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(<[u8]>::to_vec)
    }
}

macro_rules! integer_from_value {
    ($($ty:ty),*) => {$(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Int(i) => <$ty>::try_from(*i).ok(),
                    Value::Uint(u) => <$ty>::try_from(*u).ok(),
                    Value::Str(s) => s.trim().parse().ok(),
                    _ => None,
                }
            }
        }
    )*};
}

integer_from_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(x) => Some(*x as f32),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for Duration {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Duration(d) => Some(*d),
            Value::Str(s) => parse_duration(s),
            Value::Int(nanos) => u64::try_from(*nanos).ok().map(Duration::from_nanos),
            Value::Uint(nanos) => Some(Duration::from_nanos(*nanos)),
            _ => None,
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Time(t) => Some(*t),
            Value::Str(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_match() {
        assert_eq!(String::from_value(&"x".into()), Some("x".to_string()));
        assert_eq!(i64::from_value(&Value::Int(5)), Some(5));
        assert_eq!(bool::from_value(&Value::Bool(true)), Some(true));
        assert_eq!(f64::from_value(&Value::Float(1.5)), Some(1.5));
    }

    #[test]
    fn test_numeric_from_string() {
        assert_eq!(i64::from_value(&"42".into()), Some(42));
        assert_eq!(u8::from_value(&" 7 ".into()), Some(7));
        assert_eq!(f64::from_value(&"2.5".into()), Some(2.5));
        assert_eq!(i64::from_value(&"nope".into()), None);
        assert_eq!(u8::from_value(&"300".into()), None);
    }

    #[test]
    fn test_string_never_coerces() {
        assert_eq!(String::from_value(&Value::Int(1)), None);
        assert_eq!(String::from_value(&Value::Bool(true)), None);
    }

    #[test]
    fn test_bool_does_not_parse_strings() {
        assert_eq!(bool::from_value(&"true".into()), None);
    }

    #[test]
    fn test_duration_coercion() {
        assert_eq!(
            Duration::from_value(&"1m".into()),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            Duration::from_value(&Value::Int(1_000)),
            Some(Duration::from_micros(1))
        );
        assert_eq!(Duration::from_value(&Value::Int(-1)), None);
        assert_eq!(Duration::from_value(&Value::Bool(true)), None);
    }

    #[test]
    fn test_time_coercion() {
        let t = DateTime::<Utc>::from_value(&"2024-01-02T03:04:05Z".into()).unwrap();
        assert_eq!(t.timestamp(), 1_704_164_645);

        let t = DateTime::<Utc>::from_value(&Value::Int(86_400)).unwrap();
        assert_eq!(t.to_rfc3339(), "1970-01-02T00:00:00+00:00");

        assert!(DateTime::<Utc>::from_value(&"yesterday".into()).is_none());
    }

    #[test]
    fn test_custom_equality_is_identity() {
        let a = Value::custom(5u8);
        let b = a.clone();
        let c = Value::custom(5u8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast::<u8>().as_deref(), Some(&5));
        assert!(a.downcast::<u16>().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("a").to_string(), "a");
        assert_eq!(Value::from(-3i64).to_string(), "-3");
        assert_eq!(Value::from(false).to_string(), "false");
        assert_eq!(Value::from(Duration::from_millis(1500)).to_string(), "1.5s");
    }
}
