//! Query keys and their canonical hash.
//!
//! A [`QueryKey`] names a logical resource. Two keys refer to the same query
//! exactly when their canonical JSON text is equal; that text is the
//! [`QueryHash`] the registry is indexed by.
//!
//! ```
//! use querent::{QueryKey, query_key};
//!
//! let posts = QueryKey::from("posts");
//! assert_eq!(posts.query_hash().as_str(), "\"posts\"");
//!
//! let todo = query_key!["todos", 1];
//! assert_eq!(todo.query_hash().as_str(), "[\"todos\",1]");
//! ```

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// A single primitive component of a [`QueryKey`].
///
/// Numbers hash the way JSON writes them: a float with no fractional part
/// hashes like the integer of the same value, so `1.0` and `1` name the same
/// query. Non-finite floats hash as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    /// A string part.
    Str(String),
    /// An integer part.
    Int(i64),
    /// A floating-point part.
    Float(f64),
}

impl KeyPart {
    fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(n) => Value::from(*n),
            Self::Float(n) => float_to_json(*n),
        }
    }
}

// Integral floats within i64 range are written as integers.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

impl Serialize for KeyPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Identifies a logical resource: a single primitive or an ordered list of them.
///
/// Serializing a key produces exactly the text of its [`QueryHash`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKey {
    /// A key made of one primitive.
    Part(KeyPart),
    /// An ordered list of primitives.
    List(Vec<KeyPart>),
}

impl QueryKey {
    /// Returns the canonical JSON form of this key.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Part(part) => part.to_json(),
            Self::List(parts) => Value::Array(parts.iter().map(KeyPart::to_json).collect()),
        }
    }

    /// Computes the registry hash for this key.
    #[must_use]
    pub fn query_hash(&self) -> QueryHash {
        QueryHash(self.to_json().to_string())
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

macro_rules! single_part_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for QueryKey {
                fn from(value: $ty) -> Self {
                    Self::Part(KeyPart::from(value))
                }
            }
        )*
    };
}

single_part_key!(&str, String, &String, i64, i32, u32, f64);

impl From<KeyPart> for QueryKey {
    fn from(part: KeyPart) -> Self {
        Self::Part(part)
    }
}

impl<P: Into<KeyPart>> From<Vec<P>> for QueryKey {
    fn from(parts: Vec<P>) -> Self {
        Self::List(parts.into_iter().map(Into::into).collect())
    }
}

impl<P: Into<KeyPart>, const N: usize> From<[P; N]> for QueryKey {
    fn from(parts: [P; N]) -> Self {
        Self::List(parts.into_iter().map(Into::into).collect())
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for QueryKey {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

/// Builds a list [`QueryKey`] from mixed string and number parts.
///
/// ```
/// use querent::query_key;
///
/// let key = query_key!["users", 42, "posts"];
/// assert_eq!(key.query_hash().as_str(), "[\"users\",42,\"posts\"]");
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::QueryKey::List(vec![$($crate::KeyPart::from($part)),*])
    };
}

/// Canonical serialization of a [`QueryKey`]; the registry lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryHash(String);

impl QueryHash {
    /// Returns the canonical text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&QueryKey> for QueryHash {
    fn from(key: &QueryKey) -> Self {
        key.query_hash()
    }
}
