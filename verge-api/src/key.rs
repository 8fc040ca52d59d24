//! Primary-key types.
//!
//! Resource families disagree on what `$key` looks like: most use integers,
//! NAS local users use 40-character hex strings, update packages are keyed by
//! name. Each shape implements [`ResourceKey`] and they are never unified.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::filter::quote;

/// A primary-key shape usable by [`ResourceManager`](crate::ResourceManager).
pub trait ResourceKey:
    Clone + fmt::Debug + fmt::Display + FromStr + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Literal form inside a filter expression, e.g. `42` or `'abc…'`.
    fn filter_literal(&self) -> String;

    /// Form used as a URL path segment (`{endpoint}/{segment}`).
    fn path_segment(&self) -> String {
        self.to_string()
    }

    /// Form used inside request bodies.
    fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }

    /// Read a key out of a response value, accepting both JSON and string encodings.
    fn from_json(value: &Value) -> Option<Self> {
        if let Ok(key) = serde_json::from_value(value.clone()) {
            return Some(key);
        }
        value.as_str().and_then(|s| s.parse().ok())
    }
}

impl ResourceKey for u64 {
    fn filter_literal(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}

impl ResourceKey for String {
    fn filter_literal(&self) -> String {
        quote(self)
    }
}

/// Key of a NAS local user: exactly 40 hexadecimal characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NasUserKey(String);

impl NasUserKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.len() != 40 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidArgument(format!(
                "NAS user key must be 40 hex characters, got {key:?}"
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NasUserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NasUserKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for NasUserKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NasUserKey> for String {
    fn from(key: NasUserKey) -> Self {
        key.0
    }
}

impl ResourceKey for NasUserKey {
    fn filter_literal(&self) -> String {
        quote(&self.0)
    }
}

/// Reference value of the form `<collection>/<key>`, e.g. `vms/12`.
///
/// The API uses these inside filters and bodies wherever a row points at a
/// row of another collection.
pub fn reference(collection: &str, key: &impl fmt::Display) -> String {
    format!("{collection}/{key}")
}

/// Parse the trailing key out of a `<collection>/<key>` reference.
pub fn parse_reference<K: ResourceKey>(value: &str) -> Option<K> {
    value.rsplit('/').next().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_integer_key() {
        assert_eq!(42u64.filter_literal(), "42");
        assert_eq!(42u64.path_segment(), "42");
        assert_eq!(42u64.to_json(), Value::from(42));
        assert_eq!(u64::from_json(&Value::from(7)), Some(7));
        assert_eq!(u64::from_json(&Value::from("7")), Some(7));
        assert_eq!(u64::from_json(&Value::Null), None);
    }

    #[test]
    fn test_nas_user_key_validation() {
        let key = NasUserKey::new(HEX).unwrap();
        assert_eq!(key.filter_literal(), format!("'{HEX}'"));
        assert!(NasUserKey::new("abc").is_err());
        assert!(NasUserKey::new("z".repeat(40)).is_err());
        assert!(serde_json::from_value::<NasUserKey>(Value::from("short")).is_err());
    }

    #[test]
    fn test_string_key_is_quoted() {
        let key = "yb-core's".to_owned();
        assert_eq!(key.filter_literal(), "'yb-core''s'");
        assert_eq!(String::from_json(&Value::from("yb-core")), Some("yb-core".to_owned()));
    }

    #[test]
    fn test_references() {
        assert_eq!(reference("vms", &12u64), "vms/12");
        assert_eq!(parse_reference::<u64>("machine_snapshots/50"), Some(50));
        assert_eq!(parse_reference::<u64>("/v4/vms/9"), Some(9));
        assert_eq!(parse_reference::<u64>("vms/x"), None);
    }
}
