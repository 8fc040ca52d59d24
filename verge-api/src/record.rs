//! Typed views over resource records.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::constants::GB;
use crate::key::ResourceKey;

/// A deserializable model of one API record.
///
/// Models keep every server field they do not name in an `extra` map so that
/// undocumented fields stay reachable through [`field`](Record::field).
pub trait Record: DeserializeOwned + Send + Sync + 'static {
    type Key: ResourceKey;

    fn key(&self) -> Self::Key;

    fn extra(&self) -> &Map<String, Value>;

    /// Raw access to a field the model does not declare.
    fn field(&self, name: &str) -> Option<&Value> {
        self.extra().get(name)
    }
}

/// Implement [`Record`] for a model with `key` and `extra` fields.
#[macro_export]
macro_rules! impl_record {
    ($model:ty, $key:ty) => {
        impl $crate::Record for $model {
            type Key = $key;

            fn key(&self) -> $key {
                self.key.clone()
            }

            fn extra(&self) -> &$crate::__private::Map<String, $crate::__private::Value> {
                &self.extra
            }
        }
    };
}

/// Convert a byte count to gigabytes, rounded to two decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / GB as f64)
}

/// Convert gigabytes to a byte count.
pub fn gb_to_bytes(gb: f64) -> u64 {
    (gb * GB as f64).round() as u64
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Interpret an epoch-seconds timestamp. Zero means "never" and yields `None`.
pub fn epoch_to_datetime(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(seconds, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gb_conversions() {
        assert_eq!(bytes_to_gb(50 * GB), 50.0);
        assert_eq!(bytes_to_gb(GB / 3), 0.33);
        assert_eq!(gb_to_bytes(50.0), 53_687_091_200);
        assert_eq!(bytes_to_gb(gb_to_bytes(1.5)), 1.5);
    }

    #[test]
    fn test_epoch_conversion() {
        assert_eq!(epoch_to_datetime(0), None);
        let ts = epoch_to_datetime(1_700_000_000).unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }
}
