//! Notification records published by contract instances.

use serde::{Deserialize, Serialize};

/// One published state together with its version.
///
/// `update_count` strictly increases across successive publications of the
/// same notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord<T> {
    pub value: T,
    pub update_count: u64,
}

impl<T> UpdateRecord<T> {
    #[must_use]
    pub fn new(value: T, update_count: u64) -> Self {
        Self {
            value,
            update_count,
        }
    }

    /// Transform the value, keeping the version.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> UpdateRecord<U> {
        UpdateRecord {
            value: f(self.value),
            update_count: self.update_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_count() {
        let record = UpdateRecord::new(3_u64, 7).map(|v| v * 2);
        assert_eq!(record.value, 6);
        assert_eq!(record.update_count, 7);
    }

    #[test]
    fn serde_roundtrip() {
        let record = UpdateRecord::new("hello".to_string(), 1);
        let json = serde_json::to_string(&record).unwrap();
        let back: UpdateRecord<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
