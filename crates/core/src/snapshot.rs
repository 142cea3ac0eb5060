//! The persisted unit of player progress and its on-disk/on-wire encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Current encoding version written into every envelope.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete serializable player progress.
///
/// `resource_levels` has one entry per unlocked resource. Unlocking is strictly
/// ordered, so the entries always describe a catalog prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Gold currently held.
    pub gold: f64,
    /// Level of every unlocked resource, in catalog order.
    #[serde(default)]
    pub resource_levels: Vec<u32>,
}

impl ProgressSnapshot {
    fn validate(&self) -> Result<(), StoreError> {
        if !self.gold.is_finite() || self.gold < 0.0 {
            return Err(StoreError::Decode(format!(
                "gold must be finite and non-negative, got {}",
                self.gold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    saved_at: DateTime<Utc>,
    progress: ProgressSnapshot,
}

/// Encode a snapshot in the shared local/remote format.
pub fn encode(snapshot: &ProgressSnapshot) -> Result<Vec<u8>, StoreError> {
    let envelope = Envelope {
        version: SCHEMA_VERSION,
        saved_at: Utc::now(),
        progress: snapshot.clone(),
    };
    serde_json::to_vec_pretty(&envelope).map_err(|err| StoreError::Decode(err.to_string()))
}

/// Decode bytes produced by [`encode`]. Never yields a partially-filled snapshot.
pub fn decode(bytes: &[u8]) -> Result<ProgressSnapshot, StoreError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.version == 0 || envelope.version > SCHEMA_VERSION {
        return Err(StoreError::Decode(format!(
            "unsupported save version {}",
            envelope.version
        )));
    }
    envelope.progress.validate()?;
    Ok(envelope.progress)
}

#[cfg(test)]
pub(crate) mod strategy {
    use proptest::{num::f64 as float, prelude::*};

    use super::ProgressSnapshot;

    /// Any snapshot [`decode`](super::decode) accepts: finite, non-negative
    /// gold across its whole range and arbitrary levels.
    pub(crate) fn progress() -> impl Strategy<Value = ProgressSnapshot> {
        let gold = prop_oneof![
            float::POSITIVE | float::ZERO | float::SUBNORMAL | float::NORMAL,
            Just(f64::MAX),
            Just(f64::MIN_POSITIVE),
            0.0f64..1e12,
        ];
        (gold, proptest::collection::vec(any::<u32>(), 0..64)).prop_map(
            |(gold, resource_levels)| ProgressSnapshot {
                gold,
                resource_levels,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encoded_snapshot_decodes_to_equal_value() {
        let snapshot = ProgressSnapshot {
            gold: 1_234_567.891_011,
            resource_levels: vec![12, 4, 0],
        };
        let bytes = encode(&snapshot).unwrap();
        assert_eq!(decode(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn truncated_blob_is_decode_error() {
        let bytes = encode(&ProgressSnapshot {
            gold: 42.0,
            resource_levels: vec![1, 2],
        })
        .unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(decode(truncated), Err(StoreError::Decode(_))));
    }

    #[test]
    fn rejects_negative_gold_and_future_versions() {
        let negative = br#"{"version":1,"saved_at":"2024-01-01T00:00:00Z","progress":{"gold":-5.0,"resource_levels":[]}}"#;
        assert!(matches!(decode(negative), Err(StoreError::Decode(_))));

        let future = br#"{"version":99,"saved_at":"2024-01-01T00:00:00Z","progress":{"gold":5.0,"resource_levels":[]}}"#;
        assert!(matches!(decode(future), Err(StoreError::Decode(_))));
    }

    #[test]
    fn negative_level_is_rejected() {
        let bytes = br#"{"version":1,"saved_at":"2024-01-01T00:00:00Z","progress":{"gold":5.0,"resource_levels":[1,-2]}}"#;
        assert!(matches!(decode(bytes), Err(StoreError::Decode(_))));
    }

    proptest! {
        #[test]
        fn any_valid_snapshot_decodes_to_itself(snapshot in strategy::progress()) {
            let bytes = encode(&snapshot).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), snapshot);
        }
    }
}
