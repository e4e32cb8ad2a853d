//! Ledger records: the header line and hash-chained events.

use chrono::{DateTime, Utc};
use penin_enc::{canonical_hash, EncodingError, HashAlgorithm};
use penin_pcag::ProofCarryingArtifact;
use serde::{Deserialize, Serialize};

/// Current on-disk format version
pub const LEDGER_VERSION: &str = "2.0.0";

/// First line of every ledger file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerHeader {
    pub ledger_version: String,
    /// Wire name of the hash algorithm every event in this file uses
    pub hash_algorithm: String,
    pub created_at: DateTime<Utc>,
    /// Merkle root of the predecessor ledger, present after a rotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predecessor_root: Option<String>,
}

impl LedgerHeader {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            ledger_version: LEDGER_VERSION.to_string(),
            hash_algorithm: algorithm.name().to_string(),
            created_at: Utc::now(),
            predecessor_root: None,
        }
    }

    pub fn algorithm(&self) -> Result<HashAlgorithm, EncodingError> {
        HashAlgorithm::from_name(&self.hash_algorithm)
    }
}

/// Event kinds the promotion pipeline seals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ShadowEval,
    CanaryEval,
    Promote,
    Rollback,
    Pcag,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ShadowEval => "shadow_eval",
            Self::CanaryEval => "canary_eval",
            Self::Promote => "promote",
            Self::Rollback => "rollback",
            Self::Pcag => "pcag",
        };
        f.write_str(name)
    }
}

/// The fields covered by the event hash, hashed in canonical (sorted-key)
/// form
#[derive(Serialize)]
struct EventPrelude<'a> {
    sequence: u64,
    event_type: EventType,
    event_id: &'a str,
    timestamp_utc: &'a DateTime<Utc>,
    payload: &'a serde_json::Value,
    prev_hash: &'a str,
}

/// One atomic, immutable ledger record
///
/// Serialized to disk as a single compact JSON line with the fields in this
/// declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub sequence: u64,
    pub event_type: EventType,
    pub event_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// Event hash of the previous record; all zeros for sequence 0
    pub prev_hash: String,
    /// Hash over (sequence, event_type, event_id, timestamp_utc, payload,
    /// prev_hash), lowercase hex
    pub event_hash: String,
    /// Embedded proof artifact for `pcag` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcag: Option<ProofCarryingArtifact>,
}

impl LedgerEvent {
    /// Build a sealed event, computing its hash
    pub fn seal(
        sequence: u64,
        event_type: EventType,
        event_id: impl Into<String>,
        timestamp_utc: DateTime<Utc>,
        payload: serde_json::Value,
        prev_hash: impl Into<String>,
        pcag: Option<ProofCarryingArtifact>,
        algorithm: HashAlgorithm,
    ) -> Result<Self, EncodingError> {
        let event_id = event_id.into();
        let prev_hash = prev_hash.into();
        let digest = canonical_hash(
            &EventPrelude {
                sequence,
                event_type,
                event_id: &event_id,
                timestamp_utc: &timestamp_utc,
                payload: &payload,
                prev_hash: &prev_hash,
            },
            algorithm,
        )?;
        Ok(Self {
            sequence,
            event_type,
            event_id,
            timestamp_utc,
            payload,
            prev_hash,
            event_hash: hex::encode(digest),
            pcag,
        })
    }

    /// Recompute this event's hash from its fields
    pub fn recompute_hash(&self, algorithm: HashAlgorithm) -> Result<String, EncodingError> {
        let digest = canonical_hash(
            &EventPrelude {
                sequence: self.sequence,
                event_type: self.event_type,
                event_id: &self.event_id,
                timestamp_utc: &self.timestamp_utc,
                payload: &self.payload,
                prev_hash: &self.prev_hash,
            },
            algorithm,
        )?;
        Ok(hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use penin_enc::ZERO_HASH_HEX;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn sealed_event_hash_is_stable() {
        let event = LedgerEvent::seal(
            0,
            EventType::ShadowEval,
            "evt-0",
            stamp(),
            serde_json::json!({"candidate_id": "cand-001"}),
            ZERO_HASH_HEX,
            None,
            HashAlgorithm::Blake2b256,
        )
        .unwrap();
        assert_eq!(event.event_hash.len(), 64);
        assert_eq!(
            event.recompute_hash(HashAlgorithm::Blake2b256).unwrap(),
            event.event_hash
        );
    }

    #[test]
    fn payload_change_changes_hash() {
        let a = LedgerEvent::seal(
            0,
            EventType::ShadowEval,
            "evt-0",
            stamp(),
            serde_json::json!({"x": 1}),
            ZERO_HASH_HEX,
            None,
            HashAlgorithm::Blake2b256,
        )
        .unwrap();
        let b = LedgerEvent::seal(
            0,
            EventType::ShadowEval,
            "evt-0",
            stamp(),
            serde_json::json!({"x": 2}),
            ZERO_HASH_HEX,
            None,
            HashAlgorithm::Blake2b256,
        )
        .unwrap();
        assert_ne!(a.event_hash, b.event_hash);
    }

    #[test]
    fn disk_line_keeps_field_order() {
        let event = LedgerEvent::seal(
            0,
            EventType::Promote,
            "evt-0",
            stamp(),
            serde_json::json!({}),
            ZERO_HASH_HEX,
            None,
            HashAlgorithm::Blake2b256,
        )
        .unwrap();
        let line = serde_json::to_string(&event).unwrap();
        let seq_at = line.find("\"sequence\"").unwrap();
        let type_at = line.find("\"event_type\"").unwrap();
        let prev_at = line.find("\"prev_hash\"").unwrap();
        let hash_at = line.find("\"event_hash\"").unwrap();
        assert!(seq_at < type_at && type_at < prev_at && prev_at < hash_at);
    }

    #[test]
    fn header_round_trip() {
        let header = LedgerHeader::new(HashAlgorithm::Blake2b256);
        let line = serde_json::to_string(&header).unwrap();
        assert!(line.starts_with(r#"{"ledger_version":"2.0.0","hash_algorithm":"blake2b-256""#));
        let back: LedgerHeader = serde_json::from_str(&line).unwrap();
        assert_eq!(back.algorithm().unwrap(), HashAlgorithm::Blake2b256);
    }
}
