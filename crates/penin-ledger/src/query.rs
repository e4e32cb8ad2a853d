//! Ledger query and filtering
//!
//! Read-side lookups for auditors and shells: by event id, by type, by
//! candidate, or by sequence/time window. All queries run over fully sealed
//! events and never touch the write path.

use crate::{EventType, LedgerEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query filter for ledger events; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    /// Matches the `candidate_id` field of the event payload
    pub candidate_id: Option<String>,
    /// Inclusive sequence window
    pub sequence_range: Option<(u64, u64)>,
    /// Inclusive timestamp window
    pub timestamp_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl EventFilter {
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(candidate_id) = &self.candidate_id {
            let payload_candidate = event
                .payload
                .get("candidate_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if payload_candidate != candidate_id {
                return false;
            }
        }
        if let Some((low, high)) = self.sequence_range {
            if event.sequence < low || event.sequence > high {
                return false;
            }
        }
        if let Some((from, to)) = self.timestamp_range {
            if event.timestamp_utc < from || event.timestamp_utc > to {
                return false;
            }
        }
        true
    }
}

/// Apply a filter over sealed events, preserving sequence order
pub fn filter_events<'a>(events: &'a [LedgerEvent], filter: &EventFilter) -> Vec<&'a LedgerEvent> {
    events.iter().filter(|e| filter.matches(e)).collect()
}

/// Locate one event by its id
pub fn find_by_event_id<'a>(events: &'a [LedgerEvent], event_id: &str) -> Option<&'a LedgerEvent> {
    events.iter().find(|e| e.event_id == event_id)
}

/// Locate the `pcag` event sealing the given artifact hash
pub fn find_pcag<'a>(events: &'a [LedgerEvent], artifact_hash: &str) -> Option<&'a LedgerEvent> {
    events.iter().find(|e| {
        e.event_type == EventType::Pcag
            && e.pcag
                .as_ref()
                .map(|p| p.artifact_hash == artifact_hash)
                .unwrap_or(false)
    })
}
