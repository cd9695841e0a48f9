//! Derived summary of recently captured events.

use serde::{Deserialize, Serialize};

use super::{BusEvent, EventKind};

/// Maximum number of `log`/`error` events kept in a snapshot.
pub const CONTEXT_LOG_LIMIT: usize = 50;

/// Maximum number of `network` events kept in a snapshot.
pub const CONTEXT_NETWORK_LIMIT: usize = 20;

/// Read-only view over the event buffer, recomputed on every request.
///
/// Serialized in camelCase; absent `lastError`/`lastState` are `null` on the
/// wire rather than omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    /// Most recent `log` and `error` events, oldest first.
    pub logs: Vec<BusEvent>,
    /// Most recent `error` event.
    pub last_error: Option<BusEvent>,
    /// Most recent `state` event.
    pub last_state: Option<BusEvent>,
    /// Most recent `network` events, oldest first.
    pub recent_network: Vec<BusEvent>,
    /// Generation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ContextSnapshot {
    /// Builds a snapshot from events in insertion order.
    pub fn from_events<'a, I>(events: I, timestamp: i64) -> Self
    where
        I: DoubleEndedIterator<Item = &'a BusEvent> + Clone,
    {
        Self {
            logs: tail(events.clone().filter(|e| e.is_log_like()), CONTEXT_LOG_LIMIT),
            last_error: events
                .clone()
                .rev()
                .find(|e| e.kind == EventKind::Error)
                .cloned(),
            last_state: events
                .clone()
                .rev()
                .find(|e| e.kind == EventKind::State)
                .cloned(),
            recent_network: tail(
                events.filter(|e| e.kind == EventKind::Network),
                CONTEXT_NETWORK_LIMIT,
            ),
            timestamp,
        }
    }

    /// Returns a copy with the generation timestamp zeroed, for comparing
    /// snapshot content.
    #[must_use]
    pub fn without_timestamp(&self) -> Self {
        Self {
            timestamp: 0,
            ..self.clone()
        }
    }
}

/// Collects the last `limit` items of `iter`, preserving order.
fn tail<'a, I>(iter: I, limit: usize) -> Vec<BusEvent>
where
    I: DoubleEndedIterator<Item = &'a BusEvent>,
{
    let mut out: Vec<BusEvent> = iter.rev().take(limit).cloned().collect();
    out.reverse();
    out
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EventData, EventId};
    use serde_json::json;

    fn event(kind: EventKind, n: i64) -> BusEvent {
        BusEvent {
            id: EventId::new(),
            kind,
            timestamp: n,
            data: EventData::Opaque(json!(n)),
        }
    }

    #[test]
    fn empty_snapshot_serializes_nulls() {
        let Ok(json) = serde_json::to_value(ContextSnapshot::default()) else {
            panic!("serialization failed");
        };
        assert_eq!(
            json,
            json!({
                "logs": [],
                "lastError": null,
                "lastState": null,
                "recentNetwork": [],
                "timestamp": 0
            })
        );
    }

    #[test]
    fn logs_are_capped_and_keep_latest() {
        let events: Vec<BusEvent> = (0..60).map(|n| event(EventKind::Log, n)).collect();
        let snap = ContextSnapshot::from_events(events.iter(), 1);
        assert_eq!(snap.logs.len(), CONTEXT_LOG_LIMIT);
        assert_eq!(snap.logs.first().map(|e| e.timestamp), Some(10));
        assert_eq!(snap.logs.last().map(|e| e.timestamp), Some(59));
    }

    #[test]
    fn picks_most_recent_error_and_state() {
        let events = vec![
            event(EventKind::Error, 1),
            event(EventKind::State, 2),
            event(EventKind::Error, 3),
            event(EventKind::State, 4),
            event(EventKind::Log, 5),
        ];
        let snap = ContextSnapshot::from_events(events.iter(), 9);
        assert_eq!(snap.last_error.map(|e| e.timestamp), Some(3));
        assert_eq!(snap.last_state.map(|e| e.timestamp), Some(4));
        assert_eq!(snap.logs.len(), 3);
    }

    #[test]
    fn network_is_capped_separately() {
        let events: Vec<BusEvent> = (0..25).map(|n| event(EventKind::Network, n)).collect();
        let snap = ContextSnapshot::from_events(events.iter(), 0);
        assert_eq!(snap.recent_network.len(), CONTEXT_NETWORK_LIMIT);
        assert!(snap.logs.is_empty());
        assert_eq!(snap.recent_network.first().map(|e| e.timestamp), Some(5));
    }
}
