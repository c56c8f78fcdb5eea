//! Change-detecting snapshot publisher.

use crate::state::DeviceSnapshot;
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

/// Topic the merged snapshot is published on.
pub const MEASUREMENT_TOPIC: &str = "dvi/measurement";

/// Errors raised when publishing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to publish snapshot: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
}

/// Remembers the last snapshot actually transmitted.
///
/// Comparison is full structural equality; the first snapshot always counts
/// as changed.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    last_published: Option<DeviceSnapshot>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `snapshot` differs from the last published state.
    pub fn is_changed(&self, snapshot: &DeviceSnapshot) -> bool {
        self.last_published.as_ref() != Some(snapshot)
    }

    /// Record `snapshot` as the published state. Call only after a
    /// successful transmit.
    pub fn mark_published(&mut self, snapshot: &DeviceSnapshot) {
        self.last_published = Some(snapshot.clone());
    }
}

/// Publishes the full snapshot to [`MEASUREMENT_TOPIC`] when it changes.
pub struct MeasurementPublisher {
    client: AsyncClient,
    tracker: SnapshotTracker,
}

impl MeasurementPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            tracker: SnapshotTracker::new(),
        }
    }

    /// Publish `snapshot` if it differs from the last published state.
    ///
    /// Always the whole snapshot, never a delta; retained=false. Returns
    /// whether a publish happened. The tracker only advances on success, so
    /// a failed transmit is retried on the next change check.
    pub async fn publish_if_changed(
        &mut self,
        snapshot: &DeviceSnapshot,
    ) -> Result<bool, PublishError> {
        if !self.tracker.is_changed(snapshot) {
            return Ok(false);
        }

        let payload = serde_json::to_vec(snapshot)?;
        self.client
            .publish(MEASUREMENT_TOPIC, QoS::AtMostOnce, false, payload)
            .await?;
        self.tracker.mark_published(snapshot);
        debug!("Published snapshot to {}", MEASUREMENT_TOPIC);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(label: &str, value: f64) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::default();
        snapshot
            .input_registers
            .insert(label.to_string(), value);
        snapshot
    }

    #[test]
    fn test_first_snapshot_counts_as_changed() {
        let tracker = SnapshotTracker::new();
        assert!(tracker.is_changed(&DeviceSnapshot::default()));
    }

    #[test]
    fn test_unchanged_snapshot_publishes_once() {
        let mut tracker = SnapshotTracker::new();
        let snapshot = snapshot_with("Evaporator", 21.5);

        assert!(tracker.is_changed(&snapshot));
        tracker.mark_published(&snapshot);
        assert!(!tracker.is_changed(&snapshot));
        // Identical reassembly still compares equal.
        assert!(!tracker.is_changed(&snapshot_with("Evaporator", 21.5)));
    }

    #[test]
    fn test_any_difference_counts_as_changed() {
        let mut tracker = SnapshotTracker::new();
        let snapshot = snapshot_with("Evaporator", 21.5);
        tracker.mark_published(&snapshot);

        assert!(tracker.is_changed(&snapshot_with("Evaporator", 21.6)));

        let mut extra = snapshot.clone();
        extra.coils.insert("Heating element".to_string(), 1);
        assert!(tracker.is_changed(&extra));
    }

    #[test]
    fn test_tracker_not_advanced_without_mark() {
        let tracker = SnapshotTracker::new();
        let snapshot = snapshot_with("Evaporator", 21.5);
        // A failed transmit leaves the tracker untouched, so the snapshot
        // still reads as changed.
        assert!(tracker.is_changed(&snapshot));
        assert!(tracker.is_changed(&snapshot));
    }
}
