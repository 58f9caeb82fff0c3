//! V2X relevance filtering by communication range.
//!
//! Unlike broadcast assembly, this filter measures real world distances
//! between the observer's latest known position and every other track.

use crate::v2x_history::HistoryLedger;
use tracing::debug;

/// Track ids within `max_distance` meters of `observer_id`, ascending.
///
/// Fail-open: when the observer is unknown, has no history, or its latest
/// entry has no world position, every known track id is returned.
/// Tracks whose latest entry has no world position are never in range.
pub fn relevant_tracks(ledger: &HistoryLedger, observer_id: u64, max_distance: f64) -> Vec<u64> {
    let observer = match ledger.latest(observer_id).and_then(|e| e.world_position) {
        Some(position) => position,
        None => {
            debug!("Observer {} has no known position, returning all tracks", observer_id);
            return ledger.track_ids().collect();
        }
    };

    ledger
        .track_ids()
        .filter(|&id| id != observer_id)
        .filter(|&id| {
            ledger
                .latest(id)
                .and_then(|e| e.world_position)
                .is_some_and(|pos| (pos - observer).norm() <= max_distance)
        })
        .collect()
}
