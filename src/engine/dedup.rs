use crate::domain::{Position, PositionKey};
use std::collections::HashSet;
use tracing::debug;

/// Collapse rows that refer to the same real position.
///
/// The row with the lowest id represents its key; the rest are dropped.
/// Output is ordered by id. Returns the survivors and the number dropped.
pub fn dedup_positions(mut positions: Vec<Position>) -> (Vec<Position>, usize) {
    positions.sort_by_key(|p| p.id);

    let mut seen: HashSet<PositionKey> = HashSet::with_capacity(positions.len());
    let before = positions.len();
    positions.retain(|p| {
        let key = p.key();
        if seen.contains(&key) {
            debug!(position_id = p.id, key = %key, "Skipping duplicate position row");
            false
        } else {
            seen.insert(key);
            true
        }
    });

    let dropped = before - positions.len();
    (positions, dropped)
}
