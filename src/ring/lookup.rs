//! The ring probe: given a point, find the virtual point that owns it.
//!
//! The owner of point `p` is the first virtual point at-or-after `p`. The sequence is viewed
//! as a circular buffer, so points past the last virtual point (and points at-or-before the first one)
//! belong to the first virtual point. Example with virtual points `[10, 25, 40, 60]`:
//!
//! probe(0)  -> index 0 (10)  - wraps
//! probe(10) -> index 0 (10)
//! probe(11) -> index 1 (25)
//! probe(60) -> index 3 (60)
//! probe(61) -> index 0 (10)  - wraps

/// Returns the index in `points` of the virtual point owning `point`, or `None` if `points` is empty.
///
/// `points` must be sorted in ascending order. Runs in O(log n).
pub fn probe(points: &[u32], point: u32) -> Option<usize> {
    let first = *points.first()?;
    let last = *points.last()?;
    if point <= first || point > last {
        return Some(0);
    }

    // smallest m such that points[m - 1] < point <= points[m]
    Some(points.partition_point(|elem| *elem < point))
}
