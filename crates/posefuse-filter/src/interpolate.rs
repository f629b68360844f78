//! Weighted blending of poses.
//!
//! Positions are averaged linearly.  Headings are averaged as unit vectors
//! and converted back to an angle, so `+179°` and `−179°` blend to `180°`
//! instead of `0°`.

use posefuse_types::{Point2D, Pose, Stamped};

/// Weighted average of two poses.  `w0 + w1` must be non-zero.
pub fn weighted_average(a: (&Pose, f64), b: (&Pose, f64)) -> Pose {
    let (p0, w0) = a;
    let (p1, w1) = b;
    let sum = w0 + w1;
    let position = (p0.position * w0 + p1.position * w1) / sum;
    let direction: Point2D = (p0.direction() * w0 + p1.direction() * w1) / sum;
    Pose::from_parts(position, direction.angle())
}

/// Blend of two stamped poses at `time_ms`.
///
/// With `k = (time_ms − t0) / (t1 − t0)`, `before` is weighted `k` and
/// `after` is weighted `1 − k`, so the result sits on `after` at `t0` and on
/// `before` at `t1`.  A zero-width bracket returns `before`; the filter
/// never feeds one.
pub fn interpolate(before: &Stamped<Pose>, after: &Stamped<Pose>, time_ms: i64) -> Pose {
    let width = after.time_ms - before.time_ms;
    if width == 0 {
        return before.value;
    }
    let k = (time_ms - before.time_ms) as f64 / width as f64;
    weighted_average((&before.value, k), (&after.value, 1.0 - k))
}
