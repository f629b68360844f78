//! [`ExtrapolationAnchor`] – projects the corrected pose forward on odometry
//! alone between beacon fixes.
//!
//! The anchor remembers one trustworthy pair: a raw odometry pose
//! (`mark_on_odometry`) and the corrected pose the robot had at that moment
//! (`expectation`).  Any later odometry pose is mapped by replaying the
//! odometry motion since the mark on top of the expectation:
//!
//! ```text
//! infer(odom) = expectation ⊕ (odom ⊖ mark_on_odometry)
//! ```
//!
//! When the filter produces a new trustworthy pair, [`ExtrapolationAnchor::fuse`]
//! blends it with what the old pair already predicts:
//!
//! ```text
//! pass_by    = new_mark ⊖ mark_on_odometry
//! conjecture = expectation ⊕ pass_by
//! r0 = reliability · (1 − min(1, |pass_by.p| / odometry_range))
//! r1 = 1 − r0 · min(1, |conjecture.p − new_expectation.p| / filter_range)
//! expectation' = average(conjecture · r0, new_expectation · r1)
//! reliability' = tanh(2 · r1 / (r0 + r1))
//! ```
//!
//! Old corrections lose trust the further the robot travels without a fix;
//! a new fix is trusted fully when it agrees with the extrapolation and
//! loses weight in proportion to how far it contradicts a still-trusted one.
//!
//! Anchors are immutable values; fusion returns a new anchor.

use posefuse_types::Pose;

use crate::interpolate::weighted_average;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrapolationAnchor {
    pub mark_on_odometry: Pose,
    pub expectation: Pose,
    /// Trust in this anchor, in `[0, 1)`.
    pub reliability: f64,
}

impl Default for ExtrapolationAnchor {
    fn default() -> Self {
        Self {
            mark_on_odometry: Pose::identity(),
            expectation: Pose::identity(),
            reliability: 0.0,
        }
    }
}

impl ExtrapolationAnchor {
    /// Corrected pose for a raw odometry pose.
    pub fn infer(&self, odometry: &Pose) -> Pose {
        self.expectation
            .plus_delta(&odometry.minus_state(&self.mark_on_odometry))
    }

    /// Blend a new `(new_mark, new_expectation)` pair into this anchor.
    pub fn fuse(
        &self,
        new_mark: &Pose,
        new_expectation: &Pose,
        odometry_reliable_range: f64,
        filter_reliable_range: f64,
    ) -> ExtrapolationAnchor {
        let pass_by = new_mark.minus_state(&self.mark_on_odometry);
        let conjecture = self.expectation.plus_delta(&pass_by);

        let travelled = pass_by.position.norm() / odometry_reliable_range;
        let r0 = self.reliability * (1.0 - travelled.min(1.0));
        let disagreement =
            conjecture.position.distance(&new_expectation.position) / filter_reliable_range;
        // Scaled by the disagreement itself: an agreeing fix gets r1 = 1.
        let r1 = 1.0 - r0 * disagreement.min(1.0);

        ExtrapolationAnchor {
            mark_on_odometry: *new_mark,
            expectation: weighted_average((&conjecture, r0), (new_expectation, r1)),
            reliability: (2.0 * r1 / (r0 + r1)).tanh(),
        }
    }

    /// Same anchor with its trust dropped to zero.
    pub fn distrusted(&self) -> ExtrapolationAnchor {
        ExtrapolationAnchor {
            reliability: 0.0,
            ..*self
        }
    }
}
