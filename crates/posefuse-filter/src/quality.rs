//! Reduction of a particle population to a [`FusionQuality`].
//!
//! For a population of `n` particles:
//!
//! ```text
//! age       = Σ ageᵢ / (n · max_age)
//! location  = max(0, 1 − Σ |posᵢ − mean(pos)| / (n · max_inconsistency))
//! direction = |Σ unit(headingᵢ)| / n
//! ```

use posefuse_types::{FusionQuality, Point2D};

use crate::particle::Particle;

/// Compute the quality scores of `particles`.  An empty slice scores zero.
pub fn estimate(particles: &[Particle], max_age: u32, max_inconsistency: f64) -> FusionQuality {
    if particles.is_empty() {
        return FusionQuality::zero();
    }
    let n = particles.len() as f64;

    let age_sum: i64 = particles.iter().map(|p| p.age).sum();
    let mean_position = particles.iter().map(|p| p.pose.position).sum::<Point2D>() / n;
    let spread: f64 = particles
        .iter()
        .map(|p| p.pose.position.distance(&mean_position))
        .sum();
    let heading_sum: Point2D = particles.iter().map(|p| p.pose.direction()).sum();

    FusionQuality {
        age: age_sum as f64 / (n * max_age as f64),
        location: (1.0 - spread / (n * max_inconsistency)).max(0.0),
        direction: heading_sum.norm() / n,
    }
}
