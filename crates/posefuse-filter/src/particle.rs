//! Heading-hypothesis population.
//!
//! Every [`Particle`] is one guess of the robot pose that is consistent with
//! the beacon fixes seen so far.  Instead of an importance weight each
//! particle carries an integer `age`: it grows while the particle keeps
//! landing its beacon mount within `max_inconsistency` of the fix and shrinks
//! otherwise.  Particles whose age drops below one are resampled around the
//! weighted mean heading.

use posefuse_types::{Point2D, Pose};
use rand::Rng;

use crate::gauss::Gaussian;

/// One hypothesis: a robot pose plus its age counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub pose: Pose,
    /// Confidence counter.  Not floored; it can become negative.
    pub age: i64,
}

impl Particle {
    /// Where this hypothesis puts the beacon mounted at `mount`.
    pub fn beacon_point(&self, mount: &Point2D) -> Point2D {
        self.pose.transform_point(mount)
    }
}

/// Per-particle weights of one update.
#[derive(Debug, Clone, PartialEq)]
pub struct Weighing {
    /// Beacon point implied by each particle.
    pub beacon_points: Vec<Point2D>,
    pub weights: Vec<f64>,
    /// `Σ weights`.  Negative ages can make it negative.
    pub sum: f64,
}

/// Weighted mean of the population blended with the beacon fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Expectation {
    /// Expected beacon point.
    pub position: Point2D,
    /// Weighted mean of the particle heading unit vectors.
    pub direction: Point2D,
}

impl Expectation {
    pub fn heading(&self) -> f64 {
        self.direction.angle()
    }
}

impl Weighing {
    /// `eP = (Σ pointᵢ·wᵢ + measure·measure_weight) / (Σ wᵢ + measure_weight)`
    /// and `eD = Σ unit(headingᵢ)·wᵢ / Σ wᵢ`.
    pub fn expectation(
        &self,
        particles: &[Particle],
        measure: Point2D,
        measure_weight: f64,
    ) -> Expectation {
        let mut position = Point2D::zero();
        let mut direction = Point2D::zero();
        for ((particle, point), &w) in particles
            .iter()
            .zip(&self.beacon_points)
            .zip(&self.weights)
        {
            position += *point * w;
            direction += particle.pose.direction() * w;
        }
        Expectation {
            position: (position + measure * measure_weight) / (self.sum + measure_weight),
            direction: direction / self.sum,
        }
    }
}

/// Fixed-size particle set plus the odometry pose it was last advanced to.
#[derive(Debug, Clone)]
pub struct ParticlePopulation {
    particles: Vec<Particle>,
    updating_memory: Pose,
    locator_on_robot: Point2D,
}

impl ParticlePopulation {
    /// `count` hypotheses fanned out around the origin.
    pub fn new(count: usize, locator_on_robot: Point2D) -> Self {
        let mut population = Self {
            particles: Vec::with_capacity(count),
            updating_memory: Pose::identity(),
            locator_on_robot,
        };
        population.fan_out(count, Point2D::zero(), Pose::identity());
        population
    }

    /// Replace every hypothesis: evenly spaced headings `i·2π/count`, each
    /// placed so that its beacon mount lands on `measure`, all aged zero.
    pub fn reinitialize(&mut self, measure: Point2D, state: Pose) {
        let count = self.particles.len();
        self.fan_out(count, measure, state);
    }

    fn fan_out(&mut self, count: usize, measure: Point2D, state: Pose) {
        let step = 2.0 * std::f64::consts::PI / count as f64;
        self.particles.clear();
        self.particles.extend((0..count).map(|i| Particle {
            pose: Pose::with_mount_at(measure, i as f64 * step, &self.locator_on_robot),
            age: 0,
        }));
        self.updating_memory = state;
    }

    /// Move every hypothesis by the odometry motion since the last update.
    pub fn propagate(&mut self, state: &Pose) {
        let delta = state.minus_state(&self.updating_memory);
        for particle in &mut self.particles {
            particle.pose = particle.pose.plus_delta(&delta);
        }
        self.updating_memory = *state;
    }

    /// Age every particle against `measure` and weigh it.
    ///
    /// A particle whose beacon point lies within `max_inconsistency` of the
    /// fix ages by one, capped at `limited_max_age`; any other particle loses
    /// one.  Its weight is then `age / max_age · distance_weight(distance)`.
    pub fn reweigh(
        &mut self,
        measure: Point2D,
        limited_max_age: i64,
        max_age: u32,
        max_inconsistency: f64,
        distance_weight: &Gaussian,
    ) -> Weighing {
        let mut beacon_points = Vec::with_capacity(self.particles.len());
        let mut weights = Vec::with_capacity(self.particles.len());
        for particle in &mut self.particles {
            let point = particle.beacon_point(&self.locator_on_robot);
            let distance = point.distance(&measure);
            particle.age = if distance < max_inconsistency {
                (particle.age + 1).min(limited_max_age)
            } else {
                particle.age - 1
            };
            beacon_points.push(point);
            weights.push(particle.age as f64 / max_age as f64 * distance_weight.density(distance));
        }
        let sum = weights.iter().sum();
        Weighing {
            beacon_points,
            weights,
            sum,
        }
    }

    /// Floor every age at zero.
    pub fn clamp_ages(&mut self) {
        for particle in &mut self.particles {
            particle.age = particle.age.max(0);
        }
    }

    /// Replace every particle younger than one with a fresh hypothesis whose
    /// heading is drawn from `heading` and whose beacon mount sits on
    /// `measure`.  Returns how many were replaced.
    pub fn resample<R: Rng + ?Sized>(
        &mut self,
        measure: Point2D,
        heading: &Gaussian,
        rng: &mut R,
    ) -> usize {
        let mut replaced = 0;
        for particle in self.particles.iter_mut().filter(|p| p.age < 1) {
            let theta = heading.sample(rng);
            *particle = Particle {
                pose: Pose::with_mount_at(measure, theta, &self.locator_on_robot),
                age: 0,
            };
            replaced += 1;
        }
        replaced
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}
