//! [`ParticleFilter`] – the fusion engine.
//!
//! Owns the matcher, the particle population, the convergence gate and the
//! extrapolation anchor, and exposes the public operations:
//!
//! | Operation | Effect |
//! |---|---|
//! | [`measure_master`][ParticleFilter::measure_master] | Buffer an odometry sample, run ready updates, return the fused pose. |
//! | [`measure_helper`][ParticleFilter::measure_helper] | Buffer a beacon fix, run ready updates. |
//! | [`get`][ParticleFilter::get] | Fused pose for an odometry sample, without recording it. |
//! | [`get_or_set`][ParticleFilter::get_or_set] | Relocalise onto a known pose unless converged. |
//! | [`quality`][ParticleFilter::quality] / [`is_convergent`][ParticleFilter::is_convergent] | Latest scores and gate state. |
//!
//! Updates are serialised behind one [`parking_lot::Mutex`].  The anchor,
//! the quality and the last query are published through [`ArcSwap`] so pose
//! queries never wait on an update in progress and always see a whole value.
//!
//! # Example
//!
//! ```rust
//! use posefuse_filter::{FilterConfig, ParticleFilter};
//! use posefuse_types::{Pose, Stamped};
//!
//! let filter = ParticleFilter::new(FilterConfig::default()).unwrap();
//!
//! // Without beacon fixes the fused pose is raw odometry.
//! let fused = filter.measure_master(Stamped::new(0, Pose::new(1.0, 2.0, 0.3)));
//! assert_eq!(fused.value, Pose::new(1.0, 2.0, 0.3));
//! assert!(!filter.is_convergent());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use posefuse_types::{FusionError, FusionQuality, Point2D, Pose, Stamped, StepFeedback};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::FilterConfig;
use crate::extrapolator::ExtrapolationAnchor;
use crate::gate::ConvergenceGate;
use crate::gauss::Gaussian;
use crate::interpolate::interpolate;
use crate::matcher::BracketMatcher;
use crate::particle::{Particle, ParticlePopulation};
use crate::quality;

/// Callback receiving the diagnostics of every fully weighted step.
///
/// Runs while the update lock is held and must not call back into the
/// filter.
pub type StepFeedbackHook = Box<dyn Fn(&StepFeedback) + Send + Sync>;

// ────────────────────────────────────────────────────────────────────────────
// State guarded by the update lock
// ────────────────────────────────────────────────────────────────────────────

struct FilterCore {
    matcher: BracketMatcher<Pose, Point2D>,
    population: ParticlePopulation,
    /// Previous matched `(measure, state)` pair.
    step_memory: Option<(Point2D, Pose)>,
    gate: ConvergenceGate,
    rng: StdRng,
    step_feedback: Option<StepFeedbackHook>,
}

// ────────────────────────────────────────────────────────────────────────────
// ParticleFilter
// ────────────────────────────────────────────────────────────────────────────

pub struct ParticleFilter {
    config: FilterConfig,
    /// Weight of a particle's beacon distance.
    distance_weight: Gaussian,
    /// Weight of a beacon/odometry displacement mismatch.
    inconsistency_weight: Gaussian,
    core: Mutex<FilterCore>,
    anchor: ArcSwap<ExtrapolationAnchor>,
    quality: ArcSwap<Stamped<FusionQuality>>,
    convergent: AtomicBool,
    last_query: ArcSwapOption<Stamped<Pose>>,
}

impl ParticleFilter {
    /// Build a filter using the convergence thresholds in `config.gate`.
    ///
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: FilterConfig) -> Result<Self, FusionError> {
        let gate = ConvergenceGate::from_thresholds(config.gate);
        Self::with_gate(config, gate)
    }

    /// Build a filter with custom convergence predicates.
    ///
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] if `config` fails validation.
    pub fn with_gate(config: FilterConfig, gate: ConvergenceGate) -> Result<Self, FusionError> {
        config.validate()?;
        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let core = FilterCore {
            matcher: BracketMatcher::new(config.match_horizon_ms),
            population: ParticlePopulation::new(config.count, config.locator_on_robot),
            step_memory: None,
            gate,
            rng,
            step_feedback: None,
        };
        Ok(Self {
            distance_weight: Gaussian::new(0.0, config.sigma),
            inconsistency_weight: Gaussian::new(0.0, config.max_inconsistency / 3.0),
            core: Mutex::new(core),
            anchor: ArcSwap::from_pointee(ExtrapolationAnchor::default()),
            quality: ArcSwap::from_pointee(Stamped::new(0, FusionQuality::zero())),
            convergent: AtomicBool::new(false),
            last_query: ArcSwapOption::empty(),
            config,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    // ── Public operations ────────────────────────────────────────────────────

    /// Record an odometry sample, run every update it makes ready, and
    /// return the fused pose at its timestamp.
    ///
    /// A sample older than the previous odometry sample is logged and
    /// dropped; the fused pose is still returned.
    pub fn measure_master(&self, sample: Stamped<Pose>) -> Stamped<Pose> {
        {
            let mut core = self.core.lock();
            match core.matcher.push_master(sample) {
                Ok(()) => self.update(&mut core),
                Err(err) => warn!(%err, "dropping odometry sample"),
            }
        }
        self.get(sample)
    }

    /// Record a beacon fix and run every update it makes ready.
    pub fn measure_helper(&self, sample: Stamped<Point2D>) {
        let mut core = self.core.lock();
        match core.matcher.push_helper(sample) {
            Ok(()) => self.update(&mut core),
            Err(err) => warn!(%err, "dropping beacon sample"),
        }
    }

    /// Fused pose for an odometry sample.  Never fails: before the first
    /// fusion this is the raw odometry pose.
    pub fn get(&self, sample: Stamped<Pose>) -> Stamped<Pose> {
        let fused = sample.map(|odometry| self.anchor.load().infer(&odometry));
        self.last_query.store(Some(Arc::new(fused)));
        fused
    }

    /// Relocalise onto `target` unless the filter has converged, then return
    /// the fused pose for `sample`.
    ///
    /// While converged this is exactly [`get`][Self::get].
    pub fn get_or_set(&self, sample: Stamped<Pose>, target: Pose) -> Stamped<Pose> {
        if !self.is_convergent() {
            let core = self.core.lock();
            if !core.gate.is_converged() {
                let anchor = self.anchor.load().fuse(
                    &sample.value,
                    &target,
                    self.config.odometry_reliable_range,
                    self.config.filter_reliable_range,
                );
                info!(time_ms = sample.time_ms, ?target, "relocalised onto known pose");
                self.anchor.store(Arc::new(anchor));
            }
        }
        self.get(sample)
    }

    /// Latest quality, stamped with the beacon time it was computed at.
    pub fn quality(&self) -> Stamped<FusionQuality> {
        **self.quality.load()
    }

    pub fn is_convergent(&self) -> bool {
        self.convergent.load(Ordering::Acquire)
    }

    /// Most recent pose returned by any query.
    pub fn last_query(&self) -> Option<Stamped<Pose>> {
        self.last_query.load_full().map(|pose| *pose)
    }

    /// Snapshot of the current population.
    pub fn particles(&self) -> Vec<Particle> {
        self.core.lock().population.particles().to_vec()
    }

    /// Install the diagnostics callback, replacing any previous one.
    pub fn set_step_feedback<F>(&self, hook: F)
    where
        F: Fn(&StepFeedback) + Send + Sync + 'static,
    {
        self.core.lock().step_feedback = Some(Box::new(hook));
    }

    pub fn clear_step_feedback(&self) {
        self.core.lock().step_feedback = None;
    }

    // ── Update loop ──────────────────────────────────────────────────────────

    /// Drain every ready bracket.  Only brackets `1..=max_interval_ms` wide
    /// are used.
    fn update(&self, core: &mut FilterCore) {
        while let Some(bracket) = core.matcher.next_match() {
            let interval_ms = bracket.interval_ms();
            if interval_ms < 1 || interval_ms > self.config.max_interval_ms {
                debug!(
                    interval_ms,
                    max_interval_ms = self.config.max_interval_ms,
                    "bracket out of range, skipping beacon fix"
                );
                continue;
            }
            let state = interpolate(&bracket.before, &bracket.after, bracket.helper.time_ms);
            self.step(core, bracket.helper.time_ms, bracket.helper.value, state);
        }
    }

    /// Process one matched `(measure, state)` pair.
    fn step(&self, core: &mut FilterCore, time_ms: i64, measure: Point2D, state: Pose) {
        let Some((last_measure, last_state)) = core.step_memory.replace((measure, state)) else {
            self.reinitialize(core, time_ms, measure, state);
            return;
        };

        // Beacon displacement against the displacement odometry predicts for
        // the beacon mount.
        let locator = self.config.locator_on_robot;
        let delta = state.minus_state(&last_state);
        let length_m = measure.distance(&last_measure);
        let length_s = delta.transform_point(&locator).distance(&locator);
        let inconsistency = (length_m - length_s).abs();
        if inconsistency >= self.config.max_inconsistency {
            debug!(time_ms, inconsistency, "beacon fix inconsistent with odometry");
            return;
        }
        let measure_weight =
            self.config.locator_weight() * self.inconsistency_weight.density(inconsistency);

        core.population.propagate(&state);
        let previous_direction = self.quality.load().value.direction;
        let limited_max_age =
            ((self.config.max_age as f64 * previous_direction).round() as i64).max(3);
        let weighing = core.population.reweigh(
            measure,
            limited_max_age,
            self.config.max_age,
            self.config.max_inconsistency,
            &self.distance_weight,
        );

        if weighing.sum <= 1.0 {
            core.population.clamp_ages();
            if !self.assess(core, time_ms) {
                self.reinitialize(core, time_ms, measure, state);
            }
            return;
        }

        let expectation = weighing.expectation(core.population.particles(), measure, measure_weight);
        let heading = expectation.heading();
        let replaced = core.population.resample(
            measure,
            &Gaussian::new(heading, self.config.sigma),
            &mut core.rng,
        );
        let converged = self.assess(core, time_ms);

        let beacon_expectation = Pose::from_parts(expectation.position, heading);
        let robot_expectation = Pose::with_mount_at(expectation.position, heading, &locator);
        if converged {
            let anchor = self.anchor.load().fuse(
                &state,
                &robot_expectation,
                self.config.odometry_reliable_range,
                self.config.filter_reliable_range,
            );
            debug!(
                time_ms,
                replaced,
                reliability = anchor.reliability,
                "anchor fused"
            );
            self.anchor.store(Arc::new(anchor));
        }

        if let Some(hook) = &core.step_feedback {
            hook(&StepFeedback {
                measure_weight,
                particle_weight: weighing.sum,
                quality: self.quality.load().value,
                measure,
                state,
                beacon_expectation,
                robot_expectation,
            });
        }
    }

    /// Recompute the quality, publish it and feed the gate.  Returns the gate
    /// state.
    fn assess(&self, core: &mut FilterCore, time_ms: i64) -> bool {
        let quality = self.publish_quality(core, time_ms);
        let was = core.gate.is_converged();
        let now = core.gate.update(&quality);
        self.convergent.store(now, Ordering::Release);
        if now != was {
            if now {
                info!(time_ms, %quality, "particle filter converged");
            } else {
                info!(time_ms, %quality, "particle filter diverged");
            }
        }
        now
    }

    fn publish_quality(&self, core: &FilterCore, time_ms: i64) -> FusionQuality {
        let quality = quality::estimate(
            core.population.particles(),
            self.config.max_age,
            self.config.max_inconsistency,
        );
        self.quality.store(Arc::new(Stamped::new(time_ms, quality)));
        quality
    }

    /// Fan the population out around `measure`.  The anchor keeps its pair
    /// but loses its trust.
    fn reinitialize(&self, core: &mut FilterCore, time_ms: i64, measure: Point2D, state: Pose) {
        debug!(time_ms, x = measure.x, y = measure.y, "reinitialising particles");
        core.population.reinitialize(measure, state);
        self.publish_quality(core, time_ms);
        let anchor = self.anchor.load().distrusted();
        self.anchor.store(Arc::new(anchor));
    }
}

impl std::fmt::Debug for ParticleFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleFilter")
            .field("config", &self.config)
            .field("convergent", &self.is_convergent())
            .field("quality", &self.quality())
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
