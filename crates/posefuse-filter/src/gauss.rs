//! [`Gaussian`] – normal density used as a soft likelihood, plus sampling.
//!
//! The density is evaluated as
//!
//! ```text
//! p(x) = 1 / (σ·√(2π)) · exp(−(x − σ)² / (2σ²))
//! ```
//!
//! i.e. the exponent is centred on `sigma`, not on `mean`, so deviations near
//! `σ` weigh the most.  Every weight the filter produces has this shape.
//! Sampling is centred on `mean`.

use rand::Rng;
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    mean: f64,
    sigma: f64,
    k0: f64,
    k1: f64,
}

impl Gaussian {
    /// `sigma` must be positive; callers validate it through
    /// [`FilterConfig::validate`][crate::config::FilterConfig::validate].
    pub fn new(mean: f64, sigma: f64) -> Self {
        Self {
            mean,
            sigma,
            k0: 1.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt()),
            k1: -1.0 / (2.0 * sigma * sigma),
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Weight of a deviation `x`.
    pub fn density(&self, x: f64) -> f64 {
        self.k0 * (self.k1 * (x - self.sigma).powi(2)).exp()
    }

    /// Draw one sample from `N(mean, sigma²)`.
    ///
    /// Falls back to `mean` if the distribution cannot be built.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Normal::new(self.mean, self.sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => self.mean,
        }
    }
}
