//! Time-decaying Gaussian neighborhood kernel.
//!
//! The kernel measures proximity between the BMU and a target neuron in
//! weight space, not on a topological grid:
//!
//! ```text
//! width(t)          = 2 * (sigma0 * exp(-t / lambda))^2
//! activation(b,j,t) = exp(-|w_b - w_j|^2 / width(t))
//! ```

use crate::config::EpochConfig;
use crate::som::distance::distance_squared;
use crate::som::NeuronGrid;

/// Gaussian neighborhood with an exponentially shrinking bandwidth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighborhood {
    /// Initial bandwidth (sigma0).
    pub initial_size: f64,
    /// Decay constant (lambda).
    pub decay: f64,
}

impl Neighborhood {
    /// Creates a kernel from its bandwidth and decay constant.
    pub fn new(initial_size: f64, decay: f64) -> Self {
        Self {
            initial_size,
            decay,
        }
    }

    /// Creates the kernel configured for an epoch.
    pub fn from_config(config: &EpochConfig) -> Self {
        Self::new(config.neighborhood_size, config.decay)
    }

    /// Kernel width after `t` processed instances.
    #[inline]
    pub fn width(&self, t: u64) -> f64 {
        let sigma = self.initial_size * (-(t as f64) / self.decay).exp();
        2.0 * sigma * sigma
    }

    /// Activation for a squared weight-space distance at instance `t`.
    ///
    /// Coincident neurons always get 1, including once the width has
    /// underflowed to zero.
    #[inline]
    pub fn activation_for(&self, distance_sq: f64, t: u64) -> f64 {
        if distance_sq == 0.0 {
            return 1.0;
        }
        let width = self.width(t);
        if width <= 0.0 {
            return 0.0;
        }
        (-distance_sq / width).exp()
    }

    /// Activation of neuron `target` given the BMU `bmu` at instance `t`.
    pub fn activation(&self, grid: &NeuronGrid, bmu: usize, target: usize, t: u64) -> f64 {
        let distance_sq = distance_squared(grid.neuron(bmu), grid.neuron(target));
        self.activation_for(distance_sq, t)
    }
}
