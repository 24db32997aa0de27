//! Reduce stage: weighted averaging of every contribution a neuron received.

use crate::config::DegeneratePolicy;
use crate::error::{Result, SomError};
use crate::mapreduce::Contribution;
use crate::som::NeuronGrid;
use log::warn;

/// Running sums for one neuron.
///
/// Sums are associative, so partial accumulators built by different map
/// tasks can be merged in any order before finishing.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    hck: f64,
    hck_x: Vec<f64>,
    activations: u64,
    vectors: u64,
}

impl Accumulator {
    /// Creates an empty accumulator for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            hck: 0.0,
            hck_x: vec![0.0; dimension],
            activations: 0,
            vectors: 0,
        }
    }

    /// Adds one contribution.
    pub fn add(&mut self, contribution: &Contribution) -> Result<()> {
        match contribution {
            Contribution::Activation(a) => {
                self.hck += a;
                self.activations += 1;
            }
            Contribution::Weighted(v) => {
                if v.len() != self.hck_x.len() {
                    return Err(SomError::Parse(format!(
                        "weighted vector has {} components, expected {}",
                        v.len(),
                        self.hck_x.len()
                    )));
                }
                for (sum, x) in self.hck_x.iter_mut().zip(v) {
                    *sum += x;
                }
                self.vectors += 1;
            }
        }
        Ok(())
    }

    /// Folds another partial accumulator into this one.
    pub fn merge(&mut self, other: &Accumulator) -> Result<()> {
        if other.hck_x.len() != self.hck_x.len() {
            return Err(SomError::DimensionMismatch {
                expected: self.hck_x.len(),
                actual: other.hck_x.len(),
            });
        }
        self.hck += other.hck;
        for (sum, x) in self.hck_x.iter_mut().zip(&other.hck_x) {
            *sum += x;
        }
        self.activations += other.activations;
        self.vectors += other.vectors;
        Ok(())
    }

    /// Sum of activation scalars.
    pub fn hck(&self) -> f64 {
        self.hck
    }

    /// Component-wise sum of weighted vectors.
    pub fn hck_x(&self) -> &[f64] {
        &self.hck_x
    }

    /// Number of activation scalars and weighted vectors received.
    pub fn counts(&self) -> (u64, u64) {
        (self.activations, self.vectors)
    }

    /// `hckX / hck`, or `None` when the result would not be finite.
    pub fn weighted_mean(&self) -> Option<Vec<f64>> {
        if self.hck == 0.0 || !self.hck.is_finite() {
            return None;
        }
        let mean: Vec<f64> = self.hck_x.iter().map(|x| x / self.hck).collect();
        if mean.iter().all(|x| x.is_finite()) {
            Some(mean)
        } else {
            None
        }
    }
}

/// What the reduce stage produced for a neuron.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Weighted average of the neuron's contributions.
    Updated(Vec<f64>),
    /// Zero activation; the previous weights are carried over.
    Retained(Vec<f64>),
    /// Zero activation; the neuron is marked inactive for this epoch.
    Inactive,
}

/// The reduce output record for one neuron.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronUpdate {
    /// Neuron index.
    pub neuron: usize,
    /// The neuron's new state.
    pub outcome: UpdateOutcome,
}

impl NeuronUpdate {
    /// Creates an update record.
    pub fn new(neuron: usize, outcome: UpdateOutcome) -> Self {
        Self { neuron, outcome }
    }

    /// Emitted weights, if any.
    pub fn weights(&self) -> Option<&[f64]> {
        match &self.outcome {
            UpdateOutcome::Updated(w) | UpdateOutcome::Retained(w) => Some(w),
            UpdateOutcome::Inactive => None,
        }
    }

    /// True when the neuron received zero activation.
    pub fn is_degenerate(&self) -> bool {
        !matches!(self.outcome, UpdateOutcome::Updated(_))
    }
}

/// Reduces grouped contributions against the epoch's grid snapshot.
///
/// The grid is only read for the fallback under
/// [`DegeneratePolicy::RetainPrevious`].
pub struct Reducer<'a> {
    grid: &'a NeuronGrid,
    policy: DegeneratePolicy,
}

impl<'a> Reducer<'a> {
    /// Creates a reducer.
    pub fn new(grid: &'a NeuronGrid, policy: DegeneratePolicy) -> Self {
        Self { grid, policy }
    }

    /// Creates an empty accumulator sized for this grid.
    pub fn accumulator(&self) -> Accumulator {
        Accumulator::new(self.grid.dimension())
    }

    /// Reduces the full group of contributions for `neuron`, in any order.
    pub fn reduce<I>(&self, neuron: usize, values: I) -> Result<NeuronUpdate>
    where
        I: IntoIterator<Item = Contribution>,
    {
        let mut acc = self.accumulator();
        for value in values {
            acc.add(&value)?;
        }
        self.finish(neuron, &acc)
    }

    /// Turns a complete accumulator into the neuron's update.
    pub fn finish(&self, neuron: usize, acc: &Accumulator) -> Result<NeuronUpdate> {
        let previous = self.grid.get(neuron).ok_or(SomError::NeuronOutOfBounds {
            index: neuron,
            max: self.grid.neuron_count(),
        })?;

        let (activations, vectors) = acc.counts();
        if activations != vectors {
            warn!(
                "Neuron {}: {} activations but {} weighted vectors",
                neuron, activations, vectors
            );
        }

        if let Some(mean) = acc.weighted_mean() {
            return Ok(NeuronUpdate::new(neuron, UpdateOutcome::Updated(mean)));
        }

        match self.policy {
            DegeneratePolicy::RetainPrevious => {
                warn!("Neuron {} received zero activation, retaining weights", neuron);
                Ok(NeuronUpdate::new(
                    neuron,
                    UpdateOutcome::Retained(previous.to_vec()),
                ))
            }
            DegeneratePolicy::MarkInactive => {
                warn!("Neuron {} received zero activation, marking inactive", neuron);
                Ok(NeuronUpdate::new(neuron, UpdateOutcome::Inactive))
            }
            DegeneratePolicy::Fail => Err(SomError::DegenerateReduce { neuron }),
        }
    }
}
