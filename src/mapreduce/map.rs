//! Map stage: BMU search and per-neuron contributions for each input vector.

use crate::config::{EpochConfig, ParsePolicy};
use crate::error::{Result, SomError};
use crate::mapreduce::{Contribution, InstanceCounter};
use crate::som::{distance_squared, Neighborhood, NeuronGrid};
use log::{debug, warn};

/// Field separator of input records.
pub const RECORD_SEPARATOR: char = ',';

/// Per-task map statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    /// Records mapped successfully.
    pub mapped: u64,
    /// Malformed records skipped under [`ParsePolicy::Skip`].
    pub skipped: u64,
    /// Blank records ignored.
    pub blank: u64,
    /// Key-value pairs emitted.
    pub emitted: u64,
}

impl MapStats {
    /// Adds another task's statistics to these.
    pub fn merge(&mut self, other: &MapStats) {
        self.mapped += other.mapped;
        self.skipped += other.skipped;
        self.blank += other.blank;
        self.emitted += other.emitted;
    }
}

/// Parses one comma-separated input record into a vector.
///
/// The record must have exactly `dimension` finite components.
pub fn parse_record(record: &str, dimension: usize) -> Result<Vec<f64>> {
    let mut vector = Vec::with_capacity(dimension);

    for token in record.trim().split(RECORD_SEPARATOR) {
        let token = token.trim();
        let value: f64 = token
            .parse()
            .map_err(|_| SomError::Parse(format!("invalid component '{}'", token)))?;
        if !value.is_finite() {
            return Err(SomError::Parse(format!("non-finite component '{}'", token)));
        }
        vector.push(value);
    }

    if vector.len() != dimension {
        return Err(SomError::Parse(format!(
            "expected {} components, found {}",
            dimension,
            vector.len()
        )));
    }

    Ok(vector)
}

/// Maps one input vector at instance `t`.
///
/// Emits, for every neuron `j`, the activation `a` of `j` around the BMU and
/// the input scaled by `a`, both keyed by `j`. Returns the BMU. Activations
/// are not normalized across neurons.
pub fn map_vector<F>(
    grid: &NeuronGrid,
    kernel: &Neighborhood,
    input: &[f64],
    t: u64,
    mut emit: F,
) -> Result<usize>
where
    F: FnMut(usize, Contribution),
{
    let bmu = grid.find_bmu(input)?;
    let bmu_weights = grid.neuron(bmu);

    for (j, weights) in grid.rows().enumerate() {
        let a = kernel.activation_for(distance_squared(bmu_weights, weights), t);
        emit(j, Contribution::Activation(a));
        emit(j, Contribution::Weighted(input.iter().map(|x| x * a).collect()));
    }

    Ok(bmu)
}

/// A map task over one partition.
///
/// Borrows the epoch's grid snapshot and owns its counter; nothing else
/// is shared with other tasks.
pub struct MapTask<'a> {
    grid: &'a NeuronGrid,
    kernel: Neighborhood,
    policy: ParsePolicy,
    counter: InstanceCounter,
    stats: MapStats,
    position: u64,
}

impl<'a> MapTask<'a> {
    /// Creates a task, checking the grid against the configured shape.
    pub fn new(grid: &'a NeuronGrid, config: &EpochConfig, counter: InstanceCounter) -> Result<Self> {
        config.validate()?;
        if grid.neuron_count() != config.neuron_count || grid.dimension() != config.attribute_dimension {
            return Err(SomError::Config(format!(
                "grid is {}x{}, configuration expects {}x{}",
                grid.neuron_count(),
                grid.dimension(),
                config.neuron_count,
                config.attribute_dimension
            )));
        }

        Ok(Self {
            grid,
            kernel: Neighborhood::from_config(config),
            policy: config.parse_policy,
            counter,
            stats: MapStats::default(),
            position: 0,
        })
    }

    /// Maps one raw record.
    ///
    /// Returns the BMU, or `None` when the record was blank or skipped.
    /// Skipped records do not advance the counter.
    pub fn map_record<F>(&mut self, record: &str, mut emit: F) -> Result<Option<usize>>
    where
        F: FnMut(usize, Contribution),
    {
        self.position += 1;

        if record.trim().is_empty() {
            self.stats.blank += 1;
            return Ok(None);
        }

        let input = match parse_record(record, self.grid.dimension()) {
            Ok(input) => input,
            Err(SomError::Parse(e)) => match self.policy {
                ParsePolicy::FailFast => {
                    return Err(SomError::Parse(format!("record {}: {}", self.position, e)));
                }
                ParsePolicy::Skip => {
                    warn!("Skipping record {}: {}", self.position, e);
                    self.stats.skipped += 1;
                    return Ok(None);
                }
            },
            Err(e) => return Err(e),
        };

        let t = self.counter.advance();
        let mut emitted = 0u64;
        let bmu = map_vector(self.grid, &self.kernel, &input, t, |j, c| {
            emitted += 1;
            emit(j, c);
        })?;

        self.stats.mapped += 1;
        self.stats.emitted += emitted;
        debug!("record {} -> bmu {} (t={})", self.position, bmu, t);

        Ok(Some(bmu))
    }

    /// Maps every record of a partition in order.
    pub fn map_partition<I, S, F>(&mut self, records: I, mut emit: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(usize, Contribution),
    {
        for record in records {
            self.map_record(record.as_ref(), &mut emit)?;
        }
        Ok(())
    }

    /// Statistics so far.
    pub fn stats(&self) -> &MapStats {
        &self.stats
    }

    /// The instance counter in its current state.
    pub fn counter(&self) -> &InstanceCounter {
        &self.counter
    }
}
