//! Configuration for a single SOM training epoch.

use crate::error::{Result, SomError};
use crate::som::NeuronGrid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the map stage does with a malformed input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsePolicy {
    /// Abort the map task on the first malformed record.
    #[default]
    FailFast,
    /// Count the record as skipped and continue.
    Skip,
}

/// What the reduce stage emits for a neuron whose total activation is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Emit the neuron's weights from the current grid unchanged.
    #[default]
    RetainPrevious,
    /// Emit an inactive marker; the next grid keeps the previous row.
    MarkInactive,
    /// Fail the reduce task with [`SomError::DegenerateReduce`].
    Fail,
}

/// How the instance counter is shared between concurrent map tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// Each partition counts its own records from the baseline.
    /// Deterministic and fully parallel.
    #[default]
    PerPartition,
    /// All partitions draw from one atomic counter.
    /// Values are globally unique but their order depends on scheduling.
    Global,
}

/// Parameters of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Number of neurons in the grid.
    pub neuron_count: usize,

    /// Number of components in every input and weight vector.
    pub attribute_dimension: usize,

    /// Initial neighborhood bandwidth (sigma0).
    pub neighborhood_size: f64,

    /// Bandwidth decay constant (lambda).
    pub decay: f64,

    /// Path to the broadcast weight file.
    pub weights_path: PathBuf,

    /// Malformed record handling.
    /// Default: fail fast.
    #[serde(default)]
    pub parse_policy: ParsePolicy,

    /// Zero-activation handling.
    /// Default: retain previous weights.
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,

    /// Instance counter sharing.
    /// Default: per partition.
    #[serde(default)]
    pub counter_mode: CounterMode,

    /// Counter value for the first record of the epoch.
    /// Default: 0.
    #[serde(default)]
    pub counter_baseline: u64,
}

impl EpochConfig {
    /// Creates a configuration with default policies.
    pub fn new(
        neuron_count: usize,
        attribute_dimension: usize,
        neighborhood_size: f64,
        decay: f64,
        weights_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            neuron_count,
            attribute_dimension,
            neighborhood_size,
            decay,
            weights_path: weights_path.into(),
            parse_policy: ParsePolicy::default(),
            degenerate_policy: DegeneratePolicy::default(),
            counter_mode: CounterMode::default(),
            counter_baseline: 0,
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SomError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every scalar parameter. Must pass before any mapping starts.
    pub fn validate(&self) -> Result<()> {
        if self.neuron_count == 0 {
            return Err(SomError::Config("neuron count must be positive".to_string()));
        }
        if self.attribute_dimension == 0 {
            return Err(SomError::Config(
                "attribute dimension must be positive".to_string(),
            ));
        }
        if !(self.neighborhood_size.is_finite() && self.neighborhood_size > 0.0) {
            return Err(SomError::Config(format!(
                "neighborhood size must be a positive number, got {}",
                self.neighborhood_size
            )));
        }
        if !(self.decay.is_finite() && self.decay > 0.0) {
            return Err(SomError::Config(format!(
                "decay must be a positive number, got {}",
                self.decay
            )));
        }
        Ok(())
    }

    /// Validates the configuration and loads the broadcast grid it refers to.
    pub fn load_grid(&self) -> Result<NeuronGrid> {
        self.validate()?;
        NeuronGrid::load(&self.weights_path, self.neuron_count, self.attribute_dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> EpochConfig {
        EpochConfig::new(4, 3, 1.5, 100.0, "weights.txt")
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        assert_eq!(config.parse_policy, ParsePolicy::FailFast);
        assert_eq!(config.degenerate_policy, DegeneratePolicy::RetainPrevious);
        assert_eq!(config.counter_mode, CounterMode::PerPartition);
        assert_eq!(config.counter_baseline, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_scalars() {
        let mut config = valid();
        config.neuron_count = 0;
        assert!(matches!(config.validate(), Err(SomError::Config(_))));

        let mut config = valid();
        config.attribute_dimension = 0;
        assert!(matches!(config.validate(), Err(SomError::Config(_))));

        let mut config = valid();
        config.neighborhood_size = -1.0;
        assert!(matches!(config.validate(), Err(SomError::Config(_))));

        let mut config = valid();
        config.decay = f64::NAN;
        assert!(matches!(config.validate(), Err(SomError::Config(_))));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"neuron_count": 2, "attribute_dimension": 1, "neighborhood_size": 1.0,
                "decay": 100.0, "weights_path": "w.txt", "parse_policy": "skip"}}"#
        )
        .unwrap();

        let config = EpochConfig::from_file(file.path()).unwrap();
        assert_eq!(config.neuron_count, 2);
        assert_eq!(config.parse_policy, ParsePolicy::Skip);
        assert_eq!(config.degenerate_policy, DegeneratePolicy::RetainPrevious);
    }

    #[test]
    fn test_from_json_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"neuron_count": 0, "attribute_dimension": 1, "neighborhood_size": 1.0,
                "decay": 100.0, "weights_path": "w.txt"}}"#
        )
        .unwrap();
        assert!(matches!(
            EpochConfig::from_file(file.path()),
            Err(SomError::Config(_))
        ));
    }

    #[test]
    fn test_missing_weights_is_config_error() {
        let config = EpochConfig::new(2, 1, 1.0, 100.0, "/nonexistent/weights.txt");
        assert!(matches!(config.load_grid(), Err(SomError::Config(_))));
    }
}
