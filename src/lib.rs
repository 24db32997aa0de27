//! # somreduce - one-epoch map/reduce SOM training
//!
//! somreduce trains a Self-Organizing Map one epoch at a time as a two-phase
//! data-parallel computation that fits a map/reduce engine.
//!
//! ## Overview
//!
//! During the **map** phase every input vector is matched to its Best
//! Matching Unit (BMU). Each neuron then receives a contribution from the
//! vector, scaled by a Gaussian neighborhood kernel centred on the BMU whose
//! width shrinks with the number of processed instances. During the
//! **reduce** phase the contributions of each neuron are averaged, weighted
//! by activation, into the neuron's weights for the next epoch.
//!
//! The neighborhood is measured between neuron weight vectors, not on a
//! topological grid.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use somreduce::{EpochConfig, EpochRunner};
//!
//! let config = EpochConfig::new(16, 3, 2.0, 1000.0, "weights.txt");
//! let grid = config.load_grid()?;
//!
//! let partitions = somreduce::storage::read_partitions("input.csv".as_ref(), 4)?;
//! let output = EpochRunner::new(&config, &grid)?.run(&partitions)?;
//!
//! let next = output.next_grid(&grid)?;
//! next.save("weights.next.txt".as_ref())?;
//! ```
//!
//! ## Architecture
//!
//! - [`som`] - Neuron grid, distance, BMU search and neighborhood kernel
//! - [`mapreduce`] - Map and reduce stages and the local epoch engine
//! - [`storage`] - Text record formats for partitions, emissions and output
//! - [`config`] - Epoch parameters and policies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod mapreduce;
pub mod som;
pub mod storage;

// Re-export commonly used types
pub use config::{CounterMode, DegeneratePolicy, EpochConfig, ParsePolicy};
pub use error::{Result, SomError};
pub use mapreduce::{
    Accumulator, Contribution, EpochOutput, EpochPhase, EpochRunner, InstanceCounter, MapStats,
    MapTask, NeuronUpdate, Reducer, UpdateOutcome,
};
pub use som::{compute_bmu, distance, Neighborhood, NeuronGrid};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
