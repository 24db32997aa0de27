//! Two-phase epoch computation.
//!
//! - **Map**: per input vector, BMU plus a contribution for every neuron (map.rs)
//! - **Reduce**: per neuron, weighted average of its contributions (reduce.rs)
//! - **Epoch**: local engine wiring both phases together (epoch.rs)

mod contribution;
mod counter;
pub mod epoch;
pub mod map;
pub mod reduce;

pub use contribution::{Contribution, VECTOR_MARKER};
pub use counter::InstanceCounter;
pub use epoch::{EpochOutput, EpochPhase, EpochRunner};
pub use map::{map_vector, parse_record, MapStats, MapTask};
pub use reduce::{Accumulator, NeuronUpdate, Reducer, UpdateOutcome};
