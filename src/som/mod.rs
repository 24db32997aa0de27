//! Self-Organizing Map numeric core.
//!
//! - **Grid**: the immutable per-epoch weight snapshot and its loader (grid.rs)
//! - **Distance**: Euclidean distance and BMU search (distance.rs)
//! - **Neighborhood**: the annealed Gaussian kernel (neighborhood.rs)

pub mod distance;
mod grid;
mod neighborhood;

pub use distance::{compute_bmu, distance, distance_squared};
pub use grid::NeuronGrid;
pub use neighborhood::Neighborhood;
