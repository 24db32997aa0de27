//! Euclidean distance and best-matching-unit search.

use crate::som::NeuronGrid;

/// Computes the Euclidean distance between two vectors.
#[inline]
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    distance_squared(a, b).sqrt()
}

/// Computes the squared Euclidean distance (avoids the sqrt).
#[inline]
pub fn distance_squared(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum()
}

/// Finds the Best Matching Unit for an input vector.
///
/// Linear scan over every neuron; ties go to the lowest index. The caller is
/// responsible for `input` having the grid's dimension.
pub fn compute_bmu(input: &[f64], grid: &NeuronGrid) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;

    for (i, weights) in grid.rows().enumerate() {
        // Squared distance preserves the ordering of the true distance.
        let dist = distance_squared(input, weights);
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }

    best_idx
}
