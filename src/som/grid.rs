//! The neuron weight grid shared read-only by every map task.

use crate::error::{Result, SomError};
use crate::mapreduce::NeuronUpdate;
use crate::som::distance::compute_bmu;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use std::fs;
use std::path::Path;

/// Standard deviation of randomly initialized weights.
const INIT_STD: f64 = 0.1;

/// Number of weights in a grid of the given shape.
fn weight_len(neuron_count: usize, dimension: usize) -> Result<usize> {
    if neuron_count == 0 || dimension == 0 {
        return Err(SomError::Config(format!(
            "invalid grid shape {}x{}",
            neuron_count, dimension
        )));
    }
    neuron_count.checked_mul(dimension).ok_or_else(|| {
        SomError::Config(format!(
            "grid shape {}x{} is too large",
            neuron_count, dimension
        ))
    })
}

/// An immutable snapshot of the neuron weights for one epoch.
///
/// Weights are stored flat, row-major, `neuron_count * dimension` values.
/// A grid is never mutated once built: the next epoch's grid is a new value
/// produced by [`NeuronGrid::apply_updates`].
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronGrid {
    neuron_count: usize,
    dimension: usize,
    weights: Vec<f64>,
}

impl NeuronGrid {
    /// Builds a grid from one weight vector per neuron.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let neuron_count = rows.len();
        if neuron_count == 0 {
            return Err(SomError::Config("grid has no neurons".to_string()));
        }
        let dimension = rows[0].len();
        if dimension == 0 {
            return Err(SomError::Config("grid rows are empty".to_string()));
        }

        let mut weights = Vec::with_capacity(weight_len(neuron_count, dimension)?);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dimension {
                return Err(SomError::Config(format!(
                    "row {} has {} components, expected {}",
                    i,
                    row.len(),
                    dimension
                )));
            }
            if row.iter().any(|w| !w.is_finite()) {
                return Err(SomError::Config(format!("row {} has a non-finite weight", i)));
            }
            weights.extend(row);
        }

        Ok(Self {
            neuron_count,
            dimension,
            weights,
        })
    }

    /// Parses the broadcast weight format: one neuron per line, whitespace
    /// separated, at least `dimension` tokens per line.
    ///
    /// Tokens past `dimension` are ignored; blank lines are skipped.
    pub fn parse(text: &str, neuron_count: usize, dimension: usize) -> Result<Self> {
        weight_len(neuron_count, dimension)?;

        // Grows with the rows actually read; the configured count is untrusted.
        let mut weights = Vec::new();
        let mut rows = 0usize;

        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if rows == neuron_count {
                return Err(SomError::Config(format!(
                    "weight source has more than {} rows",
                    neuron_count
                )));
            }

            let mut tokens = line.split_whitespace();
            for col in 0..dimension {
                let token = tokens.next().ok_or_else(|| {
                    SomError::Config(format!(
                        "line {}: expected {} weights, found {}",
                        line_no + 1,
                        dimension,
                        col
                    ))
                })?;
                let value: f64 = token.parse().map_err(|_| {
                    SomError::Config(format!("line {}: invalid weight '{}'", line_no + 1, token))
                })?;
                if !value.is_finite() {
                    return Err(SomError::Config(format!(
                        "line {}: non-finite weight '{}'",
                        line_no + 1,
                        token
                    )));
                }
                weights.push(value);
            }
            rows += 1;
        }

        if rows != neuron_count {
            return Err(SomError::Config(format!(
                "weight source has {} rows, expected {}",
                rows, neuron_count
            )));
        }

        Ok(Self {
            neuron_count,
            dimension,
            weights,
        })
    }

    /// Loads the broadcast weight file.
    ///
    /// A missing file is a configuration error: no epoch can run without it.
    pub fn load(path: &Path, neuron_count: usize, dimension: usize) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SomError::Config(format!("cannot read weight source {}: {}", path.display(), e))
        })?;
        Self::parse(&text, neuron_count, dimension)
    }

    /// Creates a grid with weights drawn from N(0, 0.1).
    pub fn random(neuron_count: usize, dimension: usize, seed: Option<u64>) -> Result<Self> {
        let len = weight_len(neuron_count, dimension)?;
        let mut rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };

        let weights = (0..len)
            .map(|_| INIT_STD * rng.sample::<f64, _>(StandardNormal))
            .collect();

        Ok(Self {
            neuron_count,
            dimension,
            weights,
        })
    }

    /// Returns the number of neurons.
    #[inline]
    pub fn neuron_count(&self) -> usize {
        self.neuron_count
    }

    /// Returns the weight vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Gets a neuron's weights.
    ///
    /// # Panics
    /// Panics if `index >= neuron_count`.
    #[inline]
    pub fn neuron(&self, index: usize) -> &[f64] {
        let offset = index * self.dimension;
        &self.weights[offset..offset + self.dimension]
    }

    /// Gets a neuron's weights, or `None` when out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&[f64]> {
        if index < self.neuron_count {
            Some(self.neuron(index))
        } else {
            None
        }
    }

    /// Iterates over neuron weight vectors in index order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.weights.chunks_exact(self.dimension)
    }

    /// Finds the Best Matching Unit, checking the input dimension first.
    pub fn find_bmu(&self, input: &[f64]) -> Result<usize> {
        if input.len() != self.dimension {
            return Err(SomError::DimensionMismatch {
                expected: self.dimension,
                actual: input.len(),
            });
        }
        Ok(compute_bmu(input, self))
    }

    /// Renders the grid in the broadcast weight format.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for row in self.rows() {
            let line: Vec<String> = row.iter().map(|w| w.to_string()).collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }

    /// Writes the grid in the broadcast weight format.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    /// Builds the next epoch's grid from reduce output.
    ///
    /// Updated and retained neurons take their emitted weights; inactive
    /// neurons and neurons with no record keep this grid's row.
    pub fn apply_updates(&self, updates: &[NeuronUpdate]) -> Result<NeuronGrid> {
        let mut next = self.clone();

        for update in updates {
            if update.neuron >= self.neuron_count {
                return Err(SomError::NeuronOutOfBounds {
                    index: update.neuron,
                    max: self.neuron_count,
                });
            }
            if let Some(weights) = update.weights() {
                if weights.len() != self.dimension {
                    return Err(SomError::DimensionMismatch {
                        expected: self.dimension,
                        actual: weights.len(),
                    });
                }
                if weights.iter().any(|w| !w.is_finite()) {
                    return Err(SomError::Config(format!(
                        "update for neuron {} has a non-finite weight",
                        update.neuron
                    )));
                }
                let offset = update.neuron * self.dimension;
                next.weights[offset..offset + self.dimension].copy_from_slice(weights);
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapreduce::UpdateOutcome;

    #[test]
    fn test_parse() {
        let grid = NeuronGrid::parse("0.0 1.0\n2.0 3.0\n", 2, 2).unwrap();
        assert_eq!(grid.neuron_count(), 2);
        assert_eq!(grid.dimension(), 2);
        assert_eq!(grid.neuron(1), &[2.0, 3.0]);
    }

    #[test]
    fn test_parse_ignores_extra_tokens_and_blank_lines() {
        let grid = NeuronGrid::parse("1 2 99\n\n3\t4\n", 2, 2).unwrap();
        assert_eq!(grid.neuron(0), &[1.0, 2.0]);
        assert_eq!(grid.neuron(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_parse_row_count_mismatch() {
        assert!(matches!(
            NeuronGrid::parse("1 2\n", 2, 2),
            Err(SomError::Config(_))
        ));
        assert!(matches!(
            NeuronGrid::parse("1 2\n3 4\n5 6\n", 2, 2),
            Err(SomError::Config(_))
        ));
    }

    #[test]
    fn test_parse_short_row() {
        assert!(matches!(
            NeuronGrid::parse("1 2\n3\n", 2, 2),
            Err(SomError::Config(_))
        ));
    }

    #[test]
    fn test_parse_bad_token() {
        assert!(matches!(
            NeuronGrid::parse("1 x\n3 4\n", 2, 2),
            Err(SomError::Config(_))
        ));
        assert!(matches!(
            NeuronGrid::parse("1 NaN\n3 4\n", 2, 2),
            Err(SomError::Config(_))
        ));
    }

    #[test]
    fn test_text_roundtrip() {
        let grid = NeuronGrid::random(6, 3, Some(42)).unwrap();
        let parsed = NeuronGrid::parse(&grid.to_text(), 6, 3).unwrap();
        assert_eq!(grid, parsed);
    }

    #[test]
    fn test_random_is_seeded() {
        let a = NeuronGrid::random(4, 5, Some(1)).unwrap();
        let b = NeuronGrid::random(4, 5, Some(1)).unwrap();
        assert_eq!(a, b);
        assert!(a.rows().flatten().any(|&w| w != 0.0));
    }

    #[test]
    fn test_parse_huge_neuron_count() {
        // Row count mismatch is reported without sizing a buffer from the count.
        assert!(matches!(
            NeuronGrid::parse("1\n2\n", 1usize << 61, 1),
            Err(SomError::Config(_))
        ));
        assert!(matches!(
            NeuronGrid::parse("1 2\n", usize::MAX, 2),
            Err(SomError::Config(_))
        ));
    }

    #[test]
    fn test_random_rejects_empty_shape() {
        assert!(matches!(
            NeuronGrid::random(0, 3, Some(1)),
            Err(SomError::Config(_))
        ));
        assert!(matches!(
            NeuronGrid::random(3, 0, Some(1)),
            Err(SomError::Config(_))
        ));
        assert!(matches!(
            NeuronGrid::random(usize::MAX, 2, Some(1)),
            Err(SomError::Config(_))
        ));
    }

    #[test]
    fn test_constructors_keep_shape_consistent() {
        let grid = NeuronGrid::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(grid.rows().count(), grid.neuron_count());
        assert!(matches!(
            NeuronGrid::from_rows(vec![vec![1.0, 2.0], vec![3.0]]),
            Err(SomError::Config(_))
        ));
    }

    #[test]
    fn test_find_bmu_checks_dimension() {
        let grid = NeuronGrid::random(4, 3, Some(1)).unwrap();
        assert!(matches!(
            grid.find_bmu(&[1.0]),
            Err(SomError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_apply_updates() {
        let grid = NeuronGrid::from_rows(vec![vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        let updates = vec![
            NeuronUpdate::new(0, UpdateOutcome::Updated(vec![5.0])),
            NeuronUpdate::new(1, UpdateOutcome::Inactive),
        ];

        let next = grid.apply_updates(&updates).unwrap();
        assert_eq!(next.neuron(0), &[5.0]);
        assert_eq!(next.neuron(1), &[1.0]);
        assert_eq!(next.neuron(2), &[2.0]);
        // The source grid is untouched.
        assert_eq!(grid.neuron(0), &[0.0]);
    }

    #[test]
    fn test_apply_updates_out_of_bounds() {
        let grid = NeuronGrid::from_rows(vec![vec![0.0]]).unwrap();
        let updates = vec![NeuronUpdate::new(3, UpdateOutcome::Updated(vec![1.0]))];
        assert!(matches!(
            grid.apply_updates(&updates),
            Err(SomError::NeuronOutOfBounds { index: 3, max: 1 })
        ));
    }
}
