//! Values emitted by the map stage and grouped by neuron for the reduce stage.

use crate::error::{Result, SomError};
use std::fmt;

/// Prefix that marks a weighted vector on the streaming wire.
pub const VECTOR_MARKER: char = '@';

/// One fact about a (neuron, input) pair.
///
/// The map stage emits both variants under the same neuron key so the
/// shuffle delivers them to the same reduce group.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    /// The neighborhood activation of the neuron for one input.
    Activation(f64),
    /// The input scaled component-wise by that activation.
    Weighted(Vec<f64>),
}

impl Contribution {
    /// Encodes the value for a text shuffle: a bare number for an
    /// activation, `@`-prefixed comma-separated components for a vector.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// Decodes a value produced by [`Contribution::to_wire`].
    pub fn from_wire(value: &str) -> Result<Self> {
        let value = value.trim();

        if let Some(body) = value.strip_prefix(VECTOR_MARKER) {
            let components = body
                .split(',')
                .map(|token| parse_component(token.trim()))
                .collect::<Result<Vec<f64>>>()?;
            return Ok(Contribution::Weighted(components));
        }

        parse_component(value).map(Contribution::Activation)
    }
}

impl fmt::Display for Contribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contribution::Activation(a) => write!(f, "{}", a),
            Contribution::Weighted(v) => {
                write!(f, "{}", VECTOR_MARKER)?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", x)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_component(token: &str) -> Result<f64> {
    let value: f64 = token
        .parse()
        .map_err(|_| SomError::Parse(format!("invalid contribution value '{}'", token)))?;
    if !value.is_finite() {
        return Err(SomError::Parse(format!(
            "non-finite contribution value '{}'",
            token
        )));
    }
    Ok(value)
}
