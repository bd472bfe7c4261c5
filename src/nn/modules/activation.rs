//! # Activation Function Modules

use crate::config::ConfigParams;
use crate::nn::registry::LayerBuilder;
use crate::nn::{require_rank, Layer, LayerError};
use crate::proto::TextMessage;

/// Rectified Linear Unit, `max(0, x)`, computed in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl Layer for ReLU {
    fn type_name(&self) -> &'static str {
        "ReLU"
    }

    fn in_place(&self) -> bool {
        true
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        Ok(input.to_vec())
    }
}

impl LayerBuilder for ReLU {
    fn from_config(_params: &ConfigParams) -> Result<Self, LayerError> {
        Ok(ReLU)
    }

    fn from_text(_layer: &TextMessage) -> Result<Self, LayerError> {
        Ok(ReLU)
    }
}

/// Hyperbolic tangent, computed in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct TanH;

impl Layer for TanH {
    fn type_name(&self) -> &'static str {
        "TanH"
    }

    fn in_place(&self) -> bool {
        true
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        Ok(input.to_vec())
    }
}

impl LayerBuilder for TanH {
    fn from_config(_params: &ConfigParams) -> Result<Self, LayerError> {
        Ok(TanH)
    }

    fn from_text(_layer: &TextMessage) -> Result<Self, LayerError> {
        Ok(TanH)
    }
}

/// Softmax over the channel axis. Writes a new blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct Softmax;

impl Layer for Softmax {
    fn type_name(&self) -> &'static str {
        "Softmax"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        require_rank(input, 2)?;
        Ok(input.to_vec())
    }
}

impl LayerBuilder for Softmax {
    fn from_config(_params: &ConfigParams) -> Result<Self, LayerError> {
        Ok(Softmax)
    }

    fn from_text(_layer: &TextMessage) -> Result<Self, LayerError> {
        Ok(Softmax)
    }
}
