//! # Flatten Layer Module

use crate::config::ConfigParams;
use crate::nn::registry::LayerBuilder;
use crate::nn::{require_rank, Layer, LayerError};
use crate::proto::TextMessage;

/// Collapses every axis after the batch axis: `(N, *) -> (N, prod(*))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl Layer for Flatten {
    fn type_name(&self) -> &'static str {
        "Flatten"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        require_rank(input, 1)?;
        Ok(vec![input[0], input[1..].iter().product()])
    }
}

impl LayerBuilder for Flatten {
    fn from_config(_params: &ConfigParams) -> Result<Self, LayerError> {
        Ok(Flatten)
    }

    fn from_text(_layer: &TextMessage) -> Result<Self, LayerError> {
        Ok(Flatten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape() {
        assert_eq!(Flatten.output_shape(&[2, 3, 4, 5]).unwrap(), vec![2, 60]);
        assert_eq!(Flatten.output_shape(&[7]).unwrap(), vec![7, 1]);
        assert!(Flatten.output_shape(&[]).is_err());
        assert!(Flatten.param_message().is_none());
    }
}
