//! # Inner Product Layer Module

use crate::blob::Filler;
use crate::config::ConfigParams;
use crate::nn::registry::{param_block, parse_params, LayerBuilder};
use crate::nn::{require_rank, Layer, LayerError};
use crate::proto::caffe::layer_param;
use crate::proto::{Message, TextMessage, Value};
use serde::Deserialize;

/// Applies a linear transformation to the incoming data: `y = xA^T + b`.
///
/// Input shape: `(N, *)`, everything after the batch axis is flattened.
/// Output shape: `(N, num_output)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerProduct {
    pub num_output: usize,
    pub bias_term: bool,
}

#[derive(Deserialize)]
struct LinearConfig {
    num_output: usize,
}

impl InnerProduct {
    pub fn new(num_output: usize) -> Self {
        InnerProduct {
            num_output,
            bias_term: true,
        }
    }
}

impl Layer for InnerProduct {
    fn type_name(&self) -> &'static str {
        "InnerProduct"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        require_rank(input, 1)?;
        Ok(vec![input[0], self.num_output])
    }

    /// Weight `(num_output, in_features)`, then bias `(num_output)`.
    fn param_shapes(&self, input: &[usize]) -> Result<Vec<Vec<usize>>, LayerError> {
        require_rank(input, 1)?;
        let in_features = input[1..].iter().product();
        let mut shapes = vec![vec![self.num_output, in_features]];
        if self.bias_term {
            shapes.push(vec![self.num_output]);
        }
        Ok(shapes)
    }

    fn default_fillers(&self) -> Vec<Filler> {
        let count = if self.bias_term { 2 } else { 1 };
        vec![Filler::default(); count]
    }

    fn is_learnable(&self) -> bool {
        true
    }

    fn param_message(&self) -> Option<(&'static str, u32, Message)> {
        let mut param = Message::new();
        param.push("num_output", 1, Value::UInt(self.num_output as u64));
        if !self.bias_term {
            param.push("bias_term", 2, Value::Bool(false));
        }
        Some(("inner_product_param", layer_param::INNER_PRODUCT_PARAM, param))
    }
}

impl LayerBuilder for InnerProduct {
    fn from_config(params: &ConfigParams) -> Result<Self, LayerError> {
        let config: LinearConfig = parse_params(params)?;
        Ok(InnerProduct::new(config.num_output))
    }

    fn from_text(layer: &TextMessage) -> Result<Self, LayerError> {
        let param = param_block(layer, "inner_product_param")?;
        Ok(InnerProduct {
            num_output: param
                .number::<usize>("num_output")?
                .ok_or(LayerError::MissingParam("inner_product_param.num_output"))?,
            bias_term: param.boolean("bias_term")?.unwrap_or(true),
        })
    }
}
