//! # Normalization Layer Modules
//!
//! Caffe splits batch normalization in two layers: `BatchNorm` normalizes
//! with stored statistics and `Scale` applies the learned affine transform.

use crate::blob::{Blob, Filler};
use crate::config::ConfigParams;
use crate::nn::registry::LayerBuilder;
use crate::nn::{require_rank, Layer, LayerError};
use crate::proto::caffe::layer_param;
use crate::proto::{Message, TextMessage, Value};

/// Normalizes each channel with its running mean and variance.
///
/// Blobs: mean `(C)`, variance `(C)`, moving-average scale factor `(1)`.
/// Caffe divides the stored statistics by the scale factor, so it is kept
/// at 1 when the statistics are imported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchNorm {
    pub use_global_stats: bool,
}

impl Default for BatchNorm {
    fn default() -> Self {
        BatchNorm {
            use_global_stats: true,
        }
    }
}

impl Layer for BatchNorm {
    fn type_name(&self) -> &'static str {
        "BatchNorm"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        require_rank(input, 2)?;
        Ok(input.to_vec())
    }

    fn param_shapes(&self, input: &[usize]) -> Result<Vec<Vec<usize>>, LayerError> {
        require_rank(input, 2)?;
        let channels = input[1];
        Ok(vec![vec![channels], vec![channels], vec![1]])
    }

    fn default_fillers(&self) -> Vec<Filler> {
        vec![Filler::default(); 3]
    }

    fn on_params_loaded(&self, blobs: &mut [Blob]) {
        if let Some(scale_factor) = blobs.get_mut(2) {
            scale_factor.fill(1.0);
        }
    }

    fn param_message(&self) -> Option<(&'static str, u32, Message)> {
        let param = Message::new().with("use_global_stats", 1, Value::Bool(self.use_global_stats));
        Some(("batch_norm_param", layer_param::BATCH_NORM_PARAM, param))
    }
}

impl LayerBuilder for BatchNorm {
    fn from_config(_params: &ConfigParams) -> Result<Self, LayerError> {
        Ok(BatchNorm::default())
    }

    fn from_text(layer: &TextMessage) -> Result<Self, LayerError> {
        let use_global_stats = match layer.message("batch_norm_param") {
            Some(param) => param.boolean("use_global_stats")?.unwrap_or(true),
            None => true,
        };
        Ok(BatchNorm { use_global_stats })
    }
}

/// Per-channel multiplier and optional bias.
///
/// Blobs: scale `(C)`, then bias `(C)` when `bias_term` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub bias_term: bool,
}

impl Default for Scale {
    fn default() -> Self {
        Scale { bias_term: true }
    }
}

impl Layer for Scale {
    fn type_name(&self) -> &'static str {
        "Scale"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        require_rank(input, 2)?;
        Ok(input.to_vec())
    }

    fn param_shapes(&self, input: &[usize]) -> Result<Vec<Vec<usize>>, LayerError> {
        require_rank(input, 2)?;
        let channels = input[1];
        let mut shapes = vec![vec![channels]];
        if self.bias_term {
            shapes.push(vec![channels]);
        }
        Ok(shapes)
    }

    fn default_fillers(&self) -> Vec<Filler> {
        let mut fillers = vec![Filler::constant(1.0)];
        if self.bias_term {
            fillers.push(Filler::default());
        }
        fillers
    }

    fn param_message(&self) -> Option<(&'static str, u32, Message)> {
        let param = Message::new().with("bias_term", 4, Value::Bool(self.bias_term));
        Some(("scale_param", layer_param::SCALE_PARAM, param))
    }
}

impl LayerBuilder for Scale {
    fn from_config(_params: &ConfigParams) -> Result<Self, LayerError> {
        Ok(Scale::default())
    }

    fn from_text(layer: &TextMessage) -> Result<Self, LayerError> {
        // Caffe's own default for a bare Scale layer is no bias.
        let bias_term = match layer.message("scale_param") {
            Some(param) => param.boolean("bias_term")?.unwrap_or(false),
            None => false,
        };
        Ok(Scale { bias_term })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_norm_blobs() {
        let bn = BatchNorm::default();
        assert_eq!(
            bn.param_shapes(&[1, 6, 4, 4]).unwrap(),
            vec![vec![6], vec![6], vec![1]]
        );
        let mut blobs = vec![Blob::zeros(&[6]), Blob::zeros(&[6]), Blob::zeros(&[1])];
        bn.on_params_loaded(&mut blobs);
        assert_eq!(blobs[2].to_vec(), vec![1.0]);
        assert_eq!(blobs[0].to_vec(), vec![0.0; 6]);
    }

    #[test]
    fn test_batch_norm_text() {
        let (_, _, msg) = BatchNorm::default().param_message().unwrap();
        assert_eq!(msg.to_text(), "use_global_stats: true\n");
        let layer = TextMessage::parse("batch_norm_param { use_global_stats: false }").unwrap();
        assert!(!BatchNorm::from_text(&layer).unwrap().use_global_stats);
    }

    #[test]
    fn test_scale_fillers() {
        let scale = Scale::default();
        assert_eq!(scale.default_fillers(), vec![Filler::constant(1.0), Filler::default()]);
        assert_eq!(scale.param_shapes(&[2, 3]).unwrap(), vec![vec![3], vec![3]]);
        assert!(scale.param_shapes(&[3]).is_err());
    }

    #[test]
    fn test_scale_from_text() {
        let layer = TextMessage::parse("scale_param { bias_term: true }").unwrap();
        assert!(Scale::from_text(&layer).unwrap().bias_term);
        let bare = TextMessage::parse("name: \"s\"").unwrap();
        assert!(!Scale::from_text(&bare).unwrap().bias_term);
    }
}
