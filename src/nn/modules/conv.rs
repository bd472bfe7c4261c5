//! # Convolutional Layer Module

use super::window::{Window, CONVOLUTION_FIELDS};
use crate::blob::Filler;
use crate::config::ConfigParams;
use crate::nn::registry::{param_block, parse_params, LayerBuilder};
use crate::nn::{image_dims, Layer, LayerError};
use crate::proto::caffe::layer_param;
use crate::proto::{Message, TextMessage, Value};
use serde::Deserialize;

/// Applies a 2D convolution over an input image.
///
/// Input shape: `(N, C_in, H_in, W_in)`
/// Output shape: `(N, num_output, H_out, W_out)`
#[derive(Debug, Clone, PartialEq)]
pub struct Convolution {
    pub num_output: usize,
    pub bias_term: bool,
    pub window: Window,
}

#[derive(Deserialize)]
struct ConvConfig {
    num_output: usize,
    #[serde(flatten)]
    window: Window,
}

impl Convolution {
    pub fn new(num_output: usize, window: Window) -> Self {
        Convolution {
            num_output,
            bias_term: true,
            window,
        }
    }
}

impl Layer for Convolution {
    fn type_name(&self) -> &'static str {
        "Convolution"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        let [n, _, h, w] = image_dims(input)?;
        let (out_h, out_w) = self.window.conv_output(h, w)?;
        Ok(vec![n, self.num_output, out_h, out_w])
    }

    /// Weight `(num_output, C_in, kH, kW)`, then bias `(num_output)`.
    fn param_shapes(&self, input: &[usize]) -> Result<Vec<Vec<usize>>, LayerError> {
        let [_, c, _, _] = image_dims(input)?;
        let mut shapes = vec![vec![self.num_output, c, self.window.kernel_h, self.window.kernel_w]];
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
        self.window.extend_message(&mut param, &CONVOLUTION_FIELDS);
        Some(("convolution_param", layer_param::CONVOLUTION_PARAM, param))
    }
}

impl LayerBuilder for Convolution {
    fn from_config(params: &ConfigParams) -> Result<Self, LayerError> {
        let config: ConvConfig = parse_params(params)?;
        Ok(Convolution::new(config.num_output, config.window))
    }

    fn from_text(layer: &TextMessage) -> Result<Self, LayerError> {
        let param = param_block(layer, "convolution_param")?;
        let num_output = param
            .number::<usize>("num_output")?
            .ok_or(LayerError::MissingParam("convolution_param.num_output"))?;
        Ok(Convolution {
            num_output,
            bias_term: param.boolean("bias_term")?.unwrap_or(true),
            window: Window::from_text(param)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conv() -> Convolution {
        let params = json!({"num_output": 16, "kW": 3, "kH": 3, "dW": 2, "dH": 2, "pW": 1, "pH": 1});
        Convolution::from_config(params.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_shapes() {
        let layer = conv();
        assert_eq!(layer.output_shape(&[1, 3, 32, 32]).unwrap(), vec![1, 16, 16, 16]);
        assert_eq!(
            layer.param_shapes(&[1, 3, 32, 32]).unwrap(),
            vec![vec![16, 3, 3, 3], vec![16]]
        );
        assert!(layer.output_shape(&[3, 32, 32]).is_err());
    }

    #[test]
    fn test_param_message_text() {
        let (name, number, msg) = conv().param_message().unwrap();
        assert_eq!((name, number), ("convolution_param", 106));
        assert_eq!(
            msg.to_text(),
            "num_output: 16\npad_h: 1\npad_w: 1\nkernel_h: 3\nkernel_w: 3\nstride_h: 2\nstride_w: 2\n"
        );
    }

    #[test]
    fn test_text_round_trip() {
        let layer = conv();
        let (_, _, msg) = layer.param_message().unwrap();
        let text = format!("convolution_param {{\n{}}}\n", msg.to_text());
        let parsed = Convolution::from_text(&TextMessage::parse(&text).unwrap()).unwrap();
        assert_eq!(parsed, layer);
    }

    #[test]
    fn test_without_bias() {
        let layer = TextMessage::parse("convolution_param { num_output: 4 kernel_size: 1 bias_term: false }").unwrap();
        let layer = Convolution::from_text(&layer).unwrap();
        assert_eq!(layer.param_shapes(&[1, 2, 5, 5]).unwrap().len(), 1);
        assert_eq!(layer.default_fillers().len(), 1);
    }
}
