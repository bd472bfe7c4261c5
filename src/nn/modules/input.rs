//! # Input Layer Module

use crate::config::ConfigParams;
use crate::nn::registry::{param_block, parse_params, LayerBuilder};
use crate::nn::{Layer, LayerError};
use crate::proto::caffe::{layer_param, shape_message};
use crate::proto::{Message, TextMessage, Value};
use serde::Deserialize;

/// `DummyDataParameter.shape`
const DUMMY_SHAPE: u32 = 6;

/// Produces the network input blob with a fixed shape.
///
/// Output shape: `input_shape`, usually `(N, C, H, W)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyData {
    shape: Vec<usize>,
}

#[derive(Deserialize)]
struct InputConfig {
    input_shape: Vec<usize>,
}

impl DummyData {
    pub fn new(shape: Vec<usize>) -> Result<Self, LayerError> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(LayerError::InvalidValue {
                field: "input_shape",
                value: format!("{:?}", shape),
            });
        }
        Ok(DummyData { shape })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl Layer for DummyData {
    fn type_name(&self) -> &'static str {
        "DummyData"
    }

    fn source_shape(&self) -> Option<&[usize]> {
        Some(&self.shape)
    }

    fn output_shape(&self, _input: &[usize]) -> Result<Vec<usize>, LayerError> {
        Ok(self.shape.clone())
    }

    fn param_message(&self) -> Option<(&'static str, u32, Message)> {
        let param = Message::new().with("shape", DUMMY_SHAPE, Value::Message(shape_message(&self.shape)));
        Some(("dummy_data_param", layer_param::DUMMY_DATA_PARAM, param))
    }
}

impl LayerBuilder for DummyData {
    fn from_config(params: &ConfigParams) -> Result<Self, LayerError> {
        let config: InputConfig = parse_params(params)?;
        DummyData::new(config.input_shape)
    }

    fn from_text(layer: &TextMessage) -> Result<Self, LayerError> {
        let shape = param_block(layer, "dummy_data_param")?
            .message("shape")
            .ok_or(LayerError::MissingParam("dummy_data_param.shape"))?;
        DummyData::new(shape.numbers::<usize>("dim")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_message_text() {
        let layer = DummyData::new(vec![1, 3, 4, 4]).unwrap();
        let (name, _, msg) = layer.param_message().unwrap();
        assert_eq!(name, "dummy_data_param");
        assert_eq!(
            msg.to_text(),
            "shape {\n  dim: 1\n  dim: 3\n  dim: 4\n  dim: 4\n}\n"
        );
    }

    #[test]
    fn test_from_text() {
        let layer = TextMessage::parse("dummy_data_param { shape { dim: 2 dim: 5 } }").unwrap();
        let data = DummyData::from_text(&layer).unwrap();
        assert_eq!(data.shape(), &[2, 5]);
    }

    #[test]
    fn test_rejects_empty_shape() {
        assert!(DummyData::new(vec![]).is_err());
        assert!(DummyData::new(vec![1, 0, 3]).is_err());
    }
}
