//! # Layer Registry
//!
//! Maps layer type names to constructors. The same table serves the JSON
//! layer configs and the layers read back from a prototxt.

use super::modules::{
    BatchNorm, Convolution, DummyData, Flatten, InnerProduct, Pooling, ReLU, Scale, Softmax, TanH,
};
use super::{Layer, LayerError};
use crate::config::{ConfigParams, RawLayerConfig};
use crate::proto::TextMessage;
use serde::de::DeserializeOwned;

/// Construction of a layer from its two textual forms.
pub trait LayerBuilder: Layer + Sized + 'static {
    /// Builds the layer from the hyperparameters of a JSON layer config.
    fn from_config(params: &ConfigParams) -> Result<Self, LayerError>;

    /// Builds the layer from a parsed prototxt `layer { ... }` block.
    fn from_text(layer: &TextMessage) -> Result<Self, LayerError>;
}

pub type FromConfigFn = fn(&ConfigParams) -> Result<Box<dyn Layer>, LayerError>;
pub type FromTextFn = fn(&TextMessage) -> Result<Box<dyn Layer>, LayerError>;

/// One row of the dispatch table.
pub struct LayerEntry {
    pub type_name: &'static str,
    pub from_config: FromConfigFn,
    pub from_text: FromTextFn,
}

fn boxed_config<L: LayerBuilder>(params: &ConfigParams) -> Result<Box<dyn Layer>, LayerError> {
    Ok(Box::new(L::from_config(params)?))
}

fn boxed_text<L: LayerBuilder>(layer: &TextMessage) -> Result<Box<dyn Layer>, LayerError> {
    Ok(Box::new(L::from_text(layer)?))
}

const fn entry<L: LayerBuilder>(type_name: &'static str) -> LayerEntry {
    LayerEntry {
        type_name,
        from_config: boxed_config::<L>,
        from_text: boxed_text::<L>,
    }
}

/// Supported layer types. `Data` is an alias for the input layer.
pub const LAYER_TABLE: &[LayerEntry] = &[
    entry::<DummyData>("Data"),
    entry::<DummyData>("DummyData"),
    entry::<Convolution>("Convolution"),
    entry::<BatchNorm>("BatchNorm"),
    entry::<Scale>("Scale"),
    entry::<ReLU>("ReLU"),
    entry::<TanH>("TanH"),
    entry::<Pooling>("Pooling"),
    entry::<Flatten>("Flatten"),
    entry::<InnerProduct>("InnerProduct"),
    entry::<Softmax>("Softmax"),
];

/// Finds the table row for `type_name`.
pub fn lookup(type_name: &str) -> Result<&'static LayerEntry, LayerError> {
    LAYER_TABLE
        .iter()
        .find(|e| e.type_name == type_name)
        .ok_or_else(|| LayerError::UnsupportedType(type_name.to_string()))
}

/// Builds a layer from a JSON layer config, dispatching on its `type`.
pub fn layer_from_config(config: &RawLayerConfig) -> Result<Box<dyn Layer>, LayerError> {
    let entry = lookup(&config.layer_type)?;
    (entry.from_config)(&config.params)
}

/// Builds a layer from a prototxt `layer` block of the given type.
pub fn layer_from_text(type_name: &str, layer: &TextMessage) -> Result<Box<dyn Layer>, LayerError> {
    let entry = lookup(type_name)?;
    (entry.from_text)(layer)
}

/// Builds the input layer from a config, whatever type it declares.
pub fn input_layer(config: &RawLayerConfig) -> Result<Box<dyn Layer>, LayerError> {
    boxed_config::<DummyData>(&config.params)
}

/// Deserializes typed hyperparameters out of a config's extra keys.
pub(crate) fn parse_params<T: DeserializeOwned>(params: &ConfigParams) -> Result<T, LayerError> {
    Ok(serde_json::from_value(serde_json::Value::Object(params.clone()))?)
}

/// The `*_param` block of a prototxt layer.
pub(crate) fn param_block<'a>(layer: &'a TextMessage, name: &'static str) -> Result<&'a TextMessage, LayerError> {
    layer.message(name).ok_or(LayerError::MissingParam(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawLayerConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_dispatch_by_type() {
        let layer = layer_from_config(&raw(json!({
            "name": "conv1", "type": "Convolution",
            "num_output": 8, "kW": 3, "kH": 3, "dW": 1, "dH": 1, "pW": 1, "pH": 1
        })))
        .unwrap();
        assert_eq!(layer.type_name(), "Convolution");

        let relu = layer_from_config(&raw(json!({"name": "relu1", "type": "ReLU"}))).unwrap();
        assert!(relu.in_place());
    }

    #[test]
    fn test_data_alias() {
        let layer = layer_from_config(&raw(json!({
            "name": "data", "type": "Data", "input_shape": [1, 3, 8, 8]
        })))
        .unwrap();
        assert_eq!(layer.type_name(), "DummyData");
        assert_eq!(layer.source_shape(), Some(&[1, 3, 8, 8][..]));
    }

    #[test]
    fn test_unsupported_type() {
        let err = layer_from_config(&raw(json!({"name": "drop", "type": "Dropout"}))).unwrap_err();
        assert_eq!(err.to_string(), "Dropout not supported yet!");
    }

    #[test]
    fn test_missing_hyperparameter() {
        let err = layer_from_config(&raw(json!({"name": "fc", "type": "InnerProduct"}))).unwrap_err();
        assert!(matches!(err, LayerError::Config(_)));
    }

    #[test]
    fn test_input_layer_ignores_type() {
        let layer = input_layer(&raw(json!({
            "name": "x", "type": "Convolution", "input_shape": [2, 4]
        })))
        .unwrap();
        assert_eq!(layer.type_name(), "DummyData");
    }
}
