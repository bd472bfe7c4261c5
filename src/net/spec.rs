//! # Network Definition
//!
//! A [`NetSpec`] is the ordered layer list of a `.prototxt`: names, blob
//! wiring and typed layer parameters, without parameter data.

use super::graph::AdjacencyMatrix;
use super::NetError;
use crate::blob::Blob;
use crate::config::RawLayerConfig;
use crate::nn::{self, Layer};
use crate::proto::caffe::{blob_message, layer_param, net_param};
use crate::proto::{Message, ProtoError, TextMessage, Value};
use log::{info, warn};
use std::fs;
use std::path::Path;

/// One layer of a network definition.
#[derive(Debug)]
pub struct LayerDef {
    pub name: String,
    pub bottoms: Vec<String>,
    pub tops: Vec<String>,
    pub layer: Box<dyn Layer>,
}

impl LayerDef {
    pub fn type_name(&self) -> &'static str {
        self.layer.type_name()
    }

    /// `LayerParameter` message. `blobs` and `phase` are only set for a
    /// saved model.
    pub(crate) fn to_message(&self, blobs: &[Blob], phase: Option<Value>) -> Message {
        let mut msg = Message::new();
        msg.push("name", layer_param::NAME, Value::Str(self.name.clone()));
        msg.push("type", layer_param::TYPE, Value::Str(self.type_name().to_string()));
        for bottom in &self.bottoms {
            msg.push("bottom", layer_param::BOTTOM, Value::Str(bottom.clone()));
        }
        for top in &self.tops {
            msg.push("top", layer_param::TOP, Value::Str(top.clone()));
        }
        for blob in blobs {
            msg.push("blobs", layer_param::BLOBS, Value::Message(blob_message(blob)));
        }
        if let Some(phase) = phase {
            msg.push("phase", layer_param::PHASE, phase);
        }
        if let Some((name, number, param)) = self.layer.param_message() {
            msg.push(name, number, Value::Message(param));
        }
        msg
    }
}

/// An ordered network definition.
#[derive(Debug, Default)]
pub struct NetSpec {
    pub name: String,
    pub layers: Vec<LayerDef>,
}

impl NetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        NetSpec {
            name: name.into(),
            layers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, name: &str) -> Option<&LayerDef> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Appends a layer. Layer names must be unique.
    pub fn push(&mut self, def: LayerDef) -> Result<(), NetError> {
        if self.layer(&def.name).is_some() {
            return Err(NetError::DuplicateLayer(def.name));
        }
        self.layers.push(def);
        Ok(())
    }

    /// `NetParameter` message without parameter blobs.
    pub fn to_message(&self) -> Message {
        let mut msg = Message::new();
        if !self.name.is_empty() {
            msg.push("name", net_param::NAME, Value::Str(self.name.clone()));
        }
        for def in &self.layers {
            msg.push("layer", net_param::LAYER, Value::Message(def.to_message(&[], None)));
        }
        msg
    }

    /// Renders the definition in protobuf text format.
    pub fn to_prototxt(&self) -> String {
        self.to_message().to_text()
    }

    pub fn write_prototxt<P: AsRef<Path>>(&self, path: P) -> Result<(), NetError> {
        let path = path.as_ref();
        fs::write(path, self.to_prototxt()).map_err(|source| NetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses a prototxt written by [`NetSpec::to_prototxt`], or any
    /// definition that only uses the supported layer types.
    pub fn from_prototxt(text: &str) -> Result<Self, NetError> {
        let root = TextMessage::parse(text)?;
        let mut spec = NetSpec::new(root.string("name")?.unwrap_or_default());
        for layer in root.messages("layer") {
            let name = layer
                .string("name")?
                .ok_or_else(|| ProtoError::MissingField("layer.name".to_string()))?;
            let type_name = layer
                .string("type")?
                .ok_or_else(|| ProtoError::MissingField(format!("layer '{}' type", name)))?;
            let built = nn::layer_from_text(&type_name, layer).map_err(|e| NetError::layer(&name, e))?;
            spec.push(LayerDef {
                bottoms: layer.strings("bottom")?,
                tops: layer.strings("top")?,
                layer: built,
                name,
            })?;
        }
        Ok(spec)
    }

    pub fn read_prototxt<P: AsRef<Path>>(path: P) -> Result<Self, NetError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| NetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_prototxt(&text)
    }
}

/// Builds the network definition from the dumped layer list and graph.
///
/// Node 0 is always the input layer. Every other layer reached by the
/// traversal reads its parent's output blob. In-place layers write back
/// into the blob they read, so a chain of activations keeps pointing at
/// the last layer that produced a new blob.
pub fn build_net_spec(
    name: &str,
    configs: &[RawLayerConfig],
    graph: &AdjacencyMatrix,
) -> Result<NetSpec, NetError> {
    let input = configs.first().ok_or(NetError::NoInput)?;
    if graph.len() != configs.len() {
        return Err(NetError::NodeCountMismatch {
            nodes: graph.len(),
            configs: configs.len(),
        });
    }

    let mut spec = NetSpec::new(name);
    // Output blob of every attached node.
    let mut outputs: Vec<Option<String>> = vec![None; configs.len()];

    info!("... Add layer: DummyData");
    let layer = nn::input_layer(input).map_err(|e| NetError::layer(&input.name, e))?;
    spec.push(LayerDef {
        name: input.name.clone(),
        bottoms: Vec::new(),
        tops: vec![input.name.clone()],
        layer,
    })?;
    outputs[0] = Some(input.name.clone());

    let plan = graph.plan();
    if !plan.unreachable.is_empty() {
        let names: Vec<&str> = plan.unreachable.iter().map(|&i| configs[i].name.as_str()).collect();
        warn!("Skipping layers not reachable from '{}': {}", input.name, names.join(", "));
    }

    for attachment in &plan.attachments {
        let config = &configs[attachment.node];
        info!("... Add layer: {}", config.layer_type);
        let layer = nn::layer_from_config(config).map_err(|e| NetError::layer(&config.name, e))?;

        let bottom = outputs[attachment.parent].clone().ok_or_else(|| NetError::UnknownBottom {
            layer: config.name.clone(),
            blob: configs[attachment.parent].name.clone(),
        })?;
        let top = if layer.in_place() {
            bottom.clone()
        } else {
            config.name.clone()
        };
        outputs[attachment.node] = Some(top.clone());

        spec.push(LayerDef {
            name: config.name.clone(),
            bottoms: vec![bottom],
            tops: vec![top],
            layer,
        })?;
    }

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configs(value: serde_json::Value) -> Vec<RawLayerConfig> {
        serde_json::from_value(value).unwrap()
    }

    fn wiring(spec: &NetSpec) -> Vec<(String, Vec<String>, Vec<String>)> {
        spec.layers
            .iter()
            .map(|l| (l.name.clone(), l.bottoms.clone(), l.tops.clone()))
            .collect()
    }

    fn s(v: &str) -> String {
        v.to_string()
    }

    #[test]
    fn test_activation_chain_aliases_producer() {
        let configs = configs(json!([
            {"name": "data", "type": "Data", "input_shape": [1, 3, 8, 8]},
            {"name": "conv1", "type": "Convolution", "num_output": 4,
             "kW": 3, "kH": 3, "dW": 1, "dH": 1, "pW": 1, "pH": 1},
            {"name": "relu1", "type": "ReLU"},
            {"name": "tanh1", "type": "TanH"},
            {"name": "flat", "type": "Flatten"}
        ]));
        let graph = AdjacencyMatrix::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4)]).unwrap();
        let spec = build_net_spec("net", &configs, &graph).unwrap();
        assert_eq!(
            wiring(&spec),
            vec![
                (s("data"), vec![], vec![s("data")]),
                (s("conv1"), vec![s("data")], vec![s("conv1")]),
                (s("relu1"), vec![s("conv1")], vec![s("conv1")]),
                (s("tanh1"), vec![s("conv1")], vec![s("conv1")]),
                (s("flat"), vec![s("conv1")], vec![s("flat")]),
            ]
        );
    }

    #[test]
    fn test_branch_after_activation() {
        // data -> relu -> {fc_a, fc_b}
        let configs = configs(json!([
            {"name": "data", "type": "DummyData", "input_shape": [2, 6]},
            {"name": "relu", "type": "ReLU"},
            {"name": "fc_a", "type": "InnerProduct", "num_output": 3},
            {"name": "fc_b", "type": "InnerProduct", "num_output": 2}
        ]));
        let graph = AdjacencyMatrix::from_edges(4, &[(0, 1), (1, 2), (1, 3)]).unwrap();
        let spec = build_net_spec("net", &configs, &graph).unwrap();
        assert_eq!(spec.layer("relu").unwrap().tops, vec![s("data")]);
        assert_eq!(spec.layer("fc_a").unwrap().bottoms, vec![s("data")]);
        assert_eq!(spec.layer("fc_b").unwrap().bottoms, vec![s("data")]);
    }

    #[test]
    fn test_unsupported_type_is_reported() {
        let configs = configs(json!([
            {"name": "data", "type": "Data", "input_shape": [1, 4]},
            {"name": "drop", "type": "Dropout"}
        ]));
        let graph = AdjacencyMatrix::from_edges(2, &[(0, 1)]).unwrap();
        let err = build_net_spec("net", &configs, &graph).unwrap_err();
        assert_eq!(err.to_string(), "Layer 'drop': Dropout not supported yet!");
    }

    #[test]
    fn test_unreached_unsupported_layer_is_ignored() {
        let configs = configs(json!([
            {"name": "data", "type": "Data", "input_shape": [1, 4]},
            {"name": "drop", "type": "Dropout"}
        ]));
        let graph = AdjacencyMatrix::from_edges(2, &[]).unwrap();
        let spec = build_net_spec("net", &configs, &graph).unwrap();
        assert_eq!(spec.len(), 1);
    }

    #[test]
    fn test_node_count_mismatch() {
        let configs = configs(json!([{"name": "data", "type": "Data", "input_shape": [1, 4]}]));
        let graph = AdjacencyMatrix::from_edges(2, &[]).unwrap();
        assert!(matches!(
            build_net_spec("net", &configs, &graph),
            Err(NetError::NodeCountMismatch { nodes: 2, configs: 1 })
        ));
        assert!(matches!(build_net_spec("net", &[], &graph), Err(NetError::NoInput)));
    }

    #[test]
    fn test_prototxt_text() {
        let configs = configs(json!([
            {"name": "data", "type": "Data", "input_shape": [1, 2]},
            {"name": "relu", "type": "ReLU"}
        ]));
        let graph = AdjacencyMatrix::from_edges(2, &[(0, 1)]).unwrap();
        let spec = build_net_spec("cvt_net", &configs, &graph).unwrap();
        let expected = "name: \"cvt_net\"\n\
layer {\n  name: \"data\"\n  type: \"DummyData\"\n  top: \"data\"\n  dummy_data_param {\n    shape {\n      dim: 1\n      dim: 2\n    }\n  }\n}\n\
layer {\n  name: \"relu\"\n  type: \"ReLU\"\n  bottom: \"data\"\n  top: \"data\"\n}\n";
        assert_eq!(spec.to_prototxt(), expected);
    }

    #[test]
    fn test_prototxt_round_trip() {
        let configs = configs(json!([
            {"name": "data", "type": "Data", "input_shape": [1, 3, 8, 8]},
            {"name": "conv", "type": "Convolution", "num_output": 4,
             "kW": 3, "kH": 3, "dW": 1, "dH": 1, "pW": 0, "pH": 0},
            {"name": "bn", "type": "BatchNorm"},
            {"name": "scale", "type": "Scale"},
            {"name": "pool", "type": "Pooling", "pool_type": "MAX",
             "kW": 2, "kH": 2, "dW": 2, "dH": 2, "pW": 0, "pH": 0},
            {"name": "prob", "type": "Softmax"}
        ]));
        let graph = AdjacencyMatrix::from_edges(6, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]).unwrap();
        let spec = build_net_spec("cvt_net", &configs, &graph).unwrap();
        let text = spec.to_prototxt();
        let parsed = NetSpec::from_prototxt(&text).unwrap();
        assert_eq!(parsed.name, "cvt_net");
        assert_eq!(wiring(&parsed), wiring(&spec));
        assert_eq!(parsed.to_prototxt(), text);
    }

    #[test]
    fn test_from_prototxt_errors() {
        let err = NetSpec::from_prototxt("layer { name: \"x\" type: \"LRN\" }").unwrap_err();
        assert_eq!(err.to_string(), "Layer 'x': LRN not supported yet!");
        assert!(NetSpec::from_prototxt("layer { type: \"ReLU\" }").is_err());
        assert!(matches!(
            NetSpec::from_prototxt("layer { name: \"a\" type: \"ReLU\" } layer { name: \"a\" type: \"ReLU\" }"),
            Err(NetError::DuplicateLayer(_))
        ));
    }
}
