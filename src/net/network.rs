//! # Instantiated Network
//!
//! A [`Net`] is a [`NetSpec`] with every blob shape resolved and every
//! layer's parameter blobs allocated, as Caffe does when it loads a
//! definition in the TEST phase. It is what gets saved as `.caffemodel`.

use super::spec::{LayerDef, NetSpec};
use super::NetError;
use crate::blob::{Blob, Filler};
use crate::config::ImportConfig;
use crate::proto::caffe::{net_param, PHASE_TEST};
use crate::proto::{Message, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// How freshly allocated parameter blobs are filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitOptions {
    /// Seed of the generator shared by all random fillers.
    pub seed: u64,
    /// Replaces the default filler of weight blobs.
    pub weight_filler: Option<Filler>,
    /// Replaces the default filler of bias blobs.
    pub bias_filler: Option<Filler>,
}

impl From<&ImportConfig> for InitOptions {
    fn from(config: &ImportConfig) -> Self {
        InitOptions {
            seed: config.filler_seed,
            weight_filler: config.weight_filler,
            bias_filler: config.bias_filler,
        }
    }
}

/// A layer together with its resolved shapes and parameter blobs.
#[derive(Debug)]
pub struct NetLayer {
    pub def: LayerDef,
    /// Shape of the bottom blob; `None` for the input layer.
    pub input_shape: Option<Vec<usize>>,
    pub output_shape: Vec<usize>,
    pub blobs: Vec<Blob>,
}

impl NetLayer {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn type_name(&self) -> &'static str {
        self.def.type_name()
    }
}

#[derive(Debug)]
pub struct Net {
    name: String,
    layers: Vec<NetLayer>,
    blob_shapes: HashMap<String, Vec<usize>>,
}

impl Net {
    /// Resolves blob shapes in layer order and allocates parameter blobs.
    ///
    /// Every layer but the input reads exactly one blob written by an
    /// earlier layer and writes exactly one blob.
    pub fn from_spec(spec: NetSpec, options: &InitOptions) -> Result<Self, NetError> {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut blob_shapes: HashMap<String, Vec<usize>> = HashMap::new();
        let mut layers = Vec::with_capacity(spec.layers.len());

        for def in spec.layers {
            let wiring = |message| NetError::Wiring {
                layer: def.name.clone(),
                message,
            };
            let [top] = def.tops.as_slice() else {
                return Err(wiring("expected exactly one top blob"));
            };

            let input_shape = match (def.layer.source_shape(), def.bottoms.as_slice()) {
                (Some(_), []) => None,
                (Some(_), _) => return Err(wiring("an input layer takes no bottom blob")),
                (None, [bottom]) => {
                    let shape = blob_shapes.get(bottom).ok_or_else(|| NetError::UnknownBottom {
                        layer: def.name.clone(),
                        blob: bottom.clone(),
                    })?;
                    Some(shape.clone())
                }
                (None, _) => return Err(wiring("expected exactly one bottom blob")),
            };

            let input = input_shape.as_deref().unwrap_or(&[]);
            let output_shape = def
                .layer
                .output_shape(input)
                .map_err(|e| NetError::layer(&def.name, e))?;
            let param_shapes = def
                .layer
                .param_shapes(input)
                .map_err(|e| NetError::layer(&def.name, e))?;

            let fillers = def.layer.default_fillers();
            let learnable = def.layer.is_learnable();
            let blobs = param_shapes
                .iter()
                .enumerate()
                .map(|(i, shape)| {
                    let custom = match i {
                        0 if learnable => options.weight_filler,
                        1 if learnable => options.bias_filler,
                        _ => None,
                    };
                    let filler = custom.or_else(|| fillers.get(i).copied()).unwrap_or_default();
                    filler.fill(shape, &mut rng)
                })
                .collect();

            blob_shapes.insert(top.clone(), output_shape.clone());
            layers.push(NetLayer {
                def,
                input_shape,
                output_shape,
                blobs,
            });
        }

        if layers.first().map_or(true, |l| l.input_shape.is_some()) {
            return Err(NetError::NoInput);
        }

        Ok(Net {
            name: spec.name,
            layers,
            blob_shapes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[NetLayer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [NetLayer] {
        &mut self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&NetLayer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    /// Parameter blobs of a layer.
    pub fn params(&self, name: &str) -> Option<&[Blob]> {
        self.layer(name).map(|l| l.blobs.as_slice())
    }

    /// Final shape of a named blob.
    pub fn blob_shape(&self, name: &str) -> Option<&[usize]> {
        self.blob_shapes.get(name).map(Vec::as_slice)
    }

    /// `NetParameter` message with parameter blobs and TEST phase.
    pub fn to_message(&self) -> Message {
        let mut msg = Message::new();
        if !self.name.is_empty() {
            msg.push("name", net_param::NAME, Value::Str(self.name.clone()));
        }
        for layer in &self.layers {
            let layer_msg = layer.def.to_message(&layer.blobs, Some(PHASE_TEST));
            msg.push("layer", net_param::LAYER, Value::Message(layer_msg));
        }
        msg
    }

    /// Writes the network in binary protobuf format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), NetError> {
        let path = path.as_ref();
        fs::write(path, self.to_message().encode()).map_err(|source| NetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
