//! # Neural Network Layers (`nn`)
//!
//! Layer descriptions for every layer type the importer can rebuild. A
//! layer knows its Caffe type name, how it shapes its output, which
//! parameter blobs it owns and how to write its `*_param` message.
//! Layers are looked up by type name in the [`registry`].

use crate::blob::{Blob, Filler};
use crate::proto::{Message, ProtoError};
use std::fmt::Debug;

// --- Submodules ---
pub mod modules;
pub mod registry;

// Re-export common items
pub use modules::*;
pub use registry::{input_layer, layer_from_config, layer_from_text, LayerEntry};

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum LayerError {
    #[error("{0} not supported yet!")]
    UnsupportedType(String),
    #[error("Invalid layer config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Invalid layer definition: {0}")]
    Proto(#[from] ProtoError),
    #[error("Missing '{0}'")]
    MissingParam(&'static str),
    #[error("Invalid value '{value}' for '{field}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("Expected {expected} input, got shape {got:?}")]
    InputShape { expected: String, got: Vec<usize> },
    #[error("Invalid window: {0}")]
    Geometry(String),
}

// --- Core Trait: Layer ---

/// Base trait for all layer descriptions.
///
/// Only single-input, single-output layers exist, so shapes are passed as
/// one input shape. `Send + Sync` lets networks be shared with the
/// parameter loading threads.
pub trait Layer: Debug + Send + Sync {
    /// Caffe layer type, written to the `type` field.
    fn type_name(&self) -> &'static str;

    /// Whether the layer writes its output into its input blob.
    fn in_place(&self) -> bool {
        false
    }

    /// Shape of the blob produced by a layer without inputs.
    fn source_shape(&self) -> Option<&[usize]> {
        None
    }

    /// Output blob shape for a given input blob shape.
    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError>;

    /// Shapes of the parameter blobs, in Caffe's blob order.
    fn param_shapes(&self, _input: &[usize]) -> Result<Vec<Vec<usize>>, LayerError> {
        Ok(Vec::new())
    }

    /// Initial filler for each parameter blob. Same length as `param_shapes`.
    fn default_fillers(&self) -> Vec<Filler> {
        Vec::new()
    }

    /// Whether blobs 0 and 1 are learned weights and biases. Filler
    /// overrides from the import config apply only to these.
    fn is_learnable(&self) -> bool {
        false
    }

    /// Called after dumped values were copied into the parameter blobs.
    fn on_params_loaded(&self, _blobs: &mut [Blob]) {}

    /// The layer's typed parameter message: text name, field number and body.
    fn param_message(&self) -> Option<(&'static str, u32, Message)> {
        None
    }
}

/// Checks that an input has at least `rank` axes.
pub(crate) fn require_rank(input: &[usize], rank: usize) -> Result<(), LayerError> {
    if input.len() < rank {
        return Err(LayerError::InputShape {
            expected: format!("at least {} axes", rank),
            got: input.to_vec(),
        });
    }
    Ok(())
}

/// Splits an `N x C x H x W` input.
pub(crate) fn image_dims(input: &[usize]) -> Result<[usize; 4], LayerError> {
    match *input {
        [n, c, h, w] => Ok([n, c, h, w]),
        _ => Err(LayerError::InputShape {
            expected: "an N x C x H x W".to_string(),
            got: input.to_vec(),
        }),
    }
}
