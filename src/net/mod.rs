//! # Networks (`net`)
//!
//! From the dumped layer graph to a Caffe network: the traversal that
//! orders layers and wires their blobs ([`graph`]), the resulting network
//! definition ([`spec`]) and the instantiated network holding parameter
//! blobs ([`network`]).

use crate::blob::BlobError;
use crate::nn::LayerError;
use crate::proto::ProtoError;
use std::path::PathBuf;

pub mod graph;
pub mod network;
pub mod spec;

pub use graph::{AdjacencyMatrix, Attachment, Plan};
pub use network::{InitOptions, Net, NetLayer};
pub use spec::{build_net_spec, LayerDef, NetSpec};

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum NetError {
    #[error("Adjacency matrix must be 2-D and square, got shape {0:?}")]
    NotSquare(Vec<usize>),
    #[error("Edge {from} -> {to} is outside a graph of {size} nodes")]
    EdgeOutOfRange { from: usize, to: usize, size: usize },
    #[error("Graph has {nodes} nodes but the net config lists {configs} layers")]
    NodeCountMismatch { nodes: usize, configs: usize },
    #[error("Layer '{name}': {source}")]
    Layer {
        name: String,
        #[source]
        source: LayerError,
    },
    #[error("Layer '{name}': {source}")]
    Blob {
        name: String,
        #[source]
        source: BlobError,
    },
    #[error("Duplicate layer name '{0}'")]
    DuplicateLayer(String),
    #[error("Layer '{layer}' reads blob '{blob}', which no earlier layer produces")]
    UnknownBottom { layer: String, blob: String },
    #[error("Layer '{layer}': {message}")]
    Wiring { layer: String, message: &'static str },
    #[error("The network has no input layer")]
    NoInput,
    #[error("Protobuf error: {0}")]
    Proto(#[from] ProtoError),
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NetError {
    pub(crate) fn layer(name: &str, source: LayerError) -> Self {
        NetError::Layer {
            name: name.to_string(),
            source,
        }
    }
}
