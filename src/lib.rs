//! # Caffe Import Library
//!
//! Rebuilds a Caffe network from a dump of another framework's model: a
//! JSON list of layer configs, an adjacency matrix over those layers and
//! one `.npy` file per parameter array. The result is a `.prototxt`
//! network definition and a `.caffemodel` holding the parameters.

pub mod blob;
pub mod config;
pub mod import;
pub mod net;
pub mod nn;
pub mod proto;
pub mod utils;

use std::path::PathBuf;

pub use config::{load_config, ImportConfig};
pub use import::{build_prototxt, convert, fill_model, inspect};
pub use net::{Net, NetSpec};

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Net(#[from] net::NetError),
    #[error(transparent)]
    Serialization(#[from] utils::SerializationError),
    #[error(transparent)]
    Proto(#[from] proto::ProtoError),
    #[error("Cannot read {path}: {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: blob::NpyError,
    },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
