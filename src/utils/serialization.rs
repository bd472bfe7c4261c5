//! # Parameter Dump Loading
//!
//! Copies dumped parameter arrays into an instantiated [`Net`]. Each layer
//! may have `<name>.w.npy` (weight, or BatchNorm mean) and `<name>.b.npy`
//! (bias, or BatchNorm variance) in the parameter directory.

use super::parallel;
use crate::blob::{read_npy, BlobData, NpyError};
use crate::config::ImportConfig;
use crate::net::Net;
use log::{debug, info, warn};
use ndarray::ArrayD;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

// --- Error Type ---
#[derive(thiserror::Error, Debug)]
pub enum SerializationError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot load '{path}': {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: NpyError,
    },
    #[error("Parameter shape mismatch during loading: key '{key}', expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Layer '{layer}' ({layer_type}) has {blobs} parameter blobs, but a dump exists for blob {index}")]
    NoSuchBlob {
        layer: String,
        layer_type: &'static str,
        index: usize,
        blobs: usize,
    },
    #[error("Unexpected parameter dump: '{0}'")]
    UnexpectedKey(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Which parameter blob a dump file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Weight,
    Bias,
}

impl ParamKind {
    pub const ALL: [ParamKind; 2] = [ParamKind::Weight, ParamKind::Bias];

    pub fn suffix(self) -> &'static str {
        match self {
            ParamKind::Weight => ".w.npy",
            ParamKind::Bias => ".b.npy",
        }
    }

    /// Index of the target blob within the layer's parameter blobs.
    pub fn blob_index(self) -> usize {
        match self {
            ParamKind::Weight => 0,
            ParamKind::Bias => 1,
        }
    }
}

pub fn param_path(dir: &Path, layer_name: &str, kind: ParamKind) -> PathBuf {
    dir.join(format!("{}{}", layer_name, kind.suffix()))
}

/// Dumped arrays of one layer. Missing files are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamDump {
    pub weight: Option<ArrayD<BlobData>>,
    pub bias: Option<ArrayD<BlobData>>,
}

impl ParamDump {
    fn arrays(self) -> [(ParamKind, Option<ArrayD<BlobData>>); 2] {
        [(ParamKind::Weight, self.weight), (ParamKind::Bias, self.bias)]
    }
}

fn load_optional(path: &Path) -> Result<Option<ArrayD<BlobData>>, SerializationError> {
    if !path.is_file() {
        return Ok(None);
    }
    let array = read_npy(path).map_err(|source| SerializationError::Npy {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(array.to_f32()))
}

/// Loads the weight and bias dumps of one layer, if present.
pub fn load_param(dir: &Path, layer_name: &str) -> Result<ParamDump, SerializationError> {
    Ok(ParamDump {
        weight: load_optional(&param_path(dir, layer_name, ParamKind::Weight))?,
        bias: load_optional(&param_path(dir, layer_name, ParamKind::Bias))?,
    })
}

/// Dump files in `dir` that belong to none of `layer_names`, sorted.
pub fn unexpected_dumps(dir: &Path, layer_names: &HashSet<&str>) -> Result<Vec<String>, SerializationError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut unexpected = Vec::new();
    for entry in fs::read_dir(dir)? {
        let file_name = entry?.file_name().to_string_lossy().into_owned();
        let owner = ParamKind::ALL
            .iter()
            .find_map(|kind| file_name.strip_suffix(kind.suffix()));
        if let Some(layer) = owner {
            if !layer_names.contains(layer) {
                unexpected.push(file_name.clone());
            }
        }
    }
    unexpected.sort();
    Ok(unexpected)
}

/// Options for [`fill_params`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Treat dump files that match no layer as errors.
    pub strict: bool,
    /// Threads used to read dumps. `None` uses the global pool.
    pub jobs: Option<usize>,
}

impl From<&ImportConfig> for LoadOptions {
    fn from(config: &ImportConfig) -> Self {
        LoadOptions {
            strict: config.strict,
            jobs: config.jobs,
        }
    }
}

/// What [`fill_params`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Number of blobs overwritten from a dump.
    pub loaded: usize,
    /// Dump files that match no layer.
    pub unexpected: Vec<String>,
}

/// Fills every layer of `net` from the dumps in `dir`, in layer order.
///
/// A dump must hold as many elements as its target blob and is laid out
/// in the blob's shape. After loading, each layer may adjust its blobs;
/// BatchNorm resets its moving-average scale factor to 1.
pub fn fill_params(net: &mut Net, dir: &Path, options: &LoadOptions) -> Result<FillReport, SerializationError> {
    info!("==> Filling layer params..");

    let names: Vec<String> = net.layers().iter().map(|l| l.name().to_string()).collect();
    let dumps = parallel::with_threads(options.jobs, || {
        parallel::try_par_map(&names, |name| load_param(dir, name))
    })??;

    let mut report = FillReport::default();
    for (i, (layer, dump)) in net.layers_mut().iter_mut().zip(dumps).enumerate() {
        info!("... Layer {} : {}", i, layer.type_name());

        for (kind, array) in dump.arrays() {
            let Some(array) = array else {
                continue;
            };
            let index = kind.blob_index();
            let blob_count = layer.blobs.len();
            let blob = layer.blobs.get_mut(index).ok_or_else(|| SerializationError::NoSuchBlob {
                layer: layer.def.name.clone(),
                layer_type: layer.def.type_name(),
                index,
                blobs: blob_count,
            })?;
            blob.assign(&array).map_err(|_| SerializationError::ShapeMismatch {
                key: format!("{}{}", layer.def.name, kind.suffix()),
                expected: blob.shape().to_vec(),
                got: array.shape().to_vec(),
            })?;
            debug!("Loaded {}{} {:?}", layer.def.name, kind.suffix(), array.shape());
            report.loaded += 1;
        }

        layer.def.layer.on_params_loaded(&mut layer.blobs);
    }

    let known: HashSet<&str> = names.iter().map(String::as_str).collect();
    report.unexpected = unexpected_dumps(dir, &known)?;
    if let Some(first) = report.unexpected.first() {
        if options.strict {
            return Err(SerializationError::UnexpectedKey(first.clone()));
        }
        for file in &report.unexpected {
            warn!("Parameter dump '{}' matches no layer of the network. Skipping.", file);
        }
    }

    Ok(report)
}
