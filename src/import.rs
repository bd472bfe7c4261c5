//! # Import Pipeline
//!
//! The two phases of a conversion. [`build_prototxt`] turns `net.json` and
//! `graph.npy` into a `.prototxt`; [`fill_model`] reads that prototxt
//! back, fills the parameter blobs from the dumps and saves the
//! `.caffemodel`.

use crate::blob::read_npy;
use crate::config::{load_net_config, ImportConfig};
use crate::net::{build_net_spec, AdjacencyMatrix, InitOptions, Net, NetSpec};
use crate::proto::caffe::ModelSummary;
use crate::utils::{fill_params, LoadOptions};
use crate::{Error, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Builds the network definition and writes it to the prototxt path.
pub fn build_prototxt(config: &ImportConfig) -> Result<NetSpec> {
    info!("==> Building prototxt..");

    let configs = load_net_config(config.net_config_path())?;
    let graph_path = config.graph_path();
    let graph = read_npy(&graph_path).map_err(|source| Error::Npy {
        path: graph_path.clone(),
        source,
    })?;
    let graph = AdjacencyMatrix::from_array(&graph.data)?;

    let spec = build_net_spec(&config.net_name, &configs, &graph)?;

    fs::create_dir_all(&config.output_dir).map_err(|source| Error::Io {
        path: config.output_dir.clone(),
        source,
    })?;
    spec.write_prototxt(config.prototxt_path())?;
    info!("Saved!");
    Ok(spec)
}

/// Instantiates the saved prototxt, fills it from the dumps and writes the
/// caffemodel.
pub fn fill_model(config: &ImportConfig) -> Result<Net> {
    let spec = NetSpec::read_prototxt(config.prototxt_path())?;
    let mut net = Net::from_spec(spec, &InitOptions::from(config))?;

    fill_params(&mut net, &config.param_dir, &LoadOptions::from(config))?;

    fs::create_dir_all(&config.output_dir).map_err(|source| Error::Io {
        path: config.output_dir.clone(),
        source,
    })?;
    net.save(config.caffemodel_path())?;
    info!("Saved!");
    Ok(net)
}

/// Runs both phases.
pub fn convert(config: &ImportConfig) -> Result<Net> {
    config.validate()?;
    build_prototxt(config)?;
    fill_model(config)
}

/// Decodes a saved caffemodel.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<ModelSummary> {
    Ok(ModelSummary::read(path)?)
}
