//! # Configuration
//!
//! Two kinds of JSON input: the dumped layer list (`net.json`) and the
//! optional importer settings (directories, output name, loading options).

use crate::blob::Filler;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Hyperparameters of a layer config, every key except `name` and `type`.
pub type ConfigParams = serde_json::Map<String, serde_json::Value>;

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One entry of `net.json`.
///
/// # Example
///
/// ```json
/// {"name": "conv1", "type": "Convolution", "num_output": 16,
///  "kW": 3, "kH": 3, "dW": 1, "dH": 1, "pW": 1, "pH": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawLayerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(flatten)]
    pub params: ConfigParams,
}

/// Importer settings. Every field has a default, so `{}` is a valid file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Directory holding `net.json` and `graph.npy`.
    pub config_dir: PathBuf,
    /// Directory holding the `<layer>.w.npy` / `<layer>.b.npy` dumps.
    pub param_dir: PathBuf,
    /// Directory receiving the prototxt and caffemodel.
    pub output_dir: PathBuf,
    pub net_config_file: String,
    pub graph_file: String,
    /// Network name, also the stem of both output files.
    pub net_name: String,
    /// Fail instead of warn on dumps that match no layer.
    pub strict: bool,
    /// Seed for random fillers.
    pub filler_seed: u64,
    /// Override for the weight blob of convolution and inner product layers.
    pub weight_filler: Option<Filler>,
    /// Override for their bias blob.
    pub bias_filler: Option<Filler>,
    /// Threads used to read parameter dumps. `None` lets rayon decide.
    pub jobs: Option<usize>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            config_dir: PathBuf::from("./output/config"),
            param_dir: PathBuf::from("./output/param"),
            output_dir: PathBuf::from("./output"),
            net_config_file: "net.json".to_string(),
            graph_file: "graph.npy".to_string(),
            net_name: "cvt_net".to_string(),
            strict: false,
            filler_seed: 0,
            weight_filler: None,
            bias_filler: None,
            jobs: None,
        }
    }
}

impl ImportConfig {
    pub fn net_config_path(&self) -> PathBuf {
        self.config_dir.join(&self.net_config_file)
    }

    pub fn graph_path(&self) -> PathBuf {
        self.config_dir.join(&self.graph_file)
    }

    pub fn prototxt_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.prototxt", self.net_name))
    }

    pub fn caffemodel_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.caffemodel", self.net_name))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.net_name.is_empty() {
            return Err(ConfigError::Invalid("net_name must not be empty".to_string()));
        }
        if self.net_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "net_name '{}' must not contain a path separator",
                self.net_name
            )));
        }
        if self.jobs == Some(0) {
            return Err(ConfigError::Invalid("jobs must be positive".to_string()));
        }
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads importer settings from a JSON file and validates them.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ImportConfig, ConfigError> {
    let config: ImportConfig = read_json(path.as_ref())?;
    config.validate()?;
    Ok(config)
}

/// Loads the layer list. Index `i` of the list is node `i` of the graph.
pub fn load_net_config<P: AsRef<Path>>(path: P) -> Result<Vec<RawLayerConfig>, ConfigError> {
    let configs: Vec<RawLayerConfig> = read_json(path.as_ref())?;
    if configs.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{} contains no layers",
            path.as_ref().display()
        )));
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_temp("{}");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config, ImportConfig::default());
        assert_eq!(config.prototxt_path(), PathBuf::from("./output/cvt_net.prototxt"));
        assert_eq!(config.net_config_path(), PathBuf::from("./output/config/net.json"));
    }

    #[test]
    fn test_config_overrides() {
        let file = write_temp(
            r#"{"net_name": "resnet", "strict": true,
                "weight_filler": {"type": "uniform", "min": -0.1, "max": 0.1}}"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.net_name, "resnet");
        assert!(config.strict);
        assert_eq!(config.weight_filler, Some(Filler::Uniform { min: -0.1, max: 0.1 }));
        assert_eq!(config.caffemodel_path(), PathBuf::from("./output/resnet.caffemodel"));
    }

    #[test]
    fn test_invalid_config() {
        let file = write_temp(r#"{"net_name": "a/b"}"#);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));
        let file = write_temp(r#"{"unknown_key": 1}"#);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Json { .. })));
        assert!(matches!(load_config("/nonexistent/import.json"), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_net_config() {
        let file = write_temp(
            r#"[{"name": "data", "type": "Data", "input_shape": [1, 3, 8, 8]},
                {"name": "relu", "type": "ReLU"}]"#,
        );
        let configs = load_net_config(file.path()).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].layer_type, "Data");
        assert!(configs[0].params.contains_key("input_shape"));
        assert!(!configs[0].params.contains_key("name"));
        assert!(configs[1].params.is_empty());

        let file = write_temp("[]");
        assert!(load_net_config(file.path()).is_err());
        let file = write_temp(r#"[{"type": "ReLU"}]"#);
        assert!(load_net_config(file.path()).is_err());
    }
}
