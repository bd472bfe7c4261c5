use caffe_import::{build_prototxt, convert, fill_model, inspect, load_config, ImportConfig, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "caffe-import")]
#[command(about = "Rebuild a Caffe prototxt and caffemodel from dumped layer configs and parameters")]
#[command(version)]
struct Cli {
    /// JSON file with importer settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Command line values that replace the ones from `--config`.
#[derive(Args)]
struct Overrides {
    /// Directory holding net.json and graph.npy
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    /// Directory holding the <layer>.w.npy / <layer>.b.npy dumps
    #[arg(long, global = true)]
    param_dir: Option<PathBuf>,
    /// Directory receiving the prototxt and caffemodel
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Network name, also the output file stem
    #[arg(long, global = true)]
    net_name: Option<String>,
    /// Fail on parameter dumps that match no layer
    #[arg(long, global = true)]
    strict: bool,
    /// Seed for random fillers
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Threads used to read parameter dumps
    #[arg(short, long, global = true)]
    jobs: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the prototxt, then fill and save the caffemodel (default)
    Convert,
    /// Build the prototxt only
    Build,
    /// Fill an existing prototxt and save the caffemodel
    Fill,
    /// Print the layers and blob shapes of a caffemodel
    Inspect { model: PathBuf },
}

impl Overrides {
    fn apply(self, config: &mut ImportConfig) {
        if let Some(dir) = self.config_dir {
            config.config_dir = dir;
        }
        if let Some(dir) = self.param_dir {
            config.param_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(name) = self.net_name {
            config.net_name = name;
        }
        if self.strict {
            config.strict = true;
        }
        if let Some(seed) = self.seed {
            config.filler_seed = seed;
        }
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ImportConfig::default(),
    };
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command.unwrap_or(Commands::Convert) {
        Commands::Convert => {
            let net = convert(&config)?;
            info!(
                "Wrote {} and {} ({} layers)",
                config.prototxt_path().display(),
                config.caffemodel_path().display(),
                net.layers().len()
            );
        }
        Commands::Build => {
            build_prototxt(&config)?;
        }
        Commands::Fill => {
            fill_model(&config)?;
        }
        Commands::Inspect { model } => {
            let summary = inspect(&model)?;
            println!("{} ({} layers)", summary.name, summary.layers.len());
            for layer in &summary.layers {
                let shapes: Vec<String> = layer.blobs.iter().map(|b| format!("{:?}", b.shape)).collect();
                println!(
                    "  {:<20} {:<14} {:?} -> {:?} {}",
                    layer.name,
                    layer.layer_type,
                    layer.bottoms,
                    layer.tops,
                    shapes.join(" ")
                );
            }
        }
    }
    Ok(())
}
