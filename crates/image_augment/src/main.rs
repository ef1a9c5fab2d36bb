//! image-augment: mean image computation and augmentation previews.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image_augment::transforms::vision::{decoded_image_source, load_image};
use image_augment::{
    worker_rng, AugmentConfig, AugmentParams, ImageAugmenter, ImageInput, MeanImage,
};
use ndarray::Array3;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "image-augment",
    about = "Randomized image augmentation producing fixed-shape tensors",
    version
)]
struct Cli {
    /// JSON file with augmentation parameters (any subset of fields).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Parameter override as key=value, e.g. --set rotate_list=0,90,180,270.
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the mean image over every image in a directory and save it.
    Mean {
        /// Directory scanned recursively for images.
        #[arg(short, long)]
        dir: PathBuf,

        /// Output artifact; defaults to the configured `mean_img`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Augment one image several times and write the cropped results as PNG files.
    Preview {
        /// Image file to augment.
        #[arg(short, long)]
        image: PathBuf,

        /// Directory receiving preview_<n>.png files.
        #[arg(short, long, default_value = "preview")]
        out_dir: PathBuf,

        /// Number of augmented samples.
        #[arg(short = 'n', long, default_value_t = 8)]
        count: usize,

        /// Seed of the random source.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let params = load_params(cli.config.as_deref(), &cli.overrides)?;
    match cli.command {
        Commands::Mean { dir, output } => run_mean(params, &dir, output),
        Commands::Preview {
            image,
            out_dir,
            count,
            seed,
        } => run_preview(params, &image, &out_dir, count, seed),
    }
}

fn load_params(config: Option<&Path>, overrides: &[String]) -> Result<AugmentParams> {
    let mut params = match config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        }
        None => AugmentParams::default(),
    };
    for pair in overrides {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Override '{pair}' is not of the form key=value"))?;
        if !params.set(key.trim(), value.trim())? {
            warn!(key = key.trim(), "Ignoring unrecognized parameter");
        }
    }
    Ok(params)
}

fn run_mean(params: AugmentParams, dir: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = AugmentConfig::new(params)?;
    let output = output
        .or_else(|| config.params().mean_img.clone())
        .context("No output path: pass --output or set mean_img")?;
    let target = config.target();
    let source = decoded_image_source(
        dir,
        target.height as u32,
        target.width as u32,
        config.params().channel_order,
    );
    let mean = MeanImage::load_or_compute(&output, &source)?;
    info!(path = %output.display(), shape = ?mean.dims(), "Mean image ready");
    Ok(())
}

fn run_preview(
    params: AugmentParams,
    image_path: &Path,
    out_dir: &Path,
    count: usize,
    seed: u64,
) -> Result<()> {
    let config = Arc::new(AugmentConfig::new(params)?);
    let mean = match &config.params().mean_img {
        Some(path) if path.exists() => Some(Arc::new(MeanImage::load(path)?)),
        Some(path) => {
            warn!(path = %path.display(), "Mean image not found; previewing without it");
            None
        }
        None => None,
    };
    let mut augmenter = ImageAugmenter::new(config, mean);
    let image = load_image(image_path)?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory: {}", out_dir.display()))?;

    let mut rng = worker_rng(seed, 0, 0);
    let mut tensor = Array3::zeros((0, 0, 0));
    for index in 0..count {
        let cropped = augmenter.warp_and_crop(&image, &mut rng)?;
        let path = out_dir.join(format!("preview_{index}.png"));
        cropped
            .save(&path)
            .with_context(|| format!("Failed to write preview: {}", path.display()))?;

        augmenter.process(ImageInput::Decoded(&image), &mut tensor, &mut rng)?;
        let (min, max) = tensor
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        info!(
            path = %path.display(),
            shape = ?tensor.shape(),
            min,
            max,
            "Wrote preview"
        );
    }
    Ok(())
}
