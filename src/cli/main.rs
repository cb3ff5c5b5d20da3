//! COCO segmentation dataset CLI
//!
//! Inspect a dataset through the same resize and labeling pipeline a training
//! loop would see, or export single samples to PNG for visual checks.

use super::config::CliConfigBuilder;
use crate::{
    config::{DatasetConfig, ResizeMode, CLASS_NAMES},
    dataset::SegmentationDataset,
    services::ImageIOService,
    tracing_config::{init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// COCO segmentation dataset tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "coco-seg-dataset")]
pub struct Cli {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Dataset selection and resize options shared by all subcommands
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Image root directory (stage sub-directories live below it)
    #[arg(long, value_name = "DIR", global = true)]
    pub images: Option<PathBuf>,

    /// COCO annotation JSON file
    #[arg(long, value_name = "FILE", global = true)]
    pub annotations: Option<PathBuf>,

    /// Dataset configuration JSON; flags override its values
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Data stage (0 = PERM, 1 = PRIM, 2 = filling)
    #[arg(long, global = true)]
    pub stage: Option<u8>,

    /// Label pixels with their category instead of the stage label
    #[arg(long, global = true)]
    pub test: bool,

    /// Resize mode: none, square, pad64 or crop
    #[arg(long, global = true)]
    pub mode: Option<ResizeMode>,

    /// Minimum length of the shorter side
    #[arg(long, global = true)]
    pub min_dim: Option<u32>,

    /// Maximum length of the longer side (square size)
    #[arg(long, global = true)]
    pub max_dim: Option<u32>,

    /// Minimum scale factor
    #[arg(long, global = true)]
    pub min_scale: Option<f64>,

    /// Seed for crop offsets; random if omitted
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve samples and report shapes and label histograms
    Inspect {
        /// First sample index
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Number of samples to resolve (all remaining if omitted)
        #[arg(long)]
        count: Option<usize>,
    },
    /// Write the transformed image and label map of one sample as PNG
    Export {
        /// Sample index
        index: usize,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Spread label values over the 8-bit range for viewing
        #[arg(long)]
        stretch: bool,
    },
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.dataset.verbose).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_args(&cli.dataset)?;
    let dataset = {
        let _span = spans::dataset_loading(&config.annotation_path).entered();
        open_dataset(&config)?
    };
    let mut rng = match cli.dataset.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match cli.command {
        Command::Inspect { start, count } => inspect(&dataset, start, count, &mut rng),
        Command::Export {
            index,
            output,
            stretch,
        } => export(&dataset, index, &output, stretch, &mut rng),
    }
}

fn open_dataset(config: &DatasetConfig) -> Result<SegmentationDataset> {
    let dataset = SegmentationDataset::from_config(config).with_context(|| {
        format!(
            "Failed to open dataset from {}",
            config.annotation_path.display()
        )
    })?;
    info!(
        samples = dataset.len(),
        image_dir = %dataset.image_dir().display(),
        mode = %config.resize.mode,
        "Opened dataset"
    );
    Ok(dataset)
}

fn label_name(label: u32) -> String {
    usize::try_from(label)
        .ok()
        .and_then(|i| CLASS_NAMES.get(i))
        .map_or_else(|| label.to_string(), |name| format!("{} ({})", label, name))
}

fn inspect(
    dataset: &SegmentationDataset,
    start: usize,
    count: Option<usize>,
    rng: &mut StdRng,
) -> Result<()> {
    let len = dataset.len();
    if len == 0 {
        println!("Dataset is empty");
        return Ok(());
    }
    if start >= len {
        anyhow::bail!("Start index {} is out of range for {} samples", start, len);
    }
    let end = count.map_or(len, |c| start.saturating_add(c).min(len));

    let pb = ProgressBar::new((end - start) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let started = Instant::now();
    let mut totals: BTreeMap<u32, usize> = BTreeMap::new();
    let mut failed = 0_usize;

    for index in start..end {
        pb.set_message(format!("sample {}", index));
        match dataset.get_with_rng(index, rng) {
            Ok(sample) => {
                let histogram = sample.label_histogram();
                let (height, width) = sample.dims();
                debug!(index, height, width, scale = sample.geometry.scale, "Inspected sample");
                pb.println(format!(
                    "#{:<6} image {:<8} {}x{}  scale {:.3}  labels {:?}",
                    index,
                    sample.image_id,
                    height,
                    width,
                    sample.geometry.scale,
                    histogram.keys().collect::<Vec<_>>()
                ));
                for (label, pixels) in histogram {
                    *totals.entry(label).or_insert(0) += pixels;
                }
            },
            Err(e) => {
                failed += 1;
                warn!(index, error = %e, "Failed to resolve sample");
            },
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Resolved {} of {} sample(s) in {:.2}s",
        (end - start) - failed,
        end - start,
        started.elapsed().as_secs_f64()
    );
    let total_pixels: usize = totals.values().sum();
    for (label, pixels) in &totals {
        let share = if total_pixels > 0 {
            *pixels as f64 / total_pixels as f64 * 100.0
        } else {
            0.0
        };
        println!("  {:<16} {:>12} px  {:>6.2}%", label_name(*label), pixels, share);
    }

    if failed > 0 {
        anyhow::bail!("{} sample(s) failed", failed);
    }
    Ok(())
}

fn export(
    dataset: &SegmentationDataset,
    index: usize,
    output: &std::path::Path,
    stretch: bool,
    rng: &mut StdRng,
) -> Result<()> {
    let _span = spans::export(index, output).entered();

    let sample = dataset
        .get_with_rng(index, rng)
        .with_context(|| format!("Failed to resolve sample {}", index))?;

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let image_path = output.join(format!("{:06}_image.png", index));
    let labels_path = output.join(format!("{:06}_labels.png", index));
    let geometry_path = output.join(format!("{:06}_geometry.json", index));

    ImageIOService::save_chw_array(sample.image.view(), &image_path)
        .with_context(|| format!("Failed to write {}", image_path.display()))?;
    ImageIOService::save_label_map(sample.label_map.view(), &labels_path, stretch)
        .with_context(|| format!("Failed to write {}", labels_path.display()))?;
    let geometry = serde_json::to_string_pretty(&sample.geometry)?;
    std::fs::write(&geometry_path, geometry)
        .with_context(|| format!("Failed to write {}", geometry_path.display()))?;

    println!("Image:     {}", image_path.display());
    println!("Labels:    {}", labels_path.display());
    println!("Geometry:  {}", geometry_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from([
            "coco-seg-dataset",
            "inspect",
            "--annotations",
            "a.json",
            "--count",
            "5",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.dataset.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Inspect {
                start: 0,
                count: Some(5)
            }
        ));
    }

    #[test]
    fn test_parse_mode_values() {
        let cli =
            Cli::try_parse_from(["coco-seg-dataset", "--mode", "pad64", "inspect"]).unwrap();
        assert_eq!(cli.dataset.mode, Some(ResizeMode::Pad64));

        let bad = Cli::try_parse_from(["coco-seg-dataset", "--mode", "stretch", "inspect"]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_export_requires_output() {
        assert!(Cli::try_parse_from(["coco-seg-dataset", "export", "1"]).is_err());
    }

    #[test]
    fn test_label_names() {
        assert_eq!(label_name(0), "0 (background)");
        assert_eq!(label_name(3), "3 (filling)");
        assert_eq!(label_name(17), "17");
    }
}
