//! Conversion of CLI arguments into a dataset configuration

use crate::cli::main_impl::DatasetArgs;
use crate::config::{CategoryLookup, DataStage, DatasetConfig, LabelMode, ResizeConfig};
use anyhow::{Context, Result};

/// Builds a [`DatasetConfig`] from a config file and command-line overrides
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Resolve the dataset configuration
    ///
    /// A `--config` file provides the base; explicit flags override it.
    pub(crate) fn from_args(args: &DatasetArgs) -> Result<DatasetConfig> {
        let mut config = match &args.config {
            Some(path) => DatasetConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let annotation_path = args
                    .annotations
                    .clone()
                    .context("--annotations is required when --config is not given")?;
                DatasetConfig {
                    image_root: args.images.clone().unwrap_or_default(),
                    annotation_path,
                    stage: None,
                    labels: LabelMode::default(),
                    resize: ResizeConfig::default(),
                }
            },
        };

        if let Some(images) = &args.images {
            config.image_root.clone_from(images);
        }
        if let Some(annotations) = &args.annotations {
            config.annotation_path.clone_from(annotations);
        }

        if let Some(stage) = args.stage {
            let stage = DataStage(stage);
            config.stage = Some(stage);
            if !args.test {
                config.labels = LabelMode::Training { stage };
            }
        }
        if args.test && !matches!(config.labels, LabelMode::Test { .. }) {
            config.labels = LabelMode::Test {
                categories: CategoryLookup::Identity,
            };
        }

        Self::apply_resize_overrides(&mut config.resize, args);
        config.validate().context("Invalid dataset configuration")?;
        Ok(config)
    }

    fn apply_resize_overrides(resize: &mut ResizeConfig, args: &DatasetArgs) {
        if let Some(mode) = args.mode {
            resize.mode = mode;
        }
        if let Some(min_dim) = args.min_dim {
            resize.min_dim = Some(min_dim);
        }
        if let Some(max_dim) = args.max_dim {
            resize.max_dim = Some(max_dim);
        }
        if let Some(min_scale) = args.min_scale {
            resize.min_scale = Some(min_scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::main_impl::{Cli, Command};
    use crate::config::ResizeMode;
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> DatasetArgs {
        let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
        cli.dataset
    }

    #[test]
    fn test_training_flags() {
        let args = parse(&[
            "coco-seg-dataset",
            "--annotations",
            "train.json",
            "--images",
            "/data",
            "--stage",
            "1",
            "inspect",
        ]);
        let config = CliConfigBuilder::from_args(&args).unwrap();
        assert_eq!(config.annotation_path, PathBuf::from("train.json"));
        assert_eq!(config.image_dir(), PathBuf::from("/data/PRIM_class/images"));
        assert_eq!(
            config.labels,
            LabelMode::Training {
                stage: DataStage::PRIM
            }
        );
        assert_eq!(config.resize, ResizeConfig::default());
    }

    #[test]
    fn test_test_mode_keeps_stage_directory() {
        let args = parse(&[
            "coco-seg-dataset",
            "--annotations",
            "test.json",
            "--stage",
            "2",
            "--test",
            "inspect",
        ]);
        let config = CliConfigBuilder::from_args(&args).unwrap();
        assert_eq!(config.stage, Some(DataStage::FILLING));
        assert_eq!(config.labels, LabelMode::default());
    }

    #[test]
    fn test_resize_overrides() {
        let args = parse(&[
            "coco-seg-dataset",
            "--annotations",
            "a.json",
            "--mode",
            "crop",
            "--min-dim",
            "512",
            "--min-scale",
            "1.5",
            "inspect",
        ]);
        let config = CliConfigBuilder::from_args(&args).unwrap();
        assert_eq!(config.resize.mode, ResizeMode::Crop);
        assert_eq!(config.resize.min_dim, Some(512));
        assert_eq!(config.resize.min_scale, Some(1.5));
    }

    #[test]
    fn test_invalid_combination_is_rejected() {
        let args = parse(&[
            "coco-seg-dataset",
            "--annotations",
            "a.json",
            "--mode",
            "pad64",
            "--min-dim",
            "100",
            "inspect",
        ]);
        assert!(CliConfigBuilder::from_args(&args).is_err());
    }

    #[test]
    fn test_annotations_required_without_config() {
        let args = parse(&["coco-seg-dataset", "inspect"]);
        assert!(CliConfigBuilder::from_args(&args).is_err());
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"image_root": "/imgs", "annotation_path": "ann.json",
                "resize": {"mode": "pad64", "min_dim": 256}}"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "coco-seg-dataset",
            "--config",
            path.to_str().unwrap(),
            "--images",
            "/other",
            "export",
            "3",
            "--output",
            "out",
        ])
        .unwrap();
        let config = CliConfigBuilder::from_args(&cli.dataset).unwrap();
        assert_eq!(config.image_root, PathBuf::from("/other"));
        assert_eq!(config.annotation_path, PathBuf::from("ann.json"));
        assert_eq!(config.resize.mode, ResizeMode::Pad64);
        assert!(matches!(cli.command, Command::Export { index: 3, .. }));
    }
}
