//! Configuration types for dataset loading and resizing

use crate::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Side length used by the default square configuration
pub const DEFAULT_TARGET_DIM: u32 = 1024;

/// Class names indexed by label value (0 is background)
pub const CLASS_NAMES: [&str; 4] = ["background", "PERM", "PRIM", "filling"];

/// Resizing mode applied by [`crate::geometry::resize_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// No resizing; the image is returned unchanged
    None,
    /// Resize and zero-pad to a `max_dim x max_dim` square
    Square,
    /// Zero-pad height and width up to multiples of 64
    Pad64,
    /// Scale up to `min_dim`, then take a random `min_dim x min_dim` crop
    Crop,
}

impl Default for ResizeMode {
    fn default() -> Self {
        Self::Square
    }
}

impl std::fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Square => write!(f, "square"),
            Self::Pad64 => write!(f, "pad64"),
            Self::Crop => write!(f, "crop"),
        }
    }
}

impl FromStr for ResizeMode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "square" => Ok(Self::Square),
            "pad64" => Ok(Self::Pad64),
            "crop" => Ok(Self::Crop),
            other => Err(DatasetError::invalid_config(format!(
                "Mode {} not supported",
                other
            ))),
        }
    }
}

/// Geometry parameters for one resize operation
///
/// `min_dim` and `min_scale` follow the convention that zero means "not set".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeConfig {
    /// Scale up so the shorter side reaches this length (never scales down)
    pub min_dim: Option<u32>,
    /// Cap on the longer side; square mode pads to exactly this size
    pub max_dim: Option<u32>,
    /// Floor on the scale factor even if `min_dim` does not require it
    pub min_scale: Option<f64>,
    /// Resizing mode
    pub mode: ResizeMode,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            min_dim: Some(DEFAULT_TARGET_DIM),
            max_dim: Some(DEFAULT_TARGET_DIM),
            min_scale: None,
            mode: ResizeMode::Square,
        }
    }
}

impl ResizeConfig {
    /// Identity configuration (`mode = none`)
    #[must_use]
    pub fn identity() -> Self {
        Self {
            min_dim: None,
            max_dim: None,
            min_scale: None,
            mode: ResizeMode::None,
        }
    }

    /// Square configuration with the given min and max dimensions
    #[must_use]
    pub fn square(min_dim: u32, max_dim: u32) -> Self {
        Self {
            min_dim: Some(min_dim),
            max_dim: Some(max_dim),
            min_scale: None,
            mode: ResizeMode::Square,
        }
    }

    /// Pad-to-64 configuration
    #[must_use]
    pub fn pad64(min_dim: u32) -> Self {
        Self {
            min_dim: Some(min_dim),
            max_dim: None,
            min_scale: None,
            mode: ResizeMode::Pad64,
        }
    }

    /// Random crop configuration with a `min_dim x min_dim` window
    #[must_use]
    pub fn crop(min_dim: u32) -> Self {
        Self {
            min_dim: Some(min_dim),
            max_dim: None,
            min_scale: None,
            mode: ResizeMode::Crop,
        }
    }

    /// Set the minimum scale factor
    #[must_use]
    pub fn with_min_scale(mut self, min_scale: f64) -> Self {
        self.min_scale = Some(min_scale);
        self
    }

    /// `min_dim` with zero treated as unset
    #[must_use]
    pub fn effective_min_dim(&self) -> Option<u32> {
        self.min_dim.filter(|&d| d > 0)
    }

    /// `max_dim` with zero treated as unset
    #[must_use]
    pub fn effective_max_dim(&self) -> Option<u32> {
        self.max_dim.filter(|&d| d > 0)
    }

    /// `min_scale` with zero treated as unset
    #[must_use]
    pub fn effective_min_scale(&self) -> Option<f64> {
        self.min_scale.filter(|&s| s > 0.0)
    }

    /// Check the preconditions of the selected mode
    ///
    /// # Validation Rules
    ///
    /// - `min_scale`, when set, must be finite and non-negative
    /// - square mode needs `max_dim`
    /// - pad64 mode needs `min_dim` to be a multiple of 64
    /// - crop mode needs `min_dim`
    pub fn validate(&self) -> Result<()> {
        if let Some(min_scale) = self.min_scale {
            if !min_scale.is_finite() || min_scale < 0.0 {
                return Err(DatasetError::config_value_error(
                    "min_scale",
                    min_scale,
                    "finite, >= 0",
                    None,
                ));
            }
        }

        match self.mode {
            ResizeMode::None => Ok(()),
            ResizeMode::Square => {
                if self.effective_max_dim().is_none() {
                    return Err(DatasetError::invalid_config(
                        "Square mode requires max_dim to be set",
                    ));
                }
                Ok(())
            },
            ResizeMode::Pad64 => match self.effective_min_dim() {
                Some(min_dim) if min_dim % 64 != 0 => Err(DatasetError::config_value_error(
                    "min_dim",
                    min_dim,
                    "multiple of 64",
                    Some((min_dim / 64 + 1) * 64),
                )),
                _ => Ok(()),
            },
            ResizeMode::Crop => {
                if self.effective_min_dim().is_none() {
                    return Err(DatasetError::invalid_config(
                        "Crop mode requires min_dim to be set",
                    ));
                }
                Ok(())
            },
        }
    }
}

/// Data collection stage a training set was produced by
///
/// The stage picks the image sub-directory and, in training mode, the label
/// written for every annotated pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataStage(pub u8);

impl DataStage {
    pub const PERM: Self = Self(0);
    pub const PRIM: Self = Self(1);
    pub const FILLING: Self = Self(2);

    /// Image directory relative to the dataset root, `None` for the root itself
    #[must_use]
    pub fn image_subdir(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("PERM"),
            1 => Some("PRIM_class/images"),
            2 => Some("filling"),
            _ => None,
        }
    }

    /// Label value used for this stage in training mode
    #[must_use]
    pub fn label(self) -> u32 {
        u32::from(self.0) + 1
    }

    /// Human readable class name for the stage label, if known
    #[must_use]
    pub fn class_name(self) -> Option<&'static str> {
        CLASS_NAMES.get(self.label() as usize).copied()
    }
}

impl std::fmt::Display for DataStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.class_name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Mapping from annotation category ids to label values in test mode
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryLookup {
    /// The category id is the label
    #[default]
    Identity,
    /// Explicit remapping; categories missing from the map are not drawn
    Remap(BTreeMap<u64, u32>),
}

impl CategoryLookup {
    /// Label for `category_id`, `None` if it should not be drawn
    #[must_use]
    pub fn label_for(&self, category_id: u64) -> Option<u32> {
        match self {
            Self::Identity => u32::try_from(category_id).ok(),
            Self::Remap(map) => map.get(&category_id).copied(),
        }
    }
}

/// How label values are assigned to annotated pixels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// Every instance is drawn with the stage label
    Training { stage: DataStage },
    /// Every instance is drawn with its (looked up) semantic category
    Test {
        #[serde(default)]
        categories: CategoryLookup,
    },
}

impl Default for LabelMode {
    fn default() -> Self {
        Self::Test {
            categories: CategoryLookup::Identity,
        }
    }
}

impl LabelMode {
    /// Label value for an instance of `category_id`
    #[must_use]
    pub fn label_for(&self, category_id: u64) -> Option<u32> {
        match self {
            Self::Training { stage } => Some(stage.label()),
            Self::Test { categories } => categories.label_for(category_id),
        }
    }
}

/// Configuration for a [`crate::dataset::SegmentationDataset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root directory holding the images (or the stage sub-directories)
    pub image_root: PathBuf,

    /// COCO annotation JSON file
    pub annotation_path: PathBuf,

    /// Data stage; selects the image sub-directory
    #[serde(default)]
    pub stage: Option<DataStage>,

    /// Label assignment
    #[serde(default)]
    pub labels: LabelMode,

    /// Resize geometry
    #[serde(default)]
    pub resize: ResizeConfig,
}

impl DatasetConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::default()
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DatasetError::file_io_error("read dataset config", path, &e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Stage that picks the image directory
    ///
    /// Training mode always reads from its own stage directory.
    #[must_use]
    pub fn effective_stage(&self) -> Option<DataStage> {
        match self.labels {
            LabelMode::Training { stage } => Some(stage),
            LabelMode::Test { .. } => self.stage,
        }
    }

    /// Directory the image file names are resolved against
    #[must_use]
    pub fn image_dir(&self) -> PathBuf {
        match self.effective_stage().and_then(DataStage::image_subdir) {
            Some(subdir) => self.image_root.join(subdir),
            None => self.image_root.clone(),
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.annotation_path.as_os_str().is_empty() {
            return Err(DatasetError::invalid_config(
                "Annotation path must not be empty",
            ));
        }
        if let (Some(stage), LabelMode::Training { stage: training }) = (self.stage, &self.labels) {
            if stage != *training {
                return Err(DatasetError::invalid_config(format!(
                    "Stage {} does not match training stage {}",
                    stage, training
                )));
            }
        }
        self.resize.validate()
    }
}

/// Builder for `DatasetConfig`
#[derive(Debug, Default)]
pub struct DatasetConfigBuilder {
    image_root: PathBuf,
    annotation_path: PathBuf,
    stage: Option<DataStage>,
    labels: LabelMode,
    resize: ResizeConfig,
}

impl DatasetConfigBuilder {
    /// Set the image root directory
    #[must_use]
    pub fn image_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.image_root = root.into();
        self
    }

    /// Set the COCO annotation file
    #[must_use]
    pub fn annotation_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.annotation_path = path.into();
        self
    }

    /// Set the data stage without changing the label mode
    #[must_use]
    pub fn stage(mut self, stage: Option<DataStage>) -> Self {
        self.stage = stage;
        self
    }

    /// Training mode for `stage`: stage directory and stage labels
    #[must_use]
    pub fn training(mut self, stage: DataStage) -> Self {
        self.stage = Some(stage);
        self.labels = LabelMode::Training { stage };
        self
    }

    /// Test mode: category labels through `categories`
    #[must_use]
    pub fn test(mut self, categories: CategoryLookup) -> Self {
        self.labels = LabelMode::Test { categories };
        self
    }

    /// Set the resize configuration
    #[must_use]
    pub fn resize(mut self, resize: ResizeConfig) -> Self {
        self.resize = resize;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<DatasetConfig> {
        let config = DatasetConfig {
            image_root: self.image_root,
            annotation_path: self.annotation_path,
            stage: self.stage,
            labels: self.labels,
            resize: self.resize,
        };
        config.validate()?;
        Ok(config)
    }
}
