#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # COCO Segmentation Dataset
//!
//! Loads images and pixel-level segmentation masks from COCO-format
//! annotations and turns them into fixed-size samples for a training loop.
//!
//! The core is the geometric transform: images are resized keeping their
//! aspect ratio, then padded or cropped, and the label map follows the exact
//! same geometry with nearest-neighbor sampling so label values never blend.
//!
//! ## Features
//!
//! - **Resize modes**: `none`, `square`, `pad64` and `crop`, generic over the
//!   element type of the image
//! - **COCO masks**: polygons, uncompressed and compressed RLE
//! - **Label maps**: instances merged by max-combine, labeled by data stage
//!   (training) or semantic category (test)
//! - **Explicit randomness**: crop offsets come from a caller-supplied RNG
//! - **CLI Integration**: `inspect` and `export` commands (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coco_seg_dataset::{DataStage, DatasetConfig, ResizeConfig, SegmentationDataset};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! # fn example() -> coco_seg_dataset::Result<()> {
//! let config = DatasetConfig::builder()
//!     .image_root("/data/dent")
//!     .annotation_path("/data/dent/annotations/train.json")
//!     .training(DataStage::PRIM)
//!     .resize(ResizeConfig::square(1024, 1024))
//!     .build()?;
//!
//! let dataset = SegmentationDataset::from_config(&config)?;
//! let mut rng = StdRng::seed_from_u64(7);
//! let sample = dataset.get_with_rng(0, &mut rng)?;
//! assert_eq!(sample.image.dim(), (3, 1024, 1024));
//! assert_eq!(sample.label_map.dim(), (1024, 1024));
//! # Ok(())
//! # }
//! ```
//!
//! ## Geometry only
//!
//! ```rust
//! use coco_seg_dataset::{geometry, ResizeConfig};
//! use ndarray::{Array2, Array3};
//!
//! let image = Array3::<u8>::zeros((600, 800, 3));
//! let mask = Array2::<u32>::zeros((600, 800));
//! let config = ResizeConfig::square(1024, 1024);
//!
//! let (resized, geo) = geometry::resize_image(image.view(), &config, &mut rand::thread_rng())?;
//! let resized_mask = geometry::resize_mask(mask.view(), &geo)?;
//! assert_eq!(resized.dim(), (1024, 1024, 3));
//! assert_eq!(resized_mask.dim(), (1024, 1024));
//! assert_eq!((geo.padding.top, geo.padding.bottom), (128, 128));
//! # Ok::<(), coco_seg_dataset::DatasetError>(())
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line tool, progress bars and subscriber setup
//! - `tracing-json`: JSON log output for the CLI
//! - `webp-support`: WebP decoding

pub mod annotations;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod transforms;
pub mod types;
pub mod utils;

// Public API exports
pub use annotations::{
    AnnotationStore, CocoAnnotationStore, InMemoryAnnotationStore, InstanceMasks, Rle,
};
pub use config::{
    CategoryLookup, DataStage, DatasetConfig, DatasetConfigBuilder, LabelMode, ResizeConfig,
    ResizeMode, CLASS_NAMES, DEFAULT_TARGET_DIM,
};
pub use dataset::{combine_instance, SegmentationDataset};
pub use error::{DatasetError, Result};
pub use geometry::{
    resize_image, resize_image_2d, resize_mask, Crop, Element, Padding, ResizeGeometry, Window,
};
pub use services::ImageIOService;
pub use transforms::{Compose, Flip, MapTransform, Normalization, PostTransform};
pub use types::{ImageRecord, InstanceMask, Sample};
pub use utils::NumericValidator;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};
