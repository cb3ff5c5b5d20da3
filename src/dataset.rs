//! Sample provider
//!
//! [`SegmentationDataset`] turns a sample index into a resized image and the
//! matching label map, combining the annotation store, image loading and the
//! resize geometry.

use crate::{
    annotations::{AnnotationStore, CocoAnnotationStore},
    config::{DatasetConfig, LabelMode, ResizeConfig},
    error::{DatasetError, Result},
    geometry::{resize_image, resize_mask},
    services::ImageIOService,
    transforms::PostTransform,
    types::Sample,
};
use ndarray::{Array2, ArrayView2, Zip};
use rand::Rng;
use std::{fmt, path::PathBuf};
use tracing::{debug, instrument, trace};

/// Write `label` into `label_map` wherever `mask` is set, keeping larger labels
///
/// Only strictly greater values overwrite, so overlapping instances resolve to
/// the highest label regardless of order.
pub fn combine_instance(label_map: &mut Array2<u32>, mask: ArrayView2<u8>, label: u32) -> Result<()> {
    if label_map.dim() != mask.dim() {
        return Err(DatasetError::processing_stage_error(
            "label combine",
            &format!(
                "instance mask {:?} does not match label map {:?}",
                mask.dim(),
                label_map.dim()
            ),
            None,
        ));
    }

    Zip::from(label_map).and(mask).for_each(|current, &set| {
        if set != 0 && label > *current {
            *current = label;
        }
    });
    Ok(())
}

/// Segmentation dataset over an annotation store
///
/// Samples are resolved on demand; nothing but the store is held in memory.
pub struct SegmentationDataset<S = CocoAnnotationStore> {
    store: S,
    image_dir: PathBuf,
    labels: LabelMode,
    resize: ResizeConfig,
    post_transform: Option<Box<dyn PostTransform>>,
}

impl SegmentationDataset<CocoAnnotationStore> {
    /// Open the COCO annotations named in `config`
    pub fn from_config(config: &DatasetConfig) -> Result<Self> {
        config.validate()?;
        let store = CocoAnnotationStore::from_file(&config.annotation_path)?;
        Self::with_store(store, config)
    }
}

impl<S: AnnotationStore> SegmentationDataset<S> {
    /// Dataset over any annotation store
    ///
    /// `config.annotation_path` is not read; the store is used as given.
    pub fn with_store(store: S, config: &DatasetConfig) -> Result<Self> {
        config.resize.validate()?;
        let image_dir = config.image_dir();
        debug!(
            samples = store.len(),
            image_dir = %image_dir.display(),
            mode = %config.resize.mode,
            "Created segmentation dataset"
        );
        Ok(Self {
            store,
            image_dir,
            labels: config.labels.clone(),
            resize: config.resize,
            post_transform: None,
        })
    }

    /// Apply `transform` to every sample after resizing
    #[must_use]
    pub fn with_post_transform<T: PostTransform + 'static>(mut self, transform: T) -> Self {
        self.post_transform = Some(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn image_dir(&self) -> &std::path::Path {
        &self.image_dir
    }

    pub fn resize_config(&self) -> &ResizeConfig {
        &self.resize
    }

    /// Resolve the sample at `index`, drawing crop offsets from the thread RNG
    pub fn get(&self, index: usize) -> Result<Sample> {
        self.get_with_rng(index, &mut rand::thread_rng())
    }

    /// Resolve the sample at `index` with an explicit random source
    ///
    /// # Errors
    /// - `IndexOutOfBounds` when `index >= len()`
    /// - `Io`/`Processing` when the image cannot be read or its size differs
    ///   from the annotated size
    /// - `InvalidConfig` for unusable resize settings
    #[instrument(level = "debug", skip(self, rng))]
    pub fn get_with_rng<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Sample> {
        let len = self.store.len();
        if index >= len {
            return Err(DatasetError::index_out_of_bounds(index, len));
        }

        let record = self.store.image_record(index)?;
        let path = self.image_dir.join(&record.file_name);
        let image = ImageIOService::load_rgb_array(&path)?;
        let (height, width, _) = image.dim();
        if (height, width) != (record.height, record.width) {
            return Err(DatasetError::processing_stage_error(
                "image load",
                &format!(
                    "decoded size {}x{} differs from annotated size {}x{}",
                    height, width, record.height, record.width
                ),
                Some(&format!("path: {}", path.display())),
            ));
        }

        let (resized, geometry) = resize_image(image.view(), &self.resize, rng)?;
        let label_map = self.build_label_map(index, record.height, record.width)?;
        let mut label_map = resize_mask(label_map.view(), &geometry)?;

        let mut image = resized
            .permuted_axes([2, 0, 1])
            .as_standard_layout()
            .into_owned();
        if let Some(transform) = &self.post_transform {
            image = transform.apply_image(image)?;
            label_map = transform.apply_label_map(label_map)?;
        }

        let sample = Sample {
            index,
            image_id: record.id,
            image,
            label_map,
            geometry,
        };
        sample.validate()?;
        trace!(dims = ?sample.dims(), "Resolved sample");
        Ok(sample)
    }

    /// Label map of the sample at `index` at the original image size
    pub fn label_map(&self, index: usize) -> Result<Array2<u32>> {
        let record = self.store.image_record(index)?;
        self.build_label_map(index, record.height, record.width)
    }

    fn build_label_map(&self, index: usize, height: usize, width: usize) -> Result<Array2<u32>> {
        let mut label_map = Array2::<u32>::zeros((height, width));
        let mut drawn = 0_usize;
        for instance in self.store.instance_masks(index)? {
            let instance = instance?;
            match self.labels.label_for(instance.category_id) {
                Some(label) => {
                    combine_instance(&mut label_map, instance.mask.view(), label)?;
                    drawn += 1;
                },
                None => trace!(
                    category_id = instance.category_id,
                    annotation_id = instance.annotation_id,
                    "Skipping instance without a label"
                ),
            }
        }
        trace!(index, drawn, "Built label map");
        Ok(label_map)
    }

    /// Iterate over all samples in index order
    pub fn iter(&self) -> impl Iterator<Item = Result<Sample>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }
}

impl<S: AnnotationStore> fmt::Debug for SegmentationDataset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentationDataset")
            .field("len", &self.store.len())
            .field("image_dir", &self.image_dir)
            .field("labels", &self.labels)
            .field("resize", &self.resize)
            .field("post_transform", &self.post_transform.is_some())
            .finish()
    }
}
