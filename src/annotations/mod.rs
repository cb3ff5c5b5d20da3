//! Annotation stores
//!
//! An [`AnnotationStore`] resolves a sample index into the image it refers to
//! and the binary masks of the objects annotated on it. [`CocoAnnotationStore`]
//! reads COCO JSON files; [`InMemoryAnnotationStore`] holds pre-built masks.

pub mod coco;
pub mod mask;
pub mod memory;

pub use coco::{CocoAnnotationStore, CocoDataset, Segmentation};
pub use mask::{fill_polygon, polygons_to_mask, Rle};
pub use memory::InMemoryAnnotationStore;

use crate::{
    error::Result,
    types::{ImageRecord, InstanceMask},
};

/// Lazy sequence of the instance masks on one image
pub type InstanceMasks<'a> = Box<dyn Iterator<Item = Result<InstanceMask>> + 'a>;

/// Source of images and per-instance masks, indexed by sample
pub trait AnnotationStore: Send + Sync {
    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image metadata for the sample at `index`
    ///
    /// # Errors
    /// - `IndexOutOfBounds` when `index >= len()`
    fn image_record(&self, index: usize) -> Result<ImageRecord>;

    /// Instance masks for the sample at `index`, each sized like the image
    ///
    /// Masks are produced on demand while iterating.
    fn instance_masks(&self, index: usize) -> Result<InstanceMasks<'_>>;
}
