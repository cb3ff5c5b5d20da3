//! COCO JSON annotation store

use super::{
    mask::{polygons_to_mask, Rle},
    AnnotationStore, InstanceMasks,
};
use crate::{
    error::{DatasetError, Result},
    types::{ImageRecord, InstanceMask},
};
use ndarray::Array2;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
};
use tracing::{debug, warn};

/// Top-level COCO annotation file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(default)]
    pub images: Vec<CocoImage>,
    #[serde(default)]
    pub annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    pub categories: Vec<CocoCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoAnnotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default, deserialize_with = "deserialize_iscrowd")]
    pub iscrowd: bool,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: Option<String>,
}

/// Segmentation payload of one annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// One or more flat `[x, y, x, y, ...]` outlines
    Polygons(Vec<Vec<f64>>),
    /// RLE with counts packed into a string
    CompressedRle { size: [u32; 2], counts: String },
    /// RLE with explicit counts
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IsCrowd {
        Bool(bool),
        Int(u8),
    }
    match IsCrowd::deserialize(deserializer)? {
        IsCrowd::Bool(b) => Ok(b),
        IsCrowd::Int(i) => Ok(i != 0),
    }
}

impl Segmentation {
    /// Rasterize onto an image of the given size
    pub fn to_mask(&self, height: usize, width: usize) -> Result<Array2<u8>> {
        match self {
            Self::Polygons(polygons) => Ok(polygons_to_mask(polygons, height, width)),
            Self::CompressedRle { size, counts } => {
                check_rle_size(*size, height, width)?;
                Rle::from_compressed(height, width, counts)?.decode()
            },
            Self::UncompressedRle { size, counts } => {
                check_rle_size(*size, height, width)?;
                Rle::from_counts(height, width, counts.clone()).decode()
            },
        }
    }
}

fn check_rle_size(size: [u32; 2], height: usize, width: usize) -> Result<()> {
    if size[0] as usize != height || size[1] as usize != width {
        return Err(DatasetError::annotation(format!(
            "RLE size {}x{} does not match image size {}x{}",
            size[0], size[1], height, width
        )));
    }
    Ok(())
}

/// Annotation store backed by a parsed COCO file
///
/// Samples are indexed in the order images appear in the file. Only
/// annotations whose category is listed under `categories` are returned,
/// unless the file lists no categories at all.
#[derive(Debug, Clone)]
pub struct CocoAnnotationStore {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
    by_image: HashMap<u64, Vec<usize>>,
}

impl CocoAnnotationStore {
    /// Load and index a COCO JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| DatasetError::file_io_error("read annotations", path, &e))?;
        let store = Self::from_json_str(&contents)?;
        debug!(
            path = %path.display(),
            images = store.images.len(),
            annotations = store.annotations.len(),
            categories = store.categories.len(),
            "Loaded COCO annotations"
        );
        Ok(store)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let dataset: CocoDataset = serde_json::from_str(json)?;
        Ok(Self::from_dataset(dataset))
    }

    /// Index an already parsed dataset
    #[must_use]
    pub fn from_dataset(dataset: CocoDataset) -> Self {
        let CocoDataset {
            images,
            annotations,
            categories,
        } = dataset;

        let category_ids: BTreeSet<u64> = categories.iter().map(|c| c.id).collect();
        let known_images: BTreeSet<u64> = images.iter().map(|i| i.id).collect();

        let mut by_image: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut skipped = 0_usize;
        for (position, annotation) in annotations.iter().enumerate() {
            if !category_ids.is_empty() && !category_ids.contains(&annotation.category_id) {
                skipped += 1;
                continue;
            }
            if !known_images.contains(&annotation.image_id) {
                skipped += 1;
                continue;
            }
            by_image.entry(annotation.image_id).or_default().push(position);
        }
        if skipped > 0 {
            warn!(skipped, "Ignoring annotations with unknown image or category");
        }

        Self {
            images,
            annotations,
            categories,
            by_image,
        }
    }

    #[must_use]
    pub fn categories(&self) -> &[CocoCategory] {
        &self.categories
    }

    /// Name of a category id, if the file declares it
    #[must_use]
    pub fn category_name(&self, category_id: u64) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| c.name.as_str())
    }

    /// Annotations attached to the image at `index`
    pub fn annotations_for(&self, index: usize) -> Result<Vec<&CocoAnnotation>> {
        let image = self.image(index)?;
        Ok(self
            .by_image
            .get(&image.id)
            .map(|positions| positions.iter().map(|&p| &self.annotations[p]).collect())
            .unwrap_or_default())
    }

    fn image(&self, index: usize) -> Result<&CocoImage> {
        self.images
            .get(index)
            .ok_or_else(|| DatasetError::index_out_of_bounds(index, self.images.len()))
    }
}

impl AnnotationStore for CocoAnnotationStore {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn image_record(&self, index: usize) -> Result<ImageRecord> {
        let image = self.image(index)?;
        Ok(ImageRecord {
            id: image.id,
            file_name: image.file_name.clone(),
            height: image.height as usize,
            width: image.width as usize,
        })
    }

    fn instance_masks(&self, index: usize) -> Result<InstanceMasks<'_>> {
        let image = self.image(index)?;
        let (height, width) = (image.height as usize, image.width as usize);
        let annotations = self.annotations_for(index)?;

        Ok(Box::new(annotations.into_iter().map(move |annotation| -> Result<InstanceMask> {
            let segmentation = annotation.segmentation.as_ref().ok_or_else(|| {
                DatasetError::annotation(format!(
                    "Annotation {} has no segmentation",
                    annotation.id
                ))
            })?;
            Ok(InstanceMask {
                annotation_id: annotation.id,
                category_id: annotation.category_id,
                mask: segmentation.to_mask(height, width)?,
            })
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "images": [
            {"id": 7, "file_name": "b.png", "height": 4, "width": 5},
            {"id": 3, "file_name": "a.png", "height": 2, "width": 2}
        ],
        "annotations": [
            {"id": 1, "image_id": 7, "category_id": 1,
             "segmentation": [[1, 1, 4, 1, 4, 3, 1, 3]], "iscrowd": 0},
            {"id": 2, "image_id": 7, "category_id": 2,
             "segmentation": {"size": [4, 5], "counts": [4, 4, 12]}, "iscrowd": 1},
            {"id": 3, "image_id": 3, "category_id": 2,
             "segmentation": {"size": [2, 2], "counts": "12"}, "iscrowd": true},
            {"id": 4, "image_id": 7, "category_id": 9,
             "segmentation": [[0, 0, 5, 0, 5, 4, 0, 4]]}
        ],
        "categories": [
            {"id": 1, "name": "PERM"},
            {"id": 2, "name": "PRIM", "supercategory": "dent"}
        ]
    }"#;

    #[test]
    fn test_image_order_and_records() {
        let store = CocoAnnotationStore::from_json_str(SAMPLE).unwrap();
        assert_eq!(store.len(), 2);
        let first = store.image_record(0).unwrap();
        assert_eq!(first.id, 7);
        assert_eq!(first.file_name, "b.png");
        assert_eq!((first.height, first.width), (4, 5));
        assert_eq!(store.image_record(1).unwrap().id, 3);
    }

    #[test]
    fn test_out_of_bounds() {
        let store = CocoAnnotationStore::from_json_str(SAMPLE).unwrap();
        assert!(matches!(
            store.image_record(2),
            Err(DatasetError::IndexOutOfBounds { index: 2, len: 2 })
        ));
        assert!(store.instance_masks(5).is_err());
    }

    #[test]
    fn test_unknown_category_is_filtered() {
        let store = CocoAnnotationStore::from_json_str(SAMPLE).unwrap();
        let ids: Vec<u64> = store
            .annotations_for(0)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_no_categories_keeps_everything() {
        let json = r#"{
            "images": [{"id": 1, "file_name": "x.png", "height": 2, "width": 2}],
            "annotations": [{"id": 5, "image_id": 1, "category_id": 42,
                             "segmentation": {"size": [2, 2], "counts": [0, 4]}}]
        }"#;
        let store = CocoAnnotationStore::from_json_str(json).unwrap();
        let masks: Vec<InstanceMask> = store
            .instance_masks(0)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].category_id, 42);
        assert_eq!(masks[0].area(), 4);
    }

    #[test]
    fn test_instance_masks_rasterize_every_format() {
        let store = CocoAnnotationStore::from_json_str(SAMPLE).unwrap();

        let masks: Vec<InstanceMask> = store
            .instance_masks(0)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(masks.len(), 2);
        assert_eq!(masks[0].mask.dim(), (4, 5));
        assert_eq!(masks[0].area(), 6);
        // Column 1 fully set from the uncompressed RLE
        assert_eq!(masks[1].area(), 4);
        assert!(masks[1].mask.column(1).iter().all(|&v| v == 1));

        let masks: Vec<InstanceMask> = store
            .instance_masks(1)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        // "12" decodes to counts [1, 2]
        assert_eq!(masks[0].area(), 2);
        assert_eq!(masks[0].mask[[1, 0]], 1);
        assert_eq!(masks[0].mask[[0, 1]], 1);
    }

    #[test]
    fn test_rle_size_mismatch() {
        let segmentation = Segmentation::UncompressedRle {
            size: [3, 3],
            counts: vec![9],
        };
        assert!(matches!(
            segmentation.to_mask(4, 4),
            Err(DatasetError::Annotation(_))
        ));
    }

    #[test]
    fn test_missing_segmentation() {
        let json = r#"{
            "images": [{"id": 1, "file_name": "x.png", "height": 2, "width": 2}],
            "annotations": [{"id": 5, "image_id": 1, "category_id": 1}],
            "categories": [{"id": 1, "name": "PERM"}]
        }"#;
        let store = CocoAnnotationStore::from_json_str(json).unwrap();
        let first = store.instance_masks(0).unwrap().next().unwrap();
        assert!(matches!(first, Err(DatasetError::Annotation(_))));
    }

    #[test]
    fn test_category_names() {
        let store = CocoAnnotationStore::from_json_str(SAMPLE).unwrap();
        assert_eq!(store.category_name(2), Some("PRIM"));
        assert_eq!(store.category_name(9), None);
        assert_eq!(store.categories()[1].supercategory.as_deref(), Some("dent"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            CocoAnnotationStore::from_json_str("{not json"),
            Err(DatasetError::Json(_))
        ));
    }
}
