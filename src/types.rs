//! Core types shared by the annotation store and the sample provider

use crate::{
    error::{DatasetError, Result},
    geometry::ResizeGeometry,
    transforms::Normalization,
};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Image metadata resolved from the annotation store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Image id in the annotation file
    pub id: u64,
    /// File name relative to the image directory
    pub file_name: String,
    /// Height in pixels as recorded in the annotations
    pub height: usize,
    /// Width in pixels as recorded in the annotations
    pub width: usize,
}

/// Binary mask of one annotated object
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMask {
    /// Annotation id the mask was rasterized from
    pub annotation_id: u64,
    /// Semantic category of the instance
    pub category_id: u64,
    /// `(height, width)` mask, non-zero where the instance is present
    pub mask: Array2<u8>,
}

impl InstanceMask {
    /// Number of pixels covered by the instance
    #[must_use]
    pub fn area(&self) -> usize {
        self.mask.iter().filter(|&&v| v != 0).count()
    }
}

/// One resolved dataset sample
#[derive(Debug, Clone)]
pub struct Sample {
    /// Index the sample was resolved from
    pub index: usize,
    /// Image id in the annotation store
    pub image_id: u64,
    /// Channel-first `(3, height, width)` image
    pub image: Array3<u8>,
    /// `(height, width)` label map, 0 for background
    pub label_map: Array2<u32>,
    /// Geometry applied to both image and label map
    pub geometry: ResizeGeometry,
}

impl Sample {
    /// Spatial `(height, width)` of the sample
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        self.label_map.dim()
    }

    /// Pixel count per label value
    #[must_use]
    pub fn label_histogram(&self) -> BTreeMap<u32, usize> {
        let mut histogram = BTreeMap::new();
        for &label in &self.label_map {
            *histogram.entry(label).or_insert(0) += 1;
        }
        histogram
    }

    /// Image as a normalized `f32` tensor, channel first
    pub fn normalized(&self, normalization: &Normalization) -> Result<Array3<f32>> {
        normalization.apply(self.image.view())
    }

    /// Check that image and label map share their spatial shape
    pub fn validate(&self) -> Result<()> {
        let (_, height, width) = self.image.dim();
        if (height, width) != self.label_map.dim() {
            return Err(DatasetError::processing_stage_error(
                "sample",
                &format!(
                    "label map {:?} does not match image {}x{}",
                    self.label_map.dim(),
                    height,
                    width
                ),
                Some(&format!("index {}", self.index)),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample(label_map: Array2<u32>, height: usize, width: usize) -> Sample {
        Sample {
            index: 0,
            image_id: 1,
            image: Array3::zeros((3, height, width)),
            label_map,
            geometry: ResizeGeometry::identity(height, width),
        }
    }

    #[test]
    fn test_label_histogram() {
        let sample = sample(array![[0, 0, 2], [3, 3, 3]], 2, 3);
        let histogram = sample.label_histogram();
        assert_eq!(histogram.get(&0), Some(&2));
        assert_eq!(histogram.get(&2), Some(&1));
        assert_eq!(histogram.get(&3), Some(&3));
        assert_eq!(histogram.len(), 3);
    }

    #[test]
    fn test_validate_shapes() {
        assert!(sample(Array2::zeros((4, 5)), 4, 5).validate().is_ok());
        assert!(sample(Array2::zeros((4, 4)), 4, 5).validate().is_err());
    }

    #[test]
    fn test_instance_area() {
        let instance = InstanceMask {
            annotation_id: 1,
            category_id: 2,
            mask: array![[0, 1, 1], [0, 0, 1]],
        };
        assert_eq!(instance.area(), 3);
    }
}
