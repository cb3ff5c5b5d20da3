//! Post-transforms applied to finished samples, and tensor normalization

use crate::{
    error::{DatasetError, Result},
    utils::NumericValidator,
};
use ndarray::{Array2, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Transform applied to a sample after resizing
///
/// Image arrays are channel first `(C, H, W)`, label maps `(H, W)`. An
/// implementation that moves pixels must move image and label map alike.
pub trait PostTransform: Send + Sync {
    fn apply_image(&self, image: Array3<u8>) -> Result<Array3<u8>>;

    fn apply_label_map(&self, label_map: Array2<u32>) -> Result<Array2<u32>>;
}

/// Mirror image and label map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    Horizontal,
    Vertical,
}

impl Flip {
    fn spatial_axis(self) -> usize {
        match self {
            Self::Vertical => 0,
            Self::Horizontal => 1,
        }
    }
}

impl PostTransform for Flip {
    fn apply_image(&self, mut image: Array3<u8>) -> Result<Array3<u8>> {
        image.invert_axis(Axis(self.spatial_axis() + 1));
        Ok(image.as_standard_layout().into_owned())
    }

    fn apply_label_map(&self, mut label_map: Array2<u32>) -> Result<Array2<u32>> {
        label_map.invert_axis(Axis(self.spatial_axis()));
        Ok(label_map.as_standard_layout().into_owned())
    }
}

/// Transforms run one after another
#[derive(Default)]
pub struct Compose {
    transforms: Vec<Box<dyn PostTransform>>,
}

impl Compose {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then<T: PostTransform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl PostTransform for Compose {
    fn apply_image(&self, image: Array3<u8>) -> Result<Array3<u8>> {
        self.transforms
            .iter()
            .try_fold(image, |image, t| t.apply_image(image))
    }

    fn apply_label_map(&self, label_map: Array2<u32>) -> Result<Array2<u32>> {
        self.transforms
            .iter()
            .try_fold(label_map, |label_map, t| t.apply_label_map(label_map))
    }
}

/// Post-transform from a pair of closures
pub struct MapTransform<F, G> {
    image_fn: F,
    label_fn: G,
}

impl<F, G> MapTransform<F, G>
where
    F: Fn(Array3<u8>) -> Result<Array3<u8>> + Send + Sync,
    G: Fn(Array2<u32>) -> Result<Array2<u32>> + Send + Sync,
{
    pub fn new(image_fn: F, label_fn: G) -> Self {
        Self { image_fn, label_fn }
    }
}

impl<F, G> PostTransform for MapTransform<F, G>
where
    F: Fn(Array3<u8>) -> Result<Array3<u8>> + Send + Sync,
    G: Fn(Array2<u32>) -> Result<Array2<u32>> + Send + Sync,
{
    fn apply_image(&self, image: Array3<u8>) -> Result<Array3<u8>> {
        (self.image_fn)(image)
    }

    fn apply_label_map(&self, label_map: Array2<u32>) -> Result<Array2<u32>> {
        (self.label_fn)(label_map)
    }
}

/// Per-channel mean/std normalization of `[0, 1]` scaled pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl Normalization {
    /// ImageNet statistics
    #[must_use]
    pub fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    pub fn validate(&self) -> Result<()> {
        NumericValidator::validate_normalization_params(&self.mean, &self.std, 3)
    }

    /// Normalize a channel-first `(3, H, W)` image
    pub fn apply(&self, image: ArrayView3<u8>) -> Result<Array3<f32>> {
        self.validate()?;
        let channels = image.len_of(Axis(0));
        if channels != 3 {
            return Err(DatasetError::processing_stage_error(
                "normalize",
                &format!("expected 3 channels, got {}", channels),
                Some(&format!("shape {:?}", image.dim())),
            ));
        }

        let mut tensor = image.mapv(|v| f32::from(v) / 255.0);
        for (c, mut channel) in tensor.axis_iter_mut(Axis(0)).enumerate() {
            let (mean, std) = (self.mean[c], self.std[c]);
            channel.mapv_inplace(|v| (v - mean) / std);
        }
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn chw() -> Array3<u8> {
        // 3 channels, 2x2, distinct values per position
        Array3::from_shape_fn((3, 2, 2), |(c, y, x)| (c * 100 + y * 10 + x) as u8)
    }

    #[test]
    fn test_flip_horizontal() {
        let flipped = Flip::Horizontal.apply_image(chw()).unwrap();
        assert_eq!(flipped[[0, 0, 0]], 1);
        assert_eq!(flipped[[2, 1, 1]], 210);

        let labels = Flip::Horizontal
            .apply_label_map(array![[1_u32, 2], [3, 4]])
            .unwrap();
        assert_eq!(labels, array![[2_u32, 1], [4, 3]]);
    }

    #[test]
    fn test_flip_vertical() {
        let flipped = Flip::Vertical.apply_image(chw()).unwrap();
        assert_eq!(flipped[[1, 0, 1]], 111);

        let labels = Flip::Vertical
            .apply_label_map(array![[1_u32, 2], [3, 4]])
            .unwrap();
        assert_eq!(labels, array![[3_u32, 4], [1, 2]]);
    }

    #[test]
    fn test_compose_runs_in_order() {
        let both = Compose::new().then(Flip::Horizontal).then(Flip::Vertical);
        assert_eq!(both.len(), 2);
        let labels = both.apply_label_map(array![[1_u32, 2], [3, 4]]).unwrap();
        assert_eq!(labels, array![[4_u32, 3], [2, 1]]);

        let empty = Compose::new();
        assert!(empty.is_empty());
        assert_eq!(empty.apply_image(chw()).unwrap(), chw());
    }

    #[test]
    fn test_map_transform() {
        let transform = MapTransform::new(
            |image: Array3<u8>| Ok(image.mapv(|v| v.saturating_add(1))),
            |labels: Array2<u32>| Ok(labels.mapv(|v| v * 10)),
        );
        assert_eq!(transform.apply_image(chw()).unwrap()[[0, 0, 0]], 1);
        assert_eq!(
            transform.apply_label_map(array![[1_u32]]).unwrap(),
            array![[10_u32]]
        );
    }

    #[test]
    fn test_normalization_values() {
        let normalization = Normalization {
            mean: [0.5, 0.0, 0.0],
            std: [0.5, 1.0, 2.0],
        };
        let image = Array3::from_elem((3, 1, 1), 255_u8);
        let tensor = normalization.apply(image.view()).unwrap();
        assert!((tensor[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[1, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[2, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_normalization_rejects_bad_input() {
        let image = Array3::<u8>::zeros((1, 2, 2));
        assert!(Normalization::imagenet().apply(image.view()).is_err());

        let bad = Normalization {
            mean: [0.0; 3],
            std: [0.0, 1.0, 1.0],
        };
        assert!(matches!(bad.validate(), Err(DatasetError::InvalidConfig(_))));
    }
}
