//! Annotation store over masks held in memory

use super::{AnnotationStore, InstanceMasks};
use crate::{
    error::{DatasetError, Result},
    types::{ImageRecord, InstanceMask},
};

/// Store built from records and masks already in memory
///
/// Useful for synthetic data and for driving the sample provider without a
/// COCO file.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnnotationStore {
    entries: Vec<(ImageRecord, Vec<InstanceMask>)>,
}

impl InMemoryAnnotationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an image with its instances
    ///
    /// Every mask must match the recorded image size.
    pub fn push(&mut self, record: ImageRecord, instances: Vec<InstanceMask>) -> Result<()> {
        if let Some(bad) = instances
            .iter()
            .find(|i| i.mask.dim() != (record.height, record.width))
        {
            return Err(DatasetError::annotation(format!(
                "Mask of annotation {} is {:?}, image {} is {}x{}",
                bad.annotation_id,
                bad.mask.dim(),
                record.id,
                record.height,
                record.width
            )));
        }
        self.entries.push((record, instances));
        Ok(())
    }

    fn entry(&self, index: usize) -> Result<&(ImageRecord, Vec<InstanceMask>)> {
        self.entries
            .get(index)
            .ok_or_else(|| DatasetError::index_out_of_bounds(index, self.entries.len()))
    }
}

impl AnnotationStore for InMemoryAnnotationStore {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn image_record(&self, index: usize) -> Result<ImageRecord> {
        Ok(self.entry(index)?.0.clone())
    }

    fn instance_masks(&self, index: usize) -> Result<InstanceMasks<'_>> {
        let (_, instances) = self.entry(index)?;
        Ok(Box::new(instances.iter().cloned().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn record(id: u64) -> ImageRecord {
        ImageRecord {
            id,
            file_name: format!("{}.png", id),
            height: 3,
            width: 4,
        }
    }

    #[test]
    fn test_push_and_read_back() {
        let mut store = InMemoryAnnotationStore::new();
        assert!(store.is_empty());
        store
            .push(
                record(1),
                vec![InstanceMask {
                    annotation_id: 10,
                    category_id: 2,
                    mask: Array2::ones((3, 4)),
                }],
            )
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.image_record(0).unwrap().file_name, "1.png");
        let masks: Vec<_> = store.instance_masks(0).unwrap().collect();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].as_ref().unwrap().area(), 12);
        assert!(store.image_record(1).is_err());
    }

    #[test]
    fn test_push_rejects_mismatched_mask() {
        let mut store = InMemoryAnnotationStore::new();
        let result = store.push(
            record(1),
            vec![InstanceMask {
                annotation_id: 10,
                category_id: 2,
                mask: Array2::ones((4, 4)),
            }],
        );
        assert!(matches!(result, Err(DatasetError::Annotation(_))));
        assert!(store.is_empty());
    }
}
