//! Image I/O operations service
//!
//! Loading, array conversion and PNG export of images and label maps, kept
//! apart from the resize and labeling logic.

use crate::error::{DatasetError, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};
use std::path::Path;
use tracing::debug;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Decodes by extension first and falls back to sniffing the content.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use coco_seg_dataset::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("PERM/0001.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(DatasetError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        if Self::is_supported_format(path_ref) {
            match image::open(path_ref) {
                Ok(img) => return Ok(img),
                Err(e) => debug!(
                    path = %path_ref.display(),
                    error = %e,
                    "Extension-based loading failed, attempting content-based detection"
                ),
            }
        }

        let data = std::fs::read(path_ref)
            .map_err(|io_err| DatasetError::file_io_error("read image data", path_ref, &io_err))?;

        image::load_from_memory(&data)
            .map_err(|content_err| DatasetError::image_load_error(path_ref, &content_err))
    }

    /// Whether the file extension is one the enabled decoders handle
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| match ext.to_lowercase().as_str() {
                "jpg" | "jpeg" | "png" | "tiff" | "tif" | "bmp" => true,
                "webp" => cfg!(feature = "webp-support"),
                _ => false,
            })
    }

    /// Convert any image to a `(height, width, 3)` RGB array
    pub fn to_rgb_array(image: &DynamicImage) -> Result<Array3<u8>> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Array3::from_shape_vec(
            (height as usize, width as usize, 3),
            rgb.into_raw(),
        )?)
    }

    /// Load a file straight into a `(height, width, 3)` RGB array
    pub fn load_rgb_array<P: AsRef<Path>>(path: P) -> Result<Array3<u8>> {
        let image = Self::load_image(path)?;
        Self::to_rgb_array(&image)
    }

    /// Write a `(height, width, 3)` array as an image, format from the extension
    pub fn save_rgb_array<P: AsRef<Path>>(array: ArrayView3<u8>, path: P) -> Result<()> {
        let (height, width, channels) = array.dim();
        if channels != 3 {
            return Err(DatasetError::processing_stage_error(
                "image save",
                &format!("expected 3 channels, got {}", channels),
                Some(&format!("path: {}", path.as_ref().display())),
            ));
        }
        let raw: Vec<u8> = array.iter().copied().collect();
        let image = RgbImage::from_raw(to_u32(width)?, to_u32(height)?, raw).ok_or_else(|| {
            DatasetError::processing("RGB buffer does not match the image dimensions")
        })?;
        Self::save(&DynamicImage::ImageRgb8(image), path.as_ref())
    }

    /// Write a channel-first `(3, height, width)` array as an image
    pub fn save_chw_array<P: AsRef<Path>>(array: ArrayView3<u8>, path: P) -> Result<()> {
        Self::save_rgb_array(array.permuted_axes([1, 2, 0]), path)
    }

    /// Write a label map as an 8-bit grayscale image
    ///
    /// With `stretch`, labels are spread over `0..=255` so classes are visible;
    /// otherwise they are written as-is. Labels above 255 are an error either
    /// way.
    pub fn save_label_map<P: AsRef<Path>>(
        label_map: ArrayView2<u32>,
        path: P,
        stretch: bool,
    ) -> Result<()> {
        let max_label = label_map.iter().copied().max().unwrap_or(0);
        if max_label > u32::from(u8::MAX) {
            return Err(DatasetError::processing_stage_error(
                "label map save",
                &format!("label {} does not fit in 8 bits", max_label),
                Some(&format!("path: {}", path.as_ref().display())),
            ));
        }

        let factor = if stretch && max_label > 0 {
            u32::from(u8::MAX) / max_label
        } else {
            1
        };
        let pixels: Array2<u8> = label_map.mapv(|v| u8::try_from(v * factor).unwrap_or(u8::MAX));
        let (height, width) = pixels.dim();
        let raw: Vec<u8> = pixels.iter().copied().collect();
        let image = GrayImage::from_raw(to_u32(width)?, to_u32(height)?, raw).ok_or_else(|| {
            DatasetError::processing("Label buffer does not match the map dimensions")
        })?;
        Self::save(&DynamicImage::ImageLuma8(image), path.as_ref())
    }

    fn save(image: &DynamicImage, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatasetError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }
        image.save(path).map_err(|e| {
            DatasetError::processing_stage_error(
                "image save",
                &e.to_string(),
                Some(&format!("path: {}", path.display())),
            )
        })?;
        debug!(path = %path.display(), "Saved image");
        Ok(())
    }
}

fn to_u32(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| DatasetError::processing(format!("Dimension {} exceeds u32", len)))
}
