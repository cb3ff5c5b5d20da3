//! Aspect-preserving resize, padding and cropping
//!
//! [`resize_image`] computes a [`ResizeGeometry`] from the input size and a
//! [`ResizeConfig`], resamples the image bilinearly and pads or crops it.
//! [`resize_mask`] replays the same geometry on a label mask with
//! nearest-neighbor sampling, so the two outputs stay aligned pixel for pixel.
//!
//! Both resamplers map output pixel centers onto input pixel centers
//! (`src = (dst + 0.5) * in / out - 0.5`), which keeps image and mask on the
//! same sampling grid.

use crate::{
    config::{ResizeConfig, ResizeMode},
    error::{DatasetError, Result},
    utils::NumericValidator,
};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Numeric element type that can be resampled and cast back losslessly in range
pub trait Element: Copy + Default + PartialOrd + Send + Sync + 'static {
    /// Widen to f64 for interpolation
    fn to_f64(self) -> f64;
    /// Narrow back, rounding and saturating for integer types
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_integer_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value.round().clamp(<$t>::MIN as f64, <$t>::MAX as f64) as $t
                }
            }
        )*
    };
}

impl_integer_element!(u8, u16, u32, u64, i8, i16, i32, i64);

impl Element for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Region of the output holding real image content, `[top, bottom) x [left, right)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Window {
    /// Window covering a whole `height x width` image
    #[must_use]
    pub fn full(height: usize, width: usize) -> Self {
        Self {
            top: 0,
            left: 0,
            bottom: height,
            right: width,
        }
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.bottom - self.top
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.right - self.left
    }
}

/// Zero padding added around the scaled image, per spatial axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding {
    /// Split `extra` pixels over both sides, the odd pixel going after
    fn split(extra: usize) -> (usize, usize) {
        let before = extra / 2;
        (before, extra - before)
    }

    /// Center `height x width` inside `target_height x target_width`
    fn centered(height: usize, width: usize, target_height: usize, target_width: usize) -> Self {
        let (top, bottom) = Self::split(target_height.saturating_sub(height));
        let (left, right) = Self::split(target_width.saturating_sub(width));
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }

    /// Padding as `[(top, bottom), (left, right), (0, 0)]`, channel axis last
    #[must_use]
    pub fn as_pairs(&self) -> [(usize, usize); 3] {
        [(self.top, self.bottom), (self.left, self.right), (0, 0)]
    }
}

/// Crop rectangle taken from the scaled image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub y: usize,
    pub x: usize,
    pub height: usize,
    pub width: usize,
}

/// Geometry of one resize operation, shared by an image and its mask
///
/// Either `crop` is set and `padding` is zero, or `crop` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeGeometry {
    /// Uniform scale applied to both spatial axes
    pub scale: f64,
    /// Non-padded region of the output
    pub window: Window,
    /// Zero padding added after scaling
    pub padding: Padding,
    /// Crop taken after scaling
    pub crop: Option<Crop>,
}

impl ResizeGeometry {
    /// Identity geometry for a `height x width` input
    #[must_use]
    pub fn identity(height: usize, width: usize) -> Self {
        Self {
            scale: 1.0,
            window: Window::full(height, width),
            padding: Padding::default(),
            crop: None,
        }
    }

    /// Spatial shape of the transformed output
    #[must_use]
    pub fn output_dims(&self) -> (usize, usize) {
        match self.crop {
            Some(crop) => (crop.height, crop.width),
            None => (
                self.window.bottom + self.padding.bottom,
                self.window.right + self.padding.right,
            ),
        }
    }

    /// Map an output coordinate `(y, x)` back to original image coordinates
    #[must_use]
    pub fn to_original(&self, y: f64, x: f64) -> (f64, f64) {
        let (offset_y, offset_x) = match self.crop {
            Some(crop) => (-(crop.y as f64), -(crop.x as f64)),
            None => (self.window.top as f64, self.window.left as f64),
        };
        ((y - offset_y) / self.scale, (x - offset_x) / self.scale)
    }
}

fn is_unit_scale(scale: f64) -> bool {
    (scale - 1.0).abs() < f64::EPSILON
}

/// Scale factor for a `height x width` image under `config`
///
/// Scales up (never down) until the shorter side reaches `min_dim`, raises the
/// result to `min_scale`, and in square mode caps it so the longer side fits
/// in `max_dim`.
#[must_use]
pub fn compute_scale(height: usize, width: usize, config: &ResizeConfig) -> f64 {
    let mut scale = 1.0_f64;

    if let Some(min_dim) = config.effective_min_dim() {
        let shorter = height.min(width) as f64;
        scale = scale.max(f64::from(min_dim) / shorter);
    }

    if let Some(min_scale) = config.effective_min_scale() {
        if scale < min_scale {
            scale = min_scale;
        }
    }

    if config.mode == ResizeMode::Square {
        if let Some(max_dim) = config.effective_max_dim() {
            let longer = height.max(width) as f64;
            if (longer * scale).round() > f64::from(max_dim) {
                scale = f64::from(max_dim) / longer;
            }
        }
    }

    scale
}

/// Source coordinate of output pixel `dst` along an axis resized `in_len -> out_len`
#[inline]
fn source_coordinate(dst: usize, in_len: usize, out_len: usize) -> f64 {
    (dst as f64 + 0.5) * (in_len as f64 / out_len as f64) - 0.5
}

/// Bilinear (order-1) resample of an `(h, w, c)` array, edges clamped
pub fn resize_bilinear<T: Element>(
    image: ArrayView3<T>,
    out_height: usize,
    out_width: usize,
) -> Array3<T> {
    let (in_height, in_width, channels) = image.dim();
    let mut output = Array3::<T>::default((out_height, out_width, channels));
    if in_height == 0 || in_width == 0 {
        return output;
    }

    let max_y = (in_height - 1) as f64;
    let max_x = (in_width - 1) as f64;

    // Horizontal taps are the same for every row
    let x_taps: Vec<(usize, usize, f64)> = (0..out_width)
        .map(|ox| {
            let sx = source_coordinate(ox, in_width, out_width).clamp(0.0, max_x);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(in_width - 1);
            (x0, x1, sx - x0 as f64)
        })
        .collect();

    for (oy, mut out_row) in output.axis_iter_mut(Axis(0)).enumerate() {
        let sy = source_coordinate(oy, in_height, out_height).clamp(0.0, max_y);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(in_height - 1);
        let wy = sy - y0 as f64;

        let row0 = image.index_axis(Axis(0), y0);
        let row1 = image.index_axis(Axis(0), y1);

        for (&(x0, x1, wx), mut out_pixel) in x_taps.iter().zip(out_row.axis_iter_mut(Axis(0))) {
            for (c, value) in out_pixel.iter_mut().enumerate() {
                let top = row0[[x0, c]].to_f64() * (1.0 - wx) + row0[[x1, c]].to_f64() * wx;
                let bottom = row1[[x0, c]].to_f64() * (1.0 - wx) + row1[[x1, c]].to_f64() * wx;
                *value = T::from_f64(top * (1.0 - wy) + bottom * wy);
            }
        }
    }

    output
}

/// Nearest-neighbor index for output pixel `dst` along an axis resized `in_len -> out_len`
#[inline]
fn nearest_index(dst: usize, in_len: usize, out_len: usize) -> usize {
    let src = ((dst as f64 + 0.5) * (in_len as f64 / out_len as f64)).floor() as usize;
    src.min(in_len - 1)
}

/// Nearest-neighbor (order-0) resample of a 2D array
///
/// Every output value is copied from an input cell, so discrete labels are
/// never blended.
pub fn resize_nearest<T: Element>(
    mask: ArrayView2<T>,
    out_height: usize,
    out_width: usize,
) -> Array2<T> {
    let (in_height, in_width) = mask.dim();
    if in_height == 0 || in_width == 0 {
        return Array2::<T>::default((out_height, out_width));
    }

    let columns: Vec<usize> = (0..out_width)
        .map(|ox| nearest_index(ox, in_width, out_width))
        .collect();

    Array2::from_shape_fn((out_height, out_width), |(oy, ox)| {
        let iy = nearest_index(oy, in_height, out_height);
        mask[[iy, columns[ox]]]
    })
}

fn pad_image<T: Element>(image: ArrayView3<T>, padding: &Padding) -> Result<Array3<T>> {
    let (height, width, channels) = image.dim();
    let out_height = NumericValidator::safe_add_usize(height, padding.top + padding.bottom)?;
    let out_width = NumericValidator::safe_add_usize(width, padding.left + padding.right)?;

    let mut padded = Array3::<T>::default((out_height, out_width, channels));
    padded
        .slice_mut(s![
            padding.top..padding.top + height,
            padding.left..padding.left + width,
            ..
        ])
        .assign(&image);
    Ok(padded)
}

fn pad_mask<T: Element>(mask: ArrayView2<T>, padding: &Padding) -> Result<Array2<T>> {
    let (height, width) = mask.dim();
    let out_height = NumericValidator::safe_add_usize(height, padding.top + padding.bottom)?;
    let out_width = NumericValidator::safe_add_usize(width, padding.left + padding.right)?;

    let mut padded = Array2::<T>::default((out_height, out_width));
    padded
        .slice_mut(s![
            padding.top..padding.top + height,
            padding.left..padding.left + width
        ])
        .assign(&mask);
    Ok(padded)
}

/// Next multiple of 64 at or above `len`
fn next_multiple_of_64(len: usize) -> usize {
    match len % 64 {
        0 => len,
        rem => len - rem + 64,
    }
}

/// Resize an `(h, w, c)` image keeping its aspect ratio
///
/// Returns the transformed image, in the input's element type, and the
/// geometry needed to transform the matching mask with [`resize_mask`].
/// `rng` is only consumed in crop mode.
///
/// # Errors
/// - mode preconditions from [`ResizeConfig::validate`]
/// - an empty input or a scale that collapses an axis
/// - crop mode on a scaled image smaller than the crop window
pub fn resize_image<T, R>(
    image: ArrayView3<T>,
    config: &ResizeConfig,
    rng: &mut R,
) -> Result<(Array3<T>, ResizeGeometry)>
where
    T: Element,
    R: Rng + ?Sized,
{
    let (height, width, _) = image.dim();
    let mut geometry = ResizeGeometry::identity(height, width);

    if config.mode == ResizeMode::None {
        return Ok((image.to_owned(), geometry));
    }

    config.validate()?;
    if height == 0 || width == 0 {
        return Err(DatasetError::processing_stage_error(
            "resize",
            "image has an empty spatial axis",
            Some(&format!("{}x{}", height, width)),
        ));
    }

    let scale = compute_scale(height, width, config);
    geometry.scale = scale;

    let scaled = if is_unit_scale(scale) {
        image.to_owned()
    } else {
        let out_height = NumericValidator::validate_scaled_dim(height, scale)?;
        let out_width = NumericValidator::validate_scaled_dim(width, scale)?;
        resize_bilinear(image, out_height, out_width)
    };
    let (scaled_height, scaled_width, _) = scaled.dim();

    trace!(
        mode = %config.mode,
        scale,
        from = ?(height, width),
        to = ?(scaled_height, scaled_width),
        "Resized image"
    );

    let output = match config.mode {
        ResizeMode::None => unreachable!("identity mode returns early"),
        ResizeMode::Square => {
            let max_dim = config
                .effective_max_dim()
                .ok_or_else(|| DatasetError::invalid_config("Square mode requires max_dim"))?
                as usize;
            let padding = Padding::centered(scaled_height, scaled_width, max_dim, max_dim);
            geometry.padding = padding;
            geometry.window = Window {
                top: padding.top,
                left: padding.left,
                bottom: scaled_height + padding.top,
                right: scaled_width + padding.left,
            };
            pad_image(scaled.view(), &padding)?
        },
        ResizeMode::Pad64 => {
            let padding = Padding::centered(
                scaled_height,
                scaled_width,
                next_multiple_of_64(scaled_height),
                next_multiple_of_64(scaled_width),
            );
            geometry.padding = padding;
            geometry.window = Window {
                top: padding.top,
                left: padding.left,
                bottom: scaled_height + padding.top,
                right: scaled_width + padding.left,
            };
            pad_image(scaled.view(), &padding)?
        },
        ResizeMode::Crop => {
            let min_dim = config
                .effective_min_dim()
                .ok_or_else(|| DatasetError::invalid_config("Crop mode requires min_dim"))?
                as usize;
            if scaled_height < min_dim || scaled_width < min_dim {
                return Err(DatasetError::invalid_config(format!(
                    "Scaled image {}x{} is smaller than the {}x{} crop",
                    scaled_height, scaled_width, min_dim, min_dim
                )));
            }
            let y = rng.gen_range(0..=scaled_height - min_dim);
            let x = rng.gen_range(0..=scaled_width - min_dim);
            geometry.crop = Some(Crop {
                y,
                x,
                height: min_dim,
                width: min_dim,
            });
            geometry.window = Window::full(min_dim, min_dim);
            scaled.slice(s![y..y + min_dim, x..x + min_dim, ..]).to_owned()
        },
    };

    Ok((output, geometry))
}

/// Resize a single-channel `(h, w)` image, see [`resize_image`]
pub fn resize_image_2d<T, R>(
    image: ArrayView2<T>,
    config: &ResizeConfig,
    rng: &mut R,
) -> Result<(Array2<T>, ResizeGeometry)>
where
    T: Element,
    R: Rng + ?Sized,
{
    let (resized, geometry) = resize_image(image.insert_axis(Axis(2)), config, rng)?;
    Ok((resized.remove_axis(Axis(2)), geometry))
}

/// Resize a mask with the geometry computed for its image
///
/// Scales with nearest-neighbor sampling, then crops or zero-pads exactly as
/// [`resize_image`] did. The result has the same spatial shape as the
/// transformed image.
pub fn resize_mask<T: Element>(mask: ArrayView2<T>, geometry: &ResizeGeometry) -> Result<Array2<T>> {
    let (height, width) = mask.dim();

    let scaled = if is_unit_scale(geometry.scale) {
        mask.to_owned()
    } else {
        let out_height = NumericValidator::validate_scaled_dim(height, geometry.scale)?;
        let out_width = NumericValidator::validate_scaled_dim(width, geometry.scale)?;
        resize_nearest(mask, out_height, out_width)
    };

    match geometry.crop {
        Some(crop) => {
            let (scaled_height, scaled_width) = scaled.dim();
            if crop.y + crop.height > scaled_height || crop.x + crop.width > scaled_width {
                return Err(DatasetError::processing_stage_error(
                    "mask crop",
                    &format!(
                        "crop {}x{} at ({}, {}) exceeds the scaled mask",
                        crop.height, crop.width, crop.y, crop.x
                    ),
                    Some(&format!("{}x{}", scaled_height, scaled_width)),
                ));
            }
            Ok(scaled
                .slice(s![crop.y..crop.y + crop.height, crop.x..crop.x + crop.width])
                .to_owned())
        },
        None => pad_mask(scaled.view(), &geometry.padding),
    }
}
