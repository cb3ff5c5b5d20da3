//! COCO mask rasterization: run-length encodings and polygons
//!
//! RLE counts are column-major runs alternating between 0s and 1s, starting
//! with 0s. Decoded masks are returned as `(height, width)` arrays.

use crate::error::{DatasetError, Result};
use ndarray::{Array2, ShapeBuilder};

/// Run-length encoded binary mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rle {
    pub height: usize,
    pub width: usize,
    /// Alternating runs of 0s and 1s, starting with 0s, in column-major order
    pub counts: Vec<u32>,
}

impl Rle {
    /// RLE from an uncompressed count list
    #[must_use]
    pub fn from_counts(height: usize, width: usize, counts: Vec<u32>) -> Self {
        Self {
            height,
            width,
            counts,
        }
    }

    /// RLE from the compressed COCO string form
    ///
    /// Each count is stored in 5-bit groups offset by 48, bit 5 flagging a
    /// continuation and bit 4 of the last group carrying the sign. From the
    /// fourth count on, values are deltas against the count two positions back.
    pub fn from_compressed(height: usize, width: usize, encoded: &str) -> Result<Self> {
        let mut counts: Vec<u32> = Vec::new();
        let mut bytes = encoded.bytes();

        while let Some(first) = bytes.next() {
            let mut value: i64 = 0;
            let mut shift = 0_u32;
            let mut byte = first;
            loop {
                let group = i64::from(byte.checked_sub(48).filter(|&c| c < 64).ok_or_else(|| {
                    DatasetError::annotation(format!(
                        "Invalid character {:?} in compressed RLE",
                        char::from(byte)
                    ))
                })?);
                if shift > 58 {
                    return Err(DatasetError::annotation("Compressed RLE count overflows"));
                }
                value |= (group & 0x1f) << shift;
                shift += 5;

                if group & 0x20 == 0 {
                    if group & 0x10 != 0 {
                        value |= -1_i64 << shift;
                    }
                    break;
                }

                byte = bytes.next().ok_or_else(|| {
                    DatasetError::annotation("Compressed RLE ends inside a count")
                })?;
            }

            if counts.len() > 2 {
                value += i64::from(counts[counts.len() - 2]);
            }
            let count = u32::try_from(value).map_err(|_| {
                DatasetError::annotation(format!("Compressed RLE decodes to invalid count {}", value))
            })?;
            counts.push(count);
        }

        Ok(Self::from_counts(height, width, counts))
    }

    /// Number of foreground pixels
    #[must_use]
    pub fn area(&self) -> u64 {
        self.counts
            .iter()
            .skip(1)
            .step_by(2)
            .map(|&c| u64::from(c))
            .sum()
    }

    /// Decode into a `(height, width)` mask of 0s and 1s
    ///
    /// Runs longer than the mask are an error; runs that stop early leave the
    /// remainder as background.
    pub fn decode(&self) -> Result<Array2<u8>> {
        let total = self.height * self.width;
        let covered: u64 = self.counts.iter().map(|&c| u64::from(c)).sum();
        if covered > total as u64 {
            return Err(DatasetError::annotation(format!(
                "RLE covers {} pixels but the mask has {}x{} = {}",
                covered, self.height, self.width, total
            )));
        }

        let mut data = vec![0_u8; total];
        let mut position = 0_usize;
        for (run, &count) in self.counts.iter().enumerate() {
            let end = position + count as usize;
            if run % 2 == 1 {
                data[position..end].fill(1);
            }
            position = end;
        }

        Ok(Array2::from_shape_vec((self.height, self.width).f(), data)?)
    }
}

/// Fill a polygon given as flat `[x0, y0, x1, y1, ...]` coordinates
///
/// A pixel is set when its center lies inside the polygon (even-odd rule).
/// Polygons with fewer than three vertices draw nothing.
pub fn fill_polygon(mask: &mut Array2<u8>, xy: &[f64]) {
    let points: Vec<(f64, f64)> = xy.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    if points.len() < 3 {
        return;
    }

    let (height, width) = mask.dim();
    let mut crossings: Vec<f64> = Vec::with_capacity(points.len());

    for row in 0..height {
        let center_y = row as f64 + 0.5;
        crossings.clear();

        for (i, &(x0, y0)) in points.iter().enumerate() {
            let (x1, y1) = points[(i + 1) % points.len()];
            if (y0 <= center_y && center_y < y1) || (y1 <= center_y && center_y < y0) {
                let t = (center_y - y0) / (y1 - y0);
                crossings.push(x0 + t * (x1 - x0));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            // Pixel centers in [span[0], span[1])
            let start = (span[0] - 0.5).ceil().max(0.0) as usize;
            let end = ((span[1] - 0.5).ceil().max(0.0) as usize).min(width);
            for col in start..end {
                mask[[row, col]] = 1;
            }
        }
    }
}

/// Union of several polygons belonging to one object
#[must_use]
pub fn polygons_to_mask(polygons: &[Vec<f64>], height: usize, width: usize) -> Array2<u8> {
    let mut mask = Array2::<u8>::zeros((height, width));
    for polygon in polygons {
        let mut part = Array2::<u8>::zeros((height, width));
        fill_polygon(&mut part, polygon);
        mask.zip_mut_with(&part, |m, &p| *m |= p);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_decode_column_major() {
        // 3 rows x 4 cols; col 1 full, col 2 bottom pixel, col 3 top pixel
        let rle = Rle::from_counts(3, 4, vec![3, 3, 2, 2, 2]);
        let mask = rle.decode().unwrap();
        assert_eq!(
            mask,
            array![[0_u8, 1, 0, 1], [0, 1, 0, 0], [0, 1, 1, 0]]
        );
        assert_eq!(rle.area(), 5);
    }

    #[test]
    fn test_decode_short_counts_leave_background() {
        let rle = Rle::from_counts(2, 2, vec![1, 1]);
        let mask = rle.decode().unwrap();
        assert_eq!(mask, array![[0_u8, 0], [1, 0]]);
    }

    #[test]
    fn test_decode_rejects_overlong_counts() {
        let rle = Rle::from_counts(2, 2, vec![1, 10]);
        assert!(matches!(rle.decode(), Err(DatasetError::Annotation(_))));
    }

    #[test]
    fn test_all_ones_starts_with_empty_run() {
        let rle = Rle::from_counts(2, 3, vec![0, 6]);
        assert_eq!(rle.decode().unwrap(), Array2::<u8>::ones((2, 3)));
    }

    #[test]
    fn test_compressed_simple_counts() {
        // 92 spans two 5-bit groups; the third count is stored as is
        let rle = Rle::from_compressed(10, 10, "53l2").unwrap();
        assert_eq!(rle.counts, vec![5, 3, 92]);
    }

    #[test]
    fn test_compressed_delta_counts() {
        // Fourth count stored as +2 against the second
        let rle = Rle::from_compressed(2, 7, "2342").unwrap();
        assert_eq!(rle.counts, vec![2, 3, 4, 5]);

        // Negative delta: 1 = 5 - 4
        let rle = Rle::from_compressed(2, 6, "254L").unwrap();
        assert_eq!(rle.counts, vec![2, 5, 4, 1]);
    }

    #[test]
    fn test_compressed_errors() {
        assert!(Rle::from_compressed(2, 2, "1 ").is_err());
        // Continuation bit set on the last character
        assert!(Rle::from_compressed(2, 2, "l").is_err());
    }

    #[test]
    fn test_fill_rectangle() {
        let mut mask = Array2::<u8>::zeros((5, 6));
        fill_polygon(&mut mask, &[1.0, 1.0, 4.0, 1.0, 4.0, 3.0, 1.0, 3.0]);
        let expected = array![
            [0_u8, 0, 0, 0, 0, 0],
            [0, 1, 1, 1, 0, 0],
            [0, 1, 1, 1, 0, 0],
            [0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0]
        ];
        assert_eq!(mask, expected);
    }

    #[test]
    fn test_fill_triangle_and_clipping() {
        let mut mask = Array2::<u8>::zeros((10, 10));
        fill_polygon(&mut mask, &[2.0, 2.0, 7.0, 2.0, 4.0, 7.0]);
        let area = mask.iter().filter(|&&v| v == 1).count();
        assert!(area > 0 && area < 25);

        // Polygon extending past the image is clipped
        let mut mask = Array2::<u8>::zeros((4, 4));
        fill_polygon(&mut mask, &[-5.0, -5.0, 20.0, -5.0, 20.0, 20.0, -5.0, 20.0]);
        assert!(mask.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_degenerate_polygon() {
        let mut mask = Array2::<u8>::zeros((4, 4));
        fill_polygon(&mut mask, &[1.0, 1.0, 3.0, 3.0]);
        assert!(mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_polygon_union() {
        let polygons = vec![
            vec![0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0],
            vec![1.0, 1.0, 4.0, 1.0, 4.0, 4.0, 1.0, 4.0],
        ];
        let mask = polygons_to_mask(&polygons, 4, 4);
        // 4 + 9 - 1 overlapping pixel
        assert_eq!(mask.iter().filter(|&&v| v == 1).count(), 12);
    }
}
