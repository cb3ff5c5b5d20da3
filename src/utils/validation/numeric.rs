//! Numeric validation utilities
//!
//! Provides safe numeric conversions and range validation for the resize
//! geometry, so degenerate scale factors surface as errors instead of
//! zero-sized arrays.

use crate::error::{DatasetError, Result};

/// Validator for numeric operations and conversions
pub struct NumericValidator;

impl NumericValidator {
    /// Safely convert a non-negative f64 to usize with bounds checking
    pub fn validate_f64_to_usize(value: f64) -> Result<usize> {
        if !value.is_finite() {
            return Err(DatasetError::processing(format!(
                "Cannot convert non-finite value {} to usize",
                value
            )));
        }

        if value < 0.0 {
            return Err(DatasetError::processing(format!(
                "Cannot convert negative value {} to usize",
                value
            )));
        }

        if value > usize::MAX as f64 {
            return Err(DatasetError::processing(format!(
                "Value {} exceeds usize::MAX ({})",
                value,
                usize::MAX
            )));
        }

        Ok(value as usize)
    }

    /// Length of an axis of `len` pixels after scaling by `scale`
    ///
    /// Rounds to the nearest pixel. A result of zero is rejected.
    pub fn validate_scaled_dim(len: usize, scale: f64) -> Result<usize> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(DatasetError::processing(format!(
                "Scale factor must be finite and positive, got {}",
                scale
            )));
        }

        let scaled = Self::validate_f64_to_usize((len as f64 * scale).round())?;
        if scaled == 0 {
            return Err(DatasetError::processing_stage_error(
                "resize",
                &format!("scale {} produces an empty axis", scale),
                Some(&format!("axis length {}", len)),
            ));
        }
        Ok(scaled)
    }

    /// Safely add two usize values checking for overflow
    pub fn safe_add_usize(a: usize, b: usize) -> Result<usize> {
        a.checked_add(b)
            .ok_or_else(|| DatasetError::processing(format!("Addition overflow: {} + {}", a, b)))
    }

    /// Validate normalization parameters (mean and std arrays)
    pub fn validate_normalization_params(
        mean: &[f32],
        std: &[f32],
        expected_channels: usize,
    ) -> Result<()> {
        if mean.len() != expected_channels {
            return Err(DatasetError::invalid_config(format!(
                "Mean array length {} doesn't match expected channels {}",
                mean.len(),
                expected_channels
            )));
        }

        if std.len() != expected_channels {
            return Err(DatasetError::invalid_config(format!(
                "Std array length {} doesn't match expected channels {}",
                std.len(),
                expected_channels
            )));
        }

        for (i, &value) in mean.iter().enumerate() {
            if !value.is_finite() {
                return Err(DatasetError::invalid_config(format!(
                    "Mean value at index {} is not finite: {}",
                    i, value
                )));
            }
        }

        for (i, &value) in std.iter().enumerate() {
            if !value.is_finite() {
                return Err(DatasetError::invalid_config(format!(
                    "Std value at index {} is not finite: {}",
                    i, value
                )));
            }
            if value <= 0.0 {
                return Err(DatasetError::invalid_config(format!(
                    "Std value at index {} must be positive: {}",
                    i, value
                )));
            }
            if value > 10.0 {
                tracing::warn!(
                    index = i,
                    value,
                    "Unusually large std value (typical range: 0.1-2.0)"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_f64_to_usize() {
        assert_eq!(NumericValidator::validate_f64_to_usize(0.0).unwrap(), 0);
        assert_eq!(NumericValidator::validate_f64_to_usize(100.7).unwrap(), 100);

        assert!(NumericValidator::validate_f64_to_usize(-1.0).is_err());
        assert!(NumericValidator::validate_f64_to_usize(f64::NAN).is_err());
        assert!(NumericValidator::validate_f64_to_usize(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_scaled_dim() {
        assert_eq!(NumericValidator::validate_scaled_dim(600, 1.28).unwrap(), 768);
        assert_eq!(NumericValidator::validate_scaled_dim(800, 1.28).unwrap(), 1024);
        assert_eq!(NumericValidator::validate_scaled_dim(3, 0.5).unwrap(), 2);

        // Rounds down to nothing
        assert!(NumericValidator::validate_scaled_dim(1, 0.1).is_err());
        assert!(NumericValidator::validate_scaled_dim(0, 2.0).is_err());
        assert!(NumericValidator::validate_scaled_dim(10, 0.0).is_err());
        assert!(NumericValidator::validate_scaled_dim(10, f64::NAN).is_err());
    }

    #[test]
    fn test_safe_add() {
        assert_eq!(NumericValidator::safe_add_usize(100, 28).unwrap(), 128);
        assert!(NumericValidator::safe_add_usize(usize::MAX, 1).is_err());
    }

    #[test]
    fn test_validate_normalization_params() {
        let mean = [0.485, 0.456, 0.406];
        let std = [0.229, 0.224, 0.225];
        assert!(NumericValidator::validate_normalization_params(&mean, &std, 3).is_ok());

        assert!(NumericValidator::validate_normalization_params(&mean, &std, 1).is_err());

        let invalid_std = [0.0, 0.224, 0.225];
        assert!(NumericValidator::validate_normalization_params(&mean, &invalid_std, 3).is_err());

        let nan_mean = [f32::NAN, 0.456, 0.406];
        assert!(NumericValidator::validate_normalization_params(&nan_mean, &std, 3).is_err());
    }
}
