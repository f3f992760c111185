//! Input validation utilities for frame submissions and service configuration
//!
//! Everything that arrives from a capture client or the environment passes
//! through here before it reaches the recognition backend:
//! - IDs are bounded and free of path separators
//! - object key prefixes cannot escape the configured root
//! - timestamps and thresholds are finite and within range

use anyhow::{anyhow, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for resource IDs (collection_id, face_id, etc.)
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for object key prefixes
pub const MAX_KEY_PREFIX_LENGTH: usize = 512;

/// Maximum encoded image size accepted per frame (the backend limit for raw bytes)
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum number of frames accepted in one batch
pub const MAX_FRAMES_PER_BATCH: usize = 500;

/// Latest accepted capture time, 9999-12-31T23:59:59Z. Keeps partition years
/// at four digits and well inside chrono's range.
pub const MAX_CAPTURE_TIME: f64 = 253_402_300_799.0;

// ============================================================================
// Safe Time Operations
// ============================================================================

/// Get current Unix timestamp in fractional seconds, with safe fallback
///
/// Logs a warning and returns 0 when the clock is before the epoch
pub fn safe_unix_timestamp_f64() -> f64 {
    safe_unix_duration().as_secs_f64()
}

/// Get duration since UNIX epoch, with safe fallback
pub fn safe_unix_duration() -> Duration {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            Duration::ZERO
        }
    }
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate resource ID (collection_id, face_id, etc.)
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    // IDs end up in object keys and log lines
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

/// Normalize an object key prefix so it can be joined with partition segments
///
/// An empty prefix is allowed and stays empty. Otherwise the prefix must be
/// relative, free of `..` segments, and is returned with a trailing `/`.
pub fn normalize_key_prefix(prefix: &str, field_name: &str) -> Result<String> {
    validate_length(prefix, MAX_KEY_PREFIX_LENGTH, field_name)?;

    if prefix.is_empty() {
        return Ok(String::new());
    }

    if prefix.starts_with('/') || prefix.contains('\\') {
        return Err(anyhow!("{} must be a relative object key prefix", field_name));
    }

    if prefix.split('/').any(|segment| segment == "..") {
        return Err(anyhow!(
            "{} contains '..' segment (path traversal attempt)",
            field_name
        ));
    }

    if prefix.ends_with('/') {
        Ok(prefix.to_string())
    } else {
        Ok(format!("{}/", prefix))
    }
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

/// Validate a similarity or confidence threshold on the backend's 0-100 scale
pub fn validate_threshold(value: f32, field_name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(anyhow!("{} must be a finite number", field_name));
    }
    validate_range(value, 0.0, 100.0, field_name)
}

/// Validate a capture timestamp (fractional Unix seconds)
pub fn validate_capture_time(ts: f64) -> Result<()> {
    if !ts.is_finite() || ts < 0.0 {
        return Err(anyhow!(
            "approximate_capture_time must be a non-negative Unix timestamp, got {}",
            ts
        ));
    }
    if ts > MAX_CAPTURE_TIME {
        return Err(anyhow!(
            "approximate_capture_time {} is later than {}",
            ts,
            MAX_CAPTURE_TIME
        ));
    }
    Ok(())
}

/// Validate positive count (workers, attempts, etc.)
pub fn validate_positive(value: usize, field_name: &str) -> Result<()> {
    if value == 0 {
        return Err(anyhow!("{} must be greater than 0", field_name));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_unix_timestamp() {
        let ts = safe_unix_timestamp_f64();
        assert!(ts > 1_700_000_000.0); // After 2023
        assert!(safe_unix_duration().as_secs_f64() >= ts);
    }

    #[test]
    fn test_validate_id() {
        // Valid IDs
        assert!(validate_id("face-collection", "collection_id").is_ok());
        assert!(validate_id("3f1c2a9e-4b7d-4c1e-9a55-0d2e8f6b7c10", "face_id").is_ok());

        // Invalid IDs
        assert!(validate_id("", "id").is_err());
        assert!(validate_id("  ", "id").is_err());
        assert!(validate_id("../etc/passwd", "id").is_err());
        assert!(validate_id("path/to/something", "id").is_err());
        assert!(validate_id(&"a".repeat(300), "id").is_err());
    }

    #[test]
    fn test_normalize_key_prefix() {
        assert_eq!(normalize_key_prefix("frames", "root").unwrap(), "frames/");
        assert_eq!(normalize_key_prefix("frames/", "root").unwrap(), "frames/");
        assert_eq!(normalize_key_prefix("a/b", "root").unwrap(), "a/b/");
        assert_eq!(normalize_key_prefix("", "root").unwrap(), "");

        assert!(normalize_key_prefix("/frames", "root").is_err());
        assert!(normalize_key_prefix("frames/../secrets", "root").is_err());
        assert!(normalize_key_prefix("frames\\x", "root").is_err());
        assert!(normalize_key_prefix(&"a".repeat(600), "root").is_err());
    }

    #[test]
    fn test_validate_threshold() {
        assert!(validate_threshold(90.0, "threshold").is_ok());
        assert!(validate_threshold(0.0, "threshold").is_ok());
        assert!(validate_threshold(100.0, "threshold").is_ok());

        assert!(validate_threshold(-1.0, "threshold").is_err());
        assert!(validate_threshold(100.5, "threshold").is_err());
        assert!(validate_threshold(f32::NAN, "threshold").is_err());
    }

    #[test]
    fn test_validate_capture_time() {
        assert!(validate_capture_time(1_700_000_000.5).is_ok());
        assert!(validate_capture_time(0.0).is_ok());
        assert!(validate_capture_time(MAX_CAPTURE_TIME).is_ok());

        assert!(validate_capture_time(MAX_CAPTURE_TIME + 1.0).is_err());
        assert!(validate_capture_time(1e300).is_err());

        assert!(validate_capture_time(-1.0).is_err());
        assert!(validate_capture_time(f64::INFINITY).is_err());
        assert!(validate_capture_time(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(3, "workers").is_ok());
        let err = validate_positive(0, "workers").unwrap_err().to_string();
        assert!(err.contains("workers"));
    }
}
