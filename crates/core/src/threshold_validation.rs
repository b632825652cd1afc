//! Shared threshold validation helpers.
//!
//! Provides the range checks applied to threshold tables before they are
//! accepted by the classifier.

use crate::error::CoreError;

/// Validate that `bounds` are all finite and strictly ascending.
///
/// Returns a `CoreError::Configuration` naming the field if not.
pub fn validate_ascending_bounds(bounds: &[f64], name: &str) -> Result<(), CoreError> {
    if let Some(bad) = bounds.iter().find(|b| !b.is_finite()) {
        return Err(CoreError::Configuration(format!(
            "{name} bounds must be finite, got {bad}"
        )));
    }
    for pair in bounds.windows(2) {
        if pair[1] <= pair[0] {
            return Err(CoreError::Configuration(format!(
                "{name} bounds must be strictly ascending, got {} then {}",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ascending_bounds() {
        assert!(validate_ascending_bounds(&[25.0, 50.0, 75.0, 90.0], "test").is_ok());
    }

    #[test]
    fn rejects_equal_neighbours() {
        assert!(validate_ascending_bounds(&[25.0, 50.0, 50.0, 90.0], "test").is_err());
    }

    #[test]
    fn rejects_descending_bounds() {
        let err = validate_ascending_bounds(&[80.0, 70.0, 60.0, 50.0], "temp").unwrap_err();
        assert!(err.to_string().contains("temp"));
    }

    #[test]
    fn rejects_non_finite() {
        assert!(validate_ascending_bounds(&[25.0, f64::NAN, 75.0, 90.0], "test").is_err());
        assert!(validate_ascending_bounds(&[25.0, 50.0, 75.0, f64::INFINITY], "test").is_err());
    }
}
