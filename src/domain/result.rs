//! Result type alias

use super::errors::EkuatiaError;

/// Result type alias for crate operations
///
/// # Examples
///
/// ```
/// use ekuatia::domain::result::Result;
/// use ekuatia::domain::errors::EkuatiaError;
///
/// fn failing_function() -> Result<()> {
///     Err(EkuatiaError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, EkuatiaError>;
