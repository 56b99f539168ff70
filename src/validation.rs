//! Validation of cached values on read.
//!
//! A cached value that fails its validator is treated as a miss and recomputed.

use crate::{CacheError, Result};

/// Trait for validating cached values.
pub trait CheckValue<T> {
    /// Validate the given value.
    ///
    /// Returns `Ok(())` if the value may be served, or `Err(CacheError)` if not.
    fn check(&self, value: &T) -> Result<()>;
}

/// A validator that accepts values matching a predicate.
///
/// # Examples
///
/// ```rust
/// use astrostocks_cache::validation::{CheckValue, Predicate};
///
/// let has_price = Predicate::new(|price: &Option<f64>| price.is_some(), "missing price");
/// assert!(has_price.check(&Some(2950.0)).is_ok());
/// assert!(has_price.check(&None).is_err());
/// ```
pub struct Predicate<F> {
    accept: F,
    reason: &'static str,
}

impl<F> Predicate<F> {
    /// Reject values for which `accept` returns false, citing `reason`.
    pub fn new(accept: F, reason: &'static str) -> Self {
        Self { accept, reason }
    }
}

impl<T, F> CheckValue<T> for Predicate<F>
where
    F: Fn(&T) -> bool,
{
    fn check(&self, value: &T) -> Result<()> {
        if (self.accept)(value) {
            Ok(())
        } else {
            Err(CacheError::serialization(self.reason))
        }
    }
}
