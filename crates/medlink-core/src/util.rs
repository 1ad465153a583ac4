//! Utility functions for medlink-core.

use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Lock a std mutex, recovering the data if a previous holder panicked.
///
/// Every critical section guarded this way is a plain collection update that
/// leaves the data consistent at each step.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reject empty (or whitespace-only) string arguments.
pub(crate) fn require_non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        Err(Error::invalid_argument(format!("{field} must not be empty")))
    } else {
        Ok(value)
    }
}

/// Reject lists that contain an empty entry.
pub(crate) fn require_non_empty_entries(field: &str, values: &[String]) -> Result<()> {
    match values.iter().position(|v| v.trim().is_empty()) {
        Some(index) => Err(Error::invalid_argument(format!(
            "{field}[{index}] must not be empty"
        ))),
        None => Ok(()),
    }
}
