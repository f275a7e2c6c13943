//! Loose semantic-version comparison for manifest ordering.
//!
//! Manifest versions are dot-separated numeric tuples (`1.2.0`). Comparison
//! is numeric per component, non-numeric components are treated as absent,
//! and trailing zeros are insignificant, so `1.0` and `1.0.0` compare equal.
//! This is deliberately looser than full semver: manifest authors write
//! plain numeric versions and the store must order them the way an operator
//! expects (`1.10.0` outranks `1.2.0`).

use std::cmp::Ordering;

/// Compares two version strings under loose semantic-version ordering.
///
/// # Example
///
/// ```rust
/// use std::cmp::Ordering;
/// use strata_core::version::compare;
///
/// assert_eq!(compare("1.2.0", "1.10.0"), Ordering::Less);
/// assert_eq!(compare("2.0.0", "1.9.9"), Ordering::Greater);
/// assert_eq!(compare("1.0", "1.0.0"), Ordering::Equal);
/// ```
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    normalize(a).cmp(&normalize(b))
}

/// Returns `true` if `candidate` strictly outranks `current`.
///
/// Used by the manifest store to decide whether a newly deployed version
/// moves the latest pointer.
#[must_use]
pub fn outranks(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Sorts a list of version strings ascending under loose ordering.
pub fn sort_ascending(versions: &mut [String]) {
    versions.sort_by(|a, b| compare(a, b));
}

/// Returns the major component of a version string, if present.
#[must_use]
pub fn major(version: &str) -> Option<u64> {
    version.split('.').next().and_then(|p| p.parse().ok())
}

fn normalize(version: &str) -> Vec<u64> {
    let mut parts: Vec<u64> = version
        .split('.')
        .filter_map(|part| part.parse().ok())
        .collect();
    // Trailing zeros carry no ordering weight: 1.0 == 1.0.0.
    while parts.last() == Some(&0) {
        parts.pop();
    }
    parts
}
