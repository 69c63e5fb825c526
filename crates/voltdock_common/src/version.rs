//! Dotted version comparison for release tags.
//!
//! Release tags look like `v1.2.3` or `1.2.3`. Comparison is deliberately
//! lenient: missing or non-numeric components count as zero, so a malformed
//! remote tag can never take the updater down.

/// Version compiled into this build.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Strip the conventional `v` prefix from a release tag.
pub fn normalize(tag: &str) -> &str {
    tag.trim().trim_start_matches('v')
}

/// True when `latest` is strictly newer than `current`.
///
/// Compares up to three numeric components (major, minor, patch), so
/// `1.10.0` beats `1.2.0` numerically rather than losing lexicographically.
/// Equal versions are never newer.
pub fn is_newer(current: &str, latest: &str) -> bool {
    if current.trim().is_empty() || latest.trim().is_empty() {
        return false;
    }

    let parse = |v: &str| -> Vec<u64> {
        v.split('.').map(|p| p.trim().parse().unwrap_or(0)).collect()
    };

    let current_parts = parse(current);
    let latest_parts = parse(latest);

    for i in 0..3 {
        let c = current_parts.get(i).unwrap_or(&0);
        let l = latest_parts.get(i).unwrap_or(&0);
        if l > c {
            return true;
        }
        if l < c {
            return false;
        }
    }
    false
}
