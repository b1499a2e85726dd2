//! Package version comparison.

use serde::{Deserialize, Serialize};

/// Identity and version ordinal of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersionInfo {
    #[serde(rename = "package")]
    pub package_id: String,
    pub version_code: u64,
}

impl PackageVersionInfo {
    pub fn new(package_id: impl Into<String>, version_code: u64) -> Self {
        Self {
            package_id: package_id.into(),
            version_code,
        }
    }
}

/// Result of comparing two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComparison {
    /// Current is older than target
    Older,
    /// Current equals target
    Equal,
    /// Current is newer than target
    Newer,
}

/// Compare two version ordinals.
pub fn compare_versions(current: u64, target: u64) -> VersionComparison {
    match current.cmp(&target) {
        std::cmp::Ordering::Less => VersionComparison::Older,
        std::cmp::Ordering::Equal => VersionComparison::Equal,
        std::cmp::Ordering::Greater => VersionComparison::Newer,
    }
}

/// Whether `candidate` is a strictly newer build of the installed package.
///
/// Fails closed: an unreadable candidate, an unreadable installed package, or
/// a candidate for a different package is never newer. Equal ordinals are not
/// an update.
pub fn is_newer(
    candidate: Option<&PackageVersionInfo>,
    installed: Option<&PackageVersionInfo>,
) -> bool {
    let (Some(candidate), Some(installed)) = (candidate, installed) else {
        return false;
    };

    if candidate.package_id != installed.package_id {
        return false;
    }

    compare_versions(installed.version_code, candidate.version_code) == VersionComparison::Older
}
