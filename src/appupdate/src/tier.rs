//! Platform capability tiers.

use serde::{Deserialize, Serialize};

/// First host version on the mid tier.
pub const MID_MIN_VERSION: u32 = 23;

/// First host version on the scoped-storage tier.
pub const SCOPED_STORAGE_MIN_VERSION: u32 = 24;

/// Capability level of the host platform, in increasing order.
///
/// Decides how a finished download is turned into an installable location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformTier {
    /// The download service's own lookup is trusted
    Legacy,
    /// Fixed location, exposed as a raw path
    Mid,
    /// Fixed location, exposed through a file-sharing authority
    ScopedStorage,
}

impl PlatformTier {
    /// Infer the tier from a host platform version.
    pub fn from_host_version(version: u32) -> Self {
        if version < MID_MIN_VERSION {
            Self::Legacy
        } else if version < SCOPED_STORAGE_MIN_VERSION {
            Self::Mid
        } else {
            Self::ScopedStorage
        }
    }

    /// Whether the installer must be granted explicit access to the location.
    pub fn requires_grants(&self) -> bool {
        matches!(self, Self::ScopedStorage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Mid => "mid",
            Self::ScopedStorage => "scoped-storage",
        }
    }
}

impl std::fmt::Display for PlatformTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
