//! Reading package identity without installing.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::{UpdateError, UpdateResult};
use crate::version::PackageVersionInfo;

/// Archive entry describing the package.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Largest manifest we are willing to parse.
const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

/// Inspects candidate and installed packages.
pub trait PackageInspector: Send + Sync {
    /// Version info of the package archive at `path`.
    fn read_package_info(&self, path: &Path) -> UpdateResult<PackageVersionInfo>;

    /// Version info of the installed package `package_id`.
    fn read_installed_package_info(&self, package_id: &str) -> UpdateResult<PackageVersionInfo>;
}

/// Inspector for zip package archives carrying a [`MANIFEST_ENTRY`].
///
/// Installed packages are whatever has been registered with
/// [`ArchiveInspector::with_installed`].
#[derive(Debug, Clone, Default)]
pub struct ArchiveInspector {
    installed: HashMap<String, PackageVersionInfo>,
}

impl ArchiveInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an installed package.
    pub fn with_installed(mut self, info: PackageVersionInfo) -> Self {
        self.installed.insert(info.package_id.clone(), info);
        self
    }

    fn unreadable(path: &Path, message: impl ToString) -> UpdateError {
        UpdateError::PackageUnreadable {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

impl PackageInspector for ArchiveInspector {
    fn read_package_info(&self, path: &Path) -> UpdateResult<PackageVersionInfo> {
        let file = std::fs::File::open(path).map_err(|e| Self::unreadable(path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| Self::unreadable(path, e))?;
        let entry = archive
            .by_name(MANIFEST_ENTRY)
            .map_err(|e| Self::unreadable(path, e))?;

        let mut content = String::new();
        entry
            .take(MAX_MANIFEST_BYTES)
            .read_to_string(&mut content)
            .map_err(|e| Self::unreadable(path, e))?;

        let info: PackageVersionInfo =
            serde_json::from_str(&content).map_err(|e| Self::unreadable(path, e))?;
        tracing::debug!(
            "Package archive {} is {} version {}",
            path.display(),
            info.package_id,
            info.version_code
        );
        Ok(info)
    }

    fn read_installed_package_info(&self, package_id: &str) -> UpdateResult<PackageVersionInfo> {
        self.installed
            .get(package_id)
            .cloned()
            .ok_or_else(|| UpdateError::PackageNotInstalled {
                package: package_id.to_string(),
            })
    }
}
