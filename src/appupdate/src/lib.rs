//! AppUpdate - client-side self-update orchestration.
//!
//! Downloads a newer package through a platform download service, resolves the
//! downloaded artifact to a location that depends on the host's capability
//! tier, and triggers installation only when the package is a strictly newer
//! build of the installed one.
//!
//! # Example
//!
//! ```rust,ignore
//! use appupdate::{InstallOutcome, UpdateOrchestrator};
//!
//! let orchestrator = UpdateOrchestrator::new(context);
//! orchestrator.delete_artifact();
//!
//! let handle = orchestrator.enqueue_update("https://example.com/app.apk")?;
//! // ...later, once the download service reports completion
//! match orchestrator.check_and_install(handle) {
//!     InstallOutcome::Installed => println!("installer started"),
//!     InstallOutcome::NotReady => println!("still downloading"),
//!     other => println!("no update: {other:?}"),
//! }
//! ```

mod config;
mod error;
mod gate;
mod http;
mod inspect;
mod install;
mod location;
mod manager;
mod service;
mod session;
mod tier;
mod tracker;
mod version;

pub use config::{DEFAULT_ARTIFACT_NAME, DEFAULT_PROVIDER_ID, UpdateConfig};
pub use error::{UpdateError, UpdateResult};
pub use gate::{AvailabilityGate, ComponentState, ComponentStateQuery, SettingsLauncher};
pub use http::HttpDownloadService;
pub use inspect::{ArchiveInspector, MANIFEST_ENTRY, PackageInspector};
pub use install::{CommandInstaller, CommandSettingsLauncher, InstallRequest, Installer};
pub use location::{
    ArtifactLocation, FileShareAuthority, LocationResolver, ResolveInputs, ResolveStrategy,
    ShareAuthority,
};
pub use manager::{
    InstallOutcome, UpdateContext, UpdateOrchestrator, Verification, global_orchestrator,
    try_global_orchestrator,
};
pub use service::{
    DownloadHandle, DownloadRecord, DownloadRequest, DownloadService, DownloadStatus,
    PACKAGE_ARCHIVE_MIME, RecordCursor,
};
pub use session::{FailureReason, SessionState, UpdateSession};
pub use tier::{MID_MIN_VERSION, PlatformTier, SCOPED_STORAGE_MIN_VERSION};
pub use tracker::DownloadStateTracker;
pub use version::{PackageVersionInfo, VersionComparison, compare_versions, is_newer};

/// Current version of the appupdate library (set at compile time)
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
