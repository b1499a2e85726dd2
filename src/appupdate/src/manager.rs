//! Update orchestrator - main API for update operations.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use url::Url;

use crate::config::UpdateConfig;
use crate::error::{UpdateError, UpdateResult};
use crate::gate::{AvailabilityGate, ComponentStateQuery, SettingsLauncher};
use crate::inspect::PackageInspector;
use crate::install::{InstallRequest, Installer};
use crate::location::{ArtifactLocation, LocationResolver, ShareAuthority};
use crate::service::{DownloadHandle, DownloadRequest, DownloadService, DownloadStatus};
use crate::session::{FailureReason, SessionState, UpdateSession};
use crate::tier::PlatformTier;
use crate::tracker::DownloadStateTracker;
use crate::version::is_newer;

/// Collaborators and settings an orchestrator is built from.
#[derive(Clone)]
pub struct UpdateContext {
    pub config: UpdateConfig,
    pub service: Arc<dyn DownloadService>,
    pub component_states: Arc<dyn ComponentStateQuery>,
    pub settings: Arc<dyn SettingsLauncher>,
    pub inspector: Arc<dyn PackageInspector>,
    pub share_authority: Arc<dyn ShareAuthority>,
    pub installer: Arc<dyn Installer>,
}

/// Outcome of [`UpdateOrchestrator::check_and_install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The install request was handed to the installer
    Installed,
    /// The downloaded package is not a newer build of this package
    NotNewer,
    /// The download has not finished (or its record is unreadable)
    NotReady,
    /// The download failed or its artifact is missing or unusable
    Failed,
}

/// Result of checking a finished download against the installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Strictly newer build of the installed package, ready to install
    Newer(ArtifactLocation),
    NotNewer,
    NotReady,
    Failed,
}

/// Drives one package through download, version check and install.
///
/// Holds no per-download state; every call re-queries the download service.
pub struct UpdateOrchestrator {
    config: UpdateConfig,
    tier: PlatformTier,
    service: Arc<dyn DownloadService>,
    tracker: DownloadStateTracker,
    resolver: LocationResolver,
    gate: AvailabilityGate,
    inspector: Arc<dyn PackageInspector>,
    installer: Arc<dyn Installer>,
}

impl UpdateOrchestrator {
    pub fn new(context: UpdateContext) -> Self {
        let UpdateContext {
            config,
            service,
            component_states,
            settings,
            inspector,
            share_authority,
            installer,
        } = context;

        let tier = config.tier();
        let tracker = DownloadStateTracker::new(Arc::clone(&service));
        let resolver =
            LocationResolver::new(Arc::clone(&service), share_authority, config.artifact_path());
        let gate = AvailabilityGate::new(config.provider_id.clone(), component_states, settings);

        tracing::debug!(
            "Update orchestrator for {} on {} tier, artifact at {}",
            config.package_id,
            tier,
            resolver.artifact_path().display()
        );

        Self {
            config,
            tier,
            service,
            tracker,
            resolver,
            gate,
            inspector,
            installer,
        }
    }

    /// Use a custom location resolver, e.g. one with extra tier strategies.
    pub fn with_resolver(mut self, resolver: LocationResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    pub fn tier(&self) -> PlatformTier {
        self.tier
    }

    /// Fixed location downloads land at.
    pub fn artifact_path(&self) -> &Path {
        self.resolver.artifact_path()
    }

    /// Whether the download service currently accepts requests.
    pub fn can_download(&self) -> bool {
        self.gate.can_download()
    }

    /// Send the user to the download service's settings.
    pub fn request_enable_download_service(&self) -> UpdateResult<()> {
        self.gate.request_enable_download_service()
    }

    /// Enqueue a download of the package at `url`.
    ///
    /// Checks the availability gate first and clears any stale artifact left
    /// at the fixed location.
    pub fn enqueue_update(&self, url: &str) -> UpdateResult<DownloadHandle> {
        let url = Url::parse(url)?;

        if !self.gate.can_download() {
            return Err(UpdateError::ServiceUnavailable {
                provider: self.gate.provider_id().to_string(),
            });
        }

        if self.delete_artifact() {
            tracing::debug!("Removed stale artifact before enqueueing");
        }

        let mut request = DownloadRequest::new(url, self.artifact_path().to_path_buf());
        if let Some(title) = &self.config.download_title {
            request = request.with_title(title.clone());
        }
        if let Some(description) = &self.config.download_description {
            request = request.with_description(description.clone());
        }

        let handle = self.service.enqueue(request)?;
        tracing::info!("Update download enqueued as {}", handle);
        Ok(handle)
    }

    /// Start a session for a fresh download of `url`.
    pub fn start_session(&self, url: &str) -> UpdateResult<UpdateSession> {
        self.enqueue_update(url).map(UpdateSession::enqueued)
    }

    /// Current status of a download.
    pub fn status(&self, handle: DownloadHandle) -> DownloadStatus {
        self.tracker.status(handle)
    }

    /// Raw local reference the service recorded for a download.
    pub fn local_reference(&self, handle: DownloadHandle) -> Option<String> {
        self.tracker.local_reference(handle)
    }

    /// Filesystem path of a successful download, per the service's record.
    pub fn downloaded_file(&self, handle: DownloadHandle) -> Option<PathBuf> {
        self.tracker.downloaded_file(handle)
    }

    /// Resolve a download to an installable location for this host's tier.
    pub fn resolve(&self, handle: DownloadHandle) -> Option<ArtifactLocation> {
        self.resolver.resolve(handle, self.tier)
    }

    /// Check a download against the installed package without installing.
    pub fn verify_download(&self, handle: DownloadHandle) -> Verification {
        match self.tracker.status(handle) {
            DownloadStatus::Successful => {}
            DownloadStatus::Failed => {
                tracing::info!("Download {} failed", handle);
                return Verification::Failed;
            }
            status => {
                tracing::debug!("Download {} not ready: {}", handle, status);
                return Verification::NotReady;
            }
        }

        let Some(location) = self.resolve(handle) else {
            tracing::warn!("Download {} finished but could not be resolved", handle);
            return Verification::Failed;
        };

        let path = location
            .local_path()
            .unwrap_or_else(|| self.artifact_path().to_path_buf());
        if !path.is_file() {
            tracing::warn!("Artifact for download {} missing at {}", handle, path.display());
            return Verification::Failed;
        }

        let candidate = self
            .inspector
            .read_package_info(&path)
            .inspect_err(|e| tracing::warn!("Cannot inspect downloaded package: {}", e))
            .ok();
        let installed = self
            .inspector
            .read_installed_package_info(&self.config.package_id)
            .inspect_err(|e| tracing::warn!("Cannot read installed package: {}", e))
            .ok();

        if is_newer(candidate.as_ref(), installed.as_ref()) {
            Verification::Newer(location)
        } else {
            tracing::info!(
                "Downloaded package {:?} is not newer than installed {:?}",
                candidate,
                installed
            );
            Verification::NotNewer
        }
    }

    /// Install a finished download if it is a strictly newer build.
    pub fn check_and_install(&self, handle: DownloadHandle) -> InstallOutcome {
        match self.verify_download(handle) {
            Verification::Newer(location) => match self.install(&location) {
                Ok(()) => InstallOutcome::Installed,
                Err(e) => {
                    tracing::warn!("Install of download {} not dispatched: {}", handle, e);
                    InstallOutcome::Failed
                }
            },
            Verification::NotNewer => InstallOutcome::NotNewer,
            Verification::NotReady => InstallOutcome::NotReady,
            Verification::Failed => InstallOutcome::Failed,
        }
    }

    /// Hand `location` to the installer.
    ///
    /// This does NOT consult the version gate: an older or foreign package is
    /// dispatched just the same, which allows forced installs. Use
    /// [`UpdateOrchestrator::check_and_install`] for the gated path.
    pub fn install(&self, location: &ArtifactLocation) -> UpdateResult<()> {
        let request = InstallRequest::for_location(location.clone(), self.tier);
        self.installer.dispatch(&request)?;
        tracing::info!("Install requested for {}", location);
        Ok(())
    }

    /// Move `session` forward as far as the current download state allows.
    pub fn advance(&self, session: &mut UpdateSession) -> SessionState {
        loop {
            let before = session.state();
            match before {
                SessionState::Enqueued | SessionState::Polling => {
                    let Some(handle) = session.handle() else {
                        return session.fail(FailureReason::NoDownload);
                    };
                    session.observe_status(self.status(handle));
                }
                SessionState::Completed => {
                    let Some(handle) = session.handle() else {
                        return session.fail(FailureReason::NoDownload);
                    };
                    session.observe_verification(self.verify_download(handle));
                }
                SessionState::VersionChecked => match session.location().cloned() {
                    Some(location) => match self.install(&location) {
                        Ok(()) => session.mark_install_requested(),
                        Err(e) => {
                            tracing::warn!("Install not dispatched: {}", e);
                            session.fail(FailureReason::InstallFailed);
                        }
                    },
                    None => {
                        session.fail(FailureReason::ArtifactUnavailable);
                    }
                },
                SessionState::Idle
                | SessionState::InstallRequested
                | SessionState::Failed => return before,
            }

            let after = session.state();
            if after == before || after == SessionState::Polling {
                return after;
            }
        }
    }

    /// Delete the artifact at the fixed location.
    ///
    /// Meant for startup, to reclaim space after an install finished or was
    /// abandoned. `false` if there was nothing to delete or deletion failed.
    pub fn delete_artifact(&self) -> bool {
        let path = self.artifact_path();
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Deleted artifact {}", path.display());
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to delete artifact {}: {}", path.display(), e);
                false
            }
        }
    }
}

impl std::fmt::Debug for UpdateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateOrchestrator")
            .field("package_id", &self.config.package_id)
            .field("tier", &self.tier)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Process-wide orchestrator.
static GLOBAL_ORCHESTRATOR: OnceLock<UpdateOrchestrator> = OnceLock::new();

/// Get the global orchestrator, building it from `init` on first access.
///
/// Concurrent first callers all observe the same instance and `init` runs at
/// most once; later calls ignore `init`.
pub fn global_orchestrator<F>(init: F) -> &'static UpdateOrchestrator
where
    F: FnOnce() -> UpdateContext,
{
    GLOBAL_ORCHESTRATOR.get_or_init(|| UpdateOrchestrator::new(init()))
}

/// Get the global orchestrator if it has been initialized.
pub fn try_global_orchestrator() -> Option<&'static UpdateOrchestrator> {
    GLOBAL_ORCHESTRATOR.get()
}
