//! State of one download-to-install session.

use crate::location::ArtifactLocation;
use crate::manager::{InstallOutcome, Verification};
use crate::service::{DownloadHandle, DownloadStatus};

/// Where a session stands.
///
/// `InstallRequested` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Enqueued,
    Polling,
    Completed,
    VersionChecked,
    InstallRequested,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::InstallRequested | Self::Failed)
    }
}

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The session never had a download to follow
    NoDownload,
    /// The download service reported the transfer as failed
    DownloadFailed,
    /// The downloaded package is not a newer build of the installed one
    NotNewer,
    /// The artifact is missing or its location could not be resolved
    ArtifactUnavailable,
    /// The installer could not be started
    InstallFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoDownload => "no download was enqueued",
            Self::DownloadFailed => "download failed",
            Self::NotNewer => "downloaded package is not a newer build",
            Self::ArtifactUnavailable => "downloaded artifact is missing or unresolvable",
            Self::InstallFailed => "installer could not be started",
        };
        f.write_str(text)
    }
}

/// One (handle, installation) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSession {
    handle: Option<DownloadHandle>,
    state: SessionState,
    location: Option<ArtifactLocation>,
    failure: Option<FailureReason>,
}

impl Default for UpdateSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateSession {
    /// A session with nothing enqueued yet.
    pub fn new() -> Self {
        Self {
            handle: None,
            state: SessionState::Idle,
            location: None,
            failure: None,
        }
    }

    /// A session for a download the service accepted.
    pub fn enqueued(handle: DownloadHandle) -> Self {
        Self {
            handle: Some(handle),
            state: SessionState::Enqueued,
            location: None,
            failure: None,
        }
    }

    pub fn handle(&self) -> Option<DownloadHandle> {
        self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Location that passed the version check, once there is one.
    pub fn location(&self) -> Option<&ArtifactLocation> {
        self.location.as_ref()
    }

    /// Cause of failure, set once the session is `Failed`.
    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a freshly queried download status.
    ///
    /// Only meaningful while enqueued or polling. `Unknown` leaves the state
    /// alone so the caller can retry or abandon.
    pub fn observe_status(&mut self, status: DownloadStatus) -> SessionState {
        if matches!(self.state, SessionState::Enqueued | SessionState::Polling) {
            match status {
                DownloadStatus::Pending | DownloadStatus::Running | DownloadStatus::Paused => {
                    self.transition(SessionState::Polling)
                }
                DownloadStatus::Successful => self.transition(SessionState::Completed),
                DownloadStatus::Failed => {
                    self.fail(FailureReason::DownloadFailed);
                }
                DownloadStatus::Unknown => {}
            }
        }
        self.state
    }

    /// Apply the result of checking the completed download.
    pub fn observe_verification(&mut self, verification: Verification) -> SessionState {
        if self.state != SessionState::Completed {
            return self.state;
        }
        match verification {
            Verification::Newer(location) => {
                self.location = Some(location);
                self.transition(SessionState::VersionChecked);
            }
            Verification::NotReady => self.transition(SessionState::Polling),
            Verification::NotNewer => {
                self.fail(FailureReason::NotNewer);
            }
            Verification::Failed => {
                self.fail(FailureReason::ArtifactUnavailable);
            }
        }
        self.state
    }

    /// Apply the result of a whole check-and-install pass.
    ///
    /// Ignored while idle: there is no download the outcome could belong to.
    pub fn observe_outcome(&mut self, outcome: InstallOutcome) -> SessionState {
        if self.state == SessionState::Idle || self.is_terminal() {
            return self.state;
        }
        match outcome {
            InstallOutcome::Installed => self.transition(SessionState::InstallRequested),
            InstallOutcome::NotReady => self.transition(SessionState::Polling),
            InstallOutcome::NotNewer => {
                self.fail(FailureReason::NotNewer);
            }
            InstallOutcome::Failed => {
                self.fail(FailureReason::ArtifactUnavailable);
            }
        }
        self.state
    }

    pub(crate) fn mark_install_requested(&mut self) {
        self.transition(SessionState::InstallRequested);
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) -> SessionState {
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
        self.transition(SessionState::Failed);
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::debug!(
                "Update session {:?}: {:?} -> {:?}",
                self.handle,
                self.state,
                next
            );
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_polling_to_completed() {
        let mut session = UpdateSession::enqueued(DownloadHandle(42));
        assert_eq!(session.observe_status(DownloadStatus::Pending), SessionState::Polling);
        assert_eq!(session.observe_status(DownloadStatus::Running), SessionState::Polling);
        assert_eq!(session.observe_status(DownloadStatus::Unknown), SessionState::Polling);
        assert_eq!(
            session.observe_status(DownloadStatus::Successful),
            SessionState::Completed
        );
        // Status no longer matters once completed.
        assert_eq!(session.observe_status(DownloadStatus::Failed), SessionState::Completed);
    }

    #[test]
    fn test_verification_paths() {
        let mut session = UpdateSession::enqueued(DownloadHandle(1));
        session.observe_status(DownloadStatus::Successful);
        let location = ArtifactLocation::Path(PathBuf::from("/data/Downloads/app.apk"));
        assert_eq!(
            session.observe_verification(Verification::Newer(location.clone())),
            SessionState::VersionChecked
        );
        assert_eq!(session.location(), Some(&location));

        let mut session = UpdateSession::enqueued(DownloadHandle(2));
        session.observe_status(DownloadStatus::Successful);
        assert_eq!(
            session.observe_verification(Verification::NotNewer),
            SessionState::Failed
        );
        assert!(session.is_terminal());
        assert_eq!(session.failure(), Some(FailureReason::NotNewer));

        let mut session = UpdateSession::enqueued(DownloadHandle(5));
        session.observe_status(DownloadStatus::Successful);
        assert_eq!(
            session.observe_verification(Verification::Failed),
            SessionState::Failed
        );
        assert_eq!(session.failure(), Some(FailureReason::ArtifactUnavailable));
    }

    #[test]
    fn test_failed_download_is_terminal() {
        let mut session = UpdateSession::enqueued(DownloadHandle(3));
        assert_eq!(session.observe_status(DownloadStatus::Failed), SessionState::Failed);
        assert_eq!(
            session.observe_outcome(InstallOutcome::Installed),
            SessionState::Failed
        );
        assert_eq!(session.failure(), Some(FailureReason::DownloadFailed));
    }

    #[test]
    fn test_outcomes() {
        let mut session = UpdateSession::enqueued(DownloadHandle(4));
        assert_eq!(
            session.observe_outcome(InstallOutcome::NotReady),
            SessionState::Polling
        );
        assert_eq!(
            session.observe_outcome(InstallOutcome::Installed),
            SessionState::InstallRequested
        );
        assert!(session.is_terminal());
    }

    #[test]
    fn test_idle_session() {
        let mut session = UpdateSession::new();
        assert_eq!(session.handle(), None);
        assert_eq!(session.observe_status(DownloadStatus::Successful), SessionState::Idle);
        assert_eq!(session.failure(), None);
    }

    #[test]
    fn test_idle_session_ignores_outcomes() {
        let mut session = UpdateSession::new();
        assert_eq!(
            session.observe_outcome(InstallOutcome::NotReady),
            SessionState::Idle
        );
        assert_eq!(
            session.observe_outcome(InstallOutcome::Installed),
            SessionState::Idle
        );
        assert_eq!(
            session.observe_outcome(InstallOutcome::Failed),
            SessionState::Idle
        );
        assert_eq!(session.failure(), None);
    }

    #[test]
    fn test_outcome_failure_reason() {
        let mut session = UpdateSession::enqueued(DownloadHandle(6));
        assert_eq!(
            session.observe_outcome(InstallOutcome::Failed),
            SessionState::Failed
        );
        assert_eq!(session.failure(), Some(FailureReason::ArtifactUnavailable));
        assert_eq!(
            session.failure().map(|r| r.to_string()).as_deref(),
            Some("downloaded artifact is missing or unresolvable")
        );
    }
}
