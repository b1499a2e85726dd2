//! Install dispatch and settings hand-off.

use std::process::{Command, Stdio};

use crate::error::{UpdateError, UpdateResult};
use crate::gate::SettingsLauncher;
use crate::location::ArtifactLocation;
use crate::service::PACKAGE_ARCHIVE_MIME;
use crate::tier::PlatformTier;

/// Placeholder substituted in command templates.
pub const PLACEHOLDER: &str = "{}";

/// A "view this package archive" request for the OS installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub location: ArtifactLocation,
    pub mime_type: String,
    /// Start the installer as a new task, detached from the caller
    pub new_task: bool,
    pub grant_read: bool,
    pub grant_write: bool,
}

impl InstallRequest {
    /// Request for `location`, with read/write grants where `tier` needs them.
    pub fn for_location(location: ArtifactLocation, tier: PlatformTier) -> Self {
        let grants = tier.requires_grants();
        Self {
            location,
            mime_type: PACKAGE_ARCHIVE_MIME.to_string(),
            new_task: true,
            grant_read: grants,
            grant_write: grants,
        }
    }

    /// Grants as a comma separated list, empty when none.
    pub fn grants(&self) -> String {
        let mut grants = Vec::new();
        if self.grant_read {
            grants.push("read");
        }
        if self.grant_write {
            grants.push("write");
        }
        grants.join(",")
    }
}

/// The OS package installer.
///
/// Dispatch is fire-and-forget: `Ok` means the request was handed over, not
/// that anything got installed.
pub trait Installer: Send + Sync {
    fn dispatch(&self, request: &InstallRequest) -> UpdateResult<()>;
}

/// Installer that spawns a command, e.g. `["xdg-open", "{}"]`.
///
/// The location replaces `{}` in the arguments; the MIME type and grants are
/// passed in `APPUPDATE_MIME_TYPE` and `APPUPDATE_URI_GRANTS`.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    command: Vec<String>,
}

impl CommandInstaller {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Installer for CommandInstaller {
    fn dispatch(&self, request: &InstallRequest) -> UpdateResult<()> {
        let location = request.location.to_uri_string();
        let mut cmd = build_command(&self.command, &location).ok_or_else(|| {
            UpdateError::InstallFailed {
                message: "No install command configured".to_string(),
            }
        })?;
        cmd.env("APPUPDATE_MIME_TYPE", &request.mime_type)
            .env("APPUPDATE_URI_GRANTS", request.grants());

        tracing::info!("Dispatching install: {}", render(&self.command, &location));
        spawn_detached(cmd).map_err(|e| UpdateError::InstallFailed {
            message: format!("Failed to run {}: {}", self.command[0], e),
        })
    }
}

/// Settings launcher that spawns a command with the provider id substituted.
#[derive(Debug, Clone)]
pub struct CommandSettingsLauncher {
    command: Vec<String>,
}

impl CommandSettingsLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl SettingsLauncher for CommandSettingsLauncher {
    fn open_app_settings(&self, provider_id: &str) -> UpdateResult<()> {
        let settings_failed = |message: String| UpdateError::SettingsFailed {
            provider: provider_id.to_string(),
            message,
        };

        let cmd = build_command(&self.command, provider_id)
            .ok_or_else(|| settings_failed("No settings command configured".to_string()))?;

        tracing::info!("Opening settings: {}", render(&self.command, provider_id));
        spawn_detached(cmd).map_err(|e| settings_failed(e.to_string()))
    }
}

fn substitute(arg: &str, value: &str) -> String {
    arg.replace(PLACEHOLDER, value)
}

fn render(template: &[String], value: &str) -> String {
    template
        .iter()
        .map(|arg| substitute(arg, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_command(template: &[String], value: &str) -> Option<Command> {
    let (program, args) = template.split_first()?;
    let mut cmd = Command::new(substitute(program, value));
    cmd.args(args.iter().map(|arg| substitute(arg, value)))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    Some(cmd)
}

/// Start `cmd` and reap it in the background.
fn spawn_detached(mut cmd: Command) -> std::io::Result<()> {
    let mut child = cmd.spawn()?;
    std::thread::spawn(move || match child.wait() {
        Ok(status) => tracing::debug!("Dispatched command exited with {}", status),
        Err(e) => tracing::debug!("Failed to wait for dispatched command: {}", e),
    });
    Ok(())
}
