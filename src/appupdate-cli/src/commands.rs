//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use appupdate::{
    ArchiveInspector, CommandInstaller, CommandSettingsLauncher, ComponentState, FailureReason,
    FileShareAuthority, HttpDownloadService, PackageInspector, PackageVersionInfo, SessionState,
    UpdateConfig, UpdateContext, UpdateOrchestrator, is_newer,
};
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Load the config file, applying command-line overrides.
pub fn load_config(path: Option<&Path>, host_version: Option<u32>) -> UpdateConfig {
    let mut config = match path {
        Some(path) => UpdateConfig::load_from(path),
        None => UpdateConfig::load(),
    };
    if let Some(version) = host_version {
        config.host_version = version;
    }
    config
}

fn inspector(config: &UpdateConfig) -> ArchiveInspector {
    ArchiveInspector::new().with_installed(PackageVersionInfo::new(
        config.package_id.clone(),
        config.installed_version_code,
    ))
}

fn build_orchestrator(config: UpdateConfig) -> UpdateOrchestrator {
    let service = Arc::new(HttpDownloadService::new(
        config.provider_id.clone(),
        Handle::current(),
    ));
    if !config.service_enabled {
        service.set_state(ComponentState::DisabledByUser);
    }

    let authority = FileShareAuthority::new(config.share_authority())
        .with_root("downloads", config.downloads_dir());

    UpdateOrchestrator::new(UpdateContext {
        inspector: Arc::new(inspector(&config)),
        share_authority: Arc::new(authority),
        settings: Arc::new(CommandSettingsLauncher::new(config.settings_command.clone())),
        installer: Arc::new(CommandInstaller::new(config.install_command.clone())),
        service: service.clone(),
        component_states: service,
        config,
    })
}

pub async fn update(
    config: UpdateConfig,
    url: &str,
    timeout_secs: u64,
    poll_interval_ms: u64,
) -> Result<ExitCode> {
    let orchestrator = build_orchestrator(config);
    let mut session = orchestrator
        .start_session(url)
        .with_context(|| format!("Could not start download of {}", url))?;
    let Some(handle) = session.handle() else {
        anyhow::bail!("Download service returned no handle");
    };

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let interval = Duration::from_millis(poll_interval_ms);

    let state = loop {
        let state = orchestrator.advance(&mut session);
        if state.is_terminal() {
            break state;
        }
        if Instant::now() >= deadline {
            tracing::warn!("Giving up on download {} after {}s", handle, timeout_secs);
            println!("Timed out waiting for download {}", handle);
            return Ok(ExitCode::FAILURE);
        }
        tokio::time::sleep(interval).await;
    };

    match state {
        SessionState::InstallRequested => {
            let location = session
                .location()
                .map(ToString::to_string)
                .unwrap_or_default();
            println!("Installer started for {}", location);
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            println!(
                "{}",
                failure_message(session.failure(), handle, &orchestrator.config().package_id)
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn failure_message(
    reason: Option<FailureReason>,
    handle: impl std::fmt::Display,
    package_id: &str,
) -> String {
    match reason {
        Some(FailureReason::DownloadFailed) => format!("Download {} failed", handle),
        Some(FailureReason::NotNewer) => format!(
            "Downloaded package is not a newer build of {}; nothing installed",
            package_id
        ),
        Some(reason) => format!("Update from download {} stopped: {}", handle, reason),
        None => format!("Update from download {} did not finish", handle),
    }
}

pub fn check(config: UpdateConfig, path: Option<PathBuf>) -> Result<ExitCode> {
    let path = path.unwrap_or_else(|| config.artifact_path());
    let inspector = inspector(&config);

    let candidate = inspector
        .read_package_info(&path)
        .with_context(|| format!("Cannot inspect {}", path.display()))?;
    let installed = inspector.read_installed_package_info(&config.package_id).ok();

    println!(
        "Candidate: {} version {}",
        candidate.package_id, candidate.version_code
    );
    if let Some(installed) = &installed {
        println!(
            "Installed: {} version {}",
            installed.package_id, installed.version_code
        );
    }

    if is_newer(Some(&candidate), installed.as_ref()) {
        println!("Candidate is newer");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Candidate is not newer");
        Ok(ExitCode::from(2))
    }
}

pub fn cleanup(config: UpdateConfig) -> Result<ExitCode> {
    let orchestrator = build_orchestrator(config);
    if orchestrator.delete_artifact() {
        println!("Deleted {}", orchestrator.artifact_path().display());
    } else {
        println!("Nothing to delete at {}", orchestrator.artifact_path().display());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn service(config: UpdateConfig, enable: bool) -> Result<ExitCode> {
    let orchestrator = build_orchestrator(config);
    if orchestrator.can_download() {
        println!("Download service is available");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Download service is disabled");
    if enable {
        orchestrator
            .request_enable_download_service()
            .context("Could not open download service settings")?;
        println!("Opened settings; run this command again once the service is enabled");
    }
    Ok(ExitCode::FAILURE)
}

pub fn show_config(config: UpdateConfig, path: Option<&Path>, save: bool) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("Tier: {}", config.tier());
    println!("Artifact: {}", config.artifact_path().display());

    if save {
        match path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        println!("Saved");
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appupdate::PlatformTier;

    #[test]
    fn test_host_version_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("update.json");
        std::fs::write(&path, r#"{"package_id": "org.sample.reader", "host_version": 30}"#)
            .unwrap();

        let config = load_config(Some(&path), None);
        assert_eq!(config.tier(), PlatformTier::ScopedStorage);

        let config = load_config(Some(&path), Some(23));
        assert_eq!(config.package_id, "org.sample.reader");
        assert_eq!(config.tier(), PlatformTier::Mid);
    }

    #[test]
    fn test_failure_message_names_cause() {
        let message = failure_message(
            Some(FailureReason::ArtifactUnavailable),
            42,
            "org.sample.reader",
        );
        assert!(message.contains("missing or unresolvable"));
        assert!(!message.contains("newer build"));

        let message = failure_message(Some(FailureReason::NotNewer), 42, "org.sample.reader");
        assert!(message.contains("not a newer build of org.sample.reader"));

        assert_eq!(
            failure_message(Some(FailureReason::DownloadFailed), 42, "org.sample.reader"),
            "Download 42 failed"
        );
    }

    #[tokio::test]
    async fn test_cleanup_without_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = UpdateConfig {
            downloads_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(cleanup(config).is_ok());
    }

    #[tokio::test]
    async fn test_service_disabled_by_config() {
        let config = UpdateConfig {
            service_enabled: false,
            ..Default::default()
        };
        let orchestrator = build_orchestrator(config);
        assert!(!orchestrator.can_download());
        assert!(orchestrator.enqueue_update("https://example.com/app.apk").is_err());
    }
}
