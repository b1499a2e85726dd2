//! Download service availability.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::UpdateResult;

/// Enabled state of a platform component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// Whatever the component declares; counts as enabled
    Default,
    Enabled,
    Disabled,
    DisabledByUser,
    DisabledUntilUsed,
}

impl ComponentState {
    pub fn is_disabled(&self) -> bool {
        matches!(
            self,
            Self::Disabled | Self::DisabledByUser | Self::DisabledUntilUsed
        )
    }
}

/// Reports the enabled state of a provider package.
pub trait ComponentStateQuery: Send + Sync {
    fn provider_enabled_state(&self, provider_id: &str) -> UpdateResult<ComponentState>;
}

/// Hands the user over to the settings screen of a provider package.
pub trait SettingsLauncher: Send + Sync {
    fn open_app_settings(&self, provider_id: &str) -> UpdateResult<()>;
}

/// Decides whether the download service can take requests right now.
#[derive(Clone)]
pub struct AvailabilityGate {
    provider_id: String,
    states: Arc<dyn ComponentStateQuery>,
    settings: Arc<dyn SettingsLauncher>,
}

impl AvailabilityGate {
    pub fn new(
        provider_id: impl Into<String>,
        states: Arc<dyn ComponentStateQuery>,
        settings: Arc<dyn SettingsLauncher>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            states,
            settings,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// `false` if the provider is disabled in any way or its state cannot be read.
    pub fn can_download(&self) -> bool {
        match self.states.provider_enabled_state(&self.provider_id) {
            Ok(state) if state.is_disabled() => {
                tracing::info!("Download provider {} is {:?}", self.provider_id, state);
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    "Could not read state of download provider {}: {}",
                    self.provider_id,
                    e
                );
                false
            }
        }
    }

    /// Open the provider's settings so it can be re-enabled by hand.
    ///
    /// Success of the hand-off says nothing about the outcome; call
    /// [`AvailabilityGate::can_download`] again later to find out.
    pub fn request_enable_download_service(&self) -> UpdateResult<()> {
        tracing::info!("Opening settings for download provider {}", self.provider_id);
        self.settings.open_app_settings(&self.provider_id)
    }
}

impl std::fmt::Debug for AvailabilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityGate")
            .field("provider_id", &self.provider_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use std::sync::Mutex;

    struct FixedState(UpdateResult<ComponentState>);

    impl ComponentStateQuery for FixedState {
        fn provider_enabled_state(&self, _provider_id: &str) -> UpdateResult<ComponentState> {
            match &self.0 {
                Ok(state) => Ok(*state),
                Err(_) => Err(UpdateError::QueryFailed {
                    message: "package not found".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingLauncher(Mutex<Vec<String>>);

    impl SettingsLauncher for RecordingLauncher {
        fn open_app_settings(&self, provider_id: &str) -> UpdateResult<()> {
            self.0.lock().unwrap().push(provider_id.to_string());
            Ok(())
        }
    }

    fn gate(state: UpdateResult<ComponentState>) -> AvailabilityGate {
        AvailabilityGate::new(
            "downloads",
            Arc::new(FixedState(state)),
            Arc::new(RecordingLauncher::default()),
        )
    }

    #[test]
    fn test_disabled_states_block() {
        for state in [
            ComponentState::Disabled,
            ComponentState::DisabledByUser,
            ComponentState::DisabledUntilUsed,
        ] {
            assert!(!gate(Ok(state)).can_download(), "{state:?} should block");
        }
    }

    #[test]
    fn test_enabled_states_pass() {
        assert!(gate(Ok(ComponentState::Enabled)).can_download());
        assert!(gate(Ok(ComponentState::Default)).can_download());
    }

    #[test]
    fn test_query_failure_blocks() {
        let err = Err(UpdateError::QueryFailed {
            message: String::new(),
        });
        assert!(!gate(err).can_download());
    }

    #[test]
    fn test_request_enable_opens_provider_settings() {
        let launcher = Arc::new(RecordingLauncher::default());
        let gate = AvailabilityGate::new(
            "downloads",
            Arc::new(FixedState(Ok(ComponentState::Disabled))),
            launcher.clone(),
        );

        gate.request_enable_download_service().unwrap();
        assert_eq!(*launcher.0.lock().unwrap(), vec!["downloads".to_string()]);
    }
}
