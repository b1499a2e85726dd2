//! Resolving a finished download to an installable location.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::error::{UpdateError, UpdateResult};
use crate::service::{DownloadHandle, DownloadService};
use crate::tier::PlatformTier;

/// Where a downloaded artifact can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Reference reported by the download service itself
    ServiceUri(String),
    /// Raw filesystem path
    Path(PathBuf),
    /// Capability-scoped reference backed by a file on disk
    Shared { uri: Url, path: PathBuf },
}

impl ArtifactLocation {
    /// The reference handed to the installer.
    pub fn to_uri_string(&self) -> String {
        match self {
            Self::ServiceUri(uri) => uri.clone(),
            Self::Path(path) => Url::from_file_path(path)
                .map(String::from)
                .unwrap_or_else(|_| path.display().to_string()),
            Self::Shared { uri, .. } => uri.to_string(),
        }
    }

    /// Local file backing this location, when one is known.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            Self::ServiceUri(uri) => match Url::parse(uri) {
                Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().ok(),
                Ok(_) => None,
                Err(_) => Some(PathBuf::from(uri)),
            },
            Self::Path(path) => Some(path.clone()),
            Self::Shared { path, .. } => Some(path.clone()),
        }
    }

    /// Whether the backing file currently exists.
    pub fn is_materialized(&self) -> bool {
        self.local_path().is_some_and(|p| p.is_file())
    }
}

impl std::fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_uri_string())
    }
}

/// Turns files into capability-scoped references.
pub trait ShareAuthority: Send + Sync {
    /// Name the authority is registered under.
    fn authority(&self) -> &str;

    /// Scoped reference for `path`.
    fn shareable_reference(&self, path: &Path) -> UpdateResult<Url>;
}

/// Share authority serving files below a fixed set of named roots as
/// `content://<authority>/<root>/<relative path>`.
#[derive(Debug, Clone)]
pub struct FileShareAuthority {
    authority: String,
    roots: Vec<(String, PathBuf)>,
}

impl FileShareAuthority {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            roots: Vec::new(),
        }
    }

    /// Expose files below `dir` under `name`.
    pub fn with_root(mut self, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.roots.push((name.into(), dir.into()));
        self
    }

    fn not_shareable(&self, path: &Path) -> UpdateError {
        UpdateError::NotShareable {
            authority: self.authority.clone(),
            path: path.to_path_buf(),
        }
    }
}

impl ShareAuthority for FileShareAuthority {
    fn authority(&self) -> &str {
        &self.authority
    }

    fn shareable_reference(&self, path: &Path) -> UpdateResult<Url> {
        let (name, relative) = self
            .roots
            .iter()
            .find_map(|(name, root)| path.strip_prefix(root).ok().map(|rel| (name, rel)))
            .ok_or_else(|| self.not_shareable(path))?;

        let mut uri = Url::parse(&format!("content://{}/", self.authority))?;
        {
            let mut segments = uri
                .path_segments_mut()
                .map_err(|_| self.not_shareable(path))?;
            segments.pop_if_empty().push(name);
            for component in relative.components() {
                match component {
                    Component::Normal(part) => {
                        segments.push(&part.to_string_lossy());
                    }
                    // Never let a reference climb out of its root.
                    _ => return Err(self.not_shareable(path)),
                }
            }
        }
        Ok(uri)
    }
}

/// What a resolution strategy gets to work with.
pub struct ResolveInputs<'a> {
    pub service: &'a dyn DownloadService,
    pub authority: &'a dyn ShareAuthority,
    pub artifact_path: &'a Path,
}

/// Resolution strategy for one tier.
pub type ResolveStrategy =
    Arc<dyn Fn(&ResolveInputs<'_>, DownloadHandle) -> Option<ArtifactLocation> + Send + Sync>;

/// Maps a download handle to an [`ArtifactLocation`] by platform tier.
///
/// Each tier owns its own strategy; the default table is:
/// - legacy: ask the download service
/// - mid: the fixed artifact path, as a raw path
/// - scoped-storage: the fixed artifact path, wrapped by the share authority
///
/// Resolution never checks whether the file exists. A missing artifact is
/// discovered by whoever uses the location.
#[derive(Clone)]
pub struct LocationResolver {
    service: Arc<dyn DownloadService>,
    authority: Arc<dyn ShareAuthority>,
    artifact_path: PathBuf,
    strategies: BTreeMap<PlatformTier, ResolveStrategy>,
}

impl LocationResolver {
    pub fn new(
        service: Arc<dyn DownloadService>,
        authority: Arc<dyn ShareAuthority>,
        artifact_path: PathBuf,
    ) -> Self {
        let mut strategies: BTreeMap<PlatformTier, ResolveStrategy> = BTreeMap::new();
        strategies.insert(PlatformTier::Legacy, Arc::new(resolve_from_service));
        strategies.insert(PlatformTier::Mid, Arc::new(resolve_fixed_path));
        strategies.insert(PlatformTier::ScopedStorage, Arc::new(resolve_shared));

        Self {
            service,
            authority,
            artifact_path,
            strategies,
        }
    }

    /// Replace the strategy used for `tier`.
    pub fn with_strategy<F>(mut self, tier: PlatformTier, strategy: F) -> Self
    where
        F: Fn(&ResolveInputs<'_>, DownloadHandle) -> Option<ArtifactLocation> + Send + Sync + 'static,
    {
        self.strategies.insert(tier, Arc::new(strategy));
        self
    }

    /// Fixed location downloads are written to.
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Resolve `handle` for a host on `tier`.
    ///
    /// `None` when the tier's source of truth has nothing to offer: the
    /// service knows no file for the handle, or the authority refuses the path.
    pub fn resolve(&self, handle: DownloadHandle, tier: PlatformTier) -> Option<ArtifactLocation> {
        let Some(strategy) = self.strategies.get(&tier) else {
            tracing::warn!("No location strategy registered for tier {}", tier);
            return None;
        };

        let inputs = ResolveInputs {
            service: self.service.as_ref(),
            authority: self.authority.as_ref(),
            artifact_path: &self.artifact_path,
        };
        let location = strategy(&inputs, handle);
        tracing::debug!("Resolved handle {} on {} tier to {:?}", handle, tier, location);
        location
    }
}

impl std::fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("artifact_path", &self.artifact_path)
            .field("tiers", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn resolve_from_service(inputs: &ResolveInputs<'_>, handle: DownloadHandle) -> Option<ArtifactLocation> {
    inputs
        .service
        .uri_for_downloaded_file(handle)
        .map(ArtifactLocation::ServiceUri)
}

// The service's own lookup is unreliable from the mid tier on.
fn resolve_fixed_path(inputs: &ResolveInputs<'_>, _handle: DownloadHandle) -> Option<ArtifactLocation> {
    Some(ArtifactLocation::Path(inputs.artifact_path.to_path_buf()))
}

fn resolve_shared(inputs: &ResolveInputs<'_>, _handle: DownloadHandle) -> Option<ArtifactLocation> {
    match inputs.authority.shareable_reference(inputs.artifact_path) {
        Ok(uri) => Some(ArtifactLocation::Shared {
            uri,
            path: inputs.artifact_path.to_path_buf(),
        }),
        Err(e) => {
            tracing::warn!(
                "Authority {} refused {}: {}",
                inputs.authority.authority(),
                inputs.artifact_path.display(),
                e
            );
            None
        }
    }
}
