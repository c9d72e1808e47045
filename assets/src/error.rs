use thiserror::Error;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The reclaim threshold must be at least one evicted asset.
  #[error("reclaim threshold cannot be zero")]
  ZeroReclaimThreshold,
  /// A path resolver was configured, but the cache has no bundle support to
  /// serve the bundled paths it resolves.
  #[error("a path resolver requires bundle support (archive store and manifest)")]
  ResolverWithoutBundles,
}

/// The reason a single asset could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
  /// The byte source had nothing at the requested path.
  #[error("asset not found at '{path}'")]
  NotFound { path: String },
  /// The path resolved into a bundle, and the bundle loader failed.
  #[error(transparent)]
  Bundle(#[from] BundleError),
  /// The path resolved into a bundle, but the cache was built without bundle
  /// support.
  #[error("'{path}' lives in bundle '{bundle}', but bundle support is not configured")]
  BundlesUnavailable { path: String, bundle: String },
}

/// Failures of the bundle dependency loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
  /// The archive store could not open the bundle. Callers that waited on the
  /// failed open receive the same error.
  #[error("failed to open bundle '{bundle}': {source}")]
  OpenFailed {
    bundle: String,
    #[source]
    source: ArchiveError,
  },
  /// The open this caller made or waited on was cancelled by an unload, or
  /// superseded by an open that did not register the bundle.
  #[error("bundle '{bundle}' was unloaded before it finished opening")]
  Unloaded { bundle: String },
  /// The bundle is open but has no asset with that name.
  #[error("bundle '{bundle}' has no asset '{asset}'")]
  AssetNotFound { bundle: String, asset: String },
}

/// Errors reported by an [`ArchiveStore`](crate::bundle::ArchiveStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
  #[error("no archive at '{0}'")]
  NotFound(String),
  #[error("archive '{0}' is corrupt")]
  Corrupt(String),
  #[error("i/o error: {0}")]
  Io(String),
}

impl From<std::io::Error> for ArchiveError {
  fn from(err: std::io::Error) -> Self {
    ArchiveError::Io(err.to_string())
  }
}

/// Errors raised while assembling a [`Request`](crate::Request).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
  /// Task tags must be unique within one request.
  #[error("a task tagged '{tag}' already exists in this request")]
  DuplicateTag { tag: String },
}
