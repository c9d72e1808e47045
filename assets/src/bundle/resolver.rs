use std::fmt;

/// Where a bundled asset lives: the bundle identifier and the asset's name
/// inside that bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundlePath {
  pub bundle: String,
  pub asset: String,
}

impl BundlePath {
  pub fn new(bundle: impl Into<String>, asset: impl Into<String>) -> Self {
    Self {
      bundle: bundle.into(),
      asset: asset.into(),
    }
  }
}

impl fmt::Display for BundlePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.bundle, self.asset)
  }
}

/// Maps a load path into a bundle, or declares it a loose path served by the
/// byte source.
pub trait PathResolver: Send + Sync + 'static {
  fn resolve(&self, path: &str) -> Option<BundlePath>;
}

/// A resolver under which every path is loose.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBundles;

impl PathResolver for NoBundles {
  fn resolve(&self, _path: &str) -> Option<BundlePath> {
    None
  }
}

impl<F> PathResolver for F
where
  F: Fn(&str) -> Option<BundlePath> + Send + Sync + 'static,
{
  fn resolve(&self, path: &str) -> Option<BundlePath> {
    self(path)
  }
}
