use ahash::{AHashMap, AHashSet};

/// Answers which bundles must be open for a given bundle to be usable.
pub trait DependencyManifest: Send + Sync + 'static {
  /// The ordered, transitive dependency list of `bundle`. Unknown bundles
  /// have no dependencies.
  fn dependencies_of(&self, bundle: &str) -> Vec<String>;
}

/// An in-memory manifest built from direct dependency edges.
///
/// Lookups expand the edges depth-first, listing every reachable bundle once
/// and never the queried bundle itself.
#[derive(Debug, Clone, Default)]
pub struct StaticManifest {
  direct: AHashMap<String, Vec<String>>,
}

impl StaticManifest {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder form of [`StaticManifest::insert`].
  pub fn with<I, S>(mut self, bundle: impl Into<String>, dependencies: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.insert(bundle, dependencies);
    self
  }

  /// Sets the direct dependencies of `bundle`, replacing earlier ones.
  pub fn insert<I, S>(&mut self, bundle: impl Into<String>, dependencies: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self
      .direct
      .insert(bundle.into(), dependencies.into_iter().map(Into::into).collect());
  }

  pub fn direct_dependencies(&self, bundle: &str) -> &[String] {
    self.direct.get(bundle).map(Vec::as_slice).unwrap_or(&[])
  }

  fn collect(&self, bundle: &str, seen: &mut AHashSet<String>, out: &mut Vec<String>) {
    for dep in self.direct_dependencies(bundle) {
      if seen.insert(dep.clone()) {
        out.push(dep.clone());
        self.collect(dep, seen, out);
      }
    }
  }
}

impl DependencyManifest for StaticManifest {
  fn dependencies_of(&self, bundle: &str) -> Vec<String> {
    let mut seen = AHashSet::new();
    seen.insert(bundle.to_owned());
    let mut out = Vec::new();
    self.collect(bundle, &mut seen, &mut out);
    out
  }
}
