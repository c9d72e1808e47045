mod common;

use common::MemoryArchives;
use fibre_assets::{ArchiveError, BundleCounts, BundleError, BundleLoader, StaticManifest};
use std::path::Path;
use std::sync::Arc;

fn counts(direct: usize, dependents: usize) -> Option<BundleCounts> {
  Some(BundleCounts { direct, dependents })
}

// a -> b -> d, a -> c
fn chain() -> (BundleLoader<String>, Arc<common::ArchiveStats>) {
  let archives = MemoryArchives::new()
    .with_bundle("a", &["hero"])
    .with_bundle("b", &["shared"])
    .with_bundle("c", &["sound"])
    .with_bundle("d", &["shader"]);
  let stats = archives.stats.clone();
  let manifest = StaticManifest::new().with("a", ["b", "c"]).with("b", ["d"]);
  (BundleLoader::new(archives, manifest, "bundles"), stats)
}

#[test]
fn test_open_bundle_opens_dependencies_once_each() {
  let (loader, stats) = chain();

  loader.open_bundle("a").unwrap();
  assert_eq!(loader.open_count(), 4);
  assert_eq!(loader.counts("a"), counts(0, 0), "the root holds no dependency count");
  assert_eq!(loader.counts("b"), counts(0, 1));
  assert_eq!(loader.counts("c"), counts(0, 1));
  assert_eq!(loader.counts("d"), counts(0, 1));
  for id in ["a", "b", "c", "d"] {
    assert_eq!(stats.opens(id), 1);
  }

  // Reopening is a no-op, as is opening an open dependency as a root.
  loader.open_bundle("a").unwrap();
  loader.open_bundle("b").unwrap();
  assert_eq!(loader.counts("b"), counts(0, 1));
  assert_eq!(stats.opens("a"), 1);
}

#[test]
fn test_bundles_open_under_the_root() {
  let (loader, _) = chain();
  assert_eq!(loader.root(), Path::new("bundles"));
  assert_eq!(loader.path_of("a"), Path::new("bundles").join("a"));
}

#[test]
fn test_unload_cascades_through_dependencies() {
  let (loader, stats) = chain();
  loader.open_bundle("a").unwrap();

  assert!(loader.unload_bundle("a", true));
  assert_eq!(loader.open_count(), 0);
  for id in ["a", "b", "c", "d"] {
    assert_eq!(stats.unloads(id), 1, "bundle {} should be released exactly once", id);
  }
}

#[test]
fn test_unload_without_cascade_keeps_dependencies() {
  let (loader, stats) = chain();
  loader.open_bundle("a").unwrap();

  assert!(loader.unload_bundle("a", false));
  assert!(!loader.is_open("a"));
  assert_eq!(loader.counts("b"), counts(0, 1));
  assert_eq!(stats.unloads("b"), 0);
}

#[test]
fn test_unload_is_refused_while_counts_are_held() {
  let (loader, _) = chain();
  loader.open_bundle("a").unwrap();

  // b is still a dependency of a.
  assert!(!loader.unload_bundle("b", true));

  loader.reference_bundle("a");
  assert!(loader.has_reference("a"));
  assert!(!loader.unload_bundle("a", true));

  loader.unreference_bundle("a");
  assert!(!loader.has_reference("a"));
  assert!(loader.unload_bundle("a", true));

  // Unknown bundles are not unloaded.
  assert!(!loader.unload_bundle("zzz", true));
}

#[test]
fn test_diamond_dependencies_are_counted_per_listing() {
  let archives = MemoryArchives::new()
    .with_bundle("a", &[])
    .with_bundle("e", &[])
    .with_bundle("d", &[]);
  let stats = archives.stats.clone();
  let manifest = StaticManifest::new().with("a", ["d"]).with("e", ["d"]);
  let loader: BundleLoader<String> = BundleLoader::new(archives, manifest, "bundles");

  loader.open_bundle("a").unwrap();
  loader.open_bundle("e").unwrap();
  assert_eq!(loader.counts("d"), counts(0, 2));

  assert!(loader.unload_bundle("a", true));
  assert_eq!(loader.counts("d"), counts(0, 1));
  assert_eq!(stats.unloads("d"), 0);

  assert!(loader.unload_bundle("e", true));
  assert!(!loader.is_open("d"));
  assert_eq!(stats.unloads("d"), 1);
}

#[test]
fn test_referenced_dependency_outlives_the_cascade() {
  let (loader, stats) = chain();
  loader.open_bundle("a").unwrap();
  loader.reference_bundle("d");

  assert!(loader.unload_bundle("a", true));
  assert_eq!(loader.counts("d"), counts(1, 0));
  assert_eq!(stats.unloads("d"), 0);

  loader.unreference_bundle("d");
  assert!(loader.unload_bundle("d", true));
}

#[test]
fn test_counting_is_a_no_op_on_closed_bundles() {
  let (loader, _) = chain();
  loader.reference_bundle("a");
  assert_eq!(loader.counts("a"), None);

  loader.open_bundle("c").unwrap();
  loader.unreference_bundle("c");
  assert_eq!(loader.counts("c"), counts(0, 0), "the direct count saturates at zero");
}

#[test]
fn test_failed_open_leaves_no_entry() {
  let (loader, _) = chain();

  let err = loader.open_bundle("broken").unwrap_err();
  assert_eq!(
    err,
    BundleError::OpenFailed {
      bundle: "broken".to_string(),
      source: ArchiveError::NotFound("broken".to_string()),
    }
  );
  assert!(!loader.is_open("broken"));
  assert!(!loader.is_loading("broken"));
  assert!(matches!(
    loader.load_asset("broken", "x"),
    Err(BundleError::OpenFailed { .. })
  ));
}

#[test]
fn test_load_asset_opens_the_bundle_on_demand() {
  let (loader, stats) = chain();

  let hero = loader.load_asset("a", "hero").unwrap();
  assert_eq!(*hero, "a/hero");
  assert!(loader.is_open("a"));
  assert!(loader.is_open("d"));

  // Asset loads are not reference counted.
  assert_eq!(loader.counts("a"), counts(0, 0));

  let again = loader.load_asset("a", "hero").unwrap();
  assert!(Arc::ptr_eq(&hero, &again));
  assert_eq!(stats.opens("a"), 1);

  assert_eq!(
    loader.load_asset("a", "nope"),
    Err(BundleError::AssetNotFound {
      bundle: "a".to_string(),
      asset: "nope".to_string(),
    })
  );
}

#[test]
fn test_dump_lists_open_bundles() {
  let (loader, _) = chain();
  loader.open_bundle("a").unwrap();
  loader.reference_bundle("a");

  let dump = loader.dump();
  assert!(dump.contains("bundles: 4 open, 0 opening"));
  assert!(dump.contains("a direct=1 dependents=0"));
  assert!(dump.contains("d direct=0 dependents=1"));
}
