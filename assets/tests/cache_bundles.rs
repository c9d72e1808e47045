mod common;

use common::{bundle_harness, MemoryArchives};
use fibre_assets::{BundleCounts, BundleError, CacheBuilder, LoadError, StaticManifest};
use parking_lot::Mutex;
use std::sync::Arc;

fn archives() -> MemoryArchives {
  MemoryArchives::new()
    .with_bundle("ui", &["button", "icon"])
    .with_bundle("core", &["font"])
}

fn manifest() -> StaticManifest {
  StaticManifest::new().with("ui", ["core"])
}

#[test]
fn test_bundled_paths_load_through_the_bundle_loader() {
  let h = bundle_harness(archives(), manifest(), |b| b.autostart(false));

  let button = h.cache.load("ui:button").unwrap();
  assert_eq!(*button, "ui/button");
  assert_eq!(h.cache.reference_count(&button), 1);

  let bundles = h.cache.bundles().unwrap();
  assert!(bundles.is_open("ui"));
  assert_eq!(
    bundles.counts("core"),
    Some(BundleCounts {
      direct: 0,
      dependents: 1
    })
  );
  // A plain load takes no bundle reference.
  assert!(!bundles.has_reference("ui"));
  assert!(h.cache.dump().contains("ui:button refs=1 idle=0 bundle=ui"));
}

#[test]
fn test_missing_bundled_asset_is_an_error() {
  let h = bundle_harness(archives(), manifest(), |b| b.autostart(false));

  assert_eq!(
    h.cache.load("ui:nope"),
    Err(LoadError::Bundle(BundleError::AssetNotFound {
      bundle: "ui".to_string(),
      asset: "nope".to_string(),
    }))
  );
  assert!(h.cache.is_empty());
}

#[test]
fn test_reference_counts_forward_to_the_bundle() {
  let h = bundle_harness(archives(), manifest(), |b| b.autostart(false));
  let button = h.cache.load("ui:button").unwrap();
  let bundles = h.cache.bundles().unwrap();

  h.cache.reference(&button);
  assert_eq!(bundles.counts("ui").unwrap().direct, 1);

  h.cache.unreference(&button);
  assert_eq!(bundles.counts("ui").unwrap().direct, 0);
}

#[test]
fn test_evicting_the_last_asset_unloads_the_bundle_and_its_dependencies() {
  let h = bundle_harness(archives(), manifest(), |b| b.autostart(false).evict_after_frames(0));
  let button = h.cache.load("ui:button").unwrap();
  h.cache.unreference(&button);

  assert_eq!(h.cache.sweep(), 1);
  let bundles = h.cache.bundles().unwrap();
  assert_eq!(bundles.open_count(), 0);
  assert_eq!(h.archives.unloads("ui"), 1);
  assert_eq!(h.archives.unloads("core"), 1);

  let metrics = h.cache.metrics();
  assert_eq!(metrics.bundles_opened, 2);
  assert_eq!(metrics.bundles_unloaded, 2);
}

#[test]
fn test_bundle_with_a_referenced_asset_stays_open() {
  let h = bundle_harness(archives(), manifest(), |b| b.autostart(false).evict_after_frames(0));
  let button = h.cache.load("ui:button").unwrap();
  let icon = h.cache.load("ui:icon").unwrap();

  h.cache.unreference(&icon);
  // Someone else still wants the button.
  h.cache.reference(&button);

  assert_eq!(h.cache.sweep(), 1);
  assert!(!h.cache.contains("ui:icon"));
  assert!(h.cache.bundles().unwrap().is_open("ui"));
  assert_eq!(h.archives.unloads("ui"), 0);
}

#[test]
fn test_async_bundled_load() {
  let h = bundle_harness(archives(), manifest(), |b| b);
  let result = Arc::new(Mutex::new(None));

  let slot = result.clone();
  h.cache.load_async("ui:icon", move |loaded| *slot.lock() = Some(loaded));
  h.scheduler.tick();

  let icon = result.lock().take().unwrap().unwrap();
  assert_eq!(*icon, "ui/icon");
  assert_eq!(h.cache.reference_count(&icon), 1);
  assert!(h.cache.bundles().unwrap().is_open("core"));
}

#[test]
fn test_bundle_root_comes_from_the_config() {
  let h = bundle_harness(archives(), manifest(), |b| b.autostart(false).bundle_root("packs"));
  assert_eq!(h.cache.bundles().unwrap().root(), std::path::Path::new("packs"));
}

#[test]
fn test_resolver_without_bundles_is_rejected() {
  let result = CacheBuilder::<String>::new(common::MemorySource::new(&[]))
    .resolver(common::colon_paths)
    .build();
  assert_eq!(
    result.err().map(|e| e.to_string()),
    Some("a path resolver requires bundle support (archive store and manifest)".to_string())
  );
}
