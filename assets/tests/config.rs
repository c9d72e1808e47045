#![cfg(feature = "serde")]

use fibre_assets::config::{DEFAULT_EVICT_AFTER_FRAMES, DEFAULT_RECLAIM_THRESHOLD};
use fibre_assets::{CacheConfig, LoadStrategy};
use std::path::PathBuf;

#[test]
fn test_missing_fields_take_defaults() {
  let config: CacheConfig = serde_json::from_str("{}").unwrap();
  assert_eq!(config, CacheConfig::default());
  assert_eq!(config.evict_after_frames, DEFAULT_EVICT_AFTER_FRAMES);
  assert_eq!(config.reclaim_threshold, DEFAULT_RECLAIM_THRESHOLD);
  assert_eq!(config.strategy, LoadStrategy::Batch);
  assert_eq!(config.bundle_root, PathBuf::from("bundles"));
  assert!(config.autostart);
}

#[test]
fn test_partial_config() {
  let config: CacheConfig =
    serde_json::from_str(r#"{ "strategy": "sequential", "evict_after_frames": 5, "bundle_root": "data/packs" }"#).unwrap();

  assert_eq!(config.strategy, LoadStrategy::Sequential);
  assert_eq!(config.evict_after_frames, 5);
  assert_eq!(config.bundle_root, PathBuf::from("data/packs"));
  assert_eq!(config.reclaim_threshold, DEFAULT_RECLAIM_THRESHOLD);
}

#[test]
fn test_strategies_serialize_in_snake_case() {
  let json = serde_json::to_string(&LoadStrategy::Synchronous).unwrap();
  assert_eq!(json, r#""synchronous""#);
  assert_eq!(LoadStrategy::Synchronous.to_string(), "synchronous");

  assert!(serde_json::from_str::<LoadStrategy>(r#""eager""#).is_err());
}
