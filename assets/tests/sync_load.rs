mod common;

use common::harness;
use fibre_assets::LoadError;
use std::sync::Arc;

#[test]
fn test_load_creates_entry_with_one_reference() {
  let h = harness(&["hero.png"]);

  let value = h.cache.load("hero.png").unwrap();
  assert_eq!(*value, "content of hero.png");
  assert_eq!(h.cache.reference_count(&value), 1);
  assert_eq!(h.cache.len(), 1);

  // A second load is a hit: same value, no extra reference.
  let again = h.cache.load("hero.png").unwrap();
  assert!(Arc::ptr_eq(&value, &again));
  assert_eq!(h.cache.reference_count(&value), 1);
  assert_eq!(h.source.loads(), 1, "source should be hit only once");

  let metrics = h.cache.metrics();
  assert_eq!(metrics.misses, 1);
  assert_eq!(metrics.hits, 1);
  assert_eq!(metrics.admitted, 1);
}

#[test]
fn test_missing_path_is_an_error_and_creates_no_entry() {
  let h = harness(&[]);

  let result = h.cache.load("missing.png");
  assert_eq!(
    result,
    Err(LoadError::NotFound {
      path: "missing.png".to_string()
    })
  );
  assert!(h.cache.is_empty());
  assert!(!h.cache.contains("missing.png"));
  assert_eq!(h.cache.metrics().load_failures, 1);
}

#[test]
fn test_reference_and_unreference() {
  let h = harness(&["a"]);
  let value = h.cache.load("a").unwrap();

  assert!(h.cache.reference(&value));
  assert_eq!(h.cache.reference_count(&value), 2);

  assert!(h.cache.unreference(&value));
  assert!(h.cache.unreference(&value));
  assert_eq!(h.cache.reference_count(&value), 0);
  assert!(!h.cache.has_reference(&value));

  // The count never goes below zero.
  assert!(!h.cache.unreference(&value));
  assert_eq!(h.cache.reference_count(&value), 0);
  assert!(h.cache.is_managed(&value));
}

#[test]
fn test_unmanaged_values_are_ignored() {
  let h = harness(&["a"]);
  h.cache.load("a").unwrap();

  let stranger = Arc::new("content of a".to_string());
  assert!(!h.cache.is_managed(&stranger));
  assert!(!h.cache.reference(&stranger));
  assert!(!h.cache.unreference(&stranger));
  assert_eq!(h.cache.reference_count(&stranger), 0);
}

#[test]
fn test_get_does_not_touch_counts_or_metrics() {
  let h = harness(&["a"]);
  assert!(h.cache.get("a").is_none());

  let value = h.cache.load("a").unwrap();
  let peeked = h.cache.get("a").unwrap();
  assert!(Arc::ptr_eq(&value, &peeked));
  assert_eq!(h.cache.reference_count(&value), 1);

  let metrics = h.cache.metrics();
  assert_eq!(metrics.hits, 0);
  assert_eq!(metrics.misses, 1);
}

#[test]
fn test_dump_lists_entries() {
  let h = harness(&["b", "a"]);
  h.cache.load("b").unwrap();
  let a = h.cache.load("a").unwrap();
  h.cache.unreference(&a);

  let dump = h.cache.dump();
  assert!(dump.contains("assets: 2"));
  assert!(dump.contains("a refs=0 idle=0"));
  assert!(dump.contains("b refs=1 idle=0"));
  assert!(dump.find("a refs").unwrap() < dump.find("b refs").unwrap());
  assert!(dump.contains("queued requests: 0"));
}
