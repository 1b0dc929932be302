//! Tests for src/gather/mod.rs - job construction and option validation

use kubegather::{available_addons, Gatherer, Options};

use crate::common::offline_client;

// ============================================================================
// Option validation tests
// ============================================================================

#[tokio::test]
async fn test_new_with_default_options() {
    let tmp = tempfile::tempdir().unwrap();
    let gatherer = Gatherer::new(offline_client(), tmp.path(), Options::default());
    assert!(gatherer.is_ok());
}

#[tokio::test]
async fn test_new_with_namespace_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        namespaces: Some(vec!["test-common".to_string()]),
        ..Default::default()
    };
    assert!(Gatherer::new(offline_client(), tmp.path(), opts).is_ok());
}

#[tokio::test]
async fn test_new_rejects_empty_namespace_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        namespaces: Some(Vec::new()),
        ..Default::default()
    };
    assert!(Gatherer::new(offline_client(), tmp.path(), opts).is_err());
}

#[tokio::test]
async fn test_new_rejects_empty_namespace_name() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        namespaces: Some(vec!["".to_string()]),
        ..Default::default()
    };
    assert!(Gatherer::new(offline_client(), tmp.path(), opts).is_err());
}

#[tokio::test]
async fn test_new_rejecting_filter_creates_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = tmp.path().join("cluster1");
    let opts = Options {
        namespaces: Some(vec!["".to_string()]),
        ..Default::default()
    };

    assert!(Gatherer::new(offline_client(), &directory, opts).is_err());
    assert!(!directory.exists());
}

// ============================================================================
// Addon configuration tests
// ============================================================================

#[tokio::test]
async fn test_new_with_all_addons_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        addons: Some(Vec::new()),
        ..Default::default()
    };
    assert!(Gatherer::new(offline_client(), tmp.path(), opts).is_ok());
}

#[tokio::test]
async fn test_new_with_unknown_addon_name() {
    // Unknown names simply enable nothing; the job itself is valid.
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        addons: Some(vec!["nonexistent".to_string()]),
        ..Default::default()
    };
    assert!(Gatherer::new(offline_client(), tmp.path(), opts).is_ok());
}

#[test]
fn test_available_addons_sorted_set() {
    let mut names = available_addons();
    names.sort();
    assert_eq!(names, vec!["logs", "pvcs", "rook"]);
}

// ============================================================================
// Count tests
// ============================================================================

#[tokio::test]
async fn test_count_starts_at_zero() {
    let tmp = tempfile::tempdir().unwrap();
    let gatherer = Gatherer::new(offline_client(), tmp.path(), Options::default()).unwrap();
    assert_eq!(gatherer.count(), 0);
}
