//! Tests for src/output - path layout and reader round-trips

use kubegather::{OutputDirectory, OutputReader};
use tokio::io::AsyncWriteExt;

// ============================================================================
// OutputDirectory layout tests
// ============================================================================

#[tokio::test]
async fn test_namespaced_resource_path() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    let mut dst = output
        .create_namespaced_resource("test-common", "pods", "busybox")
        .await
        .unwrap();
    dst.write_all(b"kind: Pod\n").await.unwrap();
    dst.flush().await.unwrap();

    assert!(tmp
        .path()
        .join("namespaces/test-common/pods/busybox.yaml")
        .is_file());
}

#[tokio::test]
async fn test_namespaced_resource_path_with_group() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    output
        .create_namespaced_resource("test-common", "apps/deployments", "web")
        .await
        .unwrap();

    assert!(tmp
        .path()
        .join("namespaces/test-common/apps/deployments/web.yaml")
        .exists());
}

#[tokio::test]
async fn test_cluster_resource_path() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    output
        .create_cluster_resource("storage.k8s.io/storageclasses", "standard")
        .await
        .unwrap();

    assert!(tmp
        .path()
        .join("cluster/storage.k8s.io/storageclasses/standard.yaml")
        .exists());
}

#[tokio::test]
async fn test_container_log_path() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    let mut dst = output
        .create_container_log("test-common", "busybox-0", "busybox", "current")
        .await
        .unwrap();
    dst.write_all(b"hello\n").await.unwrap();
    dst.flush().await.unwrap();

    assert!(tmp
        .path()
        .join("namespaces/test-common/pods/busybox-0/busybox/current.log")
        .is_file());
}

#[tokio::test]
async fn test_addon_dir_path() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    let dir = output
        .create_addon_dir("rook", &["logs", "worker-1"])
        .await
        .unwrap();

    assert_eq!(dir, tmp.path().join("addons/rook/logs/worker-1"));
    assert!(dir.is_dir());
}

#[tokio::test]
async fn test_create_truncates_existing_file() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    let mut dst = output
        .create_cluster_resource("nodes", "node1")
        .await
        .unwrap();
    dst.write_all(b"first write, longer content\n").await.unwrap();
    dst.flush().await.unwrap();
    drop(dst);

    let mut dst = output
        .create_cluster_resource("nodes", "node1")
        .await
        .unwrap();
    dst.write_all(b"second\n").await.unwrap();
    dst.flush().await.unwrap();
    drop(dst);

    let content = std::fs::read(tmp.path().join("cluster/nodes/node1.yaml")).unwrap();
    assert_eq!(content, b"second\n");
}

// ============================================================================
// OutputReader tests
// ============================================================================

#[tokio::test]
async fn test_reader_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    let data = b"kind: ConfigMap\nmetadata:\n  name: settings\n";
    let mut dst = output
        .create_namespaced_resource("test-common", "configmaps", "settings")
        .await
        .unwrap();
    dst.write_all(data).await.unwrap();
    dst.flush().await.unwrap();
    drop(dst);

    let reader = OutputReader::new(tmp.path());
    let read = reader
        .read_resource("test-common", "configmaps", "settings")
        .unwrap();
    assert_eq!(read, data);
}

#[tokio::test]
async fn test_reader_lists_resource_names() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    for name in ["alpha", "beta"] {
        output
            .create_namespaced_resource("test-common", "secrets", name)
            .await
            .unwrap();
    }

    let reader = OutputReader::new(tmp.path());
    let mut names = reader.list_resources("test-common", "secrets").unwrap();
    names.sort();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_reader_lists_cluster_scope() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    output
        .create_cluster_resource("nodes", "control-plane")
        .await
        .unwrap();

    let reader = OutputReader::new(tmp.path());
    assert_eq!(
        reader.list_resources("", "nodes").unwrap(),
        vec!["control-plane"]
    );
}

#[tokio::test]
async fn test_reader_skips_pod_log_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let output = OutputDirectory::new(tmp.path());

    output
        .create_namespaced_resource("test-common", "pods", "busybox-0")
        .await
        .unwrap();
    output
        .create_container_log("test-common", "busybox-0", "busybox", "current")
        .await
        .unwrap();

    let reader = OutputReader::new(tmp.path());
    assert_eq!(
        reader.list_resources("test-common", "pods").unwrap(),
        vec!["busybox-0"]
    );
}

#[test]
fn test_reader_missing_directory_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let reader = OutputReader::new(tmp.path());

    let names = reader.list_resources("no-such-ns", "pods").unwrap();
    assert!(names.is_empty());
}

#[test]
fn test_reader_missing_resource_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let reader = OutputReader::new(tmp.path());

    assert!(reader.read_resource("ns", "pods", "missing").is_err());
}
