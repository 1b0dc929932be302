//! Integration tests for the gathering engine
//!
//! These tests require a real Kubernetes cluster.
//! Run with: cargo test -- --ignored

use kubegather::client::create_client;
use kubegather::{Gatherer, Options, OutputReader};

async fn cluster_client() -> kube::Client {
    create_client(None, None).await.expect("Should create client")
}

#[tokio::test]
#[ignore]
async fn test_gather_all_namespaces() {
    let tmp = tempfile::tempdir().unwrap();
    let gatherer = Gatherer::new(cluster_client().await, tmp.path(), Options::default()).unwrap();

    gatherer.gather().await.unwrap();
    assert!(gatherer.count() > 0, "Should gather at least one resource");

    let reader = OutputReader::new(tmp.path());
    let namespaces = reader.list_resources("", "namespaces").unwrap();
    assert!(
        namespaces.contains(&"default".to_string()),
        "Should dump the default namespace"
    );
}

#[tokio::test]
#[ignore]
async fn test_gather_specific_namespace() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        namespaces: Some(vec!["kube-system".to_string()]),
        ..Default::default()
    };
    let gatherer = Gatherer::new(cluster_client().await, tmp.path(), opts).unwrap();

    gatherer.gather().await.unwrap();
    assert!(gatherer.count() > 0);

    let reader = OutputReader::new(tmp.path());

    let pods = reader.list_resources("kube-system", "pods").unwrap();
    assert!(!pods.is_empty(), "kube-system should have pods");

    // Cluster-scoped resources are excluded when filtering, except the
    // namespace dumps themselves.
    let cluster_entries: Vec<_> = std::fs::read_dir(tmp.path().join("cluster"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(cluster_entries, vec!["namespaces"]);
}

#[tokio::test]
#[ignore]
async fn test_gather_missing_namespace() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        namespaces: Some(vec!["no-such-namespace-12345".to_string()]),
        ..Default::default()
    };
    let gatherer = Gatherer::new(cluster_client().await, tmp.path(), opts).unwrap();

    gatherer.gather().await.unwrap();
    assert_eq!(gatherer.count(), 0, "Nothing to gather");
    assert!(
        !tmp.path().join("namespaces").exists(),
        "No namespace directory should be created"
    );
}

#[tokio::test]
#[ignore]
async fn test_gather_without_addons() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = Options {
        addons: Some(Vec::new()),
        ..Default::default()
    };
    let gatherer = Gatherer::new(cluster_client().await, tmp.path(), opts).unwrap();

    gatherer.gather().await.unwrap();
    assert!(gatherer.count() > 0);

    assert!(
        !tmp.path().join("addons").exists(),
        "No addon output should be created"
    );
}

#[tokio::test]
#[ignore]
async fn test_reader_round_trip_on_gathered_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let gatherer = Gatherer::new(cluster_client().await, tmp.path(), Options::default()).unwrap();
    gatherer.gather().await.unwrap();

    let reader = OutputReader::new(tmp.path());
    let namespaces = reader.list_resources("", "namespaces").unwrap();

    for name in namespaces {
        let data = reader.read_resource("", "namespaces", &name).unwrap();
        let disk = std::fs::read(
            tmp.path()
                .join("cluster/namespaces")
                .join(format!("{name}.yaml")),
        )
        .unwrap();
        assert_eq!(data, disk);
    }
}
