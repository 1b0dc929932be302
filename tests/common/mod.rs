// Common test utilities and helpers

#![allow(dead_code)]

use kube::api::DynamicObject;
use kube::{Client, Config};

/// Create a client that points at an unreachable cluster. Good enough for
/// constructing gatherers and APIs; tests that talk to a real cluster are
/// in tests/integration and marked #[ignore].
pub fn offline_client() -> Client {
    let config = Config::new("https://127.0.0.1:6443".parse().unwrap());
    Client::try_from(config).unwrap()
}

/// Create a mock pod object in the raw dynamic form the engine gathers.
pub fn dynamic_pod(name: &str, namespace: &str, containers: &[&str]) -> DynamicObject {
    let statuses: Vec<_> = containers
        .iter()
        .map(|name| serde_json::json!({"name": name, "restartCount": 0}))
        .collect();

    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "containers": containers.iter()
                .map(|name| serde_json::json!({"name": name, "image": "busybox"}))
                .collect::<Vec<_>>(),
        },
        "status": {"containerStatuses": statuses},
    }))
    .unwrap()
}

/// Check if running in a Kubernetes environment (has kubeconfig)
pub fn has_kubeconfig() -> bool {
    std::env::var("KUBECONFIG").is_ok()
        || std::path::Path::new(&format!(
            "{}/.kube/config",
            std::env::var("HOME").unwrap_or_default()
        ))
        .exists()
}
