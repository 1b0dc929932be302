//! Logs addon: downloads current and previous container logs for every
//! gathered pod.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::AsyncReadExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DynamicObject, LogParams};
use kube::{Api, ResourceExt};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::gather::AddonBackend;

use super::Addon;

pub const NAME: &str = "logs";

pub struct LogsAddon {
    backend: Arc<AddonBackend>,
}

#[derive(Clone, Debug)]
struct ContainerInfo {
    namespace: String,
    pod: String,
    name: String,
    has_previous_log: bool,
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.name)
    }
}

impl LogsAddon {
    pub fn create(backend: Arc<AddonBackend>) -> Result<Box<dyn Addon>> {
        Ok(Box::new(Self { backend }))
    }
}

#[async_trait]
impl Addon for LogsAddon {
    async fn inspect(&self, pod: &DynamicObject) -> Result<()> {
        debug!(
            "Inspecting pod \"{}/{}\"",
            pod.namespace().unwrap_or_default(),
            pod.name_any()
        );

        for container in list_containers(pod) {
            let backend = self.backend.clone();
            let current = container.clone();
            self.backend
                .queue(Box::pin(async move {
                    gather_container_log(&backend, &current, false).await;
                    Ok(())
                }))
                .await?;

            if container.has_previous_log {
                let backend = self.backend.clone();
                self.backend
                    .queue(Box::pin(async move {
                        gather_container_log(&backend, &container, true).await;
                        Ok(())
                    }))
                    .await?;
            }
        }

        Ok(())
    }
}

async fn gather_container_log(backend: &AddonBackend, container: &ContainerInfo, previous: bool) {
    let start = Instant::now();
    let which = if previous { "previous" } else { "current" };

    let api: Api<Pod> = Api::namespaced(backend.client().clone(), &container.namespace);
    let params = LogParams {
        container: Some(container.name.clone()),
        previous,
        ..Default::default()
    };

    let src = match api.log_stream(&container.pod, &params).await {
        Ok(src) => src,
        Err(err) => {
            // Getting the log is possible only while a container is running,
            // and checking the container state before the call is racy. The
            // server answers BadRequest ("waiting to start: PodInitializing")
            // without a way to detect the actual problem, so this stays at
            // debug level.
            debug!("Cannot get log for \"{container}/{which}\": {err}");
            return;
        }
    };

    let mut dst = match backend
        .output()
        .create_container_log(&container.namespace, &container.pod, &container.name, which)
        .await
    {
        Ok(dst) => dst,
        Err(err) => {
            warn!("Cannot create \"{container}/{which}.log\": {err}");
            return;
        }
    };

    let mut src = Box::pin(src);
    let mut buf = vec![0u8; 8192];
    let mut copied: u64 = 0;

    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!("Cannot copy \"{container}/{which}.log\": {err}");
                return;
            }
        };

        if let Err(err) = dst.write_all(&buf[..n]).await {
            warn!("Cannot copy \"{container}/{which}.log\": {err}");
            return;
        }

        copied += n as u64;
    }

    if let Err(err) = dst.flush().await {
        warn!("Cannot copy \"{container}/{which}.log\": {err}");
        return;
    }

    let elapsed = start.elapsed().as_secs_f64();
    let rate = copied as f64 / (1024.0 * 1024.0) / elapsed;
    debug!("Gathered \"{container}/{which}.log\" in {elapsed:.3} seconds ({rate:.2} MiB/s)");
}

/// Collect container and init-container statuses of a pod. Malformed status
/// entries are skipped with a warning; this tolerates cluster-side drift.
fn list_containers(pod: &DynamicObject) -> Vec<ContainerInfo> {
    let namespace = pod.namespace().unwrap_or_default();
    let pod_name = pod.name_any();

    let mut result = Vec::new();

    for key in ["containerStatuses", "initContainerStatuses"] {
        let statuses = match pod.data.pointer(&format!("/status/{key}")) {
            Some(Value::Array(statuses)) => statuses,
            _ => continue,
        };

        for status in statuses {
            let name = match status.get("name").and_then(Value::as_str) {
                Some(name) => name,
                None => {
                    warn!("No container status name for pod \"{namespace}/{pod_name}\"");
                    continue;
                }
            };

            result.push(ContainerInfo {
                namespace: namespace.clone(),
                pod: pod_name.clone(),
                name: name.to_string(),
                has_previous_log: has_previous_log(status),
            });
        }
    }

    result
}

/// A previous log can be fetched when the last container state carries a
/// terminated containerID:
///
///   lastState:
///     terminated:
///       containerID: containerd://...
fn has_previous_log(status: &Value) -> bool {
    match status.pointer("/lastState/terminated/containerID") {
        Some(Value::String(id)) => !id.is_empty(),
        _ => false,
    }
}
