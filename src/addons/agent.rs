//! Transient privileged helper pod pinned to a node, exposing a host path
//! over the standard pod exec channel.

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, Pod, PodSpec, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::{Api, Client};
use tracing::{debug, warn};

use crate::error::{GatherError, Result};

const AGENT_POD_TIMEOUT: Duration = Duration::from_secs(60);
const AGENT_IMAGE: &str = "quay.io/nirsof/busybox:stable-musl";

pub struct AgentPod {
    api: Api<Pod>,
    pod: Pod,
}

impl AgentPod {
    /// Build an agent pod for `node`, mounting `host_path` from the node at
    /// the same path inside the container.
    pub fn new(client: Client, node: &str, host_path: &str) -> Self {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(format!("gather-agent-{node}")),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node.to_string()),
                containers: vec![Container {
                    name: "agent".to_string(),
                    image: Some(AGENT_IMAGE.to_string()),

                    // The agent stops on its own if we fail to delete it, so
                    // we don't waste resources on the target cluster. TERM is
                    // trapped so deletion terminates it immediately.
                    command: Some(
                        ["sh", "-c", "trap exit TERM; sleep 900"]
                            .map(String::from)
                            .to_vec(),
                    ),

                    security_context: Some(SecurityContext {
                        privileged: Some(true),
                        run_as_user: Some(0),
                        ..Default::default()
                    }),

                    volume_mounts: Some(vec![VolumeMount {
                        name: "data".to_string(),
                        mount_path: host_path.to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                volumes: Some(vec![Volume {
                    name: "data".to_string(),
                    host_path: Some(HostPathVolumeSource {
                        path: host_path.to_string(),
                        type_: None,
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        };

        let api = Api::namespaced(client, "default");
        Self { api, pod }
    }

    pub fn pod(&self) -> &Pod {
        &self.pod
    }

    fn name(&self) -> String {
        self.pod.metadata.name.clone().unwrap_or_default()
    }

    pub async fn create(&mut self) -> Result<()> {
        debug!("Starting agent pod {self:?}");
        self.pod = self.api.create(&PostParams::default(), &self.pod).await?;
        Ok(())
    }

    /// Wait until the pod reaches the Running phase, bounded by a 60 second
    /// timeout.
    pub async fn wait_until_running(&self) -> Result<()> {
        let name = self.name();
        let running = await_condition(self.api.clone(), &name, conditions::is_pod_running());

        match tokio::time::timeout(AGENT_POD_TIMEOUT, running).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(GatherError::Remote(format!(
                "agent pod {self:?} watch error: {err}"
            ))),
            Err(_) => Err(GatherError::Timeout(format!(
                "agent pod {self:?} running phase"
            ))),
        }
    }

    /// Delete the pod. Called on every exit path; failures are only logged
    /// since the pod terminates itself eventually.
    pub async fn delete(&self) {
        debug!("Deleting agent pod {self:?}");
        if let Err(err) = self.api.delete(&self.name(), &DeleteParams::default()).await {
            warn!("Cannot delete agent pod {self:?}: {err}");
        }
    }
}

impl fmt::Debug for AgentPod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}/{}\"",
            self.pod.metadata.namespace.as_deref().unwrap_or_default(),
            self.pod.metadata.name.as_deref().unwrap_or_default()
        )
    }
}
