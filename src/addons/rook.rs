//! Rook addon: gathers ceph command output from the toolbox pod and, when
//! the cluster keeps logs on the nodes, the per-node log directories under
//! dataDirHostPath.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DynamicObject, ListParams};
use kube::{Api, ResourceExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::gather::AddonBackend;

use super::agent::AgentPod;
use super::remote::{RemoteCommand, RemoteDirectory};
use super::Addon;

pub const NAME: &str = "rook";

const TOOLS_SELECTOR: &str = "app=rook-ceph-tools";

pub struct RookAddon {
    backend: Arc<AddonBackend>,
}

impl RookAddon {
    pub fn create(backend: Arc<AddonBackend>) -> Result<Box<dyn Addon>> {
        Ok(Box::new(Self { backend }))
    }
}

#[async_trait]
impl Addon for RookAddon {
    async fn inspect(&self, cephcluster: &DynamicObject) -> Result<()> {
        let namespace = match cephcluster.namespace() {
            Some(namespace) => namespace,
            None => return Ok(()),
        };

        debug!(
            "Gathering data for cephcluster \"{namespace}/{}\"",
            cephcluster.name_any()
        );

        let backend = self.backend.clone();
        let commands_namespace = namespace.clone();
        self.backend
            .queue(Box::pin(async move {
                gather_commands(&backend, &commands_namespace).await;
                Ok(())
            }))
            .await?;

        if log_collector_enabled(cephcluster) {
            if let Some(data_dir) = data_dir_host_path(cephcluster) {
                self.gather_node_logs(&namespace, &data_dir).await?;
            }
        }

        Ok(())
    }
}

impl RookAddon {
    /// Queue one log-collection unit per node running pods in the cluster
    /// namespace. Each unit runs a privileged agent pod on its node and
    /// copies `{data_dir}/{namespace}/log` out of it.
    async fn gather_node_logs(&self, namespace: &str, data_dir: &str) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.backend.client().clone(), namespace);

        let pods = match api.list(&ListParams::default()).await {
            Ok(pods) => pods,
            Err(err) => {
                warn!("Cannot list pods in {namespace:?}: {err}");
                return Ok(());
            }
        };

        let nodes: BTreeSet<String> = pods
            .items
            .iter()
            .filter_map(|pod| pod.spec.as_ref().and_then(|spec| spec.node_name.clone()))
            .collect();

        let src = format!("{}/{namespace}/log", data_dir.trim_end_matches('/'));

        for node in nodes {
            let backend = self.backend.clone();
            let data_dir = data_dir.to_string();
            let src = src.clone();

            self.backend
                .queue(Box::pin(async move {
                    gather_node_log_dir(&backend, &node, &data_dir, &src).await
                }))
                .await?;
        }

        Ok(())
    }
}

async fn gather_commands(backend: &Arc<AddonBackend>, namespace: &str) {
    let tools = match find_pod(backend, namespace, TOOLS_SELECTOR).await {
        Some(tools) => tools,
        None => {
            debug!("Cannot find rook-ceph-tools pod in {namespace:?}");
            return;
        }
    };

    debug!("Using pod {:?}", tools.name_any());

    let directory = match backend.output().create_addon_dir(NAME, &["commands"]).await {
        Ok(directory) => directory,
        Err(err) => {
            warn!("Cannot create {NAME} commands directory: {err}");
            return;
        }
    };

    let rc = match RemoteCommand::new(backend.client().clone(), &tools, directory) {
        Ok(rc) => Arc::new(rc),
        Err(err) => {
            warn!("Cannot exec in pod {:?}: {err}", tools.name_any());
            return;
        }
    };

    // Running the remote ceph commands in parallel is much faster.
    let blocklist_rc = rc.clone();
    let work = Box::pin(async move {
        gather_command(&blocklist_rc, &["ceph", "osd", "blocklist", "ls"]).await;
        Ok(())
    });

    if backend.queue(work).await.is_err() {
        // The queue stopped accepting work while we were draining it; run on
        // this worker instead.
        gather_command(&rc, &["ceph", "osd", "blocklist", "ls"]).await;
    }

    gather_command(&rc, &["ceph", "status"]).await;
}

async fn gather_command(rc: &RemoteCommand, command: &[&str]) {
    if let Err(err) = rc.gather(command).await {
        warn!("Error running {:?}: {err}", rc.filename(command));
    }
}

/// One inspect-queue unit: copy the node's log directory through an agent
/// pod. The pod is deleted on every exit path; a node where the pod cannot
/// be scheduled is skipped with a warning.
async fn gather_node_log_dir(
    backend: &Arc<AddonBackend>,
    node: &str,
    data_dir: &str,
    src: &str,
) -> Result<()> {
    let dst = backend.output().create_addon_dir(NAME, &["logs", node]).await?;

    let mut agent = AgentPod::new(backend.client().clone(), node, data_dir);

    if let Err(err) = agent.create().await {
        // Typically admission rejecting the privileged pod on this node.
        warn!("Cannot create agent pod on node {node:?}: {err}");
        return Ok(());
    }

    let gathered = gather_from_agent(backend, &agent, src, &dst).await;
    agent.delete().await;
    gathered
}

async fn gather_from_agent(
    backend: &Arc<AddonBackend>,
    agent: &AgentPod,
    src: &str,
    dst: &std::path::Path,
) -> Result<()> {
    agent.wait_until_running().await?;

    let rd = RemoteDirectory::new(backend.client().clone(), agent.pod())?;
    rd.gather(src, dst).await
}

async fn find_pod(backend: &Arc<AddonBackend>, namespace: &str, selector: &str) -> Option<Pod> {
    let api: Api<Pod> = Api::namespaced(backend.client().clone(), namespace);
    let params = ListParams::default().labels(selector);

    match api.list(&params).await {
        Ok(pods) => pods.items.into_iter().next(),
        Err(err) => {
            warn!("Cannot list pods matching {selector:?} in {namespace:?}: {err}");
            None
        }
    }
}

fn log_collector_enabled(cephcluster: &DynamicObject) -> bool {
    matches!(
        cephcluster.data.pointer("/spec/logCollector/enabled"),
        Some(Value::Bool(true))
    )
}

fn data_dir_host_path(cephcluster: &DynamicObject) -> Option<String> {
    match cephcluster.data.pointer("/spec/dataDirHostPath") {
        Some(Value::String(path)) if !path.is_empty() => Some(path.clone()),
        _ => None,
    }
}
