//! Pluggable inspectors bound to specific resource kinds

mod agent;
mod remote;

pub mod logs;
pub mod pvcs;
pub mod rook;

pub use agent::AgentPod;
pub use remote::{RemoteCommand, RemoteDirectory};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DynamicObject;

use crate::error::Result;
use crate::gather::AddonBackend;

/// An addon inspects gathered objects of one resource kind and fetches
/// related data, typically by queueing follow-up work on the inspect queue.
#[async_trait]
pub trait Addon: Send + Sync {
    /// Inspect a resource and gather related data.
    async fn inspect(&self, obj: &DynamicObject) -> Result<()>;
}

type AddonConstructor = fn(Arc<AddonBackend>) -> Result<Box<dyn Addon>>;

/// Registration entry binding an addon name to the resource it inspects.
pub struct AddonInfo {
    pub name: &'static str,
    pub resource: &'static str,
    constructor: AddonConstructor,
}

/// The full addon registry. Built explicitly so tests and callers see the
/// same set; treated read-only at runtime.
fn registry() -> Vec<AddonInfo> {
    vec![
        AddonInfo {
            name: logs::NAME,
            resource: "pods",
            constructor: logs::LogsAddon::create,
        },
        AddonInfo {
            name: pvcs::NAME,
            resource: "persistentvolumeclaims",
            constructor: pvcs::PvcsAddon::create,
        },
        AddonInfo {
            name: rook::NAME,
            resource: "ceph.rook.io/cephclusters",
            constructor: rook::RookAddon::create,
        },
    ]
}

/// Instantiate every enabled addon, keyed by the resource name it inspects.
pub fn create_addons(backend: &Arc<AddonBackend>) -> Result<HashMap<String, Box<dyn Addon>>> {
    let mut addons = HashMap::new();

    for info in registry() {
        if addon_enabled(info.name, backend.options().addons.as_deref()) {
            let addon = (info.constructor)(backend.clone())?;
            addons.insert(info.resource.to_string(), addon);
        }
    }

    Ok(addons)
}

/// Names of all registered addons.
pub fn available_addons() -> Vec<&'static str> {
    registry().iter().map(|info| info.name).collect()
}

fn addon_enabled(name: &str, enabled: Option<&[String]>) -> bool {
    match enabled {
        None => true,
        Some(names) => names.iter().any(|n| n == name),
    }
}
