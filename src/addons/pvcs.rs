//! PVCs addon: materializes the PersistentVolume and StorageClass referenced
//! by each gathered claim. Only needed when gathering specific namespaces;
//! a full sweep already covers the cluster-scoped references.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::ResourceExt;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::gather::AddonBackend;

use super::Addon;

pub const NAME: &str = "pvcs";

pub struct PvcsAddon {
    backend: Arc<AddonBackend>,
}

impl PvcsAddon {
    pub fn create(backend: Arc<AddonBackend>) -> Result<Box<dyn Addon>> {
        Ok(Box::new(Self { backend }))
    }
}

#[async_trait]
impl Addon for PvcsAddon {
    async fn inspect(&self, pvc: &DynamicObject) -> Result<()> {
        if self.backend.options().namespaces.is_none() {
            return Ok(());
        }

        debug!(
            "Inspecting pvc \"{}/{}\"",
            pvc.namespace().unwrap_or_default(),
            pvc.name_any()
        );

        self.gather_persistent_volume(pvc).await;
        self.gather_storage_class(pvc).await;

        Ok(())
    }
}

impl PvcsAddon {
    async fn gather_persistent_volume(&self, pvc: &DynamicObject) {
        // An unbound claim has no volume yet; nothing to cross-reference.
        let name = match spec_string(pvc, "volumeName") {
            Some(name) => name,
            None => return,
        };

        let resource = ApiResource::erase::<PersistentVolume>(&());
        self.backend.gather_resource(resource, None, &name).await;
    }

    async fn gather_storage_class(&self, pvc: &DynamicObject) {
        let name = match spec_string(pvc, "storageClassName") {
            Some(name) => name,
            None => return,
        };

        let resource = ApiResource::erase::<StorageClass>(&());
        self.backend.gather_resource(resource, None, &name).await;
    }
}

fn spec_string(pvc: &DynamicObject, field: &str) -> Option<String> {
    match pvc.data.pointer(&format!("/spec/{field}")) {
        Some(Value::String(value)) if !value.is_empty() => Some(value.clone()),
        _ => None,
    }
}
