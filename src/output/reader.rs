//! Read-only access to a previously gathered tree

use std::path::PathBuf;

use crate::error::Result;

use super::{CLUSTER_DIR, NAMESPACES_DIR, RESOURCE_SUFFIX};

/// Companion read-only view of an [`super::OutputDirectory`] tree.
pub struct OutputReader {
    base: PathBuf,
}

impl OutputReader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// List resource names gathered for `resource` in `namespace`. An empty
    /// namespace selects the cluster scope. Returns an empty list when the
    /// resource directory does not exist.
    pub fn list_resources(&self, namespace: &str, resource: &str) -> Result<Vec<String>> {
        let dir = self.resource_dir(namespace, resource);

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            // Skip pod log directories.
            if entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            names.push(name.trim_end_matches(RESOURCE_SUFFIX).to_string());
        }

        Ok(names)
    }

    /// Read the serialized bytes of a gathered resource.
    pub fn read_resource(&self, namespace: &str, resource: &str, name: &str) -> Result<Vec<u8>> {
        let path = self
            .resource_dir(namespace, resource)
            .join(format!("{name}{RESOURCE_SUFFIX}"));
        Ok(std::fs::read(path)?)
    }

    fn resource_dir(&self, namespace: &str, resource: &str) -> PathBuf {
        if namespace.is_empty() {
            self.base.join(CLUSTER_DIR).join(resource)
        } else {
            self.base.join(NAMESPACES_DIR).join(namespace).join(resource)
        }
    }
}
