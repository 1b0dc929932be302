//! On-disk layout for gathered data

mod reader;

pub use reader::OutputReader;

use std::path::{Path, PathBuf};

use tokio::fs::{DirBuilder, File};

use crate::error::Result;

pub(crate) const NAMESPACES_DIR: &str = "namespaces";
pub(crate) const CLUSTER_DIR: &str = "cluster";
pub(crate) const ADDONS_DIR: &str = "addons";
pub(crate) const PODS_DIR: &str = "pods";
pub(crate) const RESOURCE_SUFFIX: &str = ".yaml";
pub(crate) const LOG_SUFFIX: &str = ".log";

/// Maps logical resource identities to files under the base directory.
///
/// Namespaced objects:  {base}/namespaces/{namespace}/{resource}/{name}.yaml
/// Cluster objects:     {base}/cluster/{resource}/{name}.yaml
/// Container logs:      {base}/namespaces/{namespace}/pods/{pod}/{container}/{which}.log
/// Addon workspaces:    {base}/addons/{addon}/...
#[derive(Clone, Debug)]
pub struct OutputDirectory {
    base: PathBuf,
}

impl OutputDirectory {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create a write stream for a container log, `which` being "current" or
    /// "previous".
    pub async fn create_container_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        which: &str,
    ) -> Result<File> {
        let dir = self
            .base
            .join(NAMESPACES_DIR)
            .join(namespace)
            .join(PODS_DIR)
            .join(pod)
            .join(container);
        create_directory(&dir).await?;
        create_file(&dir, &format!("{which}{LOG_SUFFIX}")).await
    }

    /// Create a write stream for a namespaced resource dump.
    pub async fn create_namespaced_resource(
        &self,
        namespace: &str,
        resource: &str,
        name: &str,
    ) -> Result<File> {
        let dir = self.base.join(NAMESPACES_DIR).join(namespace).join(resource);
        create_directory(&dir).await?;
        create_file(&dir, &format!("{name}{RESOURCE_SUFFIX}")).await
    }

    /// Create a write stream for a cluster-scoped resource dump.
    pub async fn create_cluster_resource(&self, resource: &str, name: &str) -> Result<File> {
        let dir = self.base.join(CLUSTER_DIR).join(resource);
        create_directory(&dir).await?;
        create_file(&dir, &format!("{name}{RESOURCE_SUFFIX}")).await
    }

    /// Create a working directory for an addon and return its path.
    pub async fn create_addon_dir(&self, name: &str, more: &[&str]) -> Result<PathBuf> {
        let mut dir = self.base.join(ADDONS_DIR).join(name);
        for part in more {
            dir = dir.join(part);
        }
        create_directory(&dir).await?;
        Ok(dir)
    }
}

async fn create_directory(dir: &Path) -> Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder.create(dir).await?;
    Ok(())
}

async fn create_file(dir: &Path, name: &str) -> Result<File> {
    let filename = dir.join(name);
    Ok(File::create(filename).await?)
}
