//! Kubernetes client abstraction

use std::path::Path;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::error::{GatherError, Result};

/// Create a Kubernetes client for the specified context
pub async fn create_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client> {
    let config = load_config(kubeconfig, context).await?;
    Client::try_from(config).map_err(GatherError::from)
}

/// Load Kubernetes configuration
async fn load_config(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Config> {
    let options = KubeConfigOptions {
        context: context.map(String::from),
        ..Default::default()
    };

    match kubeconfig {
        Some(path) => {
            let kubeconfig = read_kubeconfig(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| GatherError::Config(format!("Failed to load kubeconfig: {e}")))
        }
        None => Config::from_kubeconfig(&options)
            .await
            .map_err(|e| GatherError::Config(format!("Failed to load kubeconfig: {e}"))),
    }
}

/// Get the current context name from the kubeconfig
pub fn current_context(kubeconfig: Option<&Path>) -> Result<String> {
    let kubeconfig = match kubeconfig {
        Some(path) => read_kubeconfig(path)?,
        None => Kubeconfig::read()
            .map_err(|e| GatherError::Config(format!("Failed to read kubeconfig: {e}")))?,
    };

    kubeconfig
        .current_context
        .ok_or_else(|| GatherError::Config("No current context in kubeconfig".to_string()))
}

fn read_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    Kubeconfig::read_from(path)
        .map_err(|e| GatherError::Config(format!("Failed to read kubeconfig: {e}")))
}
