//! Remote command and directory capture over the pod exec subprotocol.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Instant;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::AttachParams;
use kube::{Api, Client, ResourceExt};
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{GatherError, Result};

// tar may exit with code 1 when a file changed while copying it, an expected
// condition for live log files. The exit code alone is ambiguous, so the
// stderr text must match as well.
static TAR_FILE_CHANGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^tar: .+ file changed as we read it$").expect("valid pattern")
});

static SPECIAL_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w./]+").expect("valid pattern"));

/// Runs commands in a pod's first container, storing their output under a
/// local directory, one file per command.
pub struct RemoteCommand {
    api: Api<Pod>,
    pod: String,
    container: String,
    directory: PathBuf,
}

impl RemoteCommand {
    pub fn new(client: Client, pod: &Pod, directory: PathBuf) -> Result<Self> {
        let (api, name, container) = pod_target(client, pod)?;
        Ok(Self {
            api,
            pod: name,
            container,
            directory,
        })
    }

    pub async fn gather(&self, command: &[&str]) -> Result<()> {
        let start = Instant::now();
        let filename = self.filename(command);

        let mut dst = tokio::fs::File::create(self.directory.join(&filename)).await?;

        let params = AttachParams::default()
            .container(&self.container)
            .stdout(true)
            .stderr(false);

        let mut attached = self
            .api
            .exec(&self.pod, command.iter().copied(), &params)
            .await?;

        let mut stdout = attached
            .stdout()
            .ok_or_else(|| GatherError::Remote("no stdout stream from exec".to_string()))?;
        let status = attached.take_status();

        tokio::io::copy(&mut stdout, &mut dst).await?;

        if let Some(status) = status {
            check_remote_status(status.await, &filename)?;
        }

        debug!(
            "Gathered {filename} in {:.3} seconds",
            start.elapsed().as_secs_f64()
        );

        Ok(())
    }

    pub fn filename(&self, command: &[&str]) -> String {
        command_filename(command)
    }
}

/// Copies a remote directory by piping `tar cf -` from the pod into a local
/// `tar xf -` child process rooted at the destination.
pub struct RemoteDirectory {
    api: Api<Pod>,
    pod: String,
    container: String,
}

impl RemoteDirectory {
    pub fn new(client: Client, pod: &Pod) -> Result<Self> {
        let (api, name, container) = pod_target(client, pod)?;
        Ok(Self {
            api,
            pod: name,
            container,
        })
    }

    pub async fn gather(&self, src: &str, dst: &std::path::Path) -> Result<()> {
        let params = AttachParams::default()
            .container(&self.container)
            .stdout(true)
            .stderr(true);

        let mut attached = self
            .api
            .exec(&self.pod, ["tar", "cf", "-", src], &params)
            .await?;

        let mut remote_out = attached
            .stdout()
            .ok_or_else(|| GatherError::Remote("no stdout stream from exec".to_string()))?;
        let mut remote_err = attached
            .stderr()
            .ok_or_else(|| GatherError::Remote("no stderr stream from exec".to_string()))?;
        let remote_status = attached.take_status();

        let mut local = Command::new("tar")
            .arg("xf")
            .arg("-")
            .arg(format!("--directory={}", dst.display()))
            .arg(format!("--strip-components={}", path_components(src)))
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = local
            .stdin
            .take()
            .ok_or_else(|| GatherError::Remote("no stdin for local tar".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = remote_err.read_to_string(&mut text).await;
            text
        });

        let copied = tokio::io::copy(&mut remote_out, &mut stdin).await;
        drop(stdin);

        // Wait for the local tar first: when the remote tar fails the local
        // one exits, but a failing local tar leaves the remote stream stuck.
        let output = local.wait_with_output().await?;
        let status = match remote_status {
            Some(status) => status.await,
            None => None,
        };
        let stderr = stderr_task.await.unwrap_or_default();

        if let Some(status) = status {
            if is_failure(&status) && !is_file_changed_error(&status, &stderr) {
                return Err(GatherError::Remote(format!(
                    "remote tar error: {}: {stderr:?}",
                    status.message.unwrap_or_default()
                )));
            }
        }

        if !output.status.success() {
            return Err(GatherError::Remote(format!(
                "local tar error: {}: {:?}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        copied?;
        Ok(())
    }
}

fn pod_target(client: Client, pod: &Pod) -> Result<(Api<Pod>, String, String)> {
    let namespace = pod
        .namespace()
        .ok_or_else(|| GatherError::Remote("pod has no namespace".to_string()))?;

    let container = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .map(|container| container.name.clone())
        .ok_or_else(|| GatherError::Remote("pod has no containers".to_string()))?;

    let api = Api::namespaced(client, &namespace);
    Ok((api, pod.name_any(), container))
}

fn check_remote_status(status: Option<Status>, what: &str) -> Result<()> {
    match status {
        Some(status) if is_failure(&status) => Err(GatherError::Remote(format!(
            "{what}: {}",
            status.message.unwrap_or_default()
        ))),
        _ => Ok(()),
    }
}

fn is_failure(status: &Status) -> bool {
    status.status.as_deref() == Some("Failure")
}

fn is_file_changed_error(status: &Status, stderr: &str) -> bool {
    exit_code(status) == Some(1) && TAR_FILE_CHANGED.is_match(stderr)
}

/// Extract the process exit code from an exec termination status.
fn exit_code(status: &Status) -> Option<i32> {
    let causes = status.details.as_ref()?.causes.as_ref()?;
    causes
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        .and_then(|cause| cause.message.as_deref())
        .and_then(|code| code.parse().ok())
}

/// Sanitized file name for a command's captured output.
pub fn command_filename(command: &[&str]) -> String {
    SPECIAL_CHARACTERS
        .replace_all(&command.join(" "), "-")
        .into_owned()
}

/// Number of components stripped by the local tar so the copied directory
/// lands at the destination root.
fn path_components(path: &str) -> usize {
    path.trim_matches('/').matches('/').count() + 1
}
