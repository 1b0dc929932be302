//! kubegather - gather diagnostic data from Kubernetes clusters

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use kubegather::cli::Cli;
use kubegather::client::{create_client, current_context};
use kubegather::gather::{Gatherer, Options};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let start = Instant::now();

    let directory = cli.directory.clone().unwrap_or_else(default_directory);
    create_base_directory(&directory)?;
    setup_tracing(&directory, cli.verbose)?;

    let contexts = if cli.contexts.is_empty() {
        vec![current_context(cli.kubeconfig.as_deref())?]
    } else {
        cli.contexts.clone()
    };

    // --addons= disables all addons: drop the empty name the delimiter
    // parsing leaves behind, keeping the list itself.
    let addons = cli
        .addons
        .map(|names| names.into_iter().filter(|n| !n.is_empty()).collect::<Vec<_>>());

    if let Some(namespaces) = &cli.namespaces {
        info!("Gathering from namespaces {namespaces:?}");
    } else {
        info!("Gathering from all namespaces");
    }

    match &addons {
        Some(addons) => info!("Using addons {addons:?}"),
        None => info!("Using all addons"),
    }

    info!("Storing data in {directory:?}");

    let mut jobs = Vec::new();

    for context in &contexts {
        info!("Gathering from cluster {context:?}");

        let kubeconfig = cli.kubeconfig.clone();
        let directory = directory.join(context);
        let opts = Options {
            context: context.clone(),
            namespaces: cli.namespaces.clone(),
            addons: addons.clone(),
        };

        jobs.push(tokio::spawn(async move {
            gather_cluster(kubeconfig.as_deref(), directory, opts).await
        }));
    }

    let mut total = 0;
    let mut failed = false;

    for job in jobs {
        match job.await? {
            Ok(count) => total += count,
            Err(err) => {
                error!("{err}");
                failed = true;
            }
        }
    }

    if failed {
        bail!("gathering failed");
    }

    if cli.namespaces.is_some() && total == 0 {
        // Likely a user error like a wrong namespace name.
        warn!(
            "No resource gathered from namespaces {:?}",
            cli.namespaces.unwrap_or_default()
        );
    }

    info!(
        "Gathered {total} resources from {} clusters in {:.3} seconds",
        contexts.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

async fn gather_cluster(
    kubeconfig: Option<&Path>,
    directory: PathBuf,
    opts: Options,
) -> kubegather::error::Result<usize> {
    let start = Instant::now();
    let context = opts.context.clone();

    let client = create_client(kubeconfig, Some(&context)).await?;
    let gatherer = Gatherer::new(client, directory, opts)?;
    gatherer.gather().await?;

    info!(
        "Gathered {} resources from cluster {context:?} in {:.3} seconds",
        gatherer.count(),
        start.elapsed().as_secs_f64()
    );

    Ok(gatherer.count())
}

fn default_directory() -> PathBuf {
    PathBuf::from(chrono::Local::now().format("gather.%Y%m%d%H%M%S").to_string())
}

fn create_base_directory(directory: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o750);
    }
    builder
        .create(directory)
        .with_context(|| format!("cannot create directory {directory:?}"))
}

/// Log to stderr for humans and to {directory}/gather.log as JSON lines,
/// always at debug level in the file.
fn setup_tracing(directory: &Path, verbose: bool) -> Result<()> {
    let logfile = std::fs::File::create(directory.join("gather.log"))
        .context("cannot create log file")?;

    let console_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(console_level)),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Arc::new(logfile))
                .with_filter(EnvFilter::new("debug")),
        )
        .init();

    Ok(())
}
