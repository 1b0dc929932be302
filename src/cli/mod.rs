//! CLI definitions using clap

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "kubegather",
    version,
    about = "Gather diagnostic data from Kubernetes clusters",
    long_about = None,
)]
pub struct Cli {
    /// Directory for storing gathered data (default "gather.{timestamp}")
    #[arg(short = 'd', long)]
    pub directory: Option<PathBuf>,

    /// The kubeconfig file to use
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Comma separated list of contexts to gather data from
    #[arg(long, value_delimiter = ',')]
    pub contexts: Vec<String>,

    /// If specified, comma separated list of namespaces to gather data from
    #[arg(short = 'n', long, value_delimiter = ',')]
    pub namespaces: Option<Vec<String>>,

    /// If specified, comma separated list of addons to enable
    #[arg(long, value_delimiter = ',')]
    pub addons: Option<Vec<String>>,

    /// Be more verbose
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
