//! kubegather - gather diagnostic data from Kubernetes clusters

pub mod addons;
pub mod cli;
pub mod client;
pub mod error;
pub mod gather;
pub mod output;

pub use addons::available_addons;
pub use gather::{Gatherer, Options};
pub use output::{OutputDirectory, OutputReader};
