//! Subcommands.

use structopt::StructOpt;

pub mod cleanup;
pub mod materialize;
pub mod prepare;
pub mod secret_options;
pub mod write_script;

/// Identifies a Spark application.
#[derive(Debug, StructOpt)]
pub struct AppOpt {
    /// The namespace of the SparkApplication.
    #[structopt(short = "n", long = "namespace")]
    pub namespace: String,

    /// The name of the SparkApplication.
    #[structopt(short = "a", long = "app")]
    pub app_name: String,
}
