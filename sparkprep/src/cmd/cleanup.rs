//! The `cleanup` subcommand.

use sparkprep_common::prelude::{Config, Layout};
use structopt::StructOpt;

use super::AppOpt;

/// Delete everything written for an application.
#[derive(Debug, StructOpt)]
pub struct Opt {
    #[structopt(flatten)]
    app: AppOpt,
}

/// Remove the application's directory tree. Failures are only logged.
pub fn run(config: &Config, opt: &Opt) -> anyhow::Result<()> {
    Layout::new(config).remove_application_tree(&opt.app.namespace, &opt.app.app_name);
    Ok(())
}
