//! The `write-script` subcommand.

use sparkprep_common::{
    prelude::{Config, Layout},
    submit::write_script,
};
use structopt::StructOpt;

use super::AppOpt;

/// Write a launch script.
#[derive(Debug, StructOpt)]
pub struct Opt {
    #[structopt(flatten)]
    app: AppOpt,

    /// Lines to write to the script, one per argument.
    commands: Vec<String>,
}

/// Write the script and print its path.
pub fn run(config: &Config, opt: &Opt) -> anyhow::Result<()> {
    let layout = Layout::new(config);
    let script = write_script(&layout, &opt.app.namespace, &opt.app.app_name, &opt.commands)?;
    println!("{}", script.path.display());
    Ok(())
}
