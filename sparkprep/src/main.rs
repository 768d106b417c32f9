//! Prepare Spark applications for launch on Kubernetes.

use sparkprep_common::{
    config::Config, quick_main, tracing::debug, tracing_support::initialize_tracing,
};
use std::path::PathBuf;
use structopt::StructOpt;

mod cmd;
mod manifest;

/// Command-line options, parsed using `structopt`.
#[derive(Debug, StructOpt)]
#[structopt(about = "A tool for preparing Spark applications to run on Kubernetes.")]
struct Opt {
    /// Root of the per-application directory tree (overrides
    /// SPARKPREP_MOUNT_ROOT).
    #[structopt(long = "mount-root", parse(from_os_str))]
    mount_root: Option<PathBuf>,

    /// Never delete application directories (same as DEBUG_MODE=true).
    #[structopt(long = "debug-mode")]
    debug_mode: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

impl Opt {
    /// Our configuration: the environment, overridden by flags.
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(mount_root) = &self.mount_root {
            config.mount_root = mount_root.to_owned();
        }
        if self.debug_mode {
            config.debug_mode = true;
        }
        config
    }
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Write fetched ConfigMaps and Secrets to disk.
    #[structopt(name = "materialize")]
    Materialize(cmd::materialize::Opt),

    /// Delete everything written for an application.
    #[structopt(name = "cleanup")]
    Cleanup(cmd::cleanup::Opt),

    /// Print spark-submit options for mounting secrets.
    #[structopt(name = "secret-options")]
    SecretOptions(cmd::secret_options::Opt),

    /// Write a launch script.
    #[structopt(name = "write-script")]
    WriteScript(cmd::write_script::Opt),

    /// Do everything needed to launch an application described by a manifest.
    #[structopt(name = "prepare")]
    Prepare(cmd::prepare::Opt),
}

fn run() -> anyhow::Result<()> {
    initialize_tracing();
    let opt = Opt::from_args();
    debug!("Args: {:?}", opt);
    let config = opt.config();

    match &opt.cmd {
        Command::Materialize(cmd) => cmd::materialize::run(&config, cmd),
        Command::Cleanup(cmd) => cmd::cleanup::run(&config, cmd),
        Command::SecretOptions(cmd) => cmd::secret_options::run(cmd),
        Command::WriteScript(cmd) => cmd::write_script::run(&config, cmd),
        Command::Prepare(cmd) => cmd::prepare::run(&config, cmd),
    }
}

quick_main!(run);
