//! The `secret-options` subcommand.

use anyhow::Context;
use sparkprep_common::{
    prelude::{fs, PathBuf},
    secret::{build_options, Role, SecretMountSpec},
};
use structopt::StructOpt;

/// Print spark-submit options for mounting secrets.
#[derive(Debug, StructOpt)]
pub struct Opt {
    /// Which pods the secrets are mounted into: "driver" or "executor".
    #[structopt(long = "role")]
    role: Role,

    /// A YAML or JSON list of secrets, in the format used by the `secrets`
    /// field of a SparkApplication.
    #[structopt(long = "mounts", parse(from_os_str))]
    mounts: PathBuf,
}

/// Print one option per line.
pub fn run(opt: &Opt) -> anyhow::Result<()> {
    let yaml = fs::read_to_string(&opt.mounts)
        .with_context(|| format!("could not read {}", opt.mounts.display()))?;
    let mounts: Vec<SecretMountSpec> = serde_yaml::from_str(&yaml)
        .with_context(|| format!("could not parse {}", opt.mounts.display()))?;
    for option in build_options(opt.role, &mounts) {
        println!("{}", option);
    }
    Ok(())
}
