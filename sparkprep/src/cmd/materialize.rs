//! The `materialize` subcommand.

use anyhow::Context;
use sparkprep_common::{
    kubernetes::read_resource_file,
    prelude::{Config, Layout, Path, PathBuf},
    resource::{materialize, materialize_atomic, MaterializationResult},
};
use structopt::StructOpt;

use super::AppOpt;

/// Write fetched ConfigMaps and Secrets to disk.
#[derive(Debug, StructOpt)]
pub struct Opt {
    #[structopt(flatten)]
    app: AppOpt,

    /// Write all keys or none, replacing any existing files for the
    /// resource.
    #[structopt(long = "atomic")]
    atomic: bool,

    /// JSON files containing ConfigMaps or Secrets, as printed by
    /// `kubectl get ... -o json`.
    #[structopt(parse(from_os_str), required = true)]
    resource_files: Vec<PathBuf>,
}

/// Materialize each resource file, printing the directory it was written to.
pub fn run(config: &Config, opt: &Opt) -> anyhow::Result<()> {
    let layout = Layout::new(config);
    for path in &opt.resource_files {
        let result = materialize_file(
            &layout,
            &opt.app.namespace,
            &opt.app.app_name,
            path,
            opt.atomic,
        )?;
        println!("{}", result.base_path.display());
    }
    Ok(())
}

/// Read a resource from `path` and write it to disk for
/// `namespace/app_name`.
pub fn materialize_file(
    layout: &Layout,
    namespace: &str,
    app_name: &str,
    path: &Path,
    atomic: bool,
) -> anyhow::Result<MaterializationResult> {
    let resource = read_resource_file(path)?;
    let identity = resource.identity_for(namespace, app_name);
    let result = if atomic {
        materialize_atomic(layout, &identity, &resource.bundle)
    } else {
        materialize(layout, &identity, &resource.bundle)
    };
    result.with_context(|| format!("could not materialize {}", path.display()))
}
