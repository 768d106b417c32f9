//! The `prepare` subcommand.

use anyhow::Context;
use sparkprep_common::{
    prelude::{Config, Layout, Path, PathBuf},
    secret::{build_options, Role},
    submit::{spark_submit_command, write_script, SubmitScript},
    tracing::debug,
};
use structopt::StructOpt;

use super::materialize::materialize_file;
use crate::manifest::AppManifest;

/// Do everything needed to launch an application described by a manifest.
#[derive(Debug, StructOpt)]
pub struct Opt {
    /// Write each resource all-or-nothing.
    #[structopt(long = "atomic")]
    atomic: bool,

    /// A YAML application manifest.
    #[structopt(parse(from_os_str))]
    manifest: PathBuf,
}

/// Prepare the application and print the path of its launch script.
pub fn run(config: &Config, opt: &Opt) -> anyhow::Result<()> {
    let manifest = AppManifest::from_file(&opt.manifest)?;
    let base_dir = opt.manifest.parent().unwrap_or_else(|| Path::new("."));
    let script = prepare(&Layout::new(config), &manifest, base_dir, opt.atomic)?;
    println!("{}", script.path.display());
    Ok(())
}

/// Materialize the manifest's resources, build launcher options, and write
/// the launch script. Resource paths are relative to `base_dir`.
///
/// If a resource can't be written, we remove the application's directory
/// before returning the error, so a retry starts from scratch.
pub fn prepare(
    layout: &Layout,
    manifest: &AppManifest,
    base_dir: &Path,
    atomic: bool,
) -> anyhow::Result<SubmitScript> {
    let (namespace, name) = (&manifest.namespace, &manifest.name);

    let mut conf_options = vec![];
    for resource in &manifest.resources {
        let path = base_dir.join(&resource.file);
        let result = match materialize_file(layout, namespace, name, &path, atomic) {
            Ok(result) => result,
            Err(err) => {
                layout.remove_application_tree(namespace, name);
                return Err(err);
            }
        };
        debug!("wrote {:?} to {}", result.written_keys, result.base_path.display());
        if let Some(key) = &resource.conf {
            conf_options.push(format!("{}={}", key, result.base_path.display()));
        }
    }
    conf_options.extend(build_options(Role::Driver, &manifest.driver.secrets));
    conf_options.extend(build_options(Role::Executor, &manifest.executor.secrets));
    conf_options.extend(manifest.submit.conf.iter().cloned());

    let command = spark_submit_command(&manifest.submit.command, &conf_options, &manifest.submit.args);
    let commands = vec!["#!/bin/sh".to_owned(), command];
    write_script(layout, namespace, name, &commands)
        .with_context(|| format!("could not write launch script for {}/{}", namespace, name))
}

#[cfg(test)]
const CONFIG_MAP: &str = r#"{
  "kind": "ConfigMap",
  "metadata": { "name": "hadoop-conf" },
  "data": { "core-site.xml": "<configuration/>" }
}"#;

#[cfg(test)]
fn manifest(resources: &str) -> AppManifest {
    let yaml = format!(
        r#"
namespace: spark
name: pi
resources: {}
executor:
  secrets:
    - name: token
      path: /mnt/token
      secretType: HadoopDelegationToken
submit:
  command: spark-submit
  args: ["/opt/app.jar"]
"#,
        resources,
    );
    serde_yaml::from_str(&yaml).expect("parse error")
}

#[cfg(test)]
fn layout_in(tmp: &tempfile::TempDir) -> Layout {
    Layout::new(&Config {
        mount_root: tmp.path().join("mnt"),
        debug_mode: false,
    })
}

#[test]
fn prepare_writes_resources_and_script() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("hadoop-conf.json"), CONFIG_MAP).unwrap();
    let layout = layout_in(&tmp);
    let manifest = manifest(
        r#"[{ "file": "hadoop-conf.json", "conf": "spark.kubernetes.hadoop.configMapName" }]"#,
    );

    let script = prepare(&layout, &manifest, tmp.path(), false).unwrap();

    let conf_dir = tmp.path().join("mnt/spark/pi/hadoop-conf");
    assert_eq!(
        std::fs::read_to_string(conf_dir.join("core-site.xml")).unwrap(),
        "<configuration/>",
    );
    let expected = format!(
        "#!/bin/sh\n\
         spark-submit \
         --conf spark.kubernetes.hadoop.configMapName={} \
         --conf spark.kubernetes.executor.secrets.token=/mnt/token \
         --conf spark.executorEnv.HADOOP_TOKEN_FILE_LOCATION=/mnt/token/hadoop.token \
         /opt/app.jar\n",
        conf_dir.display(),
    );
    assert_eq!(std::fs::read_to_string(&script.path).unwrap(), expected);
    assert_eq!(script.path.parent().unwrap(), layout.application_dir("spark", "pi").unwrap());
    assert_eq!(
        manifest.executor.secrets,
        vec![sparkprep_common::secret::SecretMountSpec {
            name: "token".to_owned(),
            path: "/mnt/token".to_owned(),
            kind: sparkprep_common::secret::SecretKind::HadoopDelegationToken,
        }],
    );
}

#[test]
fn failed_resource_cleans_up_application() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("hadoop-conf.json"), CONFIG_MAP).unwrap();
    let layout = layout_in(&tmp);
    let manifest = manifest(r#"[{ "file": "hadoop-conf.json" }, { "file": "missing.json" }]"#);

    assert!(prepare(&layout, &manifest, tmp.path(), false).is_err());
    assert!(!layout.application_dir("spark", "pi").unwrap().exists());
}
