//! A YAML "application manifest" describing everything `prepare` needs to
//! launch a Spark application.

use anyhow::Context;
use serde::Deserialize;
use sparkprep_common::{
    prelude::{fs, Path, PathBuf},
    secret::SecretMountSpec,
};

/// The launcher we run unless told otherwise.
const DEFAULT_SUBMITTER: &str = "/opt/spark/bin/spark-submit";

/// Represents an application manifest file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppManifest {
    /// Namespace of the SparkApplication.
    pub namespace: String,
    /// Name of the SparkApplication.
    pub name: String,
    /// ConfigMaps and Secrets to write to disk.
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
    /// Settings for the driver pod.
    #[serde(default)]
    pub driver: RoleSpec,
    /// Settings for executor pods.
    #[serde(default)]
    pub executor: RoleSpec,
    /// How to invoke the launcher.
    pub submit: SubmitSpec,
}

/// A fetched ConfigMap or Secret, stored as JSON.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceRef {
    /// Path to the JSON file, relative to the manifest.
    pub file: PathBuf,
    /// If present, pass `--conf <conf>=<directory>` to the launcher.
    #[serde(default)]
    pub conf: Option<String>,
}

/// Settings for one kind of Spark pod.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
    /// Secrets to mount into pods of this kind.
    #[serde(default)]
    pub secrets: Vec<SecretMountSpec>,
}

/// How the launch script runs `spark-submit`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubmitSpec {
    /// The launcher to run. Defaults to `/opt/spark/bin/spark-submit`.
    #[serde(default = "default_submitter")]
    pub command: String,
    /// Extra `--conf` options, passed after the generated ones.
    #[serde(default)]
    pub conf: Vec<String>,
    /// Everything after the `--conf` options: usually `--class`, the
    /// application file, and its arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_submitter() -> String {
    DEFAULT_SUBMITTER.to_owned()
}

impl AppManifest {
    /// Load a manifest from `path`.
    pub fn from_file(path: &Path) -> anyhow::Result<AppManifest> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        serde_yaml::from_str(&yaml)
            .with_context(|| format!("could not parse {}", path.display()))
    }
}

#[test]
fn parse_app_manifest() {
    use sparkprep_common::secret::SecretKind;

    let yaml = r#"
namespace: spark
name: pi
resources:
  - file: spark-conf.json
    conf: spark.kubernetes.hadoop.configMapName
  - file: gcp.json
driver:
  secrets:
    - name: gcp
      path: /mnt/secrets/gcp
      secretType: GCPServiceAccount
submit:
  args: ["--class", "org.apache.spark.examples.SparkPi", "local:///opt/spark/examples.jar"]
"#;

    let parsed: AppManifest = serde_yaml::from_str(yaml).expect("parse error");
    assert_eq!(parsed.namespace, "spark");
    assert_eq!(parsed.name, "pi");
    assert_eq!(parsed.resources.len(), 2);
    assert_eq!(parsed.resources[1].conf, None);
    assert_eq!(parsed.driver.secrets[0].kind, SecretKind::CloudServiceAccount);
    assert!(parsed.executor.secrets.is_empty());
    assert_eq!(parsed.submit.command, DEFAULT_SUBMITTER);
    assert_eq!(parsed.submit.args[0], "--class");
}
