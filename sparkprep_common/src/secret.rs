//! Secrets mounted into Spark driver and executor pods, and the
//! `spark-submit` options which tell Spark about them.

use crate::prelude::*;

/// Prefix for driver secret mounts.
pub const SPARK_DRIVER_SECRET_KEY_PREFIX: &str = "spark.kubernetes.driver.secrets.";
/// Prefix for executor secret mounts.
pub const SPARK_EXECUTOR_SECRET_KEY_PREFIX: &str = "spark.kubernetes.executor.secrets.";
/// Prefix for driver environment variables.
pub const SPARK_DRIVER_ENV_VAR_CONFIG_KEY_PREFIX: &str = "spark.kubernetes.driverEnv.";
/// Prefix for executor environment variables.
pub const SPARK_EXECUTOR_ENV_VAR_CONFIG_KEY_PREFIX: &str = "spark.executorEnv.";

/// Environment variable Google client libraries read credentials from.
pub const GOOGLE_APPLICATION_CREDENTIALS_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// File inside a GCP service account secret holding the JSON key.
pub const SERVICE_ACCOUNT_JSON_KEY_FILE_NAME: &str = "key.json";
/// Environment variable Hadoop reads delegation tokens from.
pub const HADOOP_TOKEN_FILE_LOCATION_ENV_VAR: &str = "HADOOP_TOKEN_FILE_LOCATION";
/// File inside a Hadoop delegation token secret holding the token.
pub const HADOOP_DELEGATION_TOKEN_FILE_NAME: &str = "hadoop.token";

/// Which kind of Spark pod a secret is mounted into.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The driver pod.
    Driver,
    /// Executor pods.
    Executor,
}

impl Role {
    /// Prefix for secret mount options.
    pub fn secret_prefix(self) -> &'static str {
        match self {
            Role::Driver => SPARK_DRIVER_SECRET_KEY_PREFIX,
            Role::Executor => SPARK_EXECUTOR_SECRET_KEY_PREFIX,
        }
    }

    /// Prefix for environment variable options.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Role::Driver => SPARK_DRIVER_ENV_VAR_CONFIG_KEY_PREFIX,
            Role::Executor => SPARK_EXECUTOR_ENV_VAR_CONFIG_KEY_PREFIX,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "driver" => Ok(Role::Driver),
            "executor" => Ok(Role::Executor),
            _ => Err(Error::InvalidArgument(format!(
                "unknown role {:?}, expected \"driver\" or \"executor\"",
                s
            ))),
        }
    }
}

/// What a secret contains. Some kinds need an environment variable pointing
/// at a file inside the mount.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SecretKind {
    /// Anything else.
    Generic,
    /// A GCP service account key.
    #[serde(rename = "GCPServiceAccount")]
    CloudServiceAccount,
    /// A Hadoop delegation token.
    HadoopDelegationToken,
}

impl Default for SecretKind {
    fn default() -> Self {
        SecretKind::Generic
    }
}

impl SecretKind {
    /// The environment variable we set for this kind of secret, and the file
    /// inside the mount it should point to.
    fn env_var_and_file(self) -> Option<(&'static str, &'static str)> {
        match self {
            SecretKind::Generic => None,
            SecretKind::CloudServiceAccount => Some((
                GOOGLE_APPLICATION_CREDENTIALS_ENV_VAR,
                SERVICE_ACCOUNT_JSON_KEY_FILE_NAME,
            )),
            SecretKind::HadoopDelegationToken => Some((
                HADOOP_TOKEN_FILE_LOCATION_ENV_VAR,
                HADOOP_DELEGATION_TOKEN_FILE_NAME,
            )),
        }
    }
}

/// A Kubernetes secret mounted into a Spark pod.
///
/// Field names match the `secrets` entries in a `SparkApplication`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecretMountSpec {
    /// The name of the Kubernetes secret.
    pub name: String,
    /// Where to mount it in the container.
    pub path: String,
    /// What the secret contains.
    #[serde(default, rename = "secretType")]
    pub kind: SecretKind,
}

/// Build `spark-submit` options for mounting `mounts` into `role` pods.
///
/// Each mount yields `<secret prefix><name>=<path>`, followed by an
/// environment variable option if its kind needs one. Output order follows
/// input order.
pub fn build_options(role: Role, mounts: &[SecretMountSpec]) -> Vec<String> {
    let mut options = Vec::with_capacity(mounts.len());
    for mount in mounts {
        options.push(format!("{}{}={}", role.secret_prefix(), mount.name, mount.path));
        if let Some((env_var, file_name)) = mount.kind.env_var_and_file() {
            options.push(format!(
                "{}{}={}",
                role.env_prefix(),
                env_var,
                Path::new(&mount.path).join(file_name).display(),
            ));
        }
    }
    options
}

#[cfg(test)]
fn mount(name: &str, path: &str, kind: SecretKind) -> SecretMountSpec {
    SecretMountSpec {
        name: name.to_owned(),
        path: path.to_owned(),
        kind,
    }
}

#[test]
fn generic_secret_yields_one_option() {
    let options = build_options(
        Role::Driver,
        &[mount("s1", "/mnt/a/b/s1", SecretKind::Generic)],
    );
    assert_eq!(options, vec!["spark.kubernetes.driver.secrets.s1=/mnt/a/b/s1"]);
}

#[test]
fn service_account_adds_credentials_env_var() {
    let options = build_options(
        Role::Driver,
        &[mount("s1", "/mnt/a/b/s1", SecretKind::CloudServiceAccount)],
    );
    assert_eq!(
        options,
        vec![
            "spark.kubernetes.driver.secrets.s1=/mnt/a/b/s1",
            "spark.kubernetes.driverEnv.GOOGLE_APPLICATION_CREDENTIALS=/mnt/a/b/s1/key.json",
        ],
    );
}

#[test]
fn executor_options_keep_input_order() {
    let options = build_options(
        Role::Executor,
        &[
            mount("token", "/mnt/token/", SecretKind::HadoopDelegationToken),
            mount("plain", "/etc/plain", SecretKind::Generic),
            mount("gcp", "/etc/gcp", SecretKind::CloudServiceAccount),
        ],
    );
    assert_eq!(
        options,
        vec![
            "spark.kubernetes.executor.secrets.token=/mnt/token/",
            "spark.executorEnv.HADOOP_TOKEN_FILE_LOCATION=/mnt/token/hadoop.token",
            "spark.kubernetes.executor.secrets.plain=/etc/plain",
            "spark.kubernetes.executor.secrets.gcp=/etc/gcp",
            "spark.executorEnv.GOOGLE_APPLICATION_CREDENTIALS=/etc/gcp/key.json",
        ],
    );
}

#[test]
fn parse_role() {
    assert_eq!("driver".parse::<Role>().unwrap(), Role::Driver);
    assert_eq!("executor".parse::<Role>().unwrap(), Role::Executor);
    assert!("Driver".parse::<Role>().is_err());
}

#[test]
fn no_mounts_no_options() {
    assert!(build_options(Role::Driver, &[]).is_empty());
}

#[test]
fn parse_spark_application_secrets() {
    let json = r#"[
        { "name": "gcp", "path": "/mnt/gcp", "secretType": "GCPServiceAccount" },
        { "name": "hdfs", "path": "/mnt/hdfs", "secretType": "HadoopDelegationToken" },
        { "name": "other", "path": "/mnt/other" }
    ]"#;
    let mounts: Vec<SecretMountSpec> = serde_json::from_str(json).expect("parse error");
    assert_eq!(
        mounts,
        vec![
            mount("gcp", "/mnt/gcp", SecretKind::CloudServiceAccount),
            mount("hdfs", "/mnt/hdfs", SecretKind::HadoopDelegationToken),
            mount("other", "/mnt/other", SecretKind::Generic),
        ],
    );
}
