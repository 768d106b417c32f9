//! Writing ConfigMaps and Secrets out as files.
//!
//! Each key in a bundle becomes one file, named after the key, in the
//! resource's directory (see `Layout::resource_dir`). Values are written
//! byte-for-byte. Sensitive bundles get no extra protection on disk.

use crate::layout::{check_component, ensure_dir};
use crate::prelude::*;

/// Identifies one resource belonging to one Spark application.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceIdentity {
    /// Namespace of the application.
    pub namespace: String,
    /// Name of the application.
    pub app_name: String,
    /// Name of the ConfigMap or Secret.
    pub resource_name: String,
}

impl ResourceIdentity {
    /// Create a new identity.
    pub fn new(
        namespace: impl Into<String>,
        app_name: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        ResourceIdentity {
            namespace: namespace.into(),
            app_name: app_name.into(),
            resource_name: resource_name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.app_name, self.resource_name)
    }
}

/// Key/value data taken from a Kubernetes resource.
#[derive(Clone, Eq, PartialEq)]
pub enum KeyedBundle {
    /// Data from a ConfigMap.
    Plain(BTreeMap<String, Vec<u8>>),
    /// Data from a Secret. This is never printed by `Debug`.
    Sensitive(BTreeMap<String, Vec<u8>>),
}

impl KeyedBundle {
    /// Build a plain bundle from text values.
    pub fn plain<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        KeyedBundle::Plain(collect_entries(entries))
    }

    /// Build a sensitive bundle.
    pub fn sensitive<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        KeyedBundle::Sensitive(collect_entries(entries))
    }

    /// The keys and values in this bundle.
    pub fn entries(&self) -> &BTreeMap<String, Vec<u8>> {
        match self {
            KeyedBundle::Plain(entries) | KeyedBundle::Sensitive(entries) => entries,
        }
    }

    /// Is this bundle's content sensitive?
    pub fn is_sensitive(&self) -> bool {
        matches!(self, KeyedBundle::Sensitive(_))
    }

    /// A short label for log messages.
    pub fn label(&self) -> &'static str {
        match self {
            KeyedBundle::Plain(_) => "configmap",
            KeyedBundle::Sensitive(_) => "secret",
        }
    }
}

fn collect_entries<K, V, I>(entries: I) -> BTreeMap<String, Vec<u8>>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

impl fmt::Debug for KeyedBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyedBundle::Plain(entries) => f.debug_tuple("Plain").field(entries).finish(),
            KeyedBundle::Sensitive(entries) => f
                .debug_tuple("Sensitive")
                .field(&entries.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// What `materialize` wrote.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MaterializationResult {
    /// The directory containing the resource's files.
    pub base_path: PathBuf,
    /// The keys we wrote, in the order we wrote them.
    pub written_keys: Vec<String>,
}

/// Write each key in `bundle` to a file in the resource's directory.
///
/// Existing files for keys in `bundle` are overwritten. Files for keys
/// which are not in `bundle` are left alone.
///
/// Keys which are not plain file names are rejected before anything is
/// written. After that, we stop at the first key which could not be written.
/// Files written for earlier keys stay on disk, so callers should run
/// `Layout::remove_application_tree` before retrying. See
/// `materialize_atomic` for an all-or-nothing alternative.
#[tracing::instrument(skip(layout, bundle), fields(kind = bundle.label()), level = "debug")]
pub fn materialize(
    layout: &Layout,
    identity: &ResourceIdentity,
    bundle: &KeyedBundle,
) -> Result<MaterializationResult> {
    let base_path = layout.resource_dir(identity)?;
    let written_keys = write_entries(&base_path, bundle)?;
    Ok(MaterializationResult {
        base_path,
        written_keys,
    })
}

/// Like `materialize`, but either every key is written or nothing changes.
///
/// We write into a staging directory next to the real one. Then we move the
/// old directory aside, move the staging directory into place, and only
/// then delete the old one. If the swap fails, the old directory is moved
/// back. Unlike `materialize`, this replaces the whole directory, so files
/// for keys missing from `bundle` are removed.
#[tracing::instrument(skip(layout, bundle), fields(kind = bundle.label()), level = "debug")]
pub fn materialize_atomic(
    layout: &Layout,
    identity: &ResourceIdentity,
    bundle: &KeyedBundle,
) -> Result<MaterializationResult> {
    let base_path = layout.resource_dir(identity)?;
    let app_dir = layout.application_dir(&identity.namespace, &identity.app_name)?;
    let pid = std::process::id();
    let staging = app_dir.join(format!(".{}.staging-{}", identity.resource_name, pid));
    let backup = app_dir.join(format!(".{}.backup-{}", identity.resource_name, pid));

    if staging.exists() {
        fs::remove_dir_all(&staging)
            .map_err(|err| Error::io("remove stale staging directory", &staging, err))?;
    }
    // A leftover backup may be the only copy of the previous files, so we
    // never delete one we didn't create.
    if fs::symlink_metadata(&backup).is_ok() {
        return Err(Error::io(
            "use backup path",
            &backup,
            io::Error::new(io::ErrorKind::AlreadyExists, "leftover backup found"),
        ));
    }

    let staged = write_entries(&staging, bundle).and_then(|written_keys| {
        ensure_dir(&staging)?;
        swap_into_place(&staging, &base_path, &backup, |from, to| fs::rename(from, to))?;
        Ok(written_keys)
    });

    match staged {
        Ok(written_keys) => Ok(MaterializationResult {
            base_path,
            written_keys,
        }),
        Err(err) => {
            if let Err(cleanup_err) = fs::remove_dir_all(&staging) {
                if cleanup_err.kind() != io::ErrorKind::NotFound {
                    warn!("could not remove {}: {}", staging.display(), cleanup_err);
                }
            }
            Err(err)
        }
    }
}

/// Replace `base_path` with `staging`, keeping the previous contents of
/// `base_path` at `backup` until the new ones are in place.
fn swap_into_place<R>(staging: &Path, base_path: &Path, backup: &Path, rename: R) -> Result<()>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    let had_previous = fs::symlink_metadata(base_path).is_ok();
    if had_previous {
        rename(base_path, backup).map_err(|err| Error::io("move aside", base_path, err))?;
    }

    if let Err(err) = rename(staging, base_path) {
        if had_previous {
            if let Err(restore_err) = rename(backup, base_path) {
                error!(
                    "could not restore {} from {}: {}",
                    base_path.display(),
                    backup.display(),
                    restore_err,
                );
            }
        }
        return Err(Error::io("move staged files into", base_path, err));
    }

    if had_previous {
        let is_dir = fs::symlink_metadata(backup).map(|m| m.is_dir()).unwrap_or(false);
        let removed = if is_dir {
            fs::remove_dir_all(backup)
        } else {
            fs::remove_file(backup)
        };
        if let Err(err) = removed {
            warn!("could not remove {}: {}", backup.display(), err);
        }
    }
    Ok(())
}

/// Write every entry in `bundle` into `dir`, stopping at the first failure.
fn write_entries(dir: &Path, bundle: &KeyedBundle) -> Result<Vec<String>> {
    for key in bundle.entries().keys() {
        check_component("key", key).map_err(Error::InvalidResource)?;
    }

    let mut written_keys = Vec::with_capacity(bundle.entries().len());
    for (key, content) in bundle.entries() {
        ensure_dir(dir)?;
        let path = dir.join(key);
        let mut file =
            File::create(&path).map_err(|err| Error::io("create file", &path, err))?;
        file.write_all(content)
            .map_err(|err| Error::io("write file", &path, err))?;
        trace!("{} created successfully", path.display());
        written_keys.push(key.clone());
    }
    Ok(written_keys)
}

#[cfg(test)]
fn test_layout(tmp: &tempfile::TempDir) -> Layout {
    Layout::new(&Config {
        mount_root: tmp.path().to_owned(),
        debug_mode: false,
    })
}

#[cfg(test)]
fn test_identity() -> ResourceIdentity {
    ResourceIdentity::new("spark", "pi", "pi-conf")
}

#[cfg(test)]
fn sorted_entries(dir: &Path) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn writes_one_file_per_key() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let bundle = KeyedBundle::plain(vec![
        ("spark-defaults.conf", "spark.master k8s://\n"),
        ("log4j.properties", "rootLogger.level = info\n"),
    ]);

    let result = materialize(&layout, &test_identity(), &bundle).unwrap();
    assert_eq!(result.base_path, tmp.path().join("spark/pi/pi-conf"));
    let mut keys = result.written_keys.clone();
    keys.sort();
    assert_eq!(keys, vec!["log4j.properties", "spark-defaults.conf"]);
    assert_eq!(sorted_entries(&result.base_path), keys);
    assert_eq!(
        fs::read(result.base_path.join("spark-defaults.conf")).unwrap(),
        b"spark.master k8s://\n",
    );
}

#[test]
fn sensitive_bytes_are_written_verbatim() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let token = vec![0u8, 159, 146, 150, b'\n', 255];
    let bundle = KeyedBundle::sensitive(vec![("hadoop.token", token.clone())]);

    let result = materialize(&layout, &test_identity(), &bundle).unwrap();
    assert_eq!(fs::read(result.base_path.join("hadoop.token")).unwrap(), token);
}

#[test]
fn rematerializing_overwrites_without_pruning() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let first = KeyedBundle::plain(vec![("a", "old a"), ("b", "old b")]);
    let second = KeyedBundle::plain(vec![("a", "new")]);

    materialize(&layout, &test_identity(), &first).unwrap();
    let result = materialize(&layout, &test_identity(), &second).unwrap();
    assert_eq!(result.written_keys, vec!["a"]);
    assert_eq!(fs::read_to_string(result.base_path.join("a")).unwrap(), "new");
    assert_eq!(fs::read_to_string(result.base_path.join("b")).unwrap(), "old b");
}

#[test]
fn distinct_resources_do_not_collide() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let bundle = KeyedBundle::plain(vec![("k", "v")]);

    let a = materialize(&layout, &ResourceIdentity::new("ns", "app", "one"), &bundle);
    let b = materialize(&layout, &ResourceIdentity::new("ns", "app", "two"), &bundle);
    assert_ne!(a.unwrap().base_path, b.unwrap().base_path);
}

#[test]
fn empty_bundle_creates_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let empty = KeyedBundle::plain(Vec::<(String, String)>::new());
    let result = materialize(&layout, &test_identity(), &empty).unwrap();
    assert!(result.written_keys.is_empty());
    assert!(!result.base_path.exists());
}

#[test]
fn absolute_key_cannot_escape_resource_dir() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let outside = tempfile::TempDir::new().unwrap();
    let victim = outside.path().join("victim");
    fs::write(&victim, "precious").unwrap();

    let victim_key = victim.to_str().unwrap();
    for bundle in &[
        KeyedBundle::plain(vec![(victim_key, "clobbered")]),
        KeyedBundle::sensitive(vec![("ok", "fine"), ("../../../escape", "clobbered")]),
    ] {
        match materialize(&layout, &test_identity(), bundle) {
            Err(Error::InvalidResource(_)) => {}
            other => panic!("expected InvalidResource, got {:?}", other),
        }
        assert!(materialize_atomic(&layout, &test_identity(), bundle).is_err());
    }
    assert_eq!(fs::read_to_string(&victim).unwrap(), "precious");
    // Bad keys are rejected before anything is written.
    assert!(!tmp.path().join("spark").exists());
}

#[test]
fn absolute_namespace_cannot_escape_mount_root() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let outside = tempfile::TempDir::new().unwrap();
    let identity = ResourceIdentity::new(outside.path().to_str().unwrap(), "app", "cm");

    let bundle = KeyedBundle::plain(vec![("k", "v")]);
    match materialize(&layout, &identity, &bundle) {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
    assert!(sorted_entries(outside.path()).is_empty());
}

#[test]
fn failure_leaves_earlier_files_in_place() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    // Keys are written in sorted order, and "b" is already a directory, so
    // we can't create a file there.
    let dir = layout.resource_dir(&test_identity()).unwrap();
    ensure_dir(&dir.join("b")).unwrap();
    let bundle = KeyedBundle::plain(vec![("a", "first"), ("b", "second")]);

    let err = materialize(&layout, &test_identity(), &bundle).unwrap_err();
    match err {
        Error::Io { action, .. } => assert_eq!(action, "create file"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fs::read_to_string(dir.join("a")).unwrap(), "first");
}

#[test]
fn atomic_failure_changes_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let original = KeyedBundle::plain(vec![("a", "original")]);
    materialize(&layout, &test_identity(), &original).unwrap();

    let broken = KeyedBundle::plain(vec![("a", "replaced"), ("b/c", "second")]);
    assert!(materialize_atomic(&layout, &test_identity(), &broken).is_err());

    let app_dir = layout.application_dir("spark", "pi").unwrap();
    assert_eq!(sorted_entries(&app_dir), vec!["pi-conf"]);
    let dir = layout.resource_dir(&test_identity()).unwrap();
    assert_eq!(fs::read_to_string(dir.join("a")).unwrap(), "original");
}

#[test]
fn atomic_success_replaces_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    materialize(&layout, &test_identity(), &KeyedBundle::plain(vec![("old", "x")])).unwrap();

    let result =
        materialize_atomic(&layout, &test_identity(), &KeyedBundle::plain(vec![("new", "y")]))
            .unwrap();
    assert_eq!(result.written_keys, vec!["new"]);
    assert_eq!(sorted_entries(&result.base_path), vec!["new"]);
    assert_eq!(fs::read_to_string(result.base_path.join("new")).unwrap(), "y");
    // No staging or backup directories are left behind.
    let app_dir = layout.application_dir("spark", "pi").unwrap();
    assert_eq!(sorted_entries(&app_dir), vec!["pi-conf"]);
}

#[test]
fn atomic_replaces_regular_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let dir = layout.resource_dir(&test_identity()).unwrap();
    ensure_dir(dir.parent().unwrap()).unwrap();
    fs::write(&dir, "not a directory").unwrap();

    let result =
        materialize_atomic(&layout, &test_identity(), &KeyedBundle::plain(vec![("k", "v")]))
            .unwrap();
    assert_eq!(fs::read_to_string(result.base_path.join("k")).unwrap(), "v");
    let app_dir = layout.application_dir("spark", "pi").unwrap();
    assert_eq!(sorted_entries(&app_dir), vec!["pi-conf"]);
}

#[test]
fn failed_swap_restores_previous_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let base_path = tmp.path().join("pi-conf");
    let staging = tmp.path().join(".pi-conf.staging");
    let backup = tmp.path().join(".pi-conf.backup");
    ensure_dir(&base_path).unwrap();
    fs::write(base_path.join("a"), "original").unwrap();
    ensure_dir(&staging).unwrap();
    fs::write(staging.join("a"), "replaced").unwrap();

    // Moving the old directory aside works, but moving the new one in fails.
    let err = swap_into_place(&staging, &base_path, &backup, |from, to| {
        if from == staging.as_path() {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        } else {
            fs::rename(from, to)
        }
    })
    .unwrap_err();

    match err {
        Error::Io { action, .. } => assert_eq!(action, "move staged files into"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fs::read_to_string(base_path.join("a")).unwrap(), "original");
    assert!(!backup.exists());
}

#[test]
fn leftover_backup_is_never_deleted() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp);
    let app_dir = layout.application_dir("spark", "pi").unwrap();
    let backup = app_dir.join(format!(".pi-conf.backup-{}", std::process::id()));
    ensure_dir(&backup).unwrap();
    fs::write(backup.join("a"), "only copy").unwrap();

    let bundle = KeyedBundle::plain(vec![("a", "new")]);
    assert!(materialize_atomic(&layout, &test_identity(), &bundle).is_err());
    assert_eq!(fs::read_to_string(backup.join("a")).unwrap(), "only copy");
}

#[test]
fn debug_output_hides_secret_values() {
    let bundle = KeyedBundle::sensitive(vec![("password", "hunter2")]);
    let shown = format!("{:?}", bundle);
    assert!(shown.contains("password"));
    assert!(!shown.contains("hunter2"));
}
