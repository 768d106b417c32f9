//! Where application files live on disk, and how we clean them up.
//!
//! Everything for an application lives under a single directory:
//!
//! ```text
//! <mount_root>/<namespace>/<app_name>/<resource_name>/<key>
//! <mount_root>/<namespace>/<app_name>/<app_name><unix_timestamp>.sh
//! ```
//!
//! Nothing here locks anything. A teardown which runs while a resource is
//! still being written can delete files out from under the writer, so
//! callers must not overlap operations for the same application.

use std::os::unix::fs::DirBuilderExt;

use crate::prelude::*;

/// Mode used for every directory we create: `rwx` for owner and group.
pub const DIR_MODE: u32 = 0o770;

/// Computes paths for applications and their resources, and manages the
/// lifetime of per-application directories.
#[derive(Clone, Debug)]
pub struct Layout {
    /// Root of our directory tree.
    mount_root: PathBuf,
    /// Should `remove_application_tree` leave files in place?
    debug_mode: bool,
}

impl Layout {
    /// Create a layout rooted at `config.mount_root`.
    pub fn new(config: &Config) -> Self {
        Layout {
            mount_root: config.mount_root.clone(),
            debug_mode: config.debug_mode,
        }
    }

    /// The directory holding everything for one application.
    ///
    /// Fails if either name could point outside of our mount root.
    pub fn application_dir(&self, namespace: &str, app_name: &str) -> Result<PathBuf> {
        check_component("namespace", namespace).map_err(Error::InvalidArgument)?;
        check_component("application name", app_name).map_err(Error::InvalidArgument)?;
        Ok(self.mount_root.join(namespace).join(app_name))
    }

    /// The directory holding the files for one resource.
    pub fn resource_dir(&self, identity: &ResourceIdentity) -> Result<PathBuf> {
        check_component("resource name", &identity.resource_name)
            .map_err(Error::InvalidArgument)?;
        Ok(self
            .application_dir(&identity.namespace, &identity.app_name)?
            .join(&identity.resource_name))
    }

    /// Remove everything we wrote for an application.
    ///
    /// This is best-effort cleanup. Failures are logged and otherwise
    /// ignored, and removing a tree that does not exist is fine. In debug
    /// mode, we leave the tree alone so it can be inspected.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn remove_application_tree(&self, namespace: &str, app_name: &str) {
        let dir = match self.application_dir(namespace, app_name) {
            Ok(dir) => dir,
            Err(err) => {
                error!("refusing to delete application directory: {}", err);
                return;
            }
        };
        if self.debug_mode {
            info!("debug mode enabled, not deleting {}", dir.display());
            return;
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!("deleted {}", dir.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!("{} does not exist, nothing to delete", dir.display());
            }
            Err(err) => error!("could not delete {}: {}", dir.display(), err),
        }
    }
}

/// Make sure `name` is a single, ordinary path component. Anything else
/// (empty, `.`, `..`, or containing a `/`) would let `Path::join` escape the
/// directory we're joining it to. On failure, returns a description of the
/// problem.
pub(crate) fn check_component(what: &str, name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(format!("{} {:?} is not a valid path component", what, name));
    }
    Ok(())
}

/// Create `dir` and any missing parents, using `DIR_MODE`.
///
/// The process umask still applies, so the final mode may be narrower.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    debug!("creating {}", dir.display());
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)
        .map_err(|err| Error::io("create directory", dir, err))
}

#[cfg(test)]
fn test_layout(tmp: &tempfile::TempDir, debug_mode: bool) -> Layout {
    Layout::new(&Config {
        mount_root: tmp.path().to_owned(),
        debug_mode,
    })
}

#[cfg(test)]
fn populate(layout: &Layout) -> PathBuf {
    let dir = layout.application_dir("spark", "pi").unwrap();
    ensure_dir(&dir.join("conf")).unwrap();
    fs::write(dir.join("conf").join("spark.properties"), "a=b").unwrap();
    dir
}

#[test]
fn paths_are_built_from_identity() {
    let layout = Layout::new(&Config::default());
    let identity = ResourceIdentity::new("spark", "pi", "conf");
    assert_eq!(
        layout.resource_dir(&identity).unwrap(),
        PathBuf::from("/mnt/spark/pi/conf"),
    );
    assert_eq!(
        layout.application_dir("spark", "pi").unwrap(),
        PathBuf::from("/mnt/spark/pi"),
    );
}

#[test]
fn paths_never_leave_mount_root() {
    let layout = Layout::new(&Config::default());
    for &(namespace, app_name) in &[
        ("/etc", "app"),
        ("spark", "/etc"),
        ("..", "app"),
        ("spark", ".."),
        ("spark", "."),
        ("", "app"),
        ("spark", ""),
        ("spark", "a/b"),
    ] {
        match layout.application_dir(namespace, app_name) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected {:?}/{:?} to be rejected, got {:?}", namespace, app_name, other),
        }
    }
    let identity = ResourceIdentity::new("spark", "pi", "/etc");
    assert!(layout.resource_dir(&identity).is_err());
    // Dots inside a name are fine.
    assert!(layout.application_dir("spark", "pi.v2").is_ok());
}

#[test]
fn ensure_dir_restricts_other_users() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("a").join("b");
    ensure_dir(&dir).unwrap();
    // Ensuring an existing directory is a no-op.
    ensure_dir(&dir).unwrap();
    for dir in &[tmp.path().join("a"), dir] {
        let mode = fs::metadata(dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o007, 0, "{} has mode {:o}", dir.display(), mode);
    }
}

#[test]
fn removes_whole_application_tree() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp, false);
    let dir = populate(&layout);

    layout.remove_application_tree("spark", "pi");
    assert!(!dir.exists());
    // The namespace directory is shared with other applications.
    assert!(tmp.path().join("spark").is_dir());
}

#[test]
fn removing_missing_tree_is_harmless() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp, false);
    layout.remove_application_tree("spark", "never-created");
    layout.remove_application_tree("spark", "never-created");
    assert!(!tmp.path().join("spark/never-created").exists());
}

#[test]
fn removal_with_bad_names_deletes_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp, false);
    let dir = populate(&layout);

    let outside = tempfile::TempDir::new().unwrap();
    fs::create_dir(outside.path().join("app")).unwrap();
    let outside_ns = outside.path().to_str().unwrap();

    layout.remove_application_tree("spark", "");
    layout.remove_application_tree("spark", "..");
    layout.remove_application_tree(outside_ns, "app");
    assert!(dir.join("conf").join("spark.properties").is_file());
    assert!(outside.path().join("app").is_dir());
}

#[test]
fn debug_mode_keeps_tree() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = test_layout(&tmp, true);
    let dir = populate(&layout);

    layout.remove_application_tree("spark", "pi");
    assert_eq!(
        fs::read_to_string(dir.join("conf").join("spark.properties")).unwrap(),
        "a=b",
    );
}
