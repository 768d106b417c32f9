//! Writing the shell script which launches a Spark application.

use chrono::Utc;
use shell_escape::escape;
use std::{borrow::Cow, fs::OpenOptions, io::BufWriter, os::unix::fs::PermissionsExt};

use crate::layout::ensure_dir;
use crate::prelude::*;

/// Mode for launch scripts: `rwx` for owner and group.
pub const SCRIPT_MODE: u32 = 0o770;

/// A launch script which has been written and closed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmitScript {
    /// Where the script lives.
    pub path: PathBuf,
    /// The lines of the script.
    pub commands: Vec<String>,
}

/// Write a launch script for `namespace/app_name`, named using the current
/// time.
pub fn write_script(
    layout: &Layout,
    namespace: &str,
    app_name: &str,
    commands: &[String],
) -> Result<SubmitScript> {
    write_script_at(layout, namespace, app_name, commands, Utc::now().timestamp())
}

/// Write a launch script for `namespace/app_name` to
/// `<app dir>/<app_name><timestamp>.sh`, one command per line.
///
/// We never overwrite an existing script. Two calls for the same application
/// in the same second will collide, and the second one fails with
/// `Error::ScriptAlreadyExists`. Callers must serialize submissions for an
/// application themselves.
#[tracing::instrument(skip(layout, commands), level = "debug")]
pub fn write_script_at(
    layout: &Layout,
    namespace: &str,
    app_name: &str,
    commands: &[String],
    timestamp: i64,
) -> Result<SubmitScript> {
    let dir = layout.application_dir(namespace, app_name)?;
    ensure_dir(&dir)?;

    let path = dir.join(format!("{}{}.sh", app_name, timestamp));
    let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(Error::ScriptAlreadyExists {
                namespace: namespace.to_owned(),
                name: app_name.to_owned(),
                path,
            });
        }
        Err(err) => {
            error!("create file {} error: {}", path.display(), err);
            return Err(Error::io("create file", path, err));
        }
    };
    debug!("created {}", path.display());

    file.set_permissions(fs::Permissions::from_mode(SCRIPT_MODE))
        .map_err(|err| Error::io("set permissions on", &path, err))?;

    let mut wtr = BufWriter::new(file);
    for command in commands {
        writeln!(wtr, "{}", command).map_err(|err| Error::io("write file", &path, err))?;
    }
    let file = wtr
        .into_inner()
        .map_err(|err| Error::io("write file", &path, err.into_error()))?;
    file.sync_all()
        .map_err(|err| Error::io("flush file", &path, err))?;

    Ok(SubmitScript {
        path,
        commands: commands.to_vec(),
    })
}

/// Build a `spark-submit` command line, passing each of `conf_options` using
/// `--conf`, followed by `trailing_args` (usually the application file and
/// its arguments).
///
/// Arguments are quoted for the shell where needed.
pub fn spark_submit_command(
    submitter: &str,
    conf_options: &[String],
    trailing_args: &[String],
) -> String {
    let mut parts = vec![quote(submitter)];
    for option in conf_options {
        parts.push("--conf".into());
        parts.push(quote(option));
    }
    parts.extend(trailing_args.iter().map(|arg| quote(arg)));
    parts.join(" ")
}

fn quote(arg: &str) -> Cow<'_, str> {
    escape(Cow::Borrowed(arg))
}

#[cfg(test)]
fn layout_in(tmp: &tempfile::TempDir) -> Layout {
    Layout::new(&Config {
        mount_root: tmp.path().to_owned(),
        debug_mode: false,
    })
}

#[cfg(test)]
fn commands(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|&line| line.to_owned()).collect()
}

#[test]
fn script_has_one_line_per_command() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = layout_in(&tmp);

    let script =
        write_script_at(&layout, "spark", "pi", &commands(&["echo A", "echo B"]), 1_600_000_000)
            .unwrap();
    assert_eq!(script.path, tmp.path().join("spark/pi/pi1600000000.sh"));
    assert_eq!(fs::read_to_string(&script.path).unwrap(), "echo A\necho B\n");

    let mode = fs::metadata(&script.path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, SCRIPT_MODE);
}

#[test]
fn same_second_collides() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = layout_in(&tmp);
    let cmds = commands(&["echo first"]);

    let first = write_script_at(&layout, "spark", "pi", &cmds, 42).unwrap();
    let err = write_script_at(&layout, "spark", "pi", &commands(&["echo second"]), 42)
        .unwrap_err();
    assert!(err.is_already_exists(), "unexpected error: {}", err);
    // The first script must not have been clobbered.
    assert_eq!(fs::read_to_string(&first.path).unwrap(), "echo first\n");

    let later = write_script_at(&layout, "spark", "pi", &cmds, 43).unwrap();
    assert_ne!(later.path, first.path);
}

#[test]
fn wall_clock_script_lands_in_application_dir() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = layout_in(&tmp);
    let script = write_script(&layout, "spark", "pi", &[]).unwrap();
    assert_eq!(script.path.parent().unwrap(), layout.application_dir("spark", "pi").unwrap());
    assert_eq!(fs::read_to_string(&script.path).unwrap(), "");
}

#[test]
fn script_never_lands_outside_mount_root() {
    let tmp = tempfile::TempDir::new().unwrap();
    let layout = layout_in(&tmp);
    let outside = tempfile::TempDir::new().unwrap();
    let namespace = outside.path().to_str().unwrap();

    let err = write_script_at(&layout, namespace, "pi", &commands(&["echo hi"]), 7).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "unexpected error: {}", err);
    assert!(write_script_at(&layout, "spark", "../pi", &[], 7).is_err());
    assert!(!outside.path().join("pi").exists());
}

#[test]
fn submit_command_quotes_arguments() {
    let cmd = spark_submit_command(
        "/opt/spark/bin/spark-submit",
        &commands(&["spark.kubernetes.driver.secrets.s1=/mnt/s1", "spark.app.name=my app"]),
        &commands(&["/opt/app.jar", "it's"]),
    );
    assert_eq!(
        cmd,
        "/opt/spark/bin/spark-submit \
         --conf spark.kubernetes.driver.secrets.s1=/mnt/s1 \
         --conf 'spark.app.name=my app' \
         /opt/app.jar 'it'\\''s'",
    );
}
