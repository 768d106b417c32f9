//! Error-handling code.

use std::{fmt, io, path::PathBuf, result};

use thiserror::Error as ThisError;

/// Errors returned by the library.
///
/// Nothing in this crate retries. Every failure comes back to the caller,
/// which decides whether to clean up, wait, or give up.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
    /// A filesystem operation failed. This may leave a partially written
    /// tree behind.
    #[error("could not {action} {}", path.display())]
    Io {
        /// What we were trying to do, e.g. "create directory".
        action: &'static str,
        /// The path we were operating on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A launch script with the same name already exists.
    #[error(
        "shell file for SparkApplication {namespace}/{name} already exists at {}",
        path.display()
    )]
    ScriptAlreadyExists {
        /// Namespace of the application.
        namespace: String,
        /// Name of the application.
        name: String,
        /// The path we tried to create.
        path: PathBuf,
    },

    /// A fetched Kubernetes object could not be decoded.
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// A value supplied by the user could not be parsed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Build an `Error::Io` for `action` on `path`.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Create an `Error::InvalidResource` with the given message.
    pub fn invalid_resource(msg: impl Into<String>) -> Self {
        Error::InvalidResource(msg.into())
    }

    /// Did we refuse to overwrite an existing launch script?
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::ScriptAlreadyExists { .. })
    }
}

/// Result type for this crate's functions.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Support for displaying an error with a complete list of causes, and an
/// optional backtrace.
pub trait DisplayCausesAndBacktraceExt {
    /// Display the error and its causes, plus a backtrace (if available).
    fn display_causes_and_backtrace(&self) -> DisplayCauses<'_>;

    /// Display the error and its causes.
    fn display_causes_without_backtrace(&self) -> DisplayCauses<'_>;
}

impl DisplayCausesAndBacktraceExt for anyhow::Error {
    fn display_causes_and_backtrace(&self) -> DisplayCauses<'_> {
        DisplayCauses {
            err: self,
            show_backtrace: true,
        }
    }

    fn display_causes_without_backtrace(&self) -> DisplayCauses<'_> {
        DisplayCauses {
            err: self,
            show_backtrace: false,
        }
    }
}

/// Helper type used to display errors.
pub struct DisplayCauses<'a> {
    /// The error to display.
    err: &'a anyhow::Error,

    /// Should we show the backtrace?
    show_backtrace: bool,
}

impl fmt::Display for DisplayCauses<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.err)?;
        for cause in self.err.chain().skip(1) {
            writeln!(f, "  caused by: {}", cause)?;
        }

        if self.show_backtrace {
            write!(f, "{}", self.err.backtrace())?;
        }
        Ok(())
    }
}

/// Generate a `main` function which calls the specified function. If the
/// function returns `Result::Err(_)`, then `main` will print the error and exit
/// with a non-zero status code.
#[macro_export]
macro_rules! quick_main {
    ($wrapped:ident) => {
        fn main() {
            if let Err(err) = $wrapped() {
                use ::std::io::Write;
                use $crate::errors::DisplayCausesAndBacktraceExt;
                let stderr = ::std::io::stderr();
                write!(&mut stderr.lock(), "{}", err.display_causes_without_backtrace())
                    .expect("Error occurred while trying to display error");
                ::std::process::exit(1);
            }
        }
    };
}

#[test]
fn display_causes_lists_every_source() {
    let source = io::Error::new(io::ErrorKind::PermissionDenied, "permission denied");
    let err = anyhow::Error::new(Error::io("create directory", "/mnt/ns/app", source))
        .context("could not prepare ns/app");
    let shown = err.display_causes_without_backtrace().to_string();
    assert_eq!(
        shown,
        "ERROR: could not prepare ns/app\n  \
         caused by: could not create directory /mnt/ns/app\n  \
         caused by: permission denied\n",
    );
}

#[test]
fn already_exists_is_recognized() {
    let err = Error::ScriptAlreadyExists {
        namespace: "ns".to_owned(),
        name: "app".to_owned(),
        path: PathBuf::from("/mnt/ns/app/app1.sh"),
    };
    assert!(err.is_already_exists());
    assert!(err.to_string().contains("ns/app"));
    assert!(!Error::invalid_resource("nope").is_already_exists());
}
