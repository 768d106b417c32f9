//! Code shared by the `sparkprep` tools: turning fetched ConfigMaps and
//! Secrets into files on disk, building `spark-submit` secret options, and
//! writing the launch script for a Spark application.

#![warn(missing_docs)]

pub use tracing;

pub mod config;
pub mod errors;
pub mod kubernetes;
pub mod layout;
pub mod resource;
pub mod secret;
pub mod submit;
pub mod tracing_support;

pub use crate::errors::{Error, Result};

/// Common imports used by many modules.
pub mod prelude {
    pub use serde::{Deserialize, Serialize};
    pub use std::{
        collections::BTreeMap,
        fmt,
        fs::{self, File},
        io::{self, Write},
        path::{Path, PathBuf},
    };
    pub use tracing::{debug, error, info, trace, warn};

    pub use super::config::Config;
    pub use super::layout::Layout;
    pub use super::resource::{KeyedBundle, MaterializationResult, ResourceIdentity};
    pub use super::{Error, Result};
}
