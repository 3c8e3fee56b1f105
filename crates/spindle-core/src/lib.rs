//! spindle-core - package assembly pipeline
//!
//! Turns a tree of package-metadata directories into a distributable
//! repository: every package's declared assets are resolved into its tree,
//! recorded in an install manifest, zipped, and folded into `repo.json`.
//!
//! Leaf-first, the pieces are:
//!
//! - [`package`]: build-spec loading and validation
//! - [`io`]: asset sources (local, HTTP, archive member) and the package archiver
//! - [`extract`]: pattern matching over zip members
//! - [`resolver`]: places assets and records manifest actions
//! - [`manifest`]: the per-package action list
//! - [`reconcile`]: incremental index decisions and entry formatting
//! - [`pipeline`]: drives all of the above over a target tree

pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod io;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod reconcile;
pub mod reporter;
pub mod resolver;

pub use bootstrap::{BootstrapError, RepoOutput, prepare_output};
pub use config::Config;
pub use pipeline::{BuildSummary, Pipeline, PipelineError};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for asset downloads
pub const USER_AGENT: &str = concat!("spindle/", env!("CARGO_PKG_VERSION"));
