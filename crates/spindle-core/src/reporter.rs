//! Reporter trait for dependency injection
//!
//! Lets the pipeline report progress and diagnostics without being coupled
//! to a terminal. Messages arrive already prefixed with the package they
//! concern, so interleaving from concurrent builds stays readable.

use crate::pipeline::BuildSummary;

pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started.
    fn section(&self, title: &str);

    /// A package is about to be assembled. `updating` is set when an older
    /// version is being replaced.
    fn package_started(&self, name: &str, title: &str, updating: bool);

    /// A package was assembled and indexed.
    fn package_done(&self, name: &str, detail: &str);

    /// A package was left untouched because its version has not changed.
    fn package_skipped(&self, name: &str, reason: &str);

    /// A package could not be built and has no index entry.
    fn package_failed(&self, name: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display the final outcome of a run.
    fn summary(&self, summary: &BuildSummary);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn package_started(&self, name: &str, title: &str, updating: bool) {
        (**self).package_started(name, title, updating);
    }
    fn package_done(&self, name: &str, detail: &str) {
        (**self).package_done(name, detail);
    }
    fn package_skipped(&self, name: &str, reason: &str) {
        (**self).package_skipped(name, reason);
    }
    fn package_failed(&self, name: &str, reason: &str) {
        (**self).package_failed(name, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, summary: &BuildSummary) {
        (**self).summary(summary);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn package_started(&self, _: &str, _: &str, _: bool) {}
    fn package_done(&self, _: &str, _: &str) {}
    fn package_skipped(&self, _: &str, _: &str) {}
    fn package_failed(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: &BuildSummary) {}
}
