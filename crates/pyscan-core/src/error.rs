//! Errors that abort the whole run. Per-file problems (size skips, parse
//! failures, fingerprint I/O, cache drift) are *not* modeled here — those are
//! counted, not raised, per the error-handling design.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PyscanError {
    #[error("scan root does not exist or is not a directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("unknown hash mode: {0} (expected \"stat\" or \"sha1\")")]
    InvalidHashMode(String),
}
