//! Error definitions for the harness.
//!
//! All fallible operations in this crate return [`Result`]. The variants map
//! one-to-one onto the failure domains of the pipeline: configuration
//! validation, grammar expansion, state-dump decoding, simulator output
//! parsing, and plain I/O or serialization faults bubbling up from std,
//! `serde_json` and the filesystem.

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// All error kinds produced by the harness itself.
///
/// External subprocess failures are *not* errors in this sense: a nonzero
/// simulator exit is an expected outcome of a test run and is reported
/// through the runner outcome taxonomy instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A configuration value is outside the supported set.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The requested register width is not supported.
    #[error("xlen={0} not supported! Valid values are 32, or 64")]
    UnsupportedXlen(u32),

    /// The requested extension set contains an unsupported extension.
    #[error("extension '{0}' not supported")]
    UnsupportedExtension(char),

    /// Grammar expansion exceeded the nonterminal cap too often.
    #[error("cannot expand {0:?}")]
    Expansion(String),

    /// A state dump could not be decoded.
    #[error("dump decode failed: {0}")]
    DumpDecode(String),

    /// The fixed-point CSR shadow fields disagree.
    #[error("vxrm + vxsat does not match vcsr")]
    VcsrMismatch,

    /// Simulator output did not match the expected shape.
    #[error("cannot parse simulator output: {0}")]
    SimOutputParse(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
