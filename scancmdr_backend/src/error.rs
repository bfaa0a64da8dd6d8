//! Error type shared by every stage of protocol generation.
//!
//! Every failure is fatal to the protocol being built: nothing is retried and no
//! partially built protocol is handed back. The variants map onto the stages
//! that can fail:
//!
//! - **`Resource`**, **`Parse`**, **`PointCount`**: reading coordinate, pattern and
//!   calibration files.
//! - **`DegenerateCalibration`**: calibration points that cannot define a scale factor.
//! - **`Allocation`**: the command list or the rendered text could not grow.
//! - **`FieldRange`**, **`LoopMismatch`**, **`ProtocolTooLong`**: a protocol the DSP
//!   would not accept.
//! - **`InvalidParameter`**, **`EmptyPointSet`**: experiment parameters rejected
//!   before any command is appended.
//! - **`Config`**: a configuration file that does not parse.

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to open {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin}, line {line}: {reason}")]
    Parse {
        origin: String,
        line: usize,
        reason: String,
    },

    #[error("{origin}: expected {expected} points, found {found}")]
    PointCount {
        origin: String,
        expected: usize,
        found: usize,
    },

    #[error("Point set is empty")]
    EmptyPointSet,

    #[error("Degenerate calibration: {0}")]
    DegenerateCalibration(String),

    #[error("Allocation failure: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("Command field out of range: {0}")]
    FieldRange(String),

    #[error("Unbalanced loop commands: {0}")]
    LoopMismatch(String),

    #[error("Protocol has {lines} lines, the DSP accepts at most {max}", max = crate::timing::MAX_PROTOCOL_LINES)]
    ProtocolTooLong { lines: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

#[cfg(feature = "python")]
impl From<ScanError> for pyo3::PyErr {
    fn from(err: ScanError) -> pyo3::PyErr {
        match err {
            ScanError::Resource { .. } => pyo3::exceptions::PyOSError::new_err(err.to_string()),
            _ => pyo3::exceptions::PyValueError::new_err(err.to_string()),
        }
    }
}
