//! Errors raised while talking to the DSP.

use scancmdr_backend::ScanError;
use thiserror::Error;

pub type LinkResult<T> = std::result::Result<T, LinkError>;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Serial I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("No DSP link is open")]
    NotConnected,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

#[cfg(feature = "python")]
impl From<LinkError> for pyo3::PyErr {
    fn from(err: LinkError) -> pyo3::PyErr {
        match err {
            LinkError::Scan(err) => err.into(),
            LinkError::NotConnected => pyo3::exceptions::PyRuntimeError::new_err(err.to_string()),
            _ => pyo3::exceptions::PyOSError::new_err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(LinkError::NotConnected.to_string(), "No DSP link is open");
        let err: LinkError = ScanError::EmptyPointSet.into();
        assert_eq!(err.to_string(), "Point set is empty");
    }
}
