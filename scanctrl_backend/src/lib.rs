//! Uploads protocols compiled by [`scancmdr_backend`] to the Scan-Control DSP over RS232.

pub mod dsp;
pub mod error;
pub mod experiment;

pub use crate::dsp::*;
pub use crate::error::*;
pub use crate::experiment::{BaseLink, Stimulator};

#[cfg(feature = "python")]
#[pyo3::pymodule]
fn scanctrl_backend(_py: pyo3::Python, m: &pyo3::types::PyModule) -> pyo3::PyResult<()> {
    m.add_class::<Stimulator>()?;
    m.add_class::<scancmdr_backend::Stimulus>()?;
    Ok(())
}
