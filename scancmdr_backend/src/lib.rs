//! # Scan-Control DSP protocol compiler
//!
//! Compiles photostimulation experiments (timing, spatial targets, triggers) into the
//! line-oriented command protocol of the Scan-Control DSP driving a pair of galvanometer mirrors.
//!
//! - [`coord`]: pixel to galvo coordinate math and calibration.
//! - [`instruction`], [`protocol`]: the command model, the append-only protocol builder and its
//!   rendering to wire text.
//! - [`timing`]: device constants and millisecond to cycle conversion.
//! - [`pattern`]: the spot, grid, target, pattern and rapid generators.
//! - [`reader`]: coordinate, pattern and calibration file readers.
//! - [`config`]: TOML rig configuration.
//! - [`experiment`]: the [`Stimulator`] session object, exported to python with the `python`
//!   feature.

pub mod channel;
pub mod config;
pub mod coord;
pub mod error;
pub mod experiment;
pub mod instruction;
pub mod pattern;
pub mod protocol;
pub mod reader;
pub mod timing;

pub use coord::*;
pub use error::*;
pub use experiment::*;
pub use pattern::GridSpec;
pub use protocol::Protocol;
pub use timing::{Stimulus, Trigger};

#[cfg(feature = "python")]
pub use numpy;

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;

    use crate::coord::{self, CalibrationPoint, PixelCoord};

    #[pyfunction]
    #[pyo3(name = "convert_coord")]
    fn py_convert_coord(
        pixel: (i32, i32),
        scale_factor: i64,
        center_offset: (i32, i32),
        rot_angle: f64,
    ) -> (i64, i64) {
        let galvo = coord::convert_coord(pixel.into(), scale_factor, center_offset.into(), rot_angle);
        (galvo.x, galvo.y)
    }

    #[pyfunction]
    #[pyo3(name = "rotate_coord")]
    fn py_rotate_coord(pixel: (i32, i32), axis_center: (i32, i32), rot_angle: f64) -> (i32, i32) {
        let p = coord::rotate_coord(pixel.into(), axis_center.into(), rot_angle);
        (p.x, p.y)
    }

    #[pyfunction]
    #[pyo3(name = "centroid")]
    fn py_centroid(points: Vec<(i32, i32)>) -> PyResult<(i32, i32)> {
        let points: Vec<PixelCoord> = points.into_iter().map(PixelCoord::from).collect();
        let c = coord::centroid(&points)?;
        Ok((c.x, c.y))
    }

    /// Scale factor from `(galvo_x, galvo_y, pixel_x, pixel_y)` tuples.
    #[pyfunction]
    #[pyo3(name = "calc_scaling")]
    fn py_calc_scaling(points: Vec<(f64, f64, f64, f64)>) -> PyResult<i64> {
        let points: Vec<CalibrationPoint> = points
            .into_iter()
            .map(|(galvo_x, galvo_y, pixel_x, pixel_y)| CalibrationPoint {
                galvo_x,
                galvo_y,
                pixel_x,
                pixel_y,
            })
            .collect();
        Ok(coord::calc_scaling(&points)?)
    }

    #[pymodule]
    fn scancmdr_backend(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<crate::Stimulator>()?;
        m.add_class::<crate::Stimulus>()?;
        m.add_function(wrap_pyfunction!(py_convert_coord, m)?)?;
        m.add_function(wrap_pyfunction!(py_rotate_coord, m)?)?;
        m.add_function(wrap_pyfunction!(py_centroid, m)?)?;
        m.add_function(wrap_pyfunction!(py_calc_scaling, m)?)?;
        Ok(())
    }
}
