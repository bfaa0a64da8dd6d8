//! The experiment module provides the session-level interface to the protocol compiler, and the
//! single place by which methods are exposed to python.
//!
//! ## Overview
//!
//! At the heart of this module lies the [`Stimulator`] struct, which holds the coordinate
//! [`Transform`] of one rig (scale factor, optical center and rotation). The behavior of the
//! `Stimulator` is defined by the [`BaseStimulator`] trait, whose default methods calibrate the rig
//! and build protocols for every stimulation pattern.
//!
//! The module is organized into the following primary components:
//!
//! 1. **Stimulator Struct**: The main data structure representing one galvo rig.
//! 2. **Traits**: The [`BaseStimulator`] trait, which defines the operations possible on a
//!    `Stimulator`: transform setup, calibration and protocol generation.
//! 3. **Macro**: `impl_stim_boilerplate!` generates the trait implementation and, with the
//!    `python` feature, the python wrappers of every trait method. Crates extending the
//!    `Stimulator` (such as the serial transport) reuse it for their own struct.
//!
//! ## Key Structures and Their Relationships
//!
//! - **Stimulator**: The structure users interact with. Owns the transform and passes a copy of it
//!   to every generator call.
//! - **Stimulus**: Timing and counts of one experiment, in milliseconds (see [`crate::timing`]).
//! - **GridSpec**: Raster geometry for the grid generators (see [`crate::pattern`]).
//! - **Protocol**: The generated command list. The `build_*` methods return it already rendered
//!   to the wire text expected by the DSP.
//!
//! ## Navigating the Module
//!
//! If you're looking to:
//!
//! - **Understand core behaviors**: Dive into the [`BaseStimulator`] trait.
//! - **Integrate with python**: Refer to the [`impl_stim_boilerplate`] macro and its source.

use std::path::Path;

use log::info;

use crate::coord::*;
use crate::error::{ScanError, ScanResult};
use crate::pattern::{self, GridSpec};
use crate::reader::{read_calibration, read_coords};
use crate::timing::Stimulus;

/// This trait defines the behavior of the [`Stimulator`] struct through default trait implementations.
///
/// Trait methods fall into the following categories:
/// 1. Transform methods which set up or query the rig geometry:
///     - [`set_scale_factor`], [`set_center_offset`], [`set_rotation`], [`scale_factor`]
///     - [`calibrate`], [`calibrate_points`]
/// 2. Protocol builders, each returning the rendered protocol text:
///     - [`build_spot`], [`build_grid`], [`build_target`]
///     - [`build_rapid_grid`], [`build_rapid_target`], [`build_pattern`]
/// 3. Inspection:
///     - [`galvo_coords`]
/// 4. Field methods which are not exposed to python: [`transform`], [`transform_`]
///
/// [`set_scale_factor`]: BaseStimulator::set_scale_factor
/// [`set_center_offset`]: BaseStimulator::set_center_offset
/// [`set_rotation`]: BaseStimulator::set_rotation
/// [`scale_factor`]: BaseStimulator::scale_factor
/// [`calibrate`]: BaseStimulator::calibrate
/// [`calibrate_points`]: BaseStimulator::calibrate_points
/// [`build_spot`]: BaseStimulator::build_spot
/// [`build_grid`]: BaseStimulator::build_grid
/// [`build_target`]: BaseStimulator::build_target
/// [`build_rapid_grid`]: BaseStimulator::build_rapid_grid
/// [`build_rapid_target`]: BaseStimulator::build_rapid_target
/// [`build_pattern`]: BaseStimulator::build_pattern
/// [`galvo_coords`]: BaseStimulator::galvo_coords
/// [`transform`]: BaseStimulator::transform
/// [`transform_`]: BaseStimulator::transform_
pub trait BaseStimulator {
    // FIELD methods
    fn transform(&self) -> &Transform;
    fn transform_(&mut self) -> &mut Transform;

    fn scale_factor(&self) -> ScaleFactor {
        self.transform().scale_factor
    }

    /// Sets the scale factor in microcounts per pixel. Must be positive.
    fn set_scale_factor(&mut self, scale_factor: ScaleFactor) -> ScanResult<()> {
        if scale_factor <= 0 {
            return Err(ScanError::InvalidParameter(format!(
                "scale factor must be positive, got {}",
                scale_factor
            )));
        }
        self.transform_().scale_factor = scale_factor;
        Ok(())
    }

    /// Sets the pixel coordinate at which the galvos sit at position zero.
    fn set_center_offset(&mut self, center: PixelCoord) {
        self.transform_().center_offset = center;
    }

    /// Sets the rotation (radians) applied to grids and target sets.
    fn set_rotation(&mut self, rotation: f64) -> ScanResult<()> {
        if !rotation.is_finite() {
            return Err(ScanError::InvalidParameter(format!(
                "rotation must be finite, got {}",
                rotation
            )));
        }
        self.transform_().rotation = rotation;
        Ok(())
    }

    /// Computes the scale factor from calibration points and stores it.
    ///
    /// # Example
    ///
    /// ```
    /// use scancmdr_backend::coord::*;
    /// use scancmdr_backend::experiment::*;
    ///
    /// let mut stim = Stimulator::new(Transform::new(1, PixelCoord::new(0, 0), 0.0));
    /// let points = [
    ///     CalibrationPoint { galvo_x: 0., galvo_y: 0., pixel_x: 0., pixel_y: 0. },
    ///     CalibrationPoint { galvo_x: 100., galvo_y: 0., pixel_x: 50., pixel_y: 0. },
    ///     CalibrationPoint { galvo_x: 0., galvo_y: 100., pixel_x: 0., pixel_y: 50. },
    /// ];
    /// assert_eq!(stim.calibrate_points(&points).unwrap(), 2);
    /// assert_eq!(stim.transform().scale_factor, 2);
    /// ```
    fn calibrate_points(&mut self, points: &[CalibrationPoint]) -> ScanResult<ScaleFactor> {
        let scale_factor = calc_scaling(points)?;
        self.set_scale_factor(scale_factor)?;
        info!(
            "Calibrated scale factor {} from {} points",
            scale_factor,
            points.len()
        );
        Ok(scale_factor)
    }

    /// Reads `count` calibration records (all of them if `None`) and calibrates from them.
    fn calibrate<P: AsRef<Path>>(&mut self, path: P, count: Option<usize>) -> ScanResult<ScaleFactor> {
        let points = read_calibration(path, count)?;
        self.calibrate_points(&points)
    }

    fn build_spot(&self, point: PixelCoord, stim: &Stimulus) -> ScanResult<String> {
        pattern::build_spot(point, stim, *self.transform())
    }

    fn build_grid(&self, grid: &GridSpec, stim: &Stimulus) -> ScanResult<String> {
        pattern::build_grid(grid, stim, *self.transform())
    }

    fn build_target<P: AsRef<Path>>(
        &self,
        path: P,
        count: Option<usize>,
        stim: &Stimulus,
    ) -> ScanResult<String> {
        pattern::build_target(path, count, stim, *self.transform())
    }

    fn build_rapid_grid(&self, grid: &GridSpec, stim: &Stimulus) -> ScanResult<String> {
        pattern::build_rapid_grid(grid, stim, *self.transform())
    }

    fn build_rapid_target<P: AsRef<Path>>(
        &self,
        path: P,
        count: Option<usize>,
        stim: &Stimulus,
    ) -> ScanResult<String> {
        pattern::build_rapid_target(path, count, stim, *self.transform())
    }

    fn build_pattern<P: AsRef<Path>>(
        &self,
        path: P,
        start: PixelCoord,
        spacing: PixelCoord,
        stim: &Stimulus,
    ) -> ScanResult<String> {
        pattern::build_pattern(path, start, spacing, stim, *self.transform())
    }

    /// Galvo positions of the points in a coordinate file, rotated about their centroid exactly as
    /// [`build_target`](BaseStimulator::build_target) places them.
    fn galvo_coords<P: AsRef<Path>>(&self, path: P, count: Option<usize>) -> ScanResult<Vec<GalvoCoord>> {
        let transform = *self.transform();
        let points = pattern::rotated_points(&read_coords(path, count)?, transform.rotation)?;
        Ok(points.into_iter().map(|p| transform.to_galvo(p)).collect())
    }
}

/// Galvo rig holding the transform used for every protocol it builds.
#[cfg_attr(feature = "python", pyo3::pyclass)]
pub struct Stimulator {
    transform: Transform,
}

impl Stimulator {
    pub fn new(transform: Transform) -> Self {
        Self { transform }
    }
}

/// Converts galvo coordinates to a numpy array of shape `(N, 2)`.
#[cfg(feature = "python")]
pub fn py_galvo_array(py: pyo3::Python<'_>, coords: &[GalvoCoord]) -> pyo3::PyObject {
    use pyo3::ToPyObject;
    numpy::PyArray::from_array(py, &galvo_array(coords)).to_object(py)
}

/// A macro to generate boilerplate implementations for structs representing galvo rigs.
///
/// This macro assists in the conversion between Rust's trait system and Python's class system.
/// Given that PyO3 doesn't support exposing trait methods directly to Python, this macro wraps
/// each [`BaseStimulator`] trait method with a direct implementation, facilitating its export to
/// Python. The wrappers are only generated with the `python` feature of the invoking crate.
///
/// Points, starts and spacings are exchanged with python as `(x, y)` tuples, and timing as a
/// [`Stimulus`] object. Errors become python exceptions.
///
/// Usage:
/// ```rust
/// use scancmdr_backend::coord::*;
/// use scancmdr_backend::*;
///
/// #[cfg_attr(feature = "python", pyo3::pyclass)]
/// struct CustomStimulator {
///     transform: Transform,
///     some_property: f64,
/// }
/// impl_stim_boilerplate!(CustomStimulator);
///
/// let mut stim = CustomStimulator {
///     transform: Transform::new(4, PixelCoord::new(0, 0), 0.0),
///     some_property: 1.5,
/// };
/// BaseStimulator::set_scale_factor(&mut stim, 2).unwrap();
/// assert_eq!(stim.transform().scale_factor, 2);
/// assert_eq!(stim.some_property, 1.5);
/// ```
#[macro_export]
macro_rules! impl_stim_boilerplate {
    ($stim_type: ty) => {
        impl $crate::experiment::BaseStimulator for $stim_type {
            fn transform(&self) -> &$crate::coord::Transform {
                &self.transform
            }
            fn transform_(&mut self) -> &mut $crate::coord::Transform {
                &mut self.transform
            }
        }

        #[cfg(feature = "python")]
        #[pyo3::pymethods]
        impl $stim_type {
            // TRANSFORM METHODS
            pub fn scale_factor(&self) -> i64 {
                $crate::experiment::BaseStimulator::scale_factor(self)
            }

            pub fn set_scale_factor(&mut self, scale_factor: i64) -> pyo3::PyResult<()> {
                Ok($crate::experiment::BaseStimulator::set_scale_factor(self, scale_factor)?)
            }

            pub fn set_center_offset(&mut self, center: (i32, i32)) {
                $crate::experiment::BaseStimulator::set_center_offset(self, center.into())
            }

            pub fn set_rotation(&mut self, rotation: f64) -> pyo3::PyResult<()> {
                Ok($crate::experiment::BaseStimulator::set_rotation(self, rotation)?)
            }

            #[pyo3(signature = (path, count=None))]
            pub fn calibrate(&mut self, path: &str, count: Option<usize>) -> pyo3::PyResult<i64> {
                Ok($crate::experiment::BaseStimulator::calibrate(self, path, count)?)
            }

            /// Calibrates from an `(N, 4)` array of galvo x, galvo y, pixel x, pixel y.
            pub fn calibrate_array(
                &mut self,
                points: $crate::numpy::PyReadonlyArray2<f64>,
            ) -> pyo3::PyResult<i64> {
                let points = $crate::coord::calibration_from_array(points.as_array())?;
                Ok($crate::experiment::BaseStimulator::calibrate_points(self, &points)?)
            }

            // PROTOCOL METHODS
            pub fn build_spot(
                &self,
                point: (i32, i32),
                stim: $crate::timing::Stimulus,
            ) -> pyo3::PyResult<String> {
                Ok($crate::experiment::BaseStimulator::build_spot(self, point.into(), &stim)?)
            }

            pub fn build_grid(
                &self,
                dims: (u32, u32),
                start: (i32, i32),
                spacing: (i32, i32),
                stim: $crate::timing::Stimulus,
            ) -> pyo3::PyResult<String> {
                let grid = $crate::pattern::GridSpec::new(dims.0, dims.1, start.into(), spacing.into());
                Ok($crate::experiment::BaseStimulator::build_grid(self, &grid, &stim)?)
            }

            #[pyo3(signature = (path, stim, count=None))]
            pub fn build_target(
                &self,
                path: &str,
                stim: $crate::timing::Stimulus,
                count: Option<usize>,
            ) -> pyo3::PyResult<String> {
                Ok($crate::experiment::BaseStimulator::build_target(self, path, count, &stim)?)
            }

            pub fn build_rapid_grid(
                &self,
                dims: (u32, u32),
                start: (i32, i32),
                spacing: (i32, i32),
                stim: $crate::timing::Stimulus,
            ) -> pyo3::PyResult<String> {
                let grid = $crate::pattern::GridSpec::new(dims.0, dims.1, start.into(), spacing.into());
                Ok($crate::experiment::BaseStimulator::build_rapid_grid(self, &grid, &stim)?)
            }

            #[pyo3(signature = (path, stim, count=None))]
            pub fn build_rapid_target(
                &self,
                path: &str,
                stim: $crate::timing::Stimulus,
                count: Option<usize>,
            ) -> pyo3::PyResult<String> {
                Ok($crate::experiment::BaseStimulator::build_rapid_target(self, path, count, &stim)?)
            }

            pub fn build_pattern(
                &self,
                path: &str,
                start: (i32, i32),
                spacing: (i32, i32),
                stim: $crate::timing::Stimulus,
            ) -> pyo3::PyResult<String> {
                Ok($crate::experiment::BaseStimulator::build_pattern(
                    self,
                    path,
                    start.into(),
                    spacing.into(),
                    &stim,
                )?)
            }

            // INSPECTION
            #[pyo3(signature = (path, count=None))]
            pub fn galvo_coords(
                &self,
                path: &str,
                count: Option<usize>,
                py: pyo3::Python<'_>,
            ) -> pyo3::PyResult<pyo3::PyObject> {
                let coords = $crate::experiment::BaseStimulator::galvo_coords(self, path, count)?;
                Ok($crate::experiment::py_galvo_array(py, &coords))
            }
        }
    };
}

#[cfg(feature = "python")]
#[pyo3::pymethods]
impl Stimulator {
    #[new]
    #[pyo3(signature = (scale_factor=1, center_offset=(0, 0), rotation=0.0))]
    pub fn py_new(scale_factor: i64, center_offset: (i32, i32), rotation: f64) -> pyo3::PyResult<Self> {
        let transform = Transform::new(scale_factor, center_offset.into(), rotation);
        transform.validate()?;
        Ok(Self::new(transform))
    }
}

impl_stim_boilerplate!(Stimulator);
