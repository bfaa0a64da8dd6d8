//! Pixel-space to galvanometer-space coordinate math.
//!
//! Experiment coordinates ([`PixelCoord`]) are image pixels (or microns) as seen by the camera.
//! The DSP positions each mirror in *microcounts*, a signed 36-bit unit of which only the top
//! 16 bits reach the galvo driver. The mapping between the two is a rotation, a uniform scale
//! (the [`ScaleFactor`], derived from calibration points by [`calc_scaling`]) and a shift of
//! origin to the optical center, with both axes inverted by the mirror geometry.
//!
//! Rotations of target sets are applied in pixel space (see [`rotate_coord`]) before scaling, so
//! that spacing stays uniform after rounding.

use ndarray::{Array2, ArrayView2};

use crate::error::{ScanError, ScanResult};

/// Microcounts per pixel unit.
pub type ScaleFactor = i64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelCoord {
    pub x: i32,
    pub y: i32,
}
impl PixelCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position `columns` cells along +X and `rows` cells along -Y from `self`.
    ///
    /// Fails with [`ScanError::InvalidParameter`] when the result leaves the `i32` pixel range.
    pub fn grid_offset(self, spacing: PixelCoord, columns: i64, rows: i64) -> ScanResult<Self> {
        let axis = |origin: i32, step: i32, n: i64| {
            i64::from(step)
                .checked_mul(n)
                .and_then(|d| i64::from(origin).checked_add(d))
                .and_then(|v| i32::try_from(v).ok())
        };
        match (
            axis(self.x, spacing.x, columns),
            rows.checked_neg().and_then(|n| axis(self.y, spacing.y, n)),
        ) {
            (Some(x), Some(y)) => Ok(Self { x, y }),
            _ => Err(ScanError::InvalidParameter(format!(
                "grid cell ({}, {}) from {:?} with spacing {:?} is outside the pixel range",
                columns, rows, self, spacing
            ))),
        }
    }
}
impl From<(i32, i32)> for PixelCoord {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GalvoCoord {
    pub x: i64,
    pub y: i64,
}

/// Scale, center and rotation used to place targets. Passed by value to every generator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub scale_factor: ScaleFactor,
    /// Pixel coordinate of the optical center (galvo position 0, 0).
    pub center_offset: PixelCoord,
    /// Rotation of target sets, in radians.
    pub rotation: f64,
}
impl Transform {
    pub fn new(scale_factor: ScaleFactor, center_offset: PixelCoord, rotation: f64) -> Self {
        Self {
            scale_factor,
            center_offset,
            rotation,
        }
    }

    pub fn validate(&self) -> ScanResult<()> {
        if self.scale_factor <= 0 {
            return Err(ScanError::InvalidParameter(format!(
                "scale factor must be positive, got {}",
                self.scale_factor
            )));
        }
        if !self.rotation.is_finite() {
            return Err(ScanError::InvalidParameter(format!(
                "rotation must be finite, got {}",
                self.rotation
            )));
        }
        Ok(())
    }

    /// Converts with this transform's scale and center, without rotation.
    pub fn to_galvo(&self, pixel: PixelCoord) -> GalvoCoord {
        convert_coord(pixel, self.scale_factor, self.center_offset, 0.0)
    }
}

/// One calibration record: a galvo position and the pixel at which the spot was observed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalibrationPoint {
    pub galvo_x: f64,
    pub galvo_y: f64,
    pub pixel_x: f64,
    pub pixel_y: f64,
}

/// Maps a pixel coordinate to galvo microcounts.
///
/// The offset from `center_offset` is rotated by `rot_angle` radians and scaled by
/// `scale_factor`; both axes are then negated and truncated toward zero.
///
/// # Examples
///
/// ```
/// use scancmdr_backend::coord::*;
///
/// let galvo = convert_coord(PixelCoord::new(450, 400), 2, PixelCoord::new(716, 206), 0.0);
/// assert_eq!(galvo, GalvoCoord { x: 532, y: -388 });
/// ```
pub fn convert_coord(
    pixel: PixelCoord,
    scale_factor: ScaleFactor,
    center_offset: PixelCoord,
    rot_angle: f64,
) -> GalvoCoord {
    let dx = f64::from(pixel.x) - f64::from(center_offset.x);
    let dy = f64::from(pixel.y) - f64::from(center_offset.y);
    let (sin, cos) = rot_angle.sin_cos();
    let scale = scale_factor as f64;

    let x = scale * (dx * cos - dy * sin);
    let y = scale * (dx * sin + dy * cos);
    GalvoCoord {
        x: (-x) as i64,
        y: (-y) as i64,
    }
}

/// Rotates `pixel` by `rot_angle` radians about `axis_center`, rounding to the nearest pixel.
pub fn rotate_coord(pixel: PixelCoord, axis_center: PixelCoord, rot_angle: f64) -> PixelCoord {
    let dx = f64::from(pixel.x) - f64::from(axis_center.x);
    let dy = f64::from(pixel.y) - f64::from(axis_center.y);
    let (sin, cos) = rot_angle.sin_cos();

    let rx = (dx * cos - dy * sin).round() as i32;
    let ry = (dx * sin + dy * cos).round() as i32;
    PixelCoord {
        x: axis_center.x.saturating_add(rx),
        y: axis_center.y.saturating_add(ry),
    }
}

/// Arithmetic mean of `points`, rounded to the nearest pixel.
pub fn centroid(points: &[PixelCoord]) -> ScanResult<PixelCoord> {
    if points.is_empty() {
        return Err(ScanError::EmptyPointSet);
    }
    let (sum_x, sum_y) = points.iter().fold((0i64, 0i64), |(sx, sy), p| {
        (sx + i64::from(p.x), sy + i64::from(p.y))
    });
    let n = points.len() as f64;
    Ok(PixelCoord {
        x: (sum_x as f64 / n).round() as i32,
        y: (sum_y as f64 / n).round() as i32,
    })
}

/// Derives the scale factor (microcounts per pixel) from calibration points.
///
/// For every pair of points, the ratio `|Δgalvo| / |Δpixel|` is taken on each axis where the
/// two pixel coordinates differ (X before Y). The ratios are folded into a running average
/// seeded with the first one, each later non-zero ratio replacing the average with the mean of
/// the two. This weighs late pairs more heavily than a plain mean would, and is kept as is since
/// existing calibrations were computed this way.
///
/// # Examples
///
/// ```
/// use scancmdr_backend::coord::*;
///
/// let points = [
///     CalibrationPoint { galvo_x: 0., galvo_y: 0., pixel_x: 0., pixel_y: 0. },
///     CalibrationPoint { galvo_x: 100., galvo_y: 0., pixel_x: 50., pixel_y: 0. },
///     CalibrationPoint { galvo_x: 0., galvo_y: 100., pixel_x: 0., pixel_y: 50. },
/// ];
/// assert_eq!(calc_scaling(&points).unwrap(), 2);
/// ```
pub fn calc_scaling(points: &[CalibrationPoint]) -> ScanResult<ScaleFactor> {
    if points.len() < 2 {
        return Err(ScanError::DegenerateCalibration(format!(
            "need at least 2 calibration points, got {}",
            points.len()
        )));
    }

    let mut ratios = Vec::with_capacity(points.len() * (points.len() - 1));
    let (mut x_pairs, mut y_pairs) = (0usize, 0usize);
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            if a.pixel_x != b.pixel_x {
                ratios.push((a.galvo_x - b.galvo_x).abs() / (a.pixel_x - b.pixel_x).abs());
                x_pairs += 1;
            }
            if a.pixel_y != b.pixel_y {
                ratios.push((a.galvo_y - b.galvo_y).abs() / (a.pixel_y - b.pixel_y).abs());
                y_pairs += 1;
            }
        }
    }
    for (axis, pairs) in [("X", x_pairs), ("Y", y_pairs)] {
        if pairs == 0 {
            return Err(ScanError::DegenerateCalibration(format!(
                "all calibration points share the same pixel {} coordinate",
                axis
            )));
        }
    }

    let mut scale_factor = ratios[0];
    for &ratio in &ratios[1..] {
        if ratio != 0.0 {
            scale_factor = (scale_factor + ratio) / 2.0;
        }
    }

    let scale_factor = scale_factor.round();
    if !scale_factor.is_finite() || scale_factor < 1.0 {
        return Err(ScanError::DegenerateCalibration(format!(
            "computed scale factor {} is not positive",
            scale_factor
        )));
    }
    Ok(scale_factor as ScaleFactor)
}

/// Reads an `N x 4` array with columns galvo X, galvo Y, pixel X, pixel Y.
pub fn calibration_from_array(arr: ArrayView2<f64>) -> ScanResult<Vec<CalibrationPoint>> {
    if arr.ncols() != 4 {
        return Err(ScanError::InvalidParameter(format!(
            "calibration array must have 4 columns (galvo x, galvo y, pixel x, pixel y), got {}",
            arr.ncols()
        )));
    }
    Ok(arr
        .rows()
        .into_iter()
        .map(|row| CalibrationPoint {
            galvo_x: row[0],
            galvo_y: row[1],
            pixel_x: row[2],
            pixel_y: row[3],
        })
        .collect())
}

/// Packs galvo coordinates into an `N x 2` array of (x, y) rows.
pub fn galvo_array(coords: &[GalvoCoord]) -> Array2<i64> {
    let mut arr = Array2::<i64>::zeros((coords.len(), 2));
    for (mut row, coord) in arr.rows_mut().into_iter().zip(coords) {
        row[0] = coord.x;
        row[1] = coord.y;
    }
    arr
}
