//! Readers for the tab-delimited coordinate, pattern and calibration files.
//!
//! | File | Record |
//! |---|---|
//! | coordinates | `<x>\t<y>` (integers) |
//! | pattern | header `<count>\t<xDims>\t<yDims>`, then `count` records `<gx>\t<gy>` (1-based) |
//! | calibration | `<galvoX>\t<galvoY>\t<pixelX>\t<pixelY>` (floats) |
//!
//! Blank lines are skipped everywhere. Each parser takes any [`BufRead`] plus an `origin` used in
//! error messages; the `read_*` functions open a path and delegate to them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::coord::{CalibrationPoint, PixelCoord};
use crate::error::{ScanError, ScanResult};

static COORD_RECORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)\s+([+-]?\d+)\s*$").unwrap());
static PATTERN_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\d+)\s*$").unwrap());
static CALIBRATION_RECORD: Lazy<Regex> = Lazy::new(|| {
    let num = r"([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)";
    Regex::new(&format!(r"^\s*{num}\s+{num}\s+{num}\s+{num}\s*$")).unwrap()
});

/// Grid cells of a pattern file, as 1-based indices into a `dims.0 x dims.1` grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternFile {
    pub dims: (u32, u32),
    pub cells: Vec<PixelCoord>,
}

impl PatternFile {
    /// Pixel position of every cell for a grid starting at `start` with `spacing` between cells.
    ///
    /// Columns advance along +X and rows along -Y, matching the raster direction of the grid
    /// generators.
    pub fn positions(&self, start: PixelCoord, spacing: PixelCoord) -> ScanResult<Vec<PixelCoord>> {
        self.cells
            .iter()
            .map(|cell| {
                start.grid_offset(spacing, i64::from(cell.x) - 1, i64::from(cell.y) - 1)
            })
            .collect()
    }
}

fn open(path: &Path) -> ScanResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ScanError::Resource {
            path: path.to_path_buf(),
            source,
        })
}

/// Yields `(line number, trimmed content)` of every non-blank line.
fn records<'a, R: BufRead + 'a>(
    reader: R,
    origin: &'a str,
) -> impl Iterator<Item = ScanResult<(usize, String)>> + 'a {
    reader
        .lines()
        .enumerate()
        .filter_map(move |(idx, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(Ok((idx + 1, line.trim().to_string()))),
            Err(err) => Some(Err(ScanError::Parse {
                origin: origin.to_string(),
                line: idx + 1,
                reason: err.to_string(),
            })),
        })
}

fn parse_field<T: std::str::FromStr>(text: &str, origin: &str, line: usize) -> ScanResult<T>
where
    T::Err: std::fmt::Display,
{
    text.parse::<T>().map_err(|err| ScanError::Parse {
        origin: origin.to_string(),
        line,
        reason: format!("'{}': {}", text, err),
    })
}

fn malformed(origin: &str, line: usize, expected: &str, content: &str) -> ScanError {
    ScanError::Parse {
        origin: origin.to_string(),
        line,
        reason: format!("expected {}, found '{}'", expected, content),
    }
}

fn check_count(origin: &str, expected: Option<usize>, found: usize) -> ScanResult<()> {
    match expected {
        Some(expected) if found < expected => Err(ScanError::PointCount {
            origin: origin.to_string(),
            expected,
            found,
        }),
        _ => Ok(()),
    }
}

/// Parses coordinate records. With `expected = Some(n)`, reading stops after `n` records and
/// fewer than `n` is an error.
pub fn parse_coords<R: BufRead>(
    reader: R,
    origin: &str,
    expected: Option<usize>,
) -> ScanResult<Vec<PixelCoord>> {
    let mut points = Vec::new();
    for record in records(reader, origin) {
        if expected.is_some_and(|n| points.len() >= n) {
            break;
        }
        let (line, content) = record?;
        let caps = COORD_RECORD
            .captures(&content)
            .ok_or_else(|| malformed(origin, line, "<x>\\t<y>", &content))?;
        points.try_reserve(1)?;
        points.push(PixelCoord {
            x: parse_field(&caps[1], origin, line)?,
            y: parse_field(&caps[2], origin, line)?,
        });
    }
    check_count(origin, expected, points.len())?;
    debug!("Read {} coordinates from {}", points.len(), origin);
    Ok(points)
}

/// Parses a pattern file. Every cell index must lie within `1..=dims` of its axis.
pub fn parse_pattern<R: BufRead>(reader: R, origin: &str) -> ScanResult<PatternFile> {
    let mut lines = records(reader, origin);
    let (line, header) = lines.next().ok_or_else(|| ScanError::PointCount {
        origin: origin.to_string(),
        expected: 1,
        found: 0,
    })??;
    let caps = PATTERN_HEADER
        .captures(&header)
        .ok_or_else(|| malformed(origin, line, "<count>\\t<xDims>\\t<yDims>", &header))?;
    let count: usize = parse_field(&caps[1], origin, line)?;
    let dims: (u32, u32) = (
        parse_field(&caps[2], origin, line)?,
        parse_field(&caps[3], origin, line)?,
    );
    if dims.0 == 0 || dims.1 == 0 {
        return Err(malformed(origin, line, "non-zero pattern dimensions", &header));
    }

    let mut cells = Vec::new();
    cells.try_reserve(count)?;
    for record in lines.take(count) {
        let (line, content) = record?;
        let caps = COORD_RECORD
            .captures(&content)
            .ok_or_else(|| malformed(origin, line, "<gx>\\t<gy>", &content))?;
        let gx: i32 = parse_field(&caps[1], origin, line)?;
        let gy: i32 = parse_field(&caps[2], origin, line)?;
        let within = |idx: i32, dim: u32| idx >= 1 && i64::from(idx) <= i64::from(dim);
        if !within(gx, dims.0) || !within(gy, dims.1) {
            return Err(ScanError::Parse {
                origin: origin.to_string(),
                line,
                reason: format!(
                    "cell ({}, {}) outside the {}x{} pattern grid",
                    gx, gy, dims.0, dims.1
                ),
            });
        }
        cells.push(PixelCoord { x: gx, y: gy });
    }
    check_count(origin, Some(count), cells.len())?;
    debug!(
        "Read {} pattern cells on a {}x{} grid from {}",
        cells.len(),
        dims.0,
        dims.1,
        origin
    );
    Ok(PatternFile { dims, cells })
}

/// Parses calibration records, with the same `expected` semantics as [`parse_coords`].
pub fn parse_calibration<R: BufRead>(
    reader: R,
    origin: &str,
    expected: Option<usize>,
) -> ScanResult<Vec<CalibrationPoint>> {
    let mut points = Vec::new();
    for record in records(reader, origin) {
        if expected.is_some_and(|n| points.len() >= n) {
            break;
        }
        let (line, content) = record?;
        let caps = CALIBRATION_RECORD.captures(&content).ok_or_else(|| {
            malformed(
                origin,
                line,
                "<galvoX>\\t<galvoY>\\t<pixelX>\\t<pixelY>",
                &content,
            )
        })?;
        points.try_reserve(1)?;
        points.push(CalibrationPoint {
            galvo_x: parse_field(&caps[1], origin, line)?,
            galvo_y: parse_field(&caps[2], origin, line)?,
            pixel_x: parse_field(&caps[3], origin, line)?,
            pixel_y: parse_field(&caps[4], origin, line)?,
        });
    }
    check_count(origin, expected, points.len())?;
    debug!("Read {} calibration points from {}", points.len(), origin);
    Ok(points)
}

pub fn read_coords<P: AsRef<Path>>(path: P, expected: Option<usize>) -> ScanResult<Vec<PixelCoord>> {
    let path = path.as_ref();
    parse_coords(open(path)?, &path.display().to_string(), expected)
}

pub fn read_pattern<P: AsRef<Path>>(path: P) -> ScanResult<PatternFile> {
    let path = path.as_ref();
    parse_pattern(open(path)?, &path.display().to_string())
}

pub fn read_calibration<P: AsRef<Path>>(
    path: P,
    expected: Option<usize>,
) -> ScanResult<Vec<CalibrationPoint>> {
    let path = path.as_ref();
    parse_calibration(open(path)?, &path.display().to_string(), expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn coords_skip_blank_lines() {
        let text = "10\t20\n\n-5\t7\n   \n3 4\n";
        let points = parse_coords(Cursor::new(text), "mem", None).unwrap();
        assert_eq!(
            points,
            vec![PixelCoord::new(10, 20), PixelCoord::new(-5, 7), PixelCoord::new(3, 4)]
        );
    }

    #[test]
    fn coords_expected_count() {
        let text = "1\t1\n2\t2\n3\t3\n";
        let points = parse_coords(Cursor::new(text), "mem", Some(2)).unwrap();
        assert_eq!(points.len(), 2);

        let err = parse_coords(Cursor::new(text), "mem", Some(5)).unwrap_err();
        assert!(matches!(
            err,
            ScanError::PointCount { expected: 5, found: 3, .. }
        ));
    }

    #[test]
    fn malformed_record_names_line() {
        let text = "1\t1\n\nabc\t2\n";
        match parse_coords(Cursor::new(text), "targets.coord", None) {
            Err(ScanError::Parse { origin, line, .. }) => {
                assert_eq!(origin, "targets.coord");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn pattern_header_and_cells() {
        let text = "3\t4\t2\n1\t1\n4\t2\n2\t1\n";
        let pattern = parse_pattern(Cursor::new(text), "mem").unwrap();
        assert_eq!(pattern.dims, (4, 2));
        assert_eq!(pattern.cells.len(), 3);

        let positions = pattern
            .positions(PixelCoord::new(100, 200), PixelCoord::new(10, 5))
            .unwrap();
        assert_eq!(
            positions,
            vec![
                PixelCoord::new(100, 200),
                PixelCoord::new(130, 195),
                PixelCoord::new(110, 200)
            ]
        );
    }

    #[test]
    fn pattern_rejects_short_file_and_bad_index() {
        let short = "3\t2\t2\n1\t1\n";
        assert!(matches!(
            parse_pattern(Cursor::new(short), "mem"),
            Err(ScanError::PointCount { expected: 3, found: 1, .. })
        ));

        let outside = "1\t2\t2\n3\t1\n";
        assert!(matches!(
            parse_pattern(Cursor::new(outside), "mem"),
            Err(ScanError::Parse { line: 2, .. })
        ));

        let zero_index = "1\t2\t2\n0\t1\n";
        assert!(parse_pattern(Cursor::new(zero_index), "mem").is_err());
        assert!(parse_pattern(Cursor::new(""), "mem").is_err());
    }

    #[test]
    fn positions_outside_pixel_range() {
        let pattern = parse_pattern(Cursor::new("1\t100\t1\n100\t1\n"), "mem").unwrap();
        assert!(matches!(
            pattern.positions(PixelCoord::new(0, 0), PixelCoord::new(30_000_000, 1)),
            Err(ScanError::InvalidParameter(_))
        ));
    }

    #[test]
    fn calibration_floats() {
        let text = "100.5\t-20\t50\t0.25\n0\t1e2\t.5\t50\n";
        let points = parse_calibration(Cursor::new(text), "mem", None).unwrap();
        assert_eq!(points[0].galvo_x, 100.5);
        assert_eq!(points[0].galvo_y, -20.0);
        assert_eq!(points[0].pixel_y, 0.25);
        assert_eq!(points[1].galvo_y, 100.0);
        assert_eq!(points[1].pixel_x, 0.5);
        assert!(parse_calibration(Cursor::new("1\t2\t3\n"), "mem", None).is_err());
    }

    #[test]
    fn missing_file_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.coord");
        assert!(matches!(
            read_coords(&path, None),
            Err(ScanError::Resource { .. })
        ));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "716\t206").unwrap();
        writeln!(file, "450\t400").unwrap();
        let points = read_coords(file.path(), Some(2)).unwrap();
        assert_eq!(points[1], PixelCoord::new(450, 400));
    }
}
