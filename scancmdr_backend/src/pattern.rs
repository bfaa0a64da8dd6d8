//! Pattern generators: from experiment parameters to a complete [`Protocol`].
//!
//! ## Generators
//!
//! | Generator | Targets | Per target |
//! |---|---|---|
//! | [`spot`] | one point | one episode |
//! | [`grid`] | `nx x ny` raster | `iterations` episodes |
//! | [`target`] | list of points | `iterations` episodes |
//! | [`pattern`] | cells of a pattern file on a grid | as [`target`] |
//! | [`rapid_grid`] | `nx x ny` raster | one pulse, single trigger for the whole raster |
//! | [`rapid_target`] | list of points | one pulse, single trigger for the whole list |
//!
//! Each `build_*` counterpart renders the protocol to its wire text.
//!
//! ## Timing
//!
//! An *episode* starting at cycle `s` consists of an optional trigger at `s` followed by a pulse
//! train starting at `s + baseline`. Every protocol is wrapped in a master loop of `reps`
//! repetitions, each lasting the time covered by the body plus
//! [`PROT_PERIOD`](crate::timing::PROT_PERIOD).
//!
//! Every loop started at `t0` with `n` repetitions of duration `dt` is closed at exactly
//! `t0 + n * dt`; the DSP derives the loop period from that difference.
//!
//! Trigger-bearing events never happen at cycle 0, where the DSP drops them: episodes start at
//! [`TIME_OFFSET`](crate::timing::TIME_OFFSET).
//!
//! ## Geometry
//!
//! Rasters walk +X along a row, then step -Y to the next row (in pixel space). With a non-zero
//! rotation, grids rotate about the center of their four corners and point sets about their
//! centroid, before conversion to galvo space.

use std::path::Path;

use log::debug;

use crate::channel::Axis;
use crate::coord::*;
use crate::error::{ScanError, ScanResult};
use crate::instruction::*;
use crate::protocol::Protocol;
use crate::reader::{read_coords, read_pattern, PatternFile};
use crate::timing::*;

/// Raster of `nx` columns by `ny` rows starting at `start` (top left in pixel space).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSpec {
    pub nx: u32,
    pub ny: u32,
    pub start: PixelCoord,
    pub spacing: PixelCoord,
}

impl GridSpec {
    pub fn new(nx: u32, ny: u32, start: PixelCoord, spacing: PixelCoord) -> Self {
        Self {
            nx,
            ny,
            start,
            spacing,
        }
    }

    pub fn count(&self) -> u64 {
        u64::from(self.nx) * u64::from(self.ny)
    }

    fn validate(&self) -> ScanResult<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(ScanError::InvalidParameter(format!(
                "grid dimensions must be at least 1x1, got {}x{}",
                self.nx, self.ny
            )));
        }
        Ok(())
    }

    fn corners(&self) -> ScanResult<[PixelCoord; 4]> {
        let far = self.start.grid_offset(
            self.spacing,
            i64::from(self.nx) - 1,
            i64::from(self.ny) - 1,
        )?;
        Ok([
            self.start,
            PixelCoord::new(far.x, self.start.y),
            far,
            PixelCoord::new(self.start.x, far.y),
        ])
    }
}

/// Galvo-space start position and per-column / per-row relative steps of a raster.
struct Raster {
    start: GalvoCoord,
    x_step: GalvoCoord,
    y_step: GalvoCoord,
    nx: u64,
    ny: u64,
}

impl Raster {
    fn new(grid: &GridSpec, transform: Transform) -> ScanResult<Self> {
        let theta = transform.rotation;
        let start = if theta != 0.0 {
            rotate_coord(grid.start, centroid(&grid.corners()?)?, theta)
        } else {
            grid.start
        };
        let (sin, cos) = theta.sin_cos();
        let (sx, sy) = (f64::from(grid.spacing.x), f64::from(grid.spacing.y));
        let sf = transform.scale_factor as f64;
        // Galvo axes are inverted with respect to pixel axes
        let to_galvo = |px: f64, py: f64| GalvoCoord {
            x: (-(px * sf)).round() as i64,
            y: (-(py * sf)).round() as i64,
        };
        Ok(Self {
            start: transform.to_galvo(start),
            x_step: to_galvo(sx * cos, sx * sin),
            y_step: to_galvo(sy * sin, -sy * cos),
            nx: u64::from(grid.nx),
            ny: u64::from(grid.ny),
        })
    }

    /// Relative move bringing the mirrors from the end of a row to the start of the next one.
    fn row_return(&self) -> GalvoCoord {
        let nx = self.nx as i64;
        GalvoCoord {
            x: self.y_step.x.saturating_sub(nx.saturating_mul(self.x_step.x)),
            y: self.y_step.y.saturating_sub(nx.saturating_mul(self.x_step.y)),
        }
    }
}

fn validate(stim: &Stimulus, transform: &Transform) -> ScanResult<()> {
    stim.validate()?;
    transform.validate()
}

/// Rotates a point set about its centroid.
pub(crate) fn rotated_points(points: &[PixelCoord], rotation: f64) -> ScanResult<Vec<PixelCoord>> {
    let center = centroid(points)?;
    if rotation == 0.0 {
        return Ok(points.to_vec());
    }
    Ok(points
        .iter()
        .map(|&p| rotate_coord(p, center, rotation))
        .collect())
}

fn append_position(prot: &mut Protocol, cycle: u64, pos: GalvoCoord) -> ScanResult<()> {
    prot.append_move(Axis::X, cycle, pos.x)?;
    prot.append_move(Axis::Y, cycle, pos.y)
}

// Zero components are skipped
fn append_step(prot: &mut Protocol, cycle: u64, step: GalvoCoord) -> ScanResult<()> {
    if step.x != 0 {
        prot.append_rel(Axis::X, cycle, step.x)?;
    }
    if step.y != 0 {
        prot.append_rel(Axis::Y, cycle, step.y)?;
    }
    Ok(())
}

fn append_trigger(prot: &mut Protocol, cycle: u64, trigger: Trigger) -> ScanResult<()> {
    match trigger {
        Trigger::None => Ok(()),
        Trigger::In => prot.append_trig_in(cycle, Edge::Rising),
        Trigger::Out => {
            prot.append_trig_out(cycle, TriggerLevel::TriggerHigh)?;
            prot.append_trig_out(cycle + TRIG_LEN, TriggerLevel::BothLow)
        }
    }
}

fn append_pulse(prot: &mut Protocol, cycle: u64, timing: &Timing) -> ScanResult<()> {
    prot.append_trig_out(cycle, TriggerLevel::LaserHigh)?;
    prot.append_trig_out(cycle.saturating_add(timing.time_on), TriggerLevel::BothLow)
}

fn append_pulse_train(
    prot: &mut Protocol,
    cycle: u64,
    num_pulses: u64,
    timing: &Timing,
) -> ScanResult<()> {
    if num_pulses == 1 {
        return append_pulse(prot, cycle, timing);
    }
    prot.append_loop(LoopMark::Start, cycle, num_pulses)?;
    append_pulse(prot, cycle, timing)?;
    prot.append_loop(LoopMark::End, after(cycle, num_pulses, timing.isi), num_pulses)
}

/// Appends `iterations` episodes starting at `cycle`, one every episode period.
fn append_episode(
    prot: &mut Protocol,
    cycle: u64,
    stim: &Stimulus,
    timing: &Timing,
) -> ScanResult<()> {
    let iterations = u64::from(stim.iterations);
    if iterations > 1 {
        prot.append_loop(LoopMark::Start, cycle, iterations)?;
    }
    append_trigger(prot, cycle, stim.trigger)?;
    append_pulse_train(
        prot,
        cycle.saturating_add(timing.baseline),
        u64::from(stim.num_pulses),
        timing,
    )?;
    if iterations > 1 {
        prot.append_loop(
            LoopMark::End,
            after(cycle, iterations, timing.episode_period),
            iterations,
        )?;
    }
    Ok(())
}

/// Closes the master loop of a body covering `span` cycles and checks the finished protocol.
fn finish(mut prot: Protocol, kind: &str, reps: u16, span: u64) -> ScanResult<Protocol> {
    let reps = u64::from(reps);
    prot.append_loop(LoopMark::End, after(0, reps, span.saturating_add(PROT_PERIOD)), reps)?;
    prot.check_loops()?;
    if prot.line_count() > MAX_PROTOCOL_LINES {
        return Err(ScanError::ProtocolTooLong {
            lines: prot.line_count(),
        });
    }
    debug!(
        "Built {} protocol: {} commands, {} repetition(s) of {} cycles",
        kind,
        prot.len(),
        reps,
        span
    );
    Ok(prot)
}

fn start(reps: u16) -> ScanResult<Protocol> {
    let mut prot = Protocol::new();
    prot.append_loop(LoopMark::Start, 0, u64::from(reps))?;
    Ok(prot)
}

/// Stimulates a single point.
///
/// The mirrors are positioned at cycle 0, the trigger fires at
/// [`TIME_OFFSET`](crate::timing::TIME_OFFSET) and the pulse train starts at the baseline, but
/// never before the trigger. With one pulse and no trigger the protocol is exactly: master loop
/// start, move X, move Y, pulse on, pulse off, master loop end.
///
/// # Examples
///
/// ```
/// use scancmdr_backend::coord::*;
/// use scancmdr_backend::pattern::spot;
/// use scancmdr_backend::timing::Stimulus;
///
/// let transform = Transform::new(1, PixelCoord::new(0, 0), 0.0);
/// let stim = Stimulus { baseline: 10, time_on: 5, ..Stimulus::default() };
/// let prot = spot(PixelCoord::new(-100, 50), &stim, transform).unwrap();
/// assert_eq!(
///     prot.render().unwrap(),
///     "C\nAS,0,9,1\nAV,0,4,100\nAV,0,3,-50\nAV,1000,7,4\nAV,1500,7,0\nAE,1550,9,1\n"
/// );
/// ```
pub fn spot(point: PixelCoord, stim: &Stimulus, transform: Transform) -> ScanResult<Protocol> {
    validate(stim, &transform)?;
    let num_pulses = u64::from(stim.num_pulses);
    let timing = stim.coerce(num_pulses);

    let mut prot = start(stim.reps)?;
    append_position(&mut prot, 0, transform.to_galvo(point))?;
    append_trigger(&mut prot, TIME_OFFSET, stim.trigger)?;
    let pulse_start = timing.baseline.max(TIME_OFFSET);
    append_pulse_train(&mut prot, pulse_start, num_pulses, &timing)?;

    let span = timing
        .episode_period
        .max(after(pulse_start, num_pulses, timing.isi));
    finish(prot, "spot", stim.reps, span)
}

/// Stimulates every point of a raster, `iterations` episodes per point.
///
/// The raster is driven by two nested loops of relative moves: the X loop steps one column per
/// `iterations * episode_period`, and the Y loop steps one row and returns X to the first column.
pub fn grid(grid: &GridSpec, stim: &Stimulus, transform: Transform) -> ScanResult<Protocol> {
    validate(stim, &transform)?;
    grid.validate()?;
    let timing = stim.coerce(u64::from(stim.num_pulses));
    let raster = Raster::new(grid, transform)?;
    let spot_period = after(0, u64::from(stim.iterations), timing.episode_period);
    let es = TIME_OFFSET;
    let row_end = after(es, raster.nx, spot_period);
    let span = after(es, raster.nx.saturating_mul(raster.ny), spot_period);

    let mut prot = start(stim.reps)?;
    append_position(&mut prot, 0, raster.start)?;
    prot.append_loop(LoopMark::Start, es, raster.ny)?;
    prot.append_loop(LoopMark::Start, es, raster.nx)?;
    append_episode(&mut prot, es, stim, &timing)?;
    append_step(&mut prot, es.saturating_add(spot_period), raster.x_step)?;
    prot.append_loop(LoopMark::End, row_end, raster.nx)?;
    append_step(&mut prot, row_end, raster.row_return())?;
    prot.append_loop(LoopMark::End, span, raster.ny)?;
    finish(prot, "grid", stim.reps, span)
}

/// Stimulates every point of `points` in order, `iterations` episodes per point.
pub fn target(points: &[PixelCoord], stim: &Stimulus, transform: Transform) -> ScanResult<Protocol> {
    validate(stim, &transform)?;
    let points = rotated_points(points, transform.rotation)?;
    let timing = stim.coerce(u64::from(stim.num_pulses));
    let spot_period = after(0, u64::from(stim.iterations), timing.episode_period);
    let es = TIME_OFFSET;

    let mut prot = start(stim.reps)?;
    for (k, &point) in points.iter().enumerate() {
        let cycle = after(es, k as u64, spot_period);
        append_position(&mut prot, cycle, transform.to_galvo(point))?;
        append_episode(&mut prot, cycle, stim, &timing)?;
    }
    let span = after(es, points.len() as u64, spot_period);
    finish(prot, "target", stim.reps, span)
}

/// Stimulates the cells of a pattern file laid out on a grid, as [`target`] does.
pub fn pattern(
    pattern: &PatternFile,
    start: PixelCoord,
    spacing: PixelCoord,
    stim: &Stimulus,
    transform: Transform,
) -> ScanResult<Protocol> {
    target(&pattern.positions(start, spacing)?, stim, transform)
}

/// Sweeps a raster with one pulse per point, after a single trigger.
///
/// Columns follow each other every inter-stimulus interval. The episode period is coerced to
/// hold the whole raster.
pub fn rapid_grid(grid: &GridSpec, stim: &Stimulus, transform: Transform) -> ScanResult<Protocol> {
    validate(stim, &transform)?;
    grid.validate()?;
    let timing = stim.coerce(grid.count());
    let raster = Raster::new(grid, transform)?;
    let es = TIME_OFFSET;
    let ps = es.saturating_add(timing.baseline);
    let row_end = after(ps, raster.nx, timing.isi);

    let mut prot = start(stim.reps)?;
    append_position(&mut prot, 0, raster.start)?;
    append_trigger(&mut prot, es, stim.trigger)?;
    prot.append_loop(LoopMark::Start, ps, raster.ny)?;
    prot.append_loop(LoopMark::Start, ps, raster.nx)?;
    append_pulse(&mut prot, ps, &timing)?;
    append_step(&mut prot, ps.saturating_add(timing.isi), raster.x_step)?;
    prot.append_loop(LoopMark::End, row_end, raster.nx)?;
    append_step(&mut prot, row_end, raster.row_return())?;
    prot.append_loop(
        LoopMark::End,
        after(ps, raster.nx.saturating_mul(raster.ny), timing.isi),
        raster.ny,
    )?;
    finish(prot, "rapid grid", stim.reps, es.saturating_add(timing.episode_period))
}

/// Visits every point of `points` with one pulse each, after a single trigger.
pub fn rapid_target(
    points: &[PixelCoord],
    stim: &Stimulus,
    transform: Transform,
) -> ScanResult<Protocol> {
    validate(stim, &transform)?;
    let points = rotated_points(points, transform.rotation)?;
    let timing = stim.coerce(points.len() as u64);
    let es = TIME_OFFSET;
    let ps = es.saturating_add(timing.baseline);

    let mut prot = start(stim.reps)?;
    append_trigger(&mut prot, es, stim.trigger)?;
    for (m, &point) in points.iter().enumerate() {
        let cycle = after(ps, m as u64, timing.isi);
        append_position(&mut prot, cycle, transform.to_galvo(point))?;
        append_pulse(&mut prot, cycle, &timing)?;
    }
    finish(prot, "rapid target", stim.reps, es.saturating_add(timing.episode_period))
}

pub fn build_spot(point: PixelCoord, stim: &Stimulus, transform: Transform) -> ScanResult<String> {
    spot(point, stim, transform)?.render()
}

pub fn build_grid(grid_spec: &GridSpec, stim: &Stimulus, transform: Transform) -> ScanResult<String> {
    grid(grid_spec, stim, transform)?.render()
}

/// Reads `count` points (all of them if `None`) from a coordinate file and renders a
/// [`target`] protocol.
pub fn build_target<P: AsRef<Path>>(
    path: P,
    count: Option<usize>,
    stim: &Stimulus,
    transform: Transform,
) -> ScanResult<String> {
    let points = read_coords(path, count)?;
    target(&points, stim, transform)?.render()
}

/// Renders a [`target`] protocol for points already in memory.
pub fn build_target_points(
    points: &[PixelCoord],
    stim: &Stimulus,
    transform: Transform,
) -> ScanResult<String> {
    target(points, stim, transform)?.render()
}

pub fn build_rapid_grid(
    grid_spec: &GridSpec,
    stim: &Stimulus,
    transform: Transform,
) -> ScanResult<String> {
    rapid_grid(grid_spec, stim, transform)?.render()
}

pub fn build_rapid_target<P: AsRef<Path>>(
    path: P,
    count: Option<usize>,
    stim: &Stimulus,
    transform: Transform,
) -> ScanResult<String> {
    let points = read_coords(path, count)?;
    rapid_target(&points, stim, transform)?.render()
}

pub fn build_pattern<P: AsRef<Path>>(
    path: P,
    start: PixelCoord,
    spacing: PixelCoord,
    stim: &Stimulus,
    transform: Transform,
) -> ScanResult<String> {
    let pattern_file = read_pattern(path)?;
    pattern(&pattern_file, start, spacing, stim, transform)?.render()
}
