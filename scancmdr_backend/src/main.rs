use scancmdr_backend::coord::*;
use scancmdr_backend::pattern::*;
use scancmdr_backend::timing::*;

fn main() -> scancmdr_backend::ScanResult<()> {
    env_logger::init();

    let transform = Transform::new(2, PixelCoord::new(716, 206), 0.0);
    let stim = Stimulus {
        baseline: 400,
        time_on: 200,
        num_pulses: 5,
        isi: 400,
        episode_period: 2000,
        trigger: Trigger::Out,
        ..Stimulus::default()
    };

    println!("Spot:\n{}", build_spot(PixelCoord::new(450, 400), &stim, transform)?);

    let grid_spec = GridSpec::new(3, 2, PixelCoord::new(600, 300), PixelCoord::new(20, 20));
    println!("Grid:\n{}", build_grid(&grid_spec, &stim, transform)?);

    let rotated = Transform {
        rotation: std::f64::consts::FRAC_PI_6,
        ..transform
    };
    println!("Rotated rapid grid:\n{}", build_rapid_grid(&grid_spec, &stim, rotated)?);
    Ok(())
}
