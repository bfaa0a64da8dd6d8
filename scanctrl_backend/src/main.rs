use scancmdr_backend::config::ScanConfig;
use scancmdr_backend::BaseStimulator;
use scanctrl_backend::*;

// Usage: scanctrl_backend_bin <rig.toml> <target set> [count]
fn main() -> LinkResult<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(target_set)) = (args.next(), args.next()) else {
        eprintln!("usage: scanctrl_backend_bin <rig.toml> <target set> [count]");
        std::process::exit(2);
    };
    let count = match args.next() {
        Some(count) => Some(count.parse::<usize>().map_err(|err| {
            scancmdr_backend::ScanError::InvalidParameter(format!("count '{}': {}", count, err))
        })?),
        None => None,
    };

    let config = ScanConfig::load(&config_path)?;
    let settings = LinkSettings::load(&config_path)?;
    let stim = scancmdr_backend::Stimulus {
        baseline: 400,
        time_on: 200,
        num_pulses: 5,
        isi: 400,
        episode_period: 2000,
        trigger: config.trigger,
        ..Default::default()
    };

    let mut rig = Stimulator::new(config.transform()?);
    let targets = config.resolve(config.targets.get(&target_set).ok_or_else(|| {
        scancmdr_backend::ScanError::InvalidParameter(format!("no target set '{}'", target_set))
    })?);
    let protocol = BaseStimulator::build_target(&rig, &targets, count, &stim)?;

    rig.connect(&settings)?;
    BaseLink::transmit(&rig, &protocol)?;
    Ok(())
}
