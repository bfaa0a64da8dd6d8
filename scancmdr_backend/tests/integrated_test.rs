use std::io::Write;
use std::path::Path;

use regex::Regex;
use scancmdr_backend::config::ScanConfig;
use scancmdr_backend::pattern;
use scancmdr_backend::*;

fn write_file(dir: &Path, name: &str, content: &str) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn stimulus() -> Stimulus {
    Stimulus {
        baseline: 400,
        time_on: 200,
        num_pulses: 5,
        isi: 400,
        iterations: 2,
        episode_period: 2000,
        reps: 3,
        trigger: Trigger::Out,
    }
}

// Every line after the clear must be a well-formed add command
fn assert_wire_format(text: &str) {
    let line_re = Regex::new(r"^A[VRIOSE0UD],\d+,\d,-?\d+$").unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("C"));
    for line in lines {
        assert!(line_re.is_match(line), "malformed line '{}'", line);
    }
    assert!(text.ends_with('\n'));
    assert!(!text.contains('X'));
}

#[test]
fn config_to_protocols() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "calib.txt", "0\t0\t0\t0\n100\t0\t50\t0\n0\t100\t0\t50\n");
    write_file(dir.path(), "cells.coord", "700\t200\n\n650\t250\n720\t180\n");
    write_file(dir.path(), "pattern.txt", "2\t3\t3\n1\t1\n3\t3\n");
    write_file(
        dir.path(),
        "rig.toml",
        r#"
trigger = "out"

[transform]
calibration_file = "calib.txt"
center_offset = [716, 206]

[targets]
cells = "cells.coord"
"#,
    );

    let config = ScanConfig::load(dir.path().join("rig.toml")).unwrap();
    let stim = Stimulator::new(config.transform().unwrap());
    assert_eq!(BaseStimulator::scale_factor(&stim), 2);

    let timing = Stimulus {
        trigger: config.trigger,
        ..stimulus()
    };
    let cells = config.resolve(Path::new("cells.coord"));
    let start = PixelCoord::new(600, 300);
    let spacing = PixelCoord::new(10, 10);
    let grid_spec = GridSpec::new(3, 2, start, spacing);

    let texts = [
        BaseStimulator::build_spot(&stim, start, &timing).unwrap(),
        BaseStimulator::build_grid(&stim, &grid_spec, &timing).unwrap(),
        BaseStimulator::build_target(&stim, &cells, None, &timing).unwrap(),
        BaseStimulator::build_rapid_grid(&stim, &grid_spec, &timing).unwrap(),
        BaseStimulator::build_rapid_target(&stim, &cells, Some(2), &timing).unwrap(),
        BaseStimulator::build_pattern(&stim, dir.path().join("pattern.txt"), start, spacing, &timing)
            .unwrap(),
    ];
    for text in &texts {
        assert_wire_format(text);
        // Master loop wraps everything
        let mut lines = text.lines().skip(1);
        assert_eq!(lines.next(), Some("AS,0,9,3"));
        assert!(text.lines().last().unwrap().starts_with("AE,"));
        assert!(text.lines().last().unwrap().ends_with(",9,3"));
    }
}

#[test]
fn target_file_matches_point_list() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "cells.coord", "700\t200\n650\t250\n720\t180\n");
    let transform = Transform::new(3, PixelCoord::new(716, 206), 0.2);

    let from_file =
        pattern::build_target(dir.path().join("cells.coord"), None, &stimulus(), transform).unwrap();
    let points = [
        PixelCoord::new(700, 200),
        PixelCoord::new(650, 250),
        PixelCoord::new(720, 180),
    ];
    let from_points = pattern::target(&points, &stimulus(), transform).unwrap();
    assert_eq!(from_file, from_points.render().unwrap());
    assert_eq!(from_file.len(), from_points.rendered_len());
}

#[test]
fn pattern_file_matches_target_positions() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "pattern.txt", "3\t4\t4\n1\t1\n2\t3\n4\t4\n");
    let transform = Transform::new(2, PixelCoord::new(716, 206), 0.0);
    let start = PixelCoord::new(600, 300);
    let spacing = PixelCoord::new(20, 15);

    let text =
        pattern::build_pattern(dir.path().join("pattern.txt"), start, spacing, &stimulus(), transform)
            .unwrap();
    let positions = [
        PixelCoord::new(600, 300),
        PixelCoord::new(620, 270),
        PixelCoord::new(660, 255),
    ];
    assert_eq!(
        text,
        pattern::build_target_points(&positions, &stimulus(), transform).unwrap()
    );
}

#[test]
fn missing_files_and_short_files() {
    let dir = tempfile::tempdir().unwrap();
    let transform = Transform::new(2, PixelCoord::new(716, 206), 0.0);
    assert!(matches!(
        pattern::build_target(dir.path().join("absent"), None, &stimulus(), transform),
        Err(ScanError::Resource { .. })
    ));

    write_file(dir.path(), "two.coord", "1\t1\n2\t2\n");
    assert!(matches!(
        pattern::build_rapid_target(dir.path().join("two.coord"), Some(3), &stimulus(), transform),
        Err(ScanError::PointCount { expected: 3, found: 2, .. })
    ));

    let mut stim = Stimulator::new(transform);
    write_file(dir.path(), "flat.txt", "0\t0\t5\t0\n10\t10\t5\t5\n");
    assert!(matches!(
        BaseStimulator::calibrate(&mut stim, dir.path().join("flat.txt"), None),
        Err(ScanError::DegenerateCalibration(_))
    ));
}

#[test]
fn repetitions_scale_master_loop() {
    let transform = Transform::new(2, PixelCoord::new(716, 206), 0.0);
    let one = Stimulus {
        reps: 1,
        ..stimulus()
    };
    let four = Stimulus {
        reps: 4,
        ..stimulus()
    };
    let point = PixelCoord::new(716, 206);
    let end_of = |stim: &Stimulus| {
        let prot = pattern::spot(point, stim, transform).unwrap();
        prot.commands().last().unwrap().cycle()
    };
    assert_eq!(end_of(&four), 4 * end_of(&one));
}
