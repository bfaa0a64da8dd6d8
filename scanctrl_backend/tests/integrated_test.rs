use scancmdr_backend::pattern::rapid_grid;
use scancmdr_backend::*;
use scanctrl_backend::{BaseLink, DspLink, LinkError, ProtocolSink, Stimulator};

#[test]
fn rapid_grid_reaches_the_wire_unchanged() {
    let transform = Transform::new(2, PixelCoord::new(716, 206), 0.3);
    let grid_spec = GridSpec::new(5, 4, PixelCoord::new(600, 300), PixelCoord::new(12, 12));
    let stim = Stimulus {
        baseline: 100,
        time_on: 5,
        isi: 20,
        trigger: Trigger::In,
        ..Stimulus::default()
    };
    let protocol = rapid_grid(&grid_spec, &stim, transform).unwrap();
    let text = protocol.render().unwrap();

    let mut link = DspLink::new(Vec::new());
    link.transmit(&text).unwrap();
    let sent = String::from_utf8(link.into_inner()).unwrap();

    let lines: Vec<&str> = sent.lines().collect();
    assert_eq!(lines.first(), Some(&"C"));
    assert_eq!(lines.last(), Some(&"X"));
    // Clear, one line per command, execute
    assert_eq!(lines.len(), protocol.len() + 2);
    for (line, cmd) in lines[1..lines.len() - 1].iter().zip(protocol.commands()) {
        assert_eq!(*line, cmd.to_string());
    }
}

#[test]
fn unconnected_stimulator_refuses_upload() {
    let stim = Stimulator::new(Transform::new(2, PixelCoord::new(0, 0), 0.0));
    assert!(matches!(
        BaseLink::transmit(&stim, "C\n"),
        Err(LinkError::NotConnected)
    ));
}
