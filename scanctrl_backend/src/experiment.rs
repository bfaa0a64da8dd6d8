//! # DSP Upload and Control with the `experiment` Module
//!
//! Building on the [`scancmdr_backend::Stimulator`] struct, this module introduces an extended
//! `Stimulator` which also owns the serial link to the Scan-Control DSP, so that protocols can be
//! compiled, uploaded and started from a single object.
//!
//! ## Key Features:
//!
//! - **Protocol compilation:** every [`scancmdr_backend::BaseStimulator`] method is available
//!   unchanged (calibration, `build_spot`, `build_grid`, ...).
//!
//! - **Upload and execution:** [`BaseLink::upload`], [`BaseLink::execute`] and
//!   [`BaseLink::transmit`] send a rendered protocol and the execute command over the open link.
//!
//! - **Thread safety:** the link sits behind a [`parking_lot::Mutex`], so uploads only need a
//!   shared reference. The python wrapper releases the GIL while bytes are written.
//!
//! ## How to Use:
//!
//! 1. **Initialization:** create a `Stimulator` from a transform, or from a rig configuration
//!    file with [`Stimulator::from_config`].
//! 2. **Connection:** open the serial port with [`Stimulator::connect`].
//! 3. **Stimulation:** build a protocol and pass it to [`BaseLink::transmit`].

use std::io::Write;
use std::path::Path;

use log::info;
use parking_lot::Mutex;
use serialport::SerialPort;

use scancmdr_backend::config::ScanConfig;
use scancmdr_backend::coord::Transform;
use scancmdr_backend::impl_stim_boilerplate;

use crate::dsp::*;
use crate::error::{LinkError, LinkResult};

/// Operations on the DSP link of a rig, through default trait implementations.
pub trait BaseLink {
    type Port: Write;

    // FIELD methods
    fn link(&self) -> &Option<Mutex<DspLink<Self::Port>>>;
    fn link_(&mut self) -> &mut Option<Mutex<DspLink<Self::Port>>>;

    /// Replaces the current link, closing the previous one.
    fn attach(&mut self, link: DspLink<Self::Port>) {
        *self.link_() = Some(Mutex::new(link));
    }

    /// Closes the link. Returns whether one was open.
    fn disconnect(&mut self) -> bool {
        let was_open = self.link_().take().is_some();
        if was_open {
            info!("DSP link closed");
        }
        was_open
    }

    fn is_connected(&self) -> bool {
        self.link().is_some()
    }

    fn upload(&self, protocol: &str) -> LinkResult<()> {
        let link = self.link().as_ref().ok_or(LinkError::NotConnected)?;
        link.lock().upload(protocol)
    }

    fn execute(&self) -> LinkResult<()> {
        let link = self.link().as_ref().ok_or(LinkError::NotConnected)?;
        link.lock().execute()
    }

    /// Uploads and executes under a single lock, so no other upload can slip in between.
    fn transmit(&self, protocol: &str) -> LinkResult<()> {
        let link = self.link().as_ref().ok_or(LinkError::NotConnected)?;
        link.lock().transmit(protocol)
    }
}

/// An extended version of the [`scancmdr_backend::Stimulator`] struct which also drives the DSP.
#[cfg_attr(feature = "python", pyo3::pyclass)]
pub struct Stimulator {
    transform: Transform,
    link: Option<Mutex<DspLink<Box<dyn SerialPort>>>>,
}

impl_stim_boilerplate!(Stimulator);

impl BaseLink for Stimulator {
    type Port = Box<dyn SerialPort>;

    fn link(&self) -> &Option<Mutex<DspLink<Self::Port>>> {
        &self.link
    }
    fn link_(&mut self) -> &mut Option<Mutex<DspLink<Self::Port>>> {
        &mut self.link
    }
}

impl Stimulator {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            link: None,
        }
    }

    /// Creates an unconnected stimulator from the `[transform]` table of a rig configuration.
    pub fn from_config<P: AsRef<Path>>(path: P) -> LinkResult<Self> {
        let config = ScanConfig::load(path)?;
        Ok(Self::new(config.transform()?))
    }

    /// Opens the serial port and attaches it as the DSP link.
    pub fn connect(&mut self, settings: &LinkSettings) -> LinkResult<()> {
        let link = open_serial(settings)?;
        self.attach(link);
        info!("Connected to DSP on {}", settings.port);
        Ok(())
    }
}

#[cfg(feature = "python")]
#[pyo3::pymethods]
impl Stimulator {
    #[new]
    #[pyo3(signature = (scale_factor=1, center_offset=(0, 0), rotation=0.0))]
    pub fn py_new(scale_factor: i64, center_offset: (i32, i32), rotation: f64) -> pyo3::PyResult<Self> {
        let transform = Transform::new(scale_factor, center_offset.into(), rotation);
        transform.validate().map_err(LinkError::from)?;
        Ok(Self::new(transform))
    }

    #[pyo3(name = "connect", signature = (port, baud_rate=DEFAULT_BAUD_RATE, timeout_ms=DEFAULT_TIMEOUT_MS))]
    pub fn py_connect(&mut self, port: &str, baud_rate: u32, timeout_ms: u64) -> pyo3::PyResult<()> {
        let settings = LinkSettings {
            port: port.to_string(),
            baud_rate,
            timeout_ms,
        };
        Ok(self.connect(&settings)?)
    }

    #[pyo3(name = "disconnect")]
    pub fn py_disconnect(&mut self) -> bool {
        BaseLink::disconnect(self)
    }

    #[pyo3(name = "is_connected")]
    pub fn py_is_connected(&self) -> bool {
        BaseLink::is_connected(self)
    }

    #[pyo3(name = "upload")]
    pub fn py_upload(&self, protocol: &str, py: pyo3::Python<'_>) -> pyo3::PyResult<()> {
        Ok(py.allow_threads(|| BaseLink::upload(self, protocol))?)
    }

    #[pyo3(name = "execute")]
    pub fn py_execute(&self) -> pyo3::PyResult<()> {
        Ok(BaseLink::execute(self)?)
    }

    #[pyo3(name = "transmit")]
    pub fn py_transmit(&self, protocol: &str, py: pyo3::Python<'_>) -> pyo3::PyResult<()> {
        Ok(py.allow_threads(|| BaseLink::transmit(self, protocol))?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use scancmdr_backend::coord::PixelCoord;
    use scancmdr_backend::{BaseStimulator, Stimulus};

    #[cfg_attr(feature = "python", pyo3::pyclass)]
    struct MockRig {
        transform: Transform,
        link: Option<Mutex<DspLink<Vec<u8>>>>,
    }

    impl_stim_boilerplate!(MockRig);

    impl BaseLink for MockRig {
        type Port = Vec<u8>;

        fn link(&self) -> &Option<Mutex<DspLink<Vec<u8>>>> {
            &self.link
        }
        fn link_(&mut self) -> &mut Option<Mutex<DspLink<Vec<u8>>>> {
            &mut self.link
        }
    }

    fn rig() -> MockRig {
        MockRig {
            transform: Transform::new(2, PixelCoord::new(716, 206), 0.0),
            link: None,
        }
    }

    fn written(rig: &MockRig) -> Vec<u8> {
        rig.link
            .as_ref()
            .map(|link| link.lock().get_ref().clone())
            .unwrap_or_default()
    }

    #[test]
    fn requires_connection() {
        let rig = rig();
        assert!(!rig.is_connected());
        assert!(matches!(rig.upload("C\n"), Err(LinkError::NotConnected)));
        assert!(matches!(rig.execute(), Err(LinkError::NotConnected)));
    }

    #[test]
    fn builds_and_transmits_spot() {
        let mut rig = rig();
        rig.attach(DspLink::new(Vec::new()));
        assert!(rig.is_connected());

        let stim = Stimulus {
            baseline: 400,
            time_on: 200,
            isi: 400,
            episode_period: 2000,
            ..Stimulus::default()
        };
        let protocol = BaseStimulator::build_spot(&rig, PixelCoord::new(450, 400), &stim).unwrap();
        rig.transmit(&protocol).unwrap();

        let expected = format!("{}X\n", protocol);
        assert_eq!(written(&rig), expected.into_bytes());
        assert!(protocol.contains("AV,0,4,532\n"));
    }

    #[test]
    fn separate_upload_and_execute() {
        let mut rig = rig();
        rig.attach(DspLink::new(Vec::new()));
        rig.upload("C\nAV,10,4,5000\n").unwrap();
        assert_eq!(written(&rig), b"C\nAV,10,4,5000\n".to_vec());
        rig.execute().unwrap();
        assert!(written(&rig).ends_with(b"X\n"));

        assert!(rig.disconnect());
        assert!(!rig.disconnect());
        assert!(!rig.is_connected());
    }

    #[test]
    fn stimulator_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        std::fs::write(
            &path,
            "[transform]\nscale_factor = 3\ncenter_offset = [10, 20]\n\n[serial]\nport = \"/dev/ttyUSB0\"\n",
        )
        .unwrap();
        let stim = Stimulator::from_config(&path).unwrap();
        assert_eq!(stim.transform().scale_factor, 3);
        assert!(!BaseLink::is_connected(&stim));
        assert_eq!(
            LinkSettings::load(&path).unwrap(),
            LinkSettings::new("/dev/ttyUSB0")
        );
    }
}
