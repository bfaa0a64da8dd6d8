//! Rig configuration loaded from TOML.
//!
//! ```toml
//! trigger = "out"
//!
//! [transform]
//! scale_factor = 2              # or: calibration_file = "calib.txt"
//! center_offset = [716, 206]
//! rotation = 0.0                # radians
//!
//! [targets]
//! cells = "targets.coord"
//! ```
//!
//! Relative paths are resolved against the directory of the configuration file. Tables this crate
//! does not know about (such as `[serial]`) are ignored.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::info;
use serde::Deserialize;

use crate::coord::{calc_scaling, PixelCoord, ScaleFactor, Transform};
use crate::error::{ScanError, ScanResult};
use crate::reader::{read_calibration, read_coords};
use crate::timing::Trigger;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TransformConfig {
    pub scale_factor: Option<ScaleFactor>,
    pub calibration_file: Option<PathBuf>,
    /// Number of calibration records to use; all of them if absent.
    pub calibration_points: Option<usize>,
    pub center_offset: [i32; 2],
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub trigger: Trigger,
    pub transform: TransformConfig,
    #[serde(default)]
    pub targets: IndexMap<String, PathBuf>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl ScanConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScanError::Resource {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            config.base_dir = dir.to_path_buf();
        }
        info!(
            "Loaded configuration from {} ({} target set(s))",
            path.display(),
            config.targets.len()
        );
        Ok(config)
    }

    /// Parses a configuration; relative paths resolve against the working directory.
    pub fn from_toml_str(text: &str) -> ScanResult<Self> {
        let config: ScanConfig = toml::from_str(text)?;
        let tf = &config.transform;
        if tf.scale_factor.is_some() == tf.calibration_file.is_some() {
            return Err(ScanError::InvalidParameter(
                "[transform] needs exactly one of scale_factor or calibration_file".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Builds the transform, computing the scale factor from the calibration file if needed.
    pub fn transform(&self) -> ScanResult<Transform> {
        let tf = &self.transform;
        let scale_factor = match (tf.scale_factor, &tf.calibration_file) {
            (Some(scale_factor), _) => scale_factor,
            (None, Some(file)) => {
                let points = read_calibration(self.resolve(file), tf.calibration_points)?;
                let scale_factor = calc_scaling(&points)?;
                info!(
                    "Scale factor {} from {} calibration points",
                    scale_factor,
                    points.len()
                );
                scale_factor
            }
            (None, None) => {
                return Err(ScanError::InvalidParameter(
                    "[transform] has neither scale_factor nor calibration_file".to_string(),
                ))
            }
        };
        let transform = Transform::new(
            scale_factor,
            PixelCoord::new(tf.center_offset[0], tf.center_offset[1]),
            tf.rotation,
        );
        transform.validate()?;
        Ok(transform)
    }

    /// Reads the coordinate file registered under `name` in `[targets]`.
    pub fn targets(&self, name: &str, count: Option<usize>) -> ScanResult<Vec<PixelCoord>> {
        let path = self.targets.get(name).ok_or_else(|| {
            ScanError::InvalidParameter(format!(
                "no target set named '{}', configured sets are {:?}",
                name,
                self.targets.keys().collect::<Vec<_>>()
            ))
        })?;
        read_coords(self.resolve(path), count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
trigger = "in"

[transform]
scale_factor = 2
center_offset = [716, 206]

[targets]
second = "b.coord"
first = "a.coord"

[serial]
port = "/dev/ttyUSB0"
"#;

    #[test]
    fn parses_and_keeps_target_order() {
        let config = ScanConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.trigger, Trigger::In);
        let names: Vec<_> = config.targets.keys().cloned().collect();
        assert_eq!(names, vec!["second", "first"]);

        let transform = config.transform().unwrap();
        assert_eq!(transform.scale_factor, 2);
        assert_eq!(transform.center_offset, PixelCoord::new(716, 206));
        assert_eq!(transform.rotation, 0.0);
    }

    #[test]
    fn needs_exactly_one_scale_source() {
        let neither = "[transform]\ncenter_offset = [0, 0]\n";
        assert!(matches!(
            ScanConfig::from_toml_str(neither),
            Err(ScanError::InvalidParameter(_))
        ));
        let both = "[transform]\nscale_factor = 2\ncalibration_file = \"c.txt\"\ncenter_offset = [0, 0]\n";
        assert!(ScanConfig::from_toml_str(both).is_err());
        assert!(matches!(
            ScanConfig::from_toml_str("trigger = 3"),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn calibration_file_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut calib = std::fs::File::create(dir.path().join("calib.txt")).unwrap();
        writeln!(calib, "0\t0\t0\t0").unwrap();
        writeln!(calib, "100\t0\t50\t0").unwrap();
        writeln!(calib, "0\t100\t0\t50").unwrap();
        let mut targets = std::fs::File::create(dir.path().join("cells.coord")).unwrap();
        writeln!(targets, "700\t200\n710\t210").unwrap();

        let config_path = dir.path().join("rig.toml");
        std::fs::write(
            &config_path,
            "[transform]\ncalibration_file = \"calib.txt\"\ncenter_offset = [716, 206]\nrotation = 0.1\n\n[targets]\ncells = \"cells.coord\"\n",
        )
        .unwrap();

        let config = ScanConfig::load(&config_path).unwrap();
        let transform = config.transform().unwrap();
        assert_eq!(transform.scale_factor, 2);
        assert_eq!(transform.rotation, 0.1);
        assert_eq!(config.targets("cells", None).unwrap().len(), 2);
        assert!(config.targets("missing", None).is_err());
    }
}
