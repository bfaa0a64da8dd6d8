//! Cycle arithmetic shared by the pattern generators.
//!
//! The DSP executes one frame every 10 µs (a *cycle*); all experiment parameters arrive in
//! milliseconds and are converted here after two coercions:
//!
//! 1. the inter-stimulus interval is never shorter than the pulse itself,
//! 2. the episode period is long enough to hold its baseline plus its pulse train.

use log::warn;

use crate::error::{ScanError, ScanResult};

/// Cycle length in microseconds.
pub const CYCLE_LEN_US: u64 = 10;
pub const CYCLES_PER_MS: u64 = 100;
/// Width of an outgoing trigger pulse, in cycles.
pub const TRIG_LEN: u64 = 10;
/// First usable cycle for trigger-bearing events. Triggers scheduled at cycle 0 misfire on the DSP.
pub const TIME_OFFSET: u64 = 10;
/// Settling time appended after each repetition of a protocol, in cycles.
pub const PROT_PERIOD: u64 = 50;
/// The cycle counter is 48 bits wide.
pub const MAX_CYCLE: u64 = (1 << 48) - 1;
/// Maximum number of lines (including the leading clear) held by the DSP.
pub const MAX_PROTOCOL_LINES: usize = 10000;

/// Selects how an episode is started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Start without synchronisation.
    #[default]
    None,
    /// Wait for a rising edge on the trigger input.
    In,
    /// Emit a trigger pulse on the T-OUT line.
    Out,
}

impl std::str::FromStr for Trigger {
    type Err = ScanError;

    fn from_str(s: &str) -> ScanResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Trigger::None),
            "in" => Ok(Trigger::In),
            "out" => Ok(Trigger::Out),
            _ => Err(ScanError::InvalidParameter(format!(
                "unknown trigger mode '{}', expected one of none/in/out",
                s
            ))),
        }
    }
}

/// Stimulation parameters in milliseconds and counts, as entered by the experimenter.
///
/// Not every generator reads every field: the spot generator ignores `iterations`, and the rapid
/// generators ignore `num_pulses` and `iterations` (one pulse per point).
#[cfg_attr(feature = "python", pyo3::pyclass)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stimulus {
    /// Delay from episode start to the first pulse.
    pub baseline: u32,
    /// Pulse width.
    pub time_on: u32,
    pub num_pulses: u16,
    /// Inter-stimulus interval, pulse start to pulse start.
    pub isi: u32,
    /// Episodes delivered at each spot before moving on.
    pub iterations: u32,
    pub episode_period: u32,
    /// Repetitions of the whole protocol.
    pub reps: u16,
    pub trigger: Trigger,
}

impl Default for Stimulus {
    fn default() -> Self {
        Self {
            baseline: 0,
            time_on: 1,
            num_pulses: 1,
            isi: 0,
            iterations: 1,
            episode_period: 0,
            reps: 1,
            trigger: Trigger::None,
        }
    }
}

impl Stimulus {
    /// Rejects parameters the DSP cannot play back.
    ///
    /// Counts must be at least 1, and so must the pulse width, which after coercion bounds the
    /// ISI and the episode period from below so that no loop has zero duration. An outgoing
    /// trigger needs a baseline of at least [`TRIG_LEN`], since its falling edge also lowers the
    /// laser line.
    pub fn validate(&self) -> ScanResult<()> {
        let counts = [
            ("num_pulses", u64::from(self.num_pulses)),
            ("iterations", u64::from(self.iterations)),
            ("reps", u64::from(self.reps)),
        ];
        for (name, count) in counts {
            if count == 0 {
                return Err(ScanError::InvalidParameter(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }
        if self.time_on == 0 {
            return Err(ScanError::InvalidParameter(
                "time_on must be at least 1 ms".to_string(),
            ));
        }
        if self.trigger == Trigger::Out && ms_to_cycles(u64::from(self.baseline)) < TRIG_LEN {
            return Err(ScanError::InvalidParameter(format!(
                "an outgoing trigger needs a baseline of at least {} cycles, got {} ms",
                TRIG_LEN, self.baseline
            )));
        }
        Ok(())
    }

    /// Applies the ISI and episode-period coercions for a train of `pulse_count` pulses and
    /// converts the result to cycles.
    pub fn coerce(&self, pulse_count: u64) -> Timing {
        let time_on = u64::from(self.time_on);
        let baseline = u64::from(self.baseline);
        let mut isi = u64::from(self.isi);
        let mut episode_period = u64::from(self.episode_period);

        if isi < time_on {
            warn!("ISI of {} ms is shorter than the pulse width, using {} ms", isi, time_on);
            isi = time_on;
        }
        let train = baseline.saturating_add(pulse_count.saturating_mul(isi));
        if episode_period < train {
            warn!(
                "Episode period of {} ms cannot hold baseline and pulse train, using {} ms",
                episode_period, train
            );
            episode_period = train;
        }

        Timing {
            baseline: ms_to_cycles(baseline),
            time_on: ms_to_cycles(time_on),
            isi: ms_to_cycles(isi),
            episode_period: ms_to_cycles(episode_period),
        }
    }
}

#[cfg(feature = "python")]
#[pyo3::pymethods]
impl Stimulus {
    #[new]
    #[pyo3(signature = (baseline=0, time_on=1, num_pulses=1, isi=0, iterations=1, episode_period=0, reps=1, trigger="none"))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        baseline: u32,
        time_on: u32,
        num_pulses: u16,
        isi: u32,
        iterations: u32,
        episode_period: u32,
        reps: u16,
        trigger: &str,
    ) -> pyo3::PyResult<Self> {
        let stim = Stimulus {
            baseline,
            time_on,
            num_pulses,
            isi,
            iterations,
            episode_period,
            reps,
            trigger: trigger.parse()?,
        };
        stim.validate()?;
        Ok(stim)
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self)
    }
}

/// Coerced timing, in cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub baseline: u64,
    pub time_on: u64,
    pub isi: u64,
    pub episode_period: u64,
}

pub fn ms_to_cycles(ms: u64) -> u64 {
    ms.saturating_mul(CYCLES_PER_MS)
}

/// Cycle reached `n` iterations of `dt` after `start`.
///
/// Saturates instead of wrapping: a saturated cycle is rejected by [`crate::instruction::Command::new`].
pub fn after(start: u64, n: u64, dt: u64) -> u64 {
    start.saturating_add(n.saturating_mul(dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isi_never_shorter_than_pulse() {
        for (isi, time_on) in [(0, 5), (5, 5), (3, 40), (100, 20)] {
            let stim = Stimulus {
                isi,
                time_on,
                ..Stimulus::default()
            };
            let timing = stim.coerce(1);
            assert!(timing.isi >= timing.time_on);
        }
    }

    #[test]
    fn episode_period_holds_train() {
        for (baseline, count, isi, episode_period) in [(400, 5, 400, 2000), (10, 3, 7, 0), (0, 1, 1, 1)] {
            let stim = Stimulus {
                baseline,
                isi,
                episode_period,
                time_on: 1,
                ..Stimulus::default()
            };
            let timing = stim.coerce(count);
            assert!(timing.episode_period >= timing.baseline + count * timing.isi);
        }
    }

    #[test]
    fn converts_to_cycles() {
        let stim = Stimulus {
            baseline: 400,
            time_on: 200,
            isi: 400,
            episode_period: 2000,
            num_pulses: 5,
            ..Stimulus::default()
        };
        let timing = stim.coerce(5);
        // 400 + 5 * 400 = 2400 ms > 2000 ms
        assert_eq!(timing.episode_period, 240_000);
        assert_eq!(timing.baseline, 40_000);
        assert_eq!(timing.time_on, 20_000);
    }

    #[test]
    fn zero_counts_rejected() {
        let stim = Stimulus {
            reps: 0,
            ..Stimulus::default()
        };
        assert!(matches!(stim.validate(), Err(ScanError::InvalidParameter(_))));
    }

    #[test]
    fn zero_pulse_width_rejected() {
        let stim = Stimulus {
            time_on: 0,
            ..Stimulus::default()
        };
        assert!(matches!(stim.validate(), Err(ScanError::InvalidParameter(_))));
        assert!(Stimulus::default().validate().is_ok());
    }

    #[test]
    fn trigger_out_needs_baseline() {
        let stim = Stimulus {
            trigger: Trigger::Out,
            ..Stimulus::default()
        };
        assert!(matches!(stim.validate(), Err(ScanError::InvalidParameter(_))));
        let delayed = Stimulus { baseline: 1, ..stim };
        assert!(delayed.validate().is_ok());
        let waiting = Stimulus {
            trigger: Trigger::In,
            ..stim
        };
        assert!(waiting.validate().is_ok());
    }

    #[test]
    fn trigger_parses() {
        assert_eq!("OUT".parse::<Trigger>().unwrap(), Trigger::Out);
        assert_eq!("none".parse::<Trigger>().unwrap(), Trigger::None);
        assert!("sometimes".parse::<Trigger>().is_err());
    }
}
