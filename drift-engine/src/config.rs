//! Engine configuration, loaded from TOML.
//!
//! Every field has a default matching the shipped pieces, so an empty file
//! (or no file at all) is a valid configuration.
//!
//! ```toml
//! seed = 7
//!
//! [drone]
//! rate_min = 0.1
//! rate_max = 0.3
//! variant_index = "fixed"
//!
//! [bells]
//! pitch_classes = ["F", "G", "A#"]
//! accents = [{ divisor = 4, bonus = 0.1 }]
//! ```

use std::fs;
use std::path::Path;

use drift_core::chord::TriggerRules;
use drift_core::drone::DroneParams;
use drift_core::pitch::Pitch;
use serde::Deserialize;

use crate::error::{DriftError, Result};

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Seed for every random decision; entropy when absent.
    pub seed: Option<u64>,
    pub render: RenderConfig,
    pub drone: DroneConfig,
    pub bells: BellsConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Reverb tail appended after each offline render, seconds.
    pub tail_seconds: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    #[serde(flatten)]
    pub timing: DroneParams,
    pub dryer_wetness: f32,
    pub wetter_wetness: f32,
    pub decay_seconds: f32,
    /// Crossfade LFO rate range `[min, max)`, Hz.
    pub crossfade_rate_min: f32,
    pub crossfade_rate_max: f32,
    pub crossfade_phase_deg: f32,
    pub bus_lowpass_hz: f32,
    pub bus_gain_db: f32,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            timing: DroneParams::default(),
            dryer_wetness: 0.5,
            wetter_wetness: 0.9,
            decay_seconds: 30.0,
            crossfade_rate_min: 0.005,
            crossfade_rate_max: 0.01,
            crossfade_phase_deg: 90.0,
            bus_lowpass_hz: 500.0,
            bus_gain_db: -7.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BellsConfig {
    pub pitch_classes: Vec<String>,
    pub lower_octave: i8,
    pub higher_octave: i8,
    pub lower_period: f64,
    pub higher_period: f64,
    #[serde(flatten)]
    pub rules: TriggerRules,
    /// Length of each prerendered note, seconds.
    pub render_seconds: f64,
    /// Render every n-th note of the sorted chord-tone union.
    pub render_every: usize,
    pub wetness: f32,
    pub decay_seconds: f32,
}

impl Default for BellsConfig {
    fn default() -> Self {
        Self {
            pitch_classes: ["F", "F", "G", "G#", "A", "A#", "B"].iter().map(|s| s.to_string()).collect(),
            lower_octave: 4,
            higher_octave: 5,
            lower_period: 22.0,
            higher_period: 20.0,
            rules: TriggerRules::default(),
            render_seconds: 3.0,
            render_every: 3,
            wetness: 0.9,
            decay_seconds: 4.0,
        }
    }
}

impl BellsConfig {
    /// Configured pitch classes resolved at `octave`.
    pub fn tonics(&self, octave: i8) -> Result<Vec<Pitch>> {
        self.pitch_classes
            .iter()
            .map(|class| {
                Pitch::from_class(class, octave).map_err(|e| DriftError::InvalidConfig(format!("bells.pitch_classes: {e}")))
            })
            .collect()
    }
}

fn check(ok: bool, what: &str) -> Result<()> {
    if ok { Ok(()) } else { Err(DriftError::InvalidConfig(what.to_string())) }
}

fn is_unit(x: f32) -> bool {
    (0.0..=1.0).contains(&x)
}

impl DriftConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DriftError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        check(self.render.tail_seconds >= 0.0, "render.tail_seconds must be >= 0")?;

        let d = &self.drone;
        let t = &d.timing;
        check(t.rate_min > 0.0 && t.rate_min <= t.rate_max && t.rate_max <= 1.0, "drone rate range must satisfy 0 < min <= max <= 1")?;
        check(t.gap_min >= 0.0 && t.gap_min <= t.gap_max, "drone gap range must satisfy 0 <= min <= max")?;
        check(t.start_delay >= 0.0 && t.edge_trim >= 0.0 && t.fade >= 0.0, "drone delays and fades must be >= 0")?;
        check(t.min_reschedule > 0.0, "drone.min_reschedule must be > 0")?;
        check(is_unit(d.dryer_wetness) && is_unit(d.wetter_wetness), "drone wetness must lie in [0, 1]")?;
        check(d.decay_seconds > 0.0, "drone.decay_seconds must be > 0")?;
        check(
            d.crossfade_rate_min > 0.0 && d.crossfade_rate_min <= d.crossfade_rate_max,
            "drone crossfade rate range must satisfy 0 < min <= max",
        )?;
        check(d.bus_lowpass_hz > 0.0, "drone.bus_lowpass_hz must be > 0")?;

        let b = &self.bells;
        check(!b.pitch_classes.is_empty(), "bells.pitch_classes must not be empty")?;
        b.tonics(b.lower_octave)?;
        b.tonics(b.higher_octave)?;
        check(b.lower_period > 0.0 && b.higher_period > 0.0, "bells periods must be > 0")?;
        check(
            b.rules.base_probability > 0.0 && b.rules.base_probability <= 1.0,
            "bells.base_probability must lie in (0, 1]",
        )?;
        check(b.rules.accents.iter().all(|a| a.divisor > 0 && a.bonus >= 0.0), "bells accents need divisor > 0 and bonus >= 0")?;
        check(b.render_seconds > 0.0 && b.render_every > 0, "bells render length and stride must be > 0")?;
        check(is_unit(b.wetness) && b.decay_seconds > 0.0, "bells wetness must lie in [0, 1] and decay be > 0")?;
        Ok(())
    }
}
