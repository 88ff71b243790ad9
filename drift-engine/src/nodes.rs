//! Per-sample building blocks used by the mixer and the synthetic sample set.
//!
//! Contents:
//! - `Wave`, `Osc` : basic oscillators (Sine/Tri/Saw) with stable phase wrap
//! - `Lfo`         : low-frequency oscillator (same core as `Osc`) with a start phase
//! - `EqualPower`  : crossfade gains for two inputs
//!
//! Notes:
//! - Frequency is **Hz**; methods expect the current **sample rate** when stepping.
//! - Everything is `Copy`; nothing here allocates.

use drift_core::dsp::{fast_sin, TAU};

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Tri, Saw }

#[inline]
fn osc_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine => fast_sin(TAU * phase01),
        Wave::Tri  => 4.0 * (phase01 - 0.5).abs() - 1.0,
        Wave::Saw  => 2.0 * phase01 - 1.0,
    }
}

/// Free-running oscillator.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32,   // [0,1)
    freq:  f32,   // Hz
    wave:  Wave,
    gain:  f32,
}

impl Osc {
    #[inline] pub fn new(freq_hz: f32, wave: Wave) -> Self { Self { phase: 0.0, freq: freq_hz.max(0.0), wave, gain: 1.0 } }
    #[inline] pub fn set_freq(&mut self, hz: f32) { self.freq = hz.max(0.0); }
    #[inline] pub fn set_gain(&mut self, g: f32) { self.gain = g.max(0.0); }
    #[inline] pub fn freq(&self) -> f32 { self.freq }

    /// Current sample without advancing.
    #[inline]
    pub fn value(&self) -> f32 { osc_sample(self.phase, self.wave) * self.gain }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        self.phase = (self.phase + self.freq / sr) % 1.0;
        self.value()
    }

    /// Hard-set phase, wrapped into [0,1).
    #[inline] pub fn set_phase01(&mut self, p: f32) { self.phase = p.rem_euclid(1.0); }
}

/// Low-frequency oscillator.
#[derive(Copy, Clone, Debug)]
pub struct Lfo(Osc);

impl Lfo {
    #[inline] pub fn sine(rate_hz: f32) -> Self { Self(Osc::new(rate_hz, Wave::Sine)) }

    /// Next value in **[-1,1]**.
    #[inline] pub fn next_norm(&mut self, sr: f32) -> f32 { self.0.next(sr) }

    /// Next value remapped to **[0,1]**.
    #[inline] pub fn next01(&mut self, sr: f32) -> f32 { 0.5 * (self.0.next(sr) + 1.0) }

    /// Current value in [0,1] without advancing.
    #[inline] pub fn value01(&self) -> f32 { 0.5 * (self.0.value() + 1.0) }

    #[inline] pub fn set_rate(&mut self, hz: f32) { self.0.set_freq(hz); }
    #[inline] pub fn rate(&self) -> f32 { self.0.freq() }

    /// Start phase in degrees (90° starts a sine at its peak).
    #[inline] pub fn set_phase_deg(&mut self, deg: f32) { self.0.set_phase01(deg / 360.0); }
}

/// Equal-power crossfade law.
#[derive(Copy, Clone, Debug)]
pub struct EqualPower;

impl EqualPower {
    /// Gains `(a, b)` for a fade position in [0,1]: 0 is all `a`, 1 all `b`.
    #[inline]
    pub fn gains(fade: f32) -> (f32, f32) {
        let p = fade.clamp(0.0, 1.0) * 0.25 * TAU; // [0, π/2]
        (p.cos(), p.sin())
    }
}
