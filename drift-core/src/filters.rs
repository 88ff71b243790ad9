//! One-pole low-pass, used for comb damping in the offline reverb and as the
//! drone bus tone control in the mixer.
//!
//! `y += a * (x - y)` with `a = 1 - exp(-2π fc / sr)`. Not bilinear matched;
//! gentle and cheap, which is all either caller needs.

use crate::dsp::{kill_denormals, one_pole_coeff_hz};

#[derive(Copy, Clone, Debug)]
pub struct OnePoleLP {
    a: f32,
    y: f32,
    sr: f32,
    fc: f32,
}

impl OnePoleLP {
    /// Create a low-pass with cutoff `cut_hz` and sample rate `sr`.
    #[inline]
    pub fn new(cut_hz: f32, sr: f32) -> Self {
        let mut s = Self { a: 0.0, y: 0.0, sr: sr.max(1.0), fc: cut_hz.max(0.0) };
        s.update_coeffs();
        s
    }

    #[inline]
    pub fn set_sample_rate(&mut self, sr: f32) {
        self.sr = sr.max(1.0);
        self.update_coeffs();
    }

    #[inline]
    pub fn set_cutoff_hz(&mut self, cut_hz: f32) {
        self.fc = cut_hz.max(0.0);
        self.update_coeffs();
    }

    #[inline]
    fn update_coeffs(&mut self) {
        self.a = 1.0 - one_pole_coeff_hz(self.fc, self.sr);
    }

    #[inline]
    pub fn reset(&mut self) { self.y = 0.0; }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.y += self.a * (x - self.y);
        self.y = kill_denormals(self.y);
        self.y
    }

    #[inline] pub fn value(&self) -> f32 { self.y }
}
