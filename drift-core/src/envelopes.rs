//! Voice fades.
//!
//! Drone voices fade in and out over several seconds with a linear curve. The
//! fade is evaluated from the time since the voice started, so the mixer can
//! jump to any position (offline bounce, late command delivery) without
//! carrying envelope state.

/// Symmetric linear fade-in/fade-out over a known playback duration.
///
/// When the voice is shorter than two fades, both ramps shrink to half the
/// duration so the gain still reaches 0 at both ends.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Fade {
    fade_in: f64,
    fade_out: f64,
    duration: f64,
}

impl Fade {
    #[inline]
    pub fn symmetric(fade: f64, duration: f64) -> Self {
        let duration = duration.max(0.0);
        let fade = fade.max(0.0).min(duration * 0.5);
        Self { fade_in: fade, fade_out: fade, duration }
    }

    /// No ramps; used for percussive sampler voices.
    #[inline]
    pub fn none(duration: f64) -> Self {
        Self { fade_in: 0.0, fade_out: 0.0, duration: duration.max(0.0) }
    }

    #[inline] pub fn duration(&self) -> f64 { self.duration }

    /// Gain in [0,1] at `t` seconds after the voice started.
    #[inline]
    pub fn gain_at(&self, t: f64) -> f32 {
        if t < 0.0 || t >= self.duration {
            return 0.0;
        }
        let rise = if self.fade_in > 0.0 { (t / self.fade_in).min(1.0) } else { 1.0 };
        let left = self.duration - t;
        let fall = if self.fade_out > 0.0 { (left / self.fade_out).min(1.0) } else { 1.0 };
        (rise.min(fall)) as f32
    }
}
