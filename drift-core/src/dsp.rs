//! Small math helpers shared by the renderer and the mixer.
//!
//! Features used by this file:
//! - `fast-math` : polynomial sine for the crossfade LFO (slow, so accuracy
//!   requirements are loose)
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

/// Convert dB to linear gain: lin = 10^(db/20).
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= -120.0 { 0.0 } else { (0.11512925464970229_f32 * db).exp() } // ln(10)/20
}

/// `exp(-2π fc / sr)`, the pole of an RC-style one-pole at `cut_hz`.
#[inline]
pub fn one_pole_coeff_hz(cut_hz: f32, sr: f32) -> f32 {
    let fc = cut_hz.max(0.0).min(0.499 * sr);
    (-2.0 * PI * fc / sr).exp()
}

/// Sine of `x` radians. With `fast-math` a 5th-order odd polynomial after
/// range reduction to [-π, π] (max abs error ~1e-3).
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = (xr / TAU).round();
            xr -= k * TAU;
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            x.sin()
        }
    }
}

/// Read `data` at a fractional frame position with linear interpolation.
/// Positions outside `[0, len-1]` read as silence.
#[inline]
pub fn read_linear(data: &[f32], pos: f64) -> f32 {
    if pos < 0.0 {
        return 0.0;
    }
    let i = pos.floor() as usize;
    let Some(&a) = data.get(i) else { return 0.0 };
    let b = data.get(i + 1).copied().unwrap_or(0.0);
    lerp(a, b, (pos - i as f64) as f32)
}

/// Equal-time resample: play `src` at `rate` (2.0 = an octave up) and collect
/// `frames` output frames. Frames past the end of `src` are silent.
pub fn resample_linear(src: &[f32], rate: f64, frames: usize) -> Vec<f32> {
    (0..frames).map(|n| read_linear(src, n as f64 * rate)).collect()
}
