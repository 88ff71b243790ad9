//! Decisions behind one drone pass.
//!
//! A pass picks which pair of rendered buffers to play (forward or reversed
//! material), how slowly to play them, and how long to wait before the next
//! pass so that consecutive passes overlap into a continuous texture. The
//! engine's drone scheduler performs the side effects; everything here is a
//! pure function of the injected `Rng` and the parameters.

use rand::Rng;

/// How the buffer pair index is drawn.
///
/// `Fixed` keeps the historical draw `round(U[0,1) * 0.5)`, which can only
/// yield 0: always the forward pair, always crossfade channel A. `Uniform`
/// draws uniformly over the available pairs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum VariantIndexPolicy {
    Fixed,
    #[default]
    Uniform,
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DroneParams {
    /// Seconds between a pass and the start of its voices.
    pub start_delay: f64,
    /// Seconds trimmed from both ends of each buffer.
    pub edge_trim: f64,
    /// Linear fade-in/fade-out length, seconds.
    pub fade: f64,
    /// Playback rate range `[min, max)`; sub-unity stretches the buffer.
    pub rate_min: f64,
    pub rate_max: f64,
    /// Overlap gap range `[min, max)` subtracted from the stretched duration.
    pub gap_min: f64,
    pub gap_max: f64,
    /// Floor for the delay before the next pass.
    pub min_reschedule: f64,
    pub variant_index: VariantIndexPolicy,
}

impl Default for DroneParams {
    fn default() -> Self {
        Self {
            start_delay: 1.0,
            edge_trim: 3.0,
            fade: 5.0,
            rate_min: 0.1,
            rate_max: 0.3,
            gap_min: 15.0,
            gap_max: 30.0,
            min_reschedule: 1.0,
            variant_index: VariantIndexPolicy::Uniform,
        }
    }
}

/// The random draws of one pass.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DronePass {
    pub variant_index: usize,
    pub playback_rate: f64,
    pub overlap_gap: f64,
}

/// Where a stretched voice starts inside its buffer and for how long it plays.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VoiceWindow {
    /// Offset into the buffer, buffer seconds.
    pub offset: f64,
    /// Wall-clock playback length at the pass's rate.
    pub playback_seconds: f64,
}

#[inline]
fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

impl DroneParams {
    pub fn draw_variant_index<R: Rng + ?Sized>(&self, rng: &mut R, pair_count: usize) -> usize {
        match self.variant_index {
            VariantIndexPolicy::Fixed => {
                let idx = (rng.gen::<f64>() * 0.5).round() as usize;
                idx.min(pair_count.saturating_sub(1))
            }
            VariantIndexPolicy::Uniform if pair_count > 1 => rng.gen_range(0..pair_count),
            VariantIndexPolicy::Uniform => 0,
        }
    }

    #[inline]
    pub fn draw_playback_rate<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        uniform(rng, self.rate_min, self.rate_max)
    }

    #[inline]
    pub fn draw_overlap_gap<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        uniform(rng, self.gap_min, self.gap_max)
    }

    /// Index, then rate, then gap: the order the draws happen in a pass.
    pub fn draw_pass<R: Rng + ?Sized>(&self, rng: &mut R, pair_count: usize) -> DronePass {
        let variant_index = self.draw_variant_index(rng, pair_count);
        let playback_rate = self.draw_playback_rate(rng);
        let overlap_gap = self.draw_overlap_gap(rng);
        DronePass { variant_index, playback_rate, overlap_gap }
    }

    pub fn voice_window(&self, buffer_seconds: f64, rate: f64) -> VoiceWindow {
        let playable = (buffer_seconds - 2.0 * self.edge_trim).max(0.0);
        VoiceWindow { offset: self.edge_trim.min(buffer_seconds.max(0.0)), playback_seconds: playable / rate }
    }

    /// Delay before the next pass, clamped to `min_reschedule` (never negative).
    /// Returns the delay and whether clamping happened.
    pub fn next_delay(&self, buffer_seconds: f64, rate: f64, gap: f64) -> (f64, bool) {
        let raw = raw_next_delay(buffer_seconds, rate, gap);
        let floor = self.min_reschedule.max(0.0);
        if raw.is_finite() && raw >= floor { (raw, false) } else { (floor, true) }
    }
}

/// `duration / rate - gap`: the stretched length of the pair minus the
/// overlap. Negative for short buffers; callers clamp.
#[inline]
pub fn raw_next_delay(buffer_seconds: f64, rate: f64, gap: f64) -> f64 {
    buffer_seconds / rate - gap
}
