//! Built-in stand-in samples, used when no `--samples` directory is given.
//!
//! `whales` is a slow gliding partial stack under a swell; `vsco2-glock` is
//! three struck bell tones (C5, G5, C6) made of inharmonic partials with an
//! exponential decay. Both are mono at [`SAMPLE_RATE`].

use drift_core::buffer::AudioBuffer;
use drift_core::dsp::kill_denormals;
use drift_core::pitch::Pitch;
use drift_engine::library::MemoryLibrary;
use drift_engine::nodes::{Lfo, Osc, Wave};

pub const SAMPLE_RATE: f32 = 22_050.0;

const WHALE_SECONDS: f32 = 24.0;
const BELL_SECONDS: f32 = 2.5;
const BELL_PARTIALS: [(f32, f32); 3] = [(1.0, 0.6), (2.76, 0.25), (5.4, 0.12)];

#[inline]
fn hz(p: Pitch) -> f32 {
    440.0 * ((f32::from(p.midi()) - 69.0) / 12.0).exp2()
}

/// Library holding both stand-in groups.
pub fn library() -> MemoryLibrary {
    MemoryLibrary::new()
        .with("whales", vec![whale()])
        .with("vsco2-glock", ["C5", "G5", "C6"].iter().filter_map(|n| n.parse().ok()).map(bell).collect())
}

/// A low moan that glides down a fifth and back, with a breathing swell.
pub fn whale() -> AudioBuffer {
    let sr = SAMPLE_RATE;
    let frames = (WHALE_SECONDS * sr) as usize;
    let mut voices = [(Osc::new(110.0, Wave::Sine), 1.0_f32, 0.5_f32), (Osc::new(165.0, Wave::Tri), 1.5, 0.2), (Osc::new(220.0, Wave::Sine), 2.0, 0.15)];
    let mut swell = Lfo::sine(0.15);
    swell.set_phase_deg(270.0);
    let mut glide = Lfo::sine(1.0 / WHALE_SECONDS);

    let mut out = Vec::with_capacity(frames);
    for i in 0..frames {
        let base = 110.0 * (1.0 - 0.33 * glide.next01(sr));
        let mut s = 0.0;
        for (osc, ratio, amp) in &mut voices {
            osc.set_freq(base * *ratio);
            s += osc.next(sr) * *amp;
        }
        // Short ramps at both ends keep the loop edges click-free.
        let edge = (i.min(frames - 1 - i) as f32 / (0.5 * sr)).min(1.0);
        out.push(kill_denormals(s * swell.next01(sr) * edge * 0.6));
    }
    AudioBuffer::from_samples(sr, out)
}

/// One struck bell at `root`, tagged with that root.
pub fn bell(root: Pitch) -> AudioBuffer {
    let sr = SAMPLE_RATE;
    let frames = (BELL_SECONDS * sr) as usize;
    let f0 = hz(root);
    let mut partials: Vec<(Osc, f32, f32)> = BELL_PARTIALS
        .iter()
        .enumerate()
        .map(|(k, (ratio, amp))| {
            let mut osc = Osc::new(f0 * ratio, Wave::Sine);
            osc.set_gain(*amp);
            // Higher partials die faster.
            (osc, 1.0, (-(3.0 + 2.5 * k as f32) / sr).exp())
        })
        .collect();

    let mut out = Vec::with_capacity(frames);
    for _ in 0..frames {
        let mut s = 0.0;
        for (osc, env, decay) in &mut partials {
            s += osc.next(sr) * *env;
            *env *= *decay;
        }
        out.push(kill_denormals(s));
    }
    AudioBuffer::from_samples(sr, out).with_root(root)
}
