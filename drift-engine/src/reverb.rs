//! Offline mono reverb used to derive wetter/dryer variants of raw samples.
//!
//! Design
//! - "Schroeder-ish" structure: 2 short all-passes → 4 LP-combs in parallel → 2 all-passes.
//! - Delay lines live on the heap and are sized from the sample rate; this only
//!   ever runs inside an offline render, never on the audio thread.
//! - Comb feedback is derived from the requested decay (RT60), so a 30 s decay
//!   gives a long wash and a 4 s decay a small room.
//! - `wet` is the dry/wet mix in [0,1].

use drift_core::dsp::kill_denormals;
use drift_core::filters::OnePoleLP;

/// Reference delay lengths in samples at 48 kHz (mutually prime-ish).
const PRE_AP_48K: [f32; 2] = [641.0, 997.0];
const COMB_48K: [f32; 4] = [7789.0, 8513.0, 9449.0, 10867.0];
const POST_AP_48K: [f32; 2] = [579.0, 773.0];

#[derive(Clone, Debug)]
struct DelayLine {
    buf: Vec<f32>,
    i: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self { Self { buf: vec![0.0; len.max(1)], i: 0 } }
    #[inline] fn read(&self) -> f32 { self.buf[self.i] }
    #[inline]
    fn write_advance(&mut self, x: f32) {
        self.buf[self.i] = x;
        self.i += 1;
        if self.i >= self.buf.len() { self.i = 0; }
    }
}

#[derive(Clone, Debug)]
struct Allpass {
    d: DelayLine,
    g: f32,
}

impl Allpass {
    fn new(len: usize, g: f32) -> Self { Self { d: DelayLine::new(len), g: g.clamp(-0.999, 0.999) } }
    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let z = self.d.read();
        let y = z - self.g * x;
        self.d.write_advance(x + self.g * y);
        kill_denormals(y)
    }
}

/// Feedback comb with a low-pass in the loop for HF damping.
#[derive(Clone, Debug)]
struct CombLp {
    d: DelayLine,
    fb: f32,
    lp: OnePoleLP,
}

impl CombLp {
    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let z = self.d.read();
        let damped = self.lp.process(z);
        self.d.write_advance(x + self.fb * damped);
        kill_denormals(z)
    }
}

#[derive(Clone, Debug)]
pub struct Reverb {
    pre: [Allpass; 2],
    combs: Vec<CombLp>,
    post: [Allpass; 2],
    wet: f32,
    wet_gain: f32,
}

impl Reverb {
    /// `decay_s` is the time for the tank to fall by 60 dB; `wet` in [0,1].
    pub fn new(sr: f32, decay_s: f32, wet: f32) -> Self {
        let sr = sr.max(1.0);
        let scale = sr / 48_000.0;
        let len = |n: f32| ((n * scale) as usize).max(1);
        let decay = decay_s.max(0.05);

        let combs: Vec<CombLp> = COMB_48K
            .iter()
            .map(|n| {
                let samples = len(*n);
                let delay_s = samples as f32 / sr;
                // RT60: 0.001 = fb^(decay / delay)
                let fb = 0.001_f32.powf(delay_s / decay).min(0.995);
                CombLp { d: DelayLine::new(samples), fb, lp: OnePoleLP::new(9_000.0, sr) }
            })
            .collect();
        let mean_fb = combs.iter().map(|c| c.fb).sum::<f32>() / combs.len() as f32;

        Self {
            pre: [Allpass::new(len(PRE_AP_48K[0]), 0.72), Allpass::new(len(PRE_AP_48K[1]), 0.70)],
            combs,
            post: [Allpass::new(len(POST_AP_48K[0]), 0.65), Allpass::new(len(POST_AP_48K[1]), 0.61)],
            wet: wet.clamp(0.0, 1.0),
            wet_gain: (1.0 - mean_fb * mean_fb).sqrt(),
        }
    }

    /// Process one sample; returns the dry/wet mix.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let early = self.pre[0].process(x);
        let diffused = self.pre[1].process(early);
        let mut sum = 0.0;
        for c in &mut self.combs {
            sum += c.process(diffused);
        }
        let tank = 0.25 * sum * self.wet_gain;
        let smeared = self.post[0].process(tank);
        let wet = self.post[1].process(smeared);
        kill_denormals((1.0 - self.wet) * x + self.wet * wet)
    }
}
