//! Per-sample pull interface between hosts and the audio side of the engine.
//!
//! `Generator` is anything that yields one **mono** sample at a time;
//! `Engine<G>` owns a generator, tracks the host sample rate and elapsed
//! time, and tells the generator when the rate changes. The cpal callback and
//! the offline bounce both drive an `Engine<Mixer>`.
//!
//! Design goals
//! - No dynamic allocations per sample in the engine itself
//! - SR changes handled lazily (if the host reconfigures)
//! - Generic over the generator, so hosts avoid trait objects on the audio thread

/// Anything that can generate one sample at a time.
pub trait Generator {
    /// Called when the engine is (re)initialized or when the sample rate changes.
    fn reset(&mut self, sr: f32);

    /// Generate the next mono sample.
    fn next(&mut self) -> f32;
}

pub struct Engine<G: Generator> {
    sr: f32,
    frames: u64,
    gen: G,
}

impl<G: Generator> Engine<G> {
    /// Wrap `gen`, announcing `sr` to it immediately.
    #[inline]
    pub fn new(mut gen: G, sr: f32) -> Self {
        gen.reset(sr);
        Self { sr, frames: 0, gen }
    }

    /// Produce **one** mono sample at the given sample rate.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        if sr != self.sr {
            self.sr = sr;
            self.gen.reset(sr);
        }
        self.frames += 1;
        self.gen.next()
    }

    /// Fill `out` with consecutive samples.
    pub fn fill(&mut self, out: &mut [f32]) {
        let sr = self.sr;
        for s in out.iter_mut() {
            *s = self.next(sr);
        }
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }

    /// Seconds produced since creation.
    #[inline] pub fn time(&self) -> f64 { self.frames as f64 / f64::from(self.sr) }

    #[inline] pub fn generator_mut(&mut self) -> &mut G { &mut self.gen }
    #[inline] pub fn generator(&self) -> &G { &self.gen }
}
