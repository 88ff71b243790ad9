//! Offline rendering of raw buffers through an effect chain.
//!
//! The prerender cache decides *what* to render (which buffers, re-pitched
//! how, cut to what length) and describes it as [`RenderJob`]s; an
//! [`OfflineRenderer`] turns jobs into new buffers. [`ReverbRenderer`] is the
//! engine's renderer: resample, then run through [`Reverb`] mixed at the
//! chain's wetness.

use drift_core::buffer::AudioBuffer;
use drift_core::dsp::resample_linear;
use drift_core::pitch::Pitch;
use tracing::debug;

use crate::error::{DriftError, Result};
use crate::reverb::Reverb;

/// The destination a variant is rendered into, built from its wetness.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EffectChain {
    /// Dry/wet mix in [0,1].
    pub wetness: f32,
    /// Reverb decay (RT60), seconds.
    pub decay_s: f32,
}

impl EffectChain {
    pub fn reverb(wetness: f32, decay_s: f32) -> Self {
        Self { wetness, decay_s }
    }
}

/// One buffer to render.
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub source: AudioBuffer,
    /// Resampling ratio applied before the chain (re-pitching).
    pub playback_rate: f64,
    /// Output length in seconds; `None` keeps the resampled source length.
    pub length_s: Option<f64>,
    /// Pitch the rendered buffer sounds at; defaults to the source's root.
    pub root: Option<Pitch>,
}

impl RenderJob {
    pub fn plain(source: AudioBuffer) -> Self {
        Self { source, playback_rate: 1.0, length_s: None, root: None }
    }

    /// Frames produced before any tail.
    pub fn output_frames(&self) -> usize {
        let sr = f64::from(self.source.sample_rate());
        match self.length_s {
            Some(len) => (len.max(0.0) * sr).round() as usize,
            None => (self.source.len() as f64 / self.playback_rate).ceil() as usize,
        }
    }
}

pub trait OfflineRenderer {
    /// Render every job through `chain`, in order. `progress` receives the
    /// completed fraction in [0,1].
    fn render(&self, jobs: &[RenderJob], chain: &EffectChain, progress: &mut dyn FnMut(f32)) -> Result<Vec<AudioBuffer>>;
}

/// Resample + reverb renderer.
#[derive(Clone, Debug, Default)]
pub struct ReverbRenderer {
    tail_s: f64,
}

impl ReverbRenderer {
    pub fn new() -> Self { Self::default() }

    /// Seconds of reverb tail appended after each rendered buffer.
    pub fn with_tail(tail_s: f64) -> Self {
        Self { tail_s: tail_s.max(0.0) }
    }

    fn render_one(&self, job: &RenderJob, chain: &EffectChain) -> Result<AudioBuffer> {
        if job.source.is_empty() {
            return Err(DriftError::render(String::new(), "empty source buffer"));
        }
        if !(job.playback_rate.is_finite() && job.playback_rate > 0.0) {
            return Err(DriftError::render(String::new(), format!("invalid playback rate {}", job.playback_rate)));
        }
        let sr = job.source.sample_rate();
        let frames = job.output_frames() + (self.tail_s * f64::from(sr)).round() as usize;

        let mut out = resample_linear(job.source.samples(), job.playback_rate, frames);
        let mut reverb = Reverb::new(sr, chain.decay_s, chain.wetness);
        let mut peak = 0.0_f32;
        for s in &mut out {
            *s = reverb.process(*s);
            peak = peak.max(s.abs());
        }
        if peak > 1.0 {
            let g = 1.0 / peak;
            out.iter_mut().for_each(|s| *s *= g);
        }

        let mut rendered = AudioBuffer::from_samples(sr, out).with_reversed(job.source.is_reversed());
        if let Some(root) = job.root.or(job.source.root()) {
            rendered = rendered.with_root(root);
        }
        Ok(rendered)
    }
}

impl OfflineRenderer for ReverbRenderer {
    fn render(&self, jobs: &[RenderJob], chain: &EffectChain, progress: &mut dyn FnMut(f32)) -> Result<Vec<AudioBuffer>> {
        let mut rendered = Vec::with_capacity(jobs.len());
        for (k, job) in jobs.iter().enumerate() {
            rendered.push(self.render_one(job, chain)?);
            progress((k + 1) as f32 / jobs.len() as f32);
        }
        debug!(buffers = rendered.len(), wetness = chain.wetness, decay = chain.decay_s, "offline render finished");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(len: usize) -> AudioBuffer {
        AudioBuffer::from_samples(8_000.0, (0..len).map(|i| (i as f32 * 0.05).sin() * 0.5).collect())
    }

    #[test]
    fn keeps_length_and_metadata() {
        let r = ReverbRenderer::new();
        let src = source(800).reversed_copy();
        let out = r.render(&[RenderJob::plain(src)], &EffectChain::reverb(0.5, 2.0), &mut |_| {}).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 800);
        assert!(out[0].is_reversed());
    }

    #[test]
    fn repitched_job_with_length_and_root() {
        let r = ReverbRenderer::with_tail(0.5);
        let job = RenderJob {
            source: source(8_000),
            playback_rate: 2.0,
            length_s: Some(0.25),
            root: Some("A4".parse().unwrap()),
        };
        let out = r.render(&[job], &EffectChain::reverb(0.9, 4.0), &mut |_| {}).unwrap();
        assert_eq!(out[0].len(), 2_000 + 4_000);
        assert_eq!(out[0].root().map(|p| p.midi()), Some(69));
        assert!(out[0].samples().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn reports_progress_per_job() {
        let r = ReverbRenderer::new();
        let jobs = vec![RenderJob::plain(source(100)), RenderJob::plain(source(100))];
        let mut seen = Vec::new();
        r.render(&jobs, &EffectChain::reverb(0.5, 1.0), &mut |p| seen.push(p)).unwrap();
        assert_eq!(seen, vec![0.5, 1.0]);
    }

    #[test]
    fn empty_source_fails() {
        let r = ReverbRenderer::new();
        let empty = AudioBuffer::from_samples(8_000.0, Vec::new());
        let err = r.render(&[RenderJob::plain(empty)], &EffectChain::reverb(0.5, 1.0), &mut |_| {});
        assert!(matches!(err, Err(DriftError::RenderFailure { .. })));
    }
}
