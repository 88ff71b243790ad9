//! Offline bounce: run a scheduled piece against a fresh transport and pull
//! its mix as fast as the CPU allows.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::clock::Transport;
use crate::error::Result;
use crate::graph::Engine;
use crate::mixer::{self, MixSettings};
use crate::pieces::ActivePiece;
use crate::sink::SharedSink;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BounceOptions {
    pub seconds: f64,
    pub sample_rate: u32,
    /// Frames pulled between transport advances.
    pub block_frames: usize,
    /// How far past the current block the transport is advanced, seconds.
    pub lookahead: f64,
}

impl Default for BounceOptions {
    fn default() -> Self {
        Self { seconds: 60.0, sample_rate: 48_000, block_frames: 512, lookahead: 0.25 }
    }
}

/// Mono mix of `seconds` of `piece`. Schedulers are stopped (and their voices
/// silenced) before returning.
pub fn bounce(piece: &dyn ActivePiece, settings: MixSettings, opts: &BounceOptions) -> Result<Vec<f32>> {
    let sr = opts.sample_rate.max(1) as f32;
    let (sink, mixer) = mixer::channel(sr, settings);
    let sink: SharedSink = Rc::new(RefCell::new(sink));
    let mut engine = Engine::new(mixer, sr);
    let mut transport = Transport::new();
    let schedule = piece.schedule(&mut transport, sink)?;

    let total = (opts.seconds.max(0.0) * f64::from(sr)).round() as usize;
    let mut out = vec![0.0_f32; total];
    for block in out.chunks_mut(opts.block_frames.max(1)) {
        let horizon = engine.time() + block.len() as f64 / f64::from(sr) + opts.lookahead.max(0.0);
        transport.advance_to(horizon);
        engine.fill(block);
    }

    let stopped = schedule.stop(&mut transport);
    info!(piece = piece.name(), seconds = opts.seconds, frames = total, voices_stopped = stopped, "bounce finished");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PrerenderCache;
    use crate::config::DriftConfig;
    use crate::library::MemoryLibrary;
    use crate::pieces::{ActivationContext, AnimaliaChordata, LittleBells, Piece};
    use crate::render::ReverbRenderer;
    use drift_core::buffer::AudioBuffer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn library() -> MemoryLibrary {
        let tone = |len: usize| (0..len).map(|i| (i as f32 * 0.05).sin() * 0.5).collect::<Vec<f32>>();
        MemoryLibrary::new()
            .with("whales", vec![AudioBuffer::from_samples(2_000.0, tone(40_000))])
            .with("vsco2-glock", vec![AudioBuffer::from_samples(2_000.0, tone(2_000)).with_root("C5".parse().unwrap())])
    }

    fn activated(piece: &dyn Piece) -> Box<dyn ActivePiece> {
        let mut cache = PrerenderCache::new();
        piece
            .activate(ActivationContext {
                library: &library(),
                cache: &mut cache,
                renderer: &ReverbRenderer::new(),
                config: &DriftConfig::default(),
                rng: Rc::new(RefCell::new(StdRng::seed_from_u64(21))),
                progress: &mut |_| {},
            })
            .unwrap()
    }

    fn opts(seconds: f64) -> BounceOptions {
        BounceOptions { seconds, sample_rate: 8_000, ..BounceOptions::default() }
    }

    #[test]
    fn bells_are_silent_until_the_first_beat() {
        let piece = activated(&LittleBells);
        let out = bounce(piece.as_ref(), MixSettings::default(), &opts(3.0)).unwrap();
        assert_eq!(out.len(), 24_000);
        assert!(out[..8_000].iter().all(|s| *s == 0.0));
        assert!(out[8_000..].iter().any(|s| s.abs() > 1e-3));
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn drone_bounce_starts_after_its_delay() {
        let piece = activated(&AnimaliaChordata);
        let out = bounce(piece.as_ref(), MixSettings::default(), &opts(4.0)).unwrap();
        assert_eq!(out.len(), 32_000);
        assert!(out[..8_000].iter().all(|s| *s == 0.0));
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }
}
