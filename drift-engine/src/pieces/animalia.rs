//! `animalia-chordata`: a slow whale drone.
//!
//! One raw whale recording is rendered twice through a long reverb, once
//! dryer and once wetter, each with a reversed copy appended. The drone
//! scheduler then layers stretched dryer/wetter pairs, routed through a
//! crossfade that a very slow LFO sweeps between the forward and reversed
//! material.

use std::sync::Arc;

use rand::Rng;
use tracing::info;

use super::{fetch, ActivationContext, ActivePiece, Piece, Schedule};
use crate::cache::{InputPlan, RenderedVariant, VariantRequest};
use crate::clock::TransportClock;
use crate::config::DroneConfig;
use crate::drone::DroneScheduler;
use crate::error::{DriftError, Result};
use crate::registry::VoiceRegistry;
use crate::render::EffectChain;
use crate::sink::SharedSink;
use crate::SharedRng;

pub const SOURCE: &str = "whales";
pub const DRYER: &str = "animalia-chordata__whales-dryer";
pub const WETTER: &str = "animalia-chordata__whales-wetter";

#[derive(Copy, Clone, Debug, Default)]
pub struct AnimaliaChordata;

impl Piece for AnimaliaChordata {
    fn name(&self) -> &'static str { "animalia-chordata" }

    fn manifest(&self) -> &'static [&'static str] { &[SOURCE] }

    fn activate(&self, ctx: ActivationContext<'_>) -> Result<Box<dyn ActivePiece>> {
        let samples = fetch(ctx.library, self.manifest(), &[DRYER, WETTER])?;
        let drone = &ctx.config.drone;
        let requests = [
            VariantRequest::new(
                DRYER,
                EffectChain::reverb(drone.dryer_wetness, drone.decay_seconds),
                InputPlan::Group { seed_reversed: true },
            ),
            VariantRequest::new(
                WETTER,
                EffectChain::reverb(drone.wetter_wetness, drone.decay_seconds),
                InputPlan::Group { seed_reversed: true },
            ),
        ];
        let rendered = ctx.cache.get_or_render_all(&samples, SOURCE, &requests, ctx.renderer, ctx.progress)?;
        let [dryer, wetter]: [Arc<RenderedVariant>; 2] = rendered
            .try_into()
            .map_err(|_| DriftError::render(DRYER, "batch returned the wrong number of variants"))?;
        info!(piece = self.name(), dryer = dryer.len(), wetter = wetter.len(), "piece activated");

        Ok(Box::new(ActiveAnimalia { dryer, wetter, config: drone.clone(), rng: ctx.rng }))
    }
}

struct ActiveAnimalia {
    dryer: Arc<RenderedVariant>,
    wetter: Arc<RenderedVariant>,
    config: DroneConfig,
    rng: SharedRng,
}

impl ActivePiece for ActiveAnimalia {
    fn name(&self) -> &'static str { "animalia-chordata" }

    fn schedule(&self, clock: &mut dyn TransportClock, sink: SharedSink) -> Result<Schedule> {
        let (lo, hi) = (self.config.crossfade_rate_min, self.config.crossfade_rate_max);
        let rate = if hi > lo { self.rng.borrow_mut().gen_range(lo..hi) } else { lo };
        sink.borrow_mut().configure_crossfade(rate, self.config.crossfade_phase_deg);

        let registry = VoiceRegistry::shared();
        let drone = DroneScheduler::new(
            self.config.timing,
            Arc::clone(&self.dryer),
            Arc::clone(&self.wetter),
            self.rng.clone(),
            registry.clone(),
            sink.clone(),
        )?;
        drone.start(clock);
        Ok(Schedule::new(registry, sink).with_drone(drone))
    }

    fn variants(&self) -> Vec<Arc<RenderedVariant>> {
        vec![Arc::clone(&self.dryer), Arc::clone(&self.wetter)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PrerenderCache;
    use crate::clock::Transport;
    use crate::config::DriftConfig;
    use crate::library::MemoryLibrary;
    use crate::pieces::deactivate;
    use crate::render::ReverbRenderer;
    use crate::sink::{RecordingSink, SinkEvent};
    use drift_core::buffer::AudioBuffer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn library() -> MemoryLibrary {
        let whale = AudioBuffer::from_samples(1_000.0, (0..40_000).map(|i| (i as f32 * 0.003).sin() * 0.3).collect());
        MemoryLibrary::new().with(SOURCE, vec![whale])
    }

    fn activate(
        library: &MemoryLibrary,
        cache: &mut PrerenderCache,
        progress: &mut Vec<f32>,
    ) -> Result<Box<dyn ActivePiece>> {
        let config = DriftConfig::default();
        AnimaliaChordata.activate(ActivationContext {
            library,
            cache,
            renderer: &ReverbRenderer::new(),
            config: &config,
            rng: Rc::new(RefCell::new(StdRng::seed_from_u64(17))),
            progress: &mut |p| progress.push(p),
        })
    }

    #[test]
    fn activation_renders_both_variants_once() {
        let library = library();
        let mut cache = PrerenderCache::new();
        let mut progress = Vec::new();
        let piece = activate(&library, &mut cache, &mut progress).unwrap();

        let variants = piece.variants();
        assert_eq!(variants.len(), 2);
        assert!(variants.iter().all(|v| v.len() == 2 && v.buffers()[1].is_reversed()));
        assert_eq!(cache.render_count(), 2);
        assert_eq!(progress.first(), Some(&0.0));
        assert_eq!(progress.last(), Some(&1.0));
        assert!(progress.contains(&0.5));

        let mut again = Vec::new();
        activate(&library, &mut cache, &mut again).unwrap();
        assert_eq!(cache.render_count(), 2);
        assert!(again.is_empty());
        assert_eq!(cache.live_temporaries(), 0);
    }

    #[test]
    fn schedule_stop_and_teardown() {
        let library = library();
        let mut cache = PrerenderCache::new();
        let piece = activate(&library, &mut cache, &mut Vec::new()).unwrap();

        let recording = RecordingSink::shared();
        let sink: SharedSink = recording.clone();
        let mut clock = Transport::new();
        let schedule = piece.schedule(&mut clock, sink).unwrap();
        {
            let rec = recording.borrow();
            assert!(matches!(rec.events()[0], SinkEvent::Crossfade { rate_hz, phase_deg }
                if (0.005..0.01).contains(&rate_hz) && phase_deg == 90.0));
            assert_eq!(rec.starts().count(), 2);
        }
        assert_eq!(schedule.registry().borrow().len(), 2);

        let registry = schedule.registry().clone();
        assert_eq!(schedule.stop(&mut clock), 2);
        assert!(registry.borrow().is_empty());
        clock.advance_to(10_000.0);
        assert_eq!(recording.borrow().starts().count(), 2);

        // Paused, not torn down: scheduling again renders nothing.
        let again = piece.schedule(&mut clock, recording.clone()).unwrap();
        again.stop(&mut clock);
        assert_eq!(cache.render_count(), 2);

        deactivate(piece, &mut cache);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_whales_fail_the_activation() {
        let mut cache = PrerenderCache::new();
        let err = activate(&MemoryLibrary::new(), &mut cache, &mut Vec::new()).err();
        assert!(matches!(err, Some(DriftError::MissingSample { ref name }) if name == SOURCE));
        assert!(cache.is_empty());
    }

    #[test]
    fn library_prerenders_are_adopted() {
        let prerendered = AudioBuffer::from_samples(1_000.0, vec![0.0; 10_000]);
        let library = library()
            .with(DRYER, vec![prerendered.clone(), prerendered.reversed_copy()])
            .with(WETTER, vec![prerendered.clone(), prerendered.reversed_copy()]);
        let mut cache = PrerenderCache::new();
        activate(&library, &mut cache, &mut Vec::new()).unwrap();
        assert_eq!(cache.render_count(), 0);
        assert_eq!(cache.len(), 2);
    }
}
