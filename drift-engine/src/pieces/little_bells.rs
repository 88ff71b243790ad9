//! `little-bells`: sparse glockenspiel chords.
//!
//! A glockenspiel is prerendered through a reverb on a sparse grid of notes
//! (every third tone of all the chords the piece can play). At schedule time
//! one pitch class is picked and two chord voices start on it, an octave
//! apart, with slightly different periods so they drift against each other.

use std::rc::Rc;
use std::sync::Arc;

use drift_core::pitch::{ChordQuality, Pitch};
use rand::Rng;
use tracing::info;

use super::{fetch, ActivationContext, ActivePiece, Piece, Schedule};
use crate::cache::{InputPlan, RenderedVariant, VariantRequest};
use crate::chord::{ChordScheduler, NoteTrigger};
use crate::clock::TransportClock;
use crate::config::BellsConfig;
use crate::error::{DriftError, Result};
use crate::registry::VoiceRegistry;
use crate::render::EffectChain;
use crate::sampler::Sampler;
use crate::sink::SharedSink;
use crate::SharedRng;

pub const SOURCE: &str = "vsco2-glock";
pub const VARIANT: &str = "little-bells::vsco2-glock";

/// The lower voice owes a first note when the split draw is at least this.
pub const LOWER_MANDATORY_FROM: f64 = 0.33;
/// The higher voice owes a first note when the split draw is below this.
pub const HIGHER_MANDATORY_BELOW: f64 = 0.66;

/// Which chord voices owe a first-cycle note for a split draw `p` in [0,1).
/// The ranges overlap, so at least one always does.
#[inline]
pub fn mandatory_split(p: f64) -> (bool, bool) {
    (p >= LOWER_MANDATORY_FROM, p < HIGHER_MANDATORY_BELOW)
}

/// Notes to prerender: the sorted union of every chord tone reachable from
/// the configured pitch classes in both octaves, thinned to every n-th.
pub fn sampled_notes(config: &BellsConfig) -> Result<Vec<Pitch>> {
    let mut notes = Vec::new();
    for octave in [config.lower_octave, config.higher_octave] {
        for tonic in config.tonics(octave)? {
            notes.extend(ChordQuality::MinorSeventh.notes(tonic));
        }
    }
    notes.sort_unstable();
    notes.dedup();
    Ok(notes.into_iter().step_by(config.render_every.max(1)).collect())
}

#[derive(Copy, Clone, Debug, Default)]
pub struct LittleBells;

impl Piece for LittleBells {
    fn name(&self) -> &'static str { "little-bells" }

    fn manifest(&self) -> &'static [&'static str] { &[SOURCE] }

    fn activate(&self, ctx: ActivationContext<'_>) -> Result<Box<dyn ActivePiece>> {
        let bells = &ctx.config.bells;
        let samples = fetch(ctx.library, self.manifest(), &[VARIANT])?;
        let notes = sampled_notes(bells)?;
        let request = VariantRequest::new(
            VARIANT,
            EffectChain::reverb(bells.wetness, bells.decay_seconds),
            InputPlan::Notes { notes, length_s: bells.render_seconds },
        );
        let variant = ctx.cache.get_or_render(&samples, SOURCE, &request, ctx.renderer, ctx.progress)?;
        if variant.is_empty() {
            return Err(DriftError::EmptyVariant { variant: VARIANT.to_string() });
        }
        info!(piece = self.name(), notes = variant.len(), "piece activated");

        Ok(Box::new(ActiveBells { variant, config: bells.clone(), rng: ctx.rng }))
    }
}

struct ActiveBells {
    variant: Arc<RenderedVariant>,
    config: BellsConfig,
    rng: SharedRng,
}

impl ActivePiece for ActiveBells {
    fn name(&self) -> &'static str { "little-bells" }

    fn schedule(&self, clock: &mut dyn TransportClock, sink: SharedSink) -> Result<Schedule> {
        let cfg = &self.config;
        let lower_tonics = cfg.tonics(cfg.lower_octave)?;
        let higher_tonics = cfg.tonics(cfg.higher_octave)?;
        let (class, split) = {
            let mut rng = self.rng.borrow_mut();
            (rng.gen_range(0..lower_tonics.len()), rng.gen::<f64>())
        };
        let (lower_mandatory, higher_mandatory) = mandatory_split(split);
        info!(tonic = %lower_tonics[class], split, lower_mandatory, higher_mandatory, "bells pitch class chosen");

        let registry = VoiceRegistry::shared();
        let sampler: Rc<dyn NoteTrigger> =
            Rc::new(Sampler::new(Arc::clone(&self.variant), registry.clone(), sink.clone()));
        let voices = [
            (lower_tonics[class], cfg.lower_period, lower_mandatory),
            (higher_tonics[class], cfg.higher_period, higher_mandatory),
        ];

        let mut schedule = Schedule::new(registry, sink);
        for (tonic, period, mandatory) in voices {
            let chord = ChordScheduler::new(tonic, period, mandatory, cfg.rules.clone(), self.rng.clone(), sampler.clone());
            chord.start(clock);
            schedule = schedule.with_chord(chord);
        }
        Ok(schedule)
    }

    fn variants(&self) -> Vec<Arc<RenderedVariant>> {
        vec![Arc::clone(&self.variant)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PrerenderCache;
    use crate::clock::Transport;
    use crate::config::DriftConfig;
    use crate::library::MemoryLibrary;
    use crate::render::ReverbRenderer;
    use crate::sink::{ChannelTag, RecordingSink, SinkEvent};
    use drift_core::buffer::AudioBuffer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;

    fn glock() -> MemoryLibrary {
        let note = |name: &str| {
            AudioBuffer::from_samples(2_000.0, (0..2_000).map(|i| (i as f32 * 0.2).sin() * 0.5).collect())
                .with_root(name.parse().unwrap())
        };
        MemoryLibrary::new().with(SOURCE, vec![note("C5"), note("G5"), note("C6")])
    }

    fn activate(cache: &mut PrerenderCache, config: &DriftConfig, seed: u64) -> Box<dyn ActivePiece> {
        LittleBells
            .activate(ActivationContext {
                library: &glock(),
                cache,
                renderer: &ReverbRenderer::new(),
                config,
                rng: Rc::new(RefCell::new(StdRng::seed_from_u64(seed))),
                progress: &mut |_| {},
            })
            .unwrap()
    }

    #[test]
    fn split_always_leaves_one_mandatory_voice() {
        for k in 0..1_000 {
            let (lower, higher) = mandatory_split(k as f64 / 1_000.0);
            assert!(lower || higher);
        }
        assert_eq!(mandatory_split(0.1), (false, true));
        assert_eq!(mandatory_split(0.5), (true, true));
        assert_eq!(mandatory_split(0.9), (true, false));
    }

    #[test]
    fn default_grid_takes_every_third_chord_tone() {
        let notes = sampled_notes(&BellsConfig::default()).unwrap();
        let midi: Vec<u8> = notes.iter().map(|p| p.midi()).collect();
        assert_eq!(midi, vec![65, 69, 72, 75, 78, 81, 84, 87, 90, 93]);
    }

    #[test]
    fn renders_one_buffer_per_grid_note() {
        let mut cache = PrerenderCache::new();
        let config = DriftConfig::default();
        let piece = activate(&mut cache, &config, 1);
        let variant = &piece.variants()[0];
        assert_eq!(variant.len(), 10);
        assert_eq!(variant.buffers()[0].root().map(|p| p.midi()), Some(65));
        assert!(variant.buffers().iter().all(|b| b.len() == 6_000));
        assert_eq!(cache.render_count(), 1);
    }

    #[test]
    fn first_cycle_sounds_on_beat_one() {
        let mut cache = PrerenderCache::new();
        let config = DriftConfig::default();
        for seed in 0..10 {
            let piece = activate(&mut cache, &config, seed);
            let recording = RecordingSink::shared();
            let mut clock = Transport::new();
            let schedule = piece.schedule(&mut clock, recording.clone()).unwrap();
            assert_eq!(schedule.chords().len(), 2);
            assert_eq!(schedule.chords()[1].tonic().midi(), schedule.chords()[0].tonic().midi() + 12);

            clock.advance_to(0.0);
            let rec = recording.borrow();
            assert!(rec.starts().any(|e| matches!(e, SinkEvent::Start { at, channel: ChannelTag::Instrument, .. } if *at == 1.0)));
        }
        assert_eq!(cache.render_count(), 1);
    }

    #[test]
    fn stop_silences_and_ends_both_voices() {
        let mut cache = PrerenderCache::new();
        let config = DriftConfig::default();
        let piece = activate(&mut cache, &config, 4);
        let recording = RecordingSink::shared();
        let mut clock = Transport::new();
        let schedule = piece.schedule(&mut clock, recording.clone()).unwrap();
        clock.advance_to(50.0);
        let registry = schedule.registry().clone();
        let chords = schedule.chords().to_vec();
        schedule.stop(&mut clock);
        assert!(registry.borrow().is_empty());

        let cycles: Vec<u64> = chords.iter().map(|c| c.cycles()).collect();
        clock.advance_to(500.0);
        assert_eq!(chords.iter().map(|c| c.cycles()).collect::<Vec<_>>(), cycles);
    }
}
