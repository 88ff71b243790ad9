//! Pieces: manifests, prerendering and scheduler wiring.
//!
//! Lifecycle
//! - [`Piece::activate`] fetches the manifest's sample groups and prerenders
//!   every variant the piece needs. It blocks until both are done and fails
//!   the whole activation on the first error; nothing is scheduled yet.
//! - [`ActivePiece::schedule`] starts the piece's schedulers against a
//!   transport and a sink and returns a [`Schedule`].
//! - [`Schedule::stop`] pauses: cancels the schedulers, clears their
//!   transport events and force-stops their voices. Rendered variants stay
//!   in the cache, so the piece can be scheduled again at no render cost.
//! - [`deactivate`] tears the piece down and evicts its variants.

use std::sync::Arc;

use tracing::info;

use crate::cache::{PrerenderCache, RenderedVariant};
use crate::chord::ChordScheduler;
use crate::clock::TransportClock;
use crate::config::DriftConfig;
use crate::drone::DroneScheduler;
use crate::error::Result;
use crate::library::{RawSampleSet, SampleLibrary};
use crate::registry::SharedRegistry;
use crate::render::OfflineRenderer;
use crate::sink::SharedSink;
use crate::SharedRng;

pub mod animalia;
pub mod little_bells;

pub use animalia::AnimaliaChordata;
pub use little_bells::LittleBells;

/// Everything an activation may touch.
pub struct ActivationContext<'a> {
    pub library: &'a dyn SampleLibrary,
    pub cache: &'a mut PrerenderCache,
    pub renderer: &'a dyn OfflineRenderer,
    pub config: &'a DriftConfig,
    pub rng: SharedRng,
    /// Fraction of the activation's prerendering done, in [0,1].
    pub progress: &'a mut dyn FnMut(f32),
}

pub trait Piece {
    fn name(&self) -> &'static str;

    /// Raw sample groups the piece needs.
    fn manifest(&self) -> &'static [&'static str];

    fn activate(&self, ctx: ActivationContext<'_>) -> Result<Box<dyn ActivePiece>>;
}

pub trait ActivePiece {
    fn name(&self) -> &'static str;

    /// Start the piece's schedulers now.
    fn schedule(&self, clock: &mut dyn TransportClock, sink: SharedSink) -> Result<Schedule>;

    /// Variants this activation holds.
    fn variants(&self) -> Vec<Arc<RenderedVariant>>;
}

/// Running schedulers of one activation, plus the registry of their voices.
pub struct Schedule {
    registry: SharedRegistry,
    sink: SharedSink,
    drones: Vec<DroneScheduler>,
    chords: Vec<ChordScheduler>,
}

impl Schedule {
    pub(crate) fn new(registry: SharedRegistry, sink: SharedSink) -> Self {
        Self { registry, sink, drones: Vec::new(), chords: Vec::new() }
    }

    pub(crate) fn with_drone(mut self, drone: DroneScheduler) -> Self {
        self.drones.push(drone);
        self
    }

    pub(crate) fn with_chord(mut self, chord: ChordScheduler) -> Self {
        self.chords.push(chord);
        self
    }

    #[inline] pub fn registry(&self) -> &SharedRegistry { &self.registry }
    #[inline] pub fn drones(&self) -> &[DroneScheduler] { &self.drones }
    #[inline] pub fn chords(&self) -> &[ChordScheduler] { &self.chords }

    /// Cancel every scheduler, then silence every voice they started.
    /// Returns how many voices were force-stopped.
    pub fn stop(self, clock: &mut dyn TransportClock) -> usize {
        for drone in &self.drones {
            drone.stop(clock);
        }
        for chord in &self.chords {
            chord.stop(clock);
        }
        let stopped = self.registry.borrow_mut().stop_all(&mut *self.sink.borrow_mut());
        info!(voices = stopped, "schedule stopped");
        stopped
    }
}

/// Full teardown: dispose the piece's rendered variants.
pub fn deactivate(piece: Box<dyn ActivePiece>, cache: &mut PrerenderCache) {
    let variants = piece.variants();
    for v in &variants {
        cache.evict(v.source(), v.name());
    }
    info!(piece = piece.name(), evicted = variants.len(), "piece deactivated");
}

/// Every piece this crate ships.
pub fn all() -> Vec<Box<dyn Piece>> {
    vec![Box::new(AnimaliaChordata), Box::new(LittleBells)]
}

/// Look a piece up by name.
pub fn by_name(name: &str) -> Option<Box<dyn Piece>> {
    all().into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
}

/// Fetch the manifest and add any prerendered groups the library ships under
/// the given variant names.
pub(crate) fn fetch(library: &dyn SampleLibrary, manifest: &[&str], variants: &[&str]) -> Result<RawSampleSet> {
    let mut samples = library.request(manifest)?;
    for name in variants {
        if let Some(prerendered) = library.find(name) {
            samples.insert(*name, prerendered);
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pieces_are_found_by_name() {
        assert_eq!(by_name("little-bells").map(|p| p.name()), Some("little-bells"));
        assert_eq!(by_name("Animalia-Chordata").map(|p| p.manifest()), Some(&["whales"][..]));
        assert!(by_name("nope").is_none());
        assert_eq!(all().len(), 2);
    }
}
