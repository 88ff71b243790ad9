//! Prerendered sampler instrument.
//!
//! Only a sparse set of notes is rendered offline; a trigger plays the
//! rendered note nearest to the requested pitch, re-pitched by playback rate.

use std::sync::Arc;

use drift_core::envelopes::Fade;
use drift_core::pitch::Pitch;
use tracing::warn;

use crate::cache::{nearest_root, RenderedVariant};
use crate::chord::NoteTrigger;
use crate::clock::TransportClock;
use crate::registry::{launch_voice, SharedRegistry};
use crate::sink::{ChannelTag, SharedSink, Voice};

pub struct Sampler {
    notes: Arc<RenderedVariant>,
    registry: SharedRegistry,
    sink: SharedSink,
}

impl Sampler {
    pub fn new(notes: Arc<RenderedVariant>, registry: SharedRegistry, sink: SharedSink) -> Self {
        Self { notes, registry, sink }
    }

    /// Voice that sounds `note`, or `None` when no rendered buffer has a root.
    pub fn voice_for(&self, note: Pitch) -> Option<Voice> {
        let (buffer, root) = nearest_root(self.notes.buffers(), note)?;
        let playback_rate = root.ratio_to(note);
        let duration = buffer.duration() / playback_rate;
        Some(Voice {
            buffer: buffer.clone(),
            playback_rate,
            offset: 0.0,
            duration,
            fade: Fade::none(duration),
            channel: ChannelTag::Instrument,
        })
    }
}

impl NoteTrigger for Sampler {
    fn trigger(&self, clock: &mut dyn TransportClock, note: Pitch, delay: f64) {
        match self.voice_for(note) {
            Some(voice) => {
                launch_voice(clock, &self.registry, &self.sink, voice, delay);
            }
            None => warn!(%note, variant = self.notes.name(), "no rendered note to play"),
        }
    }
}
