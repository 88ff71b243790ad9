//! The narrow interface between scheduling decisions and the audio graph.
//!
//! Schedulers never touch samples. They describe a [`Voice`] (which buffer,
//! how fast, which slice, which channel) and hand it to a [`VoiceSink`] with
//! an absolute transport time. The realtime/offline mixer is one sink; the
//! [`RecordingSink`] used by tests and dry runs is another.

use std::cell::RefCell;
use std::rc::Rc;

use drift_core::buffer::AudioBuffer;
use drift_core::envelopes::Fade;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub(crate) u64);

impl VoiceId {
    #[inline] pub fn raw(self) -> u64 { self.0 }
}

/// Output channel a voice is connected to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelTag {
    /// Input `a` of the drone crossfade.
    CrossfadeA,
    /// Input `b` of the drone crossfade.
    CrossfadeB,
    /// Direct instrument output (sampler notes).
    Instrument,
}

impl ChannelTag {
    /// Crossfade input for a buffer pair index: even → `a`, odd → `b`.
    #[inline]
    pub fn crossfade(variant_index: usize) -> Self {
        if variant_index % 2 == 0 { ChannelTag::CrossfadeA } else { ChannelTag::CrossfadeB }
    }
}

/// One scheduled playback of a buffer.
#[derive(Clone, Debug)]
pub struct Voice {
    pub buffer: AudioBuffer,
    /// Playback rate; below 1 stretches and lowers the buffer.
    pub playback_rate: f64,
    /// Start position inside the buffer, buffer seconds.
    pub offset: f64,
    /// Wall-clock playback length, seconds.
    pub duration: f64,
    pub fade: Fade,
    pub channel: ChannelTag,
}

impl Voice {
    /// Seconds of buffer material the voice consumes.
    #[inline]
    pub fn buffer_span(&self) -> f64 {
        self.duration * self.playback_rate
    }
}

pub trait VoiceSink {
    /// Begin playing `voice` at absolute transport time `at`.
    fn start(&mut self, id: VoiceId, voice: &Voice, at: f64);

    /// Stop a voice (pending or playing) with the given fade-out, seconds.
    fn stop(&mut self, id: VoiceId, fade_out: f64);

    /// Set the rate and starting phase of the LFO that blends crossfade
    /// inputs `a` and `b`. Sinks without a crossfade ignore it.
    fn configure_crossfade(&mut self, _rate_hz: f32, _phase_deg: f32) {}
}

pub type SharedSink = Rc<RefCell<dyn VoiceSink>>;

#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Start {
        id: VoiceId,
        at: f64,
        channel: ChannelTag,
        playback_rate: f64,
        offset: f64,
        duration: f64,
        buffer_seconds: f64,
        reversed: bool,
    },
    Stop { id: VoiceId, fade_out: f64 },
    Crossfade { rate_hz: f32, phase_deg: f32 },
}

/// Sink that only remembers what it was asked to do.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self { Self::default() }

    pub fn shared() -> Rc<RefCell<RecordingSink>> {
        Rc::new(RefCell::new(Self::new()))
    }

    #[inline] pub fn events(&self) -> &[SinkEvent] { &self.events }

    pub fn starts(&self) -> impl Iterator<Item = &SinkEvent> + '_ {
        self.events.iter().filter(|e| matches!(e, SinkEvent::Start { .. }))
    }

    pub fn stops(&self) -> impl Iterator<Item = &SinkEvent> + '_ {
        self.events.iter().filter(|e| matches!(e, SinkEvent::Stop { .. }))
    }

    pub fn clear(&mut self) { self.events.clear(); }
}

impl VoiceSink for RecordingSink {
    fn start(&mut self, id: VoiceId, voice: &Voice, at: f64) {
        self.events.push(SinkEvent::Start {
            id,
            at,
            channel: voice.channel,
            playback_rate: voice.playback_rate,
            offset: voice.offset,
            duration: voice.duration,
            buffer_seconds: voice.buffer.duration(),
            reversed: voice.buffer.is_reversed(),
        });
    }

    fn stop(&mut self, id: VoiceId, fade_out: f64) {
        self.events.push(SinkEvent::Stop { id, fade_out });
    }

    fn configure_crossfade(&mut self, rate_hz: f32, phase_deg: f32) {
        self.events.push(SinkEvent::Crossfade { rate_hz, phase_deg });
    }
}
