//! Voice mixer: the sink that actually makes sound.
//!
//! Scheduling runs on the control thread; playback runs wherever the
//! [`Mixer`] is pulled from (the cpal callback, or the bounce loop). The two
//! halves returned by [`channel`] talk over a bounded `rtrb` ring buffer:
//! [`MixerSink`] turns `VoiceSink` calls into owned [`SinkCommand`]s and the
//! mixer drains them before every sample. Nothing on the mixer side
//! allocates: the voice table is preallocated to [`MAX_VOICES`] and starts
//! beyond it are dropped.
//!
//! Signal flow
//! - crossfade inputs `a`/`b` → equal-power crossfade driven by a slow LFO →
//!   one-pole low-pass → drone bus gain
//! - instrument voices → instrument bus gain
//! - both buses summed to mono
//!
//! Voices start at their absolute transport time, so commands only need to
//! arrive ahead of time (hosts advance the transport with a lookahead).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use drift_core::dsp::{db_to_lin, kill_denormals, read_linear};
use drift_core::filters::OnePoleLP;
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use tracing::{trace, warn};

use crate::config::DriftConfig;
use crate::graph::Generator;
use crate::nodes::{EqualPower, Lfo};
use crate::sink::{ChannelTag, Voice, VoiceId, VoiceSink};

/// Commands in flight between the control thread and the mixer.
pub const COMMAND_QUEUE_SIZE: usize = 1024;
/// Voices the mixer can hold at once (playing or waiting to start).
pub const MAX_VOICES: usize = 256;

#[derive(Clone, Debug)]
pub enum SinkCommand {
    Start { id: VoiceId, voice: Voice, at: f64 },
    Stop { id: VoiceId, fade_out: f64 },
    Crossfade { rate_hz: f32, phase_deg: f32 },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MixSettings {
    pub crossfade_rate_hz: f32,
    pub crossfade_phase_deg: f32,
    pub drone_lowpass_hz: f32,
    pub drone_gain_db: f32,
    pub instrument_gain_db: f32,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            crossfade_rate_hz: 0.0075,
            crossfade_phase_deg: 90.0,
            drone_lowpass_hz: 500.0,
            drone_gain_db: -7.0,
            instrument_gain_db: 0.0,
        }
    }
}

impl MixSettings {
    pub fn from_config(config: &DriftConfig) -> Self {
        let d = &config.drone;
        Self {
            crossfade_rate_hz: 0.5 * (d.crossfade_rate_min + d.crossfade_rate_max),
            crossfade_phase_deg: d.crossfade_phase_deg,
            drone_lowpass_hz: d.bus_lowpass_hz,
            drone_gain_db: d.bus_gain_db,
            ..Self::default()
        }
    }
}

/// Control-thread half.
pub struct MixerSink {
    tx: Producer<SinkCommand>,
    capacity: usize,
}

impl MixerSink {
    fn send(&mut self, cmd: SinkCommand) {
        if self.tx.is_abandoned() {
            trace!("mixer dropped, command discarded");
            return;
        }
        if let Err(PushError::Full(_)) = self.tx.push(cmd) {
            warn!(capacity = self.capacity, "mixer command queue full, command dropped");
        }
    }
}

impl VoiceSink for MixerSink {
    fn start(&mut self, id: VoiceId, voice: &Voice, at: f64) {
        self.send(SinkCommand::Start { id, voice: voice.clone(), at });
    }

    fn stop(&mut self, id: VoiceId, fade_out: f64) {
        self.send(SinkCommand::Stop { id, fade_out });
    }

    fn configure_crossfade(&mut self, rate_hz: f32, phase_deg: f32) {
        self.send(SinkCommand::Crossfade { rate_hz, phase_deg });
    }
}

struct Playing {
    id: VoiceId,
    voice: Voice,
    at: f64,
    /// (release start, release length), transport seconds.
    release: Option<(f64, f64)>,
}

impl Playing {
    /// Sample at transport time `t`; `None` once finished.
    #[inline]
    fn sample(&self, t: f64) -> Option<f32> {
        let local = t - self.at;
        if local < 0.0 {
            return Some(0.0);
        }
        if local >= self.voice.duration {
            return None;
        }
        let mut gain = self.voice.fade.gain_at(local);
        if let Some((from, len)) = self.release {
            let k = 1.0 - (t - from) / len;
            if k <= 0.0 {
                return None;
            }
            gain *= k as f32;
        }
        let buffer = &self.voice.buffer;
        let pos = (self.voice.offset + local * self.voice.playback_rate) * f64::from(buffer.sample_rate());
        Some(read_linear(buffer.samples(), pos) * gain)
    }
}

/// Audio-thread half.
pub struct Mixer {
    rx: Consumer<SinkCommand>,
    sr: f32,
    frame: u64,
    position: Arc<AtomicU64>,
    voices: Vec<Playing>,
    lfo: Lfo,
    lp: OnePoleLP,
    drone_gain: f32,
    instrument_gain: f32,
    dropped_starts: u64,
}

/// Create a connected sink/mixer pair.
pub fn channel(sr: f32, settings: MixSettings) -> (MixerSink, Mixer) {
    channel_with_capacity(sr, settings, COMMAND_QUEUE_SIZE)
}

/// [`channel`] with an explicit command queue size.
pub fn channel_with_capacity(sr: f32, settings: MixSettings, commands: usize) -> (MixerSink, Mixer) {
    let capacity = commands.max(1);
    let (tx, rx) = RingBuffer::<SinkCommand>::new(capacity);
    let mut lfo = Lfo::sine(settings.crossfade_rate_hz);
    lfo.set_phase_deg(settings.crossfade_phase_deg);
    let mixer = Mixer {
        rx,
        sr,
        frame: 0,
        position: Arc::new(AtomicU64::new(0)),
        voices: Vec::with_capacity(MAX_VOICES),
        lfo,
        lp: OnePoleLP::new(settings.drone_lowpass_hz, sr),
        drone_gain: db_to_lin(settings.drone_gain_db),
        instrument_gain: db_to_lin(settings.instrument_gain_db),
        dropped_starts: 0,
    };
    (MixerSink { tx, capacity }, mixer)
}

impl Mixer {
    /// Frames produced so far, readable from other threads.
    pub fn position(&self) -> Arc<AtomicU64> { Arc::clone(&self.position) }

    /// Current playback time, seconds.
    #[inline] pub fn now(&self) -> f64 { self.frame as f64 / f64::from(self.sr) }

    /// Voices started or waiting to start.
    #[inline] pub fn active_voices(&self) -> usize { self.voices.len() }

    /// Starts discarded because the voice table was full.
    #[inline] pub fn dropped_starts(&self) -> u64 { self.dropped_starts }

    fn drain(&mut self) {
        while let Ok(cmd) = self.rx.pop() {
            match cmd {
                SinkCommand::Start { id, voice, at } => {
                    if self.voices.len() < MAX_VOICES {
                        self.voices.push(Playing { id, voice, at, release: None });
                    } else {
                        self.dropped_starts += 1;
                    }
                }
                SinkCommand::Stop { id, fade_out } => {
                    let now = self.now();
                    if fade_out <= 0.0 {
                        self.voices.retain(|p| p.id != id);
                    } else if let Some(p) = self.voices.iter_mut().find(|p| p.id == id) {
                        p.release = Some((now, fade_out));
                    }
                }
                SinkCommand::Crossfade { rate_hz, phase_deg } => {
                    self.lfo.set_rate(rate_hz);
                    self.lfo.set_phase_deg(phase_deg);
                }
            }
        }
    }
}

impl Generator for Mixer {
    fn reset(&mut self, sr: f32) {
        self.sr = sr.max(1.0);
        self.lp.set_sample_rate(self.sr);
    }

    fn next(&mut self) -> f32 {
        self.drain();
        let t = self.now();
        let (mut a, mut b, mut inst) = (0.0_f32, 0.0_f32, 0.0_f32);
        self.voices.retain(|p| match p.sample(t) {
            Some(s) => {
                match p.voice.channel {
                    ChannelTag::CrossfadeA => a += s,
                    ChannelTag::CrossfadeB => b += s,
                    ChannelTag::Instrument => inst += s,
                }
                true
            }
            None => false,
        });

        let (ga, gb) = EqualPower::gains(self.lfo.next01(self.sr));
        let drone = self.lp.process(a * ga + b * gb) * self.drone_gain;
        self.frame += 1;
        self.position.store(self.frame, Ordering::Relaxed);
        kill_denormals(drone + inst * self.instrument_gain)
    }
}
