//! Self-perpetuating drone voices.
//!
//! Each pass plays the same buffer index from two rendered groups (a dryer
//! and a wetter render of one source) at one shared, sub-unity playback rate,
//! then schedules the next pass so that it starts before the current pair has
//! finished. The result is a continuous, slowly shifting texture.
//!
//! Design
//! - Random draws live in [`drift_core::drone`]; this module only performs the
//!   side effects (voice launch, rescheduling) against the transport.
//! - The stream holds its state in an `Rc` captured by its own continuation.
//!   The continuation checks the [`CancelToken`] on entry and again before
//!   rescheduling, and [`DroneScheduler::stop`] also clears the pending event.
//! - Voices already playing are not touched here: they belong to the
//!   registry and are silenced by `stop_all`.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use drift_core::drone::DroneParams;
use drift_core::envelopes::Fade;
use tracing::{debug, info, warn};

use crate::cache::RenderedVariant;
use crate::clock::{CancelToken, EventId, TransportClock};
use crate::error::{DriftError, Result};
use crate::registry::{launch_voice, SharedRegistry};
use crate::sink::{ChannelTag, SharedSink, Voice};
use crate::SharedRng;

struct DroneStream {
    params: DroneParams,
    dryer: Arc<RenderedVariant>,
    wetter: Arc<RenderedVariant>,
    rng: SharedRng,
    registry: SharedRegistry,
    sink: SharedSink,
    cancel: CancelToken,
    pending: Cell<Option<EventId>>,
    passes: Cell<u64>,
}

/// Handle on one drone stream.
#[derive(Clone)]
pub struct DroneScheduler {
    stream: Rc<DroneStream>,
}

impl DroneScheduler {
    /// Both groups must hold at least one buffer; the pair count is the
    /// shorter of the two.
    pub fn new(
        params: DroneParams,
        dryer: Arc<RenderedVariant>,
        wetter: Arc<RenderedVariant>,
        rng: SharedRng,
        registry: SharedRegistry,
        sink: SharedSink,
    ) -> Result<Self> {
        for group in [&dryer, &wetter] {
            if group.is_empty() {
                return Err(DriftError::EmptyVariant { variant: group.name().to_string() });
            }
        }
        Ok(Self {
            stream: Rc::new(DroneStream {
                params,
                dryer,
                wetter,
                rng,
                registry,
                sink,
                cancel: CancelToken::new(),
                pending: Cell::new(None),
                passes: Cell::new(0),
            }),
        })
    }

    /// Run the first pass now.
    pub fn start(&self, clock: &mut dyn TransportClock) {
        info!(dryer = self.stream.dryer.name(), wetter = self.stream.wetter.name(), "drone stream started");
        play_once(&self.stream, clock);
    }

    /// One pass: launch a voice pair and schedule the next pass.
    pub fn play_once(&self, clock: &mut dyn TransportClock) {
        play_once(&self.stream, clock);
    }

    /// Stop rescheduling. A continuation already queued becomes a no-op.
    pub fn cancel(&self) {
        self.stream.cancel.cancel();
    }

    /// Cancel and drop the queued continuation from the transport.
    pub fn stop(&self, clock: &mut dyn TransportClock) {
        self.cancel();
        if let Some(id) = self.stream.pending.take() {
            clock.clear(id);
        }
        info!(passes = self.stream.passes.get(), "drone stream stopped");
    }

    #[inline] pub fn cancel_token(&self) -> CancelToken { self.stream.cancel.clone() }
    #[inline] pub fn is_cancelled(&self) -> bool { self.stream.cancel.is_cancelled() }

    /// Passes run so far.
    #[inline] pub fn passes(&self) -> u64 { self.stream.passes.get() }
}

fn play_once(stream: &Rc<DroneStream>, clock: &mut dyn TransportClock) {
    stream.pending.set(None);
    if stream.cancel.is_cancelled() {
        return;
    }
    let params = &stream.params;
    let pairs = stream.dryer.len().min(stream.wetter.len());
    let pass = params.draw_pass(&mut *stream.rng.borrow_mut(), pairs);
    let channel = ChannelTag::crossfade(pass.variant_index);

    // The dryer buffer's length paces the stream.
    let mut paired_seconds = None;
    for group in [&stream.dryer, &stream.wetter] {
        let Some(buffer) = group.get(pass.variant_index) else { continue };
        let buffer_seconds = buffer.duration();
        if paired_seconds.is_none() {
            paired_seconds = Some(buffer_seconds);
        }

        let window = params.voice_window(buffer_seconds, pass.playback_rate);
        if window.playback_seconds <= 0.0 {
            debug!(variant = group.name(), buffer_seconds, "buffer shorter than its trimmed edges, skipped");
            continue;
        }
        let voice = Voice {
            buffer: buffer.clone(),
            playback_rate: pass.playback_rate,
            offset: window.offset,
            duration: window.playback_seconds,
            fade: Fade::symmetric(params.fade, window.playback_seconds),
            channel,
        };
        launch_voice(clock, &stream.registry, &stream.sink, voice, params.start_delay);
    }
    stream.passes.set(stream.passes.get() + 1);

    let (delay, clamped) = params.next_delay(paired_seconds.unwrap_or(0.0), pass.playback_rate, pass.overlap_gap);
    if clamped {
        warn!(delay, rate = pass.playback_rate, gap = pass.overlap_gap, "drone reschedule delay clamped");
    }
    debug!(index = pass.variant_index, rate = pass.playback_rate, next_in = delay, "drone pass");

    if stream.cancel.is_cancelled() {
        return;
    }
    let next = Rc::clone(stream);
    let id = clock.schedule_once(Box::new(move |clock| play_once(&next, clock)), delay);
    stream.pending.set(Some(id));
}
