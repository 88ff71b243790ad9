//! In-flight voice bookkeeping.
//!
//! A voice enters the registry when a scheduler triggers it and leaves exactly
//! once: either its natural-end callback fires or [`VoiceRegistry::stop_all`]
//! force-stops it. Whichever happens second finds the id gone and does
//! nothing. All access happens from transport callbacks or the deactivation
//! path on the same thread, hence `Rc<RefCell<_>>` rather than a lock.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use crate::clock::TransportClock;
use crate::sink::{ChannelTag, SharedSink, Voice, VoiceId, VoiceSink};

pub type SharedRegistry = Rc<RefCell<VoiceRegistry>>;

#[derive(Debug, Default)]
pub struct VoiceRegistry {
    next_id: u64,
    active: BTreeMap<VoiceId, ChannelTag>,
}

impl VoiceRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn shared() -> SharedRegistry { Rc::new(RefCell::new(Self::new())) }

    /// Track a new voice under a fresh id.
    pub fn register(&mut self, voice: &Voice) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.active.insert(id, voice.channel);
        id
    }

    /// Forget a voice. Returns `false` when it was already gone.
    pub fn unregister(&mut self, id: VoiceId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stop every registered voice with zero fade-out and forget it.
    /// Returns how many voices were stopped.
    pub fn stop_all(&mut self, sink: &mut dyn VoiceSink) -> usize {
        let stopped = std::mem::take(&mut self.active);
        for id in stopped.keys() {
            sink.stop(*id, 0.0);
        }
        if !stopped.is_empty() {
            debug!(count = stopped.len(), "force-stopped voices");
        }
        stopped.len()
    }

    #[inline] pub fn len(&self) -> usize { self.active.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.active.is_empty() }
    #[inline] pub fn contains(&self, id: VoiceId) -> bool { self.active.contains_key(&id) }

    pub fn ids(&self) -> impl Iterator<Item = VoiceId> + '_ {
        self.active.keys().copied()
    }
}

/// Register `voice`, start it `delay` seconds from now, and schedule its
/// natural-end unregistration.
pub fn launch_voice(
    clock: &mut dyn TransportClock,
    registry: &SharedRegistry,
    sink: &SharedSink,
    voice: Voice,
    delay: f64,
) -> VoiceId {
    let id = registry.borrow_mut().register(&voice);
    let at = clock.now() + delay.max(0.0);
    sink.borrow_mut().start(id, &voice, at);
    debug!(voice = id.raw(), at, rate = voice.playback_rate, duration = voice.duration, channel = ?voice.channel, "voice started");

    let registry = registry.clone();
    clock.schedule_once(
        Box::new(move |_| {
            if registry.borrow_mut().unregister(id) {
                debug!(voice = id.raw(), "voice ended");
            }
        }),
        delay.max(0.0) + voice.duration,
    );
    id
}
