//! Repeating chord-trigger voices.
//!
//! A [`ChordScheduler`] owns one [`ChordCycleState`] and a transport repeat.
//! Every period, starting immediately, it resets the note pool, plans the
//! cycle with [`drift_core::chord`] and hands each planned note to its
//! [`NoteTrigger`] at the planned beat offset (one beat = one second).

use std::cell::{Cell, RefCell};
use std::ops::ControlFlow;
use std::rc::Rc;

use drift_core::chord::{ChordCycleState, TriggerRules};
use drift_core::pitch::Pitch;
use tracing::{debug, info, trace};

use crate::clock::{CancelToken, EventId, TransportClock};
use crate::SharedRng;

/// Something that can sound a note.
pub trait NoteTrigger {
    /// Sound `note` `delay` seconds from now.
    fn trigger(&self, clock: &mut dyn TransportClock, note: Pitch, delay: f64);
}

struct ChordVoice {
    state: RefCell<ChordCycleState>,
    rules: TriggerRules,
    rng: SharedRng,
    instrument: Rc<dyn NoteTrigger>,
    cancel: CancelToken,
    repeat: Cell<Option<EventId>>,
    fired: Cell<u64>,
}

#[derive(Clone)]
pub struct ChordScheduler {
    voice: Rc<ChordVoice>,
}

impl ChordScheduler {
    pub fn new(
        tonic: Pitch,
        period: f64,
        mandatory_first_trigger: bool,
        rules: TriggerRules,
        rng: SharedRng,
        instrument: Rc<dyn NoteTrigger>,
    ) -> Self {
        Self {
            voice: Rc::new(ChordVoice {
                state: RefCell::new(ChordCycleState::new(tonic, period, mandatory_first_trigger)),
                rules,
                rng,
                instrument,
                cancel: CancelToken::new(),
                repeat: Cell::new(None),
                fired: Cell::new(0),
            }),
        }
    }

    /// Register the repeat; the first cycle runs at the current time.
    pub fn start(&self, clock: &mut dyn TransportClock) -> EventId {
        let (tonic, period, mandatory) = {
            let state = self.voice.state.borrow();
            (state.tonic(), state.period(), state.mandatory_pending())
        };
        info!(%tonic, period, mandatory, "chord voice started");
        let voice = Rc::clone(&self.voice);
        let id = clock.schedule_repeat(Box::new(move |clock| run_cycle(&voice, clock)), period, clock.now());
        self.voice.repeat.set(Some(id));
        id
    }

    /// Cancel and clear the repeat.
    pub fn stop(&self, clock: &mut dyn TransportClock) {
        self.voice.cancel.cancel();
        if let Some(id) = self.voice.repeat.take() {
            clock.clear(id);
        }
        info!(tonic = %self.tonic(), cycles = self.cycles(), notes = self.notes_fired(), "chord voice stopped");
    }

    #[inline] pub fn cancel_token(&self) -> CancelToken { self.voice.cancel.clone() }
    #[inline] pub fn tonic(&self) -> Pitch { self.voice.state.borrow().tonic() }
    #[inline] pub fn cycles(&self) -> u64 { self.voice.state.borrow().cycles() }
    #[inline] pub fn notes_fired(&self) -> u64 { self.voice.fired.get() }
    #[inline] pub fn mandatory_pending(&self) -> bool { self.voice.state.borrow().mandatory_pending() }
}

fn run_cycle(voice: &ChordVoice, clock: &mut dyn TransportClock) -> ControlFlow<()> {
    if voice.cancel.is_cancelled() {
        return ControlFlow::Break(());
    }
    let plan = voice.state.borrow_mut().begin_cycle(&mut *voice.rng.borrow_mut(), &voice.rules);
    debug!(target_count = plan.target, fired = plan.triggers.len(), "chord cycle planned");
    for t in &plan.triggers {
        trace!(beat = t.beat, note = %t.note, p = voice.rules.probability(t.beat), "note triggered");
        voice.instrument.trigger(clock, t.note, f64::from(t.beat));
    }
    voice.fired.set(voice.fired.get() + plan.triggers.len() as u64);
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Transport;
    use drift_core::chord::Accent;
    use drift_core::pitch::ChordQuality;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, HashSet};

    /// Remembers (cycle start, sounding time, note).
    #[derive(Default)]
    struct Ledger(RefCell<Vec<(f64, f64, Pitch)>>);

    impl NoteTrigger for Ledger {
        fn trigger(&self, clock: &mut dyn TransportClock, note: Pitch, delay: f64) {
            self.0.borrow_mut().push((clock.now(), clock.now() + delay, note));
        }
    }

    fn f4() -> Pitch { "F4".parse().unwrap() }

    fn scheduler(mandatory: bool, rules: TriggerRules, seed: u64) -> (ChordScheduler, Rc<Ledger>) {
        let ledger = Rc::new(Ledger::default());
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(seed)));
        let s = ChordScheduler::new(f4(), 22.0, mandatory, rules, rng, ledger.clone());
        (s, ledger)
    }

    #[test]
    fn cycles_repeat_every_period_from_now() {
        let (chord, ledger) = scheduler(false, TriggerRules::default(), 1);
        let mut clock = Transport::new();
        clock.advance_to(3.0);
        chord.start(&mut clock);
        clock.advance_to(3.0 + 22.0 * 4.0);
        assert_eq!(chord.cycles(), 5);
        let starts: HashSet<u64> = ledger.0.borrow().iter().map(|(c, _, _)| *c as u64).collect();
        assert!(starts.iter().all(|c| (c - 3) % 22 == 0));
    }

    #[test]
    fn notes_never_repeat_within_a_cycle_and_come_from_the_chord() {
        let chord_notes: HashSet<Pitch> = ChordQuality::MinorSeventh.notes(f4()).into_iter().collect();
        for seed in 0..50 {
            let (chord, ledger) = scheduler(seed % 2 == 0, TriggerRules::default(), seed);
            let mut clock = Transport::new();
            chord.start(&mut clock);
            clock.advance_to(22.0 * 10.0);

            let mut per_cycle: BTreeMap<u64, Vec<Pitch>> = BTreeMap::new();
            for (cycle_start, _, note) in ledger.0.borrow().iter() {
                per_cycle.entry(*cycle_start as u64).or_default().push(*note);
            }
            for notes in per_cycle.values() {
                let unique: HashSet<_> = notes.iter().collect();
                assert_eq!(unique.len(), notes.len());
                assert!(notes.iter().all(|n| chord_notes.contains(n)));
            }
        }
    }

    #[test]
    fn mandatory_voice_sounds_on_the_first_beat_of_the_first_cycle() {
        let silent = TriggerRules { base_probability: 1e-9, accents: vec![] };
        for seed in 0..50 {
            let (chord, ledger) = scheduler(true, silent.clone(), seed);
            let mut clock = Transport::new();
            chord.start(&mut clock);
            clock.advance_to(0.0);
            let first = ledger.0.borrow()[0];
            assert_eq!(first.0, 0.0);
            assert_eq!(first.1, 1.0);
            assert!(!chord.mandatory_pending());
        }
    }

    #[test]
    fn mandatory_is_owed_only_once_per_activation() {
        let silent = TriggerRules { base_probability: 1e-9, accents: vec![] };
        let (chord, ledger) = scheduler(true, silent, 3);
        let mut clock = Transport::new();
        chord.start(&mut clock);
        clock.advance_to(22.0 * 5.0);
        let forced_first_beats = ledger.0.borrow().iter().filter(|(c, at, _)| at - c == 1.0).count();
        assert_eq!(forced_first_beats, 1);
    }

    #[test]
    fn certain_rules_fire_target_notes_on_consecutive_beats() {
        let certain = TriggerRules { base_probability: 1.0, accents: vec![Accent { divisor: 4, bonus: 0.1 }] };
        let (chord, ledger) = scheduler(false, certain, 8);
        let mut clock = Transport::new();
        chord.start(&mut clock);
        clock.advance_to(0.0);
        let offsets: Vec<f64> = ledger.0.borrow().iter().map(|(c, at, _)| at - c).collect();
        let expected: Vec<f64> = (1..=offsets.len()).map(|b| b as f64).collect();
        assert_eq!(offsets, expected);
        assert_eq!(chord.notes_fired(), offsets.len() as u64);
    }

    #[test]
    fn stop_ends_the_repeat() {
        let (chord, _ledger) = scheduler(false, TriggerRules::default(), 4);
        let mut clock = Transport::new();
        chord.start(&mut clock);
        clock.advance_to(30.0);
        assert_eq!(chord.cycles(), 2);
        chord.stop(&mut clock);
        clock.advance_to(500.0);
        assert_eq!(chord.cycles(), 2);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn cancelled_token_breaks_the_repeat() {
        let (chord, _ledger) = scheduler(false, TriggerRules::default(), 6);
        let mut clock = Transport::new();
        chord.start(&mut clock);
        clock.advance_to(0.0);
        chord.cancel_token().cancel();
        clock.advance_to(100.0);
        assert_eq!(chord.cycles(), 1);
        assert_eq!(clock.pending(), 0);
    }
}
