//! Per-cycle chord trigger decisions.
//!
//! Each repetition of a chord voice walks integer beats starting at 1. A beat
//! fires with a base probability, boosted when the beat lands one past a
//! multiple of an accent divisor (downbeats, quarter boundaries). Fired beats
//! take a note from a pool without replacement until the cycle's target count
//! is reached. A chord voice may also owe a mandatory first trigger, which
//! forces the very first beat it walks to fire.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::pitch::{ChordQuality, Pitch};

/// Beats walked before a cycle gives up. Validated rules keep a positive
/// base probability, so this only bounds zero-probability rules.
pub const BEAT_LIMIT: u32 = 10_000;

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Accent {
    pub divisor: u32,
    pub bonus: f64,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TriggerRules {
    pub base_probability: f64,
    pub accents: Vec<Accent>,
}

impl Default for TriggerRules {
    fn default() -> Self {
        Self {
            base_probability: 0.1,
            accents: vec![Accent { divisor: 4, bonus: 0.1 }, Accent { divisor: 2, bonus: 0.1 }],
        }
    }
}

impl TriggerRules {
    /// Probability that `beat` fires.
    pub fn probability(&self, beat: u32) -> f64 {
        self.accents
            .iter()
            .filter(|a| a.divisor != 0 && beat % a.divisor == 1)
            .fold(self.base_probability, |p, a| p + a.bonus)
    }
}

/// Notes not yet triggered this cycle, kept as a shuffled arena so drawing
/// without replacement is a pop.
#[derive(Clone, Debug, Default)]
pub struct NotePool {
    remaining: Vec<Pitch>,
}

impl NotePool {
    pub fn shuffled<R: Rng + ?Sized>(notes: &[Pitch], rng: &mut R) -> Self {
        let mut remaining = notes.to_vec();
        remaining.shuffle(rng);
        Self { remaining }
    }

    /// Next note, uniformly among those left. `None` once empty.
    #[inline]
    pub fn draw(&mut self) -> Option<Pitch> { self.remaining.pop() }

    #[inline] pub fn len(&self) -> usize { self.remaining.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.remaining.is_empty() }
    #[inline] pub fn remaining(&self) -> &[Pitch] { &self.remaining }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    /// Beat index within the cycle, counted from 1; the scheduler plays it
    /// this many seconds after the cycle starts.
    pub beat: u32,
    pub note: Pitch,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CyclePlan {
    pub target: usize,
    pub triggers: Vec<Trigger>,
}

impl CyclePlan {
    #[inline] pub fn fired(&self) -> bool { !self.triggers.is_empty() }
}

/// Walk beats for one cycle, drawing from `pool`.
///
/// The loop runs until `target` notes fired and, when `mandatory_pending`,
/// until something fired. Forcing stops as soon as the pool is empty: an
/// empty pool under a pending mandatory trigger is a no-op.
pub fn plan_cycle<R: Rng + ?Sized>(
    rng: &mut R,
    pool: &mut NotePool,
    rules: &TriggerRules,
    mandatory_pending: bool,
) -> CyclePlan {
    let target = rng.gen_range(0..=pool.len());
    let mut plan = CyclePlan { target, triggers: Vec::with_capacity(target.max(1)) };
    let mut forcing = mandatory_pending;
    let mut beat = 1_u32;

    while beat <= BEAT_LIMIT && (plan.triggers.len() < target || (forcing && !pool.is_empty())) {
        let hit = rng.gen::<f64>() < rules.probability(beat);
        if hit || forcing {
            match pool.draw() {
                Some(note) => {
                    plan.triggers.push(Trigger { beat, note });
                    forcing = false;
                }
                None => break,
            }
        }
        beat += 1;
    }
    plan
}

/// State of one chord voice across its repetitions.
#[derive(Clone, Debug)]
pub struct ChordCycleState {
    tonic: Pitch,
    quality: ChordQuality,
    period: f64,
    pool: NotePool,
    mandatory_first_trigger: bool,
    has_fired: bool,
    cycles: u64,
}

impl ChordCycleState {
    pub fn new(tonic: Pitch, period: f64, mandatory_first_trigger: bool) -> Self {
        Self {
            tonic,
            quality: ChordQuality::MinorSeventh,
            period,
            pool: NotePool::default(),
            mandatory_first_trigger,
            has_fired: false,
            cycles: 0,
        }
    }

    #[inline] pub fn tonic(&self) -> Pitch { self.tonic }
    #[inline] pub fn period(&self) -> f64 { self.period }
    #[inline] pub fn cycles(&self) -> u64 { self.cycles }
    #[inline] pub fn pool(&self) -> &NotePool { &self.pool }

    /// Whether the forced first trigger is still owed.
    #[inline]
    pub fn mandatory_pending(&self) -> bool {
        self.mandatory_first_trigger && !self.has_fired
    }

    /// Reset the pool to the full chord and plan the cycle.
    pub fn begin_cycle<R: Rng + ?Sized>(&mut self, rng: &mut R, rules: &TriggerRules) -> CyclePlan {
        let notes = self.quality.notes(self.tonic);
        self.pool = NotePool::shuffled(&notes, rng);
        let pending = self.mandatory_pending();
        let plan = plan_cycle(rng, &mut self.pool, rules, pending);
        self.has_fired |= plan.fired();
        self.cycles += 1;
        plan
    }
}
