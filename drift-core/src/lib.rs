//! drift core: buffers, pitches, and the pure decision procedures behind the
//! generative schedulers.
//!
//! Features
//! - `fast-math`: polynomial sine for the slow crossfade LFO
//! - `serde`    : derive `Deserialize`/`Serialize` on parameter types
//!
//! Modules
//! - [`buffer`]    : shared, immutable sample buffers (`AudioBuffer`)
//! - [`pitch`]     : MIDI pitches, note names, minor-seventh chords
//! - [`drone`]     : variant index, playback rate and overlap-delay draws
//! - [`chord`]     : note pool and the per-cycle beat/probability walk
//! - [`dsp`]       : small math helpers (dB, interpolation, denormals)
//! - [`envelopes`] : symmetric linear fades for voices
//! - [`filters`]   : one-pole low-pass
//!
//! Design
//! - Every random decision takes an injected `rand::Rng`; nothing here reaches
//!   for a global random source, so a seeded generator reproduces a piece.
//! - No scheduling or audio side effects live here. The engine crate turns the
//!   plans produced by [`drone`] and [`chord`] into voices.

pub mod buffer;
pub mod chord;
pub mod drone;
pub mod dsp;
pub mod envelopes;
pub mod filters;
pub mod pitch;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::buffer::AudioBuffer;
    pub use crate::chord::{plan_cycle, ChordCycleState, CyclePlan, NotePool, Trigger, TriggerRules};
    pub use crate::drone::{DroneParams, DronePass, VariantIndexPolicy};
    pub use crate::dsp::{db_to_lin, kill_denormals, lerp, TAU};
    pub use crate::envelopes::Fade;
    pub use crate::filters::OnePoleLP;
    pub use crate::pitch::{ChordQuality, Pitch, PitchParseError};
}
