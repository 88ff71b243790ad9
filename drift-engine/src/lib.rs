//! drift engine: prerender cache, self-scheduling voices, transport and mixer.
//!
//! Crate layout:
//! - [`clock`]    : `TransportClock` trait and the event-queue `Transport`
//! - [`sink`]     : `Voice`, `VoiceSink` and the `RecordingSink`
//! - [`registry`] : in-flight voice bookkeeping and `launch_voice`
//! - [`library`]  : sample libraries (in-memory, WAV directory)
//! - [`render`]   : offline renderer (resample + [`reverb`])
//! - [`cache`]    : memoized rendered variants
//! - [`drone`]    : self-perpetuating drone stream
//! - [`chord`]    : repeating chord-trigger voices
//! - [`sampler`]  : prerendered note instrument
//! - [`graph`], [`nodes`], [`mixer`] : the audio side
//! - [`pieces`]   : the shipped pieces
//! - [`bounce`]   : offline render of a scheduled piece
//! - [`config`], [`error`]
//!
//! Scheduling is single-threaded: transport callbacks share state through
//! `Rc<RefCell<_>>`. Only the [`mixer::Mixer`] crosses to the audio thread.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;

pub mod bounce;
pub mod cache;
pub mod chord;
pub mod clock;
pub mod config;
pub mod drone;
pub mod error;
pub mod graph;
pub mod library;
pub mod mixer;
pub mod nodes;
pub mod pieces;
pub mod registry;
pub mod render;
pub mod reverb;
pub mod sampler;
pub mod sink;

pub use cache::{PrerenderCache, RenderedVariant};
pub use clock::{Transport, TransportClock};
pub use config::DriftConfig;
pub use error::{DriftError, Result};
pub use graph::{Engine, Generator};
pub use pieces::{ActivePiece, Piece, Schedule};

/// The random source every scheduler of one activation draws from.
pub type SharedRng = Rc<RefCell<StdRng>>;

/// Seeded when `seed` is given, from OS entropy otherwise.
pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Rc::new(RefCell::new(rng))
}
