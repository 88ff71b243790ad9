//! Immutable, cheaply clonable mono sample buffers.
//!
//! Buffers are shared between the prerender cache, scheduled voices and the
//! audio thread, so the sample data sits behind an `Arc<[f32]>`: cloning an
//! `AudioBuffer` never copies samples, and dropping the last clone releases
//! them.

use std::sync::{Arc, Weak};

use crate::pitch::Pitch;

#[derive(Clone, Debug)]
pub struct AudioBuffer {
    sample_rate: f32,
    data: Arc<[f32]>,
    reversed: bool,
    root: Option<Pitch>,
}

impl AudioBuffer {
    pub fn from_samples(sample_rate: f32, samples: Vec<f32>) -> Self {
        Self { sample_rate: sample_rate.max(1.0), data: samples.into(), reversed: false, root: None }
    }

    /// Tag the buffer with the pitch it sounds at when played at rate 1.
    pub fn with_root(mut self, root: Pitch) -> Self {
        self.root = Some(root);
        self
    }

    /// Mark the buffer as holding time-reversed material.
    pub fn with_reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    /// A new buffer holding the samples back to front. The copy owns fresh
    /// storage; `self` is untouched.
    pub fn reversed_copy(&self) -> Self {
        let samples: Vec<f32> = self.data.iter().rev().copied().collect();
        Self { sample_rate: self.sample_rate, data: samples.into(), reversed: !self.reversed, root: self.root }
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sample_rate }
    #[inline] pub fn samples(&self) -> &[f32] { &self.data }
    #[inline] pub fn len(&self) -> usize { self.data.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.data.is_empty() }
    #[inline] pub fn is_reversed(&self) -> bool { self.reversed }
    #[inline] pub fn root(&self) -> Option<Pitch> { self.root }

    /// Length in seconds at rate 1.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / f64::from(self.sample_rate)
    }

    /// Whether two handles point at the same sample storage.
    #[inline]
    pub fn shares_storage(&self, other: &AudioBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Non-owning handle on the sample storage; upgrades fail once every
    /// clone of the buffer is gone.
    #[inline]
    pub fn downgrade(&self) -> Weak<[f32]> {
        Arc::downgrade(&self.data)
    }
}
