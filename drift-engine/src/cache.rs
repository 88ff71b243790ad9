//! Memoized offline renders of raw sample groups.
//!
//! A variant is identified by `(source group, variant name)` and is computed
//! at most once per cache: later requests get the same `Arc` back without
//! rendering or reporting progress. The cache lives as long as the process
//! (or as long as the host keeps it) and survives pause/resume cycles of the
//! pieces using it; only a full teardown evicts.
//!
//! Rendering may need inputs the raw group does not have, such as a reversed
//! copy of the first buffer. Those temporaries are created once per batch,
//! shared by every render in the batch and dropped as soon as the batch is
//! over, successful or not. The cache keeps weak handles on them, so
//! [`PrerenderCache::live_temporaries`] reports storage that is really still
//! allocated, not just a bookkeeping count.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use drift_core::buffer::AudioBuffer;
use drift_core::pitch::Pitch;
use tracing::{debug, info};

use crate::error::{DriftError, Result};
use crate::library::RawSampleSet;
use crate::render::{EffectChain, OfflineRenderer, RenderJob};

/// A derived buffer group.
#[derive(Clone, Debug)]
pub struct RenderedVariant {
    source: String,
    name: String,
    buffers: Vec<AudioBuffer>,
}

impl RenderedVariant {
    pub fn new(source: impl Into<String>, name: impl Into<String>, buffers: Vec<AudioBuffer>) -> Self {
        Self { source: source.into(), name: name.into(), buffers }
    }

    #[inline] pub fn source(&self) -> &str { &self.source }
    #[inline] pub fn name(&self) -> &str { &self.name }
    #[inline] pub fn buffers(&self) -> &[AudioBuffer] { &self.buffers }
    #[inline] pub fn len(&self) -> usize { self.buffers.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.buffers.is_empty() }
    #[inline] pub fn get(&self, index: usize) -> Option<&AudioBuffer> { self.buffers.get(index) }
}

/// Which buffers feed a render.
#[derive(Clone, Debug, PartialEq)]
pub enum InputPlan {
    /// Every buffer of the source group. With `seed_reversed`, a reversed
    /// copy of the first buffer is appended when the group has none.
    Group { seed_reversed: bool },
    /// One job per note: the source buffer with the nearest root, re-pitched
    /// to the note and cut to `length_s`.
    Notes { notes: Vec<Pitch>, length_s: f64 },
}

#[derive(Clone, Debug)]
pub struct VariantRequest {
    pub name: String,
    pub chain: EffectChain,
    pub inputs: InputPlan,
}

impl VariantRequest {
    pub fn new(name: impl Into<String>, chain: EffectChain, inputs: InputPlan) -> Self {
        Self { name: name.into(), chain, inputs }
    }
}

type VariantKey = (String, String);

type Temporaries = Rc<RefCell<Vec<Weak<[f32]>>>>;

/// Temporaries owned by one batch; released on drop.
struct Scratch {
    buffers: Vec<AudioBuffer>,
    tracked: Temporaries,
}

impl Scratch {
    fn new(tracked: Temporaries) -> Self {
        Self { buffers: Vec::new(), tracked }
    }

    fn hold(&mut self, buffer: AudioBuffer) -> AudioBuffer {
        self.tracked.borrow_mut().push(buffer.downgrade());
        self.buffers.push(buffer.clone());
        buffer
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        let released: Vec<Weak<[f32]>> = self.buffers.drain(..).map(|b| b.downgrade()).collect();
        let retained = released.iter().filter(|w| w.strong_count() > 0).count();
        debug!(count = released.len(), retained, "released temporary buffers");
    }
}

#[derive(Debug, Default)]
pub struct PrerenderCache {
    entries: HashMap<VariantKey, Arc<RenderedVariant>>,
    renders: usize,
    temporaries: Temporaries,
}

impl PrerenderCache {
    pub fn new() -> Self { Self::default() }

    /// Cached variant, if any.
    pub fn get(&self, source: &str, variant: &str) -> Option<Arc<RenderedVariant>> {
        self.entries.get(&(source.to_string(), variant.to_string())).cloned()
    }

    /// Number of renders actually performed.
    #[inline] pub fn render_count(&self) -> usize { self.renders }

    /// Temporary buffers whose storage is still allocated. 0 whenever no
    /// render is running, unless a renderer handed a temporary back as output.
    pub fn live_temporaries(&self) -> usize {
        let mut tracked = self.temporaries.borrow_mut();
        tracked.retain(|w| w.strong_count() > 0);
        tracked.len()
    }

    #[inline] pub fn len(&self) -> usize { self.entries.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Dispose of one variant. Returns whether it was cached.
    pub fn evict(&mut self, source: &str, variant: &str) -> bool {
        let removed = self.entries.remove(&(source.to_string(), variant.to_string())).is_some();
        if removed {
            debug!(source, variant, "evicted rendered variant");
        }
        removed
    }

    /// Dispose of every variant rendered from `source`. Returns how many went.
    pub fn evict_all(&mut self, source: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(src, _), _| src != source);
        let evicted = before - self.entries.len();
        debug!(source, evicted, "evicted rendered variants");
        evicted
    }

    /// Single-variant form of [`get_or_render_all`](Self::get_or_render_all).
    pub fn get_or_render(
        &mut self,
        samples: &RawSampleSet,
        source: &str,
        request: &VariantRequest,
        renderer: &dyn OfflineRenderer,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Arc<RenderedVariant>> {
        self.get_or_render_all(samples, source, std::slice::from_ref(request), renderer, progress)?
            .into_iter()
            .next()
            .ok_or_else(|| DriftError::EmptyVariant { variant: request.name.clone() })
    }

    /// Return every requested variant of `source`, rendering the missing ones.
    ///
    /// Lookup order per request: this cache, then a group named after the
    /// variant in `samples` (adopted as is), then an offline render. Progress
    /// is reported only for renders; request `k` of `n` maps its own [0,1]
    /// into `[k/n, (k+1)/n]`. A batch that renders anything always reports 0
    /// first and 1 last, even when cache hits sit at either end. The first
    /// failure aborts the batch; variants
    /// rendered before it stay cached, the failing one is never stored.
    pub fn get_or_render_all(
        &mut self,
        samples: &RawSampleSet,
        source: &str,
        requests: &[VariantRequest],
        renderer: &dyn OfflineRenderer,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<Arc<RenderedVariant>>> {
        let mut out = Vec::with_capacity(requests.len());
        let mut scratch = Scratch::new(self.temporaries.clone());
        let mut reversed_seed: Option<AudioBuffer> = None;
        let slice = 1.0 / requests.len().max(1) as f32;
        let mut last_rendered: Option<usize> = None;

        for (k, request) in requests.iter().enumerate() {
            let key = (source.to_string(), request.name.clone());
            if let Some(hit) = self.entries.get(&key) {
                debug!(source, variant = %request.name, "prerender cache hit");
                out.push(hit.clone());
                continue;
            }
            if let Some(prerendered) = samples.get(&request.name) {
                debug!(source, variant = %request.name, "adopting library prerender");
                let variant = self.store(key, prerendered.to_vec());
                out.push(variant);
                continue;
            }

            if last_rendered.is_none() && k > 0 {
                progress(0.0);
            }
            last_rendered = Some(k);
            let lo = k as f32 * slice;
            let mut report = |p: f32| progress(lo + slice * p.clamp(0.0, 1.0));
            report(0.0);

            let raw = samples.group(source)?;
            let jobs = plan_jobs(raw, request, &mut scratch, &mut reversed_seed)?;
            info!(source, variant = %request.name, jobs = jobs.len(), wetness = request.chain.wetness, "rendering variant");

            let buffers = renderer.render(&jobs, &request.chain, &mut report).map_err(|e| match e {
                DriftError::RenderFailure { reason, .. } => DriftError::render(&request.name, reason),
                other => DriftError::render(&request.name, other.to_string()),
            })?;
            if buffers.len() != jobs.len() {
                return Err(DriftError::render(
                    &request.name,
                    format!("renderer returned {} buffers for {} jobs", buffers.len(), jobs.len()),
                ));
            }
            report(1.0);
            self.renders += 1;
            out.push(self.store(key, buffers));
        }
        if last_rendered.is_some_and(|k| k + 1 < requests.len()) {
            progress(1.0);
        }
        Ok(out)
    }

    fn store(&mut self, key: VariantKey, buffers: Vec<AudioBuffer>) -> Arc<RenderedVariant> {
        let variant = Arc::new(RenderedVariant::new(key.0.clone(), key.1.clone(), buffers));
        self.entries.insert(key, variant.clone());
        variant
    }
}

fn plan_jobs(
    raw: &[AudioBuffer],
    request: &VariantRequest,
    scratch: &mut Scratch,
    reversed_seed: &mut Option<AudioBuffer>,
) -> Result<Vec<RenderJob>> {
    if raw.is_empty() {
        return Err(DriftError::render(&request.name, "source group is empty"));
    }
    match &request.inputs {
        InputPlan::Group { seed_reversed } => {
            let mut jobs: Vec<RenderJob> = raw.iter().cloned().map(RenderJob::plain).collect();
            if *seed_reversed && !raw.iter().any(AudioBuffer::is_reversed) {
                let seed = reversed_seed.get_or_insert_with(|| scratch.hold(raw[0].reversed_copy()));
                jobs.push(RenderJob::plain(seed.clone()));
            }
            Ok(jobs)
        }
        InputPlan::Notes { notes, length_s } => notes
            .iter()
            .map(|note| {
                let (buffer, root) = nearest_root(raw, *note)
                    .ok_or_else(|| DriftError::render(&request.name, "source group has no pitched samples"))?;
                Ok(RenderJob {
                    source: buffer.clone(),
                    playback_rate: root.ratio_to(*note),
                    length_s: Some(*length_s),
                    root: Some(*note),
                })
            })
            .collect(),
    }
}

/// Buffer whose root is closest to `note` (first wins on ties).
pub(crate) fn nearest_root(buffers: &[AudioBuffer], note: Pitch) -> Option<(&AudioBuffer, Pitch)> {
    buffers
        .iter()
        .filter_map(|b| b.root().map(|r| (b, r)))
        .min_by_key(|(_, r)| (i16::from(r.midi()) - i16::from(note.midi())).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Copying renderer that records what it was asked to render. With
    /// `alias` it hands the input storage back instead of copying.
    #[derive(Default)]
    struct FakeRenderer {
        calls: Cell<usize>,
        inputs: RefCell<Vec<Vec<RenderJob>>>,
        fail: bool,
        alias: bool,
    }

    impl FakeRenderer {
        /// Drop the recorded jobs (and the buffers they hold).
        fn forget(&self) {
            self.inputs.borrow_mut().clear();
        }
    }

    impl OfflineRenderer for FakeRenderer {
        fn render(&self, jobs: &[RenderJob], _chain: &EffectChain, progress: &mut dyn FnMut(f32)) -> Result<Vec<AudioBuffer>> {
            self.calls.set(self.calls.get() + 1);
            self.inputs.borrow_mut().push(jobs.to_vec());
            progress(0.5);
            if self.fail {
                return Err(DriftError::render("", "reverb exploded"));
            }
            Ok(jobs
                .iter()
                .map(|j| {
                    if self.alias {
                        j.source.clone()
                    } else {
                        let copy = AudioBuffer::from_samples(j.source.sample_rate(), j.source.samples().to_vec())
                            .with_reversed(j.source.is_reversed());
                        match j.root.or(j.source.root()) {
                            Some(root) => copy.with_root(root),
                            None => copy,
                        }
                    }
                })
                .collect())
        }
    }

    fn whale() -> AudioBuffer {
        AudioBuffer::from_samples(1_000.0, (0..2_000).map(|i| (i as f32 * 0.01).sin()).collect())
    }

    fn whales() -> RawSampleSet {
        RawSampleSet::new().with("whales", vec![whale()])
    }

    fn drone_request(name: &str, wet: f32) -> VariantRequest {
        VariantRequest::new(name, EffectChain::reverb(wet, 30.0), InputPlan::Group { seed_reversed: true })
    }

    #[test]
    fn renders_each_variant_once_with_reversed_seed() {
        let samples = whales();
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        let dryer = drone_request("whales-dryer", 0.5);
        let wetter = drone_request("whales-wetter", 0.9);

        let a = cache.get_or_render(&samples, "whales", &dryer, &renderer, &mut |_| {}).unwrap();
        let b = cache.get_or_render(&samples, "whales", &wetter, &renderer, &mut |_| {}).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(!a.buffers()[0].is_reversed());
        assert!(a.buffers()[1].is_reversed());
        assert_eq!(renderer.calls.get(), 2);

        let mut events = 0;
        let a2 = cache.get_or_render(&samples, "whales", &dryer, &renderer, &mut |_| events += 1).unwrap();
        let b2 = cache.get_or_render(&samples, "whales", &wetter, &renderer, &mut |_| events += 1).unwrap();
        assert_eq!(renderer.calls.get(), 2);
        assert_eq!(cache.render_count(), 2);
        assert_eq!(events, 0);
        assert!(Arc::ptr_eq(&a, &a2));
        assert!(Arc::ptr_eq(&b, &b2));
        renderer.forget();
        assert_eq!(cache.live_temporaries(), 0);
    }

    #[test]
    fn batch_shares_one_temporary_and_releases_it() {
        let samples = whales();
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        let requests = [drone_request("dryer", 0.5), drone_request("wetter", 0.9)];
        let variants = cache.get_or_render_all(&samples, "whales", &requests, &renderer, &mut |_| {}).unwrap();
        assert_eq!(variants.len(), 2);

        let seed = {
            let inputs = renderer.inputs.borrow();
            assert!(inputs[0][1].source.shares_storage(&inputs[1][1].source));
            inputs[0][1].source.downgrade()
        };
        assert!(variants.iter().all(|v| !v.buffers()[1].shares_storage(&renderer.inputs.borrow()[0][1].source)));
        assert_eq!(cache.live_temporaries(), 1);

        renderer.forget();
        assert!(seed.upgrade().is_none());
        assert_eq!(cache.live_temporaries(), 0);
    }

    #[test]
    fn aliased_temporary_is_reported_while_the_cache_holds_it() {
        let samples = whales();
        let renderer = FakeRenderer { alias: true, ..FakeRenderer::default() };
        let mut cache = PrerenderCache::new();
        let variant = cache.get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &renderer, &mut |_| {}).unwrap();
        renderer.forget();
        let seed = variant.buffers()[1].downgrade();
        drop(variant);
        assert_eq!(cache.live_temporaries(), 1);

        cache.evict("whales", "dryer");
        assert!(seed.upgrade().is_none());
        assert_eq!(cache.live_temporaries(), 0);
    }

    #[test]
    fn no_seed_when_group_already_has_reversed_material() {
        let samples = RawSampleSet::new().with("whales", vec![whale(), whale().reversed_copy()]);
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        let v = cache.get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &renderer, &mut |_| {}).unwrap();
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn progress_spans_zero_to_one_in_order() {
        let samples = whales();
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        let requests = [drone_request("dryer", 0.5), drone_request("wetter", 0.9)];
        let mut seen = Vec::new();
        cache.get_or_render_all(&samples, "whales", &requests, &renderer, &mut |p| seen.push(p)).unwrap();
        assert_eq!(seen, vec![0.0, 0.25, 0.5, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn progress_starts_at_zero_and_ends_at_one_around_cache_hits() {
        let samples = whales();
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        cache.get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &renderer, &mut |_| {}).unwrap();

        let mut seen = Vec::new();
        let requests = [drone_request("dryer", 0.5), drone_request("wetter", 0.9)];
        cache.get_or_render_all(&samples, "whales", &requests, &renderer, &mut |p| seen.push(p)).unwrap();
        assert_eq!(seen, vec![0.0, 0.5, 0.75, 1.0]);

        seen.clear();
        let requests = [drone_request("wettest", 1.0), drone_request("dryer", 0.5)];
        cache.get_or_render_all(&samples, "whales", &requests, &renderer, &mut |p| seen.push(p)).unwrap();
        assert_eq!(seen, vec![0.0, 0.25, 0.5, 1.0]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn failed_render_leaves_no_entry() {
        let samples = whales();
        let mut cache = PrerenderCache::new();
        let broken = FakeRenderer { fail: true, ..FakeRenderer::default() };
        let err = cache
            .get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &broken, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, DriftError::RenderFailure { ref variant, .. } if variant == "dryer"));
        assert!(cache.get("whales", "dryer").is_none());
        let seed = broken.inputs.borrow()[0][1].source.downgrade();
        broken.forget();
        assert!(seed.upgrade().is_none());
        assert_eq!(cache.live_temporaries(), 0);

        let working = FakeRenderer::default();
        cache.get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &working, &mut |_| {}).unwrap();
        assert_eq!(working.calls.get(), 1);
    }

    #[test]
    fn missing_source_group_is_reported() {
        let mut cache = PrerenderCache::new();
        let err = cache
            .get_or_render(&RawSampleSet::new(), "whales", &drone_request("dryer", 0.5), &FakeRenderer::default(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, DriftError::MissingSample { .. }));
    }

    #[test]
    fn library_prerender_is_adopted_without_rendering() {
        let samples = whales().with("dryer", vec![whale(), whale().reversed_copy()]);
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        let v = cache.get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &renderer, &mut |_| {}).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(renderer.calls.get(), 0);
        assert!(cache.get("whales", "dryer").is_some());
    }

    #[test]
    fn note_plan_repitches_nearest_root() {
        let c5: Pitch = "C5".parse().unwrap();
        let g5: Pitch = "G5".parse().unwrap();
        let samples = RawSampleSet::new().with("glock", vec![whale().with_root(c5), whale().with_root(g5)]);
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        let notes: Vec<Pitch> = ["D5", "F5"].iter().map(|n| n.parse().unwrap()).collect();
        let request = VariantRequest::new(
            "bells",
            EffectChain::reverb(0.9, 4.0),
            InputPlan::Notes { notes: notes.clone(), length_s: 3.0 },
        );
        cache.get_or_render(&samples, "glock", &request, &renderer, &mut |_| {}).unwrap();
        let inputs = renderer.inputs.borrow();
        assert_eq!(inputs[0][0].source.root(), Some(c5));
        assert!((inputs[0][0].playback_rate - c5.ratio_to(notes[0])).abs() < 1e-12);
        assert_eq!(inputs[0][1].source.root(), Some(g5));
        assert_eq!(inputs[0][1].root, Some(notes[1]));
        assert_eq!(inputs[0][1].length_s, Some(3.0));
    }

    #[test]
    fn evict_disposes_variant() {
        let samples = whales();
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        cache.get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &renderer, &mut |_| {}).unwrap();
        assert!(cache.evict("whales", "dryer"));
        assert!(!cache.evict("whales", "dryer"));
        assert!(cache.is_empty());
        cache.get_or_render(&samples, "whales", &drone_request("dryer", 0.5), &renderer, &mut |_| {}).unwrap();
        assert_eq!(renderer.calls.get(), 2);
    }

    #[test]
    fn evict_all_only_touches_one_source() {
        let samples = whales().with("other", vec![whale()]);
        let renderer = FakeRenderer::default();
        let mut cache = PrerenderCache::new();
        let requests = [drone_request("dryer", 0.5), drone_request("wetter", 0.9)];
        cache.get_or_render_all(&samples, "whales", &requests, &renderer, &mut |_| {}).unwrap();
        cache.get_or_render(&samples, "other", &drone_request("dryer", 0.5), &renderer, &mut |_| {}).unwrap();
        assert_eq!(cache.evict_all("whales"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("other", "dryer").is_some());
    }
}
