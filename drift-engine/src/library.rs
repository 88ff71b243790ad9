//! Sample libraries: where raw sample groups come from.
//!
//! A piece asks for the groups named in its manifest and gets back a
//! [`RawSampleSet`]. A library may also carry already-rendered variants under
//! the variant's own name; pieces look those up with [`SampleLibrary::find`]
//! so the prerender cache can adopt them instead of rendering.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use drift_core::buffer::AudioBuffer;
use drift_core::pitch::Pitch;
use tracing::{debug, warn};

use crate::error::{DriftError, Result};

/// Named groups of raw buffers, immutable once fetched.
#[derive(Clone, Debug, Default)]
pub struct RawSampleSet {
    groups: BTreeMap<String, Vec<AudioBuffer>>,
}

impl RawSampleSet {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, name: impl Into<String>, buffers: Vec<AudioBuffer>) {
        self.groups.insert(name.into(), buffers);
    }

    pub fn with(mut self, name: impl Into<String>, buffers: Vec<AudioBuffer>) -> Self {
        self.insert(name, buffers);
        self
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&[AudioBuffer]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Like [`get`](Self::get) but a missing group is an error.
    pub fn group(&self, name: &str) -> Result<&[AudioBuffer]> {
        self.get(name).ok_or_else(|| DriftError::missing(name))
    }

    #[inline] pub fn contains(&self, name: &str) -> bool { self.groups.contains_key(name) }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups.keys().map(String::as_str)
    }
}

pub trait SampleLibrary {
    /// Fetch every named group. Any absent name fails the whole request.
    fn request(&self, names: &[&str]) -> Result<RawSampleSet>;

    /// Optional lookup for a group that may or may not exist (prerendered
    /// variants shipped with the library).
    fn find(&self, _name: &str) -> Option<Vec<AudioBuffer>> {
        None
    }
}

/// Library backed by buffers already in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryLibrary {
    groups: BTreeMap<String, Vec<AudioBuffer>>,
}

impl MemoryLibrary {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: impl Into<String>, buffers: Vec<AudioBuffer>) -> Self {
        self.groups.insert(name.into(), buffers);
        self
    }
}

impl SampleLibrary for MemoryLibrary {
    fn request(&self, names: &[&str]) -> Result<RawSampleSet> {
        let mut set = RawSampleSet::new();
        for name in names {
            let group = self.groups.get(*name).ok_or_else(|| DriftError::missing(*name))?;
            set.insert(*name, group.clone());
        }
        Ok(set)
    }

    fn find(&self, name: &str) -> Option<Vec<AudioBuffer>> {
        self.groups.get(name).cloned()
    }
}

/// Library reading WAV files from a directory.
///
/// A group `name` is either the directory `<root>/<name>/` (every `.wav`
/// inside, sorted by file name) or the single file `<root>/<name>.wav`.
/// Files whose stem is a note name (`C5.wav`, `G#4.wav`) are tagged with that
/// root pitch. Multi-channel files are folded to mono.
#[derive(Clone, Debug)]
pub struct WavLibrary {
    root: PathBuf,
}

impl WavLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn group_files(&self, name: &str) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(name);
        if dir.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(&dir)
                .map_err(|e| DriftError::io(&dir, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("wav")))
                .collect();
            files.sort();
            if files.is_empty() {
                return Err(DriftError::missing(name));
            }
            return Ok(files);
        }
        let file = self.root.join(format!("{name}.wav"));
        if file.is_file() { Ok(vec![file]) } else { Err(DriftError::missing(name)) }
    }

    fn load_group(&self, name: &str) -> Result<Vec<AudioBuffer>> {
        let files = self.group_files(name)?;
        let buffers = files.iter().map(|f| read_wav(f)).collect::<Result<Vec<_>>>()?;
        debug!(group = name, files = buffers.len(), "loaded sample group");
        Ok(buffers)
    }
}

impl SampleLibrary for WavLibrary {
    fn request(&self, names: &[&str]) -> Result<RawSampleSet> {
        let mut set = RawSampleSet::new();
        for name in names {
            set.insert(*name, self.load_group(name)?);
        }
        Ok(set)
    }

    fn find(&self, name: &str) -> Option<Vec<AudioBuffer>> {
        match self.load_group(name) {
            Ok(buffers) => Some(buffers),
            Err(DriftError::MissingSample { .. }) => None,
            Err(e) => {
                warn!(group = name, error = %e, "ignoring unreadable prerendered group");
                None
            }
        }
    }
}

/// Decode a WAV file to a mono buffer.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };
    let channels = usize::from(spec.channels.max(1));
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    let mut buffer = AudioBuffer::from_samples(spec.sample_rate as f32, mono);
    if let Some(root) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<Pitch>().ok()) {
        buffer = buffer.with_root(root);
    }
    Ok(buffer)
}

/// Write a mono buffer as 32-bit float WAV.
pub fn write_wav(path: &Path, sample_rate: u32, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for s in samples {
        writer.write_sample(*s)?;
    }
    writer.finalize()?;
    Ok(())
}
