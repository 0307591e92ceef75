//! Container model and prober.
//!
//! [`open`] identifies and opens a container from a [`ByteSource`](crate::source::ByteSource)
//! and returns a [`ContainerHandle`]. The handle owns the demuxer together
//! with its I/O buffer and releases both when dropped, whichever way the
//! caller leaves.
//!
//! Everything downstream (normalizer, codec probe, chapter synthesizer) works
//! on the owned [`Container`] snapshot, never on the demuxer itself. That
//! keeps those components independent of the demuxing backend and lets tests
//! build containers by hand.

pub(crate) mod matroska;
mod mp4;
mod probe;

pub use probe::{ProbeOptions, open, open_path};

use symphonia::core::formats::FormatReader;
pub use symphonia::core::units::TimeBase;

use crate::model::EmbeddedArt;

/// Microseconds per second; container-level durations use this unit.
pub const TIME_BASE_US: i64 = 1_000_000;

/// A raw key/value pair from a metadata dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Broad stream classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
    Other,
}

/// Codec identifiers the probe knows how to name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecId {
    Mp3,
    Aac,
    Flac,
    Vorbis,
    Opus,
    Alac,
    Ac3,
    Eac3,
    TrueHd,
    /// DTS coherent acoustics and its HD extensions
    Dts,
    /// Any other codec, by its short name
    Other(String),
    Unknown,
}

impl CodecId {
    /// Short codec name as ffmpeg reports it.
    pub fn short_name(&self) -> &str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Vorbis => "vorbis",
            Self::Opus => "opus",
            Self::Alac => "alac",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::TrueHd => "truehd",
            Self::Dts => "dca",
            Self::Other(name) => name,
            Self::Unknown => "unknown",
        }
    }
}

/// Codec sub-variants a demuxer may declare directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecProfile {
    DtsHdHra,
    DtsHdMa,
    DtsHdMaX,
    DtsHdMaXImax,
    Eac3Atmos,
    TrueHdAtmos,
}

/// One elementary stream of the container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub codec: CodecId,
    /// Profile as declared by the demuxer, if it could tell
    pub profile: Option<CodecProfile>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    /// Bits per second
    pub bit_rate: Option<u64>,
    pub bits_per_coded_sample: Option<u32>,
    pub bits_per_raw_sample: Option<u32>,
    pub time_base: Option<TimeBase>,
    /// Duration in `time_base` units
    pub duration: Option<i64>,
    pub metadata: Vec<MetadataEntry>,
    /// Decoder configuration blob
    pub private_data: Option<Vec<u8>>,
}

impl StreamInfo {
    /// An audio stream with nothing else known.
    pub fn audio(index: usize, codec: CodecId) -> Self {
        Self {
            index,
            kind: StreamKind::Audio,
            codec,
            profile: None,
            sample_rate: None,
            channels: None,
            bit_rate: None,
            bits_per_coded_sample: None,
            bits_per_raw_sample: None,
            time_base: None,
            duration: None,
            metadata: Vec::new(),
            private_data: None,
        }
    }

    /// Stream duration in milliseconds, if declared and not negative.
    pub fn duration_ms(&self) -> Option<i64> {
        let tb = self.time_base?;
        self.duration.filter(|d| *d >= 0).map(|d| ts_to_ms(d, tb))
    }
}

/// A chapter as declared by the container.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterInfo {
    /// Start in `time_base` units; may be negative in broken files
    pub start: i64,
    /// End in `time_base` units, if declared
    pub end: Option<i64>,
    pub time_base: TimeBase,
    pub metadata: Vec<MetadataEntry>,
}

impl ChapterInfo {
    pub fn start_ms(&self) -> i64 {
        ts_to_ms(self.start, self.time_base)
    }

    pub fn end_ms(&self) -> Option<i64> {
        self.end.map(|end| ts_to_ms(end, self.time_base))
    }
}

/// Owned snapshot of everything the demuxer exposed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    /// Format hint derived from the resource name
    pub format: String,
    /// Container-level metadata in source order
    pub metadata: Vec<MetadataEntry>,
    pub streams: Vec<StreamInfo>,
    pub chapters: Vec<ChapterInfo>,
    /// Container-level duration in microseconds
    pub duration_us: Option<i64>,
    pub byte_len: Option<u64>,
    pub art: Option<EmbeddedArt>,
}

impl Container {
    /// First stream of audio kind.
    pub fn first_audio_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind == StreamKind::Audio)
    }

    /// Container-level duration in milliseconds, if declared.
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_us.map(|us| us / 1000)
    }

    /// Duration of the first audio stream in milliseconds, if declared.
    pub fn stream_duration_ms(&self) -> Option<i64> {
        self.first_audio_stream().and_then(StreamInfo::duration_ms)
    }
}

/// Convert a timestamp to milliseconds, truncating toward zero.
pub fn ts_to_ms(ts: i64, time_base: TimeBase) -> i64 {
    if time_base.denom == 0 {
        return 0;
    }
    let ms = i128::from(ts) * 1000 * i128::from(time_base.numer) / i128::from(time_base.denom);
    ms.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// An opened container.
///
/// Holds the demuxer state (when opened through [`open`]) and the snapshot
/// extracted from it. Must not be shared between concurrent callers; each
/// caller opens its own.
pub struct ContainerHandle {
    name: String,
    seekable: bool,
    container: Container,
    reader: Option<Box<dyn FormatReader>>,
}

impl ContainerHandle {
    /// Wrap an already extracted container, e.g. from another backend.
    pub fn from_container(name: impl Into<String>, container: Container) -> Self {
        Self {
            name: name.into(),
            seekable: true,
            container,
            reader: None,
        }
    }

    pub(crate) fn with_reader(
        name: String,
        seekable: bool,
        container: Container,
        reader: Box<dyn FormatReader>,
    ) -> Self {
        Self {
            name,
            seekable,
            container,
            reader: Some(reader),
        }
    }

    /// Resource name the container was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Whether the container has enough chapters to be split into items.
    pub fn has_chapters(&self) -> bool {
        self.container.chapters.len() > 1
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.reader.take().is_some() {
            tracing::trace!(name = %self.name, "Released demuxer");
        }
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("name", &self.name)
            .field("seekable", &self.seekable)
            .field("container", &self.container)
            .field("demuxer", &self.reader.is_some())
            .finish()
    }
}
