//! Test utilities and fixtures for tagweave tests.
//!
//! This module provides in-memory media fixtures and container factories
//! so tests don't need audio files on disk.
//!
//! # Example
//!
//! ```ignore
//! use tagweave::test_utils::{chapter_secs, container_with_chapters};
//!
//! let container = container_with_chapters(vec![
//!     chapter_secs(0, Some(60)),
//!     chapter_secs(60, None),
//! ]);
//! ```

use crate::container::matroska::ids;
use crate::container::{ChapterInfo, CodecId, Container, StreamInfo, TimeBase};

/// Builds a minimal 16-bit PCM WAV file holding `frames` frames of silence.
///
/// # Example
///
/// ```ignore
/// let bytes = wav_bytes(44100, 2, 44100); // one second of stereo
/// ```
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
    let block_align = u32::from(channels) * 2;
    let data_len = frames * block_align;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    out.extend_from_slice(&(block_align as u16).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(out.len() + data_len as usize, 0);
    out
}

/// A chapter with whole-second timestamps.
pub fn chapter_secs(start: i64, end: Option<i64>) -> ChapterInfo {
    ChapterInfo {
        start,
        end,
        time_base: TimeBase::new(1, 1),
        metadata: Vec::new(),
    }
}

/// A container with one AAC audio stream of unknown duration and the given
/// chapters.
///
/// Use struct update syntax or plain field access to customize durations:
///
/// ```ignore
/// let mut container = container_with_chapters(chapters);
/// container.duration_us = Some(600_000_000);
/// ```
pub fn container_with_chapters(chapters: Vec<ChapterInfo>) -> Container {
    let mut stream = StreamInfo::audio(0, CodecId::Aac);
    stream.sample_rate = Some(44100);
    stream.channels = Some(2);
    stream.time_base = Some(TimeBase::new(1, 44100));

    Container {
        format: "m4a".to_string(),
        streams: vec![stream],
        chapters,
        ..Default::default()
    }
}

// ============================================================================
// Matroska fixtures
// ============================================================================

const EBML_VERSION: u32 = 0x4286;
const EBML_READ_VERSION: u32 = 0x42F7;
const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
const DOC_TYPE: u32 = 0x4282;
const DOC_TYPE_VERSION: u32 = 0x4287;
const DOC_TYPE_READ_VERSION: u32 = 0x4285;
const MUXING_APP: u32 = 0x4D80;
const WRITING_APP: u32 = 0x5741;
const CHAP_LANGUAGE: u32 = 0x437C;
const TARGET_TYPE_VALUE: u32 = 0x68CA;

/// An EBML element with an eight-byte size field.
pub fn ebml(id: u32, payload: &[u8]) -> Vec<u8> {
    let id_bytes = id.to_be_bytes();
    let skip = id_bytes.iter().take_while(|b| **b == 0).count();
    let mut out = id_bytes[skip..].to_vec();
    out.push(0x01);
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

pub fn ebml_uint(id: u32, value: u64) -> Vec<u8> {
    ebml(id, &value.to_be_bytes())
}

pub fn ebml_float(id: u32, value: f64) -> Vec<u8> {
    ebml(id, &value.to_be_bytes())
}

pub fn ebml_string(id: u32, value: &str) -> Vec<u8> {
    ebml(id, value.as_bytes())
}

/// Builds an audio-only Matroska file with one track, chapters and tags.
/// There are no clusters; everything the prober reads sits in the header.
///
/// # Example
///
/// ```ignore
/// let bytes = MkaBuilder::new("A_DTS")
///     .track_name("DTS-HD Master Audio 5.1")
///     .chapter(0, "Intro")
///     .chapter(200, "Song")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct MkaBuilder {
    doc_type: String,
    codec_id: String,
    track_name: Option<String>,
    codec_private: Option<Vec<u8>>,
    channels: u64,
    duration_secs: f64,
    chapters: Vec<(u64, Option<u64>, String)>,
    album_tags: Vec<(String, String)>,
    chapter_tags: Vec<(usize, String, String)>,
    track_tags: Vec<(String, String)>,
}

impl MkaBuilder {
    pub fn new(codec_id: &str) -> Self {
        Self {
            doc_type: "matroska".to_string(),
            codec_id: codec_id.to_string(),
            track_name: None,
            codec_private: None,
            channels: 2,
            duration_secs: 600.0,
            chapters: Vec::new(),
            album_tags: Vec::new(),
            chapter_tags: Vec::new(),
            track_tags: Vec::new(),
        }
    }

    pub fn doc_type(mut self, doc_type: &str) -> Self {
        self.doc_type = doc_type.to_string();
        self
    }

    pub fn track_name(mut self, name: &str) -> Self {
        self.track_name = Some(name.to_string());
        self
    }

    pub fn codec_private(mut self, data: &[u8]) -> Self {
        self.codec_private = Some(data.to_vec());
        self
    }

    pub fn channels(mut self, channels: u64) -> Self {
        self.channels = channels;
        self
    }

    pub fn duration_secs(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// A chapter starting at `start_secs` with no declared end. Chapter UIDs
    /// are assigned in call order starting at 1.
    pub fn chapter(self, start_secs: u64, title: &str) -> Self {
        self.chapter_until(start_secs, None, title)
    }

    pub fn chapter_until(mut self, start_secs: u64, end_secs: Option<u64>, title: &str) -> Self {
        self.chapters.push((start_secs, end_secs, title.to_string()));
        self
    }

    /// A tag on the `ALBUM` target.
    pub fn album_tag(mut self, name: &str, value: &str) -> Self {
        self.album_tags.push((name.to_string(), value.to_string()));
        self
    }

    /// A tag targeted at the chapter added `index`-th (zero based).
    pub fn chapter_tag(mut self, index: usize, name: &str, value: &str) -> Self {
        self.chapter_tags.push((index, name.to_string(), value.to_string()));
        self
    }

    /// A tag targeted at the audio track's UID.
    pub fn track_tag(mut self, name: &str, value: &str) -> Self {
        self.track_tags.push((name.to_string(), value.to_string()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        const NANOS: u64 = 1_000_000_000;
        const TRACK_UID: u64 = 0xA0D1;

        let header = ebml(
            ids::EBML,
            &[
                ebml_uint(EBML_VERSION, 1),
                ebml_uint(EBML_READ_VERSION, 1),
                ebml_uint(EBML_MAX_ID_LENGTH, 4),
                ebml_uint(EBML_MAX_SIZE_LENGTH, 8),
                ebml_string(DOC_TYPE, &self.doc_type),
                ebml_uint(DOC_TYPE_VERSION, 4),
                ebml_uint(DOC_TYPE_READ_VERSION, 2),
            ]
            .concat(),
        );

        let info = ebml(
            ids::INFO,
            &[
                ebml_uint(ids::TIMECODE_SCALE, 1_000_000),
                ebml_float(ids::DURATION, self.duration_secs * 1000.0),
                ebml_string(MUXING_APP, "tagweave"),
                ebml_string(WRITING_APP, "tagweave"),
            ]
            .concat(),
        );

        let mut entry = vec![
            ebml_uint(ids::TRACK_NUMBER, 1),
            ebml_uint(ids::TRACK_UID, TRACK_UID),
            ebml_uint(ids::TRACK_TYPE, 2),
            ebml_string(ids::CODEC_ID, &self.codec_id),
        ];
        if let Some(name) = &self.track_name {
            entry.push(ebml_string(ids::NAME, name));
        }
        if let Some(private) = &self.codec_private {
            entry.push(ebml(ids::CODEC_PRIVATE, private));
        }
        entry.push(ebml(
            ids::AUDIO,
            &[
                ebml_float(ids::SAMPLING_FREQUENCY, 48000.0),
                ebml_uint(ids::CHANNELS, self.channels),
            ]
            .concat(),
        ));
        let tracks = ebml(ids::TRACKS, &ebml(ids::TRACK_ENTRY, &entry.concat()));

        let mut segment = [info, tracks].concat();

        if !self.chapters.is_empty() {
            let atoms: Vec<u8> = self
                .chapters
                .iter()
                .enumerate()
                .flat_map(|(i, (start, end, title))| {
                    let mut atom = vec![
                        ebml_uint(ids::CHAPTER_UID, i as u64 + 1),
                        ebml_uint(ids::CHAPTER_TIME_START, start * NANOS),
                    ];
                    if let Some(end) = end {
                        atom.push(ebml_uint(ids::CHAPTER_TIME_END, end * NANOS));
                    }
                    atom.push(ebml(
                        ids::CHAPTER_DISPLAY,
                        &[ebml_string(ids::CHAP_STRING, title), ebml_string(CHAP_LANGUAGE, "eng")].concat(),
                    ));
                    ebml(ids::CHAPTER_ATOM, &atom.concat())
                })
                .collect();
            segment.extend(ebml(ids::CHAPTERS, &ebml(ids::EDITION_ENTRY, &atoms)));
        }

        let simple = |name: &str, value: &str| {
            ebml(
                ids::SIMPLE_TAG,
                &[ebml_string(ids::TAG_NAME, name), ebml_string(ids::TAG_STRING, value)].concat(),
            )
        };
        let mut tags = Vec::new();
        if !self.album_tags.is_empty() {
            let targets = ebml(
                ids::TARGETS,
                &[ebml_uint(TARGET_TYPE_VALUE, 50), ebml_string(ids::TARGET_TYPE, "ALBUM")].concat(),
            );
            let body: Vec<u8> = self.album_tags.iter().flat_map(|(n, v)| simple(n.as_str(), v.as_str())).collect();
            tags.extend(ebml(ids::TAG, &[targets, body].concat()));
        }
        for (index, name, value) in &self.chapter_tags {
            let targets = ebml(
                ids::TARGETS,
                &[
                    ebml_uint(TARGET_TYPE_VALUE, 30),
                    ebml_uint(ids::TAG_CHAPTER_UID, *index as u64 + 1),
                ]
                .concat(),
            );
            tags.extend(ebml(ids::TAG, &[targets, simple(name.as_str(), value.as_str())].concat()));
        }
        if !self.track_tags.is_empty() {
            let targets = ebml(ids::TARGETS, &ebml_uint(ids::TAG_TRACK_UID, TRACK_UID));
            let body: Vec<u8> = self.track_tags.iter().flat_map(|(n, v)| simple(n.as_str(), v.as_str())).collect();
            tags.extend(ebml(ids::TAG, &[targets, body].concat()));
        }
        if !tags.is_empty() {
            segment.extend(ebml(ids::TAGS, &tags));
        }

        [header, ebml(ids::SEGMENT, &segment)].concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_bytes_layout() {
        let bytes = wav_bytes(8000, 1, 10);
        assert_eq!(bytes.len(), 44 + 20);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 36 + 20);
    }

    #[test]
    fn test_ebml_element_layout() {
        assert_eq!(ebml_uint(0x83, 2), [0x83, 0x01, 0, 0, 0, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 2]);
        let segment = ebml(ids::SEGMENT, b"");
        assert_eq!(&segment[..4], &[0x18, 0x53, 0x80, 0x67]);
        assert_eq!(segment.len(), 12);
    }

    #[test]
    fn test_mka_builder_starts_with_ebml_magic() {
        let bytes = MkaBuilder::new("A_FLAC").chapter(0, "One").build();
        assert_eq!(&bytes[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
    }

    #[test]
    fn test_container_with_chapters() {
        let container = container_with_chapters(vec![chapter_secs(0, Some(5)), chapter_secs(5, None)]);
        assert_eq!(container.chapters.len(), 2);
        assert!(container.first_audio_stream().is_some());
        assert_eq!(container.stream_duration_ms(), None);
        assert_eq!(container.chapters[0].end_ms(), Some(5000));
    }
}
