//! Container identification and extraction, backed by symphonia.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use symphonia::core::codecs::{
    CODEC_TYPE_AAC, CODEC_TYPE_ALAC, CODEC_TYPE_DCA, CODEC_TYPE_EAC3, CODEC_TYPE_FLAC, CODEC_TYPE_MP3,
    CODEC_TYPE_NULL, CODEC_TYPE_OPUS, CODEC_TYPE_VORBIS, CodecType,
};
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey, Value};
use symphonia::core::probe::Instantiate;
use symphonia::core::units::TimeBase;
use tracing::debug;

use super::matroska::{self, EBML_MAGIC, MatroskaInfo};
use super::mp4;
use super::{ChapterInfo, CodecId, Container, ContainerHandle, MetadataEntry, StreamInfo, StreamKind, TIME_BASE_US};
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::metadata::synonyms;
use crate::model::EmbeddedArt;
use crate::source::{BufferedSource, ByteSource, DEFAULT_BLOCK_SIZE};

/// Smallest read-ahead buffer the demuxer accepts.
const MIN_STREAM_BUFFER: usize = 64 * 1024;
const MAX_STREAM_BUFFER: usize = 16 * 1024 * 1024;

/// Prober settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOptions {
    /// I/O block size used unless the source reports its own
    pub block_size: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl From<&ProbeConfig> for ProbeOptions {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            block_size: config.block_size,
        }
    }
}

/// Open a file by path.
pub fn open_path(path: &Path, options: &ProbeOptions) -> Result<ContainerHandle, ProbeError> {
    let file = File::open(path)?;
    open(Box::new(file), &path.to_string_lossy(), options)
}

/// Identify and open the container in `source`.
///
/// `name` is the resource name; its extension becomes the format label.
/// Everything the demuxer exposes up front is extracted into the handle's
/// [`Container`] snapshot. Only a failure to recognize any format at all is
/// reported as [`ProbeError::Unrecognized`]; a recognized container that
/// cannot be read is [`ProbeError::OpenFailed`].
pub fn open(
    mut source: Box<dyn ByteSource>,
    name: &str,
    options: &ProbeOptions,
) -> Result<ContainerHandle, ProbeError> {
    let side = read_side_info(source.as_mut(), name)?;

    let buffered = BufferedSource::new(source, options.block_size);
    let seekable = MediaSource::is_seekable(&buffered);
    let byte_len = MediaSource::byte_len(&buffered);
    debug!(
        name,
        seekable,
        ?byte_len,
        block_size = buffered.block_size(),
        "Probing container"
    );

    let mut mss = MediaSourceStream::new(
        Box::new(buffered),
        MediaSourceStreamOptions {
            buffer_len: stream_buffer_len(options.block_size),
        },
    );

    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let mut metadata = Vec::new();
    let mut art = None;

    // Tags found ahead of the container (e.g. ID3v2) are read as they come
    let probe = symphonia::default::get_probe();
    let mut reader = loop {
        let found = probe
            .next(&mut mss)
            .map_err(|e| ProbeError::Unrecognized(format!("{name}: {e}")))?;
        match found {
            Instantiate::Format(make_reader) => {
                break make_reader(mss, &FormatOptions::default())
                    .map_err(|e| ProbeError::open_failed(format!("{name}: {e}")))?;
            }
            Instantiate::Metadata(make_reader) => {
                let revision = make_reader(&MetadataOptions::default())
                    .read_all(&mut mss)
                    .map_err(|e| ProbeError::open_failed(format!("{name}: {e}")))?;
                collect_revision(&revision, &mut metadata, &mut art);
            }
        }
    };

    let mkv = match &side {
        Some(SideInfo::Matroska(info)) => Some(info),
        _ => None,
    };

    let mut container_tags = Vec::new();
    if let Some(revision) = reader.metadata().current() {
        collect_revision(revision, &mut container_tags, &mut art);
    }
    match mkv {
        // The demuxer's own list mixes in track and chapter tags
        Some(info) if info.has_tags => metadata.extend(info.tags.iter().cloned()),
        _ => metadata.append(&mut container_tags),
    }

    let streams: Vec<StreamInfo> = reader
        .tracks()
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let mut stream = stream_info(index, track);
            if let Some(declared) = mkv.and_then(|info| info.track(u64::from(track.id))) {
                declared.apply_to(&mut stream);
            }
            stream
        })
        .collect();

    let duration_us = streams
        .iter()
        .filter_map(|s| s.duration_ms())
        .filter(|ms| *ms >= 0)
        .max()
        .map(|ms| ms * 1000)
        .or_else(|| mkv.and_then(|info| info.duration_us));

    let declared_chapters = match side {
        Some(SideInfo::Matroska(info)) => info.chapters,
        Some(SideInfo::Mp4(chapters)) => chapters,
        None => Vec::new(),
    };
    let chapters = if declared_chapters.is_empty() {
        cue_chapters(reader.as_ref(), &streams)
    } else {
        declared_chapters
    };

    let mut container = Container {
        format: extension,
        metadata,
        streams,
        chapters,
        duration_us,
        byte_len,
        art,
    };
    estimate_bit_rate(&mut container);

    debug!(
        name,
        streams = container.streams.len(),
        chapters = container.chapters.len(),
        tags = container.metadata.len(),
        "Opened container"
    );

    Ok(ContainerHandle::with_reader(name.to_string(), seekable, container, reader))
}

/// Container structure read directly from the bytes, for the parts the
/// demuxer does not expose.
#[derive(Debug)]
enum SideInfo {
    Matroska(MatroskaInfo),
    Mp4(Vec<ChapterInfo>),
}

/// Sniff `source` for Matroska or MP4 and read what the demuxer skips.
///
/// Needs a seekable source of known length positioned at its start, and
/// leaves it there. Unreadable structure is logged and ignored; the demuxer
/// gets the final word on whether the file opens.
fn read_side_info(source: &mut dyn ByteSource, name: &str) -> Result<Option<SideInfo>, ProbeError> {
    let Some(len) = source.byte_len().filter(|_| source.is_seekable()) else {
        return Ok(None);
    };
    if source.stream_position()? != 0 {
        return Ok(None);
    }

    let mut magic = [0u8; 8];
    let sniffed = source.read_exact(&mut magic).is_ok();
    source.seek(SeekFrom::Start(0))?;
    if !sniffed {
        return Ok(None);
    }

    let parsed = if magic[..4] == EBML_MAGIC {
        matroska::read_matroska(BufReader::new(&mut *source), len).map(SideInfo::Matroska)
    } else if &magic[4..8] == b"ftyp" {
        mp4::read_chapters(BufReader::new(&mut *source), len).map(SideInfo::Mp4)
    } else {
        return Ok(None);
    };
    source.seek(SeekFrom::Start(0))?;

    match parsed {
        Ok(info) => Ok(Some(info)),
        Err(e) => {
            debug!(name, error = %e, "Ignoring unreadable container structure");
            Ok(None)
        }
    }
}

/// Read-ahead buffer for the demuxer: a power of two no smaller than its
/// minimum.
fn stream_buffer_len(block_size: usize) -> usize {
    block_size
        .clamp(MIN_STREAM_BUFFER, MAX_STREAM_BUFFER)
        .next_power_of_two()
}

// ============================================================================
// Extraction
// ============================================================================

fn collect_revision(revision: &MetadataRevision, metadata: &mut Vec<MetadataEntry>, art: &mut Option<EmbeddedArt>) {
    for tag in revision.tags() {
        if matches!(tag.value, Value::Binary(_)) {
            continue;
        }
        let key = if synonyms::is_known(&tag.key) {
            tag.key.clone()
        } else {
            tag.std_key
                .and_then(standard_key_name)
                .map(str::to_string)
                .unwrap_or_else(|| tag.key.clone())
        };
        metadata.push(MetadataEntry::new(key, tag.value.to_string()));
    }

    let visuals = revision.visuals();
    let chosen = visuals
        .iter()
        .find(|v| v.usage == Some(StandardVisualKey::FrontCover))
        .or_else(|| visuals.first());
    if let Some(visual) = chosen {
        if art.is_none() || visual.usage == Some(StandardVisualKey::FrontCover) {
            *art = Some(EmbeddedArt {
                data: visual.data.to_vec(),
                mime_type: visual.media_type.clone(),
            });
        }
    }
}

/// Vocabulary key for a tag the demuxer recognised but whose raw key is
/// vendor specific (e.g. MP4 atoms).
fn standard_key_name(key: StandardTagKey) -> Option<&'static str> {
    Some(match key {
        StandardTagKey::TrackTitle => "TITLE",
        StandardTagKey::Album => "ALBUM",
        StandardTagKey::Artist => "ARTIST",
        StandardTagKey::AlbumArtist => "ALBUM_ARTIST",
        StandardTagKey::Genre => "GENRE",
        StandardTagKey::TrackNumber => "TRACK",
        StandardTagKey::DiscNumber => "DISC",
        StandardTagKey::Date | StandardTagKey::ReleaseDate => "DATE",
        StandardTagKey::OriginalDate => "ORIGINALDATE",
        StandardTagKey::Comment => "COMMENT",
        StandardTagKey::Description => "DESCRIPTION",
        StandardTagKey::Composer => "COMPOSER",
        StandardTagKey::Conductor => "CONDUCTOR",
        StandardTagKey::Lyricist => "LYRICIST",
        StandardTagKey::Writer => "WRITER",
        StandardTagKey::Arranger => "ARRANGER",
        StandardTagKey::Engineer => "ENGINEER",
        StandardTagKey::Remixer => "TPE4",
        StandardTagKey::Label => "LABEL",
        StandardTagKey::Mood => "MOOD",
        StandardTagKey::Bpm => "BPM",
        StandardTagKey::Compilation => "COMPILATION",
        StandardTagKey::DiscSubtitle => "TSST",
        StandardTagKey::SortAlbumArtist => "ALBUMARTISTSORT",
        StandardTagKey::MusicBrainzArtistId => "MUSICBRAINZ_ARTISTID",
        StandardTagKey::MusicBrainzAlbumId => "MUSICBRAINZ_ALBUMID",
        StandardTagKey::MusicBrainzAlbumArtistId => "MUSICBRAINZ_ALBUMARTISTID",
        StandardTagKey::MusicBrainzReleaseGroupId => "MUSICBRAINZ_RELEASEGROUPID",
        StandardTagKey::MusicBrainzTrackId => "MUSICBRAINZ_TRACKID",
        StandardTagKey::MusicBrainzReleaseType => "MUSICBRAINZ_ALBUMTYPE",
        StandardTagKey::MusicBrainzReleaseStatus => "MUSICBRAINZ_ALBUMSTATUS",
        StandardTagKey::Language => "LANGUAGE",
        StandardTagKey::Copyright => "COPYRIGHT",
        StandardTagKey::EncodedBy => "ENCODED_BY",
        _ => return None,
    })
}

fn stream_info(index: usize, track: &Track) -> StreamInfo {
    let params = &track.codec_params;
    let mut stream = StreamInfo::audio(index, codec_id(params.codec));

    // Codecs without a decoder still declare their audio parameters
    if params.codec == CODEC_TYPE_NULL && params.sample_rate.is_none() && params.channels.is_none() {
        stream.kind = StreamKind::Other;
    }
    stream.sample_rate = params.sample_rate;
    stream.channels = params.channels.map(|c| c.count() as u32);
    stream.bits_per_coded_sample = params.bits_per_coded_sample;
    stream.bits_per_raw_sample = params.bits_per_sample;
    stream.time_base = params
        .time_base
        .or_else(|| params.sample_rate.filter(|r| *r > 0).map(|r| TimeBase::new(1, r)));
    stream.duration = params.n_frames.and_then(|n| i64::try_from(n).ok());
    stream.private_data = params.extra_data.as_ref().map(|d| d.to_vec());

    if let Some(language) = &track.language {
        stream.metadata.push(MetadataEntry::new("language", language.clone()));
    }
    stream
}

fn codec_id(codec: CodecType) -> CodecId {
    if codec == CODEC_TYPE_MP3 {
        CodecId::Mp3
    } else if codec == CODEC_TYPE_AAC {
        CodecId::Aac
    } else if codec == CODEC_TYPE_FLAC {
        CodecId::Flac
    } else if codec == CODEC_TYPE_VORBIS {
        CodecId::Vorbis
    } else if codec == CODEC_TYPE_OPUS {
        CodecId::Opus
    } else if codec == CODEC_TYPE_ALAC {
        CodecId::Alac
    } else if codec == CODEC_TYPE_DCA {
        CodecId::Dts
    } else if codec == CODEC_TYPE_EAC3 {
        CodecId::Eac3
    } else if codec == CODEC_TYPE_NULL {
        CodecId::Unknown
    } else {
        symphonia::default::get_codecs()
            .get_codec(codec)
            .map(|d| CodecId::Other(d.short_name.to_string()))
            .unwrap_or(CodecId::Unknown)
    }
}

/// Cues become chapters when the container declares none of its own. A cue
/// ends where the next one starts; the last one has no declared end.
fn cue_chapters(reader: &dyn FormatReader, streams: &[StreamInfo]) -> Vec<ChapterInfo> {
    let cues = reader.cues();
    if cues.is_empty() {
        return Vec::new();
    }

    let Some(time_base) = streams
        .iter()
        .find(|s| s.kind == StreamKind::Audio)
        .and_then(|s| s.time_base)
    else {
        debug!(cues = cues.len(), "Ignoring cues without a time base");
        return Vec::new();
    };

    let to_ts = |ts: u64| i64::try_from(ts).unwrap_or(i64::MAX);
    cues.iter()
        .enumerate()
        .map(|(i, cue)| ChapterInfo {
            start: to_ts(cue.start_ts),
            end: cues.get(i + 1).map(|next| to_ts(next.start_ts)),
            time_base,
            metadata: cue
                .tags
                .iter()
                .filter(|t| !matches!(t.value, Value::Binary(_)))
                .map(|t| MetadataEntry::new(t.key.clone(), t.value.to_string()))
                .collect(),
        })
        .collect()
}

/// Fill in the first audio stream's bit rate from the file size when the
/// demuxer did not declare one.
fn estimate_bit_rate(container: &mut Container) {
    let (Some(len), Some(duration_us)) = (container.byte_len, container.duration_us) else {
        return;
    };
    if duration_us <= 0 {
        return;
    }
    if let Some(stream) = container
        .streams
        .iter_mut()
        .find(|s| s.kind == StreamKind::Audio && s.bit_rate.is_none())
    {
        let bits = u128::from(len) * 8 * TIME_BASE_US as u128;
        let rate = bits / duration_us as u128;
        stream.bit_rate = u64::try_from(rate).ok();
    }
}
