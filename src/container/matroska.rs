//! Matroska structure the demuxer leaves out.
//!
//! symphonia's Matroska reader skips `Chapters`, flattens every `Tag` into
//! one list regardless of its `Targets`, and gives up on codec ids it cannot
//! decode (DTS, AC-3, TrueHD). This module walks the EBML tree once, up to
//! the first cluster, and recovers those pieces so the prober can merge them
//! into the container snapshot.

use std::io::{self, Read, Seek, SeekFrom};

use symphonia::core::units::TimeBase;

use super::{ChapterInfo, CodecId, CodecProfile, MetadataEntry, StreamInfo, StreamKind};

/// Magic bytes of an EBML header element.
pub(super) const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Largest single element payload that is read into memory.
const MAX_PAYLOAD: u64 = 1 << 20;

pub(crate) mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;

    pub const SEGMENT: u32 = 0x1853_8067;
    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const SEEK: u32 = 0x4DBB;
    pub const SEEK_ID: u32 = 0x53AB;
    pub const SEEK_POSITION: u32 = 0x53AC;
    pub const CLUSTER: u32 = 0x1F43_B675;

    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const NAME: u32 = 0x536E;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const BIT_DEPTH: u32 = 0x6264;

    pub const CHAPTERS: u32 = 0x1043_A770;
    pub const EDITION_ENTRY: u32 = 0x45B9;
    pub const EDITION_FLAG_DEFAULT: u32 = 0x45DB;
    pub const CHAPTER_ATOM: u32 = 0xB6;
    pub const CHAPTER_UID: u32 = 0x73C4;
    pub const CHAPTER_TIME_START: u32 = 0x91;
    pub const CHAPTER_TIME_END: u32 = 0x92;
    pub const CHAPTER_FLAG_HIDDEN: u32 = 0x98;
    pub const CHAPTER_FLAG_ENABLED: u32 = 0x4598;
    pub const CHAPTER_DISPLAY: u32 = 0x80;
    pub const CHAP_STRING: u32 = 0x85;

    pub const TAGS: u32 = 0x1254_C367;
    pub const TAG: u32 = 0x7373;
    pub const TARGETS: u32 = 0x63C0;
    pub const TARGET_TYPE: u32 = 0x63CA;
    pub const TAG_TRACK_UID: u32 = 0x63C5;
    pub const TAG_EDITION_UID: u32 = 0x63C9;
    pub const TAG_CHAPTER_UID: u32 = 0x63C4;
    pub const TAG_ATTACHMENT_UID: u32 = 0x63C6;
    pub const SIMPLE_TAG: u32 = 0x67C8;
    pub const TAG_NAME: u32 = 0x45A3;
    pub const TAG_STRING: u32 = 0x4487;
}

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;
const NANOS: u32 = 1_000_000_000;

/// What the Matroska side walk found.
#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct MatroskaInfo {
    pub tracks: Vec<MatroskaTrack>,
    pub chapters: Vec<ChapterInfo>,
    /// Tags without a track, chapter, edition or attachment target.
    /// Keys carry a `TargetType/` prefix when the target names one.
    pub tags: Vec<MetadataEntry>,
    /// Whether a `Tags` element was found at all
    pub has_tags: bool,
    pub duration_us: Option<i64>,
}

impl MatroskaInfo {
    /// Track by its `TrackNumber`.
    pub fn track(&self, number: u64) -> Option<&MatroskaTrack> {
        self.tracks.iter().find(|t| t.number == number)
    }
}

/// A `TrackEntry` as declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct MatroskaTrack {
    pub number: u64,
    pub uid: u64,
    pub track_type: Option<u64>,
    pub codec_id: String,
    pub codec_private: Option<Vec<u8>>,
    pub name: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub bit_depth: Option<u32>,
    /// Tags targeted at this track's UID
    pub tags: Vec<MetadataEntry>,
}

impl MatroskaTrack {
    /// Codec and declared profile for the `CodecID` string.
    pub fn codec(&self) -> (CodecId, Option<CodecProfile>) {
        let id = self.codec_id.as_str();
        match id {
            "A_DTS" | "A_DTS/EXPRESS" => (CodecId::Dts, None),
            "A_DTS/LOSSLESS" => (CodecId::Dts, Some(CodecProfile::DtsHdMa)),
            "A_EAC3" => (CodecId::Eac3, None),
            "A_TRUEHD" => (CodecId::TrueHd, None),
            "A_MLP" => (CodecId::Other("mlp".to_string()), None),
            "A_MPEG/L3" => (CodecId::Mp3, None),
            "A_FLAC" => (CodecId::Flac, None),
            "A_OPUS" => (CodecId::Opus, None),
            "A_VORBIS" => (CodecId::Vorbis, None),
            "A_ALAC" => (CodecId::Alac, None),
            _ if id.starts_with("A_AC3") => (CodecId::Ac3, None),
            _ if id.starts_with("A_AAC") => (CodecId::Aac, None),
            _ => {
                let short = id.strip_prefix("A_").unwrap_or(id);
                (CodecId::Other(short.to_ascii_lowercase()), None)
            }
        }
    }

    /// Fill in what the demuxer left unknown on `stream`.
    pub fn apply_to(&self, stream: &mut StreamInfo) {
        if stream.codec == CodecId::Unknown {
            let (codec, profile) = self.codec();
            stream.codec = codec;
            stream.profile = stream.profile.or(profile);
        }
        match self.track_type {
            Some(TRACK_TYPE_AUDIO) => stream.kind = StreamKind::Audio,
            Some(TRACK_TYPE_VIDEO) => stream.kind = StreamKind::Video,
            _ => {}
        }
        stream.sample_rate = stream.sample_rate.or(self.sample_rate);
        stream.channels = stream.channels.or(self.channels);
        stream.bits_per_raw_sample = stream.bits_per_raw_sample.or(self.bit_depth);
        if stream.private_data.is_none() {
            stream.private_data = self.codec_private.clone();
        }
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            stream.metadata.push(MetadataEntry::new("title", name));
        }
        stream.metadata.extend(self.tags.iter().cloned());
    }
}

/// Walk the Matroska file in `inner` (`len` bytes, starting at offset 0).
pub(super) fn read_matroska<R: Read + Seek>(inner: R, len: u64) -> io::Result<MatroskaInfo> {
    let mut ebml = EbmlReader::new(inner);

    let header = ebml.header(0, len)?;
    if header.id != ids::EBML {
        return Err(invalid("missing EBML header"));
    }
    let segment = ebml.header(header.end, len)?;
    if segment.id != ids::SEGMENT {
        return Err(invalid("missing segment"));
    }

    let mut sections = Sections::default();
    let mut seeks = Vec::new();
    let mut pos = segment.data_start;
    while pos < segment.end {
        let element = ebml.header(pos, segment.end)?;
        if element.id == ids::CLUSTER {
            break;
        }
        if element.id == ids::SEEK_HEAD {
            ebml.seek_head(element, &mut seeks)?;
        }
        sections.note(element);
        pos = element.end;
    }

    // Sections written after the clusters are only reachable through the seek head
    for (id, offset) in seeks {
        if sections.get(id).is_some() {
            continue;
        }
        let Some(pos) = segment.data_start.checked_add(offset).filter(|p| *p < segment.end) else {
            continue;
        };
        if let Ok(element) = ebml.header(pos, segment.end) {
            if element.id == id {
                sections.note(element);
            }
        }
    }

    let mut info = MatroskaInfo::default();
    if let Some(element) = sections.info {
        info.duration_us = ebml.duration_us(element)?;
    }
    if let Some(element) = sections.tracks {
        info.tracks = ebml.tracks(element)?;
    }
    let tags = match sections.tags {
        Some(element) => {
            info.has_tags = true;
            ebml.tags(element)?
        }
        None => Vec::new(),
    };
    let mut chapters = match sections.chapters {
        Some(element) => ebml.chapters(element)?,
        None => Vec::new(),
    };

    for tag in tags {
        match tag.target {
            Target::Global(target_type) => {
                info.tags.extend(tag.entries.into_iter().map(|e| match &target_type {
                    Some(prefix) => MetadataEntry::new(format!("{prefix}/{}", e.key), e.value),
                    None => e,
                }));
            }
            Target::Tracks(uids) => {
                for track in info.tracks.iter_mut().filter(|t| uids.contains(&t.uid)) {
                    track.tags.extend(tag.entries.iter().cloned());
                }
            }
            Target::Chapters(uids) => {
                for (_, chapter) in chapters.iter_mut().filter(|(uid, _)| uids.contains(uid)) {
                    chapter.metadata.extend(tag.entries.iter().cloned());
                }
            }
            Target::Other => {}
        }
    }
    info.chapters = chapters.into_iter().map(|(_, chapter)| chapter).collect();

    Ok(info)
}

fn invalid(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("matroska: {what}"))
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Default)]
struct Sections {
    info: Option<Element>,
    tracks: Option<Element>,
    chapters: Option<Element>,
    tags: Option<Element>,
}

impl Sections {
    /// Remember the first element of each interesting kind.
    fn note(&mut self, element: Element) {
        let slot = match element.id {
            ids::INFO => &mut self.info,
            ids::TRACKS => &mut self.tracks,
            ids::CHAPTERS => &mut self.chapters,
            ids::TAGS => &mut self.tags,
            _ => return,
        };
        slot.get_or_insert(element);
    }

    fn get(&self, id: u32) -> Option<Element> {
        match id {
            ids::INFO => self.info,
            ids::TRACKS => self.tracks,
            ids::CHAPTERS => self.chapters,
            ids::TAGS => self.tags,
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Target {
    /// No UID targets; carries the `TargetType` string if any
    Global(Option<String>),
    Tracks(Vec<u64>),
    Chapters(Vec<u64>),
    /// Editions or attachments
    Other,
}

#[derive(Debug)]
struct ParsedTag {
    target: Target,
    entries: Vec<MetadataEntry>,
}

// ============================================================================
// EBML reading
// ============================================================================

/// An element header: its id and the byte range of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Element {
    id: u32,
    data_start: u64,
    /// End of the payload; unknown sizes run to the end of the parent
    end: u64,
}

impl Element {
    fn size(&self) -> u64 {
        self.end.saturating_sub(self.data_start)
    }
}

struct EbmlReader<R> {
    inner: R,
}

impl<R: Read + Seek> EbmlReader<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    fn byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Element id, marker bits included. At most four bytes wide.
    fn read_id(&mut self) -> io::Result<u32> {
        let first = self.byte()?;
        let width = first.leading_zeros() + 1;
        if width > 4 {
            return Err(invalid("element id wider than four bytes"));
        }
        let mut id = u32::from(first);
        for _ in 1..width {
            id = (id << 8) | u32::from(self.byte()?);
        }
        Ok(id)
    }

    /// Element size; `None` for the reserved "unknown" value.
    fn read_size(&mut self) -> io::Result<Option<u64>> {
        let first = self.byte()?;
        if first == 0 {
            return Err(invalid("element size wider than eight bytes"));
        }
        let width = first.leading_zeros() + 1;
        let mut value = u64::from(first) & (0xFF_u64 >> width);
        for _ in 1..width {
            value = (value << 8) | u64::from(self.byte()?);
        }
        let all_ones = (1u64 << (7 * width)) - 1;
        Ok((value != all_ones).then_some(value))
    }

    /// Header of the element at `pos`, bounded by its parent's end.
    fn header(&mut self, pos: u64, parent_end: u64) -> io::Result<Element> {
        self.inner.seek(SeekFrom::Start(pos))?;
        let id = self.read_id()?;
        let size = self.read_size()?;
        let data_start = self.inner.stream_position()?;
        let end = match size {
            Some(size) => data_start
                .checked_add(size)
                .filter(|end| *end <= parent_end)
                .ok_or_else(|| invalid("element overruns its parent"))?,
            None => parent_end,
        };
        Ok(Element { id, data_start, end })
    }

    /// Visit each direct child of `parent`.
    fn children(&mut self, parent: Element, mut visit: impl FnMut(&mut Self, Element) -> io::Result<()>) -> io::Result<()> {
        let mut pos = parent.data_start;
        while pos < parent.end {
            let child = self.header(pos, parent.end)?;
            visit(self, child)?;
            pos = child.end;
        }
        Ok(())
    }

    fn payload(&mut self, element: Element) -> io::Result<Vec<u8>> {
        if element.size() > MAX_PAYLOAD {
            return Err(invalid("element payload too large"));
        }
        self.inner.seek(SeekFrom::Start(element.data_start))?;
        let mut buf = vec![0u8; element.size() as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn uint(&mut self, element: Element) -> io::Result<u64> {
        if element.size() > 8 {
            return Err(invalid("unsigned integer wider than eight bytes"));
        }
        Ok(self.payload(element)?.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn float(&mut self, element: Element) -> io::Result<f64> {
        let data = self.payload(element)?;
        match data.len() {
            0 => Ok(0.0),
            4 => Ok(f64::from(f32::from_be_bytes([data[0], data[1], data[2], data[3]]))),
            8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&data);
                Ok(f64::from_be_bytes(bytes))
            }
            _ => Err(invalid("float must be four or eight bytes")),
        }
    }

    fn string(&mut self, element: Element) -> io::Result<String> {
        let data = self.payload(element)?;
        let text = String::from_utf8_lossy(&data);
        Ok(text.trim_end_matches('\0').to_string())
    }

    // ------------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------------

    fn seek_head(&mut self, element: Element, seeks: &mut Vec<(u32, u64)>) -> io::Result<()> {
        self.children(element, |ebml, seek| {
            if seek.id != ids::SEEK {
                return Ok(());
            }
            let mut id = None;
            let mut position = None;
            ebml.children(seek, |ebml, child| {
                match child.id {
                    ids::SEEK_ID => {
                        let raw = ebml.payload(child)?;
                        if raw.len() <= 4 {
                            id = Some(raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)));
                        }
                    }
                    ids::SEEK_POSITION => position = Some(ebml.uint(child)?),
                    _ => {}
                }
                Ok(())
            })?;
            if let (Some(id), Some(position)) = (id, position) {
                seeks.push((id, position));
            }
            Ok(())
        })
    }

    fn duration_us(&mut self, element: Element) -> io::Result<Option<i64>> {
        let mut scale = DEFAULT_TIMECODE_SCALE;
        let mut duration = None;
        self.children(element, |ebml, child| {
            match child.id {
                ids::TIMECODE_SCALE => scale = ebml.uint(child)?,
                ids::DURATION => duration = Some(ebml.float(child)?),
                _ => {}
            }
            Ok(())
        })?;
        // Duration is in timecode-scale units of nanoseconds
        Ok(duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| (d * scale as f64 / 1000.0) as i64))
    }

    fn tracks(&mut self, element: Element) -> io::Result<Vec<MatroskaTrack>> {
        let mut tracks = Vec::new();
        self.children(element, |ebml, entry| {
            if entry.id == ids::TRACK_ENTRY {
                tracks.push(ebml.track_entry(entry)?);
            }
            Ok(())
        })?;
        Ok(tracks)
    }

    fn track_entry(&mut self, element: Element) -> io::Result<MatroskaTrack> {
        let mut track = MatroskaTrack::default();
        self.children(element, |ebml, child| {
            match child.id {
                ids::TRACK_NUMBER => track.number = ebml.uint(child)?,
                ids::TRACK_UID => track.uid = ebml.uint(child)?,
                ids::TRACK_TYPE => track.track_type = Some(ebml.uint(child)?),
                ids::CODEC_ID => track.codec_id = ebml.string(child)?,
                ids::CODEC_PRIVATE => track.codec_private = Some(ebml.payload(child)?),
                ids::NAME => track.name = Some(ebml.string(child)?),
                ids::AUDIO => {
                    ebml.children(child, |ebml, audio| {
                        match audio.id {
                            ids::SAMPLING_FREQUENCY => {
                                let rate = ebml.float(audio)?;
                                track.sample_rate = (rate >= 1.0).then_some(rate.round() as u32);
                            }
                            ids::CHANNELS => track.channels = u32::try_from(ebml.uint(audio)?).ok(),
                            ids::BIT_DEPTH => track.bit_depth = u32::try_from(ebml.uint(audio)?).ok(),
                            _ => {}
                        }
                        Ok(())
                    })?;
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(track)
    }

    fn tags(&mut self, element: Element) -> io::Result<Vec<ParsedTag>> {
        let mut tags = Vec::new();
        self.children(element, |ebml, tag| {
            if tag.id == ids::TAG {
                tags.push(ebml.tag(tag)?);
            }
            Ok(())
        })?;
        Ok(tags)
    }

    fn tag(&mut self, element: Element) -> io::Result<ParsedTag> {
        let mut target_type = None;
        let mut track_uids = Vec::new();
        let mut chapter_uids = Vec::new();
        let mut other_target = false;
        let mut entries = Vec::new();

        self.children(element, |ebml, child| {
            match child.id {
                ids::TARGETS => ebml.children(child, |ebml, target| {
                    match target.id {
                        ids::TARGET_TYPE => {
                            target_type = Some(ebml.string(target)?).filter(|t: &String| !t.is_empty())
                        }
                        // UID 0 means "everything"
                        ids::TAG_TRACK_UID => track_uids.extend(Some(ebml.uint(target)?).filter(|u| *u != 0)),
                        ids::TAG_CHAPTER_UID => chapter_uids.extend(Some(ebml.uint(target)?).filter(|u| *u != 0)),
                        ids::TAG_EDITION_UID | ids::TAG_ATTACHMENT_UID => {
                            other_target |= ebml.uint(target)? != 0;
                        }
                        _ => {}
                    }
                    Ok(())
                })?,
                ids::SIMPLE_TAG => {
                    if let Some(entry) = ebml.simple_tag(child)? {
                        entries.push(entry);
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        let target = if !track_uids.is_empty() {
            Target::Tracks(track_uids)
        } else if !chapter_uids.is_empty() {
            Target::Chapters(chapter_uids)
        } else if other_target {
            Target::Other
        } else {
            Target::Global(target_type)
        };
        Ok(ParsedTag { target, entries })
    }

    /// A name/string pair. Binary values and nested tags are skipped.
    fn simple_tag(&mut self, element: Element) -> io::Result<Option<MetadataEntry>> {
        let mut name = None;
        let mut value = None;
        self.children(element, |ebml, child| {
            match child.id {
                ids::TAG_NAME => name = Some(ebml.string(child)?),
                ids::TAG_STRING => value = Some(ebml.string(child)?),
                _ => {}
            }
            Ok(())
        })?;
        Ok(match (name, value) {
            (Some(name), Some(value)) if !name.is_empty() => Some(MetadataEntry::new(name, value)),
            _ => None,
        })
    }

    /// Chapters of the default edition, or the first one, with their UIDs.
    ///
    /// Hidden or disabled atoms and atoms without a UID are dropped, as is
    /// any atom that does not start after the previous one kept.
    fn chapters(&mut self, element: Element) -> io::Result<Vec<(u64, ChapterInfo)>> {
        let mut chosen: Option<(Element, bool)> = None;
        self.children(element, |ebml, edition| {
            if edition.id != ids::EDITION_ENTRY {
                return Ok(());
            }
            let mut is_default = false;
            ebml.children(edition, |ebml, child| {
                if child.id == ids::EDITION_FLAG_DEFAULT {
                    is_default = ebml.uint(child)? != 0;
                }
                Ok(())
            })?;
            let replace = match chosen {
                None => true,
                Some((_, chosen_default)) => is_default && !chosen_default,
            };
            if replace {
                chosen = Some((edition, is_default));
            }
            Ok(())
        })?;
        let Some((edition, _)) = chosen else {
            return Ok(Vec::new());
        };

        let mut atoms = Vec::new();
        self.children(edition, |ebml, atom| {
            if atom.id == ids::CHAPTER_ATOM {
                atoms.push(ebml.chapter_atom(atom)?);
            }
            Ok(())
        })?;

        let mut chapters = Vec::new();
        let mut last_start = None;
        for atom in atoms {
            if atom.uid == 0 || atom.hidden || !atom.enabled {
                continue;
            }
            if last_start.is_some_and(|last| atom.start <= last) {
                continue;
            }
            last_start = Some(atom.start);

            let mut metadata = Vec::new();
            if let Some(title) = atom.title.filter(|t| !t.is_empty()) {
                metadata.push(MetadataEntry::new("title", title));
            }
            let chapter = ChapterInfo {
                start: i64::try_from(atom.start).unwrap_or(i64::MAX),
                end: atom.end.and_then(|e| i64::try_from(e).ok()),
                time_base: TimeBase::new(1, NANOS),
                metadata,
            };
            chapters.push((atom.uid, chapter));
        }
        Ok(chapters)
    }

    fn chapter_atom(&mut self, element: Element) -> io::Result<ChapterAtom> {
        let mut atom = ChapterAtom {
            enabled: true,
            ..Default::default()
        };
        self.children(element, |ebml, child| {
            match child.id {
                ids::CHAPTER_UID => atom.uid = ebml.uint(child)?,
                ids::CHAPTER_TIME_START => atom.start = ebml.uint(child)?,
                ids::CHAPTER_TIME_END => atom.end = Some(ebml.uint(child)?),
                ids::CHAPTER_FLAG_HIDDEN => atom.hidden = ebml.uint(child)? != 0,
                ids::CHAPTER_FLAG_ENABLED => atom.enabled = ebml.uint(child)? != 0,
                ids::CHAPTER_DISPLAY if atom.title.is_none() => {
                    ebml.children(child, |ebml, display| {
                        if display.id == ids::CHAP_STRING && atom.title.is_none() {
                            atom.title = Some(ebml.string(display)?);
                        }
                        Ok(())
                    })?;
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(atom)
    }
}

#[derive(Debug, Default)]
struct ChapterAtom {
    uid: u64,
    /// Nanoseconds
    start: u64,
    end: Option<u64>,
    hidden: bool,
    enabled: bool,
    title: Option<String>,
}
