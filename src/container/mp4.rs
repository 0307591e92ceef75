//! MP4 chapter lists.
//!
//! symphonia does not report MP4 chapters. Two layouts are found in the wild:
//! a QuickTime chapter track (a text track referenced from another track's
//! `tref/chap`, one sample per chapter) and the Nero `chpl` atom under
//! `moov/udta`. The chapter track wins when both are present.

use std::io::{self, Read, Seek, SeekFrom};

use symphonia::core::units::TimeBase;

use super::{ChapterInfo, MetadataEntry};

/// `chpl` start times are in 100 ns units.
const NERO_TIME_BASE: u32 = 10_000_000;
const MAX_CHAPTERS: usize = 4096;
const MAX_ATOM_PAYLOAD: u64 = 1 << 20;
const MAX_TEXT_SAMPLE: u32 = 64 * 1024;

/// Chapters of the MP4 file in `inner` (`len` bytes, starting at offset 0).
pub(super) fn read_chapters<R: Read + Seek>(mut inner: R, len: u64) -> io::Result<Vec<ChapterInfo>> {
    let r = &mut inner;
    let Some(moov) = children(r, 0, len)?.into_iter().find(|a| &a.kind == b"moov") else {
        return Ok(Vec::new());
    };

    let mut traks = Vec::new();
    let mut nero = Vec::new();
    for atom in children(r, moov.data_start, moov.end)? {
        match &atom.kind {
            b"trak" => traks.push(read_trak(r, atom)?),
            b"udta" => {
                if let Some(chpl) = children(r, atom.data_start, atom.end)?
                    .into_iter()
                    .find(|a| &a.kind == b"chpl")
                {
                    nero = parse_chpl(&payload(r, chpl)?);
                }
            }
            _ => {}
        }
    }

    let referenced = traks.iter().flat_map(|t| t.chapter_refs.iter().copied()).find(|id| *id != 0);
    if let Some(trak) = referenced.and_then(|id| traks.iter().find(|t| t.track_id == id)) {
        let chapters = read_text_track(r, trak)?;
        if !chapters.is_empty() {
            return Ok(chapters);
        }
    }
    Ok(nero)
}

// ============================================================================
// Atoms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Atom {
    kind: [u8; 4],
    data_start: u64,
    end: u64,
}

fn invalid(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("mp4: {what}"))
}

/// Atoms laid end to end in `start..end`.
fn children<R: Read + Seek>(r: &mut R, start: u64, end: u64) -> io::Result<Vec<Atom>> {
    let mut atoms = Vec::new();
    let mut pos = start;
    while pos + 8 <= end {
        r.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; 8];
        r.read_exact(&mut header)?;
        let kind = [header[4], header[5], header[6], header[7]];
        let (size, header_len) = match u32::from_be_bytes([header[0], header[1], header[2], header[3]]) {
            0 => (end - pos, 8),
            1 => {
                let mut large = [0u8; 8];
                r.read_exact(&mut large)?;
                (u64::from_be_bytes(large), 16)
            }
            size => (u64::from(size), 8),
        };
        if size < header_len || pos.saturating_add(size) > end {
            return Err(invalid("atom overruns its parent"));
        }
        atoms.push(Atom {
            kind,
            data_start: pos + header_len,
            end: pos + size,
        });
        pos += size;
    }
    Ok(atoms)
}

fn payload<R: Read + Seek>(r: &mut R, atom: Atom) -> io::Result<Vec<u8>> {
    let size = atom.end - atom.data_start;
    if size > MAX_ATOM_PAYLOAD {
        return Err(invalid("atom payload too large"));
    }
    r.seek(SeekFrom::Start(atom.data_start))?;
    let mut buf = vec![0u8; size as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Big-endian reads over a byte slice; `None` once it runs out.
struct ByteCursor<'a> {
    data: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.data.len() < n {
            return None;
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)
            .map(|b| u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Skip a full-box version and flags, returning the version.
    fn version(&mut self) -> Option<u8> {
        let version = self.u8()?;
        self.take(3)?;
        Some(version)
    }
}

// ============================================================================
// Tracks
// ============================================================================

#[derive(Debug, Default)]
struct Trak {
    track_id: u32,
    /// Track ids listed under `tref/chap`
    chapter_refs: Vec<u32>,
    timescale: u32,
    stbl: Option<Atom>,
}

fn read_trak<R: Read + Seek>(r: &mut R, trak: Atom) -> io::Result<Trak> {
    let mut info = Trak::default();
    for atom in children(r, trak.data_start, trak.end)? {
        match &atom.kind {
            b"tkhd" => {
                let data = payload(r, atom)?;
                let mut c = ByteCursor::new(&data);
                let times = if c.version() == Some(1) { 16 } else { 8 };
                c.take(times);
                info.track_id = c.u32().unwrap_or(0);
            }
            b"tref" => {
                for reference in children(r, atom.data_start, atom.end)? {
                    if &reference.kind == b"chap" {
                        let data = payload(r, reference)?;
                        let mut c = ByteCursor::new(&data);
                        info.chapter_refs.extend(std::iter::from_fn(|| c.u32()));
                    }
                }
            }
            b"mdia" => {
                for child in children(r, atom.data_start, atom.end)? {
                    match &child.kind {
                        b"mdhd" => {
                            let data = payload(r, child)?;
                            let mut c = ByteCursor::new(&data);
                            let times = if c.version() == Some(1) { 16 } else { 8 };
                            c.take(times);
                            info.timescale = c.u32().unwrap_or(0);
                        }
                        b"minf" => {
                            info.stbl = children(r, child.data_start, child.end)?
                                .into_iter()
                                .find(|a| &a.kind == b"stbl");
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    Ok(info)
}

/// One chapter per text sample, timed by the sample table.
fn read_text_track<R: Read + Seek>(r: &mut R, trak: &Trak) -> io::Result<Vec<ChapterInfo>> {
    let Some(stbl) = trak.stbl else {
        return Ok(Vec::new());
    };
    if trak.timescale == 0 {
        return Ok(Vec::new());
    }

    let mut durations: Vec<u32> = Vec::new();
    let mut sizes: Vec<u32> = Vec::new();
    let mut runs: Vec<(u32, u32)> = Vec::new();
    let mut chunk_offsets: Vec<u64> = Vec::new();

    for atom in children(r, stbl.data_start, stbl.end)? {
        if !matches!(&atom.kind, b"stts" | b"stsz" | b"stsc" | b"stco" | b"co64") {
            continue;
        }
        let data = payload(r, atom)?;
        let mut c = ByteCursor::new(&data);
        c.version();
        match &atom.kind {
            b"stts" => {
                let entries = c.u32().unwrap_or(0);
                for _ in 0..entries {
                    let (Some(count), Some(delta)) = (c.u32(), c.u32()) else {
                        break;
                    };
                    let room = MAX_CHAPTERS.saturating_sub(durations.len());
                    durations.extend(std::iter::repeat(delta).take((count as usize).min(room)));
                }
            }
            b"stsz" => {
                let uniform = c.u32().unwrap_or(0);
                let count = (c.u32().unwrap_or(0) as usize).min(MAX_CHAPTERS);
                sizes = if uniform != 0 {
                    vec![uniform; count]
                } else {
                    std::iter::from_fn(|| c.u32()).take(count).collect()
                };
            }
            b"stsc" => {
                let entries = c.u32().unwrap_or(0) as usize;
                runs = std::iter::from_fn(|| {
                    let first_chunk = c.u32()?;
                    let per_chunk = c.u32()?;
                    c.u32()?;
                    Some((first_chunk, per_chunk))
                })
                .take(entries)
                .collect();
            }
            b"stco" => {
                let entries = c.u32().unwrap_or(0) as usize;
                chunk_offsets = std::iter::from_fn(|| c.u32().map(u64::from)).take(entries).collect();
            }
            _ => {
                let entries = c.u32().unwrap_or(0) as usize;
                chunk_offsets = std::iter::from_fn(|| c.u64()).take(entries).collect();
            }
        }
    }

    // Sample byte ranges, walking chunks in order
    let mut samples = Vec::with_capacity(sizes.len());
    for (index, &chunk_offset) in chunk_offsets.iter().enumerate() {
        if samples.len() >= sizes.len() {
            break;
        }
        let chunk = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let per_chunk = runs
            .iter()
            .take_while(|(first, _)| *first <= chunk)
            .last()
            .map(|(_, n)| *n)
            .unwrap_or(0);
        let mut offset = chunk_offset;
        for _ in 0..per_chunk {
            let Some(&size) = sizes.get(samples.len()) else {
                break;
            };
            samples.push((offset, size));
            offset += u64::from(size);
        }
    }

    let time_base = TimeBase::new(1, trak.timescale);
    let mut chapters = Vec::with_capacity(samples.len());
    let mut start = 0i64;
    for (index, (offset, size)) in samples.into_iter().enumerate() {
        let duration = i64::from(durations.get(index).copied().unwrap_or(0));
        let title = read_text_sample(r, offset, size)?;
        let metadata = if title.is_empty() {
            Vec::new()
        } else {
            vec![MetadataEntry::new("title", title)]
        };
        chapters.push(ChapterInfo {
            start,
            end: Some(start + duration),
            time_base,
            metadata,
        });
        start += duration;
    }
    Ok(chapters)
}

/// A text sample: a 16-bit length followed by UTF-8 or BOM-marked UTF-16.
fn read_text_sample<R: Read + Seek>(r: &mut R, offset: u64, size: u32) -> io::Result<String> {
    if !(2..=MAX_TEXT_SAMPLE).contains(&size) {
        return Ok(String::new());
    }
    r.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; size as usize];
    r.read_exact(&mut data)?;

    let mut c = ByteCursor::new(&data);
    let declared = c.u16().map(usize::from).unwrap_or(0);
    let text = c.take(declared.min(c.data.len())).unwrap_or_default();

    let decoded = match text {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest.chunks_exact(2).map(|p| u16::from_be_bytes([p[0], p[1]])).collect();
            String::from_utf16_lossy(&units)
        }
        [0xFF, 0xFE, rest @ ..] => {
            let units: Vec<u16> = rest.chunks_exact(2).map(|p| u16::from_le_bytes([p[0], p[1]])).collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(text).into_owned(),
    };
    Ok(decoded.trim_end_matches('\0').trim().to_string())
}

/// Nero chapter list: starts only, so every end is left open.
fn parse_chpl(data: &[u8]) -> Vec<ChapterInfo> {
    let mut c = ByteCursor::new(data);
    let Some(version) = c.version() else {
        return Vec::new();
    };
    if version != 0 {
        c.take(4);
    }
    let count = c.u8().unwrap_or(0);

    let mut chapters = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let (Some(start), Some(len)) = (c.u64(), c.u8()) else {
            break;
        };
        let Some(title) = c.take(usize::from(len)) else {
            break;
        };
        let title = String::from_utf8_lossy(title).trim().to_string();
        chapters.push(ChapterInfo {
            start: i64::try_from(start).unwrap_or(i64::MAX),
            end: None,
            time_base: TimeBase::new(1, NERO_TIME_BASE),
            metadata: if title.is_empty() {
                Vec::new()
            } else {
                vec![MetadataEntry::new("title", title)]
            },
        });
    }
    chapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn atom(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    fn full_atom(kind: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
        let mut payload = vec![version, 0, 0, 0];
        payload.extend_from_slice(body);
        atom(kind, &payload)
    }

    fn ftyp() -> Vec<u8> {
        atom(b"ftyp", b"M4B \0\0\0\0M4B mp42isom")
    }

    fn chpl(chapters: &[(u64, &str)]) -> Vec<u8> {
        let mut body = vec![0u8; 4];
        body.push(chapters.len() as u8);
        for (start, title) in chapters {
            body.extend_from_slice(&start.to_be_bytes());
            body.push(title.len() as u8);
            body.extend_from_slice(title.as_bytes());
        }
        full_atom(b"chpl", 1, &body)
    }

    fn tkhd(track_id: u32) -> Vec<u8> {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&track_id.to_be_bytes());
        body.extend_from_slice(&[0u8; 68]);
        full_atom(b"tkhd", 0, &body)
    }

    fn mdhd(timescale: u32) -> Vec<u8> {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&timescale.to_be_bytes());
        body.extend_from_slice(&[0u8; 8]);
        full_atom(b"mdhd", 0, &body)
    }

    fn text_sample(title: &str) -> Vec<u8> {
        let mut out = (title.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(title.as_bytes());
        out
    }

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// An audiobook with a QuickTime chapter track (track 2, referenced from
    /// track 1) whose samples live in one chunk inside `mdat`.
    fn quicktime_book(titles: &[&str], deltas: &[u32], nero: Option<Vec<u8>>) -> Vec<u8> {
        let samples: Vec<Vec<u8>> = titles.iter().map(|t| text_sample(t)).collect();
        let mdat_payload: Vec<u8> = samples.concat();

        let mut out = ftyp();
        let chunk_offset = (out.len() + 8) as u32;
        out.extend(atom(b"mdat", &mdat_payload));

        let audio_trak = atom(b"trak", &[tkhd(1), atom(b"tref", &atom(b"chap", &words(&[2])))].concat());

        let mut stts = words(&[deltas.len() as u32]);
        for delta in deltas {
            stts.extend(words(&[1, *delta]));
        }
        let mut stsz = words(&[0, samples.len() as u32]);
        for sample in &samples {
            stsz.extend(words(&[sample.len() as u32]));
        }
        let stbl = atom(
            b"stbl",
            &[
                full_atom(b"stts", 0, &stts),
                full_atom(b"stsz", 0, &stsz),
                full_atom(b"stsc", 0, &words(&[1, 1, samples.len() as u32, 1])),
                full_atom(b"stco", 0, &words(&[1, chunk_offset])),
            ]
            .concat(),
        );
        let text_trak = atom(
            b"trak",
            &[tkhd(2), atom(b"mdia", &[mdhd(1000), atom(b"minf", &stbl)].concat())].concat(),
        );

        let mut moov = [audio_trak, text_trak].concat();
        if let Some(udta) = nero {
            moov.extend(atom(b"udta", &udta));
        }
        out.extend(atom(b"moov", &moov));
        out
    }

    fn read(bytes: Vec<u8>) -> Vec<ChapterInfo> {
        let len = bytes.len() as u64;
        read_chapters(Cursor::new(bytes), len).unwrap()
    }

    fn titles(chapters: &[ChapterInfo]) -> Vec<&str> {
        chapters
            .iter()
            .map(|c| c.metadata.first().map(|e| e.value.as_str()).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_nero_chapter_list() {
        let udta = atom(
            b"udta",
            &chpl(&[(0, "Opening"), (1_200_000_000, "Middle"), (3_000_000_000, "Closing")]),
        );
        let mut bytes = ftyp();
        bytes.extend(atom(b"moov", &udta));

        let chapters = read(bytes);
        assert_eq!(titles(&chapters), ["Opening", "Middle", "Closing"]);
        let starts: Vec<i64> = chapters.iter().map(ChapterInfo::start_ms).collect();
        assert_eq!(starts, [0, 120_000, 300_000]);
        assert!(chapters.iter().all(|c| c.end.is_none()));
    }

    #[test]
    fn test_quicktime_chapter_track() {
        let chapters = read(quicktime_book(&["Part One", "Part Two"], &[90_000, 30_000], None));
        assert_eq!(titles(&chapters), ["Part One", "Part Two"]);
        assert_eq!(chapters[0].start_ms(), 0);
        assert_eq!(chapters[0].end_ms(), Some(90_000));
        assert_eq!(chapters[1].start_ms(), 90_000);
        assert_eq!(chapters[1].end_ms(), Some(120_000));
    }

    #[test]
    fn test_chapter_track_wins_over_nero_list() {
        let nero = chpl(&[(0, "Nero A"), (10_000_000, "Nero B")]);
        let chapters = read(quicktime_book(&["Track A", "Track B"], &[1000, 1000], Some(nero)));
        assert_eq!(titles(&chapters), ["Track A", "Track B"]);
    }

    #[test]
    fn test_utf16_text_sample() {
        let mut sample = vec![0, 6, 0xFE, 0xFF];
        sample.extend_from_slice(&[0, b'H', 0, b'i']);
        let mut cursor = Cursor::new(sample.clone());
        let title = read_text_sample(&mut cursor, 0, sample.len() as u32).unwrap();
        assert_eq!(title, "Hi");
    }

    #[test]
    fn test_no_moov_gives_no_chapters() {
        assert!(read(ftyp()).is_empty());
    }

    #[test]
    fn test_truncated_atom_is_an_error() {
        let mut bytes = ftyp();
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(b"moov");
        let len = bytes.len() as u64;
        assert!(read_chapters(Cursor::new(bytes), len).is_err());
    }
}
