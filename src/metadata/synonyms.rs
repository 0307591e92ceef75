//! Static synonym table.
//!
//! Maps a canonical (uppercased, prefix-stripped) key to the [`Field`] it
//! feeds, per [`Scope`]. The same key can mean different things in different
//! scopes: `TITLE` is the album title in a Matroska album-level tag but the
//! track title everywhere else, and `TRACK` is the disc number at album level.

use bitflags::bitflags;

use super::Scope;

bitflags! {
    /// Set of scopes a table entry applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Scopes: u8 {
        const CONTAINER = 1 << 0;
        const STREAM = 1 << 1;
        const ALBUM = 1 << 2;
        const CHAPTER = 1 << 3;

        /// Single-file vocabulary
        const FILE = Self::CONTAINER.bits() | Self::STREAM.bits();
        /// Matroska-style set vocabularies
        const SET = Self::ALBUM.bits() | Self::CHAPTER.bits();
        const ALL = Self::FILE.bits() | Self::SET.bits();
    }
}

impl From<Scope> for Scopes {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Container => Self::CONTAINER,
            Scope::Stream => Self::STREAM,
            Scope::Album => Self::ALBUM,
            Scope::Chapter => Self::CHAPTER,
        }
    }
}

/// Single-valued text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Title,
    Album,
    Artist,
    AlbumArtist,
    ArtistSort,
    AlbumArtistSort,
    ComposerSort,
    Mood,
    Comment,
    RecordLabel,
    DiscSubtitle,
    ReleaseDate,
    OriginalDate,
    MusicBrainzAlbumId,
    MusicBrainzReleaseGroupId,
    MusicBrainzTrackId,
    MusicBrainzReleaseType,
    MusicBrainzReleaseStatus,
}

/// Multi-valued text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListField {
    Genres,
    ArtistHints,
    AlbumArtistHints,
    MusicBrainzArtistIds,
    MusicBrainzAlbumArtistIds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberField {
    Track,
    Disc,
    Bpm,
}

/// Halves of an ID3v2.3 release date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    /// `TYER`: YYYY
    Year,
    /// `TDAT`: DDMM
    DayMonth,
}

/// How a value is stored once its key is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Stored as-is
    Text(TextField),
    /// Split with the active separators, then joined with the item separator
    Joined(TextField),
    /// Split into a list
    List(ListField),
    /// Leading base-10 integer
    Number(NumberField),
    /// Compilation flag
    Flag,
    /// Credit the split names with a fixed role
    Role(&'static str),
    /// Comma separated `role, person` pairs
    RoleList,
    PartialDate(DatePart),
    /// Recognised and discarded
    Ignore,
}

use DatePart::*;
use Field::*;
use ListField::*;
use NumberField::*;
use TextField::*;

const F: Scopes = Scopes::FILE;
const A: Scopes = Scopes::ALBUM;
const C: Scopes = Scopes::CHAPTER;
const AC: Scopes = Scopes::SET;
const FC: Scopes = Scopes::FILE.union(Scopes::CHAPTER);
const FA: Scopes = Scopes::FILE.union(Scopes::ALBUM);
const ALL: Scopes = Scopes::ALL;

/// Key, scopes, handler. A key appears at most once per scope.
static TABLE: &[(&str, Scopes, Field)] = &[
    // Titles and names
    ("TITLE", FC, Text(Title)),
    ("TITLE", A, Text(Album)),
    ("TIT2", F, Text(Title)),
    ("ALBUM", ALL, Text(Album)),
    ("TALB", F, Text(Album)),
    ("ARTIST", ALL, Text(Artist)),
    ("TPE1", F, Text(Artist)),
    // Album artist
    ("ALBUM_ARTIST", F, Text(AlbumArtist)),
    ("ALBUM_ARTIST", A, Joined(AlbumArtist)),
    ("ALBUM ARTIST", F, Text(AlbumArtist)),
    ("ALBUM ARTIST", AC, Joined(AlbumArtist)),
    ("ALBUMARTIST", F, Text(AlbumArtist)),
    ("ALBUMARTIST", AC, Joined(AlbumArtist)),
    ("ALBUMARTSTS", AC, Joined(AlbumArtist)),
    ("ALBUM ARTISTS", AC, Joined(AlbumArtist)),
    ("TPE2", F, Text(AlbumArtist)),
    ("MUSICBRAINZ ALBUM ARTIST", F, Text(AlbumArtist)),
    ("MUSICBRAINZ_ALBUMARTIST", AC, Text(AlbumArtist)),
    // Artist hints
    ("ARTISTS", F, List(ArtistHints)),
    ("ALBUMARTISTS", F, List(AlbumArtistHints)),
    ("ALBUM ARTISTS", F, List(AlbumArtistHints)),
    // Sort names
    ("ARTISTSORT", AC, Joined(ArtistSort)),
    ("ARTIST SORT", AC, Joined(ArtistSort)),
    ("ALBUM ARTIST SORT", F, Text(AlbumArtistSort)),
    ("ALBUM ARTIST SORT", AC, Joined(AlbumArtistSort)),
    ("ALBUMARTISTSORT", F, Text(AlbumArtistSort)),
    ("ALBUMARTISTSORT", AC, Joined(AlbumArtistSort)),
    ("SORT_ALBUM_ARTIST", A, Joined(AlbumArtistSort)),
    ("COMPOSERSORT", AC, Joined(ComposerSort)),
    ("COMPOSER SORT", AC, Joined(ComposerSort)),
    // Descriptive text
    ("MOOD", FC, Text(Mood)),
    ("MOOD", A, Joined(Mood)),
    ("TMOO", F, Text(Mood)),
    ("COMMENT", ALL, Text(Comment)),
    ("COMM", F, Text(Comment)),
    ("DESCRIPTION", F, Text(Comment)),
    ("LABEL", F, Text(RecordLabel)),
    ("TPUB", F, Text(RecordLabel)),
    ("PUBLISHER", ALL, Text(RecordLabel)),
    ("TSST", F, Text(DiscSubtitle)),
    ("SUBTITLE", AC, Text(DiscSubtitle)),
    ("SETSUBTITLE", AC, Text(DiscSubtitle)),
    ("GENRE", ALL, List(Genres)),
    ("TCON", F, List(Genres)),
    // Dates
    ("DATE", F, Text(ReleaseDate)),
    ("TDRC", F, Text(ReleaseDate)),
    ("YEAR", ALL, Text(ReleaseDate)),
    ("DATE_RELEASED", ALL, Text(ReleaseDate)),
    ("TDOR", F, Text(OriginalDate)),
    ("TORY", F, Text(OriginalDate)),
    ("ORIGINALDATE", F, Text(OriginalDate)),
    ("ORIGYEAR", AC, Text(OriginalDate)),
    ("DATE_RECORDED", AC, Text(OriginalDate)),
    ("TYER", F, PartialDate(Year)),
    ("TDAT", F, PartialDate(DayMonth)),
    // Numbers
    ("TRACK", F, Number(Track)),
    ("TRACK", A, Number(Disc)),
    ("PART_NUMBER", F, Number(Track)),
    ("PART_NUMBER", A, Number(Disc)),
    ("TRCK", F, Number(Track)),
    ("TRACKNUMBER", F, Number(Track)),
    ("DISC", F, Number(Disc)),
    ("TPOS", F, Number(Disc)),
    ("DISCNUMBER", F, Number(Disc)),
    ("TBPM", F, Number(Bpm)),
    ("BPM", F, Number(Bpm)),
    ("COMPILATION", ALL, Flag),
    ("TCMP", F, Flag),
    // Roles
    ("COMPOSER", FC, Role("Composer")),
    ("TCOM", F, Role("Composer")),
    ("PERFORMER", F, Role("Conductor")),
    ("TPE3", F, Role("Conductor")),
    ("CONDUCTOR", FC, Role("Conductor")),
    ("TEXT", F, Role("Lyricist")),
    ("LYRICIST", FC, Role("Lyricist")),
    ("TPE4", F, Role("Remixer")),
    ("REMIXED_BY", AC, Role("Remixer")),
    ("MIXED_BY", AC, Role("Mixer")),
    ("MIXER", AC, Role("Mixer")),
    ("WRITER", FC, Role("Writer")),
    ("ARRANGER", FC, Role("Arranger")),
    ("ENGINEER", FC, Role("Engineer")),
    ("BAND", C, Role("Band")),
    ("PRODUCER", C, Role("Producer")),
    ("INVOLVEDPEOPLE", AC, RoleList),
    ("ACTOR", AC, RoleList),
    ("INSTRUMENTS", C, RoleList),
    // MusicBrainz
    ("MUSICBRAINZ ARTIST ID", F, List(MusicBrainzArtistIds)),
    ("MUSICBRAINZ_ARTISTID", ALL, List(MusicBrainzArtistIds)),
    ("MUSICBRAINZ ALBUM ARTIST ID", FA, List(MusicBrainzAlbumArtistIds)),
    ("MUSICBRAINZ_ALBUMARTISTID", ALL, List(MusicBrainzAlbumArtistIds)),
    ("MUSICBRAINZ ALBUM ID", FA, Text(MusicBrainzAlbumId)),
    ("MUSICBRAINZ_ALBUMID", ALL, Text(MusicBrainzAlbumId)),
    ("MUSICBRAINZ RELEASEGROUP ID", F, Text(MusicBrainzReleaseGroupId)),
    ("MUSICBRAINZ RELEASE GROUP ID", FA, Text(MusicBrainzReleaseGroupId)),
    ("MUSICBRAINZ_RELEASEGROUPID", ALL, Text(MusicBrainzReleaseGroupId)),
    ("MUSICBRAINZ TRACK ID", F, Text(MusicBrainzTrackId)),
    ("MUSICBRAINZ_TRACKID", FC, Text(MusicBrainzTrackId)),
    ("MUSICBRAINZ ALBUM TYPE", F, Text(MusicBrainzReleaseType)),
    ("MUSICBRAINZ_ALBUMTYPE", ALL, Text(MusicBrainzReleaseType)),
    ("RELEASETYPE", F, Text(MusicBrainzReleaseType)),
    ("MUSICBRAINZ ALBUM STATUS", F, Text(MusicBrainzReleaseStatus)),
    ("MUSICBRAINZ_ALBUMSTATUS", ALL, Text(MusicBrainzReleaseStatus)),
    ("RELEASESTATUS", F, Text(MusicBrainzReleaseStatus)),
    // Known and discarded
    ("ENCODED_BY", F, Ignore),
    ("ENCODER", F, Ignore),
    ("COPYRIGHT", F, Ignore),
    ("TCOP", F, Ignore),
    ("TDTG", F, Ignore),
    ("LANGUAGE", F, Ignore),
    ("TLAN", F, Ignore),
    ("ARTIST-SORT", F, Ignore),
    ("TSOP", F, Ignore),
    ("TSO2", F, Ignore),
    ("TSOC", F, Ignore),
];

/// Vendor prefixes wrapped around freeform keys.
const FREEFORM_PREFIXES: &[&str] = &["TXXX:", "----:", "COM.APPLE.ITUNES:"];

/// Target-type label some Matroska editors put before level-50 keys.
const TARGET_TYPE_PREFIX: &str = "ALBUM/";

/// Uppercase `key` and strip target-type and freeform prefixes.
pub fn canonical_key(key: &str) -> String {
    let mut key = key.trim().to_uppercase();
    if let Some(rest) = key.strip_prefix(TARGET_TYPE_PREFIX) {
        key = rest.to_string();
    }
    while let Some(rest) = FREEFORM_PREFIXES.iter().find_map(|p| key.strip_prefix(p)) {
        key = rest.to_string();
    }
    key
}

/// Resolve a canonical key in `scope`.
pub fn lookup(key: &str, scope: Scope) -> Option<Field> {
    let scope = Scopes::from(scope);
    TABLE
        .iter()
        .find(|(k, scopes, _)| *k == key && scopes.contains(scope))
        .map(|(_, _, field)| *field)
}

/// Whether the table knows `key` in any scope.
pub fn is_known(key: &str) -> bool {
    let key = canonical_key(key);
    TABLE.iter().any(|(k, _, _)| *k == key)
}
