//! Metadata dictionary normalization.
//!
//! Turns the loosely specified key/value pairs a demuxer reports into
//! canonical [`Tag`] fields. Keys are resolved through a static synonym
//! table ([`synonyms`]) that depends on the [`Scope`] the dictionary came
//! from; composite values are split with an explicit [`Separators`] set.
//!
//! Nothing here fails. Values that cannot be used are reported as
//! [`NormalizeWarning`]s in a [`Diagnostics`] collector and logged.

mod separators;
pub mod synonyms;

pub use separators::{DEFAULT_ITEM_SEPARATOR, Separators, capitalize_words};
pub use synonyms::Field;

use serde::Serialize;
use tracing::{debug, warn};

use crate::container::MetadataEntry;
use crate::model::{Tag, set_if_present, set_list_if_present};
use synonyms::{DatePart, ListField, NumberField, TextField};

/// Which vocabulary a dictionary is read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Container-level tags of a single-item file
    Container,
    /// Stream-level tags of a single-item file
    Stream,
    /// Matroska level-50 (album) tags of a multi-chapter file
    Album,
    /// Tags attached to one chapter
    Chapter,
}

impl Scope {
    /// Whether this scope uses the single-file vocabulary.
    pub fn is_single_file(self) -> bool {
        matches!(self, Self::Container | Self::Stream)
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// A non-fatal problem found while normalizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizeWarning {
    #[error("Malformed numeric value {value:?} for {key}")]
    MalformedNumeric { key: String, value: String },

    #[error("Unmapped metadata key {key}")]
    UnmappedKey { key: String },

    #[error("Chapter {index} is only {duration_ms}ms long")]
    AnomalousChapterDuration { index: usize, duration_ms: i64 },
}

/// Collected warnings, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    warnings: Vec<NormalizeWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: NormalizeWarning) {
        self.warnings.push(warning);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizeWarning> {
        self.warnings.iter()
    }

    /// Warnings other than unmapped keys.
    pub fn significant(&self) -> impl Iterator<Item = &NormalizeWarning> {
        self.warnings
            .iter()
            .filter(|w| !matches!(w, NormalizeWarning::UnmappedKey { .. }))
    }
}

// ============================================================================
// Numeric parsing
// ============================================================================

/// Parse a leading base-10 integer the way C `strtol` does.
///
/// Leading whitespace and one sign are accepted, parsing stops at the first
/// non-digit. Negative values clamp to 0 and overflow saturates. Returns
/// `None` when there are no digits at all.
pub fn parse_leading_int(value: &str) -> Option<u32> {
    let s = value.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let digits: &str = &digits[..digits.bytes().take_while(u8::is_ascii_digit).count()];
    if digits.is_empty() {
        return None;
    }
    if negative {
        return Some(0);
    }

    let n = digits.bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    });
    Some(u32::try_from(n).unwrap_or(u32::MAX))
}

/// Parse a boolean-ish flag value: numbers (non-zero is true) or words.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        other => parse_leading_int(other).map(|n| n != 0),
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// ID3v2.3 split date collected across one dictionary.
#[derive(Debug, Default)]
struct SplitDate {
    year: Option<String>,
    day_month: Option<(String, String)>,
}

impl SplitDate {
    fn set(&mut self, part: DatePart, value: &str) {
        let value = value.trim();
        match part {
            DatePart::Year => {
                if value.len() >= 4 && value.bytes().take(4).all(|b| b.is_ascii_digit()) {
                    self.year = Some(value[..4].to_string());
                }
            }
            DatePart::DayMonth => {
                if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
                    self.day_month = Some((value[..2].to_string(), value[2..].to_string()));
                }
            }
        }
    }

    fn resolve(self) -> Option<String> {
        let year = self.year?;
        Some(match self.day_month {
            Some((day, month)) => format!("{year}-{month}-{day}"),
            None => year,
        })
    }
}

/// Maps raw metadata entries onto a [`Tag`].
///
/// Holds only a borrowed separator set; one normalizer can serve any number
/// of calls and threads.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    separators: &'a Separators,
}

impl<'a> Normalizer<'a> {
    pub fn new(separators: &'a Separators) -> Self {
        Self { separators }
    }

    pub fn separators(&self) -> &Separators {
        self.separators
    }

    /// Apply `entries` to `tag` in source order.
    ///
    /// Fields are only overwritten by non-empty values. Problems are added to
    /// `diagnostics`.
    pub fn normalize<'e, I>(&self, entries: I, scope: Scope, tag: &mut Tag, diagnostics: &mut Diagnostics)
    where
        I: IntoIterator<Item = &'e MetadataEntry>,
    {
        let mut split_date = SplitDate::default();

        for entry in entries {
            let key = synonyms::canonical_key(&entry.key);
            match synonyms::lookup(&key, scope) {
                Some(field) => self.apply(field, &key, &entry.value, scope, tag, &mut split_date, diagnostics),
                None => {
                    debug!(key = %entry.key, ?scope, "Unmapped metadata key");
                    diagnostics.push(NormalizeWarning::UnmappedKey { key });
                }
            }
        }

        if tag.release_date.is_empty() {
            if let Some(date) = split_date.resolve() {
                tag.release_date = date;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        field: Field,
        key: &str,
        value: &str,
        scope: Scope,
        tag: &mut Tag,
        split_date: &mut SplitDate,
        diagnostics: &mut Diagnostics,
    ) {
        match field {
            Field::Text(text) => set_if_present(text_slot(tag, text), value),
            Field::Joined(text) => set_if_present(text_slot(tag, text), &self.separators.rejoin(value)),
            Field::List(list) => {
                let values = match list {
                    ListField::Genres => self.separators.split_with(value, &[","]),
                    _ => self.separators.split(value),
                };
                set_list_if_present(list_slot(tag, list), values);
            }
            Field::Number(number) => match parse_leading_int(value) {
                Some(n) => *number_slot(tag, number) = n,
                None => malformed(key, value, diagnostics),
            },
            Field::Flag if scope.is_single_file() => match parse_flag(value) {
                Some(flag) => tag.compilation = flag,
                None => malformed(key, value, diagnostics),
            },
            Field::Flag => tag.compilation = true,
            Field::Role(role) => tag.add_artist_role(role, self.separators.split(value)),
            Field::RoleList => self.apply_role_list(value, tag),
            Field::PartialDate(part) => split_date.set(part, value),
            Field::Ignore => {}
        }
    }

    /// `role, person, role, person, ...`
    fn apply_role_list(&self, value: &str, tag: &mut Tag) {
        let items: Vec<&str> = value.split(',').collect();
        for pair in items.chunks_exact(2) {
            let people = self.separators.split(pair[1]);
            for role in self.separators.split(pair[0]) {
                tag.add_artist_role(&capitalize_words(&role), people.clone());
            }
        }
    }
}

fn malformed(key: &str, value: &str, diagnostics: &mut Diagnostics) {
    warn!(key, value, "Malformed numeric metadata value");
    diagnostics.push(NormalizeWarning::MalformedNumeric {
        key: key.to_string(),
        value: value.to_string(),
    });
}

fn text_slot(tag: &mut Tag, field: TextField) -> &mut String {
    match field {
        TextField::Title => &mut tag.title,
        TextField::Album => &mut tag.album,
        TextField::Artist => &mut tag.artist,
        TextField::AlbumArtist => &mut tag.album_artist,
        TextField::ArtistSort => &mut tag.artist_sort,
        TextField::AlbumArtistSort => &mut tag.album_artist_sort,
        TextField::ComposerSort => &mut tag.composer_sort,
        TextField::Mood => &mut tag.mood,
        TextField::Comment => &mut tag.comment,
        TextField::RecordLabel => &mut tag.record_label,
        TextField::DiscSubtitle => &mut tag.disc_subtitle,
        TextField::ReleaseDate => &mut tag.release_date,
        TextField::OriginalDate => &mut tag.original_date,
        TextField::MusicBrainzAlbumId => &mut tag.musicbrainz.album_id,
        TextField::MusicBrainzReleaseGroupId => &mut tag.musicbrainz.release_group_id,
        TextField::MusicBrainzTrackId => &mut tag.musicbrainz.track_id,
        TextField::MusicBrainzReleaseType => &mut tag.musicbrainz.release_type,
        TextField::MusicBrainzReleaseStatus => &mut tag.musicbrainz.release_status,
    }
}

fn list_slot(tag: &mut Tag, field: ListField) -> &mut Vec<String> {
    match field {
        ListField::Genres => &mut tag.genres,
        ListField::ArtistHints => &mut tag.artist_hints,
        ListField::AlbumArtistHints => &mut tag.album_artist_hints,
        ListField::MusicBrainzArtistIds => &mut tag.musicbrainz.artist_ids,
        ListField::MusicBrainzAlbumArtistIds => &mut tag.musicbrainz.album_artist_ids,
    }
}

fn number_slot(tag: &mut Tag, field: NumberField) -> &mut u32 {
    match field {
        NumberField::Track => &mut tag.track_number,
        NumberField::Disc => &mut tag.disc_number,
        NumberField::Bpm => &mut tag.bpm,
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const KEYS: &[&str] = &[
        "TITLE", "artist", "ALBUM ARTIST", "genre", "TRACK", "TBPM", "composer", "TPE3",
        "COMPILATION", "TYER", "TDAT", "INVOLVEDPEOPLE", "ALBUM/TITLE", "unknown key",
    ];

    fn entry() -> impl Strategy<Value = MetadataEntry> {
        (
            prop::sample::select(KEYS),
            prop::string::string_regex("[a-zA-Z0-9 ,;/&-]{0,24}").unwrap(),
        )
            .prop_map(|(k, v)| MetadataEntry::new(k, v))
    }

    fn scope() -> impl Strategy<Value = Scope> {
        prop::sample::select(vec![Scope::Container, Scope::Stream, Scope::Album, Scope::Chapter])
    }

    proptest! {
        /// Normalizing the same entries into fresh tags gives the same result
        #[test]
        fn normalize_is_idempotent(entries in prop::collection::vec(entry(), 0..16), scope in scope()) {
            let seps = Separators::default();
            let normalizer = Normalizer::new(&seps);

            let mut first = Tag::default();
            let mut first_diag = Diagnostics::new();
            normalizer.normalize(&entries, scope, &mut first, &mut first_diag);

            let mut second = Tag::default();
            let mut second_diag = Diagnostics::new();
            normalizer.normalize(&entries, scope, &mut second, &mut second_diag);

            prop_assert_eq!(first, second);
            prop_assert_eq!(first_diag, second_diag);
        }

        /// Arbitrary numeric text never panics
        #[test]
        fn parse_leading_int_never_panics(input in ".{0,32}") {
            let _ = parse_leading_int(&input);
        }
    }
}
