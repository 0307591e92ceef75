//! Canonical output records.
//!
//! Defines the primary entities produced by extraction: [`Tag`],
//! [`ChapterItem`] and [`CodecFacts`]. Every component writes into these;
//! none of them keep state between calls.
//!
//! Text setters follow last-non-empty-wins: an empty or whitespace-only value
//! never clears a field that already holds something.

use serde::{Serialize, Serializer};

/// A named contributor role and the people credited with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistRole {
    /// Capitalized role name, e.g. "Composer"
    pub role: String,
    /// People credited, in tag order
    pub names: Vec<String>,
}

/// Picture data embedded in the container.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedArt {
    /// Raw image bytes
    #[serde(rename = "size", serialize_with = "serialize_len")]
    pub data: Vec<u8>,
    /// MIME type (image/jpeg, image/png)
    pub mime_type: String,
}

impl std::fmt::Debug for EmbeddedArt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedArt")
            .field("size", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

fn serialize_len<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(data.len() as u64)
}

/// MusicBrainz identifiers and release classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MusicBrainzIds {
    pub artist_ids: Vec<String>,
    pub album_id: String,
    pub album_artist_ids: Vec<String>,
    pub release_group_id: String,
    pub track_id: String,
    pub release_type: String,
    pub release_status: String,
}

/// Canonical normalized metadata for one playable item.
///
/// Callers must not trust any field until [`Tag::loaded`] is true, which
/// only happens once a non-empty title was established.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tag {
    pub title: String,
    pub album: String,
    pub artist: String,
    pub album_artist: String,
    pub artist_sort: String,
    pub album_artist_sort: String,
    pub composer_sort: String,
    /// Individual artist names when the tagger stored them separately
    pub artist_hints: Vec<String>,
    pub album_artist_hints: Vec<String>,
    pub genres: Vec<String>,
    pub mood: String,
    pub comment: String,
    pub record_label: String,
    pub disc_subtitle: String,
    /// ISO 8601 date or part thereof
    pub release_date: String,
    pub original_date: String,
    pub musicbrainz: MusicBrainzIds,

    pub track_number: u32,
    pub disc_number: u32,
    pub bpm: u32,
    /// Duration in seconds
    pub duration: u32,
    /// Bit rate in kbit/s
    pub bit_rate: u32,
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub channels: u32,
    pub codec: String,

    pub roles: Vec<ArtistRole>,
    pub compilation: bool,
    pub loaded: bool,
    pub art: Option<EmbeddedArt>,
}

/// Assign `value` to `slot` unless it is blank.
pub(crate) fn set_if_present(slot: &mut String, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        *slot = value.to_string();
    }
}

/// Replace `slot` with `values` unless there are none.
pub(crate) fn set_list_if_present(slot: &mut Vec<String>, values: Vec<String>) {
    if !values.is_empty() {
        *slot = values;
    }
}

impl Tag {
    pub fn set_title(&mut self, value: &str) {
        set_if_present(&mut self.title, value);
    }

    pub fn set_album(&mut self, value: &str) {
        set_if_present(&mut self.album, value);
    }

    pub fn set_artist(&mut self, value: &str) {
        set_if_present(&mut self.artist, value);
    }

    pub fn set_album_artist(&mut self, value: &str) {
        set_if_present(&mut self.album_artist, value);
    }

    pub fn set_comment(&mut self, value: &str) {
        set_if_present(&mut self.comment, value);
    }

    pub fn set_genres(&mut self, genres: Vec<String>) {
        set_list_if_present(&mut self.genres, genres);
    }

    /// Credit `names` with `role`, merging into an existing entry for the
    /// same role. Names already credited are not repeated.
    pub fn add_artist_role(&mut self, role: &str, names: Vec<String>) {
        let role = role.trim();
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if role.is_empty() || names.is_empty() {
            return;
        }

        match self.roles.iter_mut().find(|r| r.role == role) {
            Some(entry) => {
                for name in names {
                    if !entry.names.contains(&name) {
                        entry.names.push(name);
                    }
                }
            }
            None => {
                let mut unique: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    if !unique.contains(&name) {
                        unique.push(name);
                    }
                }
                self.roles.push(ArtistRole {
                    role: role.to_string(),
                    names: unique,
                });
            }
        }
    }

    /// Names credited with `role`.
    pub fn role(&self, role: &str) -> &[String] {
        self.roles
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.names.as_slice())
            .unwrap_or(&[])
    }

    /// Names credited as composer.
    pub fn composer(&self) -> &[String] {
        self.role("Composer")
    }

    /// Set `loaded` from the title invariant.
    pub fn finish(&mut self) {
        self.loaded = !self.title.trim().is_empty();
    }

    /// Copy stream facts into the tag.
    pub fn apply_codec_facts(&mut self, facts: &CodecFacts) {
        self.bit_rate = facts.bit_rate;
        self.sample_rate = facts.sample_rate;
        self.bits_per_sample = facts.bits_per_sample;
        self.channels = facts.channels;
        set_if_present(&mut self.codec, &facts.codec_name);
        if self.duration == 0 {
            self.duration = facts.duration;
        }
    }
}

/// Stream facts reported by the codec probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodecFacts {
    /// Display codec name, e.g. "flac" or "dtshd_ma"
    pub codec_name: String,
    /// Bit rate in kbit/s
    pub bit_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    /// Stream duration in whole seconds
    pub duration: u32,
}

/// One synthetic playable item cut from a multi-chapter container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterItem {
    /// Album defaults overlaid with the chapter's own metadata
    pub tag: Tag,
    pub start_offset_ms: i64,
    pub end_offset_ms: i64,
    /// Resume position for the item
    pub bookmark_ms: i64,
    /// Wrapped art reference for the container, if attached
    pub thumbnail: Option<String>,
    /// Display label: "NN. <album> - <title>"
    pub label: String,
    /// Declared duration was shorter than the configured minimum
    pub anomalous: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_ignore_blank_values() {
        let mut tag = Tag::default();
        tag.set_title("Intro");
        tag.set_title("");
        tag.set_title("   ");
        assert_eq!(tag.title, "Intro");

        tag.set_title("  Outro ");
        assert_eq!(tag.title, "Outro");
    }

    #[test]
    fn test_add_artist_role_merges_and_dedups() {
        let mut tag = Tag::default();
        tag.add_artist_role("Composer", vec!["Bach".into(), " Handel ".into()]);
        tag.add_artist_role("Conductor", vec!["Karajan".into()]);
        tag.add_artist_role("Composer", vec!["Bach".into(), "Vivaldi".into(), "".into()]);

        assert_eq!(tag.roles.len(), 2);
        assert_eq!(tag.composer(), ["Bach", "Handel", "Vivaldi"]);
        assert_eq!(tag.role("Conductor"), ["Karajan"]);
        assert!(tag.role("Producer").is_empty());
    }

    #[test]
    fn test_add_artist_role_skips_empty_input() {
        let mut tag = Tag::default();
        tag.add_artist_role("", vec!["Someone".into()]);
        tag.add_artist_role("Mixer", vec!["  ".into()]);
        assert!(tag.roles.is_empty());
    }

    #[test]
    fn test_finish_requires_title() {
        let mut tag = Tag {
            album: "Album".into(),
            ..Default::default()
        };
        tag.finish();
        assert!(!tag.loaded);

        tag.set_title("Song");
        tag.finish();
        assert!(tag.loaded);
    }

    #[test]
    fn test_apply_codec_facts_keeps_existing_duration() {
        let mut tag = Tag {
            duration: 42,
            ..Default::default()
        };
        tag.apply_codec_facts(&CodecFacts {
            codec_name: "flac".into(),
            bit_rate: 900,
            channels: 2,
            bits_per_sample: 16,
            sample_rate: 44100,
            duration: 300,
        });
        assert_eq!(tag.codec, "flac");
        assert_eq!(tag.sample_rate, 44100);
        assert_eq!(tag.duration, 42);
    }

    #[test]
    fn test_embedded_art_serializes_size_only() {
        let art = EmbeddedArt {
            data: vec![0u8; 512],
            mime_type: "image/png".into(),
        };
        let json = serde_json::to_value(&art).unwrap();
        assert_eq!(json["size"], 512);
        assert_eq!(json["mime_type"], "image/png");
    }
}
