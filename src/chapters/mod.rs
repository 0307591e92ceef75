//! Chapter/segment synthesis.
//!
//! A container with more than one chapter (an audiobook, a Matroska album,
//! a FLAC file with an embedded cuesheet) is presented as one playable item
//! per chapter. Each item starts from the album-level tag and takes the
//! chapter's own metadata on top of it.
//!
//! # End offsets
//!
//! Declared chapter ends are often wrong. An end is kept only if it is
//! positive, within the container's duration and not past the next emitted
//! chapter's start. Otherwise, in order:
//! 1. the next emitted chapter's start
//! 2. the stream-level duration
//! 3. the container-level duration

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::codec_facts;
use crate::config::ChapterConfig;
use crate::container::{ChapterInfo, ContainerHandle};
use crate::cover::{MUSIC_ART, wrapped_image_url};
use crate::localize::{Localizer, chapter_title};
use crate::metadata::{Diagnostics, NormalizeWarning, Normalizer, Scope, Separators, synonyms};
use crate::model::{ChapterItem, Tag};

/// Extension of audiobook containers, which use the single-file vocabulary
/// for their book-level tags.
const AUDIOBOOK_EXTENSION: &str = "m4b";

/// Everything chapter synthesis needs besides the container.
#[derive(Clone, Copy)]
pub struct ChapterContext<'a> {
    /// Resource name; used for thumbnails and to detect audiobooks
    pub resource: &'a str,
    pub separators: &'a Separators,
    pub localizer: &'a dyn Localizer,
    pub config: &'a ChapterConfig,
}

impl std::fmt::Debug for ChapterContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterContext")
            .field("resource", &self.resource)
            .field("separators", &self.separators)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChapterContext<'_> {
    pub fn is_audiobook(&self) -> bool {
        is_audiobook(self.resource)
    }
}

/// Result of chapter synthesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChapterSet {
    /// One item per emitted chapter, in container order
    pub items: Vec<ChapterItem>,
    pub diagnostics: Diagnostics,
}

/// Whether `resource` names an audiobook container.
pub fn is_audiobook(resource: &str) -> bool {
    Path::new(resource)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(AUDIOBOOK_EXTENSION))
}

/// Album-level tag shared by every chapter item.
///
/// Container metadata read with the album vocabulary (or the single-file one
/// for audiobooks), plus the first audio stream's facts and embedded art.
pub fn album_defaults(handle: &ContainerHandle, ctx: &ChapterContext<'_>, diagnostics: &mut Diagnostics) -> Tag {
    let container = handle.container();
    let normalizer = Normalizer::new(ctx.separators);
    let mut tag = Tag::default();

    if ctx.is_audiobook() {
        normalizer.normalize(&container.metadata, Scope::Container, &mut tag, diagnostics);
        if tag.album.is_empty() {
            tag.album = tag.title.clone();
        }
        // The book description replaces any comment, wherever it appears
        if let Some(description) = container
            .metadata
            .iter()
            .rev()
            .filter(|e| synonyms::canonical_key(&e.key) == "DESCRIPTION")
            .map(|e| e.value.trim())
            .find(|v| !v.is_empty())
        {
            tag.comment = description.to_string();
        }
    } else {
        normalizer.normalize(&container.metadata, Scope::Album, &mut tag, diagnostics);
    }

    if let Some(stream) = container.first_audio_stream() {
        tag.apply_codec_facts(&codec_facts(stream));
    }
    tag.art = container.art.clone();
    tag
}

/// One item per chapter with a non-negative start.
pub fn synthesize(handle: &ContainerHandle, album: &Tag, ctx: &ChapterContext<'_>) -> ChapterSet {
    let container = handle.container();
    let normalizer = Normalizer::new(ctx.separators);
    let mut diagnostics = Diagnostics::new();

    let kept: Vec<(usize, &ChapterInfo)> = container
        .chapters
        .iter()
        .enumerate()
        .filter(|(index, chapter)| {
            if chapter.start < 0 {
                warn!(index, start = chapter.start, resource = ctx.resource, "Dropping chapter with negative start");
                false
            } else {
                true
            }
        })
        .collect();

    let durations = Durations {
        stream_ms: container.stream_duration_ms().filter(|ms| *ms > 0),
        format_ms: container.duration_ms().filter(|ms| *ms > 0),
    };

    let thumbnail = (container.chapters.len() > 1 && ctx.config.thumbnails)
        .then(|| wrapped_image_url(ctx.resource, MUSIC_ART));

    let mut items = Vec::with_capacity(kept.len());
    for (ordinal, (index, chapter)) in kept.iter().enumerate() {
        let number = ordinal + 1;
        let start = chapter.start_ms();
        let declared_end = chapter.end_ms();
        let next_start = kept.get(ordinal + 1).map(|(_, next)| next.start_ms());

        let anomalous = match declared_end {
            Some(end) if end >= 0 && end - start < ctx.config.min_chapter_ms => {
                warn!(
                    index,
                    duration_ms = end - start,
                    resource = ctx.resource,
                    "Tiny chapter detected, the file probably needs its chapters correcting"
                );
                diagnostics.push(NormalizeWarning::AnomalousChapterDuration {
                    index: *index,
                    duration_ms: end - start,
                });
                true
            }
            _ => false,
        };

        let end = durations.correct_end(start, declared_end, next_start);

        let mut tag = album.clone();
        tag.title.clear();
        normalizer.normalize(&chapter.metadata, Scope::Chapter, &mut tag, &mut diagnostics);
        if tag.title.is_empty() {
            tag.title = chapter_title(ctx.localizer, number);
        }
        tag.track_number = u32::try_from(number).unwrap_or(u32::MAX);
        tag.duration = u32::try_from((end - start).max(0) / 1000).unwrap_or(u32::MAX);
        tag.finish();

        let label = format!("{number:02}. {} - {}", tag.album, tag.title);
        debug!(number, start, end, title = %tag.title, "Chapter item");

        items.push(ChapterItem {
            tag,
            start_offset_ms: start,
            end_offset_ms: end,
            bookmark_ms: start,
            thumbnail: if anomalous { None } else { thumbnail.clone() },
            label,
            anomalous,
        });
    }

    ChapterSet { items, diagnostics }
}

/// Usable container durations in milliseconds. Zero and negative values
/// are treated as unknown.
#[derive(Debug, Clone, Copy)]
struct Durations {
    stream_ms: Option<i64>,
    format_ms: Option<i64>,
}

impl Durations {
    fn total_ms(&self) -> Option<i64> {
        self.format_ms.or(self.stream_ms)
    }

    fn correct_end(&self, start: i64, declared: Option<i64>, next_start: Option<i64>) -> i64 {
        if let Some(end) = declared {
            let within_total = self.total_ms().is_none_or(|total| end <= total);
            let before_next = next_start.is_none_or(|next| end <= next);
            if end > 0 && within_total && before_next {
                return end;
            }
        }
        next_start
            .or(self.stream_ms)
            .or(self.format_ms)
            .unwrap_or(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Container, MetadataEntry, TIME_BASE_US, TimeBase};
    use crate::localize::EnglishStrings;
    use crate::model::EmbeddedArt;
    use crate::test_utils::{chapter_secs, container_with_chapters};

    fn run(handle: &ContainerHandle, config: &ChapterConfig) -> ChapterSet {
        let seps = Separators::default();
        let ctx = ChapterContext {
            resource: handle.name(),
            separators: &seps,
            localizer: &EnglishStrings,
            config,
        };
        let mut diagnostics = Diagnostics::new();
        let album = album_defaults(handle, &ctx, &mut diagnostics);
        let mut set = synthesize(handle, &album, &ctx);
        diagnostics.extend(set.diagnostics);
        set.diagnostics = diagnostics;
        set
    }

    #[test]
    fn test_format_duration_fallback_for_last_chapter() {
        let mut container = container_with_chapters(vec![
            chapter_secs(0, Some(199)),
            chapter_secs(200, Some(399)),
            chapter_secs(400, Some(-1)),
        ]);
        container.duration_us = Some(600 * TIME_BASE_US);
        container.streams[0].duration = Some(-1);
        let handle = ContainerHandle::from_container("album.mka", container);

        let set = run(&handle, &ChapterConfig::default());
        let ends: Vec<i64> = set.items.iter().map(|i| i.end_offset_ms).collect();
        assert_eq!(ends, [199_000, 399_000, 600_000]);
        let durations: Vec<u32> = set.items.iter().map(|i| i.tag.duration).collect();
        assert_eq!(durations, [199, 199, 200]);
    }

    #[test]
    fn test_stream_duration_before_format_duration() {
        let mut container = container_with_chapters(vec![chapter_secs(0, Some(100)), chapter_secs(100, None)]);
        container.duration_us = Some(500 * TIME_BASE_US);
        container.streams[0].time_base = Some(TimeBase::new(1, 1000));
        container.streams[0].duration = Some(450_000);
        let handle = ContainerHandle::from_container("album.mka", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items[1].end_offset_ms, 450_000);
    }

    #[test]
    fn test_end_past_total_uses_next_start() {
        let mut container = container_with_chapters(vec![chapter_secs(0, Some(9_999)), chapter_secs(60, Some(120))]);
        container.duration_us = Some(120 * TIME_BASE_US);
        let handle = ContainerHandle::from_container("album.mka", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items[0].end_offset_ms, 60_000);
        assert_eq!(set.items[1].end_offset_ms, 120_000);
    }

    #[test]
    fn test_overlapping_end_is_clipped_to_next_start() {
        let mut container = container_with_chapters(vec![chapter_secs(0, Some(70)), chapter_secs(60, Some(120))]);
        container.duration_us = Some(120 * TIME_BASE_US);
        let handle = ContainerHandle::from_container("album.mka", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items[0].end_offset_ms, 60_000);
    }

    #[test]
    fn test_negative_start_is_dropped() {
        let mut container = container_with_chapters(vec![
            chapter_secs(-5, Some(0)),
            chapter_secs(0, Some(100)),
            chapter_secs(100, Some(200)),
            chapter_secs(200, Some(300)),
        ]);
        container.duration_us = Some(300 * TIME_BASE_US);
        let handle = ContainerHandle::from_container("album.mka", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items.len(), 3);
        let numbers: Vec<u32> = set.items.iter().map(|i| i.tag.track_number).collect();
        assert_eq!(numbers, [1, 2, 3]);
        assert_eq!(set.items[0].start_offset_ms, 0);
        assert_eq!(set.items[0].tag.title, "Chapter 1");
    }

    #[test]
    fn test_short_chapter_is_kept_without_thumbnail() {
        let mut container = container_with_chapters(vec![
            chapter_secs(0, Some(100)),
            ChapterInfo {
                start: 100_000,
                end: Some(100_400),
                time_base: TimeBase::new(1, 1000),
                metadata: vec![],
            },
            chapter_secs(101, Some(200)),
        ]);
        container.duration_us = Some(200 * TIME_BASE_US);
        let handle = ContainerHandle::from_container("/music/album.mka", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items.len(), 3);
        assert!(set.items[1].anomalous);
        assert_eq!(set.items[1].thumbnail, None);
        assert_eq!(
            set.items[0].thumbnail.as_deref(),
            Some("image://music@%2Fmusic%2Falbum.mka/")
        );
        assert!(set.items[2].thumbnail.is_some());
        assert!(set.diagnostics.iter().any(|w| matches!(
            w,
            NormalizeWarning::AnomalousChapterDuration {
                index: 1,
                duration_ms: 400
            }
        )));
    }

    #[test]
    fn test_thumbnails_can_be_disabled() {
        let container = container_with_chapters(vec![chapter_secs(0, Some(10)), chapter_secs(10, Some(20))]);
        let handle = ContainerHandle::from_container("album.mka", container);
        let config = ChapterConfig {
            thumbnails: false,
            ..Default::default()
        };
        let set = run(&handle, &config);
        assert!(set.items.iter().all(|i| i.thumbnail.is_none()));
    }

    #[test]
    fn test_chapter_tags_override_album_defaults() {
        let mut first = chapter_secs(0, Some(100));
        first.metadata = vec![
            MetadataEntry::new("TITLE", "Overture"),
            MetadataEntry::new("COMPOSER", "Rossini"),
            MetadataEntry::new("TRACK", "9"),
        ];
        let mut container = container_with_chapters(vec![first, chapter_secs(100, Some(200))]);
        container.metadata = vec![
            MetadataEntry::new("ALBUM/TITLE", "Overtures"),
            MetadataEntry::new("ARTIST", "Orchestra"),
            MetadataEntry::new("GENRE", "Classical, Opera"),
        ];
        container.art = Some(EmbeddedArt {
            data: vec![0xFF, 0xD8],
            mime_type: "image/jpeg".into(),
        });
        let handle = ContainerHandle::from_container("overtures.mka", container);

        let set = run(&handle, &ChapterConfig::default());
        let first = &set.items[0];
        assert_eq!(first.tag.title, "Overture");
        assert_eq!(first.tag.album, "Overtures");
        assert_eq!(first.tag.artist, "Orchestra");
        assert_eq!(first.tag.genres, ["Classical", "Opera"]);
        assert_eq!(first.tag.composer(), ["Rossini"]);
        assert_eq!(first.tag.track_number, 1);
        assert!(first.tag.loaded);
        assert!(first.tag.art.is_some());
        assert_eq!(first.label, "01. Overtures - Overture");
        assert_eq!(first.bookmark_ms, 0);

        // Chapter metadata does not leak into siblings
        let second = &set.items[1];
        assert_eq!(second.tag.title, "Chapter 2");
        assert!(second.tag.composer().is_empty());
        assert_eq!(second.label, "02. Overtures - Chapter 2");
    }

    #[test]
    fn test_audiobook_layout() {
        let mut first = chapter_secs(0, Some(600));
        first.metadata = vec![MetadataEntry::new("title", "Prologue")];
        let mut second = chapter_secs(600, None);
        second.metadata = vec![MetadataEntry::new("artist", "Guest Narrator")];
        let mut container = container_with_chapters(vec![first, second]);
        container.duration_us = Some(1200 * TIME_BASE_US);
        container.metadata = vec![
            MetadataEntry::new("title", "The Book"),
            MetadataEntry::new("artist", "The Author"),
            MetadataEntry::new("description", "A long story"),
        ];
        let handle = ContainerHandle::from_container("/books/The Book.M4B", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items.len(), 2);

        let first = &set.items[0];
        assert_eq!(first.tag.title, "Prologue");
        assert_eq!(first.tag.album, "The Book");
        assert_eq!(first.tag.artist, "The Author");
        assert_eq!(first.tag.comment, "A long story");

        let second = &set.items[1];
        assert_eq!(second.tag.title, "Chapter 2");
        assert_eq!(second.tag.artist, "Guest Narrator");
        assert_eq!(second.end_offset_ms, 1_200_000);
        assert_eq!(second.tag.duration, 600);
    }

    #[test]
    fn test_audiobook_description_beats_later_comment() {
        let mut container = container_with_chapters(vec![chapter_secs(0, Some(60)), chapter_secs(60, Some(120))]);
        container.metadata = vec![
            MetadataEntry::new("title", "The Book"),
            MetadataEntry::new("description", "Publisher blurb"),
            MetadataEntry::new("comment", "Ripped from CD"),
        ];
        let handle = ContainerHandle::from_container("The Book.m4b", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items.len(), 2);
        assert!(set.items.iter().all(|i| i.tag.comment == "Publisher blurb"));
    }

    #[test]
    fn test_album_comment_kept_outside_audiobooks() {
        let mut container = container_with_chapters(vec![chapter_secs(0, Some(60)), chapter_secs(60, Some(120))]);
        container.metadata = vec![
            MetadataEntry::new("description", "Liner notes"),
            MetadataEntry::new("comment", "Ripped from CD"),
        ];
        let handle = ContainerHandle::from_container("concert.m4a", container);

        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items[0].tag.comment, "Ripped from CD");
    }

    #[test]
    fn test_is_audiobook() {
        assert!(is_audiobook("a/b/book.m4b"));
        assert!(is_audiobook("BOOK.M4B"));
        assert!(!is_audiobook("album.m4a"));
        assert!(!is_audiobook("m4b"));
    }

    #[test]
    fn test_no_durations_known() {
        let container = Container {
            chapters: vec![chapter_secs(0, None), chapter_secs(30, None)],
            ..Default::default()
        };
        let handle = ContainerHandle::from_container("album.mka", container);
        let set = run(&handle, &ChapterConfig::default());
        assert_eq!(set.items[0].end_offset_ms, 30_000);
        // Nothing left to fall back to: zero-length item
        assert_eq!(set.items[1].end_offset_ms, 30_000);
        assert_eq!(set.items[1].tag.duration, 0);
    }
}
