//! Caller-facing readers.
//!
//! [`MediaReader`] glues the prober, the normalizer, the codec probe and the
//! chapter synthesizer together for a path on disk. Each call opens its own
//! container handle and releases it before returning, so one reader can be
//! shared freely across threads.
//!
//! The `*_from_handle` variants do the same work on an already opened
//! handle, for callers that bring their own byte source.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::chapters::{self, ChapterContext, ChapterSet};
use crate::codec;
use crate::config::Config;
use crate::container::{self, ContainerHandle, ProbeOptions};
use crate::cover::resolve_cover;
use crate::error::{Error, Result, ResultExt};
use crate::localize::{EnglishStrings, Localizer};
use crate::metadata::{Diagnostics, Normalizer, Scope, Separators};
use crate::model::{CodecFacts, Tag};

/// A normalized tag plus everything odd found on the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadedTag {
    pub tag: Tag,
    pub diagnostics: Diagnostics,
}

/// Reads tags, chapters and stream facts from media files.
#[derive(Clone)]
pub struct MediaReader {
    config: Config,
    separators: Separators,
    localizer: Arc<dyn Localizer>,
}

impl std::fmt::Debug for MediaReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaReader")
            .field("config", &self.config)
            .field("separators", &self.separators)
            .finish_non_exhaustive()
    }
}

impl Default for MediaReader {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl MediaReader {
    /// Create a reader with English strings.
    pub fn new(config: Config) -> Self {
        let separators = config.tags.separators();
        Self {
            config,
            separators,
            localizer: Arc::new(EnglishStrings),
        }
    }

    /// Use `localizer` for default chapter titles.
    pub fn with_localizer(mut self, localizer: impl Localizer + 'static) -> Self {
        self.localizer = Arc::new(localizer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    /// Open the container at `path`.
    pub fn open(&self, path: &Path) -> Result<ContainerHandle> {
        if !path.exists() {
            return Err(Error::not_found(path));
        }
        let options = ProbeOptions::from(&self.config.probe);
        container::open_path(path, &options).with_context(format!("Failed to open {}", path.display()))
    }

    // ========================================================================
    // Single-item tags
    // ========================================================================

    /// Normalized tag for the whole file.
    pub fn load_tag(&self, path: &Path) -> Result<LoadedTag> {
        let handle = self.open(path)?;
        let loaded = self
            .tag_from_handle(&handle, Some(path))
            .with_context(format!("Failed to read {}", path.display()))?;
        info!(path = %path.display(), loaded = loaded.tag.loaded, "Loaded tag");
        Ok(loaded)
    }

    /// Normalized tag for an opened container.
    ///
    /// Stream-level tags are read first and container-level tags override
    /// them. `path` is only used to look for cover art the demuxer missed.
    pub fn tag_from_handle(&self, handle: &ContainerHandle, path: Option<&Path>) -> Result<LoadedTag> {
        let container = handle.container();
        let normalizer = Normalizer::new(&self.separators);
        let mut tag = Tag::default();
        let mut diagnostics = Diagnostics::new();

        if let Some(stream) = container.first_audio_stream() {
            normalizer.normalize(&stream.metadata, Scope::Stream, &mut tag, &mut diagnostics);
        }
        normalizer.normalize(&container.metadata, Scope::Container, &mut tag, &mut diagnostics);

        let facts = codec::probe_codec(handle)?;
        tag.apply_codec_facts(&facts);
        tag.art = resolve_cover(handle, path);
        tag.finish();

        debug!(
            name = handle.name(),
            title = %tag.title,
            warnings = diagnostics.len(),
            "Normalized container tags"
        );
        Ok(LoadedTag { tag, diagnostics })
    }

    // ========================================================================
    // Chapters
    // ========================================================================

    /// One item per chapter. Files with fewer than two chapters give an
    /// empty set.
    pub fn load_chapters(&self, path: &Path) -> Result<ChapterSet> {
        let handle = self.open(path)?;
        let set = self.chapters_from_handle(&handle);
        info!(path = %path.display(), items = set.items.len(), "Loaded chapters");
        Ok(set)
    }

    /// Chapter items for an opened container.
    pub fn chapters_from_handle(&self, handle: &ContainerHandle) -> ChapterSet {
        if !handle.has_chapters() {
            return ChapterSet::default();
        }

        let ctx = ChapterContext {
            resource: handle.name(),
            separators: &self.separators,
            localizer: self.localizer.as_ref(),
            config: &self.config.chapters,
        };

        let mut diagnostics = Diagnostics::new();
        let album = chapters::album_defaults(handle, &ctx, &mut diagnostics);
        let mut set = chapters::synthesize(handle, &album, &ctx);
        diagnostics.extend(std::mem::take(&mut set.diagnostics));
        set.diagnostics = diagnostics;
        set
    }

    /// Whether the file has more than one chapter.
    pub fn contains_chapters(&self, path: &Path) -> Result<bool> {
        Ok(self.open(path)?.has_chapters())
    }

    // ========================================================================
    // Stream facts
    // ========================================================================

    /// Codec name and numeric parameters of the first audio stream.
    pub fn probe_codec_info(&self, path: &Path) -> Result<CodecFacts> {
        let handle = self.open(path)?;
        codec::probe_codec(&handle).with_context(format!("Failed to probe {}", path.display()))
    }
}
