//! Read cover art straight from a file's tags.
//!
//! The demuxer does not expose pictures for every format (Matroska
//! attachments, some MP4 layouts), so this reads them with lofty instead:
//! - ID3v2 APIC frames (MP3)
//! - Vorbis comment pictures (FLAC, OGG)
//! - MP4 `covr` atoms (M4A/M4B)

use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, PictureType};
use lofty::probe::Probe;
use std::path::Path;

use crate::model::EmbeddedArt;

/// Front cover from any tag in the file, else the first picture found.
///
/// Returns None if there is no picture or the file can't be read.
pub fn read_embedded_cover(path: &Path) -> Option<EmbeddedArt> {
    let tagged_file = Probe::open(path).ok()?.read().ok()?;

    let pictures: Vec<_> = tagged_file.tags().iter().flat_map(|t| t.pictures()).collect();
    let picture = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())?;

    let mime_type = match picture.mime_type() {
        Some(MimeType::Png) => "image/png",
        Some(MimeType::Gif) => "image/gif",
        Some(MimeType::Bmp) => "image/bmp",
        Some(MimeType::Tiff) => "image/tiff",
        _ => "image/jpeg",
    };

    tracing::debug!(?path, size = picture.data().len(), mime_type, "Read embedded cover");
    Some(EmbeddedArt {
        data: picture.data().to_vec(),
        mime_type: mime_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_has_no_cover() {
        assert!(read_embedded_cover(Path::new("nonexistent.m4b")).is_none());
    }

    #[test]
    fn test_non_audio_file_has_no_cover() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Not an audio file").unwrap();
        assert!(read_embedded_cover(file.path()).is_none());
    }
}
