//! Cover art for containers and chapter items.
//!
//! Art comes from the demuxer's visuals first and from the file's tags
//! (read with lofty) when the demuxer had none. Chapter items do not carry
//! image bytes; they reference the container's art through a wrapped image
//! URL that a thumbnail loader can resolve later.

mod embedded;

pub use embedded::read_embedded_cover;

use std::path::Path;

use crate::container::ContainerHandle;
use crate::model::EmbeddedArt;

/// Art type used for music thumbnails.
pub const MUSIC_ART: &str = "music";

/// Wrap `resource` as an image reference of the given art type:
/// `image://<kind>@<url-encoded resource>/`.
pub fn wrapped_image_url(resource: &str, kind: &str) -> String {
    if kind.is_empty() {
        format!("image://{}/", urlencoding::encode(resource))
    } else {
        format!("image://{kind}@{}/", urlencoding::encode(resource))
    }
}

/// Embedded art for an opened container.
///
/// `path` is consulted only when the demuxer exposed no picture.
pub fn resolve_cover(handle: &ContainerHandle, path: Option<&Path>) -> Option<EmbeddedArt> {
    handle
        .container()
        .art
        .clone()
        .or_else(|| path.and_then(read_embedded_cover))
}
