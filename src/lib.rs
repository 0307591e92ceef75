//! tagweave - audio container metadata normalization and chapter extraction.
//!
//! Opens media containers, normalizes their loosely-keyed metadata into a
//! canonical [`Tag`](model::Tag), reports stream facts and turns
//! multi-chapter containers into one playable item per chapter.
//!
//! Most callers only need [`MediaReader`](reader::MediaReader):
//!
//! ```no_run
//! use std::path::Path;
//! use tagweave::config::Config;
//! use tagweave::reader::MediaReader;
//!
//! let reader = MediaReader::new(Config::default());
//! let loaded = reader.load_tag(Path::new("album.flac"))?;
//! println!("{}", loaded.tag.title);
//! # Ok::<(), tagweave::error::Error>(())
//! ```

pub mod chapters;
pub mod cli;
pub mod codec;
pub mod config;
pub mod container;
pub mod cover;
pub mod error;
pub mod localize;
pub mod metadata;
pub mod model;
pub mod reader;
pub mod source;
#[cfg(test)]
pub mod test_utils;
