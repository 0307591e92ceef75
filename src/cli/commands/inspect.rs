//! Single-file inspection commands.

use std::path::Path;

use super::print_json;
use crate::metadata::{Diagnostics, Separators};
use crate::model::{CodecFacts, Tag};
use crate::reader::MediaReader;

/// Show the normalized tag of a file
pub fn cmd_tags(reader: &MediaReader, path: &Path, json: bool) -> anyhow::Result<()> {
    let loaded = reader.load_tag(path)?;
    if json {
        return print_json(&loaded);
    }

    println!("File: {}", path.display());
    if !loaded.tag.loaded {
        println!("  (no title, tag not loaded)");
    }
    print_tag(&loaded.tag, reader.separators());
    print_diagnostics(&loaded.diagnostics);
    Ok(())
}

/// Show codec and stream facts of a file
pub fn cmd_codec(reader: &MediaReader, path: &Path, json: bool) -> anyhow::Result<()> {
    let facts = reader.probe_codec_info(path)?;
    if json {
        return print_json(&facts);
    }

    println!("File: {}", path.display());
    print_facts(&facts);
    Ok(())
}

/// List the chapter items of a file
pub fn cmd_chapters(reader: &MediaReader, path: &Path, json: bool) -> anyhow::Result<()> {
    let set = reader.load_chapters(path)?;
    if json {
        return print_json(&set);
    }

    if set.items.is_empty() {
        println!("{} has no chapters.", path.display());
        return Ok(());
    }

    println!("{} chapters in {}:", set.items.len(), path.display());
    for item in &set.items {
        println!(
            "  {}  [{} - {}]{}",
            item.label,
            format_ms(item.start_offset_ms),
            format_ms(item.end_offset_ms),
            if item.anomalous { "  (suspicious length)" } else { "" }
        );
    }
    print_diagnostics(&set.diagnostics);
    Ok(())
}

fn print_tag(tag: &Tag, separators: &Separators) {
    let text = [
        ("Title", &tag.title),
        ("Artist", &tag.artist),
        ("Album", &tag.album),
        ("Album artist", &tag.album_artist),
        ("Released", &tag.release_date),
        ("Original", &tag.original_date),
        ("Label", &tag.record_label),
        ("Mood", &tag.mood),
        ("Comment", &tag.comment),
    ];
    for (label, value) in text {
        if !value.is_empty() {
            println!("  {label:<14}{value}");
        }
    }

    if !tag.genres.is_empty() {
        println!("  {:<14}{}", "Genres", separators.join(&tag.genres));
    }
    for role in &tag.roles {
        println!("  {:<14}{}", role.role, separators.join(&role.names));
    }
    if tag.track_number > 0 {
        println!("  {:<14}{}", "Track", tag.track_number);
    }
    if tag.disc_number > 0 {
        println!("  {:<14}{}", "Disc", tag.disc_number);
    }
    if tag.compilation {
        println!("  {:<14}yes", "Compilation");
    }
    if let Some(art) = &tag.art {
        println!("  {:<14}{} ({} bytes)", "Cover", art.mime_type, art.data.len());
    }

    print_facts(&CodecFacts {
        codec_name: tag.codec.clone(),
        bit_rate: tag.bit_rate,
        channels: tag.channels,
        bits_per_sample: tag.bits_per_sample,
        sample_rate: tag.sample_rate,
        duration: tag.duration,
    });
}

fn print_facts(facts: &CodecFacts) {
    println!("  {:<14}{}", "Codec", facts.codec_name);
    println!("  {:<14}{} Hz, {} ch", "Format", facts.sample_rate, facts.channels);
    if facts.bits_per_sample > 0 {
        println!("  {:<14}{} bit", "Depth", facts.bits_per_sample);
    }
    if facts.bit_rate > 0 {
        println!("  {:<14}{} kbps", "Bit rate", facts.bit_rate);
    }
    println!("  {:<14}{}", "Duration", format_ms(i64::from(facts.duration) * 1000));
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    let significant: Vec<_> = diagnostics.significant().collect();
    if significant.is_empty() {
        return;
    }
    eprintln!("\nWarnings:");
    for warning in significant {
        eprintln!("  - {warning}");
    }
}

/// Format milliseconds as `H:MM:SS` or `M:SS`.
fn format_ms(ms: i64) -> String {
    let total = ms.max(0) / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
