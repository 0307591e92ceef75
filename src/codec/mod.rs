//! Codec and stream probe.
//!
//! Reports the numeric parameters of a container's first audio stream and a
//! display codec name. Some codecs carry lossless or object-audio extensions
//! the demuxer cannot always tell apart from the base codec; for those the
//! declared profile is used when present, otherwise the stream's free-text
//! metadata and decoder configuration are inspected for hints.

use tracing::debug;

use crate::container::{CodecId, CodecProfile, ContainerHandle, StreamInfo};
use crate::error::ProbeError;
use crate::model::CodecFacts;

/// First byte of a DTS decoder configuration that carries a lossless
/// extension.
const DTS_MASTER_AUDIO_MARKER: u8 = 0x40;

/// What the stream's free-text metadata says about the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileHint {
    MasterAudio,
    Atmos,
}

/// Stream facts for the container's first audio stream.
pub fn probe_codec(handle: &ContainerHandle) -> Result<CodecFacts, ProbeError> {
    let container = handle.container();
    let stream = container.first_audio_stream().ok_or(ProbeError::NoAudioStream)?;

    let mut facts = codec_facts(stream);
    if facts.duration == 0 {
        facts.duration = container
            .duration_ms()
            .filter(|ms| *ms > 0)
            .map(|ms| (ms / 1000) as u32)
            .unwrap_or(0);
    }

    debug!(name = handle.name(), codec = %facts.codec_name, "Probed codec");
    Ok(facts)
}

/// Stream facts for one stream.
pub fn codec_facts(stream: &StreamInfo) -> CodecFacts {
    let bits_per_sample = stream
        .bits_per_coded_sample
        .filter(|b| *b > 0)
        .or(stream.bits_per_raw_sample)
        .unwrap_or(0);

    CodecFacts {
        codec_name: resolve_codec_name(stream),
        bit_rate: stream
            .bit_rate
            .map(|bps| u32::try_from(bps / 1000).unwrap_or(u32::MAX))
            .unwrap_or(0),
        channels: stream.channels.unwrap_or(0),
        bits_per_sample,
        sample_rate: stream.sample_rate.unwrap_or(0),
        duration: stream
            .duration_ms()
            .filter(|ms| *ms > 0)
            .map(|ms| u32::try_from(ms / 1000).unwrap_or(u32::MAX))
            .unwrap_or(0),
    }
}

/// Display name for the stream's codec.
///
/// Never fails: when the profile cannot be determined the base codec name
/// is returned.
pub fn resolve_codec_name(stream: &StreamInfo) -> String {
    if let Some(profile) = stream.profile {
        return profile_name(profile).to_string();
    }

    let hint = scan_hints(stream.metadata.iter().map(|e| e.value.as_str()));
    let name = match (&stream.codec, hint) {
        (CodecId::Dts, Some(ProfileHint::MasterAudio)) => "dtshd_ma",
        (CodecId::Dts, None) if has_master_audio_marker(stream) => "dtshd_ma",
        (CodecId::Eac3, Some(ProfileHint::Atmos)) => "eac3_ddp_atmos",
        (CodecId::TrueHd, Some(ProfileHint::Atmos)) => "truehd_atmos",
        (codec, _) => codec.short_name(),
    };
    name.to_string()
}

/// Name of a declared profile.
pub fn profile_name(profile: CodecProfile) -> &'static str {
    match profile {
        CodecProfile::DtsHdHra => "dtshd_hra",
        CodecProfile::DtsHdMa => "dtshd_ma",
        CodecProfile::DtsHdMaX => "dtshd_ma_x",
        CodecProfile::DtsHdMaXImax => "dtshd_ma_x_imax",
        CodecProfile::Eac3Atmos => "eac3_ddp_atmos",
        CodecProfile::TrueHdAtmos => "truehd_atmos",
    }
}

/// First profile hint among `values`, compared case-insensitively. The scan
/// stops at the first value that gives one.
pub fn scan_hints<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<ProfileHint> {
    values.into_iter().find_map(|value| {
        let value = value.to_uppercase();
        if ["HDMA", "DTS-HD", "MASTER AUDIO"].iter().any(|m| value.contains(m)) {
            Some(ProfileHint::MasterAudio)
        } else if ["ATMOS", "JOC"].iter().any(|m| value.contains(m)) {
            Some(ProfileHint::Atmos)
        } else {
            None
        }
    })
}

fn has_master_audio_marker(stream: &StreamInfo) -> bool {
    stream
        .private_data
        .as_deref()
        .and_then(<[u8]>::first)
        .is_some_and(|b| *b == DTS_MASTER_AUDIO_MARKER)
}
