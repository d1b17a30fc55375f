use std::path::Path;

use anyhow::{Context, Result};

use crate::dispatch::SampleType;
use crate::engine::StringField;
use crate::format::{ContainerType, Endianness, FormatWord, Subtype};
use crate::resource::WriteSettings;

/// One end of a frame range, in frames or seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeBound {
    Frames(i64),
    Seconds(f64),
}

impl RangeBound {
    fn to_frames(self, samplerate: u32) -> i64 {
        match self {
            RangeBound::Frames(frames) => frames,
            RangeBound::Seconds(secs) => (secs * samplerate as f64).round() as i64,
        }
    }
}

/// A `start..stop` range; missing ends mean the start or end of the data
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeSpec {
    pub start: Option<RangeBound>,
    pub stop: Option<RangeBound>,
}

impl RangeSpec {
    /// Frame indices for a resource with `frames` frames at `samplerate`
    pub fn resolve(&self, samplerate: u32, frames: u64) -> (i64, i64) {
        let start = self.start.map(|b| b.to_frames(samplerate)).unwrap_or(0);
        let stop = self
            .stop
            .map(|b| b.to_frames(samplerate))
            .unwrap_or(frames as i64);
        (start, stop)
    }
}

/// Parse a format word: `0x10002`, `65538`, or `container[:subtype[:endian]]`
///
/// Subtype names accept both `pcm_16` and `pcm16`; the subtype defaults to
/// PCM_16 and the endianness to the container's own.
pub fn parse_format(s: &str) -> Result<FormatWord> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let word = u32::from_str_radix(hex, 16).context("Invalid hexadecimal format word")?;
        return Ok(FormatWord(word));
    }
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        let word: u32 = s.parse().context("Invalid format word")?;
        return Ok(FormatWord(word));
    }

    let mut parts = s.split(':');
    let container_name = parts.next().unwrap_or_default();
    let container: ContainerType = container_name
        .parse()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Invalid container in format '{}'", s))?;
    let subtype = match parts.next() {
        Some(name) => parse_subtype(name).with_context(|| format!("Invalid subtype in format '{}'", s))?,
        None => Subtype::Pcm16,
    };
    let endian = match parts.next() {
        Some(name) => name
            .parse::<Endianness>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid endianness in format '{}'", s))?,
        None => Endianness::File,
    };
    if parts.next().is_some() {
        anyhow::bail!("Format must be container[:subtype[:endian]], got '{}'", s);
    }
    Ok(FormatWord::compose(container, subtype, endian))
}

/// Parse a subtype name, with or without underscores
pub fn parse_subtype(s: &str) -> Result<Subtype> {
    if let Ok(subtype) = s.parse::<Subtype>() {
        return Ok(subtype);
    }
    let compact = |name: &str| name.replace(['_', '-'], "").to_ascii_uppercase();
    let wanted = compact(s);
    Subtype::KNOWN
        .iter()
        .find(|(_, _, label)| compact(*label) == wanted)
        .map(|(subtype, _, _)| *subtype)
        .with_context(|| format!("Unknown subtype '{}'", s))
}

pub fn parse_sample_type(s: &str) -> Result<SampleType> {
    s.parse::<SampleType>()
        .map_err(anyhow::Error::msg)
        .context("Invalid sample type")
}

fn parse_bound(s: &str) -> Result<Option<RangeBound>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Some(secs) = s.strip_suffix('s') {
        let secs: f64 = secs.trim().parse().context("Invalid seconds value")?;
        if !secs.is_finite() {
            anyhow::bail!("Seconds value must be finite");
        }
        return Ok(Some(RangeBound::Seconds(secs)));
    }
    let frames: i64 = s.parse().context("Invalid frame value")?;
    Ok(Some(RangeBound::Frames(frames)))
}

/// Parse a frame range in the format "START..STOP"
///
/// Either end may be omitted or carry an `s` suffix for seconds.
pub fn parse_range(s: &str) -> Result<RangeSpec> {
    let (start, stop) = s
        .split_once("..")
        .context("Range must be in START..STOP format")?;
    Ok(RangeSpec {
        start: parse_bound(start)?,
        stop: parse_bound(stop)?,
    })
}

pub fn parse_samplerate(s: &str) -> Result<u32> {
    let rate: u32 = s.trim().parse().context("Invalid sample rate")?;
    if rate == 0 {
        anyhow::bail!("Sample rate must be positive");
    }
    Ok(rate)
}

/// Parse a `field=value` metadata assignment
pub fn parse_tag(s: &str) -> Result<(StringField, String)> {
    let (field, value) = s
        .split_once('=')
        .context("Tag must be in FIELD=VALUE format")?;
    let field = field
        .parse::<StringField>()
        .map_err(anyhow::Error::msg)
        .context("Invalid tag field")?;
    Ok((field, value.to_string()))
}

/// Container implied by a file extension
pub fn container_for_path(path: &Path) -> Option<ContainerType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "wav" | "wave" => Some(ContainerType::Wav),
        "aif" | "aiff" | "aifc" => Some(ContainerType::Aiff),
        "au" | "snd" => Some(ContainerType::Au),
        "raw" | "pcm" => Some(ContainerType::Raw),
        _ => None,
    }
}

/// Settings for a derived resource
///
/// An explicit format wins; otherwise the output extension picks the
/// container and the subtype carries over from `base`.
pub fn derive_settings(
    base: WriteSettings,
    output: &Path,
    format: Option<FormatWord>,
    samplerate: Option<u32>,
) -> WriteSettings {
    let format = match (format, container_for_path(output)) {
        (Some(format), _) => format,
        (None, Some(container)) if container != base.format.container() => {
            FormatWord::compose(container, base.format.subtype(), Endianness::File)
        }
        _ => base.format,
    };
    WriteSettings {
        samplerate: samplerate.unwrap_or(base.samplerate),
        format,
        ..base
    }
}
