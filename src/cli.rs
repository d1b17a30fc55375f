use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{derive_settings, parse_format, parse_range, parse_sample_type, parse_tag};
use crate::dispatch::SampleType;
use crate::engine::StringField;
use crate::library::Library;
use crate::logging::LogLevel;
use crate::resource::{AudioResource, OpenMode, WriteSettings};

/// Frames copied per block when streaming a whole resource
const COPY_BLOCK_FRAMES: u64 = 4096;

/// Frame-oriented audio file inspection and conversion
#[derive(Parser, Debug)]
#[command(name = "sndframe")]
#[command(version)]
#[command(about = "Inspect, slice and convert audio files frame by frame", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log file path (default: stderr)
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print format, length and string metadata
    Info {
        file: PathBuf,

        #[command(flatten)]
        raw: RawInput,
    },

    /// Copy a frame range into a new file
    Copy {
        input: PathBuf,
        output: PathBuf,

        /// Frame range START..STOP (frames, or seconds with an `s` suffix)
        #[arg(short, long, value_name = "RANGE")]
        range: Option<String>,

        /// Output format (e.g. wav:pcm16, aiff:pcm24:big, 0x10002)
        #[arg(short, long, value_name = "FORMAT")]
        format: Option<String>,

        /// In-memory sample type used for the transfer
        #[arg(short = 't', long = "type", value_name = "TYPE", default_value = "float64")]
        sample_type: String,

        /// Output sample rate written to the header
        #[arg(short, long, value_name = "HZ")]
        samplerate: Option<u32>,

        #[command(flatten)]
        raw: RawInput,
    },

    /// Copy a file, setting string metadata on the copy
    Tags {
        input: PathBuf,

        /// Metadata assignment FIELD=VALUE (can be specified multiple times)
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        set: Vec<String>,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
}

/// Layout of headerless input files
#[derive(Args, Debug, Default, Clone)]
pub struct RawInput {
    /// Treat the input as RAW data in this format (e.g. raw:pcm16:le)
    #[arg(long = "raw-format", value_name = "FORMAT")]
    pub raw_format: Option<String>,

    /// Sample rate of RAW input
    #[arg(long = "raw-rate", value_name = "HZ", default_value_t = 44100)]
    pub raw_rate: u32,

    /// Channel count of RAW input
    #[arg(long = "raw-channels", value_name = "N", default_value_t = 2)]
    pub raw_channels: u32,
}

impl RawInput {
    fn settings(&self) -> Result<Option<WriteSettings>> {
        let Some(ref format) = self.raw_format else {
            return Ok(None);
        };
        let format = parse_format(format).context("Invalid RAW format")?;
        Ok(Some(WriteSettings::new(self.raw_rate, self.raw_channels, format)))
    }
}

impl Cli {
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_verbosity(self.verbose)
    }

    /// Run the selected command, writing its report to `out`
    pub fn run(&self, library: &Library, out: &mut dyn Write) -> Result<()> {
        match &self.command {
            Command::Info { file, raw } => info(library, file, raw, out),
            Command::Copy {
                input,
                output,
                range,
                format,
                sample_type,
                samplerate,
                raw,
            } => {
                let options = CopyOptions {
                    range: range.as_deref(),
                    format: format.as_deref(),
                    sample_type: parse_sample_type(sample_type)?,
                    samplerate: *samplerate,
                    raw,
                };
                copy(library, input, output, &options, out)
            }
            Command::Tags { input, set, out: output } => {
                let tags = set
                    .iter()
                    .map(|s| parse_tag(s))
                    .collect::<Result<Vec<_>>>()?;
                tags_copy(library, input, output, &tags, out)
            }
        }
    }
}

fn open_input(library: &Library, path: &Path, raw: &RawInput) -> Result<AudioResource> {
    AudioResource::open(library, path, OpenMode::Read, raw.settings()?)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn settings_of(resource: &AudioResource) -> WriteSettings {
    WriteSettings::new(resource.sample_rate(), resource.channels(), resource.format())
}

fn info(library: &Library, path: &Path, raw: &RawInput, out: &mut dyn Write) -> Result<()> {
    let input = open_input(library, path, raw)?;
    let lines = input.scoped(|res| {
        let desc = *res.descriptor();
        let seconds = res.frames() as f64 / res.sample_rate() as f64;
        let mut lines = vec![
            res.to_string(),
            format!("  container:  {}", desc.container()),
            format!("  subtype:    {}", desc.subtype()),
            format!("  endianness: {}", desc.endianness().name()),
            format!("  duration:   {:.3} s", seconds),
            format!("  writable:   {}", if desc.is_valid() { "yes" } else { "no" }),
        ];
        for field in StringField::ALL {
            if let Some(value) = res.metadata_string(field)? {
                lines.push(format!("  {:<11} {}", format!("{}:", field.name()), value));
            }
        }
        Ok(lines)
    })?;
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

struct CopyOptions<'a> {
    range: Option<&'a str>,
    format: Option<&'a str>,
    sample_type: SampleType,
    samplerate: Option<u32>,
    raw: &'a RawInput,
}

/// Copy every string the input carries, then apply `overrides`
fn copy_strings(
    input: &AudioResource,
    output: &mut AudioResource,
    overrides: &[(StringField, String)],
) -> Result<Vec<StringField>> {
    let mut rejected = Vec::new();
    for field in StringField::ALL {
        let value = match overrides.iter().rev().find(|(f, _)| *f == field) {
            Some((_, value)) => Some(value.clone()),
            None => input.metadata_string(field)?,
        };
        if let Some(value) = value {
            if !output.set_metadata_string(field, &value)? {
                rejected.push(field);
            }
        }
    }
    Ok(rejected)
}

fn copy(
    library: &Library,
    input_path: &Path,
    output_path: &Path,
    options: &CopyOptions<'_>,
    out: &mut dyn Write,
) -> Result<()> {
    let mut input = open_input(library, input_path, options.raw)?;
    let range = match options.range {
        Some(text) => parse_range(text)?,
        None => Default::default(),
    };
    let (start, stop) = range.resolve(input.sample_rate(), input.frames());
    let format = options.format.map(parse_format).transpose()?;
    let settings = derive_settings(settings_of(&input), output_path, format, options.samplerate);
    log::info!(
        "copying {} [{}..{}) to {} as {}",
        input_path.display(),
        start,
        stop,
        output_path.display(),
        settings.format
    );

    let block = input
        .read_range_as(start, stop, options.sample_type)
        .with_context(|| format!("Failed to read frames {}..{}", start, stop))?;
    let frames_read = block.frames_read();
    let channels = block.channels() as usize;
    let mut data = block.into_data();
    data.truncate(frames_read as usize * channels);

    let mut output = AudioResource::create(library, output_path, settings)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    for field in copy_strings(&input, &mut output, &[])? {
        log::debug!("{} dropped on copy", field.name());
    }
    let written = output.scoped(|res| res.write_buffer(&data))?;
    input.close()?;

    writeln!(
        out,
        "copied {} frames ({}) from {} to {}",
        written,
        options.sample_type,
        input_path.display(),
        output_path.display()
    )?;
    Ok(())
}

fn tags_copy(
    library: &Library,
    input_path: &Path,
    output_path: &Path,
    tags: &[(StringField, String)],
    out: &mut dyn Write,
) -> Result<()> {
    let mut input = open_input(library, input_path, &RawInput::default())?;
    let mut output = AudioResource::create(library, output_path, settings_of(&input))
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    let rejected = copy_strings(&input, &mut output, tags)?;
    for field in &rejected {
        log::warn!("{} cannot store {}", output_path.display(), field.name());
    }

    let mut total = 0;
    loop {
        let block = input.read::<f64>(Some(COPY_BLOCK_FRAMES))?;
        total += output.write(block.valid_samples())?;
        if block.frames_read() < COPY_BLOCK_FRAMES {
            break;
        }
    }
    output.close()?;
    input.close()?;

    writeln!(
        out,
        "wrote {} frames to {} ({} tags set, {} rejected)",
        total,
        output_path.display(),
        tags.len(),
        rejected.len()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_copy() {
        let cli = Cli::try_parse_from([
            "sndframe", "-vv", "copy", "in.wav", "out.aiff", "--range", "0..100", "--type", "int16",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), LogLevel::Debug);
        match cli.command {
            Command::Copy {
                range, sample_type, ..
            } => {
                assert_eq!(range.as_deref(), Some("0..100"));
                assert_eq!(sample_type, "int16");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_tags() {
        let cli = Cli::try_parse_from([
            "sndframe",
            "tags",
            "in.wav",
            "--set",
            "title=A",
            "--set",
            "artist=B",
            "--out",
            "out.wav",
            "--log-file",
            "log.txt",
        ])
        .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("log.txt")));
        match cli.command {
            Command::Tags { set, out, .. } => {
                assert_eq!(set, vec!["title=A", "artist=B"]);
                assert_eq!(out, PathBuf::from("out.wav"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_copy_output_and_raw_options_are_distinct() {
        let cli = Cli::try_parse_from([
            "sndframe",
            "copy",
            "in.raw",
            "out.wav",
            "--format",
            "wav:pcm24",
            "--samplerate",
            "48000",
            "--raw-format",
            "raw:pcm16:le",
            "--raw-rate",
            "8000",
            "--raw-channels",
            "1",
        ])
        .unwrap();
        match cli.command {
            Command::Copy {
                format,
                samplerate,
                raw,
                ..
            } => {
                assert_eq!(format.as_deref(), Some("wav:pcm24"));
                assert_eq!(samplerate, Some(48000));
                assert_eq!(raw.raw_format.as_deref(), Some("raw:pcm16:le"));
                assert_eq!(raw.raw_rate, 8000);
                assert_eq!(raw.raw_channels, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["sndframe"]).is_err());
        assert!(Cli::try_parse_from(["sndframe", "tags", "in.wav"]).is_err());
    }

    #[test]
    fn test_raw_settings() {
        let raw = RawInput {
            raw_format: Some("raw:pcm16:be".to_string()),
            raw_rate: 8000,
            raw_channels: 1,
        };
        let settings = raw.settings().unwrap().unwrap();
        assert_eq!(settings.samplerate, 8000);
        assert_eq!(settings.format.0, 0x2004_0002);
        assert!(RawInput::default().settings().unwrap().is_none());
    }
}
