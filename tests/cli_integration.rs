//! End-to-end runs of the command-line front end

use std::path::Path;

use clap::Parser;
use tempfile::tempdir;

use sndframe::cli::Cli;
use sndframe::{
    AudioResource, ContainerType, Endianness, FormatWord, Library, OpenMode, StringField, Subtype,
    WriteSettings,
};

fn make_input(path: &Path) {
    let library = Library::native();
    let settings = WriteSettings::new(
        8000,
        2,
        FormatWord::compose(ContainerType::Wav, Subtype::Pcm16, Endianness::File),
    );
    let mut res = AudioResource::create(&library, path, settings).unwrap();
    res.set_metadata_string(StringField::Title, "Ramp").unwrap();
    let ramp: Vec<i16> = (0..2000).map(|i| (i * 10) as i16).collect();
    res.write(&ramp).unwrap();
    res.close().unwrap();
}

fn run(args: &[&str]) -> String {
    let cli = Cli::try_parse_from(args).unwrap();
    let mut out = Vec::new();
    cli.run(&Library::native(), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_info_reports_format_and_tags() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.wav");
    make_input(&input);

    let report = run(&["sndframe", "info", input.to_str().unwrap()]);
    assert!(report.contains("1000 frames, 8000 Hz, 2 ch, WAV | PCM_16"), "{}", report);
    assert!(report.contains("writable:   yes"), "{}", report);
    assert!(report.contains("title:"), "{}", report);
    assert!(report.contains("Ramp"), "{}", report);
}

#[test]
fn test_copy_range_to_aiff() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("slice.aiff");
    make_input(&input);

    let report = run(&[
        "sndframe",
        "copy",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--range",
        "100..300",
        "--type",
        "int16",
    ]);
    assert!(report.starts_with("copied 200 frames (int16)"), "{}", report);

    let mut res = AudioResource::open(&Library::native(), &output, OpenMode::Read, None).unwrap();
    assert_eq!(res.format().container(), ContainerType::Aiff);
    assert_eq!(res.frames(), 200);
    let buf = res.read::<i16>(None).unwrap();
    assert_eq!(buf.valid_samples()[0], 2000);
    assert_eq!(buf.valid_samples()[399], 5990);
    assert_eq!(
        res.metadata_string(StringField::Title).unwrap().as_deref(),
        Some("Ramp")
    );
}

#[test]
fn test_copy_with_explicit_format_and_rate() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.au");
    make_input(&input);

    run(&[
        "sndframe",
        "copy",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--format",
        "au:float",
        "--samplerate",
        "16000",
        "--range",
        "0.1s..",
    ]);

    let mut res = AudioResource::open(&Library::native(), &output, OpenMode::Read, None).unwrap();
    assert_eq!(res.format().subtype(), Subtype::Float);
    assert_eq!(res.sample_rate(), 16000);
    assert_eq!(res.frames(), 200);
    let buf = res.read::<f64>(Some(1)).unwrap();
    assert_eq!(buf.valid_samples(), &[16000.0 / 32768.0, 16010.0 / 32768.0]);
}

#[test]
fn test_copy_rejects_empty_range() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    make_input(&input);

    let cli = Cli::try_parse_from([
        "sndframe",
        "copy",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--range",
        "50..50",
    ])
    .unwrap();
    let mut out = Vec::new();
    assert!(cli.run(&Library::native(), &mut out).is_err());
    assert!(!output.exists());
}

#[test]
fn test_tags_sets_fields_on_copy() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("tagged.wav");
    make_input(&input);

    let report = run(&[
        "sndframe",
        "tags",
        input.to_str().unwrap(),
        "--set",
        "artist=Tone Generator",
        "--set",
        "license=CC0",
        "--out",
        output.to_str().unwrap(),
    ]);
    assert!(report.contains("wrote 1000 frames"), "{}", report);
    assert!(report.contains("1 rejected"), "{}", report);

    let res = AudioResource::open(&Library::native(), &output, OpenMode::Read, None).unwrap();
    assert_eq!(res.frames(), 1000);
    assert_eq!(
        res.metadata_string(StringField::Artist).unwrap().as_deref(),
        Some("Tone Generator")
    );
    assert_eq!(
        res.metadata_string(StringField::Title).unwrap().as_deref(),
        Some("Ramp")
    );
    assert_eq!(res.metadata_string(StringField::License).unwrap(), None);
}

#[test]
fn test_info_on_raw_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.raw");
    std::fs::write(&input, [0u8; 400]).unwrap();

    let report = run(&[
        "sndframe",
        "info",
        input.to_str().unwrap(),
        "--raw-format",
        "raw:pcm16:le",
        "--raw-rate",
        "8000",
        "--raw-channels",
        "1",
    ]);
    assert!(report.contains("200 frames, 8000 Hz, 1 ch"), "{}", report);
}
