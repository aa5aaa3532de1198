//! Full builds against real WAV files

use serde_json::Value;
use soundtrack_library::{
    BuildOptions, BuildProgress, Config, LoftyTagStore, Soundtrack, TagStore, TagValue,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

const RATE: u32 = 44100;

fn write_wav(path: &Path, frames: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample(((i % 200) as i16 - 100) * 50).unwrap();
    }
    writer.finalize().unwrap();
}

fn wav_frames(path: &Path) -> u32 {
    hound::WavReader::open(path).unwrap().duration()
}

/// Config dir with `music/track.json` and two sources
fn project(config: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    fs::create_dir_all(&music).unwrap();
    write_wav(&music.join("a.wav"), RATE as usize);
    write_wav(&music.join("b.wav"), 8 * RATE as usize);
    fs::write(
        music.join("track.json"),
        r#"{"Intro": {"track": "a.wav"}, "Main": {"track": {"file": "b.wav", "loop": 220500}}}"#,
    )
    .unwrap();
    fs::write(dir.path().join("soundtrack.json5"), config).unwrap();
    dir
}

const CONFIG: &str = r#"{
    tracks: { files: "music" },
    loop: { count: 2, fade: { duration: 1 } },
    output: "out/{title}.{extension}",
    metadata: {
        tags: { album: "Test OST", artist: "Composer" },
        manifest: { title: "Collection" },
    },
}"#;

fn build(dir: &Path, options: BuildOptions) -> (soundtrack_library::BuildReport, Vec<BuildProgress>) {
    let config = Config::load(&dir.join("soundtrack.json5")).unwrap();
    let mut soundtrack = Soundtrack::new(config, options).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let report = soundtrack.build(&AtomicBool::new(false), Some(tx)).unwrap();
    (report, rx.try_iter().collect())
}

#[test]
fn test_loop_length_matches_formula() {
    let dir = project(CONFIG);
    let (report, events) = build(dir.path(), BuildOptions::default());
    assert_eq!(report.built, 2);
    assert_eq!(report.failed, 0);

    let out = dir.path().join("out");
    assert_eq!(wav_frames(&out.join("Intro.wav")), RATE);

    // intro + count * loop + fade, the fade taken from the start of the loop
    let split = 220_500u32;
    let looped = 8 * RATE - split;
    let fade = RATE.min(looped);
    assert_eq!(wav_frames(&out.join("Main.wav")), split + 2 * looped + fade);

    assert_eq!(events.first(), Some(&BuildProgress::Started { total: 2 }));
    assert_eq!(
        events.last(),
        Some(&BuildProgress::Complete {
            built: 2,
            skipped: 0,
            failed: 0,
            cancelled: false,
        })
    );
}

#[test]
fn test_tags_and_manifest_written() {
    let dir = project(CONFIG);
    build(dir.path(), BuildOptions::default());

    let store = LoftyTagStore::new();
    let handle = store.load(&dir.path().join("out/Main.wav")).unwrap();
    assert_eq!(store.get_tag(&handle, "title"), Some(TagValue::Text("Main".into())));
    assert_eq!(store.get_tag(&handle, "album"), Some(TagValue::Text("Test OST".into())));

    let text = fs::read_to_string(dir.path().join("manifest.json")).unwrap();
    let manifest: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(manifest["_version"], Value::from(1));
    assert_eq!(manifest["title"], Value::from("Collection"));
    let album = &manifest["albums"][0];
    assert_eq!(album["name"], Value::from("Test OST"));
    let tracks = album["tracks"][0]["tracks"].as_array().unwrap();
    let titles: Vec<_> = tracks.iter().map(|t| t["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Intro", "Main"]);
    assert_eq!(tracks[1]["path"]["wav"], Value::from("out/Main.wav"));
    assert_eq!(tracks[1]["artist"], Value::from("Composer"));
}

#[test]
fn test_failed_track_does_not_stop_batch() {
    let dir = project(CONFIG);
    fs::remove_file(dir.path().join("music/a.wav")).unwrap();

    let (report, events) = build(dir.path(), BuildOptions::default());
    assert_eq!(report.built, 1);
    assert_eq!(report.failed, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, BuildProgress::Failed { title, .. } if title == "Intro")));
    assert!(dir.path().join("out/Main.wav").is_file());
}

#[test]
fn test_fail_fast_stops_batch() {
    let dir = project(CONFIG);
    fs::remove_file(dir.path().join("music/a.wav")).unwrap();

    let config = Config::load(&dir.path().join("soundtrack.json5")).unwrap();
    let options = BuildOptions {
        fail_fast: true,
        ..BuildOptions::default()
    };
    let mut soundtrack = Soundtrack::new(config, options).unwrap();
    assert!(soundtrack.build(&AtomicBool::new(false), None).is_err());
    assert!(!dir.path().join("out/Main.wav").exists());
}

#[test]
fn test_cancel_before_first_track() {
    let dir = project(CONFIG);
    let config = Config::load(&dir.path().join("soundtrack.json5")).unwrap();
    let mut soundtrack = Soundtrack::new(config, BuildOptions::default()).unwrap();

    let report = soundtrack.build(&AtomicBool::new(true), None).unwrap();
    assert!(report.cancelled);
    assert_eq!(report.built, 0);
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_cancel_between_tracks() {
    let dir = project(CONFIG);
    let config = Config::load(&dir.path().join("soundtrack.json5")).unwrap();
    let mut soundtrack = Soundtrack::new(config, BuildOptions::default()).unwrap();

    let cancel = AtomicBool::new(false);
    let (tx, rx) = crossbeam_channel::bounded(0);
    let report = std::thread::scope(|s| {
        s.spawn(|| {
            for event in rx.iter() {
                if matches!(event, BuildProgress::Track { current: 1, .. }) {
                    cancel.store(true, Ordering::SeqCst);
                }
            }
        });
        soundtrack.build(&cancel, Some(tx)).unwrap()
    });

    assert!(report.cancelled);
    assert_eq!(report.built, 1);
    assert!(dir.path().join("out/Intro.wav").is_file());
    assert!(!dir.path().join("out/Main.wav").exists());
}

#[test]
fn test_resume_skips_built_tracks() {
    let dir = project(CONFIG);
    build(dir.path(), BuildOptions::default());

    let options = BuildOptions {
        resume: true,
        ..BuildOptions::default()
    };
    let (report, _) = build(dir.path(), options);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.built, 0);
}
