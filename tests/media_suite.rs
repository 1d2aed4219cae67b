use fractal_vj::animation::{Animation, Show};
use fractal_vj::audio::{AudioError, ChannelFeed, Spectrogram, WavAudio};
use fractal_vj::capture::{save_png, FrameRecorder, VIDEO_NAME};
use fractal_vj::kernel::KernelSpec;
use fractal_vj::midi::{Midi, MidiError, MidiFrameEvent, TrackEvents};
use fractal_vj::modulator::{MidiMod, MidiMode};
use fractal_vj::params::ParamSet;
use fractal_vj::scene::{SceneCtx, SceneEntry};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fractal_vj_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

// ── MIDI ────────────────────────────────────────────────────────────────────

fn smf(division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());
    for body in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
    }
    out
}

/// 60 bpm: one quarter note (128 ticks) per second.
fn slow_tempo_track() -> Vec<u8> {
    vec![0x00, 0xff, 0x51, 0x03, 0x0f, 0x42, 0x40, 0x00, 0xff, 0x2f, 0x00]
}

fn drum_track() -> Vec<u8> {
    let mut body = vec![0x00, 0xff, 0x03, 0x05];
    body.extend_from_slice(b"drums");
    body.extend_from_slice(&[
        0x00, 0x99, 36, 100, // kick at tick 0
        0x00, 38, 90, // snare, running status
        0x81, 0x00, 0x99, 36, 0, // velocity-0 note-on is a note-off
        0x40, 0xb0, 7, 100, // volume
        0x00, 7, 50, // volume again, running status
        0x40, 0x99, 42, 80, // hat at tick 256
        0x00, 0xff, 0x2f, 0x00,
    ]);
    body
}

fn notes(events: &[TrackEvents]) -> Vec<(String, Vec<MidiFrameEvent>)> {
    events
        .iter()
        .map(|t| (t.track.clone(), t.events.clone()))
        .collect()
}

fn chord(notes: &[(u8, u8)]) -> MidiFrameEvent {
    MidiFrameEvent::Chord(notes.iter().copied().collect::<BTreeMap<_, _>>())
}

#[test]
fn midi_events_are_sliced_per_frame() {
    let midi = Midi::parse(&smf(128, &[slow_tempo_track(), drum_track()]), 10).expect("parse");

    // The tempo-only track carries no events and is dropped.
    assert_eq!(midi.tracks().len(), 1);
    assert_eq!(midi.tracks()[0].name, "drums");
    assert_eq!(midi.frame_count(), 21);

    assert_eq!(
        notes(midi.events(0)),
        vec![("drums".to_string(), vec![chord(&[(36, 100), (38, 90)])])]
    );
    assert!(midi.events(10).is_empty());
    assert_eq!(
        notes(midi.events(15)),
        vec![(
            "drums".to_string(),
            vec![MidiFrameEvent::Control { controller: 7, value: 75.0 }]
        )]
    );
    assert_eq!(
        notes(midi.events(20)),
        vec![("drums".to_string(), vec![chord(&[(42, 80)])])]
    );
    assert!(midi.events(21).is_empty());
    assert!(midi.events(u64::MAX).is_empty());
}

#[test]
fn midi_default_tempo_is_120_bpm() {
    let midi = Midi::parse(&smf(128, &[drum_track()]), 10).expect("parse");
    // 256 ticks at 120 bpm is one second.
    assert_eq!(midi.frame_count(), 11);
    assert_eq!(notes(midi.events(10))[0].1, vec![chord(&[(42, 80)])]);
}

#[test]
fn midi_tempo_changes_apply_from_their_tick() {
    let tempo = vec![
        0x00, 0xff, 0x51, 0x03, 0x0f, 0x42, 0x40, // 60 bpm
        0x81, 0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20, // 120 bpm from tick 128
        0x00, 0xff, 0x2f, 0x00,
    ];
    let midi = Midi::parse(&smf(128, &[tempo, drum_track()]), 10).expect("parse");
    // Tick 256: one second at 60 bpm, then half a second at 120 bpm.
    let (seconds, _) = midi.tracks()[0].events.last().copied().expect("events");
    assert!((seconds - 1.5).abs() < 1e-9);
    assert_eq!(midi.frame_count(), 16);
}

#[test]
fn midi_rejects_bad_headers() {
    assert!(matches!(Midi::parse(b"RIFF....", 25), Err(MidiError::Header(_))));

    let mut smpte = smf(96, &[]);
    smpte[12..14].copy_from_slice(&0xe728u16.to_be_bytes());
    assert_eq!(
        Midi::parse(&smpte, 25),
        Err(MidiError::UnsupportedDivision(0xe728))
    );

    let mut missing_track = smf(96, &[]);
    missing_track[10..12].copy_from_slice(&1u16.to_be_bytes());
    assert_eq!(
        Midi::parse(&missing_track, 25),
        Err(MidiError::InvalidTrack { index: 0 })
    );

    let mut cut = smf(128, &[drum_track()]);
    cut.truncate(cut.len() - 6);
    assert!(matches!(Midi::parse(&cut, 25), Err(MidiError::Truncated { .. })));
}

#[test]
fn empty_midi_has_no_events() {
    let midi = Midi::empty();
    assert_eq!(midi.frame_count(), 0);
    assert!(midi.events(0).is_empty());
}

fn idle(_: &mut (), _: &mut SceneCtx<'_>) {}

fn hat_follower() -> Animation<()> {
    Animation::new(
        "hats",
        ParamSet::with_defaults(),
        KernelSpec::default(),
        vec![SceneEntry::end(30), SceneEntry::scene(0, "main", idle)],
        (),
    )
    .expect("valid timeline")
    .midi_mod("hat", MidiMod::new(&["drums"], MidiMode::Events(vec![42])).decay(1.0))
}

#[test]
fn midi_skip_shifts_the_file() {
    let file = smf(128, &[slow_tempo_track(), drum_track()]);
    let mut anim = hat_follower();
    anim.set_midi(Midi::parse(&file, 10).expect("parse"), 0);
    anim.update(0, None).expect("update");
    assert_eq!(anim.signals().get("hat"), Some(0.0));
    for frame in 1..=20 {
        anim.update(frame, None).expect("update");
    }
    assert_eq!(anim.signals().get("hat"), Some(1.0));

    let mut anim = hat_follower();
    anim.set_midi(Midi::parse(&file, 10).expect("parse"), 20);
    anim.update(0, None).expect("update");
    assert_eq!(anim.signals().get("hat"), Some(1.0));
}

#[test]
fn pinned_midi_offset_overrides_midi_skip() {
    let file = smf(128, &[slow_tempo_track(), drum_track()]);
    for skip in [0, 5] {
        let mut anim = hat_follower().midi_offset(20);
        anim.set_midi(Midi::parse(&file, 10).expect("parse"), skip);
        anim.update(0, None).expect("update");
        assert_eq!(anim.signals().get("hat"), Some(1.0), "skip {skip}");
    }
}

// ── Playback feed ───────────────────────────────────────────────────────────

#[test]
fn playback_spreads_song_channels_over_the_device() {
    let (mut prod, cons) = HeapRb::<f32>::new(16).split();
    prod.push_slice(&[0.1, 0.2, 0.3, 0.4]);
    let mut feed = ChannelFeed::new(cons, 2, 3);
    let mut out = [9.0f32; 9];
    feed.fill(&mut out);
    // Two stereo frames, then silence once the queue runs dry.
    assert_eq!(out, [0.1, 0.2, 0.2, 0.3, 0.4, 0.4, 0.0, 0.0, 0.0]);
}

#[test]
fn playback_duplicates_mono_and_drops_extra_channels() {
    let (mut prod, cons) = HeapRb::<f32>::new(16).split();
    prod.push_slice(&[0.25, -0.5]);
    let mut feed = ChannelFeed::new(cons, 1, 2);
    let mut out = [0.0f32; 4];
    feed.fill(&mut out);
    assert_eq!(out, [0.25, 0.25, -0.5, -0.5]);

    let (mut prod, cons) = HeapRb::<f32>::new(16).split();
    prod.push_slice(&[0.1, 0.2, 0.3, 0.4]);
    let mut feed = ChannelFeed::new(cons, 2, 1);
    let mut out = [0.0f32; 3];
    feed.fill(&mut out);
    assert_eq!(out, [0.1, 0.3, 0.0]);
}

// ── WAV ─────────────────────────────────────────────────────────────────────

fn wav_bytes(format: u16, channels: u16, sample_rate: u32, bits: u16, data: &[u8]) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&format.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

fn pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[test]
fn pcm16_wav_is_sliced_per_frame() {
    let samples: Vec<i16> = (0..35).map(|i| if i < 10 { 16384 } else { -8192 }).collect();
    let audio = WavAudio::from_wav_bytes(&wav_bytes(1, 1, 100, 16, &pcm16(&samples)), 10)
        .expect("decode");
    assert_eq!(audio.sample_rate(), 100);
    assert_eq!(audio.channels(), 1);
    assert_eq!(audio.frame_size(), 10);
    // The trailing partial frame is not played.
    assert_eq!(audio.frame_count(), 3);
    assert_eq!(audio.frame(0), Some(&[0.5f32; 10][..]));
    assert_eq!(audio.frame(2), Some(&[-0.25f32; 10][..]));
    assert_eq!(audio.frame(3), None);
}

#[test]
fn stereo_frames_stay_interleaved() {
    let samples: Vec<i16> = (0..40).map(|i| if i % 2 == 0 { 16384 } else { 0 }).collect();
    let audio = WavAudio::from_wav_bytes(&wav_bytes(1, 2, 100, 16, &pcm16(&samples)), 10)
        .expect("decode");
    assert_eq!(audio.channels(), 2);
    assert_eq!(audio.frame_count(), 2);
    let frame = audio.frame(1).expect("frame 1");
    assert_eq!(frame.len(), 20);
    assert_eq!(&frame[..4], &[0.5, 0.0, 0.5, 0.0]);
}

#[test]
fn float_wav_is_clamped() {
    let data: Vec<u8> = [0.25f32, 2.0, -3.0, 0.0]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let audio = WavAudio::from_wav_bytes(&wav_bytes(3, 1, 40, 32, &data), 10).expect("decode");
    assert_eq!(audio.frame(0), Some(&[0.25f32, 1.0, -1.0, 0.0][..]));
}

#[test]
fn wav_errors_are_reported() {
    assert_eq!(
        WavAudio::from_samples(44_100, 2, vec![0.0; 100], 24),
        Err(AudioError::FrameRate { sample_rate: 44_100, fps: 24 })
    );
    assert!(matches!(
        WavAudio::from_wav_bytes(b"too short", 25),
        Err(AudioError::Format(_))
    ));
    let mut not_wave = wav_bytes(1, 1, 100, 16, &pcm16(&[0; 10]));
    not_wave[8..12].copy_from_slice(b"AVI ");
    assert!(matches!(
        WavAudio::from_wav_bytes(&not_wave, 25),
        Err(AudioError::Format(_))
    ));
    assert!(matches!(
        WavAudio::from_wav_bytes(&wav_bytes(1, 1, 100, 8, &[0; 20]), 25),
        Err(AudioError::Format(_))
    ));
    assert!(matches!(
        WavAudio::load(Path::new("/definitely/not/here.wav"), 25),
        Err(AudioError::Io { .. })
    ));
}

// ── Spectrogram ─────────────────────────────────────────────────────────────

#[test]
fn silence_reads_as_zero() {
    let mut spectre = Spectrogram::new(64);
    assert_eq!(spectre.band().len(), 32);
    spectre.transform(&[0.0; 64], 1);
    assert!(spectre.band().iter().all(|v| *v == 0.0));
    assert!(spectre.freq().iter().all(|v| *v == 0.0));
}

#[test]
fn tone_peaks_at_its_bin() {
    let frame_size = 256;
    // Period 32 samples lands on bin 16 of the zero-padded transform.
    let tone: Vec<f32> = (0..frame_size)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * i as f32 / 32.0).sin())
        .collect();
    let mut spectre = Spectrogram::new(frame_size);
    spectre.transform(&tone, 1);
    let band = spectre.band();
    let peak = band
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
    assert_eq!(peak.0, 16);
    assert!(peak.1 > 0.5);

    spectre.silence();
    assert!(spectre.band().iter().all(|v| *v == 0.0));
}

// ── Capture ─────────────────────────────────────────────────────────────────

fn args(cmd: &std::process::Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn recorder_numbers_frames_and_builds_ffmpeg_args() {
    let dir = temp_dir("record");
    let mut rec = FrameRecorder::create(&dir).expect("create recorder");
    assert_eq!(rec.frame_path(7), dir.join("0007.png"));
    assert_eq!(rec.first_frame(), None);

    let rgba = vec![255u8; 4 * 3 * 2];
    rec.save(41, &rgba, (3, 2)).expect("save 41");
    rec.save(42, &rgba, (3, 2)).expect("save 42");
    assert_eq!(rec.first_frame(), Some(41));
    assert_eq!(rec.count(), 2);
    assert!(dir.join("0041.png").is_file());

    let silent = rec.encode_command(25, None);
    assert_eq!(silent.get_program(), OsStr::new("ffmpeg"));
    let a = args(&silent);
    let pattern = dir.join("%04d.png").to_string_lossy().into_owned();
    let video = dir.join(VIDEO_NAME).to_string_lossy().into_owned();
    assert_eq!(
        a,
        vec![
            "-hide_banner", "-loglevel", "error", "-y", "-framerate", "25",
            "-start_number", "41", "-i", pattern.as_str(), "-c:v", "libx264",
            "-pix_fmt", "yuv420p", "-movflags", "+faststart", video.as_str(),
        ]
    );

    let with_audio = args(&rec.encode_command(30, Some(Path::new("song.wav"))));
    let wav_at = with_audio.iter().position(|a| a == "song.wav").expect("wav input");
    assert_eq!(with_audio[wav_at - 1], "-i");
    assert!(with_audio.windows(2).any(|w| w == ["-map", "1:a:0"]));
    assert!(with_audio.contains(&"-shortest".to_string()));
    assert_eq!(with_audio.last(), Some(&video));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn encode_without_frames_fails() {
    let dir = temp_dir("empty_record");
    let rec = FrameRecorder::create(&dir).expect("create recorder");
    let err = rec.encode(25, None).expect_err("nothing to encode");
    assert!(format!("{err:#}").contains("no frames"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn png_roundtrips_pixels() {
    let dir = temp_dir("png");
    let path = dir.join("frame.png");
    let rgba: Vec<u8> = (0..4 * 4 * 3).map(|i| (i * 5) as u8).collect();
    save_png(&path, &rgba, (4, 3)).expect("save png");
    let back = image::open(&path).expect("read png").to_rgba8();
    assert_eq!(back.dimensions(), (4, 3));
    assert_eq!(back.into_raw(), rgba);

    assert!(save_png(&dir.join("bad.png"), &rgba, (5, 5)).is_err());
    let _ = std::fs::remove_dir_all(&dir);
}
