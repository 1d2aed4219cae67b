use std::f32::consts::PI;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

/// Frame rates the generated sample rate must divide evenly.
const COMMON_FPS: &[u32] = &[24, 25, 30, 50, 60];

#[derive(Parser, Debug)]
#[command(about = "Write a beat-pattern WAV (and matching MIDI) for trying modulators")]
struct Cli {
    #[arg(long, default_value = "assets/test/beat_120bpm.wav")]
    out: PathBuf,

    /// Also write kick/snare/hat tracks as a Standard MIDI File.
    #[arg(long)]
    midi: Option<PathBuf>,

    #[arg(long = "sample-rate", default_value_t = 48_000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 120.0)]
    bpm: f32,

    #[arg(long, default_value_t = 32)]
    bars: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !(40.0..=300.0).contains(&cli.bpm) {
        bail!("--bpm must be within 40..=300");
    }
    if let Some(fps) = COMMON_FPS.iter().find(|fps| cli.sample_rate % **fps != 0) {
        bail!(
            "--sample-rate {} is not a multiple of {fps} fps (try 48000)",
            cli.sample_rate
        );
    }

    let pattern = Pattern::new(cli.bpm, cli.bars);
    let samples = render_pattern(&pattern, cli.sample_rate);
    create_parent(&cli.out)?;
    write_wav_i16_mono(&cli.out, cli.sample_rate, &samples)
        .with_context(|| format!("write {}", cli.out.display()))?;
    println!(
        "generated: {} ({} Hz, {:.2}s)",
        cli.out.display(),
        cli.sample_rate,
        samples.len() as f32 / cli.sample_rate as f32
    );

    if let Some(path) = &cli.midi {
        create_parent(path)?;
        fs::write(path, pattern.to_midi()).with_context(|| format!("write {}", path.display()))?;
        println!("generated: {}", path.display());
    }
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display())),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drum {
    Kick,
    Snare,
    Hat,
}

impl Drum {
    fn note(self) -> u8 {
        match self {
            Self::Kick => 36,
            Self::Snare => 38,
            Self::Hat => 42,
        }
    }

    fn track(self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Snare => "snare",
            Self::Hat => "hat",
        }
    }
}

/// Four-on-the-floor kick, snare on 2 and 4, hats on the off-beats.
struct Pattern {
    bpm: f32,
    /// `(eighth note index, drum, velocity)`.
    hits: Vec<(u32, Drum, u8)>,
    eighths: u32,
}

impl Pattern {
    fn new(bpm: f32, bars: u32) -> Self {
        let eighths = bars * 8;
        let mut hits = Vec::new();
        for e in 0..eighths {
            let beat = e / 2;
            if e % 2 == 0 {
                hits.push((e, Drum::Kick, if beat % 4 == 0 { 127 } else { 100 }));
                if beat % 2 == 1 {
                    hits.push((e, Drum::Snare, 110));
                }
            } else {
                hits.push((e, Drum::Hat, 70));
            }
        }
        Self { bpm, hits, eighths }
    }

    fn eighth_seconds(&self) -> f32 {
        30.0 / self.bpm
    }

    fn to_midi(&self) -> Vec<u8> {
        const TICKS_PER_QUARTER: u16 = 96;
        let tempo = (60_000_000.0 / self.bpm).round() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&TICKS_PER_QUARTER.to_be_bytes());

        let mut tempo_track = Vec::new();
        tempo_track.extend_from_slice(&[0x00, 0xff, 0x51, 0x03]);
        tempo_track.extend_from_slice(&tempo.to_be_bytes()[1..]);
        tempo_track.extend_from_slice(&[0x00, 0xff, 0x2f, 0x00]);
        push_track(&mut out, &tempo_track);

        for drum in [Drum::Kick, Drum::Snare, Drum::Hat] {
            let mut body = Vec::new();
            let name = drum.track().as_bytes();
            body.extend_from_slice(&[0x00, 0xff, 0x03, name.len() as u8]);
            body.extend_from_slice(name);
            let mut last = 0u32;
            for &(e, d, velocity) in &self.hits {
                if d != drum {
                    continue;
                }
                let tick = e * (TICKS_PER_QUARTER as u32 / 2);
                push_varlen(&mut body, tick - last);
                body.extend_from_slice(&[0x99, drum.note(), velocity]);
                push_varlen(&mut body, 8);
                body.extend_from_slice(&[0x89, drum.note(), 0]);
                last = tick + 8;
            }
            body.extend_from_slice(&[0x00, 0xff, 0x2f, 0x00]);
            push_track(&mut out, &body);
        }
        out
    }
}

fn push_track(out: &mut Vec<u8>, body: &[u8]) {
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
}

fn push_varlen(out: &mut Vec<u8>, mut value: u32) {
    let mut bytes = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    out.extend_from_slice(&bytes);
}

fn render_pattern(pattern: &Pattern, sr: u32) -> Vec<i16> {
    let step = pattern.eighth_seconds();
    let total = ((pattern.eighths as f32 * step + 1.0) * sr as f32) as usize;
    let mut mix = vec![0.0f32; total];

    // Quiet bass drone so the low bands never read as pure silence.
    for (i, s) in mix.iter_mut().enumerate() {
        let t = i as f32 / sr as f32;
        *s += (2.0 * PI * 55.0 * t).sin() * 0.08;
    }
    for &(e, drum, velocity) in &pattern.hits {
        let start = (e as f32 * step * sr as f32) as usize;
        let amp = velocity as f32 / 127.0;
        add_hit(&mut mix[start.min(total)..], sr, drum, amp);
    }
    mix.into_iter().map(to_i16).collect()
}

fn add_hit(out: &mut [f32], sr: u32, drum: Drum, amp: f32) {
    let (seconds, curve) = match drum {
        Drum::Kick => (0.25, 3.0),
        Drum::Snare => (0.18, 2.0),
        Drum::Hat => (0.05, 1.5),
    };
    let n = ((seconds * sr as f32) as usize).min(out.len());
    for (i, s) in out[..n].iter_mut().enumerate() {
        let t = i as f32 / sr as f32;
        let env = (1.0 - t / seconds).max(0.0).powf(curve);
        let v = match drum {
            // Pitch drops from 120 Hz to 45 Hz.
            Drum::Kick => (2.0 * PI * (45.0 + 75.0 * env) * t).sin() * 0.9,
            Drum::Snare => {
                (2.0 * PI * 190.0 * t).sin() * 0.3 + pseudo_noise(i as u32) * 0.45
            }
            Drum::Hat => pseudo_noise(i as u32 ^ 0x9e37) * 0.35,
        };
        *s += v * env * amp;
    }
}

fn pseudo_noise(x: u32) -> f32 {
    let mut n = x.wrapping_mul(374_761_393);
    n ^= n >> 13;
    n = n.wrapping_mul(1_274_126_177);
    n ^= n >> 16;
    let v = (n & 0x00FF_FFFF) as f32 / 16_777_215.0;
    v * 2.0 - 1.0
}

fn to_i16(x: f32) -> i16 {
    (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn write_wav_i16_mono(path: &Path, sr: u32, samples: &[i16]) -> Result<()> {
    let mut w = BufWriter::new(fs::File::create(path)?);

    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let byte_rate = sr * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let data_bytes = (samples.len() * std::mem::size_of::<i16>()) as u32;

    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_bytes).to_le_bytes())?;
    w.write_all(b"WAVE")?;
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&channels.to_le_bytes())?;
    w.write_all(&sr.to_le_bytes())?;
    w.write_all(&byte_rate.to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())?;
    w.write_all(b"data")?;
    w.write_all(&data_bytes.to_le_bytes())?;
    for s in samples {
        w.write_all(&s.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}
