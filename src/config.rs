use anyhow::bail;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Base window size, scaled by `--size`.
pub const BASE_WINDOW: (usize, usize) = (160, 90);

#[derive(Parser, Debug, Clone)]
#[command(name = "fractal-vj", version, about = "Audio and MIDI driven fractal animations")]
pub struct Config {
    #[arg(long, default_value = "julia-explorer")]
    pub animation: String,

    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// Render size multiplier for the 160x90 base window.
    #[arg(long, default_value_t = 2.5)]
    pub size: f64,

    #[arg(long, default_value_t = 25)]
    pub fps: u32,

    /// First frame to render; earlier frames are replayed without rendering.
    #[arg(long, default_value_t = 0, value_name = "FRAMES_NUMBER")]
    pub skip: u64,

    #[arg(long, value_name = "FILE")]
    pub wav: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub midi: Option<PathBuf>,

    #[arg(long = "midi-skip", alias = "midi_skip", default_value_t = 0)]
    pub midi_skip: u64,

    /// Write every rendered frame as DIR/%04d.png.
    #[arg(long, value_name = "DIR")]
    pub record: Option<PathBuf>,

    /// After recording, mux the frames (and --wav) into DIR/render.mp4.
    #[arg(long, default_value_t = false)]
    pub encode: bool,

    #[arg(long = "super-sampling")]
    pub super_sampling: Option<u32>,

    #[arg(long, value_enum, default_value_t = EngineMode::Metal)]
    pub engine: EngineMode,

    /// CPU worker count (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub workers: usize,

    #[arg(long = "gradient-dir", value_name = "DIR")]
    pub gradient_dirs: Vec<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub paused: bool,

    /// Skip the terminal preview (useful when recording).
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineMode {
    Cpu,
    #[value(alias = "gpu")]
    Metal,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fps == 0 {
            bail!("--fps must be >= 1");
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            bail!("--size must be > 0");
        }
        if self.super_sampling == Some(0) {
            bail!("--super-sampling must be >= 1");
        }
        if self.paused && self.headless {
            bail!("--paused cannot be resumed without the preview (drop --headless)");
        }
        if self.encode && self.record.is_none() {
            bail!("--encode requires --record DIR");
        }
        let (w, h) = self.window();
        if w == 0 || h == 0 {
            bail!("--size {} gives an empty window", self.size);
        }
        Ok(())
    }

    pub fn window(&self) -> (usize, usize) {
        (
            (BASE_WINDOW.0 as f64 * self.size) as usize,
            (BASE_WINDOW.1 as f64 * self.size) as usize,
        )
    }

    pub fn recording(&self) -> bool {
        self.record.is_some()
    }
}
