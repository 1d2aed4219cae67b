use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const VIDEO_NAME: &str = "render.mp4";

/// Writes rendered frames as `DIR/%04d.png`.
pub struct FrameRecorder {
    dir: PathBuf,
    first: Option<u64>,
    count: usize,
}

impl FrameRecorder {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create record directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            first: None,
            count: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, frame: u64) -> PathBuf {
        self.dir.join(format!("{frame:04}.png"))
    }

    pub fn first_frame(&self) -> Option<u64> {
        self.first
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn save(&mut self, frame: u64, rgba: &[u8], size: (usize, usize)) -> Result<PathBuf> {
        let path = self.frame_path(frame);
        save_png(&path, rgba, size)?;
        self.first.get_or_insert(frame);
        self.count += 1;
        Ok(path)
    }

    /// The ffmpeg invocation that muxes the recorded frames (and audio)
    /// into `DIR/render.mp4`.
    pub fn encode_command(&self, fps: u32, wav: Option<&Path>) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-framerate")
            .arg(fps.to_string())
            .arg("-start_number")
            .arg(self.first.unwrap_or(0).to_string())
            .arg("-i")
            .arg(self.dir.join("%04d.png"));
        if let Some(wav) = wav {
            cmd.arg("-i")
                .arg(wav)
                .arg("-map")
                .arg("0:v:0")
                .arg("-map")
                .arg("1:a:0")
                .arg("-c:a")
                .arg("aac")
                .arg("-shortest");
        }
        cmd.arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-movflags")
            .arg("+faststart")
            .arg(self.dir.join(VIDEO_NAME))
            .stdin(Stdio::null());
        cmd
    }

    pub fn encode(&self, fps: u32, wav: Option<&Path>) -> Result<PathBuf> {
        if self.count == 0 {
            bail!("no frames were recorded in {}", self.dir.display());
        }
        ensure_ffmpeg_available()?;
        let mut cmd = self.encode_command(fps, wav);
        log::info!("running: {cmd:?}");
        let status = cmd
            .status()
            .with_context(|| format!("run ffmpeg in {}", self.dir.display()))?;
        if !status.success() {
            bail!("ffmpeg exited with {status}");
        }
        Ok(self.dir.join(VIDEO_NAME))
    }
}

pub fn save_png(path: &Path, rgba: &[u8], size: (usize, usize)) -> Result<()> {
    let (w, h) = size;
    let img = RgbaImage::from_raw(w as u32, h as u32, rgba.to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match {w}x{h}"))?;
    img.save(path)
        .with_context(|| format!("write {}", path.display()))
}

/// Saves the current view as `fractal-<unix seconds>.png` in `dir`.
pub fn save_snapshot(dir: &Path, rgba: &[u8], size: (usize, usize)) -> Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let path = dir.join(format!("fractal-{stamp}.png"));
    save_png(&path, rgba, size)?;
    Ok(path)
}

pub fn ensure_ffmpeg_available() -> Result<()> {
    match Command::new("ffmpeg")
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            bail!("ffmpeg not found in PATH (install ffmpeg and retry)")
        }
        Err(err) => Err(anyhow!("failed to run ffmpeg: {err}")),
    }
}
