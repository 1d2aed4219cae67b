use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    Io { path: String, message: String },
    Format(String),
    FrameRate { sample_rate: u32, fps: u32 },
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "I/O error reading {path}: {message}"),
            Self::Format(msg) => write!(f, "{msg}"),
            Self::FrameRate { sample_rate, fps } => {
                write!(f, "can't slice {sample_rate} Hz audio at {fps} fps (rate must divide evenly)")
            }
        }
    }
}

impl std::error::Error for AudioError {}

/// A decoded WAV file sliced into one chunk of samples per video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    sample_rate: u32,
    channels: usize,
    /// Interleaved, `[-1, 1]`.
    samples: Vec<f32>,
    frame_size: usize,
    frame_count: usize,
}

impl WavAudio {
    pub fn load(path: &Path, fps: u32) -> Result<Self, AudioError> {
        let bytes = std::fs::read(path).map_err(|e| AudioError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_wav_bytes(&bytes, fps)
    }

    pub fn from_wav_bytes(bytes: &[u8], fps: u32) -> Result<Self, AudioError> {
        let (sample_rate, channels, samples) = read_wav(bytes)?;
        Self::from_samples(sample_rate, channels, samples, fps)
    }

    pub fn from_samples(
        sample_rate: u32,
        channels: usize,
        samples: Vec<f32>,
        fps: u32,
    ) -> Result<Self, AudioError> {
        if fps == 0 || sample_rate % fps != 0 {
            return Err(AudioError::FrameRate { sample_rate, fps });
        }
        if channels == 0 {
            return Err(AudioError::Format("invalid channel count".to_string()));
        }
        let frame_size = (sample_rate / fps) as usize;
        let frame_count = samples.len() / channels / frame_size;
        Ok(Self {
            sample_rate,
            channels,
            samples,
            frame_size,
            frame_count,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel in one video frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Interleaved samples of `frame`, or `None` past the end.
    pub fn frame(&self, frame: u64) -> Option<&[f32]> {
        let frame = usize::try_from(frame).ok()?;
        if frame >= self.frame_count {
            return None;
        }
        let len = self.frame_size * self.channels;
        let start = frame * len;
        self.samples.get(start..start + len)
    }
}

fn read_wav(bytes: &[u8]) -> Result<(u32, usize, Vec<f32>), AudioError> {
    let bad = |msg: &str| AudioError::Format(msg.to_string());
    if bytes.len() < 44 {
        return Err(bad("wav too small"));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(bad("not a RIFF/WAVE file"));
    }

    let mut fmt_audio_format = 0u16;
    let mut fmt_channels = 0u16;
    let mut fmt_sample_rate = 0u32;
    let mut fmt_bits = 0u16;
    let mut data: Option<&[u8]> = None;

    let mut pos = 12usize;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size =
            u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
                as usize;
        let start = pos + 8;
        let end = start.saturating_add(size).min(bytes.len());

        if id == b"fmt " {
            if size < 16 || start + 16 > bytes.len() {
                return Err(bad("invalid fmt chunk"));
            }
            fmt_audio_format = u16::from_le_bytes([bytes[start], bytes[start + 1]]);
            fmt_channels = u16::from_le_bytes([bytes[start + 2], bytes[start + 3]]);
            fmt_sample_rate = u32::from_le_bytes([
                bytes[start + 4],
                bytes[start + 5],
                bytes[start + 6],
                bytes[start + 7],
            ]);
            fmt_bits = u16::from_le_bytes([bytes[start + 14], bytes[start + 15]]);
        } else if id == b"data" {
            data = Some(&bytes[start..end]);
        }

        pos = end + (size % 2);
    }

    let data = data.ok_or_else(|| bad("missing data chunk"))?;
    if fmt_channels == 0 {
        return Err(bad("invalid channel count"));
    }
    let channels = fmt_channels as usize;

    let samples: Vec<f32> = match (fmt_audio_format, fmt_bits) {
        (1, 16) => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect(),
        (3, 32) => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]).clamp(-1.0, 1.0))
            .collect(),
        _ => {
            return Err(AudioError::Format(format!(
                "unsupported wav format: audio_format={fmt_audio_format} bits={fmt_bits} (supported: PCM16, Float32)"
            )));
        }
    };
    let whole = samples.len() / channels * channels;
    let mut samples = samples;
    samples.truncate(whole);
    Ok((fmt_sample_rate, channels, samples))
}

/// Levels are calibrated against 16-bit sample magnitudes.
const PCM_SCALE: f64 = 32768.0;

/// Log-compressed power spectrum of one audio frame.
///
/// The frame is Hann-windowed, zero-padded to twice its length and
/// transformed; the lower `frame_size / 2` bins are kept. `band()` floors
/// the noise so silence reads as exactly zero.
pub struct Spectrogram {
    frame_size: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    buf: Vec<Complex<f64>>,
    freq: Vec<f64>,
    band: Vec<f64>,
}

impl Spectrogram {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        let window = if frame_size == 1 {
            vec![1.0]
        } else {
            (0..frame_size)
                .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (frame_size - 1) as f64).cos())
                .collect()
        };
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(frame_size * 2);
        Self {
            frame_size,
            window,
            fft,
            buf: vec![Complex { re: 0.0, im: 0.0 }; frame_size * 2],
            freq: vec![0.0; frame_size / 2],
            band: vec![0.0; frame_size / 2],
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Analyzes one interleaved frame.
    pub fn transform(&mut self, frame: &[f32], channels: usize) {
        let channels = channels.max(1);
        let mut silent = true;
        for (i, slot) in self.buf.iter_mut().enumerate() {
            let mono = if i < self.frame_size {
                let s = frame
                    .get(i * channels..(i + 1) * channels)
                    .map(|s| s.iter().map(|v| *v as f64).sum::<f64>() / channels as f64)
                    .unwrap_or(0.0);
                if s != 0.0 {
                    silent = false;
                }
                s * PCM_SCALE * self.window[i]
            } else {
                0.0
            };
            *slot = Complex { re: mono, im: 0.0 };
        }
        if silent {
            self.silence();
            return;
        }

        self.fft.process(&mut self.buf);
        let scale = self.frame_size as f64;
        for (f, c) in self.freq.iter_mut().zip(&self.buf) {
            let power = (c.re * c.re + c.im * c.im) / (scale * scale);
            let db = 20.0 * power.log10();
            *f = db.clamp(-40.0, 200.0) / 128.0 + 0.3125;
        }
        for (b, f) in self.band.iter_mut().zip(&self.freq) {
            *b = (f.max(0.5) + 0.5).log10() * 3.0;
        }
    }

    pub fn silence(&mut self) {
        self.freq.fill(0.0);
        self.band.fill(0.0);
    }

    pub fn freq(&self) -> &[f64] {
        &self.freq
    }

    pub fn band(&self) -> &[f64] {
        &self.band
    }
}

/// Plays frame chunks on the default output device as they are queued.
pub struct AudioPlayer {
    _stream: cpal::Stream,
    prod: ringbuf::HeapProd<f32>,
}

impl AudioPlayer {
    pub fn new(sample_rate: u32, channels: usize) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device found"))?;
        let supported = device
            .supported_output_configs()
            .context("enumerate output configs")?
            .filter(|c| {
                c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate
            })
            .max_by_key(|c| (c.channels() as usize == channels, c.sample_format() == SampleFormat::F32))
            .ok_or_else(|| anyhow!("output device does not support {sample_rate} Hz"))?
            .with_sample_rate(cpal::SampleRate(sample_rate));
        let out_channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let rb = HeapRb::<f32>::new((sample_rate as usize * channels).saturating_mul(4));
        let (prod, cons) = rb.split();
        let mut feed = ChannelFeed::new(cons, channels, out_channels);

        let err_fn = |err| log::warn!("audio output stream error: {err}");
        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| feed.fill(data),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _| feed.fill(data),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _| feed.fill(data),
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };
        stream.play().context("start output stream")?;
        log::info!(
            "playing audio on {} ({sample_rate} Hz, {out_channels} channel(s))",
            device.name().unwrap_or_else(|_| "<unknown>".to_string())
        );

        Ok(Self {
            _stream: stream,
            prod,
        })
    }

    /// Queues one frame of interleaved samples; overflow is dropped.
    pub fn queue(&mut self, samples: &[f32]) {
        let pushed = self.prod.push_slice(samples);
        if pushed < samples.len() {
            log::debug!("audio queue full, dropped {} samples", samples.len() - pushed);
        }
    }
}

/// Consumer end of the playback queue, spreading the song's channels over
/// the device's. Extra device channels repeat the last song channel.
pub struct ChannelFeed {
    cons: ringbuf::HeapCons<f32>,
    frame: Vec<f32>,
    out_channels: usize,
}

impl ChannelFeed {
    pub fn new(cons: ringbuf::HeapCons<f32>, in_channels: usize, out_channels: usize) -> Self {
        Self {
            cons,
            frame: vec![0.0; in_channels.max(1)],
            out_channels: out_channels.max(1),
        }
    }

    /// Fills a device buffer; an empty queue plays silence. Runs on the
    /// audio thread, so it never allocates.
    pub fn fill<T: SizedSample + FromSample<f32>>(&mut self, data: &mut [T]) {
        let last = self.frame.len() - 1;
        for out in data.chunks_mut(self.out_channels) {
            for s in self.frame.iter_mut() {
                *s = self.cons.try_pop().unwrap_or(0.0);
            }
            for (ch, sample) in out.iter_mut().enumerate() {
                *sample = T::from_sample(self.frame[ch.min(last)]);
            }
        }
    }
}

