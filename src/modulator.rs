use crate::midi::{MidiFrameEvent, TrackEvents};
use std::collections::BTreeMap;
use std::ops::{Index, Range};

/// Instant attack, linear-fraction release: a value lower than `prev`
/// only closes `1 / decay` of the gap each frame.
fn envelope(prev: f64, raw: f64, decay: f64) -> f64 {
    if prev > raw {
        prev - (prev - raw) / decay.max(1.0)
    } else {
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// Loudest bin in the band.
    Max,
    /// Average bin level (`avg` and `mean` are the same reduction).
    Mean,
    /// Position of the last bin above the threshold, as a fraction of the band.
    High,
}

/// Envelope follower over a band of spectrogram bins.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMod {
    band: Range<usize>,
    mode: AudioMode,
    decay: f64,
    threshold: f64,
    prev: f64,
}

impl AudioMod {
    pub fn new(band: Range<usize>, mode: AudioMode) -> Self {
        Self {
            band,
            mode,
            decay: 20.0,
            threshold: 0.0,
            prev: 0.0,
        }
    }

    pub fn decay(mut self, frames: f64) -> Self {
        self.decay = frames.max(1.0);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn value(&self) -> f64 {
        self.prev
    }

    /// Feeds one frame of band levels and returns the smoothed value.
    pub fn update(&mut self, bands: &[f64]) -> f64 {
        let start = self.band.start.min(bands.len());
        let end = self.band.end.min(bands.len()).max(start);
        let band = &bands[start..end];

        let mut raw = if band.iter().all(|v| *v == 0.0) {
            0.0
        } else {
            match self.mode {
                AudioMode::Max => band.iter().copied().fold(f64::MIN, f64::max),
                AudioMode::Mean => band.iter().sum::<f64>() / band.len() as f64,
                AudioMode::High => {
                    let width = self.band.end.saturating_sub(self.band.start).max(1);
                    match band.iter().rposition(|v| *v > self.threshold) {
                        Some(idx) if idx > 0 => idx as f64 / width as f64,
                        _ => 0.0,
                    }
                }
            }
        };
        if raw < self.threshold {
            raw = 0.0;
        }
        self.prev = envelope(self.prev, raw, self.decay);
        self.prev
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMode {
    /// Highest note of the chord, scaled to `[0, 1]`; release speed follows velocity.
    Pitch,
    /// 1.0 on any note.
    OneOff,
    /// 1.0 when one of these exact note numbers sounds.
    Events(Vec<u8>),
}

impl MidiMode {
    /// Parses `pitch`, `one-off` or `ev-36-38`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pitch" => Some(Self::Pitch),
            "one-off" => Some(Self::OneOff),
            _ => {
                let notes = s.strip_prefix("ev-")?;
                notes
                    .split('-')
                    .map(|n| n.parse::<u8>().ok())
                    .collect::<Option<Vec<_>>>()
                    .filter(|v| !v.is_empty())
                    .map(Self::Events)
            }
        }
    }
}

/// Envelope follower over the note events of one or more named tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiMod {
    tracks: Vec<String>,
    mode: MidiMode,
    master_decay: f64,
    decay: f64,
    hits_only: bool,
    prev: f64,
}

impl MidiMod {
    pub fn new(tracks: &[&str], mode: MidiMode) -> Self {
        Self {
            tracks: tracks.iter().map(|t| t.to_string()).collect(),
            mode,
            master_decay: 10.0,
            decay: 10.0,
            hits_only: false,
            prev: 0.0,
        }
    }

    /// Reports the raw value on the frame a note lands and 0.0 otherwise.
    pub fn hits_only(mut self) -> Self {
        self.hits_only = true;
        self
    }

    pub fn decay(mut self, frames: f64) -> Self {
        self.master_decay = frames.max(1e-6);
        self.decay = frames.max(1.0);
        self
    }

    pub fn value(&self) -> f64 {
        self.prev
    }

    pub fn update(&mut self, events: &[TrackEvents]) -> f64 {
        let mut raw = 0.0;
        if let Some(track) = events.iter().find(|e| self.tracks.contains(&e.track)) {
            for ev in &track.events {
                let MidiFrameEvent::Chord(chord) = ev else {
                    continue;
                };
                let Some((&pitch, &velocity)) = chord.iter().next_back() else {
                    continue;
                };
                match &self.mode {
                    MidiMode::Pitch => {
                        raw = pitch as f64 / 127.0;
                        self.decay = (velocity as f64 / self.master_decay).max(1.0);
                    }
                    MidiMode::OneOff => raw = 1.0,
                    MidiMode::Events(notes) => {
                        if notes.iter().any(|n| chord.contains_key(n)) {
                            raw = 1.0;
                        }
                    }
                }
            }
        }
        self.prev = if self.hits_only {
            raw
        } else {
            envelope(self.prev, raw, self.decay)
        };
        self.prev
    }
}

/// Named scalar signals produced by modulators and read by scenes.
///
/// Every name is declared (at 0.0) before the first frame; indexing an
/// undeclared name panics with the name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    values: BTreeMap<String, f64>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str) {
        self.values.entry(name.to_string()).or_insert(0.0);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        match self.values.get_mut(name) {
            Some(v) => *v = value,
            None => panic!("signal '{name}' was never declared"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Index<&str> for Signals {
    type Output = f64;

    fn index(&self, name: &str) -> &f64 {
        match self.values.get(name) {
            Some(v) => v,
            None => panic!("signal '{name}' was never declared"),
        }
    }
}
