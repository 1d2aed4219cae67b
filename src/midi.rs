use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

const DEFAULT_TEMPO: u32 = 500_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiError {
    Io { path: String, message: String },
    Header(String),
    Truncated { offset: usize },
    InvalidTrack { index: usize },
    UnsupportedDivision(u16),
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "I/O error reading {path}: {message}"),
            Self::Header(msg) => write!(f, "invalid MIDI header: {msg}"),
            Self::Truncated { offset } => write!(f, "MIDI data truncated at byte {offset}"),
            Self::InvalidTrack { index } => write!(f, "track #{index} does not start with MTrk"),
            Self::UnsupportedDivision(d) => {
                write!(f, "SMPTE time division 0x{d:04x} is not supported")
            }
        }
    }
}

impl std::error::Error for MidiError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    NoteOn { pitch: u8, velocity: u8 },
    Control { controller: u8, value: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MidiTrack {
    pub name: String,
    /// `(seconds, event)` in file order.
    pub events: Vec<(f64, RawEvent)>,
}

/// Everything one track did during one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiFrameEvent {
    /// Pitch to velocity of every note started in the frame.
    Chord(BTreeMap<u8, u8>),
    /// Average value of a controller over the frame.
    Control { controller: u8, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvents {
    pub track: String,
    pub events: Vec<MidiFrameEvent>,
}

/// A MIDI file pre-sliced into frames. An empty `Midi` stands for "no MIDI".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Midi {
    tracks: Vec<MidiTrack>,
    frames: Vec<Vec<TrackEvents>>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], MidiError> {
        let end = self.pos.checked_add(n).filter(|e| *e <= self.data.len());
        let Some(end) = end else {
            return Err(MidiError::Truncated { offset: self.pos });
        };
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MidiError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, MidiError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, MidiError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn varlen(&mut self) -> Result<u32, MidiError> {
        let mut value = 0u32;
        for _ in 0..4 {
            let b = self.u8()?;
            value = (value << 7) | (b & 0x7f) as u32;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(MidiError::Truncated { offset: self.pos })
    }

    fn done(&self) -> bool {
        self.pos >= self.data.len()
    }
}

struct TickTrack {
    name: Option<String>,
    events: Vec<(u64, RawEvent)>,
}

impl Midi {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, fps: u32) -> Result<Self, MidiError> {
        let bytes = std::fs::read(path).map_err(|e| MidiError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&bytes, fps)
    }

    pub fn parse(bytes: &[u8], fps: u32) -> Result<Self, MidiError> {
        let mut r = Reader { data: bytes, pos: 0 };
        if r.take(4).ok() != Some(b"MThd".as_slice()) {
            return Err(MidiError::Header("missing MThd".to_string()));
        }
        let header_len = r.u32()? as usize;
        if header_len < 6 {
            return Err(MidiError::Header(format!("header length {header_len}")));
        }
        let format = r.u16()?;
        let track_count = r.u16()?;
        let division = r.u16()?;
        r.take(header_len - 6)?;
        if division & 0x8000 != 0 {
            return Err(MidiError::UnsupportedDivision(division));
        }
        if division == 0 {
            return Err(MidiError::Header("zero ticks per quarter note".to_string()));
        }
        log::info!("MIDI format {format}, {track_count} track(s), {division} ticks/quarter");

        let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
        let mut tick_tracks = Vec::with_capacity(track_count as usize);
        for index in 0..track_count as usize {
            if r.take(4).ok() != Some(b"MTrk".as_slice()) {
                return Err(MidiError::InvalidTrack { index });
            }
            let len = r.u32()? as usize;
            let body = r.take(len)?;
            tick_tracks.push(parse_track(body, &mut tempo_changes)?);
        }

        tempo_changes.sort_by_key(|(tick, _)| *tick);
        let to_seconds = |tick: u64| ticks_to_seconds(tick, &tempo_changes, division);

        let tracks: Vec<MidiTrack> = tick_tracks
            .into_iter()
            .enumerate()
            .filter(|(_, t)| !t.events.is_empty())
            .map(|(idx, t)| MidiTrack {
                name: t.name.unwrap_or_else(|| format!("track-{idx}")),
                events: t
                    .events
                    .into_iter()
                    .map(|(tick, ev)| (to_seconds(tick), ev))
                    .collect(),
            })
            .collect();
        for track in &tracks {
            log::debug!("MIDI track '{}': {} event(s)", track.name, track.events.len());
        }

        let frames = slice_frames(&tracks, fps.max(1));
        Ok(Self { tracks, frames })
    }

    pub fn tracks(&self) -> &[MidiTrack] {
        &self.tracks
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Events of `frame`; empty past the end of the file.
    pub fn events(&self, frame: u64) -> &[TrackEvents] {
        usize::try_from(frame)
            .ok()
            .and_then(|f| self.frames.get(f))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn parse_track(body: &[u8], tempo_changes: &mut Vec<(u64, u32)>) -> Result<TickTrack, MidiError> {
    let mut r = Reader { data: body, pos: 0 };
    let mut track = TickTrack {
        name: None,
        events: Vec::new(),
    };
    let mut tick = 0u64;
    let mut running: Option<u8> = None;

    while !r.done() {
        tick += r.varlen()? as u64;
        let mut status = r.u8()?;
        if status < 0x80 {
            // Running status: the byte just read is the first data byte.
            let Some(prev) = running else {
                return Err(MidiError::Truncated { offset: r.pos });
            };
            r.pos -= 1;
            status = prev;
        }

        match status {
            0xff => {
                let kind = r.u8()?;
                let len = r.varlen()? as usize;
                let data = r.take(len)?;
                match kind {
                    0x2f => break,
                    0x51 if data.len() >= 3 => {
                        let tempo = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                        log::debug!("tempo at tick {tick}: {:.2} bpm", 60_000_000.0 / tempo.max(1) as f64);
                        tempo_changes.push((tick, tempo));
                    }
                    0x03 => track.name = Some(String::from_utf8_lossy(data).trim().to_string()),
                    _ => {}
                }
            }
            0xf0 | 0xf7 => {
                let len = r.varlen()? as usize;
                r.take(len)?;
            }
            _ => {
                running = Some(status);
                match status & 0xf0 {
                    0x90 => {
                        let (pitch, velocity) = (r.u8()?, r.u8()?);
                        if velocity > 0 {
                            track.events.push((tick, RawEvent::NoteOn { pitch, velocity }));
                        }
                    }
                    0xb0 => {
                        let (controller, value) = (r.u8()?, r.u8()?);
                        track.events.push((tick, RawEvent::Control { controller, value }));
                    }
                    0x80 | 0xa0 | 0xe0 => {
                        r.take(2)?;
                    }
                    0xc0 | 0xd0 => {
                        r.u8()?;
                    }
                    _ => return Err(MidiError::Truncated { offset: r.pos }),
                }
            }
        }
    }
    Ok(track)
}

fn ticks_to_seconds(tick: u64, tempo_changes: &[(u64, u32)], division: u16) -> f64 {
    let per_tick = |tempo: u32| tempo as f64 * 1e-6 / division as f64;
    let mut seconds = 0.0;
    let mut last_tick = 0u64;
    let mut tempo = DEFAULT_TEMPO;
    for &(change, next) in tempo_changes {
        if change >= tick {
            break;
        }
        seconds += (change - last_tick) as f64 * per_tick(tempo);
        last_tick = change;
        tempo = next;
    }
    seconds + (tick - last_tick) as f64 * per_tick(tempo)
}

fn slice_frames(tracks: &[MidiTrack], fps: u32) -> Vec<Vec<TrackEvents>> {
    let frame_of = |seconds: f64| (seconds * fps as f64).max(0.0).floor() as usize;
    let count = tracks
        .iter()
        .flat_map(|t| t.events.iter().map(|(s, _)| frame_of(*s) + 1))
        .max()
        .unwrap_or(0);

    let mut frames: Vec<Vec<TrackEvents>> = vec![Vec::new(); count];
    for track in tracks {
        let mut by_frame: BTreeMap<usize, (BTreeMap<u8, u8>, BTreeMap<u8, Vec<u8>>)> = BTreeMap::new();
        for (seconds, ev) in &track.events {
            let slot = by_frame.entry(frame_of(*seconds)).or_default();
            match *ev {
                RawEvent::NoteOn { pitch, velocity } => {
                    slot.0.entry(pitch).or_insert(velocity);
                }
                RawEvent::Control { controller, value } => {
                    slot.1.entry(controller).or_default().push(value);
                }
            }
        }
        for (frame, (chord, controls)) in by_frame {
            let mut events: Vec<MidiFrameEvent> = controls
                .into_iter()
                .map(|(controller, values)| MidiFrameEvent::Control {
                    controller,
                    value: values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64,
                })
                .collect();
            if !chord.is_empty() {
                events.push(MidiFrameEvent::Chord(chord));
            }
            frames[frame].push(TrackEvents {
                track: track.name.clone(),
                events,
            });
        }
    }
    frames
}
