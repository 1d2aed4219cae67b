use crate::audio::Spectrogram;
use crate::kernel::KernelSpec;
use crate::midi::{Midi, MidiFrameEvent, TrackEvents};
use crate::modulator::{AudioMod, MidiMod, Signals};
use crate::params::ParamSet;
use crate::scene::{Resolved, SceneCtx, SceneEntry, Timeline, TimelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A scene ran for this frame.
    Played { scene: &'static str, pos: u64 },
    /// The frame is past the end marker.
    Finished,
}

/// A running animation as seen by the frame loop.
pub trait Show {
    fn name(&self) -> &str;
    fn kernel(&self) -> &KernelSpec;
    fn params(&self) -> &ParamSet;
    fn params_mut(&mut self) -> &mut ParamSet;
    fn signals(&self) -> &Signals;
    fn end_frame(&self) -> u64;

    /// Enables spectral analysis for audio frames of `frame_size` samples per channel.
    fn set_audio(&mut self, frame_size: usize);

    /// Attaches a MIDI file; frame `n` reads the file's frame `n + skip`.
    fn set_midi(&mut self, midi: Midi, skip: u64);

    /// Silent mode suppresses per-frame event logging (used while skipping).
    fn set_silent(&mut self, silent: bool);

    /// Feeds this frame's audio (interleaved, or `None` for silence) and
    /// MIDI to the modulators, then runs the active scene.
    fn update(
        &mut self,
        frame: u64,
        audio: Option<(&[f32], usize)>,
    ) -> Result<FrameStatus, TimelineError>;
}

/// Parameters, kernel, timeline and modulators of one animation.
///
/// `S` holds whatever the scenes keep between frames, usually the curves
/// built on a scene's first frame.
pub struct Animation<S> {
    name: &'static str,
    params: ParamSet,
    kernel: KernelSpec,
    timeline: Timeline<S>,
    state: S,
    signals: Signals,
    audio_mods: Vec<(&'static str, AudioMod)>,
    midi_mods: Vec<(&'static str, MidiMod)>,
    spectrogram: Option<Spectrogram>,
    midi: Midi,
    midi_skip: u64,
    fixed_midi_skip: Option<u64>,
    silent: bool,
}

impl<S> Animation<S> {
    pub fn new(
        name: &'static str,
        params: ParamSet,
        kernel: KernelSpec,
        scenes: Vec<SceneEntry<S>>,
        state: S,
    ) -> Result<Self, TimelineError> {
        let mut params = params;
        params.mark_start();
        Ok(Self {
            name,
            params,
            kernel,
            timeline: Timeline::new(scenes)?,
            state,
            signals: Signals::new(),
            audio_mods: Vec::new(),
            midi_mods: Vec::new(),
            spectrogram: None,
            midi: Midi::empty(),
            midi_skip: 0,
            fixed_midi_skip: None,
            silent: false,
        })
    }

    /// Registers an audio modulator; its signal reads 0.0 until audio arrives.
    pub fn audio_mod(mut self, signal: &'static str, m: AudioMod) -> Self {
        self.signals.declare(signal);
        self.audio_mods.push((signal, m));
        self
    }

    pub fn midi_mod(mut self, signal: &'static str, m: MidiMod) -> Self {
        self.signals.declare(signal);
        self.midi_mods.push((signal, m));
        self
    }

    /// Pins the MIDI offset for a song whose file is not aligned with its
    /// audio; `--midi-skip` is ignored.
    pub fn midi_offset(mut self, frames: u64) -> Self {
        self.fixed_midi_skip = Some(frames);
        self
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    fn update_audio(&mut self, audio: Option<(&[f32], usize)>) {
        if self.audio_mods.is_empty() {
            return;
        }
        let bands: &[f64] = match self.spectrogram.as_mut() {
            Some(spectre) => {
                match audio {
                    Some((samples, channels)) => spectre.transform(samples, channels),
                    None => spectre.silence(),
                }
                spectre.band()
            }
            None => &[],
        };
        for (signal, m) in &mut self.audio_mods {
            self.signals.set(signal, m.update(bands));
        }
    }

    fn update_midi(&mut self, frame: u64) {
        let events = self.midi.events(frame + self.midi_skip);
        if !self.silent && !events.is_empty() {
            log::debug!("{frame:04}: midi {}", describe_events(events));
        }
        for (signal, m) in &mut self.midi_mods {
            self.signals.set(signal, m.update(events));
        }
    }
}

impl<S> Show for Animation<S> {
    fn name(&self) -> &str {
        self.name
    }

    fn kernel(&self) -> &KernelSpec {
        &self.kernel
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }

    fn end_frame(&self) -> u64 {
        self.timeline.end_frame()
    }

    fn set_audio(&mut self, frame_size: usize) {
        if !self.audio_mods.is_empty() {
            self.spectrogram = Some(Spectrogram::new(frame_size));
        }
    }

    fn set_midi(&mut self, midi: Midi, skip: u64) {
        self.midi = midi;
        self.midi_skip = self.fixed_midi_skip.unwrap_or(skip);
    }

    fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    fn update(
        &mut self,
        frame: u64,
        audio: Option<(&[f32], usize)>,
    ) -> Result<FrameStatus, TimelineError> {
        self.update_audio(audio);
        self.update_midi(frame);

        let (name, update, pos, length, init) = match self.timeline.resolve(frame)? {
            Resolved::Finished => return Ok(FrameStatus::Finished),
            Resolved::Active { scene, pos, init } => {
                (scene.name, scene.update, pos, scene.length, init)
            }
        };
        let mut ctx = SceneCtx {
            frame,
            pos: pos as usize,
            length: length as usize,
            init,
            params: &mut self.params,
            signals: &self.signals,
        };
        update(&mut self.state, &mut ctx);
        Ok(FrameStatus::Played { scene: name, pos })
    }
}

fn describe_events(events: &[TrackEvents]) -> String {
    events
        .iter()
        .map(|t| {
            let evs: Vec<String> = t
                .events
                .iter()
                .map(|e| match e {
                    MidiFrameEvent::Chord(chord) => format!("{chord:?}"),
                    MidiFrameEvent::Control { controller, value } => {
                        format!("cc{controller}={value:.1}")
                    }
                })
                .collect();
            format!("{}: {}", t.track, evs.join(" "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
