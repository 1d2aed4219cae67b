use crate::interp::{self, Curve};
use crate::modulator::Signals;
use crate::params::ParamSet;
use num_complex::Complex64;
use std::fmt;

/// Per-frame scene update. `S` is the animation's own state (its curves).
pub type SceneFn<S> = fn(&mut S, &mut SceneCtx<'_>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    Empty,
    MissingEnd,
    EndHasCallback,
    MissingCallback { start: u64 },
    NotDecreasing { index: usize, start: u64, previous: u64 },
    DoesNotStartAtZero(u64),
    NoScene(u64),
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "timeline has no scenes"),
            Self::MissingEnd => write!(f, "timeline must begin with the end marker (a start frame without scene)"),
            Self::EndHasCallback => write!(f, "the first timeline entry is the end marker and cannot have a scene"),
            Self::MissingCallback { start } => write!(f, "scene starting at frame {start} has no update function"),
            Self::NotDecreasing { index, start, previous } => write!(
                f,
                "timeline entry #{index} starts at {start}, expected less than {previous} (newest first)"
            ),
            Self::DoesNotStartAtZero(start) => {
                write!(f, "oldest scene starts at frame {start}, timeline must cover frame 0")
            }
            Self::NoScene(frame) => write!(f, "no scene covers frame {frame}"),
        }
    }
}

impl std::error::Error for TimelineError {}

/// One timeline entry as written by an animation, newest first.
pub struct SceneEntry<S> {
    start: u64,
    update: Option<(&'static str, SceneFn<S>)>,
}

impl<S> SceneEntry<S> {
    pub fn scene(start: u64, name: &'static str, update: SceneFn<S>) -> Self {
        Self {
            start,
            update: Some((name, update)),
        }
    }

    /// The end marker: the first frame that is no longer played.
    pub fn end(start: u64) -> Self {
        Self {
            start,
            update: None,
        }
    }
}

pub struct Scene<S> {
    pub name: &'static str,
    pub start: u64,
    pub length: u64,
    pub update: SceneFn<S>,
}

pub enum Resolved<'a, S> {
    Active {
        scene: &'a Scene<S>,
        pos: u64,
        init: bool,
    },
    Finished,
}

/// Scenes ordered newest first, with lengths derived from their neighbours.
pub struct Timeline<S> {
    scenes: Vec<Scene<S>>,
    end: u64,
}

impl<S> Timeline<S> {
    pub fn new(entries: Vec<SceneEntry<S>>) -> Result<Self, TimelineError> {
        let mut entries = entries.into_iter();
        let end = match entries.next() {
            None => return Err(TimelineError::Empty),
            Some(SceneEntry {
                update: Some(_), ..
            }) => return Err(TimelineError::EndHasCallback),
            Some(SceneEntry { start, .. }) => start,
        };

        let mut scenes: Vec<Scene<S>> = Vec::new();
        let mut previous = end;
        for (offset, entry) in entries.enumerate() {
            if entry.start >= previous {
                return Err(TimelineError::NotDecreasing {
                    index: offset + 1,
                    start: entry.start,
                    previous,
                });
            }
            let Some((name, update)) = entry.update else {
                return Err(TimelineError::MissingCallback { start: entry.start });
            };
            scenes.push(Scene {
                name,
                start: entry.start,
                length: previous - entry.start,
                update,
            });
            previous = entry.start;
        }

        match scenes.last() {
            None => Err(TimelineError::MissingEnd),
            Some(oldest) if oldest.start != 0 => Err(TimelineError::DoesNotStartAtZero(oldest.start)),
            Some(_) => Ok(Self { scenes, end }),
        }
    }

    pub fn end_frame(&self) -> u64 {
        self.end
    }

    /// Scenes, newest first.
    pub fn scenes(&self) -> &[Scene<S>] {
        &self.scenes
    }

    /// `[start, end)` frame ranges, oldest first.
    pub fn intervals(&self) -> Vec<(u64, u64)> {
        self.scenes
            .iter()
            .rev()
            .map(|s| (s.start, s.start + s.length))
            .collect()
    }

    pub fn resolve(&self, frame: u64) -> Result<Resolved<'_, S>, TimelineError> {
        if frame >= self.end {
            return Ok(Resolved::Finished);
        }
        let scene = self
            .scenes
            .iter()
            .find(|s| frame >= s.start)
            .ok_or(TimelineError::NoScene(frame))?;
        let pos = frame - scene.start;
        Ok(Resolved::Active {
            scene,
            pos,
            init: pos == 0,
        })
    }
}

/// What a scene update sees for one frame.
pub struct SceneCtx<'a> {
    pub frame: u64,
    /// Frames since the scene started.
    pub pos: usize,
    /// Scene length in frames.
    pub length: usize,
    /// True on the scene's first frame.
    pub init: bool,
    pub params: &'a mut ParamSet,
    pub signals: &'a Signals,
}

impl SceneCtx<'_> {
    /// Current value of a declared modulator signal.
    pub fn signal(&self, name: &str) -> f64 {
        self.signals[name]
    }

    pub fn linspace(&self, start: f64, end: f64) -> Curve {
        Curve::linear(start, end, self.length)
    }

    pub fn logspace(&self, start: f64, end: f64) -> Curve {
        Curve::log(start, end, self.length)
    }

    /// Log ramp for values that may reach zero or below.
    pub fn logspace_offset(&self, start: f64, end: f64, offset: f64) -> Curve {
        Curve::log_offset(start, end, offset, self.length)
    }

    pub fn complex_linspace(&self, start: Complex64, end: Complex64) -> Vec<Complex64> {
        interp::complex_linspace(start, end, self.length)
    }
}
