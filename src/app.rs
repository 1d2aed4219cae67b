use crate::animation::{FrameStatus, Show};
use crate::animations::make_animation;
use crate::audio::{AudioPlayer, WavAudio};
use crate::capture::{save_snapshot, FrameRecorder};
use crate::compute::create_backend;
use crate::config::Config;
use crate::controller::{Action, Controller};
use crate::fractal::Fractal;
use crate::kernel::KernelProgram;
use crate::midi::Midi;
use crate::render::{cell_to_pixel, resample, Frame, HalfBlockRenderer, Renderer};
use crate::terminal::PreviewScreen;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind, MouseEventKind};
use std::io::{stdout, BufWriter};
use std::path::Path;
use std::time::{Duration, Instant};

/// Terminal preview; dropping it restores the terminal.
struct Preview {
    screen: PreviewScreen,
    renderer: HalfBlockRenderer,
    scaled: Vec<u8>,
    size: (usize, usize),
}

impl Preview {
    fn new(animation: &str) -> Result<Self> {
        Ok(Self {
            screen: PreviewScreen::enter(animation)?,
            renderer: HalfBlockRenderer::new(),
            scaled: Vec::new(),
            size: (0, 0),
        })
    }

    fn draw(&mut self, rgba: &[u8], window: (usize, usize), status: &str) -> Result<()> {
        let ((cols, _), size) = self.screen.grid()?;
        self.size = size;
        resample(rgba, window, self.size, &mut self.scaled);
        let frame = Frame {
            term_cols: cols,
            visual_rows: (self.size.1 / 2) as u16,
            pixels_rgba: &self.scaled,
            status,
            sync_updates: true,
        };
        let mut out = BufWriter::new(stdout().lock());
        self.renderer.render(&frame, &mut out)
    }
}

#[derive(Default)]
struct Input {
    quit: bool,
    redraw: bool,
}

pub fn run(cfg: Config) -> Result<()> {
    cfg.validate()?;
    let mut show = make_animation(&cfg.animation)?;
    if let Some(ss) = cfg.super_sampling {
        show.params_mut().set("super_sampling", ss as f64);
    }

    let audio = match &cfg.wav {
        Some(path) => {
            let audio = WavAudio::load(path, cfg.fps)
                .with_context(|| format!("load audio {}", path.display()))?;
            log::info!(
                "{}: {} Hz, {} channel(s), {} frames",
                path.display(),
                audio.sample_rate(),
                audio.channels(),
                audio.frame_count()
            );
            show.set_audio(audio.frame_size());
            Some(audio)
        }
        None => None,
    };
    if let Some(path) = &cfg.midi {
        let midi =
            Midi::load(path, cfg.fps).with_context(|| format!("load midi {}", path.display()))?;
        show.set_midi(midi, cfg.midi_skip);
    }

    let spec = show.kernel().clone();
    spec.check_params(show.params())?;
    let program = KernelProgram::build(&spec, &cfg.gradient_dirs)
        .with_context(|| format!("build kernel for '{}'", show.name()))?;
    let backend = create_backend(cfg.engine, program, cfg.workers)?;
    let mut fractal = Fractal::new(cfg.window(), backend, spec.extra_params.clone(), spec.axis);
    log::info!(
        "{}: {}x{} on {} backend, {} frames",
        show.name(),
        fractal.window().0,
        fractal.window().1,
        fractal.backend_name(),
        show.end_frame()
    );

    // Warm the device before timing anything.
    fractal.render(show.params())?;

    show.set_silent(true);
    for frame in 0..cfg.skip {
        if update(&mut *show, audio.as_ref(), frame)? == FrameStatus::Finished {
            break;
        }
    }
    show.set_silent(false);

    let mut player = match &audio {
        Some(a) if !cfg.recording() => match AudioPlayer::new(a.sample_rate(), a.channels()) {
            Ok(p) => Some(p),
            Err(err) => {
                log::warn!("audio playback disabled: {err:#}");
                None
            }
        },
        _ => None,
    };
    let mut recorder = cfg.record.as_deref().map(FrameRecorder::create).transpose()?;
    let mut preview = if cfg.headless { None } else { Some(Preview::new(show.name())?) };
    let controller = Controller::new(spec.axis);
    let frame_time = Duration::from_secs_f64(1.0 / cfg.fps as f64);

    let mut frame = cfg.skip;
    let mut paused = cfg.paused;
    let mut redraw = true;
    loop {
        let start = Instant::now();

        if let Some(preview) = preview.as_ref() {
            let input = poll_input(&controller, &mut *show, &fractal, preview, &mut paused)?;
            if input.quit {
                break;
            }
            redraw |= input.redraw;
        }

        if !paused {
            if let (Some(player), Some(samples)) =
                (player.as_mut(), audio.as_ref().and_then(|a| a.frame(frame)))
            {
                player.queue(samples);
            }
            if update(&mut *show, audio.as_ref(), frame)? == FrameStatus::Finished {
                break;
            }
            frame += 1;
            redraw = true;
        }

        if redraw {
            redraw = false;
            fractal.render(show.params())?;
            if let Some(rec) = recorder.as_mut() {
                rec.save(frame, fractal.rgba(), fractal.window())?;
            }
            if let Some(preview) = preview.as_mut() {
                let status = format!(
                    "{} | frame {frame} | {} | {}",
                    show.name(),
                    fractal.backend_name(),
                    if paused { "paused" } else { "playing" }
                );
                preview.draw(fractal.rgba(), fractal.window(), &status)?;
            }
            log::info!(
                "{frame:04}: {:.2} sec '{}'",
                start.elapsed().as_secs_f64(),
                show.params().modified_report()
            );
        }

        if recorder.is_none() || paused {
            let spent = start.elapsed();
            if spent < frame_time {
                std::thread::sleep(frame_time - spent);
            }
        }
    }
    drop(preview);

    if let Some(rec) = recorder {
        log::info!("recorded {} frame(s) in {}", rec.count(), rec.dir().display());
        if cfg.encode {
            let video = rec.encode(cfg.fps, cfg.wav.as_deref())?;
            log::info!("wrote {}", video.display());
        }
    }
    Ok(())
}

fn update(show: &mut dyn Show, audio: Option<&WavAudio>, frame: u64) -> Result<FrameStatus> {
    let samples = audio.and_then(|a| a.frame(frame).map(|s| (s, a.channels())));
    show.update(frame, samples)
        .with_context(|| format!("frame {frame}"))
}

fn poll_input(
    controller: &Controller,
    show: &mut dyn Show,
    fractal: &Fractal,
    preview: &Preview,
    paused: &mut bool,
) -> Result<Input> {
    let mut input = Input::default();
    while event::poll(Duration::from_millis(0))? {
        let view = fractal.view(show.params());
        let action = match event::read()? {
            Event::Key(k) if k.kind != KeyEventKind::Release => {
                controller.on_key(k.code, k.modifiers, show.params_mut(), &view)
            }
            Event::Mouse(m) => match m.kind {
                MouseEventKind::Down(button) => {
                    match cell_to_pixel((m.column, m.row), preview.size, fractal.window()) {
                        Some(pixel) => controller.on_click(button, pixel, show.params_mut(), &view),
                        None => Action::Ignored,
                    }
                }
                _ => Action::Ignored,
            },
            Event::Resize(..) => Action::Redraw,
            _ => Action::Ignored,
        };
        match action {
            Action::Ignored => {}
            Action::Redraw => input.redraw = true,
            Action::TogglePause => *paused = !*paused,
            Action::Report => log::info!("params: {}", show.params().modified_report()),
            Action::Snapshot => {
                let path = save_snapshot(Path::new("."), fractal.rgba(), fractal.window())?;
                log::info!("saved {}", path.display());
            }
            Action::Quit => {
                input.quit = true;
                break;
            }
        }
    }
    Ok(input)
}
