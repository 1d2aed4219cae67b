use crate::render::{Frame, Renderer};
use std::io::Write;

const HALF_BLOCK: char = '\u{2580}';

type Rgb = (u8, u8, u8);

/// Two pixels per cell: the upper one as foreground of `▀`, the lower as background.
#[derive(Default)]
pub struct HalfBlockRenderer {
    last_fg: Option<Rgb>,
    last_bg: Option<Rgb>,
}

impl HalfBlockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn paint(&mut self, out: &mut dyn Write, fg: Rgb, bg: Rgb) -> std::io::Result<()> {
        if self.last_fg != Some(fg) {
            write!(out, "\x1b[38;2;{};{};{}m", fg.0, fg.1, fg.2)?;
            self.last_fg = Some(fg);
        }
        if self.last_bg != Some(bg) {
            write!(out, "\x1b[48;2;{};{};{}m", bg.0, bg.1, bg.2)?;
            self.last_bg = Some(bg);
        }
        write!(out, "{HALF_BLOCK}")
    }
}

fn rgb_at(px: &[u8], idx: usize) -> Rgb {
    (px[idx * 4], px[idx * 4 + 1], px[idx * 4 + 2])
}

impl Renderer for HalfBlockRenderer {
    fn name(&self) -> &'static str {
        "halfblock"
    }

    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let cols = frame.term_cols as usize;
        let rows = frame.visual_rows as usize;
        if cols == 0 || rows == 0 || frame.pixels_rgba.len() < cols * rows * 2 * 4 {
            return Ok(());
        }

        if frame.sync_updates {
            out.write_all(b"\x1b[?2026h")?;
        }
        // Home, reset, autowrap off while painting full-width rows.
        out.write_all(b"\x1b[H\x1b[0m\x1b[?7l")?;
        self.last_fg = None;
        self.last_bg = None;

        for row in 0..rows {
            let top = row * 2 * cols;
            let bottom = top + cols;
            for x in 0..cols {
                let fg = rgb_at(frame.pixels_rgba, top + x);
                let bg = rgb_at(frame.pixels_rgba, bottom + x);
                self.paint(out, fg, bg)?;
            }
            out.write_all(b"\r\n")?;
        }

        write!(out, "\x1b[{};1H\x1b[0m\x1b[2K", rows + 1)?;
        let status: String = frame.status.chars().take(cols).collect();
        write!(out, "{status}")?;

        out.write_all(b"\x1b[?7h")?;
        if frame.sync_updates {
            out.write_all(b"\x1b[?2026l")?;
        }
        out.flush()?;
        Ok(())
    }
}
