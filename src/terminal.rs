use crate::render::preview_size;
use anyhow::Context;
use crossterm::{cursor, event, queue, terminal};
use std::io::{stdout, Write};

/// Terminal state held while the live preview runs.
///
/// Raw mode, the alternate screen and mouse reporting are restored on drop,
/// so an error anywhere in the frame loop leaves a usable shell behind.
pub struct PreviewScreen {
    _raw: (),
}

impl PreviewScreen {
    pub fn enter(animation: &str) -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        let screen = Self { _raw: () };

        let mut out = stdout();
        queue!(
            out,
            terminal::EnterAlternateScreen,
            terminal::SetTitle(format!("fractal-vj: {animation}")),
            terminal::Clear(terminal::ClearType::All),
            cursor::Hide,
            event::EnableMouseCapture,
        )
        .context("set up preview screen")?;
        out.flush().context("set up preview screen")?;
        Ok(screen)
    }

    /// Current terminal cells and the pixel grid they can show.
    pub fn grid(&self) -> anyhow::Result<((u16, u16), (usize, usize))> {
        let (cols, rows) = terminal::size().context("query terminal size")?;
        Ok(((cols, rows), preview_size(cols, rows)))
    }
}

impl Drop for PreviewScreen {
    fn drop(&mut self) {
        let mut out = stdout();
        // Close any half-written synchronized frame before leaving.
        let _ = out.write_all(b"\x1b[?2026l\x1b[?7h\x1b[0m");
        let _ = queue!(
            out,
            event::DisableMouseCapture,
            cursor::Show,
            terminal::LeaveAlternateScreen,
        );
        let _ = out.flush();
        let _ = terminal::disable_raw_mode();
    }
}
