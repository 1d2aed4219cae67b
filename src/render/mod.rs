mod halfblock;

pub use halfblock::HalfBlockRenderer;

use std::io::Write;

/// One preview frame already scaled to the terminal grid.
pub struct Frame<'a> {
    pub term_cols: u16,
    /// Rows used by the picture; each holds two pixel rows.
    pub visual_rows: u16,
    pub pixels_rgba: &'a [u8],
    pub status: &'a str,
    pub sync_updates: bool,
}

pub trait Renderer {
    fn name(&self) -> &'static str;
    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()>;
}

/// Pixel grid for a terminal of `cols x rows` cells, keeping the last row
/// for the status line.
pub fn preview_size(cols: u16, rows: u16) -> (usize, usize) {
    let visual_rows = rows.saturating_sub(1) as usize;
    (cols as usize, visual_rows * 2)
}

/// Nearest-neighbour resample of an RGBA8 image.
pub fn resample(src: &[u8], src_size: (usize, usize), dst_size: (usize, usize), dst: &mut Vec<u8>) {
    let (sw, sh) = src_size;
    let (dw, dh) = dst_size;
    dst.clear();
    dst.resize(dw * dh * 4, 0);
    if sw == 0 || sh == 0 || src.len() < sw * sh * 4 {
        return;
    }
    for y in 0..dh {
        let sy = (y * sh / dh.max(1)).min(sh - 1);
        for x in 0..dw {
            let sx = (x * sw / dw.max(1)).min(sw - 1);
            let s = (sy * sw + sx) * 4;
            let d = (y * dw + x) * 4;
            dst[d..d + 4].copy_from_slice(&src[s..s + 4]);
        }
    }
}

/// Maps a terminal cell to the center of the window pixels it shows.
pub fn cell_to_pixel(
    cell: (u16, u16),
    preview: (usize, usize),
    window: (usize, usize),
) -> Option<(f64, f64)> {
    let (pw, ph) = preview;
    let (col, row) = (cell.0 as usize, cell.1 as usize);
    if col >= pw || row * 2 >= ph {
        return None;
    }
    let x = (col as f64 + 0.5) * window.0 as f64 / pw as f64;
    let y = (row as f64 * 2.0 + 1.0) * window.1 as f64 / ph as f64;
    Some((x, y))
}
