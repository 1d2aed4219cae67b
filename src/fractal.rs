use crate::compute::ComputeBackend;
use crate::kernel::{AxisOrder, KernelArgs};
use crate::params::ParamSet;
use crate::plane::ComplexPlane;
use num_complex::Complex64;
use std::collections::VecDeque;

const MAP_TRAIL: usize = 42;
const TRAIL_COLOR: [u8; 4] = [255, 255, 255, 255];
const SEED_COLOR: [u8; 4] = [255, 64, 64, 255];

/// One fractal view: owns the compiled kernel and the per-frame buffers.
pub struct Fractal {
    window: (usize, usize),
    axis: AxisOrder,
    extra_params: Vec<String>,
    backend: Box<dyn ComputeBackend>,
    plane: ComplexPlane,
    coords: Vec<Complex64>,
    raw: Vec<u32>,
    rgba: Vec<u8>,
    map: MapOverlay,
}

struct MapOverlay {
    plane: ComplexPlane,
    coords: Vec<Complex64>,
    raw: Vec<u32>,
    trail: VecDeque<Complex64>,
}

impl Fractal {
    pub fn new(
        window: (usize, usize),
        backend: Box<dyn ComputeBackend>,
        extra_params: Vec<String>,
        axis: AxisOrder,
    ) -> Self {
        let window = (window.0.max(1), window.1.max(1));
        let map_window = ((window.0 / 5).max(1), (window.1 / 5).max(1));
        Self {
            window,
            axis,
            extra_params,
            backend,
            plane: ComplexPlane::new(window, Complex64::new(0.0, 0.0), 1.0),
            coords: Vec::new(),
            raw: Vec::new(),
            rgba: vec![0; window.0 * window.1 * 4],
            map: MapOverlay {
                plane: ComplexPlane::new(map_window, Complex64::new(0.0, 0.0), 1.0),
                coords: Vec::new(),
                raw: Vec::new(),
                trail: VecDeque::with_capacity(MAP_TRAIL),
            },
        }
    }

    pub fn window(&self) -> (usize, usize) {
        self.window
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The main view at window resolution, for mouse and key mapping.
    pub fn view(&self, params: &ParamSet) -> ComplexPlane {
        ComplexPlane::new(self.window, params.center(), params["radius"])
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Renders the current parameters into an RGBA8 buffer of the window size.
    pub fn render(&mut self, params: &ParamSet) -> anyhow::Result<&[u8]> {
        let ss = params.get("super_sampling").unwrap_or(1.0).max(1.0) as usize;
        let (w, h) = self.window;
        let full = (w * ss, h * ss);
        if self.plane.window() != full {
            self.plane.resize(full);
        }
        self.plane.set_view(params.center(), params["radius"]);
        self.plane.fill_coordinates(&mut self.coords);

        let args = KernelArgs::from_params(params, &self.extra_params, params.flag("julia"));
        self.raw.resize(self.coords.len(), 0);
        self.backend.render(&self.coords, &args, &mut self.raw)?;
        downsample(&self.raw, full, ss, &mut self.rgba);

        if params.flag("show_map") {
            self.render_map(params, args)?;
        }
        Ok(&self.rgba)
    }

    fn render_map(&mut self, params: &ParamSet, mut args: KernelArgs) -> anyhow::Result<()> {
        let seed = params.c();
        if self.map.trail.back() != Some(&seed) {
            if self.map.trail.len() == MAP_TRAIL {
                self.map.trail.pop_front();
            }
            self.map.trail.push_back(seed);
        }

        let map = &mut self.map;
        map.plane.set_view(params.map_center(), params["map_radius"]);
        map.plane.fill_coordinates(&mut map.coords);
        args.julia = false;
        map.raw.resize(map.coords.len(), 0);
        self.backend.render(&map.coords, &args, &mut map.raw)?;

        let (mw, mh) = map.plane.window();
        let row_bytes = self.window.0 * 4;
        for y in 0..mh.min(self.window.1) {
            for x in 0..mw.min(self.window.0) {
                let o = y * row_bytes + x * 4;
                self.rgba[o..o + 4].copy_from_slice(&unpack(map.raw[y * mw + x]));
            }
        }

        let last = map.trail.len().saturating_sub(1);
        for (idx, c) in map.trail.iter().enumerate() {
            let point = match self.axis {
                AxisOrder::Normal => *c,
                AxisOrder::Swapped => Complex64::new(c.im, c.re),
            };
            if !map.plane.included(point) {
                continue;
            }
            let (x, y) = map.plane.to_screen(point);
            let (x, y) = (x as usize, y as usize);
            if x < mw && y < mh && x < self.window.0 && y < self.window.1 {
                let color = if idx == last { SEED_COLOR } else { TRAIL_COLOR };
                let o = y * row_bytes + x * 4;
                self.rgba[o..o + 4].copy_from_slice(&color);
            }
        }
        Ok(())
    }
}

/// `0xAARRGGBB` to `[r, g, b, a]`.
pub fn unpack(px: u32) -> [u8; 4] {
    [(px >> 16) as u8, (px >> 8) as u8, px as u8, (px >> 24) as u8]
}

/// Box-filters `src` (`size` pixels, `ss`x`ss` blocks) into RGBA8 `dst`.
pub fn downsample(src: &[u32], size: (usize, usize), ss: usize, dst: &mut Vec<u8>) {
    let ss = ss.max(1);
    let (w, h) = (size.0 / ss, size.1 / ss);
    dst.resize(w * h * 4, 0);
    if ss == 1 {
        for (d, px) in dst.chunks_exact_mut(4).zip(src) {
            d.copy_from_slice(&unpack(*px));
        }
        return;
    }
    let area = (ss * ss) as u32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u32; 4];
            for sy in 0..ss {
                let row = (y * ss + sy) * size.0;
                for sx in 0..ss {
                    let px = unpack(src[row + x * ss + sx]);
                    for (a, v) in acc.iter_mut().zip(px) {
                        *a += v as u32;
                    }
                }
            }
            let o = (y * w + x) * 4;
            for (i, a) in acc.iter().enumerate() {
                dst[o + i] = (a / area) as u8;
            }
        }
    }
}
