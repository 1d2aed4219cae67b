use num_complex::Complex64;

/// Maps a pixel window onto a square region of the complex plane.
///
/// The same radius is applied to both axes, so a non-square window shows a
/// stretched view. That matches how scene scripts tune their radius values.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexPlane {
    window: (usize, usize),
    plane_min: Complex64,
    plane_max: Complex64,
    scale: (f64, f64),
}

impl ComplexPlane {
    pub fn new(window: (usize, usize), center: Complex64, radius: f64) -> Self {
        let mut plane = Self {
            window,
            plane_min: Complex64::new(0.0, 0.0),
            plane_max: Complex64::new(0.0, 0.0),
            scale: (1.0, 1.0),
        };
        plane.set_view(center, radius);
        plane
    }

    /// Panics when `radius` is zero or not finite.
    pub fn set_view(&mut self, center: Complex64, radius: f64) {
        assert!(
            radius != 0.0 && radius.is_finite(),
            "complex plane radius must be finite and non-zero (got {radius})"
        );
        self.plane_min = Complex64::new(center.re - radius, center.im - radius);
        self.plane_max = Complex64::new(center.re + radius, center.im + radius);
        self.scale = (
            self.window.0 as f64 / (self.plane_max.re - self.plane_min.re),
            self.window.1 as f64 / (self.plane_max.im - self.plane_min.im),
        );
    }

    pub fn resize(&mut self, window: (usize, usize)) {
        let center = (self.plane_min + self.plane_max) / 2.0;
        let radius = (self.plane_max.re - self.plane_min.re) / 2.0;
        self.window = window;
        self.set_view(center, radius);
    }

    pub fn window(&self) -> (usize, usize) {
        self.window
    }

    pub fn plane_min(&self) -> Complex64 {
        self.plane_min
    }

    pub fn plane_max(&self) -> Complex64 {
        self.plane_max
    }

    /// Pixels per plane unit, per axis.
    pub fn scale(&self) -> (f64, f64) {
        self.scale
    }

    pub fn to_plane(&self, pixel: (f64, f64)) -> Complex64 {
        Complex64::new(
            pixel.0 / self.scale.0 + self.plane_min.re,
            pixel.1 / self.scale.1 + self.plane_min.im,
        )
    }

    pub fn to_screen(&self, point: Complex64) -> (i64, i64) {
        (
            ((point.re - self.plane_min.re) * self.scale.0).round() as i64,
            ((point.im - self.plane_min.im) * self.scale.1).round() as i64,
        )
    }

    pub fn included(&self, point: Complex64) -> bool {
        point.re >= self.plane_min.re
            && point.im >= self.plane_min.im
            && point.re < self.plane_max.re
            && point.im < self.plane_max.im
    }

    /// Fills `out` with the plane coordinate of every pixel, row-major.
    pub fn fill_coordinates(&self, out: &mut Vec<Complex64>) {
        let (w, h) = self.window;
        out.clear();
        out.reserve(w * h);
        for y in 0..h {
            let im = y as f64 / self.scale.1 + self.plane_min.im;
            for x in 0..w {
                out.push(Complex64::new(x as f64 / self.scale.0 + self.plane_min.re, im));
            }
        }
    }
}
