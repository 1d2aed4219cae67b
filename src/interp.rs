use num_complex::Complex64;

/// `length` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, length: usize) -> Vec<f64> {
    match length {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (length - 1) as f64;
            let mut out: Vec<f64> = (0..length).map(|i| start + step * i as f64).collect();
            out[length - 1] = end;
            out
        }
    }
}

/// Values evenly spaced in `log10` between `start` and `end`.
///
/// Both bounds must be strictly positive; callers shift their values by a
/// constant first when the animated parameter can reach zero or below.
pub fn logspace(start: f64, end: f64, length: usize) -> Vec<f64> {
    debug_assert!(
        start > 0.0 && end > 0.0,
        "logspace bounds must be positive (got {start}, {end})"
    );
    let mut out: Vec<f64> = linspace(start.log10(), end.log10(), length)
        .into_iter()
        .map(|v| 10f64.powf(v))
        .collect();
    if let Some(first) = out.first_mut() {
        *first = start;
    }
    if length > 1 {
        out[length - 1] = end;
    }
    out
}

pub fn complex_linspace(start: Complex64, end: Complex64, length: usize) -> Vec<Complex64> {
    linspace(start.re, end.re, length)
        .into_iter()
        .zip(linspace(start.im, end.im, length))
        .map(|(re, im)| Complex64::new(re, im))
        .collect()
}

/// A precomputed ramp indexed by scene position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Curve {
    values: Vec<f64>,
}

impl Curve {
    pub fn linear(start: f64, end: f64, length: usize) -> Self {
        Self {
            values: linspace(start, end, length),
        }
    }

    pub fn log(start: f64, end: f64, length: usize) -> Self {
        Self {
            values: logspace(start, end, length),
        }
    }

    /// Log ramp of `value + offset`, with the offset removed again on read.
    pub fn log_offset(start: f64, end: f64, offset: f64, length: usize) -> Self {
        Self {
            values: logspace(start + offset, end + offset, length)
                .into_iter()
                .map(|v| v - offset)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `pos`, holding the last value past the end.
    pub fn at(&self, pos: usize) -> f64 {
        match self.values.get(pos) {
            Some(v) => *v,
            None => self.values.last().copied().unwrap_or(0.0),
        }
    }

    pub fn last(&self) -> f64 {
        self.at(usize::MAX)
    }
}
