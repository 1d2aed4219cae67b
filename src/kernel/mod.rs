pub mod formula;
pub mod msl;

use crate::gradient::{Gradient, GradientError, OPAQUE_BLACK};
use crate::params::ParamSet;
use formula::{Formula, FormulaError, OrbitState};
use num_complex::Complex64;
use std::f64::consts::LN_2;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const MAX_GRADIENT_LENGTH: usize = 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    EscapeTime,
    MeanDistance,
    OrbitTrap,
}

impl KernelVariant {
    pub fn name(self) -> &'static str {
        match self {
            Self::EscapeTime => "escape-time",
            Self::MeanDistance => "mean-distance",
            Self::OrbitTrap => "orbit-trap",
        }
    }
}

impl FromStr for KernelVariant {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "escape-time" | "escape-time-gradient" => Ok(Self::EscapeTime),
            "mean-distance" => Ok(Self::MeanDistance),
            "orbit-trap" => Ok(Self::OrbitTrap),
            other => Err(KernelError::UnknownVariant(other.to_string())),
        }
    }
}

/// Which plane coordinate feeds the real part of the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOrder {
    #[default]
    Normal,
    Swapped,
}

/// Trap loci for the orbit-trap variant: `Real` is the line
/// `im(z) == trap_imag`, `Imag` the line `re(z) == trap_real`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrapLines {
    Real,
    Imag,
    #[default]
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KernelError {
    Formula(FormulaError),
    Gradient(GradientError),
    UnknownVariant(String),
    InvalidEscape(f64),
    InvalidGradientLength(usize),
    InvalidParamName(String),
    MissingParam(String),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Formula(e) => write!(f, "{e}"),
            Self::Gradient(e) => write!(f, "gradient: {e}"),
            Self::UnknownVariant(name) => write!(
                f,
                "unknown kernel '{name}' (expected escape-time, mean-distance or orbit-trap)"
            ),
            Self::InvalidEscape(v) => write!(f, "escape distance must be finite and > 1 (got {v})"),
            Self::InvalidGradientLength(n) => {
                write!(f, "gradient length must be in 1..={MAX_GRADIENT_LENGTH} (got {n})")
            }
            Self::InvalidParamName(name) => {
                write!(f, "kernel parameter '{name}' is not a valid identifier")
            }
            Self::MissingParam(name) => {
                write!(f, "kernel parameter '{name}' is missing from the parameter set")
            }
        }
    }
}

impl std::error::Error for KernelError {}

impl From<FormulaError> for KernelError {
    fn from(e: FormulaError) -> Self {
        Self::Formula(e)
    }
}

impl From<GradientError> for KernelError {
    fn from(e: GradientError) -> Self {
        Self::Gradient(e)
    }
}

/// Everything fixed at kernel build time.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSpec {
    /// Formula text, or the name of a built-in formula.
    pub formula: String,
    pub variant: KernelVariant,
    pub escape_distance: f64,
    /// Extra real parameters, bound positionally in this order.
    pub extra_params: Vec<String>,
    pub gradient: String,
    pub gradient_length: usize,
    pub axis: AxisOrder,
    pub trap_lines: TrapLines,
}

impl Default for KernelSpec {
    fn default() -> Self {
        Self {
            formula: "mandelbrot".to_string(),
            variant: KernelVariant::EscapeTime,
            escape_distance: 4242.0,
            extra_params: Vec::new(),
            gradient: "sunrise".to_string(),
            gradient_length: 512,
            axis: AxisOrder::Normal,
            trap_lines: TrapLines::Cross,
        }
    }
}

impl KernelSpec {
    /// Checks every extra parameter is declared in `params`.
    pub fn check_params(&self, params: &ParamSet) -> Result<(), KernelError> {
        match self.extra_params.iter().find(|name| !params.contains(name)) {
            Some(missing) => Err(KernelError::MissingParam(missing.clone())),
            None => Ok(()),
        }
    }
}

/// Per-frame scalar arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelArgs {
    pub julia: bool,
    pub max_iter: u32,
    pub pre_iter: u32,
    pub gradient_frequency: f64,
    pub c: Complex64,
    pub trap_real: f64,
    pub trap_imag: f64,
    pub trap_width: f64,
    pub extra: Vec<f64>,
}

impl KernelArgs {
    pub fn from_params(params: &ParamSet, extra_params: &[String], julia: bool) -> Self {
        Self {
            julia,
            max_iter: params["max_iter"].max(0.0) as u32,
            pre_iter: params.get("pre_iter").unwrap_or(0.0).max(0.0) as u32,
            gradient_frequency: params["grad_freq"],
            c: params.c(),
            trap_real: params.get("trap_real").unwrap_or(0.0),
            trap_imag: params.get("trap_imag").unwrap_or(0.0),
            trap_width: params.get("trap_width").unwrap_or(0.0),
            extra: extra_params.iter().map(|name| params[name.as_str()]).collect(),
        }
    }
}

/// A validated kernel: parsed formula, sampled gradient and Metal source.
#[derive(Debug, Clone)]
pub struct KernelProgram {
    spec: KernelSpec,
    formula: Formula,
    gradient: Vec<u32>,
    source: String,
}

impl KernelProgram {
    pub fn build(spec: &KernelSpec, gradient_dirs: &[PathBuf]) -> Result<Self, KernelError> {
        if !spec.escape_distance.is_finite() || spec.escape_distance <= 1.0 {
            return Err(KernelError::InvalidEscape(spec.escape_distance));
        }
        if spec.gradient_length == 0 || spec.gradient_length > MAX_GRADIENT_LENGTH {
            return Err(KernelError::InvalidGradientLength(spec.gradient_length));
        }
        if let Some(bad) = spec.extra_params.iter().find(|n| !is_identifier(n)) {
            return Err(KernelError::InvalidParamName(bad.clone()));
        }

        let formula = Formula::parse(&spec.formula, &spec.extra_params)?;
        let gradient = Gradient::resolve(&spec.gradient, gradient_dirs)?
            .to_array(spec.gradient_length);
        let source = msl::kernel_source(&msl::MslParams {
            formula: &formula,
            variant: spec.variant,
            escape_distance: spec.escape_distance,
            gradient: &gradient,
            axis: spec.axis,
            trap_lines: spec.trap_lines,
        });
        log::debug!(
            "{} kernel for formula {:?}:\n{}",
            spec.variant.name(),
            formula.source(),
            source
        );

        Ok(Self {
            spec: spec.clone(),
            formula,
            gradient,
            source,
        })
    }

    pub fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn gradient(&self) -> &[u32] {
        &self.gradient
    }

    /// Metal library source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Colors one pixel at plane coordinate `pos` on the CPU.
    pub fn shade(&self, pos: Complex64, args: &KernelArgs) -> u32 {
        let pos = match self.spec.axis {
            AxisOrder::Normal => pos,
            AxisOrder::Swapped => Complex64::new(pos.im, pos.re),
        };
        let (z, c) = if args.julia {
            (pos, args.c)
        } else {
            (Complex64::new(0.0, 0.0), pos)
        };
        let mut st = OrbitState::new(z, c, self.formula.locals().len());
        let escape = self.spec.escape_distance;
        let freq = args.gradient_frequency;

        match self.spec.variant {
            KernelVariant::EscapeTime => {
                for iter in 0..args.max_iter {
                    self.formula.step(&mut st, &args.extra);
                    let modulus = st.z.norm();
                    if modulus > escape {
                        return self.gradient_at(smooth(iter, modulus, escape, args.max_iter), freq);
                    }
                }
                OPAQUE_BLACK
            }
            KernelVariant::MeanDistance => {
                let mut sum = 0.0;
                let mut count = 0u32;
                for iter in 0..args.max_iter {
                    self.formula.step(&mut st, &args.extra);
                    let modulus = st.z.norm();
                    if iter >= args.pre_iter {
                        sum += modulus;
                        count += 1;
                    }
                    if modulus > escape {
                        break;
                    }
                }
                let mean = 1.0 - (0.5 * (sum / count.max(1) as f64).log2()).log2();
                self.gradient_at(mean, freq)
            }
            KernelVariant::OrbitTrap => {
                let mut trap = f64::INFINITY;
                let mut escaped = None;
                for iter in 0..args.max_iter {
                    self.formula.step(&mut st, &args.extra);
                    let modulus = st.z.norm();
                    if iter >= args.pre_iter {
                        let to_real = (st.z.im - args.trap_imag).abs();
                        let to_imag = (st.z.re - args.trap_real).abs();
                        trap = trap.min(match self.spec.trap_lines {
                            TrapLines::Real => to_real,
                            TrapLines::Imag => to_imag,
                            TrapLines::Cross => to_real.min(to_imag),
                        });
                    }
                    if modulus > escape {
                        escaped = Some(smooth(iter, modulus, escape, args.max_iter));
                        break;
                    }
                }
                if trap < args.trap_width {
                    self.gradient_at(trap / args.trap_width, freq)
                } else if let Some(mu) = escaped {
                    self.gradient_at(mu, freq)
                } else {
                    OPAQUE_BLACK
                }
            }
        }
    }

    /// Gradient entry for normalized value `t`; wraps negative indices and
    /// returns the background for non-finite input.
    pub fn gradient_at(&self, t: f64, freq: f64) -> u32 {
        let len = self.gradient.len();
        let idx = t * len as f64 * freq;
        if !idx.is_finite() || len == 0 {
            return OPAQUE_BLACK;
        }
        let idx = idx.clamp(-1.0e9, 1.0e9) as i64;
        self.gradient[idx.rem_euclid(len as i64) as usize]
    }
}

fn smooth(iter: u32, modulus: f64, escape: f64, max_iter: u32) -> f64 {
    let mu = iter as f64 - modulus.ln().ln() / LN_2 + escape.ln().ln() / LN_2;
    mu / max_iter as f64
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
