use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Packed `0xAARRGGBB` opaque black.
pub const OPAQUE_BLACK: u32 = 0xff00_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradientError {
    Io { path: String, message: String },
    Parse { line: usize, message: String },
    UnknownFormat(String),
    UnknownGradient { name: String, available: Vec<String> },
    Empty(String),
}

impl fmt::Display for GradientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "I/O error reading {path}: {message}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
            Self::UnknownFormat(name) => {
                write!(f, "{name}: only GIMP (.ggr) and Ultra Fractal (.ugr) gradients are supported")
            }
            Self::UnknownGradient { name, available } => {
                write!(f, "unknown gradient '{name}' (available: {})", available.join(", "))
            }
            Self::Empty(name) => write!(f, "gradient '{name}' has no colors"),
        }
    }
}

impl std::error::Error for GradientError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendShape {
    Linear,
    Curved,
    Sine,
    SphereIncreasing,
    SphereDecreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendSpace {
    Rgb,
    HsvCounterClockwise,
    HsvClockwise,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub left: f64,
    pub middle: f64,
    pub right: f64,
    pub left_rgb: [f64; 3],
    pub right_rgb: [f64; 3],
    pub shape: BlendShape,
    pub space: BlendSpace,
}

/// Piecewise segment ramp read from a GIMP `.ggr` file.
#[derive(Debug, Clone, PartialEq)]
pub struct GimpGradient {
    pub name: String,
    pub segments: Vec<Segment>,
}

impl GimpGradient {
    pub fn parse(text: &str) -> Result<Self, GradientError> {
        let mut lines = text.lines().enumerate();
        let header = next_line(&mut lines, "missing header")?;
        if header.1.trim() != "GIMP Gradient" {
            return Err(GradientError::Parse {
                line: header.0,
                message: "not a GIMP gradient file".to_string(),
            });
        }
        let (name_line, raw_name) = next_line(&mut lines, "missing name")?;
        let name = raw_name
            .trim()
            .strip_prefix("Name:")
            .map(|n| n.trim().to_string())
            .ok_or(GradientError::Parse {
                line: name_line,
                message: "expected 'Name: <name>'".to_string(),
            })?;
        let (count_line, raw_count) = next_line(&mut lines, "missing segment count")?;
        let count = raw_count.trim().parse::<usize>().map_err(|_| GradientError::Parse {
            line: count_line,
            message: format!("invalid segment count '{}'", raw_count.trim()),
        })?;

        let mut segments = Vec::with_capacity(count);
        for _ in 0..count {
            let (line_no, raw) = next_line(&mut lines, "truncated segment list")?;
            segments.push(parse_segment(raw, line_no)?);
        }
        if segments.is_empty() {
            return Err(GradientError::Empty(name));
        }
        Ok(Self { name, segments })
    }

    pub fn color(&self, x: f64) -> u32 {
        let Some(seg) = self
            .segments
            .iter()
            .find(|s| s.left <= x && x <= s.right)
        else {
            return OPAQUE_BLACK;
        };

        let width = seg.right - seg.left;
        let (mid, pos) = if width > 0.0 {
            ((seg.middle - seg.left) / width, (x - seg.left) / width)
        } else {
            (0.5, 0.0)
        };
        let mid = mid.clamp(1e-9, 1.0 - 1e-9);

        let mut f = if pos <= mid {
            pos / mid / 2.0
        } else {
            (pos - mid) / (1.0 - mid) / 2.0 + 0.5
        };
        match seg.shape {
            BlendShape::Linear => {}
            BlendShape::Curved => f = pos.powf(0.5f64.ln() / mid.ln()),
            BlendShape::Sine => f = ((-std::f64::consts::FRAC_PI_2 + std::f64::consts::PI * f).sin() + 1.0) / 2.0,
            BlendShape::SphereIncreasing => {
                let g = f - 1.0;
                f = (1.0 - g * g).max(0.0).sqrt();
            }
            BlendShape::SphereDecreasing => f = 1.0 - (1.0 - f * f).max(0.0).sqrt(),
        }

        let [rl, gl, bl] = seg.left_rgb;
        let [rr, gr, br] = seg.right_rgb;
        match seg.space {
            BlendSpace::Rgb => pack_rgb(rl + (rr - rl) * f, gl + (gr - gl) * f, bl + (br - bl) * f),
            BlendSpace::HsvCounterClockwise | BlendSpace::HsvClockwise => {
                let (hl, sl, vl) = rgb_to_hsv(rl, gl, bl);
                let (mut hr, sr, vr) = rgb_to_hsv(rr, gr, br);
                if seg.space == BlendSpace::HsvCounterClockwise && hr < hl {
                    hr += 1.0;
                } else if seg.space == BlendSpace::HsvClockwise && hr > hl {
                    hr -= 1.0;
                }
                let (r, g, b) = hsv_to_rgb(
                    (hl + (hr - hl) * f).rem_euclid(1.0),
                    sl + (sr - sl) * f,
                    vl + (vr - vl) * f,
                );
                pack_rgb(r, g, b)
            }
        }
    }
}

fn next_line<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    message: &str,
) -> Result<(usize, &'a str), GradientError> {
    lines
        .find(|(_, l)| !l.trim().is_empty())
        .map(|(idx, l)| (idx + 1, l))
        .ok_or(GradientError::Parse {
            line: 0,
            message: message.to_string(),
        })
}

fn parse_segment(raw: &str, line: usize) -> Result<Segment, GradientError> {
    let fields = raw
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| GradientError::Parse {
            line,
            message: "segment fields must be numbers".to_string(),
        })?;
    if fields.len() < 11 {
        return Err(GradientError::Parse {
            line,
            message: format!("segment expects at least 11 fields, got {}", fields.len()),
        });
    }
    let shape = match fields.get(11).copied().unwrap_or(0.0) as i64 {
        0 => BlendShape::Linear,
        1 => BlendShape::Curved,
        2 => BlendShape::Sine,
        3 => BlendShape::SphereIncreasing,
        4 => BlendShape::SphereDecreasing,
        other => {
            return Err(GradientError::Parse {
                line,
                message: format!("unknown blend function {other}"),
            });
        }
    };
    let space = match fields.get(12).copied().unwrap_or(0.0) as i64 {
        0 => BlendSpace::Rgb,
        1 => BlendSpace::HsvCounterClockwise,
        2 => BlendSpace::HsvClockwise,
        other => {
            return Err(GradientError::Parse {
                line,
                message: format!("unknown color space {other}"),
            });
        }
    };
    Ok(Segment {
        left: fields[0],
        middle: fields[1],
        right: fields[2],
        left_rgb: [fields[3], fields[4], fields[5]],
        right_rgb: [fields[7], fields[8], fields[9]],
        shape,
        space,
    })
}

/// Named color-stop lists read from an Ultra Fractal `.ugr` file.
#[derive(Debug, Clone, PartialEq)]
pub struct StopGradient {
    pub gradients: BTreeMap<String, Vec<u32>>,
    pub selected: String,
}

impl StopGradient {
    /// Parses every block of the file and selects `name`, or the first block
    /// when no name is given.
    pub fn parse(text: &str, name: Option<&str>) -> Result<Self, GradientError> {
        let mut gradients = BTreeMap::new();
        let mut first = None;
        let mut current: Option<(String, Vec<u32>)> = None;

        for (line_idx, line) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            if let Some(rest) = line.split_once("title=").map(|(_, r)| r) {
                let title = rest.split('"').nth(1).ok_or(GradientError::Parse {
                    line: line_no,
                    message: "title must be quoted".to_string(),
                })?;
                if first.is_none() {
                    first = Some(title.to_string());
                }
                current = Some((title.to_string(), Vec::new()));
            }
            if line.contains("color=") {
                let raw = line.rsplit('=').next().unwrap_or("").trim();
                let value = raw.parse::<u32>().map_err(|_| GradientError::Parse {
                    line: line_no,
                    message: format!("invalid color value '{raw}'"),
                })?;
                let Some((_, colors)) = current.as_mut() else {
                    return Err(GradientError::Parse {
                        line: line_no,
                        message: "color outside of a gradient block".to_string(),
                    });
                };
                colors.push(OPAQUE_BLACK | (value & 0x00ff_ffff));
            }
            if line.contains('}') {
                if let Some((title, colors)) = current.take() {
                    gradients.insert(title, colors);
                }
            }
        }

        let selected = match name {
            Some(n) => n.to_string(),
            None => first.ok_or_else(|| GradientError::Empty("<ugr>".to_string()))?,
        };
        match gradients.get(&selected) {
            None => Err(GradientError::UnknownGradient {
                name: selected,
                available: gradients.keys().cloned().collect(),
            }),
            Some(colors) if colors.is_empty() => Err(GradientError::Empty(selected)),
            Some(_) => Ok(Self { gradients, selected }),
        }
    }

    pub fn color_of(&self, name: &str, x: f64) -> u32 {
        let Some(colors) = self.gradients.get(name).filter(|c| !c.is_empty()) else {
            return OPAQUE_BLACK;
        };
        let pos = (colors.len() as f64 * x.clamp(0.0, 1.0)) as usize;
        colors[pos.min(colors.len() - 1)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Gradient {
    Segments(GimpGradient),
    Stops(StopGradient),
}

impl Gradient {
    /// Resolves `ident` (`name`, `file.ggr`, `file.ugr` or `file.ugr:block`)
    /// against the built-in ramps, then the path itself, then each search dir.
    pub fn resolve(ident: &str, search_dirs: &[PathBuf]) -> Result<Self, GradientError> {
        let (file, block) = match ident.rsplit_once(':') {
            Some((f, b)) if f.ends_with(".ugr") => (f, Some(b)),
            _ => (ident, None),
        };

        if let Some((_, text)) = BUILTIN_GRADIENTS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(file))
        {
            return GimpGradient::parse(text).map(Self::Segments);
        }

        let path = std::iter::once(PathBuf::from(file))
            .chain(search_dirs.iter().map(|d| d.join(file)))
            .find(|p| p.is_file());
        let Some(path) = path else {
            let mut available: Vec<String> =
                BUILTIN_GRADIENTS.iter().map(|(n, _)| n.to_string()).collect();
            available.push("<path>.ggr".to_string());
            available.push("<path>.ugr[:name]".to_string());
            return Err(GradientError::UnknownGradient {
                name: ident.to_string(),
                available,
            });
        };
        Self::load(&path, block)
    }

    pub fn load(path: &Path, block: Option<&str>) -> Result<Self, GradientError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let read = || {
            std::fs::read_to_string(path).map_err(|e| GradientError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        };
        match ext.as_deref() {
            Some("ggr") => GimpGradient::parse(&read()?).map(Self::Segments),
            Some("ugr") => StopGradient::parse(&read()?, block).map(Self::Stops),
            _ => Err(GradientError::UnknownFormat(path.display().to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Segments(g) => &g.name,
            Self::Stops(g) => &g.selected,
        }
    }

    /// Color for `x` in `[0, 1)`.
    pub fn color(&self, x: f64) -> u32 {
        match self {
            Self::Segments(g) => g.color(x),
            Self::Stops(g) => g.color_of(&g.selected, x),
        }
    }

    pub fn to_array(&self, length: usize) -> Vec<u32> {
        (0..length)
            .map(|idx| self.color(idx as f64 / length as f64))
            .collect()
    }
}

pub fn pack_rgb(r: f64, g: f64, b: f64) -> u32 {
    let ch = |v: f64| ((v.clamp(0.0, 1.0) * 255.0) as u32) & 0xff;
    OPAQUE_BLACK | ch(r) << 16 | ch(g) << 8 | ch(b)
}

pub fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let maxc = r.max(g).max(b);
    let minc = r.min(g).min(b);
    if maxc == minc {
        return (0.0, 0.0, maxc);
    }
    let span = maxc - minc;
    let s = span / maxc;
    let rc = (maxc - r) / span;
    let gc = (maxc - g) / span;
    let bc = (maxc - b) / span;
    let h = if r == maxc {
        bc - gc
    } else if g == maxc {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    ((h / 6.0).rem_euclid(1.0), s, maxc)
}

pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (v, v, v);
    }
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (i as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

const BUILTIN_GRADIENTS: &[(&str, &str)] = &[
    (
        "purples",
        "GIMP Gradient
Name: Purples
7
0.00000 0.05759 0.09849 0.30303 0.10963 0.27308 1 0.51441 0.27924 0.73484 1 0 0
0.09849 0.17696 0.22871 0.51441 0.27924 0.73484 1 0.60460 0.33150 0.65000 1 0 0
0.22871 0.34724 0.40400 0.60460 0.33150 0.65000 1 0.20050 0.16988 0.39393 1 0 0
0.40400 0.48080 0.54424 0.20050 0.16988 0.39393 1 0.50053 0.32330 0.53000 1 0 0
0.54424 0.62876 0.71328 0.50053 0.32330 0.53000 1 0.60064 0.44574 0.68166 1 0 0
0.71328 0.76649 0.81969 0.60064 0.44574 0.68166 1 0.70075 0.56818 0.83333 1 0 0
0.81969 0.92821 1.00000 0.70075 0.56818 0.83333 1 0.18474 0.14979 0.21969 1 0 0
",
    ),
    (
        "sunrise",
        "GIMP Gradient
Name: Sunrise
6
0.000000 0.101798 0.203595 1.000000 1.000000 1.000000 1.000000 0.948165 0.969697 0.812122 1 0 0
0.203595 0.379143 0.487479 0.948165 0.969697 0.812122 1.000000 1.000000 0.552632 0.270000 1 0 0
0.487479 0.503577 0.529137 1.000000 0.552632 0.270000 1.000000 0.581721 0.096155 0.170043 1 0 0
0.529137 0.545165 0.562604 0.581721 0.096155 0.170043 1.000000 0.287879 0.155229 0.049835 1 0 0
0.562604 0.609349 0.697830 0.287879 0.155229 0.049835 1.000000 0.336000 0.425966 0.800000 1 0 0
0.697830 0.845064 1.000000 0.336000 0.425966 0.800000 1.000000 0.852165 0.985930 1.000000 1 0 0
",
    ),
    (
        "incandescent",
        "GIMP Gradient
Name: Incandescent
4
0.000000 0.459098 0.594324 0.000000 0.000000 0.000000 1.000000 0.729412 0.000000 0.000000 1 0 0
0.594324 0.677796 0.809683 0.729412 0.000000 0.000000 1.000000 1.000000 0.545098 0.196078 1 0 0
0.809683 0.853088 0.899833 1.000000 0.545098 0.196078 1.000000 0.972549 0.937255 0.074510 1 0 0
0.899833 0.948247 1.000000 0.972549 0.937255 0.074510 1.000000 0.976471 0.968627 0.831373 1 0 0
",
    ),
];
