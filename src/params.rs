use num_complex::Complex64;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::ops::{Index, IndexMut};

/// How the live controller adjusts a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    /// Key presses add `step` (negated for the second key), clamped to `min..=max`.
    Int { step: f64, min: f64, max: f64 },
    /// Key presses multiply by `(res + 1) / res` or `(res - 1) / res`.
    Ratio { resolution: f64 },
    /// Tuned programmatically only.
    Fine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamMod {
    pub kind: ParamKind,
    pub keys: Option<(char, char)>,
    /// Adjusting this parameter re-centers the map view on the Julia seed.
    pub recenters_map: bool,
}

impl ParamMod {
    pub fn int(keys: (char, char), step: f64, min: f64, max: f64) -> Self {
        Self {
            kind: ParamKind::Int { step, min, max },
            keys: Some(keys),
            recenters_map: false,
        }
    }

    pub fn ratio(keys: (char, char), resolution: f64) -> Self {
        Self {
            kind: ParamKind::Ratio { resolution },
            keys: Some(keys),
            recenters_map: false,
        }
    }

    pub fn fine() -> Self {
        Self {
            kind: ParamKind::Fine,
            keys: None,
            recenters_map: false,
        }
    }

    /// Applies one key press in the given direction to `value`.
    pub fn nudge(&self, value: f64, forward: bool) -> f64 {
        match self.kind {
            ParamKind::Int { step, min, max } => {
                let delta = if forward { step } else { -step };
                (value + delta).clamp(min, max)
            }
            ParamKind::Ratio { resolution } => {
                let ratio = if forward {
                    (resolution + 1.0) / resolution
                } else {
                    (resolution - 1.0) / resolution
                };
                value * ratio
            }
            ParamKind::Fine => value,
        }
    }
}

const DEFAULT_VALUES: &[(&str, f64)] = &[
    ("center_real", 0.0),
    ("center_imag", 0.0),
    ("radius", 2.3),
    ("c_real", 0.0),
    ("c_imag", 0.0),
    ("r_step", 0.1),
    ("i_step", 0.1),
    ("max_iter", 256.0),
    ("grad_freq", 1.0),
    ("super_sampling", 1.0),
    ("map_center_real", 0.0),
    ("map_center_imag", 0.0),
    ("map_radius", 2.3),
    ("pre_iter", 0.0),
    ("trap_real", 0.0),
    ("trap_imag", 0.0),
    ("trap_width", 0.05),
];

const DEFAULT_FLAGS: &[(&str, bool)] = &[("julia", false), ("show_map", false)];

/// Named scalar parameters mutated by scenes and the live controller.
///
/// Reading a name that was never declared panics: every animation declares
/// its parameters up front and a typo is a programming error, not data.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    values: BTreeMap<String, f64>,
    flags: BTreeMap<String, bool>,
    mods: BTreeMap<String, ParamMod>,
    start_values: BTreeMap<String, f64>,
    start_flags: BTreeMap<String, bool>,
}

impl Default for ParamSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ParamSet {
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
            flags: BTreeMap::new(),
            mods: BTreeMap::new(),
            start_values: BTreeMap::new(),
            start_flags: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut set = Self::empty();
        for (name, value) in DEFAULT_VALUES {
            set.values.insert(name.to_string(), *value);
        }
        for (name, value) in DEFAULT_FLAGS {
            set.flags.insert(name.to_string(), *value);
        }
        set.mods.insert("r_step".into(), ParamMod::fine());
        set.mods.insert("i_step".into(), ParamMod::fine());
        set.mods
            .insert("max_iter".into(), ParamMod::int(('i', 'k'), 100.0, 1.0, 10000.0));
        set.mods.insert("radius".into(), ParamMod::ratio(('a', 'e'), 4.0));
        let mut map_radius = ParamMod::ratio(('w', 'x'), 4.0);
        map_radius.recenters_map = true;
        set.mods.insert("map_radius".into(), map_radius);
        set.mark_start();
        set
    }

    /// Declares or overwrites a parameter.
    pub fn set(&mut self, name: &str, value: f64) -> &mut Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_flag(mut self, name: &str, value: bool) -> Self {
        self.set_flag(name, value);
        self
    }

    pub fn with_mod(mut self, name: &str, m: ParamMod) -> Self {
        self.mods.insert(name.to_string(), m);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn toggle_flag(&mut self, name: &str) -> bool {
        let value = !self.flag(name);
        self.set_flag(name, value);
        value
    }

    pub fn mods(&self) -> impl Iterator<Item = (&str, &ParamMod)> {
        self.mods.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn c(&self) -> Complex64 {
        Complex64::new(self["c_real"], self["c_imag"])
    }

    pub fn set_c(&mut self, c: Complex64) {
        self["c_real"] = c.re;
        self["c_imag"] = c.im;
    }

    pub fn center(&self) -> Complex64 {
        Complex64::new(self["center_real"], self["center_imag"])
    }

    pub fn set_center(&mut self, center: Complex64) {
        self["center_real"] = center.re;
        self["center_imag"] = center.im;
    }

    pub fn map_center(&self) -> Complex64 {
        Complex64::new(self["map_center_real"], self["map_center_imag"])
    }

    /// Records the current values as the baseline for [`ParamSet::modified`]
    /// and [`ParamSet::reset_view`].
    pub fn mark_start(&mut self) {
        self.start_values = self.values.clone();
        self.start_flags = self.flags.clone();
    }

    pub fn reset_view(&mut self) {
        for name in ["center_real", "center_imag", "radius"] {
            if let Some(v) = self.start_values.get(name).copied() {
                self.values.insert(name.to_string(), v);
            }
        }
    }

    /// Parameters whose value differs from the baseline, sorted by name.
    pub fn modified(&self) -> Vec<(String, String)> {
        let values = self
            .values
            .iter()
            .filter(|(k, v)| self.start_values.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), format!("{v}")));
        let flags = self
            .flags
            .iter()
            .filter(|(k, v)| self.start_flags.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), format!("{v}")));
        let mut out: Vec<_> = values.chain(flags).collect();
        out.sort();
        out
    }

    pub fn modified_report(&self) -> String {
        let mut s = String::from("{");
        for (idx, (k, v)) in self.modified().iter().enumerate() {
            if idx > 0 {
                s.push_str(", ");
            }
            let _ = write!(s, "\"{k}\": {v}");
        }
        s.push('}');
        s
    }
}

impl Index<&str> for ParamSet {
    type Output = f64;

    fn index(&self, name: &str) -> &f64 {
        match self.values.get(name) {
            Some(v) => v,
            None => panic!("undeclared parameter '{name}'"),
        }
    }
}

impl IndexMut<&str> for ParamSet {
    fn index_mut(&mut self, name: &str) -> &mut f64 {
        match self.values.get_mut(name) {
            Some(v) => v,
            None => panic!("undeclared parameter '{name}'"),
        }
    }
}
