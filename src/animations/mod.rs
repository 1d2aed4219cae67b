mod acidula_beat;
mod julia_explorer;
mod siouze;
mod trap_bloom;

use crate::animation::Show;
use anyhow::{bail, Context};

/// Built-in animations: `(name, description)`.
pub const ANIMATIONS: &[(&str, &str)] = &[
    ("julia-explorer", "Julia seed walk around the main cardioid, kick-driven zoom"),
    ("siouze", "Mean-distance log fractal driven by three spectral bands"),
    ("acidula-beat", "Mean-distance fractal driven by MIDI drum and bass tracks"),
    ("trap-bloom", "Orbit-trap bloom following a seeded random walk"),
];

pub fn make_animation(name: &str) -> anyhow::Result<Box<dyn Show>> {
    let show: Box<dyn Show> = match name {
        "julia-explorer" => Box::new(julia_explorer::build()?),
        "siouze" => Box::new(siouze::build()?),
        "acidula-beat" => Box::new(acidula_beat::build()?),
        "trap-bloom" => Box::new(trap_bloom::build(0x5eed)?),
        other => {
            let names: Vec<&str> = ANIMATIONS.iter().map(|(n, _)| *n).collect();
            bail!("unknown animation '{other}' (available: {})", names.join(", "));
        }
    };
    Ok(show)
}

/// Like [`make_animation`] with a custom seed for the randomized ones.
pub fn make_seeded(name: &str, seed: u64) -> anyhow::Result<Box<dyn Show>> {
    match name {
        "trap-bloom" => Ok(Box::new(
            trap_bloom::build(seed).context("build trap-bloom")?,
        )),
        other => make_animation(other),
    }
}
