use crate::animation::Animation;
use crate::interp::Curve;
use crate::kernel::KernelSpec;
use crate::modulator::{AudioMode, AudioMod};
use crate::params::ParamSet;
use crate::scene::{SceneCtx, SceneEntry, TimelineError};
use num_complex::Complex64;

#[derive(Default)]
pub struct State {
    seeds: Vec<Complex64>,
    radius: Curve,
    iter: Curve,
}

pub fn build() -> Result<Animation<State>, TimelineError> {
    let params = ParamSet::with_defaults()
        .with("c_real", -0.8)
        .with("c_imag", 0.156)
        .with("radius", 1.6)
        .with("max_iter", 200.0)
        .with("grad_freq", 2.0)
        .with("map_radius", 1.8)
        .with("map_center_real", -0.5)
        .with_flag("julia", true);
    let kernel = KernelSpec {
        formula: "mandelbrot".to_string(),
        gradient: "sunrise".to_string(),
        escape_distance: 4.0,
        ..KernelSpec::default()
    };
    let scenes = vec![
        SceneEntry::end(1500),
        SceneEntry::scene(1000, "zoom", zoom),
        SceneEntry::scene(400, "walk", walk),
        SceneEntry::scene(0, "intro", intro),
    ];
    Ok(Animation::new("julia-explorer", params, kernel, scenes, State::default())?
        .audio_mod("kick", AudioMod::new(0..12, AudioMode::Max).decay(10.0))
        .audio_mod("air", AudioMod::new(120..400, AudioMode::Mean).decay(30.0)))
}

fn intro(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.radius = ctx.logspace(ctx.params["radius"], 1.2);
    }
    let air = ctx.signal("air");
    ctx.params["radius"] = st.radius.at(ctx.pos);
    ctx.params["grad_freq"] += 2e-3 * air;
}

fn walk(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        // Quarter turn just inside the main cardioid boundary.
        st.seeds = (0..ctx.length)
            .map(|i| {
                let t = std::f64::consts::PI * (0.6 + 0.5 * i as f64 / ctx.length.max(1) as f64);
                let w = Complex64::from_polar(0.49, t);
                w - w * w
            })
            .collect();
        st.seeds[0] = ctx.params.c();
    }
    let kick = ctx.signal("kick");
    if let Some(seed) = st.seeds.get(ctx.pos) {
        ctx.params.set_c(*seed + Complex64::new(0.0, 2e-3 * kick));
    }
    ctx.params["radius"] = 1.2 * (1.0 - 0.1 * kick);
}

fn zoom(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.radius = ctx.logspace(ctx.params["radius"], 0.02);
        st.iter = ctx.linspace(ctx.params["max_iter"], 600.0);
    }
    let kick = ctx.signal("kick");
    ctx.params["radius"] = st.radius.at(ctx.pos);
    ctx.params["max_iter"] = st.iter.at(ctx.pos).round();
    ctx.params["grad_freq"] -= 1e-3 * kick;
}
