use crate::animation::Animation;
use crate::interp::Curve;
use crate::kernel::{KernelSpec, KernelVariant, TrapLines};
use crate::modulator::{AudioMode, AudioMod, MidiMod, MidiMode};
use crate::params::ParamSet;
use crate::scene::{SceneCtx, SceneEntry, TimelineError};
use num_complex::Complex64;

const WAYPOINTS: usize = 6;

pub struct State {
    rng: fastrand::Rng,
    path: Vec<Complex64>,
    width: Curve,
    radius: Curve,
}

pub fn build(seed: u64) -> Result<Animation<State>, TimelineError> {
    let params = ParamSet::with_defaults()
        .with("c_real", -0.4)
        .with("c_imag", 0.6)
        .with("radius", 1.8)
        .with("max_iter", 160.0)
        .with("trap_width", 0.02)
        .with("grad_freq", 1.5)
        .with_flag("julia", true);
    let kernel = KernelSpec {
        formula: "mandelbrot".to_string(),
        variant: KernelVariant::OrbitTrap,
        escape_distance: 16.0,
        gradient: "incandescent".to_string(),
        trap_lines: TrapLines::Cross,
        ..KernelSpec::default()
    };
    let scenes = vec![
        SceneEntry::end(1200),
        SceneEntry::scene(900, "fade", fade),
        SceneEntry::scene(300, "wander", wander),
        SceneEntry::scene(0, "bloom", bloom),
    ];
    let state = State {
        rng: fastrand::Rng::with_seed(seed),
        path: Vec::new(),
        width: Curve::default(),
        radius: Curve::default(),
    };
    Ok(Animation::new("trap-bloom", params, kernel, scenes, state)?
        .audio_mod("low", AudioMod::new(0..10, AudioMode::Max).decay(8.0))
        .audio_mod("high", AudioMod::new(200..600, AudioMode::High).threshold(0.2))
        .midi_mod("hit", MidiMod::new(&["drums", "kick"], MidiMode::Events(vec![36, 38]))))
}

fn bloom(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.width = ctx.logspace(ctx.params["trap_width"], 0.15);
    }
    let low = ctx.signal("low");
    ctx.params["trap_width"] = st.width.at(ctx.pos) * (1.0 + 0.5 * low);
}

/// Seed wanders through random waypoints inside the main cardioid.
fn wander(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        let mut points = vec![ctx.params.c()];
        for _ in 0..WAYPOINTS {
            let w = Complex64::from_polar(0.45 * st.rng.f64().sqrt(), st.rng.f64() * std::f64::consts::TAU);
            points.push(w - w * w);
        }
        let per_leg = ctx.length.div_ceil(WAYPOINTS);
        st.path = points
            .windows(2)
            .flat_map(|leg| crate::interp::complex_linspace(leg[0], leg[1], per_leg))
            .collect();
    }
    let (high, hit) = (ctx.signal("high"), ctx.signal("hit"));
    if let Some(c) = st.path.get(ctx.pos) {
        ctx.params.set_c(*c);
    }
    ctx.params["trap_real"] = 0.3 * high;
    ctx.params["trap_imag"] -= 2e-3 * hit;
    ctx.params["grad_freq"] += 1e-3 * hit;
}

fn fade(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.width = ctx.logspace_offset(ctx.params["trap_width"], 0.0, 0.01);
        st.radius = ctx.logspace(ctx.params["radius"], 4.0);
    }
    ctx.params["trap_width"] = st.width.at(ctx.pos);
    ctx.params["radius"] = st.radius.at(ctx.pos);
}
