use crate::animation::Animation;
use crate::interp::Curve;
use crate::kernel::{AxisOrder, KernelSpec, KernelVariant};
use crate::modulator::{AudioMode, AudioMod};
use crate::params::{ParamMod, ParamSet};
use crate::scene::{SceneCtx, SceneEntry, TimelineError};

const FORMULA: &str = "
z.im = fabs(z.im)
z = pow(z, mod)
z = z + c
z = pow(z, mod)
z = log(z)
";

#[derive(Default)]
pub struct State {
    radius: Curve,
    center: Curve,
}

pub fn build() -> Result<Animation<State>, TimelineError> {
    let params = ParamSet::with_defaults()
        .with("mod", 1.0)
        .with_mod("mod", ParamMod::ratio(('u', 'j'), 1000.0))
        .with("c_real", 0.5128172976017)
        .with("c_imag", -0.2046)
        .with("center_imag", 1.109)
        .with("grad_freq", 0.55)
        .with("max_iter", 56.0)
        .with("radius", 15.0)
        .with_flag("julia", true);
    let kernel = KernelSpec {
        formula: FORMULA.to_string(),
        variant: KernelVariant::MeanDistance,
        extra_params: vec!["mod".to_string()],
        gradient: "purples".to_string(),
        axis: AxisOrder::Swapped,
        ..KernelSpec::default()
    };
    let scenes = vec![
        SceneEntry::end(4700),
        SceneEntry::scene(4200, "ending", ending),
        SceneEntry::scene(3120, "verse3", verse3),
        SceneEntry::scene(2100, "verse2", verse2),
        SceneEntry::scene(1480, "verse1", verse1),
        SceneEntry::scene(0, "intro", intro),
    ];
    Ok(Animation::new("siouze", params, kernel, scenes, State::default())?
        .audio_mod("low", AudioMod::new(0..12, AudioMode::Max).decay(10.0))
        .audio_mod("mid", AudioMod::new(98..478, AudioMode::Max).decay(5.0))
        .audio_mod("hgh", AudioMod::new(12..456, AudioMode::Mean)))
}

fn ending(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.radius = ctx.logspace(ctx.params["radius"], 6.0);
        st.center = ctx.linspace(ctx.params["center_imag"], 1.43);
    }
    let (low, mid) = (ctx.signal("low"), ctx.signal("mid"));
    let p = &mut *ctx.params;
    p["center_imag"] = st.center.at(ctx.pos);
    p["radius"] = st.radius.at(ctx.pos);
    p["c_real"] -= 3e-4 * low + 4e-4 * mid;
}

fn verse3(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.radius = ctx.logspace(ctx.params["radius"], 8.42);
    }
    let (low, mid, hgh) = (ctx.signal("low"), ctx.signal("mid"), ctx.signal("hgh"));
    let p = &mut *ctx.params;
    p["radius"] = st.radius.at(ctx.pos);
    p["mod"] -= p["mod"] / 5200.0 * low;
    p["c_real"] -= 1e-4 * mid;
    p["grad_freq"] -= 4.5e-4 * hgh;
}

fn verse2(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.center = ctx.logspace(ctx.params["center_imag"], 0.43);
        st.radius = ctx.logspace(ctx.params["radius"], 13.0);
    }
    let (low, mid, hgh) = (ctx.signal("low"), ctx.signal("mid"), ctx.signal("hgh"));
    let p = &mut *ctx.params;
    p["center_imag"] = st.center.at(ctx.pos);
    p["radius"] = st.radius.at(ctx.pos);
    p["mod"] += 1e-4 * low;
    p["c_real"] += 0.8e-4 * mid;
    p["c_imag"] += 0.7e-4 * low;
    p["grad_freq"] += 6e-4 * hgh;
}

fn verse1(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.center = ctx.logspace(ctx.params["center_imag"], 3.775666666666666);
    }
    let (low, mid, hgh) = (ctx.signal("low"), ctx.signal("mid"), ctx.signal("hgh"));
    let p = &mut *ctx.params;
    p["center_imag"] = st.center.at(ctx.pos);
    p["mod"] += 1e-4 * low;
    p["c_imag"] -= 1e-3 * mid;
    p["grad_freq"] -= p["grad_freq"] / 40.0 * hgh;
}

fn intro(_: &mut State, ctx: &mut SceneCtx<'_>) {
    let (low, mid, hgh) = (ctx.signal("low"), ctx.signal("mid"), ctx.signal("hgh"));
    let p = &mut *ctx.params;
    p["c_real"] += 2e-4 * low;
    p["c_imag"] += 2e-4 * mid;
    p["grad_freq"] += 1e-4 * hgh;
}
