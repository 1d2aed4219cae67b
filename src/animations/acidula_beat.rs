use crate::animation::Animation;
use crate::kernel::{AxisOrder, KernelSpec, KernelVariant};
use crate::modulator::{MidiMod, MidiMode};
use crate::params::ParamSet;
use crate::scene::{SceneCtx, SceneEntry, TimelineError};

const FORMULA: &str = "z.im = fabs(z.im); z = pow(z, mod); z = z + c; z = log(z)";

#[derive(Default)]
pub struct State {
    speed: f64,
}

pub fn build() -> Result<Animation<State>, TimelineError> {
    let params = ParamSet::with_defaults()
        .with("mod", 1.0)
        .with("c_imag", -2.8454190476190493)
        .with("c_real", -0.3964285714285715)
        .with("grad_freq", 3.0)
        .with("i_step", 0.0002)
        .with("r_step", 0.0002)
        .with("map_center_imag", -2.4576190476190476)
        .with("map_center_real", -0.3964285714285715)
        .with("max_iter", 128.0)
        .with("radius", 2486.3401631812214)
        .with_flag("julia", true);
    let kernel = KernelSpec {
        formula: FORMULA.to_string(),
        variant: KernelVariant::MeanDistance,
        extra_params: vec!["mod".to_string()],
        gradient: "incandescent".to_string(),
        axis: AxisOrder::Swapped,
        ..KernelSpec::default()
    };
    let scenes = vec![
        SceneEntry::end(3600),
        SceneEntry::scene(3376, "zoom-out", zoom_out),
        SceneEntry::scene(2937, "end", end),
        SceneEntry::scene(2688, "transition", transition),
        SceneEntry::scene(1874, "verse3", verse3),
        SceneEntry::scene(1375, "verse2", verse2),
        SceneEntry::scene(375, "verse1", verse1),
        SceneEntry::scene(0, "intro", intro),
    ];
    Ok(Animation::new("acidula-beat", params, kernel, scenes, State::default())?
        .midi_offset(123)
        .midi_mod("snare", MidiMod::new(&["snare"], MidiMode::Pitch).decay(13.0))
        .midi_mod("kick", MidiMod::new(&["kick"], MidiMode::Pitch).decay(15.0))
        .midi_mod("bass", MidiMod::new(&["andy 67"], MidiMode::Pitch).decay(1.0))
        .midi_mod("flute", MidiMod::new(&["madflute"], MidiMode::Pitch).decay(3.0))
        .midi_mod("rhode", MidiMod::new(&["MIDI 08"], MidiMode::Pitch).hits_only()))
}

fn zoom_out(st: &mut State, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        st.speed = 1.4;
    }
    st.speed /= 1.01;
    let bass = ctx.signal("bass") * 0.95;
    let radius = ctx.params["radius"];
    ctx.params["radius"] += radius / 20.0 * st.speed + radius / 5.0 * bass;
}

fn end(_: &mut State, ctx: &mut SceneCtx<'_>) {
    let (kick, snare, bass, rhode) = (
        ctx.signal("kick"),
        ctx.signal("snare"),
        ctx.signal("bass"),
        ctx.signal("rhode"),
    );
    let p = &mut *ctx.params;
    p["c_imag"] += 7e-4 * kick;
    p["c_real"] -= 5e-4 * snare;
    p["grad_freq"] += 1e-3 * bass;
    p["max_iter"] += 4.0 * rhode;
}

fn transition(_: &mut State, ctx: &mut SceneCtx<'_>) {
    let (flute, bass) = (ctx.signal("flute"), ctx.signal("bass"));
    let p = &mut *ctx.params;
    p["radius"] -= p["radius"] / 11.0 * flute;
    p["grad_freq"] -= 2e-3 * bass;
}

fn verse3(_: &mut State, ctx: &mut SceneCtx<'_>) {
    let (kick, bass, flute) = (ctx.signal("kick"), ctx.signal("bass"), ctx.signal("flute"));
    let p = &mut *ctx.params;
    p["c_imag"] += 4e-5 * kick;
    p["grad_freq"] -= 3e-3 * bass;
    p["radius"] -= p["radius"] / 30.0 * flute;
}

fn verse2(_: &mut State, ctx: &mut SceneCtx<'_>) {
    let (kick, snare) = (ctx.signal("kick"), ctx.signal("snare"));
    let (bass, flute) = (ctx.signal("bass"), ctx.signal("flute"));
    let p = &mut *ctx.params;
    p["c_imag"] += 0.6e-4 * kick;
    p["c_real"] -= 1e-4 * snare;
    p["grad_freq"] += 2e-3 * bass;
    p["radius"] += p["radius"] / 15.0 * flute;
}

fn verse1(_: &mut State, ctx: &mut SceneCtx<'_>) {
    let (kick, snare, bass) = (ctx.signal("kick"), ctx.signal("snare"), ctx.signal("bass"));
    let p = &mut *ctx.params;
    p["c_imag"] += 4e-5 * kick;
    p["c_real"] -= 5e-5 * snare;
    p["grad_freq"] += 2e-3 * bass;
}

fn intro(_: &mut State, ctx: &mut SceneCtx<'_>) {
    let bass = ctx.signal("bass");
    ctx.params["grad_freq"] += 4e-3 * bass;
}
