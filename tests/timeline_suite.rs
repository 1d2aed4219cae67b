use fractal_vj::animation::{Animation, FrameStatus, Show};
use fractal_vj::animations::{make_animation, make_seeded, ANIMATIONS};
use fractal_vj::interp::Curve;
use fractal_vj::kernel::KernelSpec;
use fractal_vj::modulator::{AudioMod, AudioMode};
use fractal_vj::params::ParamSet;
use fractal_vj::scene::{Resolved, SceneCtx, SceneEntry, Timeline, TimelineError};
use std::f32::consts::PI;

#[derive(Default)]
struct Log {
    calls: Vec<(u64, usize, usize, bool)>,
    zoom: Curve,
}

fn record(log: &mut Log, ctx: &mut SceneCtx<'_>) {
    log.calls.push((ctx.frame, ctx.pos, ctx.length, ctx.init));
}

fn zoom(log: &mut Log, ctx: &mut SceneCtx<'_>) {
    if ctx.init {
        log.zoom = ctx.logspace(2.0, 0.02);
    }
    ctx.params["radius"] = log.zoom.at(ctx.pos);
    record(log, ctx);
}

fn follow_kick(log: &mut Log, ctx: &mut SceneCtx<'_>) {
    let kick = ctx.signal("kick");
    ctx.params["grad_freq"] = 1.0 + kick;
    record(log, ctx);
}

fn noop(_: &mut (), _: &mut SceneCtx<'_>) {}

fn single_scene() -> Animation<Log> {
    Animation::new(
        "single",
        ParamSet::with_defaults(),
        KernelSpec::default(),
        vec![SceneEntry::end(200), SceneEntry::scene(0, "only", record)],
        Log::default(),
    )
    .expect("valid timeline")
}

// ── Timeline ────────────────────────────────────────────────────────────────

#[test]
fn single_scene_runs_until_end_marker() {
    let mut anim = single_scene();
    assert_eq!(anim.end_frame(), 200);
    for frame in 0..200 {
        assert_eq!(
            anim.update(frame, None).expect("update"),
            FrameStatus::Played { scene: "only", pos: frame }
        );
    }
    assert_eq!(anim.update(200, None).expect("update"), FrameStatus::Finished);

    let calls = &anim.state().calls;
    assert_eq!(calls.len(), 200);
    assert!(calls.iter().all(|(_, _, length, _)| *length == 200));
    let inits: Vec<u64> = calls.iter().filter(|c| c.3).map(|c| c.0).collect();
    assert_eq!(inits, vec![0]);
}

#[test]
fn scene_lengths_come_from_neighbours() {
    let timeline = Timeline::new(vec![
        SceneEntry::end(300),
        SceneEntry::scene(250, "outro", noop),
        SceneEntry::scene(100, "verse", noop),
        SceneEntry::scene(0, "intro", noop),
    ])
    .expect("valid timeline");
    assert_eq!(timeline.intervals(), vec![(0, 100), (100, 250), (250, 300)]);
    let lengths: Vec<u64> = timeline.scenes().iter().map(|s| s.length).collect();
    assert_eq!(lengths, vec![50, 150, 100]);

    // Every frame before the end belongs to exactly one interval.
    for frame in 0..300 {
        let hits = timeline
            .intervals()
            .iter()
            .filter(|(start, end)| (*start..*end).contains(&frame))
            .count();
        assert_eq!(hits, 1, "frame {frame}");
    }

    match timeline.resolve(100).expect("resolve") {
        Resolved::Active { scene, pos, init } => {
            assert_eq!((scene.name, pos, init), ("verse", 0, true));
        }
        Resolved::Finished => panic!("frame 100 is inside the timeline"),
    }
    match timeline.resolve(299).expect("resolve") {
        Resolved::Active { scene, pos, init } => {
            assert_eq!((scene.name, pos, init), ("outro", 49, false));
        }
        Resolved::Finished => panic!("frame 299 is inside the timeline"),
    }
    assert!(matches!(timeline.resolve(300), Ok(Resolved::Finished)));
    assert!(matches!(timeline.resolve(10_000), Ok(Resolved::Finished)));
}

#[test]
fn malformed_timelines_are_rejected() {
    let err = |entries: Vec<SceneEntry<()>>| Timeline::new(entries).err();

    assert_eq!(err(vec![]), Some(TimelineError::Empty));
    assert_eq!(err(vec![SceneEntry::end(10)]), Some(TimelineError::MissingEnd));
    assert_eq!(
        err(vec![SceneEntry::scene(10, "a", noop), SceneEntry::scene(0, "b", noop)]),
        Some(TimelineError::EndHasCallback)
    );
    assert_eq!(
        err(vec![SceneEntry::end(10), SceneEntry::end(0)]),
        Some(TimelineError::MissingCallback { start: 0 })
    );
    assert_eq!(
        err(vec![
            SceneEntry::end(100),
            SceneEntry::scene(40, "a", noop),
            SceneEntry::scene(40, "b", noop),
        ]),
        Some(TimelineError::NotDecreasing { index: 2, start: 40, previous: 40 })
    );
    assert_eq!(
        err(vec![SceneEntry::end(100), SceneEntry::scene(120, "a", noop)]),
        Some(TimelineError::NotDecreasing { index: 1, start: 120, previous: 100 })
    );
    assert_eq!(
        err(vec![SceneEntry::end(100), SceneEntry::scene(5, "a", noop)]),
        Some(TimelineError::DoesNotStartAtZero(5))
    );
}

#[test]
fn curves_are_rebuilt_on_scene_init() {
    let mut anim = Animation::new(
        "zoomer",
        ParamSet::with_defaults(),
        KernelSpec::default(),
        vec![
            SceneEntry::end(20),
            SceneEntry::scene(10, "second", zoom),
            SceneEntry::scene(0, "first", zoom),
        ],
        Log::default(),
    )
    .expect("valid timeline");

    anim.update(0, None).expect("update");
    assert_eq!(anim.params()["radius"], 2.0);
    for frame in 1..10 {
        anim.update(frame, None).expect("update");
    }
    assert_eq!(anim.params()["radius"], 0.02);
    anim.update(10, None).expect("update");
    assert_eq!(anim.params()["radius"], 2.0);

    // Only the parameters the scenes touched are reported.
    assert_eq!(anim.params().modified_report(), "{\"radius\": 2}");
}

// ── Animation + modulators ──────────────────────────────────────────────────

fn kick_animation() -> Animation<Log> {
    Animation::new(
        "kicker",
        ParamSet::with_defaults(),
        KernelSpec::default(),
        vec![SceneEntry::end(100), SceneEntry::scene(0, "main", follow_kick)],
        Log::default(),
    )
    .expect("valid timeline")
    .audio_mod("kick", AudioMod::new(0..64, AudioMode::Max).decay(4.0))
}

fn tone(frame_size: usize, period: usize) -> Vec<f32> {
    (0..frame_size)
        .map(|i| 0.5 * (2.0 * PI * i as f32 / period as f32).sin())
        .collect()
}

#[test]
fn signals_start_at_zero_without_audio() {
    let mut anim = kick_animation();
    assert_eq!(anim.signals().get("kick"), Some(0.0));
    anim.update(0, None).expect("update");
    assert_eq!(anim.params()["grad_freq"], 1.0);
}

#[test]
fn audio_drives_signals_into_scenes() {
    let mut anim = kick_animation();
    anim.set_audio(256);

    let loud = tone(256, 32);
    anim.update(0, Some((&loud, 1))).expect("update");
    let peak = anim.signals()["kick"];
    assert!(peak > 0.5, "tone should register, got {peak}");
    assert_eq!(anim.params()["grad_freq"], 1.0 + peak);

    // Silence releases gradually rather than dropping to zero.
    anim.update(1, None).expect("update");
    let released = anim.signals()["kick"];
    assert!(released < peak && released > 0.0, "{released} vs {peak}");
    assert!((released - peak * 0.75).abs() < 1e-9);

    let silent = vec![0.0f32; 256];
    for frame in 2..80 {
        anim.update(frame, Some((&silent, 1))).expect("update");
    }
    assert!(anim.signals()["kick"] < 1e-6);
}

// ── Registry ────────────────────────────────────────────────────────────────

#[test]
fn every_registered_animation_builds() {
    for (name, _) in ANIMATIONS {
        let mut show = make_animation(name).unwrap_or_else(|e| panic!("{name}: {e:#}"));
        assert_eq!(show.name(), *name);
        assert!(show.end_frame() > 0, "{name}");
        show.kernel()
            .check_params(show.params())
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        for (signal, _) in show.signals().iter() {
            assert_eq!(show.signals().get(signal), Some(0.0), "{name}: {signal}");
        }

        // Walk through every scene boundary once without media attached.
        show.set_silent(true);
        let mut frame = 0;
        while let FrameStatus::Played { .. } = show.update(frame, None).expect("update") {
            frame += 1;
        }
        assert_eq!(frame, show.end_frame(), "{name}");
        let radius = show.params()["radius"];
        assert!(radius.is_finite() && radius > 0.0, "{name}: radius {radius}");
    }
}

#[test]
fn unknown_animation_lists_choices() {
    let err = make_animation("nope").err().expect("unknown name must fail");
    let msg = format!("{err:#}");
    assert!(msg.contains("unknown animation 'nope'"), "{msg}");
    for (name, _) in ANIMATIONS {
        assert!(msg.contains(name), "{msg}");
    }
}

#[test]
fn seeded_animations_repeat() {
    let run = |seed: u64| {
        let mut show = make_seeded("trap-bloom", seed).expect("trap-bloom");
        show.set_silent(true);
        for frame in 0..400 {
            show.update(frame, None).expect("update");
        }
        show.params().c()
    };
    assert_eq!(run(7), run(7));
}
