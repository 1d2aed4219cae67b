use fractal_vj::gradient::{
    hsv_to_rgb, pack_rgb, rgb_to_hsv, BlendShape, BlendSpace, GimpGradient, Gradient,
    GradientError, StopGradient, OPAQUE_BLACK,
};
use fractal_vj::interp::{complex_linspace, linspace, logspace, Curve};
use fractal_vj::plane::ComplexPlane;
use num_complex::Complex64;
use std::path::PathBuf;

const RED_TO_BLUE_TO_WHITE: &str = "GIMP Gradient
Name: Test Ramp
2
0.000000 0.250000 0.500000 1.000000 0.000000 0.000000 1.000000 0.000000 0.000000 1.000000 1.000000 0 0
0.500000 0.750000 1.000000 0.000000 0.000000 1.000000 1.000000 1.000000 1.000000 1.000000 1.000000 0 0
";

const STOPS: &str = r#"warm {
gradient:
  title="Warm" smooth=no
  index=0 color=16711680
  index=100 color=65280
}
cold {
gradient:
  title="Cold" smooth=no
  index=0 color=255
}
"#;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fractal_vj_{name}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

// ── ComplexPlane ────────────────────────────────────────────────────────────

#[test]
fn plane_roundtrips_every_pixel() {
    for (center, radius) in [
        (Complex64::new(0.0, 0.0), 2.3),
        (Complex64::new(-0.75, 0.1), 0.01),
        (Complex64::new(3.0, -2.0), 150.0),
    ] {
        let plane = ComplexPlane::new((32, 18), center, radius);
        for y in 0..18 {
            for x in 0..32 {
                let p = plane.to_plane((x as f64, y as f64));
                assert_eq!(plane.to_screen(p), (x as i64, y as i64), "radius {radius}");
            }
        }
    }
}

#[test]
fn plane_bounds_and_scale() {
    let plane = ComplexPlane::new((200, 100), Complex64::new(1.0, -1.0), 2.0);
    assert_eq!(plane.plane_min(), Complex64::new(-1.0, -3.0));
    assert_eq!(plane.plane_max(), Complex64::new(3.0, 1.0));
    assert_eq!(plane.scale(), (50.0, 25.0));
    assert!(plane.included(Complex64::new(1.0, -1.0)));
    assert!(plane.included(Complex64::new(-1.0, -3.0)));
    assert!(!plane.included(Complex64::new(3.0, 0.0)));
}

#[test]
fn plane_fill_is_row_major() {
    let plane = ComplexPlane::new((4, 3), Complex64::new(0.0, 0.0), 1.0);
    let mut coords = Vec::new();
    plane.fill_coordinates(&mut coords);
    assert_eq!(coords.len(), 12);
    assert_eq!(coords[0], plane.plane_min());
    assert_eq!(coords[1], plane.to_plane((1.0, 0.0)));
    assert_eq!(coords[4], plane.to_plane((0.0, 1.0)));
}

#[test]
fn plane_resize_keeps_view() {
    let mut plane = ComplexPlane::new((10, 10), Complex64::new(0.5, 0.5), 1.0);
    plane.resize((40, 20));
    assert_eq!(plane.window(), (40, 20));
    assert_eq!(plane.plane_min(), Complex64::new(-0.5, -0.5));
    assert_eq!(plane.scale(), (20.0, 10.0));
}

#[test]
#[should_panic(expected = "radius")]
fn plane_rejects_zero_radius() {
    let _ = ComplexPlane::new((10, 10), Complex64::new(0.0, 0.0), 0.0);
}

// ── Gradients ───────────────────────────────────────────────────────────────

#[test]
fn ggr_parses_segments() {
    let g = GimpGradient::parse(RED_TO_BLUE_TO_WHITE).expect("parse ggr");
    assert_eq!(g.name, "Test Ramp");
    assert_eq!(g.segments.len(), 2);
    assert_eq!(g.segments[0].shape, BlendShape::Linear);
    assert_eq!(g.segments[0].space, BlendSpace::Rgb);
    assert_eq!(g.color(0.0), 0xffff_0000);
    assert_eq!(g.color(0.5), 0xff00_00ff);
    assert_eq!(g.color(1.0), 0xffff_ffff);
}

#[test]
fn ggr_accepts_eleven_fields() {
    let text = "GIMP Gradient\nName: Short\n1\n0 0.5 1 0 0 0 1 1 1 1 1\n";
    let g = GimpGradient::parse(text).expect("parse");
    assert_eq!(g.segments[0].shape, BlendShape::Linear);
    assert_eq!(g.color(1.0), 0xffff_ffff);
}

/// One-segment `.ggr` from `left` to `right` with its midpoint at `middle`.
fn one_segment(middle: f64, left: [f64; 3], right: [f64; 3], shape: u8, space: u8) -> GimpGradient {
    let [lr, lg, lb] = left;
    let [rr, rg, rb] = right;
    let text = format!(
        "GIMP Gradient\nName: Segment\n1\n0 {middle} 1 {lr} {lg} {lb} 1 {rr} {rg} {rb} 1 {shape} {space}\n"
    );
    GimpGradient::parse(&text).expect("parse segment")
}

#[test]
fn ggr_blend_shapes() {
    let cases = [
        (0, BlendShape::Linear, [0xff3f_3f3f, 0xff7f_7f7f, 0xffbf_bfbf]),
        (1, BlendShape::Curved, [0xff3f_3f3f, 0xff7f_7f7f, 0xffbf_bfbf]),
        (2, BlendShape::Sine, [0xff25_2525, 0xff7f_7f7f, 0xffd9_d9d9]),
        (3, BlendShape::SphereIncreasing, [0xffa8_a8a8, 0xffdc_dcdc, 0xfff6_f6f6]),
        (4, BlendShape::SphereDecreasing, [0xff08_0808, 0xff22_2222, 0xff56_5656]),
    ];
    for (code, shape, inner) in cases {
        let g = one_segment(0.5, [0.0; 3], [1.0; 3], code, 0);
        assert_eq!(g.segments[0].shape, shape);
        assert_eq!(g.color(0.0), 0xff00_0000, "{shape:?}");
        assert_eq!(g.color(1.0), 0xffff_ffff, "{shape:?}");
        assert_eq!([g.color(0.25), g.color(0.5), g.color(0.75)], inner, "{shape:?}");
    }
}

#[test]
fn ggr_curved_follows_the_midpoint() {
    // Half way along the blend sits at the midpoint, wherever it is.
    let g = one_segment(0.25, [0.0; 3], [1.0; 3], 1, 0);
    assert_eq!(g.color(0.25), 0xff7f_7f7f);
    assert_eq!(g.color(1.0), 0xffff_ffff);
}

#[test]
fn ggr_hsv_spaces_turn_opposite_ways() {
    let red = [1.0, 0.0, 0.0];
    let blue = [0.0, 0.0, 1.0];

    let ccw = one_segment(0.5, red, blue, 0, 1);
    assert_eq!(ccw.segments[0].space, BlendSpace::HsvCounterClockwise);
    assert_eq!(ccw.color(0.0), 0xffff_0000);
    assert_eq!(ccw.color(1.0), 0xff00_00ff);
    // Through yellow and green.
    assert_eq!(ccw.color(0.375), 0xff7f_ff00);
    assert_eq!(ccw.color(0.5), 0xff00_ff00);

    let cw = one_segment(0.5, red, blue, 0, 2);
    assert_eq!(cw.segments[0].space, BlendSpace::HsvClockwise);
    assert_eq!(cw.color(0.0), 0xffff_0000);
    assert_eq!(cw.color(1.0), 0xff00_00ff);
    // Through magenta.
    assert_eq!(cw.color(0.375), 0xffff_00bf);
    assert_eq!(cw.color(0.5), 0xffff_00ff);
}

#[test]
fn ggr_reports_bad_lines() {
    let truncated = "GIMP Gradient\nName: Broken\n2\n0 0.5 1 0 0 0 1 1 1 1 1 0 0\n";
    assert!(matches!(
        GimpGradient::parse(truncated),
        Err(GradientError::Parse { .. })
    ));

    let garbage = "GIMP Gradient\nName: Broken\n1\n0 0.5 one 0 0 0 1 1 1 1 1 0 0\n";
    assert!(matches!(
        GimpGradient::parse(garbage),
        Err(GradientError::Parse { line: 4, .. })
    ));

    let not_ggr = "Hello\nName: x\n1\n";
    assert!(matches!(
        GimpGradient::parse(not_ggr),
        Err(GradientError::Parse { line: 1, .. })
    ));
}

#[test]
fn to_array_has_requested_length() {
    for name in ["purples", "sunrise", "incandescent"] {
        let g = Gradient::resolve(name, &[]).expect("builtin");
        for len in [1, 7, 512, 1000] {
            let colors = g.to_array(len);
            assert_eq!(colors.len(), len);
            assert!(colors.iter().all(|c| c >> 24 == 0xff), "{name} must be opaque");
        }
    }
}

#[test]
fn color_never_fails_in_unit_range() {
    let g = GimpGradient::parse(RED_TO_BLUE_TO_WHITE).expect("parse");
    for i in 0..1000 {
        let c = g.color(i as f64 / 1000.0);
        assert_eq!(c >> 24, 0xff);
    }
    assert_eq!(g.color(1.5), OPAQUE_BLACK);
}

#[test]
fn ugr_selects_named_block() {
    let g = StopGradient::parse(STOPS, None).expect("parse ugr");
    assert_eq!(g.selected, "Warm");
    assert_eq!(g.gradients.len(), 2);
    assert_eq!(g.color_of("Warm", 0.0), 0xffff_0000);
    assert_eq!(g.color_of("Warm", 0.99), 0xff00_ff00);

    let cold = StopGradient::parse(STOPS, Some("Cold")).expect("parse ugr");
    assert_eq!(cold.color_of("Cold", 0.5), 0xff00_00ff);

    match StopGradient::parse(STOPS, Some("Tepid")) {
        Err(GradientError::UnknownGradient { available, .. }) => {
            assert_eq!(available, vec!["Cold".to_string(), "Warm".to_string()]);
        }
        other => panic!("expected UnknownGradient, got {other:?}"),
    }
}

#[test]
fn resolve_searches_dirs_and_blocks() {
    let dir = temp_dir("gradients");
    std::fs::write(dir.join("ramp.ggr"), RED_TO_BLUE_TO_WHITE).expect("write ggr");
    std::fs::write(dir.join("stops.ugr"), STOPS).expect("write ugr");

    let ggr = Gradient::resolve("ramp.ggr", std::slice::from_ref(&dir)).expect("ggr");
    assert_eq!(ggr.name(), "Test Ramp");

    let ugr = Gradient::resolve("stops.ugr:Cold", std::slice::from_ref(&dir)).expect("ugr");
    assert_eq!(ugr.name(), "Cold");
    assert_eq!(ugr.color(0.3), 0xff00_00ff);

    assert!(matches!(
        Gradient::resolve("missing.ggr", std::slice::from_ref(&dir)),
        Err(GradientError::UnknownGradient { .. })
    ));

    std::fs::write(dir.join("ramp.txt"), "x").expect("write txt");
    assert!(matches!(
        Gradient::load(&dir.join("ramp.txt"), None),
        Err(GradientError::UnknownFormat(_))
    ));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn hsv_roundtrip() {
    for (r, g, b) in [(1.0, 0.0, 0.0), (0.2, 0.4, 0.6), (0.9, 0.9, 0.1), (0.5, 0.5, 0.5)] {
        let (h, s, v) = rgb_to_hsv(r, g, b);
        let (r2, g2, b2) = hsv_to_rgb(h, s, v);
        assert!((r - r2).abs() < 1e-9 && (g - g2).abs() < 1e-9 && (b - b2).abs() < 1e-9);
    }
    assert_eq!(pack_rgb(1.0, 0.5, 0.0), 0xffff_7f00);
}

// ── Interpolation ───────────────────────────────────────────────────────────

#[test]
fn linspace_hits_both_ends() {
    for (a, b, n) in [(0.0, 1.0, 2), (-3.5, 7.25, 11), (1e-3, 42.0, 1000)] {
        let v = linspace(a, b, n);
        assert_eq!(v.len(), n);
        assert_eq!(v[0], a);
        assert_eq!(v[n - 1], b);
    }
    assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    assert!(linspace(0.0, 1.0, 0).is_empty());
}

#[test]
fn logspace_hits_both_ends() {
    let v = logspace(15.0, 6.0, 500);
    assert_eq!(v[0], 15.0);
    assert_eq!(v[499], 6.0);
    assert!(v.windows(2).all(|w| w[1] < w[0]));
    let mid = logspace(1.0, 100.0, 3);
    assert!((mid[1] - 10.0).abs() < 1e-9);
}

#[test]
fn curve_holds_last_value() {
    let c = Curve::linear(0.0, 10.0, 11);
    assert_eq!(c.len(), 11);
    assert_eq!(c.at(3), 3.0);
    assert_eq!(c.at(400), 10.0);
    assert_eq!(c.last(), 10.0);

    let offset = Curve::log_offset(0.02, 0.0, 0.01, 5);
    assert!((offset.at(0) - 0.02).abs() < 1e-12);
    assert!(offset.last().abs() < 1e-12);
}

#[test]
fn complex_linspace_interpolates_both_parts() {
    let v = complex_linspace(Complex64::new(0.0, 1.0), Complex64::new(1.0, -1.0), 3);
    assert_eq!(v, vec![
        Complex64::new(0.0, 1.0),
        Complex64::new(0.5, 0.0),
        Complex64::new(1.0, -1.0),
    ]);
}
