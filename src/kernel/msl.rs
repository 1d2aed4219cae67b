use super::formula::{msl_float, Formula};
use super::{AxisOrder, KernelVariant, TrapLines};
use std::fmt::Write as _;

pub const ENTRY_POINT: &str = "compute";

const PRELUDE: &str = r#"
#include <metal_stdlib>
using namespace metal;

#define BACKGROUND 0xff000000u

struct Args {
    uint count;
    uint julia;
    uint max_iter;
    uint pre_iter;
    float gradient_frequency;
    float c_real;
    float c_imag;
    float trap_real;
    float trap_imag;
    float trap_width;
    float pad0;
    float pad1;
};

inline float2 c_mul(float2 a, float2 b) { return float2(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x); }
inline float2 c_div(float2 a, float2 b) {
    float d = dot(b, b);
    return float2(a.x * b.x + a.y * b.y, a.y * b.x - a.x * b.y) / d;
}
inline float2 c_abs(float2 a) { return float2(length(a), 0.0f); }
inline float2 c_arg(float2 a) { return float2(atan2(a.y, a.x), 0.0f); }
inline float2 c_conj(float2 a) { return float2(a.x, -a.y); }
inline float2 c_re(float2 a) { return float2(a.x, 0.0f); }
inline float2 c_im(float2 a) { return float2(a.y, 0.0f); }
inline float2 c_rabs(float2 a) { return float2(fabs(a.x), a.y); }
inline float2 c_iabs(float2 a) { return float2(a.x, fabs(a.y)); }
inline float2 c_fabs(float2 a) { return fabs(a); }
inline float2 c_sqr(float2 a) { return c_mul(a, a); }
inline float2 c_exp(float2 a) {
    float e = exp(a.x);
    return float2(e * cos(a.y), e * sin(a.y));
}
inline float2 c_log(float2 a) { return float2(log(length(a)), atan2(a.y, a.x)); }
inline float2 c_sqrt(float2 a) {
    float r = sqrt(length(a));
    float t = 0.5f * atan2(a.y, a.x);
    return float2(r * cos(t), r * sin(t));
}
inline float2 c_sin(float2 a) { return float2(sin(a.x) * cosh(a.y), cos(a.x) * sinh(a.y)); }
inline float2 c_cos(float2 a) { return float2(cos(a.x) * cosh(a.y), -sin(a.x) * sinh(a.y)); }
inline float2 c_tan(float2 a) { return c_div(c_sin(a), c_cos(a)); }
inline float2 c_sinh(float2 a) { return float2(sinh(a.x) * cos(a.y), cosh(a.x) * sin(a.y)); }
inline float2 c_cosh(float2 a) { return float2(cosh(a.x) * cos(a.y), sinh(a.x) * sin(a.y)); }
inline float2 c_tanh(float2 a) { return c_div(c_sinh(a), c_cosh(a)); }
inline float2 c_pow(float2 a, float2 b) {
    if (a.x == 0.0f && a.y == 0.0f) {
        return float2(0.0f);
    }
    return c_exp(c_mul(b, c_log(a)));
}
inline float2 c_powi(float2 a, uint n) {
    float2 r = a;
    for (uint k = 1u; k < n; k++) {
        r = c_mul(r, a);
    }
    return r;
}
"#;

const GRADIENT_LOOKUP: &str = r#"
inline uint gradient_at(float t, float freq) {
    float idx = t * float(GRADIENT_LENGTH) * freq;
    if (!isfinite(idx)) {
        return BACKGROUND;
    }
    int i = int(clamp(idx, -1.0e9f, 1.0e9f)) % GRADIENT_LENGTH;
    if (i < 0) {
        i += GRADIENT_LENGTH;
    }
    return gradient[i];
}
"#;

pub struct MslParams<'a> {
    pub formula: &'a Formula,
    pub variant: KernelVariant,
    pub escape_distance: f64,
    pub gradient: &'a [u32],
    pub axis: AxisOrder,
    pub trap_lines: TrapLines,
}

/// Assembles the complete Metal library source for one kernel.
pub fn kernel_source(p: &MslParams<'_>) -> String {
    let mut src = String::with_capacity(16 * 1024 + p.gradient.len() * 12);
    src.push_str(PRELUDE);

    let _ = writeln!(src, "\n#define GRADIENT_LENGTH {}", p.gradient.len());
    src.push_str("constant uint gradient[GRADIENT_LENGTH] = {");
    for (idx, color) in p.gradient.iter().enumerate() {
        if idx % 8 == 0 {
            src.push_str("\n   ");
        }
        let _ = write!(src, " 0x{color:08x}u,");
    }
    src.push_str("\n};\n");
    src.push_str(GRADIENT_LOOKUP);

    let _ = write!(
        src,
        r#"
kernel void {ENTRY_POINT}(
    device const float2 *plane [[buffer(0)]],
    device uint *pixels [[buffer(1)]],
    constant Args &args [[buffer(2)]],
    device const float *extra [[buffer(3)]],
    uint gid [[thread_position_in_grid]])
{{
    if (gid >= args.count) {{
        return;
    }}
    float2 pos = plane[gid]{swizzle};
"#,
        swizzle = match p.axis {
            AxisOrder::Normal => "",
            AxisOrder::Swapped => ".yx",
        }
    );
    for idx in 0..p.formula.params().len() {
        let _ = writeln!(src, "    float {} = extra[{idx}];", p.formula.msl_param(idx));
    }
    for idx in 0..p.formula.locals().len() {
        let _ = writeln!(src, "    float2 {} = float2(0.0f);", p.formula.msl_local(idx));
    }
    let _ = write!(
        src,
        r#"    float2 z;
    float2 c;
    if (args.julia != 0u) {{
        z = pos;
        c = float2(args.c_real, args.c_imag);
    }} else {{
        z = float2(0.0f);
        c = pos;
    }}
    const float escape = {escape};
    uint pixel = BACKGROUND;
"#,
        escape = msl_float(p.escape_distance)
    );

    let body = p.formula.to_msl();
    match p.variant {
        KernelVariant::EscapeTime => {
            let _ = write!(
                src,
                r#"    for (uint iter = 0u; iter < args.max_iter; iter++) {{
{body}        float modulus = length(z);
        if (modulus > escape) {{
            float mu = float(iter) - log(log(modulus)) / log(2.0f) + log(log(escape)) / log(2.0f);
            pixel = gradient_at(mu / float(args.max_iter), args.gradient_frequency);
            break;
        }}
    }}
"#
            );
        }
        KernelVariant::MeanDistance => {
            let _ = write!(
                src,
                r#"    float sum = 0.0f;
    uint count = 0u;
    for (uint iter = 0u; iter < args.max_iter; iter++) {{
{body}        float modulus = length(z);
        if (iter >= args.pre_iter) {{
            sum += modulus;
            count++;
        }}
        if (modulus > escape) {{
            break;
        }}
    }}
    float mean = 1.0f - log2(0.5f * log2(sum / float(max(count, 1u))));
    pixel = gradient_at(mean, args.gradient_frequency);
"#
            );
        }
        KernelVariant::OrbitTrap => {
            let distance = match p.trap_lines {
                TrapLines::Real => "fabs(z.y - args.trap_imag)",
                TrapLines::Imag => "fabs(z.x - args.trap_real)",
                TrapLines::Cross => "min(fabs(z.y - args.trap_imag), fabs(z.x - args.trap_real))",
            };
            let _ = write!(
                src,
                r#"    float trap = INFINITY;
    bool escaped = false;
    float mu = 0.0f;
    for (uint iter = 0u; iter < args.max_iter; iter++) {{
{body}        float modulus = length(z);
        if (iter >= args.pre_iter) {{
            trap = min(trap, {distance});
        }}
        if (modulus > escape) {{
            escaped = true;
            mu = float(iter) - log(log(modulus)) / log(2.0f) + log(log(escape)) / log(2.0f);
            mu = mu / float(args.max_iter);
            break;
        }}
    }}
    if (trap < args.trap_width) {{
        pixel = gradient_at(trap / args.trap_width, args.gradient_frequency);
    }} else if (escaped) {{
        pixel = gradient_at(mu, args.gradient_frequency);
    }}
"#
            );
        }
    }
    src.push_str("    pixels[gid] = pixel;\n}\n");
    src
}
