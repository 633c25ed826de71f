use crate::foundation::core::{Affine, Vec2};

/// Epsilon under which a tangent is considered degenerate.
pub(crate) const TANGENT_EPSILON: f64 = 1e-8;

/// Length under which a chain segment is considered collapsed.
pub(crate) const LENGTH_EPSILON: f64 = 1e-6;

/// Linear part of `a` applied to a vector.
#[inline]
pub(crate) fn apply_linear(a: Affine, v: Vec2) -> Vec2 {
    let c = a.as_coeffs();
    Vec2::new(c[0] * v.x + c[2] * v.y, c[1] * v.x + c[3] * v.y)
}

/// `a` with its translation zeroed.
#[inline]
pub(crate) fn linear_part(a: Affine) -> Affine {
    let c = a.as_coeffs();
    Affine::new([c[0], c[1], c[2], c[3], 0.0, 0.0])
}

pub(crate) fn affine_is_finite(a: Affine) -> bool {
    a.as_coeffs().iter().all(|c| c.is_finite())
}

/// Rotation angle encoded in the linear part of `a`.
pub(crate) fn rotation_of(a: Affine) -> f64 {
    let c = a.as_coeffs();
    c[1].atan2(c[0])
}

/// Wrap an angle into `[-pi, pi]`.
pub(crate) fn clamp_angle(mut a: f64) -> f64 {
    use std::f64::consts::PI;
    if !a.is_finite() {
        return a;
    }
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Unit vector along `v`, or `None` when shorter than `eps` or non-finite.
pub(crate) fn normalize_checked(v: Vec2, eps: f64) -> Option<Vec2> {
    let len = v.hypot();
    if !len.is_finite() || len < eps {
        return None;
    }
    Some(v / len)
}

/// Catmull-Rom weight polynomial on one coordinate, `t` in `[0, 1]` between `p1` and `p2`.
#[inline]
pub(crate) fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let a = 2.0 * p1;
    let b = p2 - p0;
    let c = 2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3;
    let d = -p0 + 3.0 * p1 - 3.0 * p2 + p3;
    0.5 * (a + b * t + c * t * t + d * t * t * t)
}

/// Derivative of [`catmull_rom`] with respect to `t`.
#[inline]
pub(crate) fn catmull_rom_derivative(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let b = p2 - p0;
    let c = 2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3;
    let d = -p0 + 3.0 * p1 - 3.0 * p2 + p3;
    0.5 * (b + 2.0 * c * t + 3.0 * d * t * t)
}

/// Binomial coefficient as a float; exact for the small orders curves use.
pub(crate) fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut r = 1.0;
    for i in 0..k {
        r = r * (n - i) as f64 / (i + 1) as f64;
    }
    r
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
