use crate::foundation::core::{Vec2, Vec2Array};
use crate::foundation::math::{binomial, catmull_rom, catmull_rom_derivative};

/// Curve form of a path deformer. Documents store it as `0` (Bezier) or `1` (Spline).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CurveType {
    /// One Bezier curve of degree `n - 1` over all control points.
    Bezier,
    /// Catmull-Rom spline through the control points.
    #[default]
    Spline,
}

impl From<CurveType> for u8 {
    fn from(t: CurveType) -> Self {
        match t {
            CurveType::Bezier => 0,
            CurveType::Spline => 1,
        }
    }
}

impl TryFrom<u8> for CurveType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Bezier),
            1 => Ok(Self::Spline),
            _ => Err(format!("unknown curve type {v}")),
        }
    }
}

/// A parametric curve over `t` in `[0, 1]`.
///
/// Fewer than two control points evaluate to the origin everywhere.
#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    kind: CurveType,
    points: Vec2Array,
    // Bezier only: control points of the derivative curve.
    derivatives: Vec2Array,
}

impl Curve {
    /// Curve through `points`.
    pub fn new(kind: CurveType, points: Vec2Array) -> Self {
        let derivatives = match kind {
            CurveType::Bezier if points.len() >= 2 => {
                let order = (points.len() - 1) as f64;
                (0..points.len() - 1)
                    .map(|i| (points.at(i + 1) - points.at(i)) * order)
                    .collect()
            }
            _ => Vec2Array::new(),
        };
        Self {
            kind,
            points,
            derivatives,
        }
    }

    /// Curve form.
    pub fn kind(&self) -> CurveType {
        self.kind
    }

    /// Control points.
    pub fn points(&self) -> &Vec2Array {
        &self.points
    }

    /// Position at `t` (clamped to `[0, 1]`).
    pub fn point(&self, t: f64) -> Vec2 {
        if self.points.len() < 2 {
            return Vec2::ZERO;
        }
        let t = clamp_t(t);
        match self.kind {
            CurveType::Bezier => bernstein(&self.points, t),
            CurveType::Spline => self.spline(t, catmull_rom),
        }
    }

    /// Derivative with respect to `t` (clamped to `[0, 1]`).
    pub fn derivative(&self, t: f64) -> Vec2 {
        if self.points.len() < 2 {
            return Vec2::ZERO;
        }
        let t = clamp_t(t);
        match self.kind {
            CurveType::Bezier => bernstein(&self.derivatives, t),
            // d/dt of the segment polynomial, scaled by d(segment)/dt.
            CurveType::Spline => {
                self.spline(t, catmull_rom_derivative) * (self.points.len() - 1) as f64
            }
        }
    }

    /// Positions at every `t` in `ts`.
    pub fn points_at(&self, ts: &[f64]) -> Vec2Array {
        ts.iter().map(|&t| self.point(t)).collect()
    }

    /// Derivatives at every `t` in `ts`.
    pub fn derivatives_at(&self, ts: &[f64]) -> Vec2Array {
        ts.iter().map(|&t| self.derivative(t)).collect()
    }

    /// Parameter of the sample closest to `p` among `samples + 1` evenly spaced ones.
    /// Ties keep the smallest `t`.
    pub fn closest_t(&self, p: Vec2, samples: usize) -> f64 {
        let denom = samples.max(1) as f64;
        let mut best_t = 0.0;
        let mut best = f64::INFINITY;
        for i in 0..=samples {
            let t = i as f64 / denom;
            let d = (self.point(t) - p).hypot2();
            if d < best {
                best = d;
                best_t = t;
            }
        }
        best_t
    }

    fn spline(&self, t: f64, f: fn(f64, f64, f64, f64, f64) -> f64) -> Vec2 {
        let n = self.points.len();
        let segment = t * (n - 1) as f64;
        let p1 = (segment.floor() as usize).min(n - 2);
        let p0 = p1.saturating_sub(1);
        let p2 = (p1 + 1).min(n - 1);
        let p3 = (p2 + 1).min(n - 1);
        let lt = segment - p1 as f64;
        let [a, b, c, d] = [p0, p1, p2, p3].map(|i| self.points.at(i));
        Vec2::new(f(a.x, b.x, c.x, d.x, lt), f(a.y, b.y, c.y, d.y, lt))
    }
}

fn clamp_t(t: f64) -> f64 {
    if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) }
}

fn bernstein(points: &Vec2Array, t: f64) -> Vec2 {
    let n = points.len();
    if n == 0 {
        return Vec2::ZERO;
    }
    let order = n - 1;
    let u = 1.0 - t;
    let mut acc = Vec2::ZERO;
    for (i, p) in points.iter().enumerate() {
        let coeff = binomial(order, i) * u.powi((order - i) as i32) * t.powi(i as i32);
        acc += p * coeff;
    }
    acc
}

#[cfg(test)]
#[path = "../../tests/unit/deform/curve.rs"]
mod tests;
