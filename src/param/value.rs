use crate::foundation::core::Vec2Array;

/// Axis selector for per-axis value edits (`-1` both, `0` x, `1` y in documents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueAxis {
    /// Both axes.
    Both,
    /// X axis only.
    X,
    /// Y axis only.
    Y,
}

impl ValueAxis {
    /// Decode the numeric axis convention; anything else than 0 or 1 means both.
    pub fn from_index(axis: i32) -> Self {
        match axis {
            0 => Self::X,
            1 => Self::Y,
            _ => Self::Both,
        }
    }
}

/// Value stored in a binding grid cell.
///
/// The re-interpolation and sampling routines only need these four operations, so `f64`
/// parameters and per-vertex deformation payloads share one implementation.
pub trait GridValue: Clone {
    /// Linear blend, `t = 0` gives `a`.
    fn lerp(a: &Self, b: &Self, t: f64) -> Self;
    /// Elementwise sum.
    fn add(&self, other: &Self) -> Self;
    /// Elementwise difference.
    fn sub(&self, other: &Self) -> Self;
    /// Uniform scale.
    fn scale(&self, s: f64) -> Self;

    /// Scale along one axis; scalar values ignore the axis.
    fn scale_axis(&self, axis: ValueAxis, s: f64) -> Self {
        let _ = axis;
        self.scale(s)
    }
}

impl GridValue for f64 {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        a * (1.0 - t) + b * t
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }

    fn scale(&self, s: f64) -> Self {
        self * s
    }
}

/// Per-vertex offsets authored at one keypoint. Empty means "no-op".
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DeformSlot {
    /// One offset per vertex of the bound target.
    pub vertex_offsets: Vec2Array,
}

impl DeformSlot {
    /// Slot of `len` zero offsets.
    pub fn zeros(len: usize) -> Self {
        Self {
            vertex_offsets: Vec2Array::zeros(len),
        }
    }

    /// Number of offsets.
    pub fn len(&self) -> usize {
        self.vertex_offsets.len()
    }

    /// `true` for the no-op payload.
    pub fn is_empty(&self) -> bool {
        self.vertex_offsets.is_empty()
    }
}

impl From<Vec2Array> for DeformSlot {
    fn from(vertex_offsets: Vec2Array) -> Self {
        Self { vertex_offsets }
    }
}

impl GridValue for DeformSlot {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        if a.len() != b.len() {
            return if t < 0.5 { a.clone() } else { b.clone() };
        }
        let mut out = Vec2Array::zeros(a.len());
        for (i, (va, vb)) in a
            .vertex_offsets
            .iter()
            .zip(b.vertex_offsets.iter())
            .enumerate()
        {
            out.set(i, va * (1.0 - t) + vb * t);
        }
        out.into()
    }

    fn add(&self, other: &Self) -> Self {
        self.vertex_offsets.added(&other.vertex_offsets).into()
    }

    fn sub(&self, other: &Self) -> Self {
        self.vertex_offsets.subtracted(&other.vertex_offsets).into()
    }

    fn scale(&self, s: f64) -> Self {
        self.scale_axis(ValueAxis::Both, s)
    }

    fn scale_axis(&self, axis: ValueAxis, s: f64) -> Self {
        let mut out = self.clone();
        match axis {
            ValueAxis::Both => out.vertex_offsets.scale_axes(s, s),
            ValueAxis::X => out.vertex_offsets.scale_axes(s, 1.0),
            ValueAxis::Y => out.vertex_offsets.scale_axes(1.0, s),
        }
        out
    }
}

/// Catmull-Rom blend of four consecutive grid values, `t` between `p1` and `p2`.
pub(crate) fn cubic<T: GridValue>(p0: &T, p1: &T, p2: &T, p3: &T, t: f64) -> T {
    let t2 = t * t;
    let t3 = t2 * t;
    let a = p1.scale(2.0);
    let b = p2.sub(p0).scale(t);
    let c = p0
        .scale(2.0)
        .sub(&p1.scale(5.0))
        .add(&p2.scale(4.0))
        .sub(p3)
        .scale(t2);
    let d = p1
        .scale(3.0)
        .sub(&p2.scale(3.0))
        .add(p3)
        .sub(p0)
        .scale(t3);
    a.add(&b).add(&c).add(&d).scale(0.5)
}

#[cfg(test)]
#[path = "../../tests/unit/param/value.rs"]
mod tests;
