use crate::foundation::math::apply_linear;

pub use kurbo::{Affine, Point, Vec2};

/// Stable identity of a deformation target (a drawable or another deformer).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TargetId(pub u32);

/// Stable identity of a deformer; part of the hook de-duplication key.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct DeformerId(pub u32);

/// Structure-of-arrays list of 2D vectors.
///
/// Used both for positions (vertices) and for per-vertex offsets (deformations). Binary
/// operations between two arrays of different length only touch the common prefix.
///
/// Serialized as a list of `[x, y]` pairs.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Vec2Array {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Vec2Array {
    /// Empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// `len` zero vectors.
    pub fn zeros(len: usize) -> Self {
        Self {
            xs: vec![0.0; len],
            ys: vec![0.0; len],
        }
    }

    /// Build from a slice of vectors.
    pub fn from_vecs(values: &[Vec2]) -> Self {
        Self {
            xs: values.iter().map(|v| v.x).collect(),
            ys: values.iter().map(|v| v.y).collect(),
        }
    }

    /// Build from a slice of points.
    pub fn from_points(points: &[Point]) -> Self {
        Self {
            xs: points.iter().map(|p| p.x).collect(),
            ys: points.iter().map(|p| p.y).collect(),
        }
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// `true` when the array holds no vectors ("no-op" payload).
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// X lane.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Y lane.
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Vector at `i`, if in range.
    pub fn get(&self, i: usize) -> Option<Vec2> {
        Some(Vec2::new(*self.xs.get(i)?, *self.ys.get(i)?))
    }

    /// Vector at `i`, or zero when out of range.
    pub fn at(&self, i: usize) -> Vec2 {
        self.get(i).unwrap_or(Vec2::ZERO)
    }

    /// Point at `i`, or the origin when out of range.
    pub fn point(&self, i: usize) -> Point {
        self.at(i).to_point()
    }

    /// Overwrite the vector at `i`; out-of-range writes are ignored.
    pub fn set(&mut self, i: usize, v: Vec2) {
        if i < self.len() {
            self.xs[i] = v.x;
            self.ys[i] = v.y;
        }
    }

    /// Append one vector.
    pub fn push(&mut self, v: Vec2) {
        self.xs.push(v.x);
        self.ys.push(v.y);
    }

    /// Resize, filling new slots with zero.
    pub fn resize(&mut self, len: usize) {
        self.xs.resize(len, 0.0);
        self.ys.resize(len, 0.0);
    }

    /// Remove every vector.
    pub fn clear(&mut self) {
        self.xs.clear();
        self.ys.clear();
    }

    /// Set every vector to `v`.
    pub fn fill(&mut self, v: Vec2) {
        self.xs.fill(v.x);
        self.ys.fill(v.y);
    }

    /// Iterate vectors in order.
    pub fn iter(&self) -> impl Iterator<Item = Vec2> + '_ {
        self.xs
            .iter()
            .zip(self.ys.iter())
            .map(|(&x, &y)| Vec2::new(x, y))
    }

    /// Copy out as a `Vec<Vec2>`.
    pub fn to_vecs(&self) -> Vec<Vec2> {
        self.iter().collect()
    }

    /// Copy out as a `Vec<Point>`.
    pub fn to_points(&self) -> Vec<Point> {
        self.iter().map(Vec2::to_point).collect()
    }

    /// Elementwise `self += other` over the common prefix.
    pub fn add_assign(&mut self, other: &Self) {
        let n = self.len().min(other.len());
        for i in 0..n {
            self.xs[i] += other.xs[i];
            self.ys[i] += other.ys[i];
        }
    }

    /// Elementwise `self -= other` over the common prefix.
    pub fn sub_assign(&mut self, other: &Self) {
        let n = self.len().min(other.len());
        for i in 0..n {
            self.xs[i] -= other.xs[i];
            self.ys[i] -= other.ys[i];
        }
    }

    /// Elementwise sum truncated to the shorter operand.
    pub fn added(&self, other: &Self) -> Self {
        let n = self.len().min(other.len());
        Self {
            xs: (0..n).map(|i| self.xs[i] + other.xs[i]).collect(),
            ys: (0..n).map(|i| self.ys[i] + other.ys[i]).collect(),
        }
    }

    /// Elementwise difference truncated to the shorter operand.
    pub fn subtracted(&self, other: &Self) -> Self {
        let n = self.len().min(other.len());
        Self {
            xs: (0..n).map(|i| self.xs[i] - other.xs[i]).collect(),
            ys: (0..n).map(|i| self.ys[i] - other.ys[i]).collect(),
        }
    }

    /// Multiply every component by `s`.
    pub fn scale(&mut self, s: f64) {
        self.scale_axes(s, s);
    }

    /// Multiply x components by `sx` and y components by `sy`.
    pub fn scale_axes(&mut self, sx: f64, sy: f64) {
        self.xs.iter_mut().for_each(|x| *x *= sx);
        self.ys.iter_mut().for_each(|y| *y *= sy);
    }

    /// New array holding `self[indices[k]]`; out-of-range indices read zero.
    pub fn gather(&self, indices: &[usize]) -> Self {
        let mut out = Self::zeros(indices.len());
        for (k, &i) in indices.iter().enumerate() {
            out.set(k, self.at(i));
        }
        out
    }

    /// `self[indices[k]] += src[k]`; out-of-range indices are skipped.
    pub fn scatter_add(&mut self, indices: &[usize], src: &Self) {
        for (k, &i) in indices.iter().enumerate() {
            if i < self.len() && k < src.len() {
                self.xs[i] += src.xs[k];
                self.ys[i] += src.ys[k];
            }
        }
    }

    /// Positions mapped through the full affine transform.
    pub fn transformed(&self, a: Affine) -> Self {
        let mut out = Self::zeros(self.len());
        for (i, v) in self.iter().enumerate() {
            out.set(i, (a * v.to_point()).to_vec2());
        }
        out
    }

    /// Vectors mapped through the linear part of `a` (translation ignored).
    pub fn transformed_linear(&self, a: Affine) -> Self {
        let mut out = Self::zeros(self.len());
        for (i, v) in self.iter().enumerate() {
            out.set(i, apply_linear(a, v));
        }
        out
    }

    /// `self[i] += linear(a) · src[i]` over the common prefix.
    pub fn add_transformed_linear(&mut self, src: &Self, a: Affine) {
        let n = self.len().min(src.len());
        for i in 0..n {
            let v = apply_linear(a, src.at(i));
            self.xs[i] += v.x;
            self.ys[i] += v.y;
        }
    }

    /// Index of the first vector with a non-finite component.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.iter().position(|v| !v.is_finite())
    }

    /// Zero every vector with a non-finite component; returns how many were zeroed.
    pub fn zero_non_finite(&mut self) -> usize {
        let mut zeroed = 0;
        for i in 0..self.len() {
            if !(self.xs[i].is_finite() && self.ys[i].is_finite()) {
                self.xs[i] = 0.0;
                self.ys[i] = 0.0;
                zeroed += 1;
            }
        }
        zeroed
    }

    /// Largest absolute component (0 for an empty array).
    pub fn max_abs(&self) -> f64 {
        self.xs
            .iter()
            .chain(self.ys.iter())
            .fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// `true` when every component is exactly zero.
    pub fn is_all_zero(&self) -> bool {
        self.xs.iter().chain(self.ys.iter()).all(|&v| v == 0.0)
    }
}

impl From<Vec<[f64; 2]>> for Vec2Array {
    fn from(pairs: Vec<[f64; 2]>) -> Self {
        Self {
            xs: pairs.iter().map(|p| p[0]).collect(),
            ys: pairs.iter().map(|p| p[1]).collect(),
        }
    }
}

impl From<Vec2Array> for Vec<[f64; 2]> {
    fn from(arr: Vec2Array) -> Self {
        arr.xs.into_iter().zip(arr.ys).map(|(x, y)| [x, y]).collect()
    }
}

impl FromIterator<Vec2> for Vec2Array {
    fn from_iter<I: IntoIterator<Item = Vec2>>(iter: I) -> Self {
        let mut out = Self::new();
        for v in iter {
            out.push(v);
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
