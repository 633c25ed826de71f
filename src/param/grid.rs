use crate::foundation::core::Vec2;
use crate::param::value::{GridValue, cubic};

/// Cell address in a binding grid (x keypoint, y keypoint).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct GridIndex {
    /// Keypoint index along the x axis.
    pub x: usize,
    /// Keypoint index along the y axis (0 for 1D parameters).
    pub y: usize,
}

impl GridIndex {
    /// Build an index.
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// How a binding turns `(left keypoint, offset)` into a value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InterpolateMode {
    /// Closest keypoint per axis.
    Nearest,
    /// Linear in 1D, bilinear in 2D.
    #[default]
    Linear,
    /// Catmull-Rom over clamped neighbours, bicubic in 2D.
    Cubic,
    /// Always the left keypoint.
    Step,
}

/// Dense `x_count × y_count` grid of keyed values plus the "explicitly authored" flags.
///
/// Stored x-major: `values[x][y]`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BindingGrid<T> {
    values: Vec<Vec<T>>,
    #[serde(rename = "isSet")]
    is_set: Vec<Vec<bool>>,
}

impl<T: GridValue> BindingGrid<T> {
    /// Grid filled with `default`, nothing authored.
    pub fn new(x_count: usize, y_count: usize, default: &T) -> Self {
        Self {
            values: vec![vec![default.clone(); y_count]; x_count],
            is_set: vec![vec![false; y_count]; x_count],
        }
    }

    /// Reset every cell to `default` and unauthored, resizing to the given dimensions.
    pub fn clear(&mut self, x_count: usize, y_count: usize, default: &T) {
        *self = Self::new(x_count, y_count, default);
    }

    /// `(x_count, y_count)`.
    pub fn dims(&self) -> (usize, usize) {
        (
            self.values.len(),
            self.values.first().map_or(0, Vec::len),
        )
    }

    pub(crate) fn contains(&self, p: GridIndex) -> bool {
        p.x < self.values.len() && p.y < self.values[p.x].len()
    }

    /// Value at a cell.
    pub fn value(&self, p: GridIndex) -> Option<&T> {
        self.values.get(p.x)?.get(p.y)
    }

    /// `true` if the cell was explicitly authored.
    pub fn is_set(&self, p: GridIndex) -> bool {
        self.is_set
            .get(p.x)
            .and_then(|col| col.get(p.y))
            .copied()
            .unwrap_or(false)
    }

    /// Number of authored cells.
    pub fn set_count(&self) -> usize {
        self.is_set.iter().flatten().filter(|b| **b).count()
    }

    /// Authored flags, x-major.
    pub fn set_flags(&self) -> &[Vec<bool>] {
        &self.is_set
    }

    pub(crate) fn put(&mut self, p: GridIndex, value: T, set: bool) {
        if self.contains(p) {
            self.values[p.x][p.y] = value;
            self.is_set[p.x][p.y] = set;
        }
    }

    pub(crate) fn mark(&mut self, p: GridIndex, set: bool) {
        if self.contains(p) {
            self.is_set[p.x][p.y] = set;
        }
    }

    pub(crate) fn for_each_value_mut(&mut self, mut f: impl FnMut(GridIndex, &mut T, &mut bool)) {
        for (x, (col, flags)) in self.values.iter_mut().zip(self.is_set.iter_mut()).enumerate() {
            for (y, (v, s)) in col.iter_mut().zip(flags.iter_mut()).enumerate() {
                f(GridIndex::new(x, y), v, s);
            }
        }
    }

    pub(crate) fn reverse_axis(&mut self, axis: usize) {
        if axis == 0 {
            self.values.reverse();
            self.is_set.reverse();
        } else {
            self.values.iter_mut().for_each(|c| c.reverse());
            self.is_set.iter_mut().for_each(|c| c.reverse());
        }
    }

    pub(crate) fn move_keypoint(&mut self, axis: usize, old: usize, new: usize) {
        if axis == 0 {
            if old >= self.values.len() || new >= self.values.len() {
                return;
            }
            let v = self.values.remove(old);
            self.values.insert(new, v);
            let s = self.is_set.remove(old);
            self.is_set.insert(new, s);
        } else {
            for (col, flags) in self.values.iter_mut().zip(self.is_set.iter_mut()) {
                if old >= col.len() || new >= col.len() {
                    continue;
                }
                let v = col.remove(old);
                col.insert(new, v);
                let s = flags.remove(old);
                flags.insert(new, s);
            }
        }
    }

    pub(crate) fn insert_keypoint(&mut self, axis: usize, index: usize, default: &T) {
        if axis == 0 {
            let (_, y_count) = self.dims();
            let at = index.min(self.values.len());
            self.values.insert(at, vec![default.clone(); y_count]);
            self.is_set.insert(at, vec![false; y_count]);
        } else {
            for (col, flags) in self.values.iter_mut().zip(self.is_set.iter_mut()) {
                let at = index.min(col.len());
                col.insert(at, default.clone());
                flags.insert(at, false);
            }
        }
    }

    pub(crate) fn delete_keypoint(&mut self, axis: usize, index: usize) {
        if axis == 0 {
            if index < self.values.len() {
                self.values.remove(index);
                self.is_set.remove(index);
            }
        } else {
            for (col, flags) in self.values.iter_mut().zip(self.is_set.iter_mut()) {
                if index < col.len() {
                    col.remove(index);
                    flags.remove(index);
                }
            }
        }
    }

    fn clamped(&self, x: usize, y: usize) -> &T {
        let col = &self.values[x.min(self.values.len() - 1)];
        &col[y.min(col.len() - 1)]
    }

    /// Recompute every unauthored cell from the authored ones.
    ///
    /// `xs` / `ys` are the keypoint coordinates of the owning parameter; a 1D parameter passes a
    /// single-entry `ys`. The grid is cleared to `default` when its dimensions disagree with the
    /// axes or when nothing is authored.
    #[tracing::instrument(level = "trace", skip_all, fields(x = xs.len(), y = ys.len()))]
    pub fn re_interpolate(&mut self, xs: &[f64], ys: &[f64], default: &T) {
        let (x_count, y_count) = (xs.len(), ys.len());
        if self.dims() != (x_count, y_count) {
            self.clear(x_count, y_count, default);
        }
        let set_count = self.set_count();
        if set_count == 0 {
            self.clear(x_count, y_count, default);
            return;
        }

        let mut pass = Reinterp {
            values: &mut self.values,
            valid: self.is_set.clone(),
            newly_set: vec![vec![false; y_count]; x_count],
            distance: vec![vec![0.0; y_count]; x_count],
            commits: Vec::new(),
            xs,
            ys,
        };

        let total = x_count * y_count;
        let mut valid_count = set_count;
        loop {
            for (x, y) in std::mem::take(&mut pass.commits) {
                if !pass.valid[x][y] {
                    pass.valid[x][y] = true;
                    valid_count += 1;
                }
            }
            if valid_count == total {
                break;
            }
            pass.newly_set.iter_mut().for_each(|c| c.fill(false));

            pass.interpolate_lines(false, false);
            pass.interpolate_lines(true, true);
            if !pass.commits.is_empty() {
                continue;
            }
            pass.extrapolate_corners();
            if !pass.commits.is_empty() {
                continue;
            }
            pass.extend_and_intersect(false);
            pass.extend_and_intersect(true);
            if !pass.commits.is_empty() {
                continue;
            }
            break;
        }
    }

    /// Sample at `left` keypoint plus fractional `offset`, per `mode`.
    ///
    /// `is_vec2` selects between 1D and 2D interpolation.
    pub fn sample(&self, mode: InterpolateMode, is_vec2: bool, left: GridIndex, offset: Vec2) -> Option<T> {
        let x_len = self.values.len();
        let y_len = self.values.first().map_or(0, Vec::len);
        if x_len == 0 || y_len == 0 {
            return None;
        }
        let lx = left.x.min(x_len - 1);
        let ly = left.y.min(y_len - 1);
        let at = |x: usize, y: usize| self.clamped(x, y);

        match mode {
            InterpolateMode::Nearest => {
                let px = lx + usize::from(offset.x >= 0.5 && lx + 1 < x_len);
                let py = ly + usize::from(is_vec2 && offset.y >= 0.5 && ly + 1 < y_len);
                return Some(at(px, py).clone());
            }
            InterpolateMode::Step => return Some(at(lx, ly).clone()),
            InterpolateMode::Linear | InterpolateMode::Cubic => {}
        }

        let tx = offset.x.clamp(0.0, 1.0);
        let ty = offset.y.clamp(0.0, 1.0);
        let clamp_x = |d: isize| -> usize { (lx as isize + d).clamp(0, x_len as isize - 1) as usize };
        let clamp_y = |d: isize| -> usize { (ly as isize + d).clamp(0, y_len as isize - 1) as usize };

        if !is_vec2 {
            if mode == InterpolateMode::Cubic {
                return Some(cubic(
                    at(clamp_x(-1), 0),
                    at(clamp_x(0), 0),
                    at(clamp_x(1), 0),
                    at(clamp_x(2), 0),
                    tx,
                ));
            }
            return Some(T::lerp(at(lx, 0), at(lx + 1, 0), tx));
        }

        if mode == InterpolateMode::Cubic {
            let row = |dy: isize| -> T {
                let yp = clamp_y(dy);
                cubic(
                    at(clamp_x(-1), yp),
                    at(clamp_x(0), yp),
                    at(clamp_x(1), yp),
                    at(clamp_x(2), yp),
                    tx,
                )
            };
            let (r0, r1, r2, r3) = (row(-1), row(0), row(1), row(2));
            return Some(cubic(&r0, &r1, &r2, &r3, ty));
        }

        let p0 = T::lerp(at(lx, ly), at(lx, ly + 1), ty);
        let p1 = T::lerp(at(lx + 1, ly), at(lx + 1, ly + 1), ty);
        Some(T::lerp(&p0, &p1, tx))
    }
}

/// Scratch state of one re-interpolation run.
///
/// Lines are addressed as `(y_major, major, minor)`: with `y_major == false` the major index is x
/// and the line runs along y.
struct Reinterp<'a, T> {
    values: &'a mut Vec<Vec<T>>,
    valid: Vec<Vec<bool>>,
    newly_set: Vec<Vec<bool>>,
    distance: Vec<Vec<f64>>,
    commits: Vec<(usize, usize)>,
    xs: &'a [f64],
    ys: &'a [f64],
}

impl<T: GridValue> Reinterp<'_, T> {
    fn cell(y_major: bool, maj: usize, min: usize) -> (usize, usize) {
        if y_major { (min, maj) } else { (maj, min) }
    }

    fn counts(&self, y_major: bool) -> (usize, usize) {
        let (x, y) = (self.xs.len(), self.ys.len());
        if y_major { (y, x) } else { (x, y) }
    }

    fn axis_point(&self, y_major: bool, idx: usize) -> f64 {
        let axis = if y_major { self.xs } else { self.ys };
        axis.get(idx).copied().unwrap_or(0.0)
    }

    fn get(&self, y_major: bool, maj: usize, min: usize) -> &T {
        let (x, y) = Self::cell(y_major, maj, min);
        &self.values[x][y]
    }

    fn is_valid(&self, y_major: bool, maj: usize, min: usize) -> bool {
        let (x, y) = Self::cell(y_major, maj, min);
        self.valid[x][y]
    }

    fn is_new(&self, y_major: bool, maj: usize, min: usize) -> bool {
        let (x, y) = Self::cell(y_major, maj, min);
        self.newly_set[x][y]
    }

    fn set_point(&mut self, y_major: bool, maj: usize, min: usize, val: T, distance: f64) {
        let (x, y) = Self::cell(y_major, maj, min);
        if self.valid[x][y] {
            return;
        }
        self.values[x][y] = val;
        self.distance[x][y] = distance;
        self.newly_set[x][y] = true;
        self.commits.push((x, y));
    }

    /// Fill the gaps between valid cells of every line by coordinate-weighted lerp.
    fn interpolate_lines(&mut self, y_major: bool, second_pass: bool) {
        let mut intersected = false;
        let (major_cnt, minor_cnt) = self.counts(y_major);
        for i in 0..major_cnt {
            let Some(mut l) = (0..minor_cnt).find(|&j| self.is_valid(y_major, i, j)) else {
                continue;
            };
            loop {
                while l + 1 < minor_cnt && self.is_valid(y_major, i, l + 1) {
                    l += 1;
                }
                if l + 1 >= minor_cnt {
                    break;
                }
                let Some(r) = (l + 1..minor_cnt).find(|&j| self.is_valid(y_major, i, j)) else {
                    break;
                };
                let left_off = self.axis_point(y_major, l);
                let right_off = self.axis_point(y_major, r);
                for m in l + 1..r {
                    let mid_off = self.axis_point(y_major, m);
                    let off = if right_off == left_off {
                        0.0
                    } else {
                        (mid_off - left_off) / (right_off - left_off)
                    };
                    let val = T::lerp(self.get(y_major, i, l), self.get(y_major, i, r), off);
                    if second_pass && self.is_new(y_major, i, m) {
                        if !intersected {
                            self.commits.clear();
                        }
                        let blended = T::lerp(&val, self.get(y_major, i, m), 0.5);
                        self.set_point(y_major, i, m, blended, 0.0);
                        intersected = true;
                    }
                    if !intersected {
                        self.set_point(y_major, i, m, val, 0.0);
                    }
                }
                l = r;
            }
        }
    }

    /// Complete 2×2 blocks with exactly three valid corners.
    fn extrapolate_corners(&mut self) {
        let (x_count, y_count) = (self.xs.len(), self.ys.len());
        if x_count <= 1 || y_count <= 1 {
            return;
        }
        for x in 0..x_count - 1 {
            for y in 0..y_count - 1 {
                let v = |dx: usize, dy: usize| self.valid[x + dx][y + dy];
                let corner = match (v(0, 0), v(1, 0), v(0, 1), v(1, 1)) {
                    (true, true, true, false) => Some(((x, y), (x + 1, y + 1))),
                    (true, true, false, true) => Some(((x + 1, y), (x, y + 1))),
                    (true, false, true, true) => Some(((x, y + 1), (x + 1, y))),
                    (false, true, true, true) => Some(((x + 1, y + 1), (x, y))),
                    _ => None,
                };
                if let Some(((bx, by), (tx, ty))) = corner {
                    let base = self.values[bx][by].clone();
                    let dx = self.values[tx][by].sub(&base);
                    let dy = self.values[bx][ty].sub(&base);
                    self.set_point(false, tx, ty, base.add(&dx).add(&dy), 0.0);
                }
            }
        }
    }

    /// Propagate the first / last valid value of every line outward.
    fn extend_and_intersect(&mut self, y_major: bool) {
        let mut intersected = false;
        let (major_cnt, minor_cnt) = self.counts(y_major);
        for i in 0..major_cnt {
            let Some(first) = (0..minor_cnt).find(|&j| self.is_valid(y_major, i, j)) else {
                continue;
            };
            let val = self.get(y_major, i, first).clone();
            let origin = self.axis_point(y_major, first);
            for k in 0..first {
                self.extend_to(y_major, i, k, &val, origin, &mut intersected);
            }

            let last = (0..minor_cnt)
                .rev()
                .find(|&j| self.is_valid(y_major, i, j))
                .unwrap_or(first);
            let val = self.get(y_major, i, last).clone();
            let origin = self.axis_point(y_major, last);
            for k in last + 1..minor_cnt {
                self.extend_to(y_major, i, k, &val, origin, &mut intersected);
            }
        }
    }

    fn extend_to(
        &mut self,
        y_major: bool,
        maj: usize,
        min: usize,
        val: &T,
        origin: f64,
        intersected: &mut bool,
    ) {
        let d = (self.axis_point(y_major, min) - origin).abs();
        if self.is_new(y_major, maj, min) {
            if !*intersected {
                self.commits.clear();
            }
            let (x, y) = Self::cell(y_major, maj, min);
            let prev = self.distance[x][y];
            let denom = d + prev * prev / if d == 0.0 { 1.0 } else { d };
            let frac = if denom == 0.0 { 0.0 } else { d / denom };
            let blended = T::lerp(val, self.get(y_major, maj, min), frac);
            self.set_point(y_major, maj, min, blended, d);
            *intersected = true;
        }
        if !*intersected {
            self.set_point(y_major, maj, min, val.clone(), d);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/param/grid.rs"]
mod tests;
