use crate::foundation::core::{TargetId, Vec2};
use crate::foundation::error::{DeformError, DeformResult};
use crate::param::binding::{AnyBinding, BoundValue};
use crate::param::grid::GridIndex;

/// Keypoint coordinates of a parameter, one list per axis.
///
/// Each list is strictly increasing and non-empty. A 1D parameter's y axis is always `[0]`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamAxes {
    points: [Vec<f64>; 2],
    is_vec2: bool,
}

impl ParamAxes {
    /// Default axes: `[0, 1]` on x, and `[0, 1]` (2D) or `[0]` (1D) on y.
    pub fn new(is_vec2: bool) -> Self {
        Self {
            points: [vec![0.0, 1.0], if is_vec2 { vec![0.0, 1.0] } else { vec![0.0] }],
            is_vec2,
        }
    }

    /// Explicit axes. For a 1D parameter `y` is ignored.
    pub fn with_points(x: Vec<f64>, y: Vec<f64>, is_vec2: bool) -> DeformResult<Self> {
        let y = if is_vec2 { y } else { vec![0.0] };
        validate_axis("x", &x)?;
        validate_axis("y", &y)?;
        Ok(Self {
            points: [x, y],
            is_vec2,
        })
    }

    /// `true` for 2D parameters.
    pub fn is_vec2(&self) -> bool {
        self.is_vec2
    }

    /// Keypoint coordinates of one axis (`0` = x, anything else = y).
    pub fn points(&self, axis: usize) -> &[f64] {
        &self.points[axis.min(1)]
    }

    /// Number of keypoints on one axis; always 1 for the y axis of a 1D parameter.
    pub fn count(&self, axis: usize) -> usize {
        self.points(axis).len()
    }

    /// Coordinate of one keypoint, or 0 when out of range.
    pub fn value(&self, axis: usize, idx: usize) -> f64 {
        self.points(axis).get(idx).copied().unwrap_or(0.0)
    }

    /// Coordinates of a grid cell.
    pub fn keypoint_offset(&self, p: GridIndex) -> Vec2 {
        let x = self.value(0, p.x);
        let y = if self.is_vec2 { self.value(1, p.y) } else { 0.0 };
        Vec2::new(x, y)
    }

    /// Address a normalized position as `(left keypoint, fraction towards the next one)`.
    pub fn find_offset(&self, offset: Vec2) -> (GridIndex, Vec2) {
        let (lx, fx) = find_axis(self.points(0), offset.x);
        let (ly, fy) = if self.is_vec2 {
            find_axis(self.points(1), offset.y)
        } else {
            (0, 0.0)
        };
        (GridIndex::new(lx, ly), Vec2::new(fx, fy))
    }

    fn insert(&mut self, axis: usize, value: f64) -> DeformResult<usize> {
        let arr = &mut self.points[axis.min(1)];
        let idx = arr.partition_point(|&p| p < value);
        if arr.get(idx) == Some(&value) {
            return Err(DeformError::validation(format!(
                "axis point {value} already exists"
            )));
        }
        arr.insert(idx, value);
        Ok(idx)
    }
}

fn validate_axis(name: &str, arr: &[f64]) -> DeformResult<()> {
    if arr.is_empty() {
        return Err(DeformError::validation(format!("{name} axis must not be empty")));
    }
    if arr.iter().any(|v| !v.is_finite()) {
        return Err(DeformError::validation(format!("{name} axis must be finite")));
    }
    if arr.windows(2).any(|w| w[0] >= w[1]) {
        return Err(DeformError::validation(format!(
            "{name} axis must be strictly increasing"
        )));
    }
    Ok(())
}

fn find_axis(arr: &[f64], val: f64) -> (usize, f64) {
    if arr.len() <= 1 {
        return (0, 0.0);
    }
    let mut left = 0;
    for i in 0..arr.len() - 1 {
        left = i;
        if val < arr[i + 1] {
            break;
        }
    }
    let right = (left + 1).min(arr.len() - 1);
    let denom = arr[right] - arr[left];
    let frac = if denom == 0.0 {
        0.0
    } else {
        ((val - arr[left]) / denom).clamp(0.0, 1.0)
    };
    (left, frac)
}

/// How externally pushed offsets combine with a parameter's value during [`Parameter::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MergeMode {
    /// Summed with weight 1.
    #[default]
    Additive,
    /// Summed with the caller's weight.
    Weighted,
    /// Averaged, then multiplied into the value.
    Multiplicative,
    /// Replaces the value.
    Forced,
    /// Use the parameter's own merge mode.
    Passthrough,
}

/// A 1D or 2D animation slider and the bindings it drives.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Stable identity.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Inactive parameters skip [`Parameter::update`].
    pub active: bool,
    /// Merge mode used for [`MergeMode::Passthrough`] pushes.
    pub merge_mode: MergeMode,
    /// Rest value.
    pub defaults: Vec2,
    value: Vec2,
    latest: Vec2,
    previous: Vec2,
    min: Vec2,
    max: Vec2,
    axes: ParamAxes,
    bindings: Vec<AnyBinding>,
    additive: Vec<(Vec2, f64)>,
    multiplicative: Vec<Vec2>,
}

impl Parameter {
    /// Parameter with default axes and range `[0, 1]`.
    pub fn new(id: u32, name: impl Into<String>, is_vec2: bool) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            merge_mode: MergeMode::Additive,
            defaults: Vec2::ZERO,
            value: Vec2::ZERO,
            latest: Vec2::ZERO,
            previous: Vec2::ZERO,
            min: Vec2::ZERO,
            max: Vec2::new(1.0, 1.0),
            axes: ParamAxes::new(is_vec2),
            bindings: Vec::new(),
            additive: Vec::new(),
            multiplicative: Vec::new(),
        }
    }

    /// Replace the axes; every binding is resized to match.
    pub fn with_axes(mut self, axes: ParamAxes) -> Self {
        self.axes = axes;
        for b in &mut self.bindings {
            b.re_interpolate(&self.axes);
        }
        self
    }

    /// Set the value range.
    pub fn with_range(mut self, min: Vec2, max: Vec2) -> DeformResult<Self> {
        if !(min.is_finite() && max.is_finite()) {
            return Err(DeformError::validation("parameter range must be finite"));
        }
        self.min = min;
        self.max = max;
        Ok(self)
    }

    /// `true` for 2D parameters.
    pub fn is_vec2(&self) -> bool {
        self.axes.is_vec2()
    }

    /// Keypoint axes.
    pub fn axes(&self) -> &ParamAxes {
        &self.axes
    }

    /// Current raw value.
    pub fn value(&self) -> Vec2 {
        self.value
    }

    /// Set the raw value.
    pub fn set_value(&mut self, value: Vec2) {
        self.value = value;
    }

    /// Value after the last [`Parameter::update`] merged pushed offsets.
    pub fn latest(&self) -> Vec2 {
        self.latest
    }

    /// `(min, max)` range.
    pub fn range(&self) -> (Vec2, Vec2) {
        (self.min, self.max)
    }

    /// Raw value mapped into `[0, 1]` per axis (unclamped).
    pub fn normalized_value(&self) -> Vec2 {
        Vec2::new(
            (self.value.x - self.min.x) / (self.max.x - self.min.x),
            (self.value.y - self.min.y) / (self.max.y - self.min.y),
        )
    }

    /// Set the raw value from a normalized position.
    pub fn set_normalized_value(&mut self, v: Vec2) {
        self.value = Vec2::new(
            v.x * (self.max.x - self.min.x) + self.min.x,
            v.y * (self.max.y - self.min.y) + self.min.y,
        );
    }

    /// See [`ParamAxes::keypoint_offset`].
    pub fn keypoint_offset(&self, p: GridIndex) -> Vec2 {
        self.axes.keypoint_offset(p)
    }

    /// See [`ParamAxes::find_offset`].
    pub fn find_offset(&self, offset: Vec2) -> (GridIndex, Vec2) {
        self.axes.find_offset(offset)
    }

    fn check_axis(&self, axis: usize) -> DeformResult<()> {
        match axis {
            0 => Ok(()),
            1 if self.is_vec2() => Ok(()),
            1 => Err(DeformError::validation("1D parameters have no y axis points")),
            _ => Err(DeformError::validation(format!("no axis {axis}"))),
        }
    }

    /// Insert a keypoint coordinate; returns its index.
    pub fn insert_axis_point(&mut self, axis: usize, value: f64) -> DeformResult<usize> {
        self.check_axis(axis)?;
        if !value.is_finite() {
            return Err(DeformError::validation("axis point must be finite"));
        }
        let idx = self.axes.insert(axis, value)?;
        for b in &mut self.bindings {
            b.insert_keypoints(&self.axes, axis, idx);
        }
        Ok(idx)
    }

    /// Move a keypoint to a new coordinate; returns its new index.
    pub fn move_axis_point(&mut self, axis: usize, index: usize, value: f64) -> DeformResult<usize> {
        self.check_axis(axis)?;
        if index >= self.axes.count(axis) {
            return Err(DeformError::validation(format!("no axis point {index} on axis {axis}")));
        }
        if !value.is_finite() {
            return Err(DeformError::validation("axis point must be finite"));
        }
        let mut next = self.axes.clone();
        next.points[axis].remove(index);
        let new_index = next.insert(axis, value)?;
        self.axes = next;
        for b in &mut self.bindings {
            b.move_keypoints(&self.axes, axis, index, new_index);
        }
        Ok(new_index)
    }

    /// Remove a keypoint; an axis keeps at least one point.
    pub fn delete_axis_point(&mut self, axis: usize, index: usize) -> DeformResult<()> {
        self.check_axis(axis)?;
        if index >= self.axes.count(axis) {
            return Err(DeformError::validation(format!("no axis point {index} on axis {axis}")));
        }
        if self.axes.count(axis) <= 1 {
            return Err(DeformError::validation("cannot delete the last axis point"));
        }
        self.axes.points[axis].remove(index);
        for b in &mut self.bindings {
            b.delete_keypoints(&self.axes, axis, index);
        }
        Ok(())
    }

    /// Attach a binding; it is resized to the axes. Returns its index.
    pub fn add_binding(&mut self, mut binding: AnyBinding) -> usize {
        binding.re_interpolate(&self.axes);
        self.bindings.push(binding);
        self.bindings.len() - 1
    }

    /// Attached bindings.
    pub fn bindings(&self) -> &[AnyBinding] {
        &self.bindings
    }

    /// Index of the binding for `(target, name)`.
    pub fn find_binding(&self, target: TargetId, name: &str) -> Option<usize> {
        self.bindings
            .iter()
            .position(|b| b.target() == target && b.name() == name)
    }

    /// Borrow one binding mutably together with the axes its operations need.
    pub fn binding_mut(&mut self, index: usize) -> Option<(&ParamAxes, &mut AnyBinding)> {
        let b = self.bindings.get_mut(index)?;
        Some((&self.axes, b))
    }

    /// Detach a binding.
    pub fn remove_binding(&mut self, index: usize) -> Option<AnyBinding> {
        (index < self.bindings.len()).then(|| self.bindings.remove(index))
    }

    /// Queue an external offset to merge at the next [`Parameter::update`].
    pub fn push_offset(&mut self, offset: Vec2, mode: MergeMode, weight: f64) {
        let mode = match mode {
            MergeMode::Passthrough => self.merge_mode,
            m => m,
        };
        match mode {
            MergeMode::Forced => self.value = offset,
            MergeMode::Weighted => self.additive.push((offset, weight)),
            MergeMode::Multiplicative => self.multiplicative.push(offset),
            MergeMode::Additive | MergeMode::Passthrough => self.additive.push((offset, 1.0)),
        }
    }

    /// Merge pushed offsets and address the result.
    ///
    /// Returns the `(left keypoint, fraction)` pair every binding should be sampled at, or `None`
    /// for an inactive parameter.
    pub fn update(&mut self) -> Option<(GridIndex, Vec2)> {
        if !self.active {
            return None;
        }
        self.previous = self.latest;
        let sum = self
            .additive
            .iter()
            .fold(Vec2::ZERO, |acc, (v, w)| acc + *v * *w);
        let mul = if self.multiplicative.is_empty() {
            Vec2::new(1.0, 1.0)
        } else {
            let n = self.multiplicative.len() as f64;
            self.multiplicative.iter().fold(Vec2::ZERO, |acc, v| acc + *v) / n
        };
        self.latest = Vec2::new(
            (self.value.x + sum.x) * mul.x,
            (self.value.y + sum.y) * mul.y,
        );
        self.additive.clear();
        self.multiplicative.clear();

        let norm = |v: f64, lo: f64, hi: f64| {
            let r = hi - lo;
            if r == 0.0 { 0.0 } else { ((v - lo) / r).clamp(0.0, 1.0) }
        };
        let mapped = Vec2::new(
            norm(self.latest.x, self.min.x, self.max.x),
            norm(self.latest.y, self.min.y, self.max.y),
        );
        Some(self.axes.find_offset(mapped))
    }

    /// `true` if the last update moved the merged value.
    pub fn value_changed(&self) -> bool {
        self.latest != self.previous
    }

    /// Sample every binding at an addressing pair.
    pub fn sample_bindings(&self, left: GridIndex, offset: Vec2) -> Vec<(TargetId, &str, BoundValue)> {
        self.bindings
            .iter()
            .map(|b| (b.target(), b.name(), b.sample(&self.axes, left, offset)))
            .collect()
    }

    /// Persist as a key/value document, bindings included.
    pub fn to_document(&self) -> DeformResult<serde_json::Value> {
        let bindings = self
            .bindings
            .iter()
            .map(AnyBinding::to_document)
            .collect::<DeformResult<Vec<_>>>()?;
        let doc = ParameterDoc {
            uuid: self.id,
            name: self.name.clone(),
            is_vec2: self.is_vec2(),
            active: self.active,
            defaults: [self.defaults.x, self.defaults.y],
            min: [self.min.x, self.min.y],
            max: [self.max.x, self.max.y],
            merge_mode: self.merge_mode,
            axis_points: self.axes.points.clone(),
            bindings,
        };
        Ok(serde_json::to_value(doc)?)
    }

    /// Restore from a document produced by [`Parameter::to_document`].
    pub fn from_document(value: &serde_json::Value) -> DeformResult<Self> {
        let doc: ParameterDoc = serde_json::from_value(value.clone())?;
        let [x, y] = doc.axis_points;
        let axes = ParamAxes::with_points(x, y, doc.is_vec2)?;
        let mut p = Self::new(doc.uuid, doc.name, doc.is_vec2)
            .with_axes(axes)
            .with_range(Vec2::new(doc.min[0], doc.min[1]), Vec2::new(doc.max[0], doc.max[1]))?;
        p.active = doc.active;
        p.merge_mode = doc.merge_mode;
        p.defaults = Vec2::new(doc.defaults[0], doc.defaults[1]);
        p.value = p.defaults;
        for b in &doc.bindings {
            let binding = AnyBinding::from_document(b, &p.axes)?;
            p.bindings.push(binding);
        }
        Ok(p)
    }
}

fn default_true() -> bool {
    true
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ParameterDoc {
    uuid: u32,
    name: String,
    is_vec2: bool,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    defaults: [f64; 2],
    min: [f64; 2],
    max: [f64; 2],
    #[serde(default)]
    merge_mode: MergeMode,
    axis_points: [Vec<f64>; 2],
    #[serde(default)]
    bindings: Vec<serde_json::Value>,
}

#[cfg(test)]
#[path = "../../tests/unit/param/parameter.rs"]
mod tests;
