use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::foundation::core::{TargetId, Vec2, Vec2Array};
use crate::foundation::error::{DeformError, DeformResult};
use crate::param::grid::{BindingGrid, GridIndex, InterpolateMode};
use crate::param::parameter::ParamAxes;
use crate::param::value::{DeformSlot, GridValue, ValueAxis};

/// Name under which deformation payload bindings are stored.
pub const DEFORM_BINDING_NAME: &str = "deform";

/// Keyed values of one target property across a parameter's keypoint grid.
///
/// A binding never holds a reference to its parameter: every operation that depends on the axes
/// takes them explicitly, and every mutation re-interpolates the grid before returning.
/// Out-of-range cells are silently ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding<T> {
    target: TargetId,
    name: String,
    mode: InterpolateMode,
    default: T,
    grid: BindingGrid<T>,
}

/// Scalar property binding.
pub type ValueBinding = Binding<f64>;
/// Per-vertex deformation binding.
pub type DeformBinding = Binding<DeformSlot>;

impl<T: GridValue> Binding<T> {
    /// Empty binding sized for `axes`, every cell at `default`.
    pub fn new(target: TargetId, name: impl Into<String>, default: T, axes: &ParamAxes) -> Self {
        let grid = BindingGrid::new(axes.count(0), axes.count(1), &default);
        Self {
            target,
            name: name.into(),
            mode: InterpolateMode::default(),
            default,
            grid,
        }
    }

    /// Bound target.
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Bound property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sampling mode.
    pub fn mode(&self) -> InterpolateMode {
        self.mode
    }

    /// Change the sampling mode.
    pub fn set_mode(&mut self, mode: InterpolateMode) {
        self.mode = mode;
    }

    /// Value unauthored cells fall back to.
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Replace the fallback value (e.g. after the target's vertex count changed).
    pub fn set_default(&mut self, axes: &ParamAxes, default: T) {
        self.default = default;
        self.re_interpolate(axes);
    }

    /// Underlying grid.
    pub fn grid(&self) -> &BindingGrid<T> {
        &self.grid
    }

    /// Drop every authored value.
    pub fn clear(&mut self, axes: &ParamAxes) {
        self.grid.clear(axes.count(0), axes.count(1), &self.default);
    }

    /// `true` if the cell was explicitly authored.
    pub fn is_set(&self, p: GridIndex) -> bool {
        self.grid.is_set(p)
    }

    /// Current (authored or interpolated) value of a cell.
    pub fn value_at(&self, p: GridIndex) -> Option<&T> {
        self.grid.value(p)
    }

    /// Number of authored cells.
    pub fn set_count(&self) -> usize {
        self.grid.set_count()
    }

    /// Mark the cell's present value as authored.
    pub fn set_current(&mut self, axes: &ParamAxes, p: GridIndex) {
        if !self.grid.contains(p) {
            return;
        }
        self.grid.mark(p, true);
        self.re_interpolate(axes);
    }

    /// Reset a cell to the default and mark it unauthored.
    pub fn unset(&mut self, axes: &ParamAxes, p: GridIndex) {
        if !self.grid.contains(p) {
            return;
        }
        self.grid.put(p, self.default.clone(), false);
        self.re_interpolate(axes);
    }

    /// Reset a cell to the default and mark it authored.
    pub fn reset(&mut self, axes: &ParamAxes, p: GridIndex) {
        if !self.grid.contains(p) {
            return;
        }
        self.grid.put(p, self.default.clone(), true);
        self.re_interpolate(axes);
    }

    /// Author a value.
    pub fn set_value(&mut self, axes: &ParamAxes, p: GridIndex, value: T) {
        if !self.grid.contains(p) {
            return;
        }
        self.grid.put(p, value, true);
        self.re_interpolate(axes);
    }

    /// Recompute unauthored cells.
    pub fn re_interpolate(&mut self, axes: &ParamAxes) {
        self.grid
            .re_interpolate(axes.points(0), axes.points(1), &self.default);
    }

    /// Value at `left` keypoint plus fractional `offset`.
    pub fn sample(&self, axes: &ParamAxes, left: GridIndex, offset: Vec2) -> T {
        self.grid
            .sample(self.mode, axes.is_vec2(), left, offset)
            .unwrap_or_else(|| self.default.clone())
    }

    /// Scale an authored value in place along `axis`.
    pub fn scale_value_at(&mut self, axes: &ParamAxes, p: GridIndex, axis: ValueAxis, scale: f64) {
        let Some(cur) = self.grid.value(p) else {
            return;
        };
        let scaled = cur.scale_axis(axis, scale);
        self.set_value(axes, p, scaled);
    }

    /// Author a cell as the negated mirror of the opposite side of the parameter space.
    pub fn extrapolate_value_at(&mut self, axes: &ParamAxes, p: GridIndex, axis: ValueAxis) {
        if !self.grid.contains(p) {
            return;
        }
        let mut offset = axes.keypoint_offset(p);
        match axis {
            ValueAxis::Both => {
                offset.x = 1.0 - offset.x;
                if axes.is_vec2() {
                    offset.y = 1.0 - offset.y;
                }
            }
            ValueAxis::X => offset.x = 1.0 - offset.x,
            ValueAxis::Y => offset.y = 1.0 - offset.y,
        }
        let (src, sub) = axes.find_offset(offset);
        let mirrored = self.sample(axes, src, sub);
        self.set_value(axes, p, mirrored);
        self.scale_value_at(axes, p, axis, -1.0);
    }

    /// Mirror the grid along one axis. Flags follow their values; nothing is re-interpolated.
    pub fn reverse_axis(&mut self, axis: usize) {
        self.grid.reverse_axis(axis);
    }

    /// Move a keypoint row/column; `axes` must already reflect the move.
    pub fn move_keypoints(&mut self, axes: &ParamAxes, axis: usize, old: usize, new: usize) {
        self.grid.move_keypoint(axis, old, new);
        self.re_interpolate(axes);
    }

    /// Insert an unauthored keypoint row/column; `axes` must already contain it.
    pub fn insert_keypoints(&mut self, axes: &ParamAxes, axis: usize, index: usize) {
        self.grid.insert_keypoint(axis, index, &self.default);
        self.re_interpolate(axes);
    }

    /// Delete a keypoint row/column; `axes` must already lack it.
    pub fn delete_keypoints(&mut self, axes: &ParamAxes, axis: usize, index: usize) {
        self.grid.delete_keypoint(axis, index);
        self.re_interpolate(axes);
    }

    /// Copy one cell into another binding; an unauthored source unsets the destination.
    pub fn copy_keypoint_to(
        &self,
        src: GridIndex,
        other: &mut Self,
        other_axes: &ParamAxes,
        dest: GridIndex,
    ) {
        match self.grid.value(src) {
            Some(v) if self.is_set(src) => other.set_value(other_axes, dest, v.clone()),
            _ => other.unset(other_axes, dest),
        }
    }

    /// Exchange one cell (value and flag) with a cell of another binding.
    pub fn swap_keypoint_with(
        &mut self,
        axes: &ParamAxes,
        src: GridIndex,
        other: &mut Self,
        other_axes: &ParamAxes,
        dest: GridIndex,
    ) {
        let (Some(mine), Some(theirs)) = (self.grid.value(src).cloned(), other.grid.value(dest).cloned())
        else {
            return;
        };
        let (mine_set, theirs_set) = (self.is_set(src), other.is_set(dest));
        self.grid.put(src, theirs, theirs_set);
        other.grid.put(dest, mine, mine_set);
        self.re_interpolate(axes);
        other.re_interpolate(other_axes);
    }
}

impl Binding<DeformSlot> {
    /// Rewrite every cell after the target's topology changed.
    ///
    /// With a `remap` matching a cell's length, offsets move to their new index. Otherwise a
    /// `replacement` of exactly `new_len` offsets is authored everywhere, or the cell collapses to
    /// `new_len` zero offsets and becomes unauthored.
    pub fn remap_offsets(
        &mut self,
        axes: &ParamAxes,
        remap: &[usize],
        replacement: &Vec2Array,
        new_len: usize,
    ) {
        self.grid.for_each_value_mut(|_, slot, set| {
            if !remap.is_empty() && remap.len() == slot.len() {
                let mut reordered = Vec2Array::zeros(remap.len());
                for (old, &new) in remap.iter().enumerate() {
                    reordered.set(new, slot.vertex_offsets.at(old));
                }
                slot.vertex_offsets = reordered;
                *set = !slot.is_empty();
            } else if replacement.len() == new_len && new_len > 0 {
                slot.vertex_offsets = replacement.clone();
                *set = true;
            } else {
                *slot = DeformSlot::zeros(new_len);
                *set = false;
            }
        });
        if self.default.len() != new_len {
            self.default = DeformSlot::zeros(new_len);
        }
        self.re_interpolate(axes);
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct BindingDoc<T> {
    node: TargetId,
    param_name: String,
    #[serde(default)]
    interpolate_mode: InterpolateMode,
    #[serde(flatten)]
    grid: BindingGrid<T>,
}

impl<T: GridValue + Serialize + DeserializeOwned> Binding<T> {
    /// Persist as a key/value document.
    pub fn to_document(&self) -> DeformResult<serde_json::Value> {
        let doc = BindingDoc {
            node: self.target,
            param_name: self.name.clone(),
            interpolate_mode: self.mode,
            grid: self.grid.clone(),
        };
        Ok(serde_json::to_value(doc)?)
    }

    /// Restore from a document; the grid must match `axes`.
    pub fn from_document(value: &serde_json::Value, axes: &ParamAxes, default: T) -> DeformResult<Self> {
        let doc: BindingDoc<T> = serde_json::from_value(value.clone())?;
        let want = (axes.count(0), axes.count(1));
        let got = doc.grid.dims();
        let ragged = doc.grid.set_flags().len() != got.0
            || doc.grid.set_flags().iter().any(|c| c.len() != got.1);
        if got != want || ragged {
            return Err(DeformError::validation(format!(
                "binding '{}' grid is {}x{}, parameter axes are {}x{}",
                doc.param_name, got.0, got.1, want.0, want.1
            )));
        }
        Ok(Self {
            target: doc.node,
            name: doc.param_name,
            mode: doc.interpolate_mode,
            default,
            grid: doc.grid,
        })
    }
}

/// A binding of either payload kind, as held by a [`crate::Parameter`].
#[derive(Clone, Debug, PartialEq)]
pub enum AnyBinding {
    /// Scalar property.
    Value(ValueBinding),
    /// Per-vertex deformation.
    Deform(DeformBinding),
}

/// A binding's value sampled at one parameter position.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundValue {
    /// Scalar property value.
    Value(f64),
    /// Deformation payload.
    Deform(DeformSlot),
}

macro_rules! dispatch {
    ($self:expr, $b:ident => $body:expr) => {
        match $self {
            AnyBinding::Value($b) => $body,
            AnyBinding::Deform($b) => $body,
        }
    };
}

impl AnyBinding {
    /// Bound target.
    pub fn target(&self) -> TargetId {
        dispatch!(self, b => b.target())
    }

    /// Bound property name.
    pub fn name(&self) -> &str {
        dispatch!(self, b => b.name())
    }

    /// Number of authored cells.
    pub fn set_count(&self) -> usize {
        dispatch!(self, b => b.set_count())
    }

    /// Grid dimensions.
    pub fn dims(&self) -> (usize, usize) {
        dispatch!(self, b => b.grid().dims())
    }

    /// See [`Binding::is_set`].
    pub fn is_set(&self, p: GridIndex) -> bool {
        dispatch!(self, b => b.is_set(p))
    }

    /// See [`Binding::re_interpolate`].
    pub fn re_interpolate(&mut self, axes: &ParamAxes) {
        dispatch!(self, b => b.re_interpolate(axes))
    }

    /// See [`Binding::reverse_axis`].
    pub fn reverse_axis(&mut self, axis: usize) {
        dispatch!(self, b => b.reverse_axis(axis))
    }

    /// See [`Binding::move_keypoints`].
    pub fn move_keypoints(&mut self, axes: &ParamAxes, axis: usize, old: usize, new: usize) {
        dispatch!(self, b => b.move_keypoints(axes, axis, old, new))
    }

    /// See [`Binding::insert_keypoints`].
    pub fn insert_keypoints(&mut self, axes: &ParamAxes, axis: usize, index: usize) {
        dispatch!(self, b => b.insert_keypoints(axes, axis, index))
    }

    /// See [`Binding::delete_keypoints`].
    pub fn delete_keypoints(&mut self, axes: &ParamAxes, axis: usize, index: usize) {
        dispatch!(self, b => b.delete_keypoints(axes, axis, index))
    }

    /// Sample at an addressing pair.
    pub fn sample(&self, axes: &ParamAxes, left: GridIndex, offset: Vec2) -> BoundValue {
        match self {
            Self::Value(b) => BoundValue::Value(b.sample(axes, left, offset)),
            Self::Deform(b) => BoundValue::Deform(b.sample(axes, left, offset)),
        }
    }

    /// Persist as a key/value document.
    pub fn to_document(&self) -> DeformResult<serde_json::Value> {
        dispatch!(self, b => b.to_document())
    }

    /// Restore from a document; `param_name == "deform"` selects the deformation kind.
    ///
    /// Deformation defaults are zero offsets sized like the first stored cell; scalar defaults
    /// are 0.
    pub fn from_document(value: &serde_json::Value, axes: &ParamAxes) -> DeformResult<Self> {
        let name = value
            .get("param_name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| DeformError::validation("binding document lacks 'param_name'"))?;
        if name == DEFORM_BINDING_NAME {
            let len = value
                .get("values")
                .and_then(|v| v.get(0))
                .and_then(|v| v.get(0))
                .and_then(serde_json::Value::as_array)
                .map_or(0, Vec::len);
            Ok(Self::Deform(Binding::from_document(
                value,
                axes,
                DeformSlot::zeros(len),
            )?))
        } else {
            Ok(Self::Value(Binding::from_document(value, axes, 0.0)?))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/param/binding.rs"]
mod tests;
