use crate::config::EngineConfig;
use crate::deform::contract::{
    DeformOutcome, Deformer, GRID_STAGE, HookPhase, LocalFrame, NotifyReason, TargetInfo,
    TargetKind,
};
use crate::foundation::core::{Affine, DeformerId, TargetId, Vec2, Vec2Array};
use crate::foundation::diag::{Diagnostics, InvalidRecord};
use crate::foundation::error::{DeformError, DeformResult};

/// Axis values closer than this are merged.
pub const AXIS_TOLERANCE: f64 = 1e-4;
/// Cell weights this close to 0 or 1 snap onto the cell edge.
pub const BOUNDARY_TOLERANCE: f64 = 1e-4;

const DEFAULT_AXIS: [f64; 2] = [-0.5, 0.5];

/// Interpolation scheme of a grid deformer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GridFormation {
    /// Bilinear interpolation inside each cell.
    #[default]
    Bilinear,
}

/// Sorted, de-duplicated axis values. Non-finite values are dropped.
pub fn normalize_axis(values: &[f64]) -> Vec<f64> {
    let mut axis: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    axis.sort_by(f64::total_cmp);
    axis.dedup_by(|cur, kept| (*cur - *kept).abs() <= AXIS_TOLERANCE);
    axis
}

fn axis_index_of(axis: &[f64], value: f64) -> Option<usize> {
    axis.iter().position(|a| (a - value).abs() <= AXIS_TOLERANCE)
}

/// Cell and weight of `value` on `axis`: the first `i` with `value <= axis[i + 1]`.
fn locate_interval(axis: &[f64], value: f64) -> Option<(usize, f64)> {
    let n = axis.len();
    if n < 2 || !value.is_finite() {
        return None;
    }
    let i = (0..n - 1).find(|&i| value <= axis[i + 1]).unwrap_or(n - 2);
    let span = axis[i + 1] - axis[i];
    let w = if span > 0.0 {
        ((value - axis[i]) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Some((i, w))
}

fn snap(w: f64) -> f64 {
    if w < BOUNDARY_TOLERANCE {
        0.0
    } else if w > 1.0 - BOUNDARY_TOLERANCE {
        1.0
    } else {
        w
    }
}

/// A located sample: cell indices plus in-cell weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridCell {
    /// Column of the cell's left edge.
    pub x: usize,
    /// Row of the cell's top edge.
    pub y: usize,
    /// Horizontal weight in `[0, 1]`.
    pub u: f64,
    /// Vertical weight in `[0, 1]`.
    pub v: f64,
}

impl GridCell {
    fn weights(&self) -> [f64; 4] {
        let (u, v) = (self.u, self.v);
        [(1.0 - u) * (1.0 - v), u * (1.0 - v), (1.0 - u) * v, u * v]
    }
}

/// Deformer that moves targets through a rectangular lattice of control points.
///
/// Vertices are stored row-major: vertex `(x, y)` lives at `y * cols + x`.
#[derive(Clone, Debug)]
pub struct GridDeformer {
    id: DeformerId,
    world: Affine,
    axis_x: Vec<f64>,
    axis_y: Vec<f64>,
    vertices: Vec2Array,
    deformation: Vec2Array,
    formation: GridFormation,
    /// Sample targets at their deformed position and hook deformables post-transform.
    pub dynamic: bool,
    /// Hook plain nodes so their translation follows the grid.
    pub translate_children: bool,
    diag: Diagnostics,
}

impl GridDeformer {
    /// A 2x2 grid over the default unit axes.
    pub fn new(id: DeformerId, config: &EngineConfig) -> Self {
        let mut grid = Self {
            id,
            world: Affine::IDENTITY,
            axis_x: Vec::new(),
            axis_y: Vec::new(),
            vertices: Vec2Array::new(),
            deformation: Vec2Array::new(),
            formation: GridFormation::Bilinear,
            dynamic: false,
            translate_children: true,
            diag: Diagnostics::new(config.debug_trace),
        };
        grid.set_grid_axes(&DEFAULT_AXIS, &DEFAULT_AXIS);
        grid
    }

    /// Column positions.
    pub fn axis_x(&self) -> &[f64] {
        &self.axis_x
    }

    /// Row positions.
    pub fn axis_y(&self) -> &[f64] {
        &self.axis_y
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.axis_x.len()
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.axis_y.len()
    }

    /// Lattice positions, row-major.
    pub fn vertices(&self) -> &Vec2Array {
        &self.vertices
    }

    /// Current per-vertex deformation.
    pub fn deformation(&self) -> &Vec2Array {
        &self.deformation
    }

    /// Interpolation scheme.
    pub fn formation(&self) -> GridFormation {
        self.formation
    }

    /// Recent invalid values seen by this deformer.
    pub fn invalid_records(&self) -> impl Iterator<Item = &InvalidRecord> {
        self.diag.records()
    }

    fn has_valid_grid(&self) -> bool {
        self.axis_x.len() >= 2
            && self.axis_y.len() >= 2
            && self.vertices.len() == self.axis_x.len() * self.axis_y.len()
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.cols() + x
    }

    /// Replace both axes. An axis with fewer than two distinct values falls back to the default.
    /// Vertices are rebuilt and the deformation is zeroed.
    pub fn set_grid_axes(&mut self, xs: &[f64], ys: &[f64]) {
        let fallback = |axis: Vec<f64>| {
            if axis.len() >= 2 {
                axis
            } else {
                DEFAULT_AXIS.to_vec()
            }
        };
        self.axis_x = fallback(normalize_axis(xs));
        self.axis_y = fallback(normalize_axis(ys));
        let mut vertices = Vec2Array::new();
        for &y in &self.axis_y {
            for &x in &self.axis_x {
                vertices.push(Vec2::new(x, y));
            }
        }
        self.deformation = Vec2Array::zeros(vertices.len());
        self.vertices = vertices;
    }

    /// Axes of a complete lattice: at least four points, `xs * ys == n`, every cell covered once.
    pub fn derive_axes(points: &Vec2Array) -> Option<(Vec<f64>, Vec<f64>)> {
        let n = points.len();
        if n < 4 {
            return None;
        }
        let xs = normalize_axis(points.xs());
        let ys = normalize_axis(points.ys());
        if xs.len() < 2 || ys.len() < 2 || xs.len() * ys.len() != n {
            return None;
        }
        let mut covered = vec![false; n];
        for p in points.iter() {
            let ix = axis_index_of(&xs, p.x)?;
            let iy = axis_index_of(&ys, p.y)?;
            let slot = &mut covered[iy * xs.len() + ix];
            if *slot {
                return None;
            }
            *slot = true;
        }
        Some((xs, ys))
    }

    /// Rebuild the lattice from a point set; anything but a complete lattice resets to the
    /// default axes.
    #[tracing::instrument(skip(self, points), fields(points = points.len()))]
    pub fn rebuffer(&mut self, points: &Vec2Array) {
        if !self.adopt_from_vertices(points, false) {
            if !points.is_empty() {
                tracing::debug!(points = points.len(), "grid points do not form a lattice");
            }
            self.set_grid_axes(&DEFAULT_AXIS, &DEFAULT_AXIS);
        }
        self.diag.reset();
    }

    /// Set the deformation of lattice vertex `(x, y)`. Returns `false` out of range or for a
    /// non-finite offset.
    pub fn set_point_deformation(&mut self, x: usize, y: usize, offset: Vec2) -> bool {
        if x >= self.cols() || y >= self.rows() || !offset.is_finite() {
            return false;
        }
        let idx = self.index(x, y);
        self.deformation.set(idx, offset);
        true
    }

    /// Match every point onto its lattice vertex (within [`AXIS_TOLERANCE`]) and store
    /// `point - vertex`. Unless every vertex is matched, the deformation is zeroed and `false`
    /// is returned.
    pub fn fill_deformation_from_positions(&mut self, points: &Vec2Array) -> bool {
        let n = self.vertices.len();
        let filled = (points.len() == n)
            .then(|| self.match_positions(points))
            .flatten();
        match filled {
            Some(deformation) => {
                self.deformation = deformation;
                true
            }
            None => {
                self.deformation = Vec2Array::zeros(n);
                false
            }
        }
    }

    fn match_positions(&self, points: &Vec2Array) -> Option<Vec2Array> {
        let mut out = Vec2Array::zeros(self.vertices.len());
        let mut seen = vec![false; self.vertices.len()];
        for p in points.iter() {
            let ix = axis_index_of(&self.axis_x, p.x)?;
            let iy = axis_index_of(&self.axis_y, p.y)?;
            let idx = self.index(ix, iy);
            out.set(idx, p - self.vertices.at(idx));
            seen[idx] = true;
        }
        seen.iter().all(|&s| s).then_some(out)
    }

    /// Adopt the lattice formed by `points`. With `preserve_shape` the deformation is filled from
    /// the same points. Returns `false` (leaving the axes untouched) if no lattice is found.
    pub fn adopt_from_vertices(&mut self, points: &Vec2Array, preserve_shape: bool) -> bool {
        let Some((xs, ys)) = Self::derive_axes(points) else {
            return false;
        };
        self.set_grid_axes(&xs, &ys);
        !preserve_shape || self.fill_deformation_from_positions(points)
    }

    /// Clamp `p` into the grid box and locate its cell.
    pub fn locate(&self, p: Vec2) -> Option<GridCell> {
        if !self.has_valid_grid() || !p.is_finite() {
            return None;
        }
        let (xs, ys) = (&self.axis_x, &self.axis_y);
        let px = p.x.clamp(xs[0], xs[xs.len() - 1]);
        let py = p.y.clamp(ys[0], ys[ys.len() - 1]);
        let (x, u) = locate_interval(xs, px)?;
        let (y, v) = locate_interval(ys, py)?;
        Some(GridCell {
            x,
            y,
            u: snap(u),
            v: snap(v),
        })
    }

    fn corners(&self, cell: &GridCell, with_deformation: bool) -> [Vec2; 4] {
        let idx = [
            self.index(cell.x, cell.y),
            self.index(cell.x + 1, cell.y),
            self.index(cell.x, cell.y + 1),
            self.index(cell.x + 1, cell.y + 1),
        ];
        idx.map(|i| {
            if with_deformation {
                self.vertices.at(i) + self.deformation.at(i)
            } else {
                self.vertices.at(i)
            }
        })
    }

    /// Bilinear position inside `cell`.
    pub(crate) fn sample_cell(&self, cell: &GridCell, with_deformation: bool) -> Vec2 {
        let w = cell.weights();
        let c = self.corners(cell, with_deformation);
        Vec2::new(
            w[0] * c[0].x + w[1] * c[1].x + w[2] * c[2].x + w[3] * c[3].x,
            w[0] * c[0].y + w[1] * c[1].y + w[2] * c[2].y + w[3] * c[3].y,
        )
    }

    /// Bilinear positions for many cells, four lanes at a time. Missing cells yield zero.
    pub(crate) fn sample_cells(&self, cells: &[Option<GridCell>], with_deformation: bool) -> Vec2Array {
        let mut out = Vec2Array::zeros(cells.len());
        let mut chunks = cells.chunks_exact(4);
        let mut base = 0;
        for chunk in &mut chunks {
            let mut w = [[0.0; 4]; 4];
            let mut c = [[Vec2::ZERO; 4]; 4];
            let mut valid = [false; 4];
            for (lane, cell) in chunk.iter().enumerate() {
                if let Some(cell) = cell {
                    w[lane] = cell.weights();
                    c[lane] = self.corners(cell, with_deformation);
                    valid[lane] = true;
                }
            }
            let mut x = [0.0; 4];
            let mut y = [0.0; 4];
            for lane in 0..4 {
                let (w, c) = (&w[lane], &c[lane]);
                x[lane] = w[0] * c[0].x + w[1] * c[1].x + w[2] * c[2].x + w[3] * c[3].x;
                y[lane] = w[0] * c[0].y + w[1] * c[1].y + w[2] * c[2].y + w[3] * c[3].y;
            }
            for lane in 0..4 {
                if valid[lane] {
                    out.set(base + lane, Vec2::new(x[lane], y[lane]));
                }
            }
            base += 4;
        }
        for (k, cell) in chunks.remainder().iter().enumerate() {
            if let Some(cell) = cell {
                out.set(base + k, self.sample_cell(cell, with_deformation));
            }
        }
        out
    }

    fn deform_inner(
        &mut self,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &Vec2Array,
        transform: Affine,
    ) -> DeformOutcome {
        if !self.has_valid_grid() || vertices.is_empty() {
            return DeformOutcome::unchanged();
        }
        if let TargetKind::PathDeformer {
            physics_enabled: false,
        } = target.kind
        {
            return DeformOutcome::unchanged();
        }
        let Some(frame) = LocalFrame::new(self.world, transform) else {
            self.diag.record("grid:centerMatrix", 0, Vec2::ZERO);
            return DeformOutcome::unchanged();
        };
        let dynamic = (self.dynamic && !deformation.is_empty()).then_some(deformation);
        let sample = frame.sample(vertices, dynamic);
        if let Some(i) = sample.first_non_finite() {
            self.diag.record("grid:sampleNaN", i, sample.at(i));
            return DeformOutcome::unchanged();
        }

        let cells: Vec<Option<GridCell>> = sample.iter().map(|p| self.locate(p)).collect();
        let pre = self.sample_cells(&cells, false);
        let post = self.sample_cells(&cells, true);
        let mut offsets = post.subtracted(&pre);
        for (i, v) in offsets.iter().enumerate() {
            if !v.is_finite() {
                self.diag.record("grid:offsetNaN", i, v);
            }
        }
        offsets.zero_non_finite();
        if offsets.is_all_zero() {
            return DeformOutcome::unchanged();
        }
        DeformOutcome::changed(frame.emit(deformation, &offsets))
    }
}

impl Deformer for GridDeformer {
    fn id(&self) -> DeformerId {
        self.id
    }

    fn stage(&self) -> u8 {
        GRID_STAGE
    }

    fn world_transform(&self) -> Affine {
        self.world
    }

    fn set_world_transform(&mut self, world: Affine) {
        self.world = world;
    }

    fn deform(
        &mut self,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &Vec2Array,
        transform: Affine,
    ) -> DeformOutcome {
        let opened = self.diag.begin_frame();
        let out = self.deform_inner(target, vertices, deformation, transform);
        if opened {
            self.diag.end_frame();
        }
        out
    }

    fn notify(&mut self, _target: TargetId, _reason: NotifyReason) {}

    fn hook_phase(&self, kind: TargetKind) -> Option<HookPhase> {
        match kind {
            TargetKind::PropagatingComposite => None,
            k if k.is_deformable() => Some(if self.dynamic {
                HookPhase::Post
            } else {
                HookPhase::Pre
            }),
            _ => self.translate_children.then_some(HookPhase::Pre),
        }
    }

    fn payload_len(&self) -> usize {
        self.vertices.len()
    }

    fn apply_payload(&mut self, offsets: &Vec2Array) {
        if offsets.len() != self.vertices.len() {
            tracing::debug!(
                got = offsets.len(),
                want = self.vertices.len(),
                "grid payload length mismatch ignored"
            );
            return;
        }
        let mut offsets = offsets.clone();
        offsets.zero_non_finite();
        self.deformation = offsets;
    }
}

fn default_true() -> bool {
    true
}

#[derive(serde::Serialize, serde::Deserialize)]
struct GridDoc {
    grid_axis_x: Vec<f64>,
    grid_axis_y: Vec<f64>,
    #[serde(default)]
    formation: GridFormation,
    #[serde(default)]
    dynamic: bool,
    #[serde(default = "default_true")]
    translate_children: bool,
}

impl GridDeformer {
    /// Persist as a key/value document.
    pub fn to_document(&self) -> DeformResult<serde_json::Value> {
        let doc = GridDoc {
            grid_axis_x: self.axis_x.clone(),
            grid_axis_y: self.axis_y.clone(),
            formation: self.formation,
            dynamic: self.dynamic,
            translate_children: self.translate_children,
        };
        Ok(serde_json::to_value(doc)?)
    }

    /// Restore from a document. Axes must have at least two distinct values each.
    pub fn from_document(
        value: &serde_json::Value,
        id: DeformerId,
        config: &EngineConfig,
    ) -> DeformResult<Self> {
        let doc: GridDoc = serde_json::from_value(value.clone())?;
        if normalize_axis(&doc.grid_axis_x).len() < 2 || normalize_axis(&doc.grid_axis_y).len() < 2 {
            return Err(DeformError::validation(
                "grid axes need at least two distinct values",
            ));
        }
        let mut grid = Self::new(id, config);
        grid.set_grid_axes(&doc.grid_axis_x, &doc.grid_axis_y);
        grid.formation = doc.formation;
        grid.dynamic = doc.dynamic;
        grid.translate_children = doc.translate_children;
        Ok(grid)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/deform/grid.rs"]
mod tests;
