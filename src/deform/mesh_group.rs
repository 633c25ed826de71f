use crate::config::EngineConfig;
use crate::deform::contract::{
    DeformOutcome, Deformer, HookPhase, LocalFrame, MESH_GROUP_STAGE, NotifyReason, TargetInfo,
    TargetKind,
};
use crate::foundation::core::{Affine, DeformerId, TargetId, Vec2, Vec2Array};
use crate::foundation::diag::{Diagnostics, InvalidRecord};
use crate::foundation::error::{DeformError, DeformResult};

#[derive(Clone, Copy, Debug, PartialEq)]
struct TriangleMap {
    // Rest-space point -> (u, v) along the two edges out of the first corner.
    offset: Affine,
    // Rest-space point -> deformed point.
    transform: Affine,
}

fn sign(p1: Vec2, p2: Vec2, p3: Vec2) -> f64 {
    (p1.x - p3.x) * (p2.y - p3.y) - (p2.x - p3.x) * (p1.y - p3.y)
}

// Edges and corners count as inside for either winding.
fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let (d1, d2, d3) = (sign(p, a, b), sign(p, b, c), sign(p, c, a));
    let neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(neg && pos)
}

fn is_degenerate(a: Vec2, b: Vec2, c: Vec2) -> bool {
    sign(a, b, c) == 0.0
}

fn bounds_of(points: impl Iterator<Item = Vec2>) -> (Vec2, Vec2) {
    let mut min = Vec2::new(f64::INFINITY, f64::INFINITY);
    let mut max = Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min = Vec2::new(min.x.min(p.x), min.y.min(p.y));
        max = Vec2::new(max.x.max(p.x), max.y.max(p.y));
    }
    (
        Vec2::new(min.x.floor(), min.y.floor()),
        Vec2::new(max.x.ceil(), max.y.ceil()),
    )
}

/// Map from a rest triangle to its local `(u, v)` edge coordinates.
fn edge_frame(p1: Vec2, p2: Vec2, p3: Vec2) -> Affine {
    let e0 = p2 - p1;
    let e1 = p3 - p1;
    let (len0, len1) = (e0.hypot(), e1.hypot());
    let a0 = if len0 != 0.0 { e0 / len0 } else { e0 };
    let a1 = if len1 != 0.0 { e1 / len1 } else { e1 };
    let cos = a0.dot(a1);
    let sin = a0.cross(a1);

    let scale = Affine::new([
        if len0 > 0.0 { 1.0 / len0 } else { 0.0 },
        0.0,
        0.0,
        if len1 > 0.0 { 1.0 / len1 } else { 0.0 },
        0.0,
        0.0,
    ]);
    let (shear_xy, shear_yy) = if sin != 0.0 {
        (-cos / sin, 1.0 / sin)
    } else {
        (0.0, 0.0)
    };
    let shear = Affine::new([1.0, 0.0, shear_xy, shear_yy, 0.0, 0.0]);
    let rot = Affine::new([a0.x, -a0.y, a0.y, a0.x, 0.0, 0.0]);
    let translate = Affine::translate(-p1);
    scale * shear * rot * translate
}

/// Deformer that carries targets along with a triangle mesh.
///
/// Every rest-space point inside the mesh bounds belongs to at most one triangle (looked up in a
/// rasterized ownership mask) and is moved by that triangle's affine map. Meshes whose bounds
/// exceed `max_mask_cells` skip the mask and test the triangles directly, last triangle first.
#[derive(Clone, Debug)]
pub struct MeshGroupDeformer {
    id: DeformerId,
    world: Affine,
    vertices: Vec2Array,
    indices: Vec<u32>,
    deformation: Vec2Array,
    /// Sample targets at their deformed position and hook deformables post-transform.
    pub dynamic: bool,
    /// Hook plain nodes so their translation follows the mesh.
    pub translate_children: bool,
    triangles: Vec<TriangleMap>,
    mask: Vec<u32>,
    mask_width: usize,
    mask_height: usize,
    masked: bool,
    min: Vec2,
    max: Vec2,
    precalculated: bool,
    large_offset_warning: f64,
    max_mask_cells: usize,
    diag: Diagnostics,
}

impl MeshGroupDeformer {
    /// Deformer without a mesh; it leaves every target unchanged until [`Self::rebuffer`].
    pub fn new(id: DeformerId, config: &EngineConfig) -> Self {
        Self {
            id,
            world: Affine::IDENTITY,
            vertices: Vec2Array::new(),
            indices: Vec::new(),
            deformation: Vec2Array::new(),
            dynamic: false,
            translate_children: true,
            triangles: Vec::new(),
            mask: Vec::new(),
            mask_width: 0,
            mask_height: 0,
            masked: false,
            min: Vec2::ZERO,
            max: Vec2::ZERO,
            precalculated: false,
            large_offset_warning: config.large_offset_warning,
            max_mask_cells: config.max_mask_cells,
            diag: Diagnostics::new(config.debug_trace),
        }
    }

    /// Mesh vertices in deformer space.
    pub fn vertices(&self) -> &Vec2Array {
        &self.vertices
    }

    /// Triangle list, three indices per triangle.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Current per-vertex deformation.
    pub fn deformation(&self) -> &Vec2Array {
        &self.deformation
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether the triangle frames (and the ownership mask, if it fits) are built.
    pub fn is_precalculated(&self) -> bool {
        self.precalculated
    }

    /// Whether owners come from the rasterized mask rather than a per-triangle search.
    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Floored minimum and ceiled maximum of the rest mesh.
    pub fn bounds(&self) -> (Vec2, Vec2) {
        (self.min, self.max)
    }

    /// Recent invalid values seen by this deformer.
    pub fn invalid_records(&self) -> impl Iterator<Item = &InvalidRecord> {
        self.diag.records()
    }

    /// Replace the mesh. Indices must come in triples and reference existing vertices.
    pub fn rebuffer(&mut self, vertices: Vec2Array, indices: Vec<u32>) -> DeformResult<()> {
        if indices.len() % 3 != 0 {
            return Err(DeformError::validation(format!(
                "mesh index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(DeformError::validation(format!(
                "mesh index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }
        if let Some(i) = vertices.first_non_finite() {
            return Err(DeformError::numeric(format!("mesh vertex {i} is not finite")));
        }
        self.deformation = Vec2Array::zeros(vertices.len());
        self.vertices = vertices;
        self.indices = indices;
        self.triangles.clear();
        self.mask.clear();
        self.masked = false;
        self.precalculated = false;
        self.diag.reset();
        Ok(())
    }

    fn corners(&self, tri: usize, points: &Vec2Array) -> [Vec2; 3] {
        let base = tri * 3;
        [0, 1, 2].map(|k| points.at(self.indices[base + k] as usize))
    }

    /// Build the per-triangle rest frames and the ownership mask.
    #[tracing::instrument(skip(self), fields(deformer = self.id.0, triangles = self.triangle_count()))]
    pub fn precalculate(&mut self) {
        self.triangles.clear();
        self.mask.clear();
        self.precalculated = false;
        self.masked = false;
        if self.triangle_count() == 0 {
            return;
        }
        let (min, max) = bounds_of(self.vertices.iter());
        self.min = min;
        self.max = max;
        let (width, height) = (max.x - min.x + 1.0, max.y - min.y + 1.0);
        self.masked = width * height <= self.max_mask_cells as f64;
        if self.masked {
            self.mask_width = width as usize;
            self.mask_height = height as usize;
            self.mask = vec![0; self.mask_width * self.mask_height];
        } else {
            tracing::debug!(
                deformer = self.id.0,
                cells = width * height,
                limit = self.max_mask_cells,
                "mesh group bounds exceed mask limit, searching triangles per point"
            );
            self.mask_width = 0;
            self.mask_height = 0;
        }

        for tri in 0..self.triangle_count() {
            let [p1, p2, p3] = self.corners(tri, &self.vertices);
            self.triangles.push(TriangleMap {
                offset: edge_frame(p1, p2, p3),
                transform: Affine::IDENTITY,
            });
            if !self.masked || is_degenerate(p1, p2, p3) {
                continue;
            }

            // Later triangles overwrite shared edge cells.
            let (tmin, tmax) = bounds_of([p1, p2, p3].into_iter());
            let (left, top) = (tmin.x as i64, tmin.y as i64);
            let width = (tmax.x - tmin.x) as i64 + 1;
            let height = (tmax.y - tmin.y) as i64 + 1;
            for y in 0..height {
                for x in 0..width {
                    let pt = Vec2::new((left + x) as f64, (top + y) as f64);
                    if !point_in_triangle(pt, p1, p2, p3) {
                        continue;
                    }
                    let mx = (pt.x - min.x) as usize;
                    let my = (pt.y - min.y) as usize;
                    if let Some(cell) = self.mask.get_mut(my * self.mask_width + mx) {
                        *cell = tri as u32 + 1;
                    }
                }
            }
        }
        self.precalculated = true;
        self.update_triangles();
    }

    /// Refresh every triangle's live map from the current deformation.
    pub fn update_triangles(&mut self) {
        let live = self.vertices.added(&self.deformation);
        for tri in 0..self.triangles.len() {
            let [p1, p2, p3] = self.corners(tri, &live);
            let (e0, e1) = (p2 - p1, p3 - p1);
            let basis = Affine::new([e0.x, e0.y, e1.x, e1.y, p1.x, p1.y]);
            let map = &mut self.triangles[tri];
            map.transform = basis * map.offset;
        }
    }

    /// 0-based index of the triangle owning rest-space point `p`.
    pub fn owner_of(&self, p: Vec2) -> Option<usize> {
        if !(p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y) {
            return None;
        }
        let mx = (p.x - self.min.x).floor();
        let my = (p.y - self.min.y).floor();
        if !self.masked {
            let cell = Vec2::new(self.min.x + mx, self.min.y + my);
            return (0..self.triangles.len()).rev().find(|&tri| {
                let [a, b, c] = self.corners(tri, &self.vertices);
                !is_degenerate(a, b, c) && point_in_triangle(cell, a, b, c)
            });
        }
        let (mx, my) = (mx as usize, my as usize);
        if mx >= self.mask_width || my >= self.mask_height {
            return None;
        }
        match self.mask.get(my * self.mask_width + mx) {
            Some(&bit) if bit > 0 && (bit as usize) <= self.triangles.len() => Some(bit as usize - 1),
            _ => None,
        }
    }

    fn deform_inner(
        &mut self,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &Vec2Array,
        transform: Affine,
    ) -> DeformOutcome {
        match target.kind {
            TargetKind::PathDeformer {
                physics_enabled: false,
            }
            | TargetKind::MeshGroup => return DeformOutcome::unchanged(),
            _ => {}
        }
        if !self.precalculated {
            self.precalculate();
        }
        if self.triangles.is_empty() || vertices.is_empty() {
            return DeformOutcome::unchanged();
        }
        let Some(frame) = LocalFrame::new(self.world, transform) else {
            self.diag.record("meshGroup:centerMatrix", 0, Vec2::ZERO);
            return DeformOutcome::unchanged();
        };
        let dynamic = (self.dynamic && !deformation.is_empty()).then_some(deformation);
        let sample = frame.sample(vertices, dynamic);

        let mut offsets = Vec2Array::zeros(sample.len());
        let mut any = false;
        for (i, p) in sample.iter().enumerate() {
            let Some(tri) = self.owner_of(p) else {
                continue;
            };
            let mapped = (self.triangles[tri].transform * p.to_point()).to_vec2();
            let offset = mapped - p;
            if !offset.is_finite() {
                self.diag.record("meshGroup:offsetNaN", i, offset);
                continue;
            }
            if offset != Vec2::ZERO {
                offsets.set(i, offset);
                any = true;
            }
        }
        if !any {
            return DeformOutcome::unchanged();
        }
        let out = frame.emit(deformation, &offsets);
        let max_abs = out.max_abs();
        if max_abs > self.large_offset_warning {
            tracing::warn!(
                deformer = self.id.0,
                target = target.id.0,
                max_abs,
                "large mesh group offset"
            );
        }
        DeformOutcome::changed(out)
    }
}

impl Deformer for MeshGroupDeformer {
    fn id(&self) -> DeformerId {
        self.id
    }

    fn stage(&self) -> u8 {
        MESH_GROUP_STAGE
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
        let deformable = kind.is_deformable();
        if deformable && self.dynamic {
            Some(HookPhase::Post)
        } else if deformable || self.translate_children {
            Some(HookPhase::Pre)
        } else {
            None
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
                "mesh group payload length mismatch ignored"
            );
            return;
        }
        let mut offsets = offsets.clone();
        offsets.zero_non_finite();
        self.deformation = offsets;
        if self.precalculated {
            self.update_triangles();
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(serde::Serialize, serde::Deserialize)]
struct MeshDoc {
    vertices: Vec2Array,
    indices: Vec<u32>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct MeshGroupDoc {
    #[serde(default)]
    dynamic_deformation: bool,
    #[serde(default = "default_true")]
    translate_children: bool,
    mesh: MeshDoc,
}

impl MeshGroupDeformer {
    /// Persist as a key/value document.
    pub fn to_document(&self) -> DeformResult<serde_json::Value> {
        let doc = MeshGroupDoc {
            dynamic_deformation: self.dynamic,
            translate_children: self.translate_children,
            mesh: MeshDoc {
                vertices: self.vertices.clone(),
                indices: self.indices.clone(),
            },
        };
        Ok(serde_json::to_value(doc)?)
    }

    /// Restore from a document; the mesh is validated like [`Self::rebuffer`].
    pub fn from_document(
        value: &serde_json::Value,
        id: DeformerId,
        config: &EngineConfig,
    ) -> DeformResult<Self> {
        let doc: MeshGroupDoc = serde_json::from_value(value.clone())?;
        let mut group = Self::new(id, config);
        group.rebuffer(doc.mesh.vertices, doc.mesh.indices)?;
        group.dynamic = doc.dynamic_deformation;
        group.translate_children = doc.translate_children;
        Ok(group)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/deform/mesh_group.rs"]
mod tests;
