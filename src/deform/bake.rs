use crate::deform::contract::{Deformer, TargetInfo};
use crate::foundation::core::{Affine, Vec2, Vec2Array};
use crate::param::binding::DeformBinding;
use crate::param::grid::GridIndex;
use crate::param::parameter::ParamAxes;
use crate::param::value::DeformSlot;

/// Bake a deformer's keyed poses into a target's deformation binding.
///
/// For every keypoint cell the deformer's payload is set to `owner`'s value at that cell (the
/// authored value, or a sample at the cell otherwise), then the target's vertices are deformed
/// starting from `dest`'s value at the same cell. Results that change anything are authored into
/// `dest`. Returns the number of cells written.
///
/// The deformer keeps the payload of the last cell; callers restore it if they need to.
#[tracing::instrument(skip_all, fields(deformer = deformer.id().0, target = target.id.0))]
pub fn transfer_to_binding(
    deformer: &mut dyn Deformer,
    owner: &DeformBinding,
    target: TargetInfo,
    target_vertices: &Vec2Array,
    target_transform: Affine,
    dest: &mut DeformBinding,
    axes: &ParamAxes,
) -> usize {
    let (nx, ny) = (axes.count(0), axes.count(1));
    let vertex_count = target_vertices.len();

    let snapshot: Vec<(GridIndex, Vec2Array)> = cells(nx, ny)
        .map(|cell| {
            let mut existing = dest
                .value_at(cell)
                .map(|slot| slot.vertex_offsets.clone())
                .unwrap_or_default();
            existing.resize(vertex_count);
            (cell, existing)
        })
        .collect();

    let mut written = Vec::new();
    for (cell, existing) in &snapshot {
        let payload = owner_value(owner, axes, *cell);
        deformer.apply_payload(&payload.vertex_offsets);
        let out = deformer.deform(target, target_vertices, existing, target_transform);
        if out.is_unchanged() {
            continue;
        }
        written.push((*cell, out.offsets));
    }

    let count = written.len();
    for (cell, offsets) in written {
        dest.set_value(
            axes,
            cell,
            DeformSlot {
                vertex_offsets: offsets,
            },
        );
    }
    tracing::debug!(cells = nx * ny, written = count, "baked deformer into binding");
    count
}

fn cells(nx: usize, ny: usize) -> impl Iterator<Item = GridIndex> {
    (0..nx).flat_map(move |x| (0..ny).map(move |y| GridIndex::new(x, y)))
}

// Unauthored cells are sampled from the left keypoint; the last keypoint is reached from its
// predecessor with a full step.
fn owner_value(owner: &DeformBinding, axes: &ParamAxes, cell: GridIndex) -> DeformSlot {
    if let Some(slot) = owner.value_at(cell).filter(|_| owner.is_set(cell)) {
        return slot.clone();
    }
    let (lx, fx) = step_back(cell.x, axes.count(0));
    let (ly, fy) = step_back(cell.y, axes.count(1));
    owner.sample(axes, GridIndex::new(lx, ly), Vec2::new(fx, fy))
}

fn step_back(idx: usize, count: usize) -> (usize, f64) {
    if idx + 1 == count && idx > 0 {
        (idx - 1, 1.0)
    } else {
        (idx, 0.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/deform/bake.rs"]
mod tests;
