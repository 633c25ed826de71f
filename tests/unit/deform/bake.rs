use super::*;
use crate::config::EngineConfig;
use crate::deform::grid::GridDeformer;
use crate::foundation::core::{DeformerId, TargetId};
use crate::param::binding::DEFORM_BINDING_NAME;
use crate::param::grid::InterpolateMode;

fn uniform(len: usize, v: Vec2) -> DeformSlot {
    DeformSlot {
        vertex_offsets: Vec2Array::from_vecs(&vec![v; len]),
    }
}

fn close(a: Vec2, b: Vec2) -> bool {
    (a - b).hypot() < 1e-9
}

fn setup() -> (GridDeformer, DeformBinding, DeformBinding, ParamAxes) {
    let axes = ParamAxes::with_points(vec![0.0, 0.5, 1.0], vec![], false).unwrap();
    let mut grid = GridDeformer::new(DeformerId(1), &EngineConfig::default());
    grid.set_grid_axes(&[0.0, 10.0], &[0.0, 10.0]);

    let mut owner = DeformBinding::new(TargetId(1), DEFORM_BINDING_NAME, DeformSlot::zeros(4), &axes);
    owner.set_value(&axes, GridIndex::new(0, 0), DeformSlot::zeros(4));
    owner.set_value(&axes, GridIndex::new(2, 0), uniform(4, Vec2::new(2.0, 0.0)));

    let dest = DeformBinding::new(TargetId(7), DEFORM_BINDING_NAME, DeformSlot::zeros(1), &axes);
    (grid, owner, dest, axes)
}

#[test]
fn bakes_authored_and_interpolated_poses() {
    let (mut grid, owner, mut dest, axes) = setup();
    let verts = Vec2Array::from_vecs(&[Vec2::new(5.0, 5.0)]);

    let written = transfer_to_binding(
        &mut grid,
        &owner,
        TargetInfo::deformable(7),
        &verts,
        Affine::IDENTITY,
        &mut dest,
        &axes,
    );

    // The rest pose changes nothing and stays unauthored.
    assert_eq!(written, 2);
    assert!(!dest.is_set(GridIndex::new(0, 0)));
    assert!(dest.is_set(GridIndex::new(1, 0)));
    assert!(dest.is_set(GridIndex::new(2, 0)));

    let mid = dest.value_at(GridIndex::new(1, 0)).unwrap();
    assert!(close(mid.vertex_offsets.at(0), Vec2::new(1.0, 0.0)), "{mid:?}");
    let end = dest.value_at(GridIndex::new(2, 0)).unwrap();
    assert!(close(end.vertex_offsets.at(0), Vec2::new(2.0, 0.0)), "{end:?}");
}

#[test]
fn existing_target_values_are_extended() {
    let (mut grid, owner, mut dest, axes) = setup();
    dest.set_value(&axes, GridIndex::new(2, 0), uniform(1, Vec2::new(0.0, 5.0)));
    let verts = Vec2Array::from_vecs(&[Vec2::new(5.0, 5.0)]);

    transfer_to_binding(
        &mut grid,
        &owner,
        TargetInfo::deformable(7),
        &verts,
        Affine::IDENTITY,
        &mut dest,
        &axes,
    );

    let end = dest.value_at(GridIndex::new(2, 0)).unwrap();
    assert!(close(end.vertex_offsets.at(0), Vec2::new(2.0, 5.0)), "{end:?}");
}

#[test]
fn last_keypoint_is_sampled_from_its_predecessor() {
    let axes = ParamAxes::with_points(vec![0.0, 1.0], vec![], false).unwrap();
    let mut owner = DeformBinding::new(TargetId(1), DEFORM_BINDING_NAME, DeformSlot::zeros(2), &axes);
    owner.set_mode(InterpolateMode::Step);
    owner.set_value(&axes, GridIndex::new(0, 0), uniform(2, Vec2::new(3.0, 1.0)));
    owner.set_value(&axes, GridIndex::new(1, 0), uniform(2, Vec2::new(9.0, 9.0)));
    owner.unset(&axes, GridIndex::new(1, 0));

    assert_eq!(step_back(1, 2), (0, 1.0));
    assert_eq!(step_back(0, 2), (0, 0.0));
    assert_eq!(step_back(0, 1), (0, 0.0));
    let value = owner_value(&owner, &axes, GridIndex::new(1, 0));
    assert_eq!(value, uniform(2, Vec2::new(3.0, 1.0)));
}

#[test]
fn skipped_targets_write_nothing() {
    let (mut grid, owner, mut dest, axes) = setup();
    let before = dest.clone();
    let target = TargetInfo::new(
        TargetId(7),
        crate::deform::contract::TargetKind::PathDeformer {
            physics_enabled: false,
        },
    );
    let written = transfer_to_binding(
        &mut grid,
        &owner,
        target,
        &Vec2Array::from_vecs(&[Vec2::new(5.0, 5.0)]),
        Affine::IDENTITY,
        &mut dest,
        &axes,
    );
    assert_eq!(written, 0);
    assert_eq!(dest, before);
}
