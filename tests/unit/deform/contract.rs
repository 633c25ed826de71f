use super::*;
use crate::config::EngineConfig;
use crate::foundation::core::Vec2;

fn pts(points: &[(f64, f64)]) -> Vec2Array {
    points.iter().map(|&(x, y)| Vec2::new(x, y)).collect()
}

fn shifting_grid(id: u32, by: Vec2) -> GridDeformer {
    let mut g = GridDeformer::new(DeformerId(id), &EngineConfig::default());
    g.set_grid_axes(&[0.0, 10.0], &[0.0, 10.0]);
    g.apply_payload(&Vec2Array::from_vecs(&[by; 4]));
    g
}

fn hook(stage: u8, deformer: u32) -> FilterHook {
    FilterHook {
        stage,
        deformer: DeformerId(deformer),
    }
}

#[test]
fn target_kinds() {
    assert!(TargetKind::Deformable.is_deformable());
    assert!(TargetKind::MeshGroup.is_deformable());
    assert!(!TargetKind::Node.is_deformable());
    assert!(!TargetKind::PropagatingComposite.is_deformable());
    assert!(DeformOutcome::unchanged().is_unchanged());
}

#[test]
fn install_replaces_across_phases() {
    let mut f = TargetFilters::new();
    let t = TargetId(1);
    f.install(t, HookPhase::Pre, hook(GRID_STAGE, 4));
    f.install(t, HookPhase::Post, hook(GRID_STAGE, 4));
    assert!(f.hooks(t, HookPhase::Pre).is_empty());
    assert_eq!(f.hooks(t, HookPhase::Post), &[hook(GRID_STAGE, 4)]);

    f.install(t, HookPhase::Post, hook(PATH_STAGE, 4));
    f.install(t, HookPhase::Post, hook(GRID_STAGE, 5));
    assert_eq!(f.hooks(t, HookPhase::Post).len(), 3);

    f.remove(t, DeformerId(4));
    assert_eq!(f.hooks(t, HookPhase::Post), &[hook(GRID_STAGE, 5)]);
    f.install(TargetId(2), HookPhase::Pre, hook(GRID_STAGE, 5));
    f.remove_deformer(DeformerId(5));
    assert!(f.hooks(t, HookPhase::Post).is_empty());
    assert!(f.hooks(TargetId(2), HookPhase::Pre).is_empty());
}

#[test]
fn setup_follows_the_deformer_policy() {
    let mut f = TargetFilters::new();
    let mut g = shifting_grid(3, Vec2::ZERO);
    f.setup_target(&g, TargetInfo::deformable(1));
    assert_eq!(f.hooks(TargetId(1), HookPhase::Pre), &[hook(GRID_STAGE, 3)]);

    g.dynamic = true;
    f.setup_target(&g, TargetInfo::deformable(1));
    assert!(f.hooks(TargetId(1), HookPhase::Pre).is_empty());
    assert_eq!(f.hooks(TargetId(1), HookPhase::Post).len(), 1);

    g.translate_children = false;
    let node = TargetInfo::new(TargetId(1), TargetKind::Node);
    f.setup_target(&g, node);
    assert!(f.hooks(TargetId(1), HookPhase::Post).is_empty());
}

#[test]
fn release_drops_path_caches() {
    let mut path = PathDeformer::new(DeformerId(8), &EngineConfig::default());
    path.rebuffer(&pts(&[(0.0, 0.0), (50.0, 0.0), (100.0, 0.0)]));
    let mut f = TargetFilters::new();
    f.setup_target(&path, TargetInfo::deformable(1));
    path.deform(TargetInfo::deformable(1), &pts(&[(10.0, 0.0)]), &Vec2Array::zeros(1), Affine::IDENTITY);
    assert!(path.cached_params(TargetId(1)).is_some());

    f.release_target(&mut path, TargetId(1));
    assert!(f.hooks(TargetId(1), HookPhase::Pre).is_empty());
    assert!(path.cached_params(TargetId(1)).is_none());
}

#[test]
fn run_filters_chains_in_order() {
    let mut deformers: Vec<AnyDeformer> = vec![
        shifting_grid(1, Vec2::new(1.0, 0.0)).into(),
        shifting_grid(2, Vec2::new(0.0, 2.0)).into(),
    ];
    let mut f = TargetFilters::new();
    let target = TargetInfo::deformable(5);
    f.install(target.id, HookPhase::Pre, hook(GRID_STAGE, 1));
    f.install(target.id, HookPhase::Pre, hook(GRID_STAGE, 99));
    f.install(target.id, HookPhase::Pre, hook(PATH_STAGE, 2));

    let mut deformation = Vec2Array::zeros(1);
    let changed = f.run_filters(
        HookPhase::Pre,
        target,
        &pts(&[(5.0, 5.0)]),
        &mut deformation,
        Affine::IDENTITY,
        &mut deformers,
    );
    assert!(changed);
    assert!((deformation.at(0) - Vec2::new(1.0, 2.0)).hypot() < 1e-9, "{deformation:?}");

    let mut untouched = Vec2Array::zeros(1);
    assert!(!f.run_filters(
        HookPhase::Post,
        target,
        &pts(&[(5.0, 5.0)]),
        &mut untouched,
        Affine::IDENTITY,
        &mut deformers,
    ));
    assert!(untouched.is_all_zero());
}

#[test]
fn any_deformer_dispatches() {
    let mut d: AnyDeformer = PathDeformer::new(DeformerId(6), &EngineConfig::default()).into();
    assert_eq!(d.id(), DeformerId(6));
    assert_eq!(d.stage(), PATH_STAGE);
    d.set_world_transform(Affine::translate((1.0, 2.0)));
    assert_eq!(d.world_transform(), Affine::translate((1.0, 2.0)));
    let m: AnyDeformer = MeshGroupDeformer::new(DeformerId(7), &EngineConfig::default()).into();
    assert_eq!(m.stage(), MESH_GROUP_STAGE);
}

#[test]
fn local_frame_maps_between_spaces() {
    let f = LocalFrame::new(Affine::translate((10.0, 0.0)), Affine::translate((15.0, 0.0))).unwrap();
    assert_eq!(f.center(), Affine::translate((5.0, 0.0)));
    let sampled = f.sample(&pts(&[(1.0, 1.0)]), Some(&pts(&[(0.0, 1.0)])));
    assert_eq!(sampled, pts(&[(6.0, 2.0)]));

    let scaled = LocalFrame::new(Affine::scale(2.0), Affine::IDENTITY).unwrap();
    let out = scaled.emit(&pts(&[(1.0, 1.0)]), &pts(&[(2.0, 0.0), (3.0, 0.0)]));
    assert_eq!(out, pts(&[(5.0, 1.0), (6.0, 0.0)]));

    assert!(LocalFrame::new(Affine::scale(0.0), Affine::IDENTITY).is_none());
    assert!(LocalFrame::new(Affine::IDENTITY, Affine::translate((f64::NAN, 0.0))).is_none());
}
