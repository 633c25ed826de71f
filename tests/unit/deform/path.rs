use super::*;

fn pts(points: &[(f64, f64)]) -> Vec2Array {
    points.iter().map(|&(x, y)| Vec2::new(x, y)).collect()
}

fn line(curve_type: CurveType) -> PathDeformer {
    let mut p = PathDeformer::new(DeformerId(2), &EngineConfig::default());
    p.set_curve_type(curve_type);
    p.rebuffer(&pts(&[(0.0, 0.0), (50.0, 0.0), (100.0, 0.0)]));
    p
}

fn lift_middle(p: &mut PathDeformer, dy: f64) {
    p.apply_deformation(&pts(&[(0.0, 0.0), (0.0, dy), (0.0, 0.0)]));
}

fn deform_one(p: &mut PathDeformer, v: (f64, f64)) -> DeformOutcome {
    p.deform(
        TargetInfo::deformable(10),
        &pts(&[v]),
        &Vec2Array::zeros(1),
        Affine::IDENTITY,
    )
}

#[test]
fn lifting_the_middle_point_lifts_the_target_at_half() {
    let mut p = line(CurveType::Spline);
    lift_middle(&mut p, 10.0);
    let out = p.deform(
        TargetInfo::deformable(10),
        &pts(&[(50.0, 0.0), (50.0, 5.0)]),
        &Vec2Array::zeros(2),
        Affine::IDENTITY,
    );
    assert!(out.changed);
    assert_eq!(out.offsets.at(0), Vec2::new(0.0, 10.0));
    assert_eq!(out.offsets.at(1), Vec2::new(0.0, 10.0));
    assert_eq!(p.cached_params(TargetId(10)), Some([0.5, 0.5].as_slice()));
}

#[test]
fn bezier_curve_moves_half_as_far() {
    let mut p = line(CurveType::Bezier);
    lift_middle(&mut p, 10.0);
    let out = deform_one(&mut p, (50.0, 0.0));
    assert_eq!(out.offsets.at(0), Vec2::new(0.0, 5.0));
}

#[test]
fn second_deform_in_same_frame_is_unchanged() {
    let mut p = line(CurveType::Spline);
    lift_middle(&mut p, 10.0);
    assert!(deform_one(&mut p, (50.0, 0.0)).changed);
    let again = deform_one(&mut p, (50.0, 0.0));
    assert!(!again.changed);
    assert!(again.is_unchanged());

    p.next_frame();
    assert!(deform_one(&mut p, (50.0, 0.0)).changed);
    lift_middle(&mut p, 12.0);
    assert_eq!(deform_one(&mut p, (50.0, 0.0)).offsets.at(0), Vec2::new(0.0, 12.0));
}

#[test]
fn other_vertices_or_transform_in_same_frame_still_deform() {
    let mut p = line(CurveType::Spline);
    lift_middle(&mut p, 10.0);
    assert!(deform_one(&mut p, (50.0, 0.0)).changed);
    assert!(deform_one(&mut p, (40.0, 0.0)).changed);
    assert!(!deform_one(&mut p, (40.0, 0.0)).changed);

    let moved = p.deform(
        TargetInfo::deformable(10),
        &pts(&[(40.0, 0.0)]),
        &Vec2Array::zeros(1),
        Affine::translate((0.0, 1.0)),
    );
    assert!(moved.changed);
}

#[test]
fn degenerate_baseline_disables_physics() {
    let mut p = PathDeformer::new(DeformerId(2), &EngineConfig::default());
    p.rebuffer(&pts(&[(0.0, 0.0), (0.0, 0.0), (10.0, 0.0)]));
    assert!(p.is_degenerate());
    assert!(!p.physics_active());
    p.apply_deformation(&pts(&[(0.0, 5.0), (0.0, 5.0), (0.0, 5.0)]));
    assert!(deform_one(&mut p, (5.0, 0.0)).is_unchanged());
}

#[test]
fn unusable_inputs_are_unchanged() {
    let mut p = line(CurveType::Spline);
    lift_middle(&mut p, 10.0);
    let short = p.deform(
        TargetInfo::deformable(1),
        &pts(&[(50.0, 0.0), (60.0, 0.0)]),
        &Vec2Array::zeros(1),
        Affine::IDENTITY,
    );
    assert!(short.is_unchanged());

    p.set_world_transform(Affine::new([f64::NAN, 0.0, 0.0, 1.0, 0.0, 0.0]));
    assert!(deform_one(&mut p, (50.0, 0.0)).is_unchanged());
    assert_eq!(p.invalid_records().last().unwrap().context, "path:centerMatrix");

    let mut single = PathDeformer::new(DeformerId(3), &EngineConfig::default());
    single.rebuffer(&pts(&[(0.0, 0.0)]));
    assert!(deform_one(&mut single, (0.0, 0.0)).is_unchanged());
}

#[test]
fn switching_physics_off_zeroes_deformation() {
    let mut p = line(CurveType::Spline);
    lift_middle(&mut p, 10.0);
    p.switch_physics(false);
    assert!(p.deformation().is_all_zero());
    assert!(!p.physics_active());
    assert!(deform_one(&mut p, (50.0, 0.0)).is_unchanged());

    p.switch_physics(true);
    assert!(p.physics_active());
}

#[test]
fn structure_change_drops_target_cache() {
    let mut p = line(CurveType::Spline);
    lift_middle(&mut p, 10.0);
    deform_one(&mut p, (50.0, 0.0));
    p.notify(TargetId(10), NotifyReason::TransformChanged);
    assert!(p.cached_params(TargetId(10)).is_some());
    p.notify(TargetId(10), NotifyReason::StructureChanged);
    assert!(p.cached_params(TargetId(10)).is_none());
    // The emitted fingerprint went with it.
    assert!(deform_one(&mut p, (50.0, 0.0)).changed);
}

#[test]
fn circuit_breaker_trips_and_resets() {
    let mut p = line(CurveType::Spline);
    let bad = pts(&[(f64::NAN, 0.0)]);
    let call = |p: &mut PathDeformer| {
        p.deform(TargetInfo::deformable(1), &pts(&[(50.0, 0.0)]), &bad, Affine::IDENTITY)
    };
    for _ in 0..10 {
        call(&mut p);
    }
    assert_eq!(p.consecutive_invalid_frames(), 10);
    assert!(!p.physics_tripped());
    assert!(p.physics_active());

    call(&mut p);
    assert!(p.physics_tripped());
    assert!(!p.physics_active());
    match p.breaker_error() {
        Some(DeformError::ConsecutiveFailure { context, frames }) => {
            assert_eq!(context, "path:sanitize");
            assert_eq!(frames, 11);
        }
        other => panic!("unexpected {other:?}"),
    }

    p.rebuffer(&pts(&[(0.0, 0.0), (50.0, 0.0), (100.0, 0.0)]));
    assert!(!p.physics_active());

    p.reset_physics();
    assert!(!p.physics_tripped());
    assert!(p.physics_active());
    assert_eq!(p.consecutive_invalid_frames(), 0);
}

#[test]
fn moving_root_swings_the_chain() {
    let mut p = PathDeformer::new(DeformerId(2), &EngineConfig::default());
    p.rebuffer(&pts(&[(0.0, 0.0), (0.0, 10.0), (0.0, 20.0)]));
    p.step(0.016);
    assert!(p.deformation().max_abs() < 1e-9);

    p.set_world_transform(Affine::translate((50.0, 0.0)));
    p.step(0.016);
    let d = p.deformation();
    assert!(d.at(0).hypot() < 1e-9);
    assert!(d.at(2).x.abs() > 1e-6, "{d:?}");
    assert_eq!(p.previous_curve().points().len(), 3);
}

#[test]
fn physics_only_ignores_parameter_offsets() {
    let mut p = line(CurveType::Spline);
    lift_middle(&mut p, 10.0);
    assert_eq!(p.deformation().at(1), Vec2::new(0.0, 10.0));
    p.physics_only = true;
    p.step(0.016);
    assert!(p.deformation().is_all_zero());
}

#[test]
fn strength_scales_physics_offsets() {
    let mut p = PathDeformer::new(DeformerId(2), &EngineConfig::default());
    p.strength = 0.0;
    p.rebuffer(&pts(&[(0.0, 0.0), (0.0, 10.0), (0.0, 20.0)]));
    p.step(0.016);
    p.set_world_transform(Affine::translate((50.0, 0.0)));
    p.step(0.016);
    assert!(p.deformation().is_all_zero());
}

#[test]
fn physics_type_switch_recreates_driver() {
    let mut p = line(CurveType::Spline);
    assert_eq!(p.physics_state().unwrap().kind, PhysicsType::Pendulum);
    p.set_physics_type(PhysicsType::SpringPendulum);
    assert_eq!(p.physics_state().unwrap().kind, PhysicsType::SpringPendulum);
}

#[test]
fn hook_policy() {
    let mut p = line(CurveType::Spline);
    assert_eq!(p.hook_phase(TargetKind::Deformable), Some(HookPhase::Pre));
    assert_eq!(p.hook_phase(TargetKind::Node), Some(HookPhase::Pre));
    assert_eq!(p.hook_phase(TargetKind::PropagatingComposite), None);
    p.dynamic_deformation = true;
    p.translate_children = false;
    assert_eq!(p.hook_phase(TargetKind::Deformable), Some(HookPhase::Post));
    assert_eq!(p.hook_phase(TargetKind::Node), None);
    assert_eq!(p.payload_len(), 3);
}

#[test]
fn document_roundtrip() {
    let mut p = PathDeformer::new(DeformerId(2), &EngineConfig::default());
    p.set_curve_type(CurveType::Bezier);
    p.set_physics_type(PhysicsType::SpringPendulum);
    p.strength = 0.5;
    p.physics_only = true;
    p.translate_children = false;
    p.rebuffer(&pts(&[(0.0, 0.0), (25.0, 10.0), (50.0, 0.0)]));

    let doc = p.to_document().unwrap();
    assert_eq!(doc["curveType"], serde_json::json!(0));
    assert_eq!(doc["physicsType"], serde_json::json!(1));
    assert_eq!(doc["physicsEnabled"], serde_json::json!(true));
    assert_eq!(doc["controlPoints"][1], serde_json::json!([25.0, 10.0]));
    assert!(doc.get("physics").is_some());

    let back = PathDeformer::from_document(&doc, DeformerId(2), &EngineConfig::default()).unwrap();
    assert_eq!(back.to_document().unwrap(), doc);
    assert_eq!(back.curve_type(), CurveType::Bezier);

    let bad = serde_json::json!({ "curveType": 7 });
    assert!(matches!(
        PathDeformer::from_document(&bad, DeformerId(2), &EngineConfig::default()),
        Err(DeformError::Serde(_))
    ));
}
