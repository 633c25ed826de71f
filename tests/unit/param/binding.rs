use super::*;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn axes_1d() -> ParamAxes {
    ParamAxes::with_points(vec![0.0, 0.5, 1.0], vec![], false).unwrap()
}

fn slot(vs: &[(f64, f64)]) -> DeformSlot {
    DeformSlot::from(Vec2Array::from_vecs(
        &vs.iter().map(|&(x, y)| Vec2::new(x, y)).collect::<Vec<_>>(),
    ))
}

#[test]
fn set_current_then_unset_restores_interpolated_value() {
    let axes = axes_1d();
    let mut b = ValueBinding::new(TargetId(1), "opacity", 0.0, &axes);
    b.set_value(&axes, GridIndex::new(0, 0), 2.0);
    b.set_value(&axes, GridIndex::new(2, 0), 6.0);
    let mid = GridIndex::new(1, 0);
    let before = *b.value_at(mid).unwrap();
    assert!(approx(before, 4.0));

    b.set_current(&axes, mid);
    assert!(b.is_set(mid));
    b.unset(&axes, mid);
    assert!(!b.is_set(mid));
    assert!(approx(*b.value_at(mid).unwrap(), before));
}

#[test]
fn reset_authors_the_default() {
    let axes = axes_1d();
    let mut b = ValueBinding::new(TargetId(1), "opacity", 1.0, &axes);
    b.set_value(&axes, GridIndex::new(2, 0), 5.0);
    b.reset(&axes, GridIndex::new(0, 0));
    assert!(b.is_set(GridIndex::new(0, 0)));
    assert_eq!(b.value_at(GridIndex::new(0, 0)), Some(&1.0));
    assert!(approx(*b.value_at(GridIndex::new(1, 0)).unwrap(), 3.0));
    assert_eq!(b.set_count(), 2);
}

#[test]
fn out_of_range_edits_are_ignored() {
    let axes = axes_1d();
    let mut b = ValueBinding::new(TargetId(1), "opacity", 0.0, &axes);
    b.set_value(&axes, GridIndex::new(9, 0), 3.0);
    b.set_current(&axes, GridIndex::new(0, 4));
    assert_eq!(b.set_count(), 0);
}

#[test]
fn extrapolate_mirrors_and_negates() {
    let axes = ParamAxes::with_points(vec![0.0, 1.0], vec![], false).unwrap();
    let mut b = DeformBinding::new(TargetId(3), DEFORM_BINDING_NAME, DeformSlot::zeros(1), &axes);
    b.set_value(&axes, GridIndex::new(1, 0), slot(&[(4.0, 2.0)]));
    b.extrapolate_value_at(&axes, GridIndex::new(0, 0), ValueAxis::X);
    assert_eq!(b.value_at(GridIndex::new(0, 0)), Some(&slot(&[(-4.0, 2.0)])));
}

#[test]
fn scale_value_at_marks_cell_authored() {
    let axes = axes_1d();
    let mut b = DeformBinding::new(TargetId(3), DEFORM_BINDING_NAME, DeformSlot::zeros(1), &axes);
    b.set_value(&axes, GridIndex::new(0, 0), slot(&[(1.0, 1.0)]));
    b.scale_value_at(&axes, GridIndex::new(2, 0), ValueAxis::Both, 2.0);
    assert!(b.is_set(GridIndex::new(2, 0)));
    b.scale_value_at(&axes, GridIndex::new(0, 0), ValueAxis::Y, 3.0);
    assert_eq!(b.value_at(GridIndex::new(0, 0)), Some(&slot(&[(1.0, 3.0)])));
}

#[test]
fn copy_of_unauthored_cell_unsets_destination() {
    let axes = axes_1d();
    let mut a = ValueBinding::new(TargetId(1), "x", 0.0, &axes);
    let mut b = ValueBinding::new(TargetId(2), "x", 0.0, &axes);
    b.set_value(&axes, GridIndex::new(1, 0), 9.0);
    a.copy_keypoint_to(GridIndex::new(1, 0), &mut b, &axes, GridIndex::new(1, 0));
    assert!(!b.is_set(GridIndex::new(1, 0)));

    a.set_value(&axes, GridIndex::new(0, 0), 4.0);
    a.copy_keypoint_to(GridIndex::new(0, 0), &mut b, &axes, GridIndex::new(2, 0));
    assert_eq!(b.value_at(GridIndex::new(2, 0)), Some(&4.0));
}

#[test]
fn swap_exchanges_values_and_flags() {
    let axes = axes_1d();
    let mut a = ValueBinding::new(TargetId(1), "x", 0.0, &axes);
    let mut b = ValueBinding::new(TargetId(2), "x", 0.0, &axes);
    a.set_value(&axes, GridIndex::new(0, 0), 1.0);
    b.set_value(&axes, GridIndex::new(2, 0), 7.0);
    a.swap_keypoint_with(&axes, GridIndex::new(0, 0), &mut b, &axes, GridIndex::new(0, 0));
    assert!(!a.is_set(GridIndex::new(0, 0)));
    assert!(b.is_set(GridIndex::new(0, 0)));
    assert_eq!(b.value_at(GridIndex::new(0, 0)), Some(&1.0));
}

#[test]
fn remap_offsets_reorders_or_resets() {
    let axes = ParamAxes::with_points(vec![0.0, 1.0], vec![], false).unwrap();
    let mut b = DeformBinding::new(TargetId(3), DEFORM_BINDING_NAME, DeformSlot::zeros(2), &axes);
    b.set_value(&axes, GridIndex::new(0, 0), slot(&[(1.0, 0.0), (2.0, 0.0)]));
    b.set_value(&axes, GridIndex::new(1, 0), slot(&[(3.0, 0.0), (4.0, 0.0)]));
    b.remap_offsets(&axes, &[1, 0], &Vec2Array::new(), 2);
    assert_eq!(b.value_at(GridIndex::new(0, 0)), Some(&slot(&[(2.0, 0.0), (1.0, 0.0)])));

    b.remap_offsets(&axes, &[], &Vec2Array::new(), 3);
    assert_eq!(b.set_count(), 0);
    assert_eq!(b.value_at(GridIndex::new(1, 0)).map(DeformSlot::len), Some(3));
}

#[test]
fn keypoint_insert_and_delete_keep_authored_cells() {
    let axes = ParamAxes::with_points(vec![0.0, 1.0], vec![], false).unwrap();
    let mut b = ValueBinding::new(TargetId(1), "x", 0.0, &axes);
    b.set_value(&axes, GridIndex::new(0, 0), 2.0);
    b.set_value(&axes, GridIndex::new(1, 0), 4.0);

    let wider = ParamAxes::with_points(vec![0.0, 0.5, 1.0], vec![], false).unwrap();
    b.insert_keypoints(&wider, 0, 1);
    assert!(!b.is_set(GridIndex::new(1, 0)));
    assert!(approx(*b.value_at(GridIndex::new(1, 0)).unwrap(), 3.0));
    assert_eq!(b.value_at(GridIndex::new(2, 0)), Some(&4.0));

    b.delete_keypoints(&axes, 0, 1);
    assert_eq!(b.grid().dims(), (2, 1));
    assert_eq!(b.set_count(), 2);
}

#[test]
fn reverse_axis_flips_values() {
    let axes = axes_1d();
    let mut b = ValueBinding::new(TargetId(1), "x", 0.0, &axes);
    b.set_value(&axes, GridIndex::new(0, 0), 1.0);
    b.reverse_axis(0);
    assert!(b.is_set(GridIndex::new(2, 0)));
    assert_eq!(b.value_at(GridIndex::new(2, 0)), Some(&1.0));
}

#[test]
fn document_round_trip_is_lossless() {
    let axes = ParamAxes::with_points(vec![0.0, 1.0], vec![0.0, 0.5, 1.0], true).unwrap();
    let mut b = DeformBinding::new(TargetId(5), DEFORM_BINDING_NAME, DeformSlot::zeros(2), &axes);
    b.set_mode(InterpolateMode::Cubic);
    b.set_value(&axes, GridIndex::new(1, 2), slot(&[(0.25, -1.5), (3.0, 0.125)]));
    let doc = b.to_document().unwrap();
    assert_eq!(doc["param_name"], "deform");

    let back = AnyBinding::from_document(&doc, &axes).unwrap();
    assert_eq!(back, AnyBinding::Deform(b));
}

#[test]
fn document_with_wrong_dimensions_is_rejected() {
    let axes = axes_1d();
    let b = ValueBinding::new(TargetId(1), "x", 0.0, &axes);
    let doc = b.to_document().unwrap();
    let other = ParamAxes::new(false);
    let err = AnyBinding::from_document(&doc, &other).unwrap_err();
    assert!(matches!(err, DeformError::Validation(_)));
}
