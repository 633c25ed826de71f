use super::*;
use std::f64::consts::PI;

#[test]
fn clamp_angle_wraps_into_pi_range() {
    assert!((clamp_angle(2.5 * PI) - 0.5 * PI).abs() < 1e-12);
    assert!((clamp_angle(-2.5 * PI) + 0.5 * PI).abs() < 1e-12);
    assert_eq!(clamp_angle(0.25), 0.25);
}

#[test]
fn linear_part_drops_translation() {
    let a = Affine::translate(Vec2::new(3.0, 4.0)) * Affine::rotate(PI / 2.0);
    let v = apply_linear(a, Vec2::new(1.0, 0.0));
    assert!(v.x.abs() < 1e-12 && (v.y - 1.0).abs() < 1e-12);
    assert_eq!(linear_part(a).translation(), Vec2::ZERO);
    assert!((rotation_of(a) - PI / 2.0).abs() < 1e-12);
}

#[test]
fn catmull_rom_hits_knots_and_reproduces_lines() {
    assert_eq!(catmull_rom(0.0, 1.0, 5.0, 2.0, 0.0), 1.0);
    assert_eq!(catmull_rom(0.0, 1.0, 5.0, 2.0, 1.0), 5.0);
    // equally spaced linear data stays linear
    assert!((catmull_rom(0.0, 1.0, 2.0, 3.0, 0.25) - 1.25).abs() < 1e-12);
    assert!((catmull_rom_derivative(0.0, 1.0, 2.0, 3.0, 0.7) - 1.0).abs() < 1e-12);
}

#[test]
fn normalize_checked_rejects_short_vectors() {
    assert_eq!(normalize_checked(Vec2::new(1e-10, 0.0), TANGENT_EPSILON), None);
    assert_eq!(normalize_checked(Vec2::new(0.0, 3.0), TANGENT_EPSILON), Some(Vec2::new(0.0, 1.0)));
    assert_eq!(normalize_checked(Vec2::new(f64::NAN, 3.0), TANGENT_EPSILON), None);
}

#[test]
fn binomial_small_orders() {
    assert_eq!(binomial(4, 2), 6.0);
    assert_eq!(binomial(5, 0), 1.0);
    assert_eq!(binomial(3, 4), 0.0);
    assert!(affine_is_finite(Affine::IDENTITY));
    assert!(!affine_is_finite(Affine::new([f64::NAN, 0.0, 0.0, 1.0, 0.0, 0.0])));
}
