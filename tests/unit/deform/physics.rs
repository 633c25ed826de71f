use super::*;

fn chain(points: &[(f64, f64)]) -> Vec2Array {
    points.iter().map(|&(x, y)| Vec2::new(x, y)).collect()
}

fn cfg() -> PhysicsConfig {
    PhysicsConfig::default()
}

#[test]
fn sub_steps_split_and_cap() {
    let steps: Vec<f64> = sub_steps(&cfg(), 0.025).collect();
    assert_eq!(steps.len(), 3);
    assert!((steps.iter().sum::<f64>() - 0.025).abs() < 1e-12);
    assert_eq!(sub_steps(&cfg(), 0.0).count(), 0);
    assert_eq!(sub_steps(&cfg(), f64::NAN).count(), 0);

    let capped = PhysicsConfig {
        max_catch_up_secs: 0.05,
        sub_step: 0.01,
    };
    assert!((sub_steps(&capped, 100.0).sum::<f64>() - 0.05).abs() < 1e-9);
}

#[test]
fn sub_steps_do_not_borrow_the_config() {
    let steps = {
        let local = PhysicsConfig {
            max_catch_up_secs: 1.0,
            sub_step: 0.02,
        };
        sub_steps(&local, 0.05)
    };
    assert_eq!(steps.count(), 3);

    // A driver integrates while its own config is in scope.
    let mut d = PendulumDriver::new(&cfg());
    let cp = chain(&[(0.0, 0.0), (0.0, 10.0)]);
    d.enforce(Vec2::new(50.0, 0.0)).unwrap();
    assert_eq!(d.step(0.035, &cp).unwrap().len(), 2);
}

#[test]
fn pendulum_without_forces_keeps_angles_exactly() {
    let mut d = PendulumDriver::new(&cfg());
    d.damping = 0.0;
    d.gravity = 0.0;
    let cp = chain(&[(0.0, 0.0), (10.0, 10.0), (20.0, 25.0)]);
    d.step(0.016, &cp).unwrap();
    let before = d.angles().to_vec();
    assert_eq!(before, d.initial_angles());
    for _ in 0..50 {
        d.step(0.016, &cp).unwrap();
    }
    assert_eq!(d.angles(), before.as_slice());
}

#[test]
fn pendulum_at_rest_reproduces_control_points() {
    let mut d = PendulumDriver::new(&cfg());
    let cp = chain(&[(0.0, 0.0), (0.0, 10.0), (0.0, 20.0)]);
    let off = d.step(0.1, &cp).unwrap();
    assert_eq!(off.len(), 3);
    assert!(off.max_abs() < 1e-9, "{off:?}");
}

#[test]
fn pendulum_reacts_to_enforced_force() {
    let mut d = PendulumDriver::new(&cfg());
    let cp = chain(&[(0.0, 0.0), (0.0, 10.0), (0.0, 20.0)]);
    d.step(0.016, &cp).unwrap();
    d.enforce(Vec2::new(500.0, 0.0)).unwrap();
    let off = d.step(0.05, &cp).unwrap();
    assert_eq!(off.at(0), Vec2::ZERO);
    assert!(off.at(1).x.abs() > 1e-6);
    assert!(off.at(2).x.abs() > 1e-6);
}

#[test]
fn pendulum_rejects_bad_input() {
    let mut d = PendulumDriver::new(&cfg());
    assert_eq!(
        d.enforce(Vec2::new(f64::NAN, 0.0)),
        Err(PhysicsFault::NonFiniteForce)
    );
    let degenerate = chain(&[(0.0, 0.0), (0.0, 0.0), (5.0, 0.0)]);
    assert_eq!(
        d.step(0.016, &degenerate),
        Err(PhysicsFault::DegenerateSegment)
    );
}

#[test]
fn pendulum_rotate_negates_and_wraps() {
    let mut d = PendulumDriver::new(&cfg());
    d.rotate(0.5);
    assert!((d.state().world_angle + 0.5).abs() < 1e-12);
}

#[test]
fn pendulum_state_roundtrip() {
    let mut d = PendulumDriver::new(&cfg());
    let cp = chain(&[(0.0, 0.0), (5.0, 10.0), (0.0, 20.0)]);
    d.enforce(Vec2::new(100.0, 0.0)).unwrap();
    d.step(0.2, &cp).unwrap();
    let state = d.state();

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["type"], serde_json::json!(0));
    assert!(json.get("angularVelocities").is_some());
    let back: PhysicsState = serde_json::from_value(json).unwrap();
    assert_eq!(back.angles.len(), 2);

    let mut restored = PendulumDriver::new(&cfg());
    restored.set_state(&state);
    assert_eq!(restored.state(), state);
}

#[test]
fn spring_chain_sags_under_gravity() {
    let mut d = SpringPendulumDriver::new(&cfg());
    let cp = chain(&[(0.0, 0.0), (0.0, 10.0), (0.0, 20.0)]);
    let off = d.step(0.1, &cp).unwrap();
    assert_eq!(off.at(0), Vec2::ZERO);
    assert!(off.at(2).y > 0.0, "{off:?}");
    assert!(off.at(2).x.abs() < 1e-9);
}

#[test]
fn spring_chain_rejects_coincident_points() {
    let mut d = SpringPendulumDriver::new(&cfg());
    let cp = chain(&[(0.0, 0.0), (0.0, 0.0)]);
    assert_eq!(d.step(0.1, &cp), Err(PhysicsFault::DegenerateSegment));
}

#[test]
fn spring_state_falls_back_to_restore() {
    let mut d = SpringPendulumDriver::new(&cfg());
    let mut state = d.state();
    state.restoration_constant = 0.0;
    state.restore = 5.0;
    d.set_state(&state);
    assert_eq!(d.restoration_constant, 5.0);
}

#[test]
fn chain_driver_ignores_foreign_state() {
    let mut d = ChainDriver::new(PhysicsType::Pendulum, &cfg());
    let spring = SpringPendulumDriver::new(&cfg()).state();
    let before = d.state();
    d.set_state(&spring);
    assert_eq!(d.state(), before);
    assert_eq!(d.kind(), PhysicsType::Pendulum);
}

#[test]
fn physics_type_serializes_as_integer() {
    assert_eq!(
        serde_json::to_string(&PhysicsType::SpringPendulum).unwrap(),
        "1"
    );
    assert!(serde_json::from_str::<PhysicsType>("2").is_err());
    assert_eq!(PhysicsFault::TorqueNaN.context(), "physics:torqueNaN");
}
