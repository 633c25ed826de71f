use super::*;

#[test]
fn nested_begin_frame_is_rejected() {
    let mut d = Diagnostics::new(false);
    assert!(d.begin_frame());
    assert!(!d.begin_frame());
    d.end_frame();
    assert_eq!(d.frame(), 1);
}

#[test]
fn consecutive_invalid_frames_count_and_reset() {
    let mut d = Diagnostics::new(false);
    for _ in 0..3 {
        d.begin_frame();
        d.record("sanitize", 2, Vec2::new(f64::NAN, 0.0));
        d.end_frame();
    }
    assert_eq!(d.consecutive_invalid_frames(), 3);
    assert_eq!(d.invalid_frames(), 3);
    let last = d.records().last().unwrap();
    assert_eq!(last.index, 2);
    assert_eq!(last.consecutive, 3);
    assert_eq!(last.value, Vec2::ZERO);

    d.begin_frame();
    d.end_frame();
    assert_eq!(d.consecutive_invalid_frames(), 0);
    assert_eq!(d.invalid_frames(), 3);
    assert_eq!(d.last_context(), Some("sanitize"));
}

#[test]
fn log_is_bounded() {
    let mut d = Diagnostics::new(true);
    d.begin_frame();
    for i in 0..200 {
        d.record("sanitize", i, Vec2::ZERO);
    }
    d.end_frame();
    assert_eq!(d.records().count(), 64);
    assert_eq!(d.total_invalid(), 200);
    d.reset();
    assert_eq!(d.records().count(), 0);
    assert!(!d.invalid_this_frame());
}
