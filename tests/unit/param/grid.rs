use super::*;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn grid_1d(xs: &[f64], authored: &[(usize, f64)]) -> BindingGrid<f64> {
    let mut g = BindingGrid::new(xs.len(), 1, &0.0);
    for &(x, v) in authored {
        g.put(GridIndex::new(x, 0), v, true);
    }
    g.re_interpolate(xs, &[0.0], &0.0);
    g
}

#[test]
fn single_authored_cell_fills_everything() {
    let xs = [0.0, 0.5, 1.0];
    let ys = [0.0, 0.25, 1.0];
    let mut g = BindingGrid::new(3, 3, &0.0);
    g.put(GridIndex::new(1, 2), 7.5, true);
    g.re_interpolate(&xs, &ys, &0.0);
    for x in 0..3 {
        for y in 0..3 {
            assert_eq!(g.value(GridIndex::new(x, y)), Some(&7.5), "cell {x},{y}");
        }
    }
    assert_eq!(g.set_count(), 1);
}

#[test]
fn one_dimensional_linear_sample_midpoint() {
    let g = grid_1d(&[0.0, 1.0], &[(0, 2.0), (1, 4.0)]);
    let v = g
        .sample(InterpolateMode::Linear, false, GridIndex::new(0, 0), Vec2::new(0.5, 0.0))
        .unwrap();
    assert!(approx(v, 3.0));
}

#[test]
fn gaps_are_weighted_by_axis_distance() {
    let g = grid_1d(&[0.0, 0.25, 1.0], &[(0, 0.0), (2, 8.0)]);
    assert!(approx(*g.value(GridIndex::new(1, 0)).unwrap(), 2.0));
}

#[test]
fn edges_extend_the_nearest_authored_value() {
    let g = grid_1d(&[0.0, 0.5, 1.0, 2.0], &[(1, 3.0), (2, 5.0)]);
    assert_eq!(g.value(GridIndex::new(0, 0)), Some(&3.0));
    assert_eq!(g.value(GridIndex::new(3, 0)), Some(&5.0));
}

#[test]
fn three_corners_extrapolate_the_fourth() {
    let axis = [0.0, 1.0];
    let mut g = BindingGrid::new(2, 2, &0.0);
    g.put(GridIndex::new(0, 0), 1.0, true);
    g.put(GridIndex::new(1, 0), 3.0, true);
    g.put(GridIndex::new(0, 1), 4.0, true);
    g.re_interpolate(&axis, &axis, &0.0);
    assert!(approx(*g.value(GridIndex::new(1, 1)).unwrap(), 6.0));
}

#[test]
fn crossing_passes_blend_half_and_half() {
    // Row y=1 is filled by the x-direction lerp, column x=1 by the y-direction lerp; the centre is
    // reached by both and ends up as their average.
    let axis = [0.0, 0.5, 1.0];
    let mut g = BindingGrid::new(3, 3, &0.0);
    g.put(GridIndex::new(1, 0), 0.0, true);
    g.put(GridIndex::new(1, 2), 10.0, true);
    g.put(GridIndex::new(0, 1), 2.0, true);
    g.put(GridIndex::new(2, 1), 4.0, true);
    g.re_interpolate(&axis, &axis, &0.0);
    // x-major lines give 5 (between 0 and 10), y-major give 3 (between 2 and 4)
    assert!(approx(*g.value(GridIndex::new(1, 1)).unwrap(), 4.0));
}

#[test]
fn no_authored_cells_clears_to_default() {
    let mut g = BindingGrid::new(2, 1, &1.0);
    g.put(GridIndex::new(0, 0), 9.0, false);
    g.re_interpolate(&[0.0, 1.0], &[0.0], &1.0);
    assert_eq!(g.value(GridIndex::new(0, 0)), Some(&1.0));
}

#[test]
fn dimension_mismatch_resets_grid() {
    let mut g = BindingGrid::new(2, 1, &0.0);
    g.put(GridIndex::new(0, 0), 9.0, true);
    g.re_interpolate(&[0.0, 0.5, 1.0], &[0.0], &0.0);
    assert_eq!(g.dims(), (3, 1));
    assert_eq!(g.set_count(), 0);
}

#[test]
fn nearest_and_step_modes() {
    let g = grid_1d(&[0.0, 1.0], &[(0, 2.0), (1, 4.0)]);
    let at = |mode, off: f64| {
        g.sample(mode, false, GridIndex::new(0, 0), Vec2::new(off, 0.0))
            .unwrap()
    };
    assert_eq!(at(InterpolateMode::Nearest, 0.49), 2.0);
    assert_eq!(at(InterpolateMode::Nearest, 0.5), 4.0);
    assert_eq!(at(InterpolateMode::Step, 0.9), 2.0);
}

#[test]
fn cubic_matches_linear_on_linear_data() {
    let xs = [0.0, 1.0, 2.0, 3.0];
    let g = grid_1d(&xs, &[(0, 0.0), (1, 2.0), (2, 4.0), (3, 6.0)]);
    for off in [0.1, 0.5, 0.8] {
        let lin = g
            .sample(InterpolateMode::Linear, false, GridIndex::new(1, 0), Vec2::new(off, 0.0))
            .unwrap();
        let cub = g
            .sample(InterpolateMode::Cubic, false, GridIndex::new(1, 0), Vec2::new(off, 0.0))
            .unwrap();
        assert!(approx(lin, cub), "offset {off}: {lin} vs {cub}");
    }
}

#[test]
fn bilinear_sample_in_2d() {
    let axis = [0.0, 1.0];
    let mut g = BindingGrid::new(2, 2, &0.0);
    g.put(GridIndex::new(0, 0), 0.0, true);
    g.put(GridIndex::new(1, 0), 1.0, true);
    g.put(GridIndex::new(0, 1), 2.0, true);
    g.put(GridIndex::new(1, 1), 3.0, true);
    g.re_interpolate(&axis, &axis, &0.0);
    let v = g
        .sample(InterpolateMode::Linear, true, GridIndex::new(0, 0), Vec2::new(0.5, 0.5))
        .unwrap();
    assert!(approx(v, 1.5));
    let c = g
        .sample(InterpolateMode::Cubic, true, GridIndex::new(0, 0), Vec2::new(0.5, 0.5))
        .unwrap();
    assert!(approx(c, 1.5));
}
