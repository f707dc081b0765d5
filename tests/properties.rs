use approx::assert_relative_eq;
use fvflow::{
    config::{ConvectiveScheme, SpatialOrder, TimeIntegration},
    geometry::{Marker, Vertex},
    solver::{ConvectiveFluxProvider, EulerSolver},
    BoundaryKind, Config, Geometry, GeometryBuilder, Grid, PathologyPolicy, RectangularMesh,
    SerialComm, Solver, SolverError, StepContext,
};

/// Four points of an irregular patch joined by five edges, no boundary.
fn patch() -> Geometry {
    let mut b = GeometryBuilder::new(2);
    b.add_point(&[0.0, 0.0], 0.3);
    b.add_point(&[1.0, 0.1], 0.25);
    b.add_point(&[0.9, 1.2], 0.35);
    b.add_point(&[-0.1, 0.8], 0.2);
    b.add_edge(0, 1, &[0.1, -0.5]);
    b.add_edge(1, 2, &[0.6, 0.2]);
    b.add_edge(2, 3, &[-0.1, 0.5]);
    b.add_edge(3, 0, &[-0.4, -0.1]);
    b.add_edge(0, 2, &[0.3, 0.3]);
    b.build().unwrap()
}

/// Smooth, subsonic, non-uniform conservative state at `x`.
fn state(x: &[f64]) -> Vec<f64> {
    let rho = 1.0 + 0.1 * x[0] - 0.05 * x[1];
    let u = 0.5 + 0.2 * x[1];
    let v = 0.1 - 0.1 * x[0];
    let p = 1.0 / 1.4 + 0.05 * x[0] * x[1];
    vec![rho, rho * u, rho * v, p / 0.4 + 0.5 * rho * (u * u + v * v)]
}

fn perturb(solver: &mut dyn Solver, geometry: &Geometry) {
    for i in 0..geometry.n_point() {
        solver.core_mut().nodes_mut().set_solution(i, &state(geometry.coord(i)));
    }
}

#[test]
fn interior_fluxes_cancel() {
    let geometry = patch();
    let comm = SerialComm::new();
    for (scheme, order) in [
        (ConvectiveScheme::Roe, SpatialOrder::First),
        (ConvectiveScheme::Roe, SpatialOrder::SecondLimited),
        (ConvectiveScheme::Jst, SpatialOrder::First),
        (ConvectiveScheme::LaxFriedrichs, SpatialOrder::First),
    ] {
        let config = Config::euler().with_mach(0.5).with_convective(scheme, order);
        let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
        perturb(&mut solver, &geometry);
        let ctx = StepContext::new(&geometry, &config, &comm);
        solver.preprocessing(&ctx).unwrap();
        solver.convective_residual(&ctx).unwrap();

        let mut total = vec![0.0; 4];
        let mut largest: f64 = 0.0;
        for i in 0..geometry.n_point() {
            for (t, r) in total.iter_mut().zip(solver.core().residual(i)) {
                *t += r;
                largest = largest.max(r.abs());
            }
        }
        assert!(largest > 1e-6, "{scheme:?}: the patch should not be in equilibrium");
        for t in total {
            assert_relative_eq!(t, 0.0, epsilon = 1e-13);
        }
    }
}

fn box_config() -> Config {
    Config::euler()
        .with_mach(0.4)
        .with_angle_of_attack(4.0)
        .with_convective(ConvectiveScheme::Roe, SpatialOrder::SecondLimited)
        .with_marker("lower", BoundaryKind::EulerWall)
        .with_marker("right", BoundaryKind::FarField)
        .with_marker("upper", BoundaryKind::FarField)
        .with_marker("left", BoundaryKind::FarField)
}

#[test]
fn preprocessing_is_idempotent() {
    let geometry =
        RectangularMesh::new(Grid::from_steps(0.0, 1.0, 6), Grid::from_steps(0.0, 1.0, 5))
            .build()
            .unwrap();
    let config = box_config();
    let comm = SerialComm::new();
    let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
    perturb(&mut solver, &geometry);
    let ctx = StepContext::new(&geometry, &config, &comm);

    let snapshot = |solver: &EulerSolver| -> Vec<Vec<f64>> {
        let nodes = solver.core().nodes();
        (0..geometry.n_point())
            .flat_map(|i| {
                [
                    nodes.primitive(i).to_vec(),
                    nodes.gradient(i).to_vec(),
                    nodes.limiter(i).to_vec(),
                    solver.core().residual(i),
                ]
            })
            .collect()
    };

    solver.preprocessing(&ctx).unwrap();
    let first = snapshot(&solver);
    solver.preprocessing(&ctx).unwrap();
    assert_eq!(first, snapshot(&solver));
}

#[test]
fn two_point_3d_free_stream_is_in_equilibrium() {
    let mut b = GeometryBuilder::new(3);
    b.add_point(&[0.0, 0.0, 0.0], 0.5);
    b.add_point(&[1.0, 0.0, 0.0], 0.5);
    b.add_edge(0, 1, &[0.7, 0.2, -0.1]);
    b.add_marker(Marker::new("left", vec![Vertex::new(0, &[-0.7, -0.2, 0.1])]));
    b.add_marker(Marker::new("right", vec![Vertex::new(1, &[0.7, 0.2, -0.1])]));
    let geometry = b.build().unwrap();

    let config = Config::euler()
        .with_mach(0.6)
        .with_angle_of_attack(3.0)
        .with_sideslip(2.0)
        .with_marker("left", BoundaryKind::FarField)
        .with_marker("right", BoundaryKind::FarField);
    let comm = SerialComm::new();
    let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
    let ctx = StepContext::new(&geometry, &config, &comm);
    solver.preprocessing(&ctx).unwrap();
    solver.assemble(&ctx).unwrap();

    for i in 0..2 {
        for r in solver.core().residual(i) {
            assert_relative_eq!(r, 0.0, epsilon = 1e-12);
        }
    }
}

fn corrupted(policy: PathologyPolicy) -> (Geometry, Config, EulerSolver) {
    let geometry =
        RectangularMesh::new(Grid::from_steps(0.0, 1.0, 3), Grid::from_steps(0.0, 1.0, 3))
            .build()
            .unwrap();
    let config = box_config()
        .with_time_integration(TimeIntegration::EulerExplicit, 1.0)
        .with_pathology(policy);
    let comm = SerialComm::new();
    let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
    perturb(&mut solver, &geometry);
    solver.core_mut().nodes_mut().set_old_solution();
    for i in [4, 5] {
        solver.core_mut().nodes_mut().set_solution(i, &[-1.0, 0.0, 0.0, 1.0]);
    }
    solver.core_mut().nodes_mut().solution_mut(6)[0] += 0.01;
    (geometry, config, solver)
}

#[test]
fn abort_policy_reports_every_offending_point() {
    let (geometry, config, mut solver) = corrupted(PathologyPolicy::Abort);
    let comm = SerialComm::new();
    let ctx = StepContext::new(&geometry, &config, &comm);
    match solver.finalize_update(&ctx) {
        Err(SolverError::NonPhysical { count }) => assert_eq!(count, 2),
        other => panic!("expected a non-physical error, got {other:?}"),
    }
}

#[test]
fn clamp_policy_restores_offending_points_only() {
    let (geometry, config, mut solver) = corrupted(PathologyPolicy::Clamp);
    let comm = SerialComm::new();
    let ctx = StepContext::new(&geometry, &config, &comm);
    solver.finalize_update(&ctx).unwrap();
    let nodes = solver.core().nodes();
    assert_eq!(nodes.solution(4), nodes.solution_old(4));
    assert_eq!(nodes.solution(5), nodes.solution_old(5));
    assert_ne!(nodes.solution(6), nodes.solution_old(6));
}

#[test]
fn revert_policy_restores_the_whole_field() {
    let (geometry, config, mut solver) = corrupted(PathologyPolicy::Revert);
    let comm = SerialComm::new();
    let ctx = StepContext::new(&geometry, &config, &comm);
    solver.finalize_update(&ctx).unwrap();
    let nodes = solver.core().nodes();
    for i in 0..geometry.n_point() {
        assert_eq!(nodes.solution(i), nodes.solution_old(i));
    }
}

#[test]
fn ignore_policy_keeps_the_update() {
    let (geometry, config, mut solver) = corrupted(PathologyPolicy::Ignore);
    let comm = SerialComm::new();
    let ctx = StepContext::new(&geometry, &config, &comm);
    solver.finalize_update(&ctx).unwrap();
    assert_eq!(solver.core().nodes().solution(4)[0], -1.0);
}
