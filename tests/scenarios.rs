use approx::assert_relative_eq;
use fvflow::{
    config::{ConvectiveScheme, SpatialOrder, TimeIntegration},
    solver::{restart::read_restart, RestartFormat},
    BoundaryKind, Config, Driver, Geometry, Grid, HistoryRecorder, Logger, RectangularMesh,
    SerialComm, TurbulenceModel, Zone,
};

fn plate() -> Geometry {
    RectangularMesh::new(Grid::from_steps(0.0, 1.0, 8), Grid::from_steps(0.0, 0.5, 6))
        .build()
        .unwrap()
}

fn with_open_sides(config: Config) -> Config {
    config
        .with_marker("upper", BoundaryKind::FarField)
        .with_marker("left", BoundaryKind::FarField)
        .with_marker("right", BoundaryKind::Outlet { pressure: 101_325.0 })
}

#[test]
fn plate_at_free_stream_carries_no_load() {
    let comm = SerialComm::new();
    let config = with_open_sides(
        Config::euler()
            .with_mach(0.5)
            .with_monitored_marker("lower", BoundaryKind::EulerWall),
    );
    let mut zone = Zone::new(plate(), config, &comm).unwrap();
    zone.iterate(&comm, 0).unwrap();

    let forces = zone.flow().forces().unwrap();
    let total = forces.total();
    assert_relative_eq!(total.cl, 0.0, epsilon = 1e-6);
    assert_relative_eq!(total.cd, 0.0, epsilon = 1e-6);
    let lower = forces.marker("lower").unwrap();
    assert!(lower.cp.iter().all(|cp| cp.abs() < 1e-4));
}

#[test]
fn symmetric_viscous_channel_carries_friction_drag_only() {
    // mirrored walls: the pressure and normal-stress loads cancel
    let comm = SerialComm::new();
    let config = Config::navier_stokes()
        .with_mach(0.2)
        .with_reynolds(1e4, 1.0)
        .with_time_integration(TimeIntegration::EulerExplicit, 0.5)
        .with_monitored_marker("lower", BoundaryKind::HeatFlux { heat_flux: 0.0 })
        .with_monitored_marker("upper", BoundaryKind::HeatFlux { heat_flux: 0.0 })
        .with_marker("left", BoundaryKind::FarField)
        .with_marker("right", BoundaryKind::Outlet { pressure: 101_325.0 });
    let mut zone = Zone::new(plate(), config, &comm).unwrap();
    for iteration in 0..3 {
        zone.iterate(&comm, iteration).unwrap();
    }

    let forces = zone.flow().forces().unwrap();
    let (inviscid, viscous, total) = (forces.inviscid(), forces.viscous(), forces.total());
    assert!(viscous.cd > 0.0, "viscous CD = {}", viscous.cd);
    assert_relative_eq!(inviscid.cd, 0.0, epsilon = 1e-12);
    assert_relative_eq!(total.cd, viscous.cd, max_relative = 1e-12);
    assert_relative_eq!(total.cl, 0.0, epsilon = 1e-9);

    let lower = forces.marker("lower").unwrap();
    let upper = forces.marker("upper").unwrap();
    let (lo, up) = (lower.inviscid.cl, -upper.inviscid.cl);
    assert_relative_eq!(lo, up, epsilon = 1e-12, max_relative = 1e-8);
    let (lo, up) = (lower.viscous.cd, upper.viscous.cd);
    assert_relative_eq!(lo, up, epsilon = 1e-12, max_relative = 1e-8);
    assert!(lower.skin_friction.iter().any(|cf| cf[0] > 0.0));
}

#[test]
fn restart_round_trip_restores_the_zone() {
    let comm = SerialComm::new();
    let config = with_open_sides(
        Config::rans(TurbulenceModel::SpalartAllmaras)
            .with_mach(0.2)
            .with_reynolds(1e5, 1.0)
            .with_time_integration(TimeIntegration::EulerImplicit, 2.0)
            .with_marker("lower", BoundaryKind::HeatFlux { heat_flux: 0.0 }),
    );
    let mut zone = Zone::new(plate(), config.clone(), &comm).unwrap();
    for iteration in 0..2 {
        zone.iterate(&comm, iteration).unwrap();
    }

    for format in [RestartFormat::Ascii, RestartFormat::Binary] {
        let mut buffer = Vec::new();
        zone.restart_table(&comm).unwrap().write(&mut buffer, format).unwrap();
        let table = read_restart(buffer.as_slice()).unwrap();
        assert_eq!(table.names().len(), 5);

        let mut fresh = Zone::new(plate(), config.clone(), &comm).unwrap();
        fresh.load_restart(&comm, &table).unwrap();
        for i in 0..zone.geometry().n_point() {
            assert_eq!(
                zone.flow().core().nodes().solution(i),
                fresh.flow().core().nodes().solution(i)
            );
            assert_eq!(
                zone.turbulence().unwrap().core().nodes().solution(i),
                fresh.turbulence().unwrap().core().nodes().solution(i)
            );
        }
    }
}

#[test]
fn driver_stops_on_residual_drop() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
    let comm = SerialComm::new();
    let geometry =
        RectangularMesh::new(Grid::from_steps(0.0, 2.0, 8), Grid::from_steps(0.0, 1.0, 4))
            .build()
            .unwrap();
    let config = with_open_sides(
        Config::euler()
            .with_mach(0.3)
            .with_angle_of_attack(10.0)
            .with_convective(ConvectiveScheme::Roe, SpatialOrder::First)
            .with_time_integration(TimeIntegration::EulerImplicit, 10.0)
            .with_marker("lower", BoundaryKind::EulerWall),
    );
    let zone = Zone::new(geometry, config, &comm).unwrap();

    let mut history = Vec::new();
    let report = Driver::new(zone, &comm)
        .with_max_iterations(500)
        .with_residual_drop(1.0)
        .with_observer(Logger)
        .with_observer(HistoryRecorder::new(&mut history))
        .run()
        .unwrap();

    assert!(report.converged, "stalled after {} iterations", report.iterations);
    assert_eq!(history.len(), report.iterations);
    let first = history[0].log10_rms[0];
    assert!(first - report.log10_rms[0] >= 1.0);
}
