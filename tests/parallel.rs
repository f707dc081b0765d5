use std::{collections::BTreeMap, thread};

use approx::assert_relative_eq;
use fvflow::{
    config::{ConvectiveScheme, SpatialOrder, TimeIntegration},
    BoundaryKind, ChannelComm, Communicator, Config, Geometry, Grid, RectangularMesh, SerialComm,
    Zone,
};

const ITERATIONS: usize = 3;

fn mesh() -> RectangularMesh {
    RectangularMesh::new(Grid::from_steps(0.0, 2.0, 9), Grid::from_steps(0.0, 1.0, 4))
}

fn config() -> Config {
    Config::euler()
        .with_mach(0.4)
        .with_angle_of_attack(5.0)
        .with_convective(ConvectiveScheme::Roe, SpatialOrder::SecondLimited)
        .with_time_integration(TimeIntegration::EulerExplicit, 0.8)
        .with_monitored_marker("lower", BoundaryKind::EulerWall)
        .with_marker("right", BoundaryKind::FarField)
        .with_marker("upper", BoundaryKind::FarField)
        .with_marker("left", BoundaryKind::FarField)
}

struct RankResult {
    solution: Vec<(usize, Vec<f64>)>,
    rms: Vec<f64>,
    cl: f64,
}

fn run(geometry: Geometry, comm: &dyn Communicator) -> RankResult {
    let mut zone = Zone::new(geometry, config(), comm).unwrap();
    for iteration in 0..ITERATIONS {
        zone.iterate(comm, iteration).unwrap();
    }
    let geometry = zone.geometry();
    let nodes = zone.flow().core().nodes();
    RankResult {
        solution: (0..geometry.n_point_domain())
            .map(|i| (geometry.point(i).global_index(), nodes.solution(i).to_vec()))
            .collect(),
        rms: (0..4).map(|var| zone.flow().core().monitor().rms(var)).collect(),
        cl: zone.flow().forces().unwrap().total().cl,
    }
}

#[test]
fn two_ranks_match_the_serial_run() {
    let mesh = mesh();
    let serial = run(mesh.build().unwrap(), &SerialComm::new());

    let mesh = &mesh;
    let ranks: Vec<RankResult> = thread::scope(|s| {
        let handles: Vec<_> = ChannelComm::group(2)
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| s.spawn(move || run(mesh.build_partition(rank, 2).unwrap(), &comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let reference: BTreeMap<usize, Vec<f64>> = serial.solution.into_iter().collect();
    let mut seen = 0;
    for rank in &ranks {
        for (global, solution) in &rank.solution {
            for (a, b) in solution.iter().zip(&reference[global]) {
                assert_relative_eq!(a, b, max_relative = 1e-10, epsilon = 1e-12);
            }
            seen += 1;
        }
        for (a, b) in rank.rms.iter().zip(&serial.rms) {
            assert_relative_eq!(a, b, max_relative = 1e-10, epsilon = 1e-14);
        }
        assert_relative_eq!(rank.cl, serial.cl, max_relative = 1e-10, epsilon = 1e-14);
    }
    assert_eq!(seen, reference.len());
}
