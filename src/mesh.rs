//! Structured rectangles turned into vertex-centered dual grids, used by the
//! tests and benches.

use crate::{
    error::GeometryError,
    geometry::{Geometry, GeometryBuilder, HaloLink, Marker, Vertex},
};

// grid[0] <-> lower
// grid[i] <-> lower + i * delta
// grid[steps] <-> upper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub(crate) lower: f64,
    pub(crate) upper: f64,
    pub(crate) delta: f64,
    pub(crate) steps: usize,
}

impl Grid {
    pub fn from_steps(lower: f64, upper: f64, steps: usize) -> Self {
        let delta = (upper - lower) / steps as f64;
        Self {
            lower,
            upper,
            delta,
            steps,
        }
    }

    pub fn from_delta(lower: f64, upper: f64, delta: f64) -> Self {
        let steps = ((upper - lower) / delta).ceil() as usize;
        Self::from_steps(lower, upper, steps)
    }

    pub fn with_steps(self, steps: usize) -> Self {
        Self::from_steps(self.lower, self.upper, steps)
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn n_nodes(&self) -> usize {
        self.steps + 1
    }

    pub fn node(&self, i: usize) -> f64 {
        self.lower + self.delta * i as f64
    }

    /// Extent of the dual cell around node `i`.
    pub fn dual_width(&self, i: usize) -> f64 {
        if i == 0 || i == self.steps {
            0.5 * self.delta
        } else {
            self.delta
        }
    }

    pub fn iter(self) -> impl Iterator<Item = f64> {
        (0..self.n_nodes()).map(move |i| self.node(i))
    }
}

/// Two-dimensional rectangle with markers `lower`, `right`, `upper` and
/// `left`.
#[derive(Debug, Clone)]
pub struct RectangularMesh {
    pub(crate) x: Grid,
    pub(crate) y: Grid,
}

pub const MARKERS: [&str; 4] = ["lower", "right", "upper", "left"];

impl RectangularMesh {
    pub fn new(x: Grid, y: Grid) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> Grid {
        self.x
    }

    pub fn y(&self) -> Grid {
        self.y
    }

    pub fn global_index(&self, i: usize, j: usize) -> usize {
        j * self.x.n_nodes() + i
    }

    pub fn n_point(&self) -> usize {
        self.x.n_nodes() * self.y.n_nodes()
    }

    pub fn build(&self) -> Result<Geometry, GeometryError> {
        self.build_partition(0, 1)
    }

    /// Part `rank` of a split into `size` slabs of whole columns, with one
    /// column of halo points on each interior side.
    pub fn build_partition(&self, rank: usize, size: usize) -> Result<Geometry, GeometryError> {
        let (nx, ny) = (self.x.n_nodes(), self.y.n_nodes());
        let c0 = rank * nx / size;
        let c1 = (rank + 1) * nx / size;

        let mut local = vec![usize::MAX; nx * ny];
        let mut b = GeometryBuilder::new(2);
        let mut add = |b: &mut GeometryBuilder, i: usize, j: usize, halo: bool| {
            let coord = [self.x.node(i), self.y.node(j)];
            let volume = self.x.dual_width(i) * self.y.dual_width(j);
            let g = self.global_index(i, j);
            local[g] = if halo {
                b.add_halo_point(&coord, volume, g)
            } else {
                b.add_global_point(&coord, volume, g)
            };
        };

        for j in 0..ny {
            for i in c0..c1 {
                add(&mut b, i, j, false);
            }
        }
        let left_halo = (c0 > 0).then(|| c0 - 1);
        let right_halo = (c1 < nx).then_some(c1);
        for column in left_halo.into_iter().chain(right_halo) {
            for j in 0..ny {
                add(&mut b, column, j, true);
            }
        }

        let lid = |i: usize, j: usize| local[j * nx + i];
        let present = |i: usize, j: usize| lid(i, j) != usize::MAX;
        let owned = |i: usize| (c0..c1).contains(&i);

        for j in 0..ny {
            for i in 0..nx.saturating_sub(1) {
                if present(i, j) && present(i + 1, j) && (owned(i) || owned(i + 1)) {
                    b.add_edge(lid(i, j), lid(i + 1, j), &[self.y.dual_width(j), 0.0]);
                }
            }
        }
        for i in c0..c1 {
            for j in 0..ny.saturating_sub(1) {
                b.add_edge(lid(i, j), lid(i, j + 1), &[0.0, self.x.dual_width(i)]);
            }
        }

        let (last_i, last_j) = (nx - 1, ny - 1);
        let inner_j = |j: usize| if j == 0 { 1.min(last_j) } else { j - 1 };
        let inner_i = |i: usize| if i == 0 { 1.min(last_i) } else { i - 1 };

        let lower = (c0..c1)
            .map(|i| {
                Vertex::new(lid(i, 0), &[0.0, -self.x.dual_width(i)])
                    .with_normal_neighbor(lid(i, inner_j(0)))
            })
            .collect();
        let upper = (c0..c1)
            .map(|i| {
                Vertex::new(lid(i, last_j), &[0.0, self.x.dual_width(i)])
                    .with_normal_neighbor(lid(i, inner_j(last_j)))
            })
            .collect();
        let column = |i: usize, sign: f64| -> Vec<Vertex> {
            if !owned(i) {
                return Vec::new();
            }
            (0..ny)
                .map(|j| {
                    let neighbor = inner_i(i);
                    let v = Vertex::new(lid(i, j), &[sign * self.y.dual_width(j), 0.0]);
                    if present(neighbor, j) {
                        v.with_normal_neighbor(lid(neighbor, j))
                    } else {
                        v
                    }
                })
                .collect()
        };
        b.add_marker(Marker::new(MARKERS[0], lower));
        b.add_marker(Marker::new(MARKERS[1], column(last_i, 1.0)));
        b.add_marker(Marker::new(MARKERS[2], upper));
        b.add_marker(Marker::new(MARKERS[3], column(0, -1.0)));

        if let Some(h) = left_halo {
            let send = (0..ny).map(|j| lid(c0, j)).collect();
            let receive = (0..ny).map(|j| lid(h, j)).collect();
            b.add_halo_link(HaloLink::new(rank - 1, send, receive));
        }
        if let Some(h) = right_halo {
            let send = (0..ny).map(|j| lid(c1 - 1, j)).collect();
            let receive = (0..ny).map(|j| lid(h, j)).collect();
            b.add_halo_link(HaloLink::new(rank + 1, send, receive));
        }

        b.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mesh() -> RectangularMesh {
        RectangularMesh::new(Grid::from_steps(0.0, 2.0, 4), Grid::from_steps(0.0, 1.0, 2))
    }

    #[test]
    fn grid_nodes() {
        let g = Grid::from_delta(0.0, 1.0, 0.3);
        assert_eq!(g.steps(), 4);
        assert_relative_eq!(g.iter().last().unwrap(), 1.0);
        assert_eq!(g.with_steps(2).delta(), 0.5);
    }

    #[test]
    fn dual_volumes_tile_the_rectangle() {
        let g = mesh().build().unwrap();
        let total: f64 = (0..g.n_point()).map(|i| g.volume(i)).sum();
        assert_relative_eq!(total, 2.0, epsilon = 1e-14);
        assert_eq!(g.edges().len(), 4 * 3 + 5 * 2);
    }

    #[test]
    fn dual_cells_are_closed() {
        let g = mesh().build().unwrap();
        let mut sum = vec![[0.0; 2]; g.n_point()];
        for e in g.edges() {
            let [i, j] = e.nodes();
            for d in 0..2 {
                sum[i][d] += e.normal()[d];
                sum[j][d] -= e.normal()[d];
            }
        }
        for m in g.markers() {
            for v in m.vertices() {
                for d in 0..2 {
                    sum[v.point()][d] += v.normal()[d];
                }
            }
        }
        for s in sum {
            assert_relative_eq!(s[0], 0.0, epsilon = 1e-14);
            assert_relative_eq!(s[1], 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn partitions_cover_every_point_once() {
        let m = mesh();
        let mut owners = vec![0; m.n_point()];
        for rank in 0..2 {
            let g = m.build_partition(rank, 2).unwrap();
            for p in &g.points()[..g.n_point_domain()] {
                owners[p.global_index()] += 1;
            }
            assert_eq!(g.halo_links().len(), 1);
            assert_eq!(g.halo_links()[0].peer(), 1 - rank);
            assert_eq!(g.markers().len(), 4);
        }
        assert!(owners.iter().all(|&n| n == 1));
    }

    #[test]
    fn wall_vertex_normal_neighbor_points_inward() {
        let g = mesh().build().unwrap();
        let lower = &g.markers()[g.marker_index("lower").unwrap()];
        let v = &lower.vertices()[2];
        assert_eq!(g.point(v.normal_neighbor()).coord()[1], 0.5);
        assert_eq!(g.point(v.normal_neighbor()).coord()[0], g.point(v.point()).coord()[0]);
    }
}
