//! Vertex-centered dual grid consumed by the solvers.
//!
//! Points owned by this rank come first (`0..n_point_domain`), halo points
//! received from neighbouring ranks follow. Edge normals are area-weighted and
//! point from `nodes[0]` to `nodes[1]`; boundary vertex normals are
//! area-weighted and point out of the fluid domain.

use std::collections::HashMap;

use crate::{
    comm::Communicator,
    error::{CommError, GeometryError},
};

#[derive(Clone, Debug, PartialEq)]
pub struct GridPoint {
    pub(crate) coord: [f64; 3],
    pub(crate) volume: f64,
    pub(crate) wall_distance: f64,
    pub(crate) global_index: usize,
}

impl GridPoint {
    pub fn coord(&self) -> &[f64; 3] {
        &self.coord
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn wall_distance(&self) -> f64 {
        self.wall_distance
    }

    pub fn global_index(&self) -> usize {
        self.global_index
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub(crate) nodes: [usize; 2],
    pub(crate) normal: [f64; 3],
}

impl Edge {
    pub fn nodes(&self) -> [usize; 2] {
        self.nodes
    }

    pub fn normal(&self) -> &[f64; 3] {
        &self.normal
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub(crate) point: usize,
    pub(crate) normal: [f64; 3],
    pub(crate) normal_neighbor: Option<usize>,
}

impl Vertex {
    pub fn new(point: usize, normal: &[f64]) -> Self {
        let mut n = [0.0; 3];
        n[..normal.len()].copy_from_slice(normal);
        Self {
            point,
            normal: n,
            normal_neighbor: None,
        }
    }

    pub fn with_normal_neighbor(mut self, neighbor: usize) -> Self {
        self.normal_neighbor = Some(neighbor);
        self
    }

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn normal(&self) -> &[f64; 3] {
        &self.normal
    }

    /// Interior point closest to the wall-normal direction, or the vertex
    /// point itself when it has no neighbours.
    pub fn normal_neighbor(&self) -> usize {
        self.normal_neighbor.unwrap_or(self.point)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub(crate) tag: String,
    pub(crate) vertices: Vec<Vertex>,
}

impl Marker {
    pub fn new(tag: impl Into<String>, vertices: Vec<Vertex>) -> Self {
        Self {
            tag: tag.into(),
            vertices,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }
}

/// Rigid motion relating the two sides of a periodic interface:
/// `x' = R (x - center) + center + translation`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodicTransform {
    center: [f64; 3],
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

impl PeriodicTransform {
    /// Rotation by `angles` (radians, about x then y then z) around `center`,
    /// followed by `translation`.
    pub fn from_angles(center: [f64; 3], angles: [f64; 3], translation: [f64; 3]) -> Self {
        let (st, ct) = angles[0].sin_cos();
        let (sp, cp) = angles[1].sin_cos();
        let (ss, cs) = angles[2].sin_cos();
        let rotation = [
            [cp * cs, st * sp * cs - ct * ss, ct * sp * cs + st * ss],
            [cp * ss, st * sp * ss + ct * cs, ct * sp * ss - st * cs],
            [-sp, st * cp, ct * cp],
        ];
        Self {
            center,
            rotation,
            translation,
        }
    }

    pub fn translation(translation: [f64; 3]) -> Self {
        Self::from_angles([0.0; 3], [0.0; 3], translation)
    }

    /// Exact inverse. For a rotation about a single axis this is the same as
    /// negating the angle and the translation.
    pub fn inverse(&self) -> Self {
        let r = &self.rotation;
        let mut rotation = [[0.0; 3]; 3];
        for (i, row) in rotation.iter_mut().enumerate() {
            for (j, x) in row.iter_mut().enumerate() {
                *x = r[j][i];
            }
        }
        let mut center = [0.0; 3];
        let mut translation = [0.0; 3];
        for d in 0..3 {
            center[d] = self.center[d] + self.translation[d];
            translation[d] = -self.translation[d];
        }
        Self {
            center,
            rotation,
            translation,
        }
    }

    /// Rotates a vector quantity in place (first `v.len()` components).
    pub fn rotate(&self, v: &mut [f64]) {
        let mut x = [0.0; 3];
        x[..v.len()].copy_from_slice(v);
        for (i, vi) in v.iter_mut().enumerate() {
            *vi = (0..3).map(|j| self.rotation[i][j] * x[j]).sum();
        }
    }

    /// Rotates a vector stored with a stride, `v[start + k * stride]`.
    pub(crate) fn rotate_strided(&self, v: &mut [f64], start: usize, stride: usize, n_dim: usize) {
        let mut x = [0.0; 3];
        for (k, xk) in x.iter_mut().enumerate().take(n_dim) {
            *xk = v[start + k * stride];
        }
        for i in 0..n_dim {
            v[start + i * stride] = (0..3).map(|j| self.rotation[i][j] * x[j]).sum();
        }
    }

    pub fn apply_point(&self, x: &mut [f64]) {
        let n = x.len();
        let mut rel = [0.0; 3];
        for d in 0..n {
            rel[d] = x[d] - self.center[d];
        }
        self.rotate(&mut rel[..n]);
        for d in 0..n {
            x[d] = rel[d] + self.center[d] + self.translation[d];
        }
    }
}

/// Point lists exchanged with one peer rank. `send[k]` on this side pairs with
/// `receive[k]` on the peer's matching link.
#[derive(Clone, Debug, PartialEq)]
pub struct HaloLink {
    pub(crate) peer: usize,
    pub(crate) send_tag: u32,
    pub(crate) recv_tag: u32,
    pub(crate) send: Vec<usize>,
    pub(crate) receive: Vec<usize>,
    pub(crate) transform: Option<PeriodicTransform>,
}

impl HaloLink {
    pub fn new(peer: usize, send: Vec<usize>, receive: Vec<usize>) -> Self {
        Self {
            peer,
            send_tag: 0,
            recv_tag: 0,
            send,
            receive,
            transform: None,
        }
    }

    pub fn with_tags(mut self, send_tag: u32, recv_tag: u32) -> Self {
        self.send_tag = send_tag;
        self.recv_tag = recv_tag;
        self
    }

    /// Applied to vector quantities on reception.
    pub fn with_transform(mut self, transform: PeriodicTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn peer(&self) -> usize {
        self.peer
    }

    pub fn send(&self) -> &[usize] {
        &self.send
    }

    pub fn receive(&self) -> &[usize] {
        &self.receive
    }

    pub fn transform(&self) -> Option<&PeriodicTransform> {
        self.transform.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct Geometry {
    n_dim: usize,
    points: Vec<GridPoint>,
    n_point_domain: usize,
    edges: Vec<Edge>,
    markers: Vec<Marker>,
    halo: Vec<HaloLink>,
    adjacency_ptr: Vec<usize>,
    adjacency: Vec<(usize, usize)>,
    global_to_local: HashMap<usize, usize>,
}

impl Geometry {
    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    pub fn n_point(&self) -> usize {
        self.points.len()
    }

    pub fn n_point_domain(&self) -> usize {
        self.n_point_domain
    }

    pub fn point(&self, i: usize) -> &GridPoint {
        &self.points[i]
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn coord(&self, i: usize) -> &[f64] {
        &self.points[i].coord[..self.n_dim]
    }

    pub fn volume(&self, i: usize) -> f64 {
        self.points[i].volume
    }

    pub fn is_domain(&self, i: usize) -> bool {
        i < self.n_point_domain
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_normal(&self, e: usize) -> &[f64] {
        &self.edges[e].normal[..self.n_dim]
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn marker_index(&self, tag: &str) -> Option<usize> {
        self.markers.iter().position(|m| m.tag == tag)
    }

    pub fn halo_links(&self) -> &[HaloLink] {
        &self.halo
    }

    /// `(neighbor, edge)` pairs of point `i`, in edge order.
    pub fn neighbors(&self, i: usize) -> &[(usize, usize)] {
        &self.adjacency[self.adjacency_ptr[i]..self.adjacency_ptr[i + 1]]
    }

    pub fn n_neighbors(&self, i: usize) -> usize {
        self.adjacency_ptr[i + 1] - self.adjacency_ptr[i]
    }

    pub fn global_to_local(&self, global: usize) -> Option<usize> {
        self.global_to_local.get(&global).copied()
    }

    /// Distance from every point to the nearest vertex of a wall marker,
    /// gathered over all ranks.
    pub fn compute_wall_distance(
        &mut self,
        is_wall: impl Fn(&str) -> bool,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        let mut local = Vec::new();
        for marker in self.markers.iter().filter(|m| is_wall(&m.tag)) {
            for v in &marker.vertices {
                local.extend_from_slice(&self.points[v.point].coord);
            }
        }
        let walls: Vec<f64> = comm.all_gather(&local)?.into_iter().flatten().collect();

        for p in &mut self.points {
            p.wall_distance = walls
                .chunks_exact(3)
                .map(|w| {
                    (0..3)
                        .map(|d| (p.coord[d] - w[d]).powi(2))
                        .sum::<f64>()
                        .sqrt()
                })
                .fold(f64::INFINITY, f64::min);
        }

        tracing::debug!(
            n_wall_vertices = walls.len() / 3,
            "wall distance computed"
        );
        Ok(())
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[derive(Clone, Debug, Default)]
pub struct GeometryBuilder {
    n_dim: usize,
    points: Vec<GridPoint>,
    first_halo: Option<usize>,
    edges: Vec<Edge>,
    markers: Vec<Marker>,
    halo: Vec<HaloLink>,
}

impl GeometryBuilder {
    pub fn new(n_dim: usize) -> Self {
        Self {
            n_dim,
            ..Default::default()
        }
    }

    fn push_point(&mut self, coord: &[f64], volume: f64, global_index: usize) -> usize {
        let mut c = [0.0; 3];
        let n = coord.len().min(3);
        c[..n].copy_from_slice(&coord[..n]);
        self.points.push(GridPoint {
            coord: c,
            volume,
            wall_distance: f64::INFINITY,
            global_index,
        });
        self.points.len() - 1
    }

    /// Adds a point owned by this rank. Its global index is its local one.
    pub fn add_point(&mut self, coord: &[f64], volume: f64) -> usize {
        let index = self.points.len();
        self.add_global_point(coord, volume, index)
    }

    pub fn add_global_point(&mut self, coord: &[f64], volume: f64, global_index: usize) -> usize {
        self.push_point(coord, volume, global_index)
    }

    /// Adds a halo point. Every domain point must be added before the first
    /// halo point.
    pub fn add_halo_point(&mut self, coord: &[f64], volume: f64, global_index: usize) -> usize {
        let index = self.push_point(coord, volume, global_index);
        self.first_halo.get_or_insert(index);
        index
    }

    pub fn add_edge(&mut self, i: usize, j: usize, normal: &[f64]) -> usize {
        let mut n = [0.0; 3];
        n[..normal.len()].copy_from_slice(normal);
        self.edges.push(Edge {
            nodes: [i, j],
            normal: n,
        });
        self.edges.len() - 1
    }

    pub fn add_marker(&mut self, marker: Marker) -> &mut Self {
        self.markers.push(marker);
        self
    }

    pub fn add_halo_link(&mut self, link: HaloLink) -> &mut Self {
        self.halo.push(link);
        self
    }

    pub fn build(self) -> Result<Geometry, GeometryError> {
        let Self {
            n_dim,
            points,
            first_halo,
            edges,
            mut markers,
            halo,
        } = self;

        if !(2..=3).contains(&n_dim) {
            return Err(GeometryError::Dimension(n_dim));
        }
        let n_point = points.len();
        let n_point_domain = first_halo.unwrap_or(n_point);
        let check = |index: usize| {
            if index < n_point {
                Ok(())
            } else {
                Err(GeometryError::PointOutOfRange {
                    index,
                    len: n_point,
                })
            }
        };

        for (i, p) in points.iter().enumerate() {
            if !(p.volume > 0.0) {
                return Err(GeometryError::NonPositiveVolume(i));
            }
        }

        let mut global_to_local = HashMap::with_capacity(n_point);
        for (i, p) in points.iter().enumerate() {
            if global_to_local.insert(p.global_index, i).is_some() {
                return Err(GeometryError::DuplicateGlobalIndex(p.global_index));
            }
        }

        let mut degree = vec![0usize; n_point];
        for (e, edge) in edges.iter().enumerate() {
            let [i, j] = edge.nodes;
            check(i)?;
            check(j)?;
            if i == j {
                return Err(GeometryError::DegenerateEdge(e));
            }
            degree[i] += 1;
            degree[j] += 1;
        }

        let mut adjacency_ptr = Vec::with_capacity(n_point + 1);
        adjacency_ptr.push(0);
        for d in &degree {
            adjacency_ptr.push(adjacency_ptr.last().copied().unwrap_or(0) + d);
        }
        let mut fill = adjacency_ptr.clone();
        let mut adjacency = vec![(0, 0); adjacency_ptr[n_point]];
        for (e, edge) in edges.iter().enumerate() {
            let [i, j] = edge.nodes;
            adjacency[fill[i]] = (j, e);
            fill[i] += 1;
            adjacency[fill[j]] = (i, e);
            fill[j] += 1;
        }

        for (n, marker) in markers.iter().enumerate() {
            if markers[..n].iter().any(|m| m.tag == marker.tag) {
                return Err(GeometryError::DuplicateMarker(marker.tag.clone()));
            }
        }

        for marker in &mut markers {
            for v in &mut marker.vertices {
                check(v.point)?;
                if let Some(nn) = v.normal_neighbor {
                    check(nn)?;
                    continue;
                }
                // neighbour best aligned with the inward normal
                let i = v.point;
                let inward: Vec<f64> = v.normal[..n_dim].iter().map(|x| -x).collect();
                v.normal_neighbor = adjacency[adjacency_ptr[i]..adjacency_ptr[i + 1]]
                    .iter()
                    .map(|&(j, _)| {
                        let d: Vec<f64> = (0..n_dim)
                            .map(|k| points[j].coord[k] - points[i].coord[k])
                            .collect();
                        (j, dot(&d, &inward) / norm(&d).max(f64::MIN_POSITIVE))
                    })
                    .fold(None, |best: Option<(usize, f64)>, (j, c)| match best {
                        Some((_, bc)) if bc >= c => best,
                        _ => Some((j, c)),
                    })
                    .map(|(j, _)| j);
            }
        }

        for link in &halo {
            for &p in link.send.iter().chain(&link.receive) {
                check(p)?;
            }
            if link.transform.is_none() && link.receive.iter().any(|&p| p < n_point_domain) {
                return Err(GeometryError::HaloReceivesDomainPoint(link.peer));
            }
        }

        Ok(Geometry {
            n_dim,
            points,
            n_point_domain,
            edges,
            markers,
            halo,
            adjacency_ptr,
            adjacency,
            global_to_local,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use approx::assert_relative_eq;

    fn two_points() -> GeometryBuilder {
        let mut b = GeometryBuilder::new(2);
        let i = b.add_point(&[0.0, 0.0], 1.0);
        let j = b.add_point(&[1.0, 0.0], 1.0);
        b.add_edge(i, j, &[1.0, 0.0]);
        b
    }

    #[test]
    fn adjacency_lists_both_endpoints() {
        let g = two_points().build().unwrap();
        assert_eq!(g.neighbors(0), &[(1, 0)]);
        assert_eq!(g.neighbors(1), &[(0, 0)]);
        assert_eq!(g.n_point_domain(), 2);
        assert_eq!(g.global_to_local(1), Some(1));
    }

    #[test]
    fn rejects_bad_input() {
        let mut b = two_points();
        b.add_edge(0, 5, &[1.0, 0.0]);
        assert!(matches!(
            b.build(),
            Err(GeometryError::PointOutOfRange { index: 5, .. })
        ));

        let mut b = GeometryBuilder::new(2);
        b.add_point(&[0.0, 0.0], 0.0);
        assert_eq!(b.build().unwrap_err(), GeometryError::NonPositiveVolume(0));

        let mut b = two_points();
        b.add_marker(Marker::new("wall", vec![]));
        b.add_marker(Marker::new("wall", vec![]));
        assert!(matches!(b.build(), Err(GeometryError::DuplicateMarker(_))));
    }

    #[test]
    fn normal_neighbor_follows_inward_normal() {
        let mut b = two_points();
        b.add_marker(Marker::new("left", vec![Vertex::new(0, &[-1.0, 0.0])]));
        let g = b.build().unwrap();
        assert_eq!(g.markers()[0].vertices()[0].normal_neighbor(), 1);
    }

    #[test]
    fn periodic_round_trip() {
        let t =
            PeriodicTransform::from_angles([0.5, -1.0, 2.0], [0.3, -0.7, 1.1], [1.0, 2.0, -3.0]);
        let inv = t.inverse();

        let mut v = [0.2, -1.5, 3.0];
        t.rotate(&mut v);
        inv.rotate(&mut v);
        for (a, b) in v.iter().zip([0.2, -1.5, 3.0]) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }

        let mut x = [4.0, 5.0, -6.0];
        t.apply_point(&mut x);
        inv.apply_point(&mut x);
        for (a, b) in x.iter().zip([4.0, 5.0, -6.0]) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn single_axis_inverse_is_negated_angle() {
        let t = PeriodicTransform::from_angles([0.0; 3], [0.0, 0.0, 0.4], [0.0, 0.0, 1.5]);
        let n = PeriodicTransform::from_angles([0.0; 3], [0.0, 0.0, -0.4], [0.0, 0.0, -1.5]);
        let mut a = [1.0, 2.0, 3.0];
        let mut b = a;
        t.inverse().apply_point(&mut a);
        n.apply_point(&mut b);
        for d in 0..3 {
            assert_relative_eq!(a[d], b[d], epsilon = 1e-12);
        }
    }

    #[test]
    fn wall_distance_is_nearest_wall_vertex() {
        let mut b = two_points();
        b.add_marker(Marker::new("wall", vec![Vertex::new(0, &[-1.0, 0.0])]));
        let mut g = b.build().unwrap();
        g.compute_wall_distance(|tag| tag == "wall", &SerialComm::new())
            .unwrap();
        assert_eq!(g.point(0).wall_distance(), 0.0);
        assert_relative_eq!(g.point(1).wall_distance(), 1.0);
    }
}
