//! Gradients of the first `n_grad` primitive variables.
//!
//! Both methods fill the owned points only; callers exchange the halo
//! afterwards.

use faer::Mat;

use crate::{
    config::BoundaryKind,
    faer_add,
    geometry::Geometry,
    linsys::invert_block,
    variable::VariableStore,
};

/// Green-Gauss: edge-averaged values times the dual face normals, closed by
/// the boundary faces of every physical marker, divided by the volume.
pub fn green_gauss(nodes: &mut VariableStore, geometry: &Geometry, marker_kinds: &[BoundaryKind]) {
    let (n_dim, n_prim, n_grad) = (nodes.n_dim(), nodes.n_prim(), nodes.n_grad());
    let width = n_grad * n_dim;
    let (prim, grad) = nodes.gradient_parts();
    grad.iter_mut().for_each(|g| *g = 0.0);

    for (e, edge) in geometry.edges().iter().enumerate() {
        let [i, j] = edge.nodes();
        let normal = geometry.edge_normal(e);
        for k in 0..n_grad {
            let avg = 0.5 * (prim[i * n_prim + k] + prim[j * n_prim + k]);
            for d in 0..n_dim {
                grad[i * width + k * n_dim + d] += avg * normal[d];
                grad[j * width + k * n_dim + d] -= avg * normal[d];
            }
        }
    }

    for (marker, kind) in geometry.markers().iter().zip(marker_kinds) {
        if !kind.is_physical() {
            continue;
        }
        for vertex in marker.vertices() {
            let i = vertex.point();
            let normal = vertex.normal();
            for k in 0..n_grad {
                let value = prim[i * n_prim + k];
                for d in 0..n_dim {
                    grad[i * width + k * n_dim + d] += value * normal[d];
                }
            }
        }
    }

    for i in 0..geometry.n_point_domain() {
        let inv_volume = 1.0 / geometry.volume(i);
        grad[i * width..(i + 1) * width]
            .iter_mut()
            .for_each(|g| *g *= inv_volume);
    }
}

/// Inverse-distance-squared weighted least squares over the direct
/// neighbours. A point whose normal matrix is singular, e.g. one whose
/// neighbours are all collinear with it in 2D, gets a zero gradient.
pub fn least_squares(nodes: &mut VariableStore, geometry: &Geometry) {
    let (n_dim, n_prim, n_grad) = (nodes.n_dim(), nodes.n_prim(), nodes.n_grad());
    let width = n_grad * n_dim;
    let (prim, grad) = nodes.gradient_parts();

    let mut normal_matrix = Mat::<f64>::zeros(n_dim, n_dim);
    let mut rhs = vec![0.0; width];
    let mut dx = vec![0.0; n_dim];

    for i in 0..geometry.n_point_domain() {
        faer_add::set_zero(normal_matrix.as_mut());
        rhs.iter_mut().for_each(|r| *r = 0.0);
        let xi = geometry.coord(i);

        for &(j, _) in geometry.neighbors(i) {
            let xj = geometry.coord(j);
            for d in 0..n_dim {
                dx[d] = xj[d] - xi[d];
            }
            let dist2: f64 = dx.iter().map(|x| x * x).sum();
            if dist2 == 0.0 {
                continue;
            }
            let weight = 1.0 / dist2;
            for a in 0..n_dim {
                for b in 0..n_dim {
                    let v = normal_matrix.read(a, b) + weight * dx[a] * dx[b];
                    normal_matrix.write(a, b, v);
                }
            }
            for k in 0..n_grad {
                let delta = prim[j * n_prim + k] - prim[i * n_prim + k];
                for d in 0..n_dim {
                    rhs[k * n_dim + d] += weight * dx[d] * delta;
                }
            }
        }

        let out = &mut grad[i * width..(i + 1) * width];
        match invert_block(normal_matrix.as_ref()) {
            Ok(inverse) => {
                for (row, b) in out.chunks_exact_mut(n_dim).zip(rhs.chunks_exact(n_dim)) {
                    faer_add::block_mul(inverse.as_ref(), b, row);
                }
            }
            Err(_) => out.iter_mut().for_each(|g| *g = 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BoundaryKind,
        mesh::{Grid, RectangularMesh},
    };
    use approx::assert_relative_eq;

    fn linear_field(geometry: &Geometry) -> VariableStore {
        // one gradient variable: 2x - 3y + 1
        let mut nodes = VariableStore::new(geometry.n_point(), 2, 1, 1, &[0.0]);
        for i in 0..geometry.n_point() {
            let x = geometry.coord(i);
            nodes.primitive_mut(i)[0] = 2.0 * x[0] - 3.0 * x[1] + 1.0;
        }
        nodes
    }

    fn mesh() -> Geometry {
        RectangularMesh::new(Grid::from_steps(0.0, 1.0, 4), Grid::from_steps(0.0, 2.0, 5))
            .build()
            .unwrap()
    }

    #[test]
    fn green_gauss_is_exact_for_linear_fields() {
        let geometry = mesh();
        let mut nodes = linear_field(&geometry);
        green_gauss(&mut nodes, &geometry, &[BoundaryKind::FarField; 4]);
        for i in 0..geometry.n_point() {
            assert_relative_eq!(nodes.grad(i, 0)[0], 2.0, epsilon = 1e-12);
            assert_relative_eq!(nodes.grad(i, 0)[1], -3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn least_squares_is_exact_for_linear_fields() {
        let geometry = mesh();
        let mut nodes = linear_field(&geometry);
        least_squares(&mut nodes, &geometry);
        for i in 0..geometry.n_point() {
            assert_relative_eq!(nodes.grad(i, 0)[0], 2.0, epsilon = 1e-12);
            assert_relative_eq!(nodes.grad(i, 0)[1], -3.0, epsilon = 1e-12);
        }
    }
}
