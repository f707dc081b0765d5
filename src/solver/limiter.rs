use crate::{config::LimiterKind, geometry::Geometry, variable::VariableStore};

/// Slope limiter of every gradient variable.
///
/// The bounds of point `i` are the smallest and largest neighbour jumps
/// `V_j - V_i`, with zero included. For each edge the projected increment
/// `dm = grad V_i . (x_j - x_i) / 2` is compared with the bound on its side;
/// the limiter of a point is the minimum over its edges, starting from one.
pub fn compute_limiter(
    nodes: &mut VariableStore,
    geometry: &Geometry,
    kind: LimiterKind,
    coeff: f64,
    ref_length: f64,
) {
    let (n_dim, n_prim, n_grad) = (nodes.n_dim(), nodes.n_prim(), nodes.n_grad());
    let parts = nodes.limiter_parts();
    let (prim, grad) = (parts.primitive, parts.gradient);
    parts.bound_min.iter_mut().for_each(|b| *b = 0.0);
    parts.bound_max.iter_mut().for_each(|b| *b = 0.0);
    parts.limiter.iter_mut().for_each(|l| *l = 1.0);

    for edge in geometry.edges() {
        let [i, j] = edge.nodes();
        for k in 0..n_grad {
            let delta = prim[j * n_prim + k] - prim[i * n_prim + k];
            let (ki, kj) = (i * n_grad + k, j * n_grad + k);
            parts.bound_min[ki] = parts.bound_min[ki].min(delta);
            parts.bound_max[ki] = parts.bound_max[ki].max(delta);
            parts.bound_min[kj] = parts.bound_min[kj].min(-delta);
            parts.bound_max[kj] = parts.bound_max[kj].max(-delta);
        }
    }

    let eps2 = (coeff * ref_length).powi(3);
    let limit = |dm: f64, dp: f64| -> f64 {
        match kind {
            LimiterKind::Venkatakrishnan => {
                let num = dp * dp + eps2 + 2.0 * dm * dp;
                let den = dp * dp + 2.0 * dm * dm + dm * dp + eps2;
                if den > 0.0 {
                    num / den
                } else {
                    1.0
                }
            }
            LimiterKind::BarthJespersen => {
                if dm == 0.0 {
                    1.0
                } else {
                    (dp / dm).min(1.0)
                }
            }
        }
    };

    let width = n_grad * n_dim;
    for edge in geometry.edges() {
        let [i, j] = edge.nodes();
        let (xi, xj) = (geometry.coord(i), geometry.coord(j));
        for (p, sign) in [(i, 1.0), (j, -1.0)] {
            for k in 0..n_grad {
                let row = &grad[p * width + k * n_dim..p * width + (k + 1) * n_dim];
                let dm: f64 = (0..n_dim).map(|d| row[d] * sign * 0.5 * (xj[d] - xi[d])).sum();
                let kp = p * n_grad + k;
                let dp = if dm > 0.0 {
                    parts.bound_max[kp]
                } else {
                    parts.bound_min[kp]
                };
                parts.limiter[kp] = parts.limiter[kp].min(limit(dm, dp));
            }
        }
    }
}
