//! Synchronous halo exchange of per-point data.
//!
//! Every link first posts its send, then every link receives and overwrites
//! its ghost points. Vector-valued entries are rotated on reception when the
//! link carries a periodic transform.

use crate::{comm::Communicator, error::CommError, geometry::Geometry};

/// Positions of vector-valued entries in one point's packed record:
/// component `k` of a vector lives at `start + k * stride`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VectorLayout {
    vectors: Vec<(usize, usize)>,
}

impl VectorLayout {
    /// Nothing is rotated.
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, start: usize, stride: usize) -> Self {
        self.vectors.push((start, stride));
        self
    }

    /// Conservative flow state `[rho, rho*v, rho*E]`.
    pub fn momentum() -> Self {
        Self::scalar().with_vector(1, 1)
    }

    /// Gradient record `[var][dim]`: every row is a vector, and the rows of
    /// the velocity components `first_velocity..first_velocity + n_dim` form
    /// vectors across variables as well.
    pub fn gradient(n_var: usize, n_dim: usize, first_velocity: Option<usize>) -> Self {
        let mut layout = Self::scalar();
        for v in 0..n_var {
            layout = layout.with_vector(v * n_dim, 1);
        }
        if let Some(first) = first_velocity {
            for d in 0..n_dim {
                layout = layout.with_vector(first * n_dim + d, n_dim);
            }
        }
        layout
    }

    pub fn is_scalar(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Per-point data that can be exchanged across a halo.
pub trait HaloData {
    fn width(&self) -> usize;

    fn pack(&self, point: usize, out: &mut Vec<f64>);

    fn unpack(&mut self, point: usize, data: &[f64]);
}

/// Contiguous `width` values per point.
pub struct PointSlab<'a> {
    data: &'a mut [f64],
    width: usize,
}

impl<'a> PointSlab<'a> {
    pub fn new(data: &'a mut [f64], width: usize) -> Self {
        Self { data, width }
    }
}

impl HaloData for PointSlab<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn pack(&self, point: usize, out: &mut Vec<f64>) {
        out.extend_from_slice(&self.data[point * self.width..(point + 1) * self.width]);
    }

    fn unpack(&mut self, point: usize, data: &[f64]) {
        self.data[point * self.width..(point + 1) * self.width].copy_from_slice(data);
    }
}

pub fn exchange<D: HaloData + ?Sized>(
    geometry: &Geometry,
    comm: &dyn Communicator,
    data: &mut D,
    layout: &VectorLayout,
) -> Result<(), CommError> {
    let width = data.width();
    let links = geometry.halo_links();
    if links.is_empty() || width == 0 {
        return Ok(());
    }

    for link in links {
        let mut buf = Vec::with_capacity(link.send.len() * width);
        for &p in &link.send {
            data.pack(p, &mut buf);
        }
        comm.send(link.peer, link.send_tag, buf)?;
    }

    for link in links {
        let mut buf = comm.recv(link.peer, link.recv_tag)?;
        if buf.len() != link.receive.len() * width {
            return Err(CommError::LengthMismatch {
                rank: link.peer,
                expected: link.receive.len() * width,
                got: buf.len(),
            });
        }
        for (record, &p) in buf.chunks_exact_mut(width).zip(&link.receive) {
            if let Some(transform) = &link.transform {
                for &(start, stride) in &layout.vectors {
                    transform.rotate_strided(record, start, stride, geometry.n_dim());
                }
            }
            data.unpack(p, record);
        }
    }
    Ok(())
}
