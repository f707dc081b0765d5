use faer::Mat;
use faer_core::{zipped, MatMut, MatRef};

pub fn identity(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
}

pub fn set_zero(mut m: MatMut<'_, f64>) {
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            m.write(i, j, 0.0);
        }
    }
}

// dst += alpha * src
pub fn add_scaled(dst: MatMut<'_, f64>, src: MatRef<'_, f64>, alpha: f64) {
    zipped!(dst, src).for_each(|mut d, s| d.write(d.read() + alpha * s.read()));
}

pub fn scale(mut m: MatMut<'_, f64>, alpha: f64) {
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            let v = m.read(i, j);
            m.write(i, j, alpha * v);
        }
    }
}

pub fn copy_from_slice(mut dst: MatMut<'_, f64>, src: &[f64]) {
    debug_assert_eq!(dst.nrows() * dst.ncols(), src.len());
    let nrows = dst.nrows();
    for (k, &v) in src.iter().enumerate() {
        dst.write(k % nrows, k / nrows, v);
    }
}

pub fn column_to_vec(m: MatRef<'_, f64>) -> Vec<f64> {
    (0..m.nrows()).map(|i| m.read(i, 0)).collect()
}

pub fn max_abs(m: MatRef<'_, f64>) -> f64 {
    let mut out = 0.0f64;
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            out = out.max(m.read(i, j).abs());
        }
    }
    out
}

/// `y = A x` for small dense blocks, `x` and `y` given as slices.
pub fn block_mul(a: MatRef<'_, f64>, x: &[f64], y: &mut [f64]) {
    for (i, yi) in y.iter_mut().enumerate() {
        *yi = (0..a.ncols()).map(|j| a.read(i, j) * x[j]).sum();
    }
}
