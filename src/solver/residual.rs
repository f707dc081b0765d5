//! Convergence bookkeeping: RMS and maximum residual per variable.

use crate::{comm::Communicator, error::CommError};

/// Largest residual of one variable and where it occurred.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResidualMax {
    pub value: f64,
    /// Global point index; `usize::MAX` while no point has been recorded.
    pub point: usize,
    pub coord: [f64; 3],
}

impl Default for ResidualMax {
    fn default() -> Self {
        Self {
            value: 0.0,
            point: usize::MAX,
            coord: [0.0; 3],
        }
    }
}

impl ResidualMax {
    /// NaN ranks above every finite value so that it surfaces.
    fn rank_value(value: f64) -> f64 {
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }

    /// Larger value first, then lower global point index.
    fn beats(&self, other: &ResidualMax) -> bool {
        let (a, b) = (Self::rank_value(self.value), Self::rank_value(other.value));
        a > b || (a == b && self.point < other.point)
    }

    fn encode(&self, out: &mut Vec<f64>) {
        out.push(self.value);
        out.push(self.point as f64);
        out.extend_from_slice(&self.coord);
    }

    fn decode(data: &[f64]) -> Self {
        Self {
            value: data[0],
            // saturating, so an empty record stays `usize::MAX`
            point: data[1] as usize,
            coord: [data[2], data[3], data[4]],
        }
    }
}

const MAX_RECORD: usize = 5;

#[derive(Clone, Debug)]
pub struct ResidualMonitor {
    sum_sq: Vec<f64>,
    rms: Vec<f64>,
    max: Vec<ResidualMax>,
}

impl ResidualMonitor {
    pub fn new(n_var: usize) -> Self {
        Self {
            sum_sq: vec![0.0; n_var],
            rms: vec![0.0; n_var],
            max: vec![ResidualMax::default(); n_var],
        }
    }

    pub fn n_var(&self) -> usize {
        self.sum_sq.len()
    }

    /// Starts a new accumulation; the last reduced RMS values stay readable.
    pub fn reset(&mut self) {
        self.sum_sq.iter_mut().for_each(|s| *s = 0.0);
        self.max.iter_mut().for_each(|m| *m = ResidualMax::default());
    }

    pub fn add_rms(&mut self, var: usize, residual: f64) {
        self.sum_sq[var] += residual * residual;
    }

    pub fn add_max(&mut self, var: usize, value: f64, point: usize, coord: &[f64]) {
        let mut candidate = ResidualMax {
            value,
            point,
            coord: [0.0; 3],
        };
        candidate.coord[..coord.len()].copy_from_slice(coord);
        if candidate.beats(&self.max[var]) {
            self.max[var] = candidate;
        }
    }

    /// Combines the contributions of every rank:
    /// `rms = sqrt(sum r^2 / n_domain)` with `n_domain` the global number of
    /// owned points, and the maximum chosen with the fixed tie-break above.
    pub fn reduce(
        &mut self,
        n_point_domain: usize,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        let n_var = self.n_var();
        let mut sums = self.sum_sq.clone();
        sums.push(n_point_domain as f64);
        comm.all_reduce_sum(&mut sums)?;
        let n_global = sums[n_var];
        for (rms, s) in self.rms.iter_mut().zip(&sums) {
            *rms = if n_global > 0.0 { (s / n_global).sqrt() } else { 0.0 };
        }

        if comm.size() > 1 {
            let mut local = Vec::with_capacity(n_var * MAX_RECORD);
            for m in &self.max {
                m.encode(&mut local);
            }
            let all = comm.all_gather(&local)?;
            for (rank, data) in all.iter().enumerate() {
                if data.len() != local.len() {
                    return Err(CommError::LengthMismatch {
                        rank,
                        expected: local.len(),
                        got: data.len(),
                    });
                }
            }
            for var in 0..n_var {
                let mut best = ResidualMax::default();
                for data in &all {
                    let record = &data[var * MAX_RECORD..(var + 1) * MAX_RECORD];
                    let candidate = ResidualMax::decode(record);
                    if candidate.beats(&best) {
                        best = candidate;
                    }
                }
                self.max[var] = best;
            }
        }
        Ok(())
    }

    pub fn rms(&self, var: usize) -> f64 {
        self.rms[var]
    }

    pub fn log10_rms(&self) -> Vec<f64> {
        self.rms.iter().map(|r| r.log10()).collect()
    }

    pub fn max(&self, var: usize) -> &ResidualMax {
        &self.max[var]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{ChannelComm, SerialComm};
    use approx::assert_relative_eq;
    use std::thread;

    #[test]
    fn rms_is_the_root_mean_square_over_owned_points() {
        let mut monitor = ResidualMonitor::new(1);
        for r in [1.0, 2.0, 3.0, 4.0] {
            monitor.add_rms(0, r);
        }
        monitor.reduce(4, &SerialComm::new()).unwrap();
        assert_relative_eq!(monitor.rms(0), (30.0f64 / 4.0).sqrt());
    }

    #[test]
    fn empty_partition_has_zero_rms() {
        let mut monitor = ResidualMonitor::new(2);
        monitor.reduce(0, &SerialComm::new()).unwrap();
        assert_eq!(monitor.rms(1), 0.0);
    }

    #[test]
    fn ties_go_to_the_lowest_global_point() {
        let mut monitor = ResidualMonitor::new(1);
        monitor.add_max(0, 2.0, 9, &[1.0, 0.0]);
        monitor.add_max(0, 2.0, 4, &[2.0, 0.0]);
        monitor.add_max(0, 1.0, 1, &[3.0, 0.0]);
        assert_eq!(monitor.max(0).point, 4);
        assert_eq!(monitor.max(0).coord, [2.0, 0.0, 0.0]);
    }

    #[test]
    fn nan_surfaces_as_the_maximum() {
        let mut monitor = ResidualMonitor::new(1);
        monitor.add_max(0, 1e30, 0, &[0.0]);
        monitor.add_max(0, f64::NAN, 5, &[0.0]);
        assert_eq!(monitor.max(0).point, 5);
        assert!(monitor.max(0).value.is_nan());
    }

    #[test]
    fn maximum_agrees_across_ranks() {
        let handles: Vec<_> = ChannelComm::group(2)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mut monitor = ResidualMonitor::new(1);
                    // both ranks see the same value at different points
                    let point = if comm.rank() == 0 { 7 } else { 3 };
                    monitor.add_rms(0, 2.0);
                    monitor.add_max(0, 2.0, point, &[point as f64]);
                    monitor.reduce(1, &comm).unwrap();
                    (monitor.rms(0), *monitor.max(0))
                })
            })
            .collect();
        for h in handles {
            let (rms, max) = h.join().unwrap();
            assert_relative_eq!(rms, 2.0);
            assert_eq!(max.point, 3);
            assert_eq!(max.coord[0], 3.0);
        }
    }
}
