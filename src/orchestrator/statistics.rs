//! Global extrema for display scaling. Nothing here feeds back into the
//! solver.

use crate::lattice::SlabStats;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RunningStatistics {
    extrema: SlabStats,
    /// Number of rank reports merged since the last reset.
    reports: u64,
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one rank's `[density_min, density_max, speed2_min,
    /// speed2_max]`.
    pub fn merge_rank(&mut self, values: [f64; 4]) {
        let [density_min, density_max, speed2_min, speed2_max] = values;
        self.extrema.merge(&SlabStats {
            density_min,
            density_max,
            speed2_min,
            speed2_max,
        });
        self.reports += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// `None` until some rank has observed a fluid cell.
    pub fn density_range(&self) -> Option<(f64, f64)> {
        (!self.extrema.is_empty()).then_some((self.extrema.density_min, self.extrema.density_max))
    }

    pub fn speed2_range(&self) -> Option<(f64, f64)> {
        (self.extrema.speed2_min <= self.extrema.speed2_max)
            .then_some((self.extrema.speed2_min, self.extrema.speed2_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_ranks_and_ignores_empty_reports() {
        let mut s = RunningStatistics::new();
        assert_eq!(s.density_range(), None);
        s.merge_rank([0.4, 0.6, 0.0, 0.01]);
        s.merge_rank([f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY]);
        s.merge_rank([0.3, 0.5, 0.001, 0.02]);
        assert_eq!(s.density_range(), Some((0.3, 0.6)));
        assert_eq!(s.speed2_range(), Some((0.0, 0.02)));
        assert_eq!(s.reports(), 3);
        s.reset();
        assert_eq!(s.speed2_range(), None);
        assert_eq!(s.reports(), 0);
    }
}
