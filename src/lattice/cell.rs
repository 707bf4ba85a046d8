//! Per-voxel lattice state.

use super::direction::{Direction, Q};

/// State of one lattice node: 19 distribution values plus the macroscopic
/// moments computed during the last collision.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LatticeCell {
    pub f: [f64; Q],
    pub density: f64,
    pub velocity: [f64; 3],
    pub solid: bool,
}

impl Default for LatticeCell {
    fn default() -> Self {
        Self {
            f: [0.0; Q],
            density: 0.0,
            velocity: [0.0; 3],
            solid: false,
        }
    }
}

/// Second-order BGK equilibrium for one direction.
#[inline]
pub fn equilibrium(d: Direction, density: f64, u: [f64; 3]) -> f64 {
    let (ex, ey, ez) = d.offset();
    let eu = ex as f64 * u[0] + ey as f64 * u[1] + ez as f64 * u[2];
    let uu = u[0] * u[0] + u[1] * u[1] + u[2] * u[2];
    d.weight() * density * (1.0 + 3.0 * eu + 4.5 * eu * eu - 1.5 * uu)
}

impl LatticeCell {
    /// A fluid cell at rest with the given density.
    pub fn at_rest(density: f64) -> Self {
        let mut cell = Self::default();
        cell.reset(density);
        cell
    }

    /// Re-initialize to rest equilibrium, keeping the solid flag.
    pub fn reset(&mut self, density: f64) {
        for d in Direction::ALL {
            self.f[d.index()] = d.weight() * density;
        }
        self.density = density;
        self.velocity = [0.0; 3];
    }

    #[inline]
    pub fn get(&self, d: Direction) -> f64 {
        self.f[d.index()]
    }

    #[inline]
    pub fn set(&mut self, d: Direction, v: f64) {
        self.f[d.index()] = v;
    }

    /// Sum of all distribution components.
    #[inline]
    pub fn mass(&self) -> f64 {
        self.f.iter().sum()
    }

    /// Zeroth and first moments of the distribution: `(rho, rho * u)`.
    #[inline]
    pub fn moments(&self) -> (f64, [f64; 3]) {
        let mut rho = 0.0;
        let mut m = [0.0; 3];
        for d in Direction::ALL {
            let v = self.f[d.index()];
            let (ex, ey, ez) = d.offset();
            rho += v;
            m[0] += v * ex as f64;
            m[1] += v * ey as f64;
            m[2] += v * ez as f64;
        }
        (rho, m)
    }

    /// BGK collision in place. Returns `(density, |u|²)`.
    ///
    /// A zero density yields non-finite velocity; that edge case is left to
    /// the caller's statistics.
    #[inline]
    pub fn collide(&mut self, relaxation: f64) -> (f64, f64) {
        let (rho, m) = self.moments();
        let u = [m[0] / rho, m[1] / rho, m[2] / rho];
        for d in Direction::ALL {
            let i = d.index();
            let feq = equilibrium(d, rho, u);
            self.f[i] += relaxation * (feq - self.f[i]);
        }
        self.density = rho;
        self.velocity = u;
        (rho, u[0] * u[0] + u[1] * u[1] + u[2] * u[2])
    }

    /// Swap every opposite-direction pair.
    #[inline]
    pub fn bounce_back(&mut self) {
        for (a, b) in Direction::PAIRS {
            self.f.swap(a.index(), b.index());
        }
    }

    pub fn sample(&self) -> CellSample {
        CellSample {
            density: self.density,
            velocity: self.velocity,
            solid: self.solid,
        }
    }
}

/// Macroscopic view of one cell, as returned to sampling requests.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CellSample {
    pub density: f64,
    pub velocity: [f64; 3],
    pub solid: bool,
}

impl CellSample {
    #[inline]
    pub fn speed2(&self) -> f64 {
        let u = self.velocity;
        u[0] * u[0] + u[1] * u[1] + u[2] * u[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_state_is_a_fixed_point_of_collision() {
        let mut c = LatticeCell::at_rest(0.5);
        let before = c.f;
        let (rho, u2) = c.collide(1.85);
        assert!((rho - 0.5).abs() < 1e-15);
        assert_eq!(u2, 0.0);
        for i in 0..Q {
            assert!((c.f[i] - before[i]).abs() < 1e-15);
        }
    }

    #[test]
    fn collision_conserves_mass_and_momentum() {
        let mut c = LatticeCell::at_rest(1.0);
        c.set(Direction::East, c.get(Direction::East) + 0.02);
        c.set(Direction::TopNorth, c.get(Direction::TopNorth) + 0.01);
        let (rho0, m0) = c.moments();
        c.collide(1.3);
        let (rho1, m1) = c.moments();
        assert!((rho0 - rho1).abs() < 1e-14);
        for k in 0..3 {
            assert!((m0[k] - m1[k]).abs() < 1e-14);
        }
        assert!((c.density - c.mass()).abs() < 1e-14);
    }

    #[test]
    fn equilibrium_sums_to_density() {
        let u = [0.03, -0.01, 0.02];
        let s: f64 = Direction::ALL.iter().map(|&d| equilibrium(d, 0.7, u)).sum();
        assert!((s - 0.7).abs() < 1e-14);
    }

    #[test]
    fn bounce_back_swaps_opposites() {
        let mut c = LatticeCell::default();
        for (i, v) in c.f.iter_mut().enumerate() {
            *v = i as f64;
        }
        let before = c.f;
        c.bounce_back();
        for d in Direction::ALL {
            assert_eq!(c.get(d), before[d.opposite().index()]);
        }
    }
}
