use std::f64::consts::PI;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Index, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Pseudorapidity assigned to momenta without transverse component
///
/// The sign follows the longitudinal momentum.
pub const MAX_PSEUDORAPIDITY: f64 = 1e5;

/// A basic four-vector
///
/// The zero component is the energy/time component. The remainder are
/// the spatial components
#[derive(
    Deserialize, Serialize, PartialEq, PartialOrd, Debug, Clone, Copy, Default,
)]
pub struct FourVector {
    p: [f64; 4],
}

impl FourVector {
    /// Construct a new four-vector with all components zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct from transverse momentum, pseudorapidity, azimuthal
    /// angle, and mass
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let e = (px * px + py * py + pz * pz + m * m).sqrt();
        Self { p: [e, px, py, pz] }
    }

    /// Energy
    pub fn e(&self) -> f64 {
        self.p[0]
    }

    pub fn px(&self) -> f64 {
        self.p[1]
    }

    pub fn py(&self) -> f64 {
        self.p[2]
    }

    pub fn pz(&self) -> f64 {
        self.p[3]
    }

    /// The spatial components
    pub fn spatial(&self) -> [f64; 3] {
        [self.p[1], self.p[2], self.p[3]]
    }

    /// The spatial norm \sqrt{\sum v_i^2} with i = 1,2,3
    pub fn spatial_norm(&self) -> f64 {
        self.spatial_norm_sq().sqrt()
    }

    /// The square \sum v_i^2 with i = 1,2,3 of the spatial norm
    pub fn spatial_norm_sq(&self) -> f64 {
        self.p.iter().skip(1).map(|e| e * e).sum()
    }

    /// The scalar transverse momentum
    pub fn pt(&self) -> f64 {
        self.pt2().sqrt()
    }

    /// The square of the transverse momentum
    pub fn pt2(&self) -> f64 {
        self.p[1] * self.p[1] + self.p[2] * self.p[2]
    }

    /// The invariant mass square v_0^2 - \sum v_i^2 with i = 1,2,3
    pub fn m_sq(&self) -> f64 {
        self.p[0] * self.p[0] - self.spatial_norm_sq()
    }

    /// The invariant mass
    ///
    /// For spacelike vectors this is minus the square root of the
    /// absolute value of the mass square.
    pub fn m(&self) -> f64 {
        let m_sq = self.m_sq();
        if m_sq < 0. {
            -(-m_sq).sqrt()
        } else {
            m_sq.sqrt()
        }
    }

    /// The azimuthal angle in (-π, π]
    pub fn phi(&self) -> f64 {
        if self.pt2() == 0. {
            return 0.;
        }
        let phi = self.p[2].atan2(self.p[1]);
        if phi <= -PI {
            phi + 2. * PI
        } else {
            phi
        }
    }

    /// The pseudorapidity
    ///
    /// Momenta along the beam axis get ±[MAX_PSEUDORAPIDITY].
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0. {
            return along_beam(self.p[3]);
        }
        (self.p[3] / pt).asinh()
    }

    /// The rapidity
    pub fn rap(&self) -> f64 {
        let (e, pz) = (self.p[0], self.p[3]);
        if e <= pz.abs() {
            return along_beam(pz);
        }
        0.5 * ((e + pz) / (e - pz)).ln()
    }

    /// Azimuthal distance to `other`, wrapped into (-π, π]
    pub fn delta_phi(&self, other: &FourVector) -> f64 {
        wrap_phi(self.phi() - other.phi())
    }

    /// Squared angular distance Δη² + Δφ² to `other`
    pub fn delta_r2(&self, other: &FourVector) -> f64 {
        delta_r2(self.eta(), self.phi(), other.eta(), other.phi())
    }

    /// Angular distance \sqrt{Δη² + Δφ²} to `other`
    pub fn delta_r(&self, other: &FourVector) -> f64 {
        self.delta_r2(other).sqrt()
    }

    /// Velocity p/E
    ///
    /// Vanishes for vectors without positive energy.
    pub fn beta(&self) -> [f64; 3] {
        let e = self.p[0];
        if e <= 0. {
            return [0.; 3];
        }
        [self.p[1] / e, self.p[2] / e, self.p[3] / e]
    }

    /// Lorentz boost with velocity `beta`
    ///
    /// Returns the null vector for velocities at or above the speed of
    /// light.
    pub fn boost(&self, beta: [f64; 3]) -> FourVector {
        let b2: f64 = beta.iter().map(|b| b * b).sum();
        if b2 == 0. {
            return *self;
        }
        if b2 >= 1. || !b2.is_finite() {
            return FourVector::new();
        }
        let gamma = 1. / (1. - b2).sqrt();
        let bp: f64 = (0..3).map(|i| beta[i] * self.p[i + 1]).sum();
        let gamma2 = (gamma - 1.) / b2;
        let e = self.p[0];
        let mut p = [gamma * (e + bp), 0., 0., 0.];
        for i in 0..3 {
            p[i + 1] = self.p[i + 1] + gamma2 * bp * beta[i] + gamma * beta[i] * e;
        }
        FourVector { p }
    }

    /// The vector with reversed spatial components and the same energy
    pub fn spatially_reflected(&self) -> FourVector {
        let [e, px, py, pz] = self.p;
        FourVector {
            p: [e, -px, -py, -pz],
        }
    }

    /// Boost into the rest frame of `frame`
    ///
    /// This is a boost with the velocity of the spatially reflected
    /// frame.
    pub fn boost_to_rest_frame_of(&self, frame: &FourVector) -> FourVector {
        self.boost(frame.spatially_reflected().beta())
    }

    const fn len() -> usize {
        4
    }
}

fn along_beam(pz: f64) -> f64 {
    if pz == 0. {
        0.
    } else {
        MAX_PSEUDORAPIDITY.copysign(pz)
    }
}

/// Wrap an azimuthal angle difference into (-π, π]
pub fn wrap_phi(mut dphi: f64) -> f64 {
    if !dphi.is_finite() {
        return dphi;
    }
    while dphi > PI {
        dphi -= 2. * PI;
    }
    while dphi <= -PI {
        dphi += 2. * PI;
    }
    dphi
}

/// Squared angular distance between two (η, φ) points
pub fn delta_r2(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = wrap_phi(phi1 - phi2);
    deta * deta + dphi * dphi
}

impl From<[f64; 4]> for FourVector {
    fn from(p: [f64; 4]) -> FourVector {
        FourVector { p }
    }
}

impl From<FourVector> for [f64; 4] {
    fn from(p: FourVector) -> Self {
        p.p
    }
}

impl Index<usize> for FourVector {
    type Output = f64;

    fn index(&self, i: usize) -> &Self::Output {
        &self.p[i]
    }
}

impl AddAssign for FourVector {
    fn add_assign(&mut self, rhs: FourVector) {
        for i in 0..Self::len() {
            self.p[i] += rhs[i]
        }
    }
}

impl SubAssign for FourVector {
    fn sub_assign(&mut self, rhs: FourVector) {
        for i in 0..Self::len() {
            self.p[i] -= rhs[i]
        }
    }
}

impl Add for FourVector {
    type Output = Self;

    fn add(mut self, rhs: FourVector) -> Self::Output {
        self += rhs;
        self
    }
}

impl Sub for FourVector {
    type Output = Self;

    fn sub(mut self, rhs: FourVector) -> Self::Output {
        self -= rhs;
        self
    }
}

impl Sum for FourVector {
    fn sum<I: Iterator<Item = FourVector>>(iter: I) -> Self {
        iter.fold(FourVector::new(), Add::add)
    }
}

impl<'a> Sum<&'a FourVector> for FourVector {
    fn sum<I: Iterator<Item = &'a FourVector>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
