use itertools::Itertools;
use log::debug;
use nalgebra::{Matrix3, SymmetricEigen};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::cluster::Jet;
use crate::four_vector::FourVector;

const EIGEN_MAX_ITER: usize = 1000;

/// Which momentum components enter the momentum tensor
#[derive(
    Deserialize,
    Serialize,
    Display,
    EnumString,
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[strum(ascii_case_insensitive)]
pub enum TensorKind {
    /// All three spatial components
    #[default]
    Spatial,
    /// Only the components transverse to the beam
    Transverse,
}

/// The normalised momentum tensor S_ab = Σ p_a p_b / Σ |p|²
///
/// Returns `None` if the momenta are all zero. For the transverse
/// tensor, the longitudinal row and column vanish.
pub fn momentum_tensor<'a, I>(momenta: I, kind: TensorKind) -> Option<Matrix3<f64>>
where
    I: IntoIterator<Item = &'a FourVector>,
{
    let mut tensor = Matrix3::zeros();
    let mut norm = 0.;
    for p in momenta {
        let mut v = p.spatial();
        if kind == TensorKind::Transverse {
            v[2] = 0.;
        }
        for a in 0..3 {
            for b in 0..3 {
                tensor[(a, b)] += v[a] * v[b];
            }
        }
        norm += v.iter().map(|c| c * c).sum::<f64>();
    }
    if norm > 0. {
        Some(tensor / norm)
    } else {
        None
    }
}

/// Eigenvalues of a symmetric matrix in descending order
///
/// Tiny negative eigenvalues from rounding are set to zero. Returns
/// `None` if the decomposition fails or produces non-finite values.
pub fn sorted_eigenvalues(tensor: Matrix3<f64>) -> Option<[f64; 3]> {
    let eigen = SymmetricEigen::try_new(tensor, f64::EPSILON, EIGEN_MAX_ITER)?;
    let mut ev = [
        eigen.eigenvalues[0],
        eigen.eigenvalues[1],
        eigen.eigenvalues[2],
    ];
    if ev.iter().any(|e| !e.is_finite()) {
        return None;
    }
    ev.sort_by(|a, b| b.total_cmp(a));
    Some(ev.map(|e| e.max(0.)))
}

/// Shape variables derived from the momentum tensor
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct EventShape {
    /// Eigenvalues λ1 ≥ λ2 ≥ λ3
    pub eigenvalues: [f64; 3],
    pub sphericity: f64,
    pub aplanarity: f64,
    /// C parameter 3(λ1λ2 + λ1λ3 + λ2λ3)
    pub c: f64,
    /// D parameter 27 λ1λ2λ3
    pub d: f64,
}

impl Default for EventShape {
    fn default() -> Self {
        Self {
            eigenvalues: [f64::NAN; 3],
            sphericity: f64::NAN,
            aplanarity: f64::NAN,
            c: f64::NAN,
            d: f64::NAN,
        }
    }
}

impl EventShape {
    /// Shape of the given momenta
    ///
    /// All entries are NaN if the tensor is undefined or cannot be
    /// diagonalised.
    pub fn new<'a, I>(momenta: I, kind: TensorKind) -> Self
    where
        I: IntoIterator<Item = &'a FourVector>,
    {
        let Some(tensor) = momentum_tensor(momenta, kind) else {
            return Self::default();
        };
        let Some(ev) = sorted_eigenvalues(tensor) else {
            debug!("Failed to diagonalise momentum tensor {tensor}");
            return Self::default();
        };
        Self::from_eigenvalues(ev, kind)
    }

    /// Shape variables for the sorted eigenvalues of a momentum tensor
    pub fn from_eigenvalues(ev: [f64; 3], kind: TensorKind) -> Self {
        let [l1, l2, l3] = ev;
        let (sphericity, aplanarity) = match kind {
            TensorKind::Spatial => (1.5 * (l2 + l3), 1.5 * l3),
            TensorKind::Transverse => (2. * l2, 0.),
        };
        Self {
            eigenvalues: ev,
            sphericity,
            aplanarity,
            c: 3. * (l1 * l2 + l1 * l3 + l2 * l3),
            d: 27. * l1 * l2 * l3,
        }
    }
}

fn legendre(l: usize, x: f64) -> f64 {
    let (mut p0, mut p1) = (1., x);
    if l == 0 {
        return p0;
    }
    for n in 1..l {
        let n = n as f64;
        let p2 = ((2. * n + 1.) * x * p1 - n * p0) / (n + 1.);
        p0 = p1;
        p1 = p2;
    }
    p1
}

/// Fox-Wolfram moment H_l / H_0 of the given momenta
///
/// H_l = Σ_ij |p_i||p_j| P_l(cos θ_ij), with P_l the Legendre
/// polynomials. The normalisation H_0 is (Σ_i |p_i|)². Returns NaN if
/// all momenta vanish.
pub fn fox_wolfram_moment(momenta: &[FourVector], l: usize) -> f64 {
    let norms: Vec<f64> = momenta.iter().map(|p| p.spatial_norm()).collect();
    let h0 = norms.iter().sum::<f64>().powi(2);
    if h0 == 0. {
        return f64::NAN;
    }
    let mut hl = 0.;
    for i in 0..momenta.len() {
        if norms[i] == 0. {
            continue;
        }
        // diagonal: cos θ = 1
        hl += norms[i] * norms[i] * legendre(l, 1.);
        for j in (i + 1)..momenta.len() {
            if norms[j] == 0. {
                continue;
            }
            let [xi, yi, zi] = momenta[i].spatial();
            let [xj, yj, zj] = momenta[j].spatial();
            let cos = ((xi * xj + yi * yj + zi * zj) / (norms[i] * norms[j]))
                .clamp(-1., 1.);
            hl += 2. * norms[i] * norms[j] * legendre(l, cos);
        }
    }
    hl / h0
}

/// Transverse-momentum weighted mean distance of `constituents` from
/// `axis` in the (η, φ) plane
pub fn girth<'a, I>(constituents: I, axis: &FourVector) -> f64
where
    I: IntoIterator<Item = &'a FourVector>,
{
    let (weighted, pt_sum) = constituents
        .into_iter()
        .fold((0., 0.), |(w, s), p| (w + p.pt() * p.delta_r(axis), s + p.pt()));
    if pt_sum > 0. {
        weighted / pt_sum
    } else {
        0.
    }
}

/// Radial transverse-momentum density profile around `axis`
///
/// For consecutive `edges` e_k, e_{k+1}, the entry k is the transverse
/// momentum of the constituents with e_k ≤ ΔR < e_{k+1}, divided by the
/// transverse momentum of the axis and the ring width.
pub fn density_profile<'a, I>(constituents: I, axis: &FourVector, edges: &[f64]) -> Vec<f64>
where
    I: IntoIterator<Item = &'a FourVector>,
{
    let nbins = edges.len().saturating_sub(1);
    let mut density = vec![0.; nbins];
    let axis_pt = axis.pt();
    if nbins == 0 || axis_pt == 0. {
        return density;
    }
    for p in constituents {
        let dr = p.delta_r(axis);
        let Some(bin) = edges.windows(2).position(|e| e[0] <= dr && dr < e[1])
        else {
            continue;
        };
        density[bin] += p.pt();
    }
    for (rho, (lo, hi)) in density.iter_mut().zip(edges.iter().tuple_windows()) {
        *rho /= axis_pt * (hi - lo);
    }
    density
}

/// Observables of a SUEP candidate jet
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct JetObservables {
    #[serde(flatten)]
    pub shape: EventShape,
    /// Second Fox-Wolfram moment
    pub fw2: f64,
    pub girth: f64,
    pub density: Vec<f64>,
    /// Mean constituent transverse momentum in the laboratory frame
    pub pt_avg: f64,
    /// Mean constituent transverse momentum in the frame used for the
    /// shape variables
    pub pt_avg_boosted: f64,
}

/// Settings for [JetObservables::new]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShapeSettings<'a> {
    /// Evaluate the shape variables in the jet rest frame
    pub boost: bool,
    pub tensor: TensorKind,
    /// Edges of the rings for the density profile
    pub density_bin_edges: &'a [f64],
}

impl JetObservables {
    /// Compute observables for `jet` clustered from `particles`
    ///
    /// Shape variables and the Fox-Wolfram moment are NaN for jets with
    /// fewer than two constituents. Girth and density are always
    /// evaluated in the laboratory frame.
    pub fn new(jet: &Jet, particles: &[FourVector], settings: &ShapeSettings) -> Self {
        let lab: Vec<FourVector> = jet.constituent_momenta(particles).copied().collect();
        let frame: Vec<FourVector> = if settings.boost {
            lab.iter().map(|p| p.boost_to_rest_frame_of(jet.p())).collect()
        } else {
            lab.clone()
        };
        if lab.len() < 2 {
            let nbins = settings.density_bin_edges.len().saturating_sub(1);
            return Self {
                shape: EventShape::default(),
                fw2: f64::NAN,
                girth: 0.,
                density: vec![0.; nbins],
                pt_avg: mean_pt(&lab),
                pt_avg_boosted: mean_pt(&frame),
            };
        }
        Self {
            shape: EventShape::new(&frame, settings.tensor),
            fw2: fox_wolfram_moment(&frame, 2),
            girth: girth(&lab, jet.p()),
            density: density_profile(&lab, jet.p(), settings.density_bin_edges),
            pt_avg: mean_pt(&lab),
            pt_avg_boosted: mean_pt(&frame),
        }
    }
}

fn mean_pt(momenta: &[FourVector]) -> f64 {
    if momenta.is_empty() {
        return f64::NAN;
    }
    momenta.iter().map(|p| p.pt()).sum::<f64>() / momenta.len() as f64
}
