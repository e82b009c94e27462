use std::{
    fmt::{self, Display},
    str::FromStr,
};

use log::trace;
use noisy_float::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::four_vector::{delta_r2, FourVector};

/// Placeholder for an unknown jet algorithm
#[derive(Debug, Clone, Error)]
pub struct UnknownJetAlgorithm(String);

impl Display for UnknownJetAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown jet algorithm: {}", self.0)
    }
}

impl FromStr for JetAlgorithm {
    type Err = UnknownJetAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anti_kt" | "antikt" | "anti-kt" => Ok(Self::AntiKt),
            "kt" => Ok(Self::Kt),
            "Cambridge/Aachen" | "Cambridge-Aachen" | "Cambridge_Aachen"
            | "cambridge/aachen" | "cambridge-aachen" | "cambridge_aachen" => {
                Ok(Self::CambridgeAachen)
            }
            _ => match s.parse::<f64>() {
                Ok(p) if p.is_finite() => Ok(Self::from_exponent(p)),
                _ => Err(UnknownJetAlgorithm(s.to_string())),
            },
        }
    }
}

/// Jet clustering algorithms
#[derive(Deserialize, Serialize, Debug, Copy, Clone, PartialEq)]
pub enum JetAlgorithm {
    /// The [anti-kt](https://arxiv.org/abs/0802.1189) algorithm
    AntiKt,
    /// The [Cambridge](https://arxiv.org/abs/hep-ph/9707323)/[Aachen](https://arxiv.org/abs/hep-ph/9907280) algorithm
    CambridgeAachen,
    /// The [kt](https://arxiv.org/abs/hep-ph/9305266) algorithm
    Kt,
    /// Generalised kt with the given exponent
    GenKt(f64),
}

impl JetAlgorithm {
    /// The algorithm corresponding to the exponent `p` in the
    /// generalised-kt distance
    pub fn from_exponent(p: f64) -> Self {
        if p == -1. {
            Self::AntiKt
        } else if p == 0. {
            Self::CambridgeAachen
        } else if p == 1. {
            Self::Kt
        } else {
            Self::GenKt(p)
        }
    }

    /// The exponent `p` in the generalised-kt distance
    pub fn exponent(&self) -> f64 {
        match self {
            Self::AntiKt => -1.,
            Self::CambridgeAachen => 0.,
            Self::Kt => 1.,
            Self::GenKt(p) => *p,
        }
    }
}

impl Display for JetAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AntiKt => write!(f, "anti-kt"),
            Self::CambridgeAachen => write!(f, "Cambridge/Aachen"),
            Self::Kt => write!(f, "kt"),
            Self::GenKt(p) => write!(f, "generalised kt (p = {p})"),
        }
    }
}

/// Definition of a jet
#[derive(Deserialize, Serialize, Debug, Copy, Clone, PartialEq)]
pub struct JetDefinition {
    /// Jet algorithm
    pub algorithm: JetAlgorithm,
    /// Jet radius parameter
    pub radius: f64,
    /// Minimum jet transverse momentum
    pub min_pt: f64,
}

/// Jet definition that cannot be used for clustering
#[derive(Debug, Copy, Clone, PartialEq, Error)]
pub enum InvalidJetDefinition {
    #[error("Jet radius has to be positive and finite, is {0}")]
    Radius(f64),
    #[error("Exponent of the jet algorithm has to be finite, is {0}")]
    Exponent(f64),
    #[error("Minimum jet transverse momentum is {0}")]
    MinPt(f64),
}

impl JetDefinition {
    /// Check that the definition gives well-defined distances
    pub fn validate(&self) -> Result<(), InvalidJetDefinition> {
        let r = self.radius;
        if !(r > 0. && r.is_finite()) || !(1. / (r * r)).is_finite() {
            return Err(InvalidJetDefinition::Radius(r));
        }
        let exponent = self.algorithm.exponent();
        if !exponent.is_finite() {
            return Err(InvalidJetDefinition::Exponent(exponent));
        }
        if self.min_pt.is_nan() {
            return Err(InvalidJetDefinition::MinPt(self.min_pt));
        }
        Ok(())
    }
}

/// A jet built from a subset of an event's particles
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Jet {
    p: FourVector,
    constituents: Vec<usize>,
}

impl Jet {
    /// Jet momentum
    pub fn p(&self) -> &FourVector {
        &self.p
    }

    pub fn pt(&self) -> f64 {
        self.p.pt()
    }

    /// Indices of the constituents in the clustered particle list
    pub fn constituents(&self) -> &[usize] {
        &self.constituents
    }

    pub fn nconstituents(&self) -> usize {
        self.constituents.len()
    }

    /// Momenta of the constituents
    ///
    /// `particles` has to be the particle list the jet was clustered from.
    pub fn constituent_momenta<'a>(
        &'a self,
        particles: &'a [FourVector],
    ) -> impl Iterator<Item = &'a FourVector> + 'a {
        self.constituents.iter().map(|&i| &particles[i])
    }
}

/// Outcome of clustering an event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterSequence {
    jets: Vec<Jet>,
    rejected: Vec<Jet>,
    membership: Vec<Option<usize>>,
}

impl ClusterSequence {
    /// Jets passing the transverse momentum cut, in clustering order
    pub fn jets(&self) -> &[Jet] {
        &self.jets
    }

    /// Jets failing the transverse momentum cut, in clustering order
    pub fn rejected(&self) -> &[Jet] {
        &self.rejected
    }

    /// For each particle, the index of the accepted jet it belongs to
    pub fn membership(&self) -> &[Option<usize>] {
        &self.membership
    }

    /// Accepted jets sorted by descending transverse momentum
    ///
    /// Jets with equal transverse momentum keep their clustering order.
    pub fn into_sorted_jets(self) -> Vec<Jet> {
        let mut jets = self.jets;
        jets.sort_by_key(|jet| std::cmp::Reverse(n64(jet.pt())));
        jets
    }
}

#[derive(Debug, Clone)]
struct PseudoJet {
    p: FourVector,
    eta: f64,
    phi: f64,
    kt2p: N64,
    constituents: Vec<usize>,
}

impl PseudoJet {
    fn new(p: FourVector, constituents: Vec<usize>, exponent: f64) -> Self {
        Self {
            eta: p.eta(),
            phi: p.phi(),
            kt2p: n64(p.pt2().powf(exponent)),
            p,
            constituents,
        }
    }
}

// candidates are ordered by distance, then by the position at which a
// scan over the working set (beam before pairs, pairs by ascending
// partner) first encounters them
type Key = (N64, usize, usize);

fn pair_key(d: N64, i: usize, j: usize) -> Key {
    (d, i.min(j), i.max(j))
}

fn beam_key(d: N64, i: usize) -> Key {
    (d, i, i)
}

struct Sequence {
    slots: Vec<Option<PseudoJet>>,
    nearest: Vec<Option<(N64, usize)>>,
    inv_r2: f64,
}

impl Sequence {
    fn distance(&self, i: usize, j: usize) -> N64 {
        let (Some(a), Some(b)) = (&self.slots[i], &self.slots[j]) else {
            unreachable!("distance to inactive pseudojet")
        };
        let dr2 = delta_r2(a.eta, a.phi, b.eta, b.phi);
        if dr2 == 0. {
            return n64(0.);
        }
        std::cmp::min(a.kt2p, b.kt2p) * n64(dr2 * self.inv_r2)
    }

    fn update_nearest(&mut self, i: usize) {
        let mut best: Option<(Key, usize)> = None;
        for j in 0..self.slots.len() {
            if j == i || self.slots[j].is_none() {
                continue;
            }
            let key = pair_key(self.distance(i, j), i, j);
            if best.map_or(true, |(b, _)| key < b) {
                best = Some((key, j));
            }
        }
        self.nearest[i] = best.map(|((d, _, _), j)| (d, j));
    }

    fn active(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
    }

    fn next_step(&self) -> Option<Step> {
        let mut best: Option<(Key, Step)> = None;
        let mut consider = |key: Key, step: Step| {
            if best.map_or(true, |(b, _)| key < b) {
                best = Some((key, step));
            }
        };
        for i in self.active() {
            let Some(pj) = &self.slots[i] else {
                unreachable!()
            };
            consider(beam_key(pj.kt2p, i), Step::Finalise(i));
            if let Some((d, j)) = self.nearest[i] {
                consider(pair_key(d, i, j), Step::Merge(i.min(j), i.max(j)));
            }
        }
        best.map(|(_, step)| step)
    }

    // pseudojets whose nearest neighbour was one of `changed`
    fn stale(&self, changed: &[usize]) -> Vec<usize> {
        self.active()
            .filter(|&k| {
                self.nearest[k].map_or(false, |(_, j)| changed.contains(&j))
                    || self.nearest[k].is_none()
            })
            .collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Step {
    Merge(usize, usize),
    Finalise(usize),
}

/// Cluster `particles` into jets
///
/// This is exclusive sequential recombination with the generalised-kt
/// distances
///
///   d_ij = min(pt_i^(2p), pt_j^(2p)) ΔR_ij² / R²,
///   d_iB = pt_i^(2p),
///
/// where ΔR is measured in pseudorapidity and azimuth. Merged
/// pseudojets take the lower of the two working-set positions. Jets
/// below the minimum transverse momentum are rejected.
pub fn cluster(
    particles: &[FourVector],
    jet_def: &JetDefinition,
) -> Result<ClusterSequence, InvalidJetDefinition> {
    jet_def.validate()?;
    let exponent = jet_def.algorithm.exponent();
    let r = jet_def.radius;
    let slots: Vec<_> = particles
        .iter()
        .enumerate()
        .map(|(i, p)| Some(PseudoJet::new(*p, vec![i], exponent)))
        .collect();
    let mut seq = Sequence {
        nearest: vec![None; slots.len()],
        slots,
        inv_r2: 1. / (r * r),
    };
    for i in 0..seq.slots.len() {
        seq.update_nearest(i);
    }

    let mut finalised = Vec::new();
    while let Some(step) = seq.next_step() {
        trace!("clustering step: {step:?}");
        match step {
            Step::Merge(i, j) => {
                let (Some(a), Some(b)) = (seq.slots[i].take(), seq.slots[j].take())
                else {
                    unreachable!("merging inactive pseudojets")
                };
                let mut constituents = a.constituents;
                constituents.extend(b.constituents);
                seq.slots[i] = Some(PseudoJet::new(a.p + b.p, constituents, exponent));
                seq.nearest[j] = None;
                for k in seq.stale(&[i, j]) {
                    if k != i {
                        seq.update_nearest(k);
                    }
                }
                // the merged pseudojet may now be closest to anyone
                for k in seq.active().collect::<Vec<_>>() {
                    if k == i {
                        continue;
                    }
                    let d = seq.distance(k, i);
                    let key = pair_key(d, k, i);
                    let better = match seq.nearest[k] {
                        Some((dk, jk)) => key < pair_key(dk, k, jk),
                        None => true,
                    };
                    if better {
                        seq.nearest[k] = Some((d, i));
                    }
                }
                seq.update_nearest(i);
            }
            Step::Finalise(i) => {
                let Some(pj) = seq.slots[i].take() else {
                    unreachable!("finalising inactive pseudojet")
                };
                seq.nearest[i] = None;
                for k in seq.stale(&[i]) {
                    seq.update_nearest(k);
                }
                finalised.push(Jet {
                    p: pj.p,
                    constituents: pj.constituents,
                });
            }
        }
    }

    let mut membership = vec![None; particles.len()];
    let mut jets = Vec::new();
    let mut rejected = Vec::new();
    for jet in finalised {
        if jet.pt() >= jet_def.min_pt {
            for &c in &jet.constituents {
                membership[c] = Some(jets.len());
            }
            jets.push(jet);
        } else {
            rejected.push(jet);
        }
    }
    Ok(ClusterSequence {
        jets,
        rejected,
        membership,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn anti_kt(radius: f64, min_pt: f64) -> JetDefinition {
        JetDefinition {
            algorithm: JetAlgorithm::AntiKt,
            radius,
            min_pt,
        }
    }

    // reference implementation scanning all pairs at each step
    fn cluster_naive(particles: &[FourVector], jet_def: &JetDefinition) -> Vec<Jet> {
        let p = jet_def.algorithm.exponent();
        let r2 = jet_def.radius * jet_def.radius;
        let mut slots: Vec<Option<(FourVector, Vec<usize>)>> = particles
            .iter()
            .enumerate()
            .map(|(i, p)| Some((*p, vec![i])))
            .collect();
        let inv_r2 = 1. / r2;
        let kt2p = |q: &FourVector| n64(q.pt2().powf(p));
        let mut jets = Vec::new();
        loop {
            let mut best: Option<(N64, Step)> = None;
            for i in 0..slots.len() {
                let Some((pi, _)) = &slots[i] else { continue };
                let d = kt2p(pi);
                if best.map_or(true, |(b, _)| d < b) {
                    best = Some((d, Step::Finalise(i)));
                }
                for j in (i + 1)..slots.len() {
                    let Some((pj, _)) = &slots[j] else { continue };
                    let dr2 = pi.delta_r2(pj);
                    let d = if dr2 == 0. {
                        n64(0.)
                    } else {
                        std::cmp::min(kt2p(pi), kt2p(pj)) * n64(dr2 * inv_r2)
                    };
                    if best.map_or(true, |(b, _)| d < b) {
                        best = Some((d, Step::Merge(i, j)));
                    }
                }
            }
            match best {
                None => break,
                Some((_, Step::Finalise(i))) => {
                    let (p, constituents) = slots[i].take().unwrap();
                    jets.push(Jet { p, constituents });
                }
                Some((_, Step::Merge(i, j))) => {
                    let (pi, mut ci) = slots[i].take().unwrap();
                    let (pj, cj) = slots[j].take().unwrap();
                    ci.extend(cj);
                    slots[i] = Some((pi + pj, ci));
                }
            }
        }
        jets.retain(|j| j.pt() >= jet_def.min_pt);
        jets
    }

    fn spray(n: usize, pt: f64, eta0: f64, phi0: f64, width: f64) -> Vec<FourVector> {
        (0..n)
            .map(|k| {
                let a = 2. * PI * k as f64 / n as f64;
                let rr = width * (0.3 + 0.7 * ((k * 7 % n) as f64 / n as f64));
                FourVector::from_pt_eta_phi_m(
                    pt * (1. + 0.1 * k as f64),
                    eta0 + rr * a.cos(),
                    phi0 + rr * a.sin(),
                    0.,
                )
            })
            .collect()
    }

    #[test]
    fn empty_and_single() {
        log_init();
        let def = anti_kt(1.5, 0.);
        let seq = cluster(&[], &def).unwrap();
        assert!(seq.jets().is_empty());
        assert!(seq.membership().is_empty());

        let p = FourVector::from_pt_eta_phi_m(20., 0.3, -2., 1.);
        let seq = cluster(&[p], &def).unwrap();
        assert_eq!(seq.jets().len(), 1);
        assert_eq!(seq.jets()[0].p(), &p);
        assert_eq!(seq.jets()[0].constituents(), &[0]);
        assert_eq!(seq.membership(), &[Some(0)]);
    }

    #[test]
    fn conserves_momentum() {
        log_init();
        let mut particles = spray(15, 3., 0.5, 1., 0.8);
        particles.extend(spray(6, 40., -1., -2., 0.4));
        particles.extend(spray(4, 1., 2.2, 3.1, 0.3));
        for algorithm in [JetAlgorithm::AntiKt, JetAlgorithm::Kt, JetAlgorithm::CambridgeAachen] {
            let def = JetDefinition {
                algorithm,
                radius: 0.8,
                min_pt: 30.,
            };
            let seq = cluster(&particles, &def).unwrap();
            let total: FourVector = particles.iter().sum();
            let clustered: FourVector = seq
                .jets()
                .iter()
                .chain(seq.rejected())
                .map(|j| *j.p())
                .sum();
            for mu in 0..4 {
                assert_abs_diff_eq!(total[mu], clustered[mu], epsilon = 1e-9);
            }
            let nconst: usize = seq
                .jets()
                .iter()
                .chain(seq.rejected())
                .map(|j| j.nconstituents())
                .sum();
            assert_eq!(nconst, particles.len());
        }
    }

    #[test]
    fn membership_matches_constituents() {
        log_init();
        let mut particles = spray(10, 5., 0., 0., 0.5);
        particles.extend(spray(3, 0.5, 2., 2., 0.2));
        let seq = cluster(&particles, &anti_kt(1.0, 10.)).unwrap();
        for (n, jet) in seq.jets().iter().enumerate() {
            for &c in jet.constituents() {
                assert_eq!(seq.membership()[c], Some(n));
            }
        }
        for jet in seq.rejected() {
            for &c in jet.constituents() {
                assert_eq!(seq.membership()[c], None);
            }
        }
    }

    #[test]
    fn agrees_with_naive_search() {
        log_init();
        let mut particles = spray(25, 2., 0., 0., 1.2);
        particles.extend(spray(12, 15., 0.8, 2.5, 0.6));
        particles.extend(spray(7, 0.8, -1.5, -1.5, 1.));
        // exact ties in the distances
        particles.push(FourVector::from_pt_eta_phi_m(4., 1., 1., 0.));
        particles.push(FourVector::from_pt_eta_phi_m(4., 1., 1., 0.));
        for p in [-1., 0., 1., -0.5] {
            let def = JetDefinition {
                algorithm: JetAlgorithm::from_exponent(p),
                radius: 1.5,
                min_pt: 0.,
            };
            let fast = cluster(&particles, &def).unwrap();
            let naive = cluster_naive(&particles, &def);
            assert_eq!(fast.jets(), naive.as_slice());
        }
    }

    #[test]
    fn zero_momentum_particles() {
        log_init();
        let particles = [
            FourVector::new(),
            FourVector::from_pt_eta_phi_m(10., 0., 0., 0.),
            FourVector::from([1., 0., 0., 1.]),
        ];
        let seq = cluster(&particles, &anti_kt(1.5, 0.)).unwrap();
        let n: usize = seq.jets().iter().map(|j| j.nconstituents()).sum();
        assert_eq!(n, 3);
    }

    #[test]
    fn sorted_jets() {
        log_init();
        let mut particles = spray(5, 1., 0., 0., 0.2);
        particles.extend(spray(5, 10., 0., PI, 0.2));
        let jets = cluster(&particles, &anti_kt(1.0, 0.)).unwrap().into_sorted_jets();
        assert_eq!(jets.len(), 2);
        assert!(jets[0].pt() > jets[1].pt());
    }

    #[test]
    fn invalid_definition() {
        let particles = spray(4, 10., 0., 0., 0.3);
        for radius in [0., -1., f64::NAN, f64::INFINITY, 1e-200] {
            let err = cluster(&particles, &anti_kt(radius, 0.)).unwrap_err();
            assert!(matches!(err, InvalidJetDefinition::Radius(_)));
        }
        let def = JetDefinition {
            algorithm: JetAlgorithm::GenKt(f64::NAN),
            radius: 1.,
            min_pt: 0.,
        };
        assert!(matches!(
            cluster(&particles, &def),
            Err(InvalidJetDefinition::Exponent(_))
        ));
        let mut def = anti_kt(1., 0.);
        def.min_pt = f64::NAN;
        assert!(def.validate().is_err());
        assert!(anti_kt(1., 0.).validate().is_ok());
    }

    #[test]
    fn parse_algorithm() {
        assert_eq!("anti-kt".parse::<JetAlgorithm>().unwrap(), JetAlgorithm::AntiKt);
        assert_eq!("kt".parse::<JetAlgorithm>().unwrap(), JetAlgorithm::Kt);
        assert_eq!(
            "cambridge_aachen".parse::<JetAlgorithm>().unwrap(),
            JetAlgorithm::CambridgeAachen
        );
        assert_eq!("-1".parse::<JetAlgorithm>().unwrap(), JetAlgorithm::AntiKt);
        assert_eq!("0.5".parse::<JetAlgorithm>().unwrap(), JetAlgorithm::GenKt(0.5));
        assert!("siscone".parse::<JetAlgorithm>().is_err());
    }
}
