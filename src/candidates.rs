use serde::{Deserialize, Serialize};
use strum::Display;

use crate::cluster::Jet;

/// Role of a jet in the event interpretation
#[derive(
    Deserialize,
    Serialize,
    Display,
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
pub enum Role {
    #[default]
    Unassigned,
    /// Candidate for a soft unclustered energy pattern
    #[strum(to_string = "SUEP")]
    Suep,
    /// Candidate for initial-state radiation
    #[strum(to_string = "ISR")]
    Isr,
}

/// A jet together with its role
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct TaggedJet {
    pub jet: Jet,
    pub role: Role,
}

/// Jets of an event with SUEP and ISR candidates assigned
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct Selection {
    jets: Vec<TaggedJet>,
    suep: Option<usize>,
    isr: Option<usize>,
}

impl Selection {
    /// Assign candidate roles to `jets`
    ///
    /// The jets are ordered by descending transverse momentum, keeping
    /// the original order for equal momenta. Out of the two leading
    /// jets, the one with more constituents is the SUEP candidate and
    /// the other one the ISR candidate. For equal multiplicities the
    /// softer jet is the SUEP candidate. With fewer than two jets, no
    /// roles are assigned.
    pub fn new(mut jets: Vec<Jet>) -> Self {
        jets.sort_by(|a, b| b.pt().total_cmp(&a.pt()));
        let mut jets: Vec<_> = jets
            .into_iter()
            .map(|jet| TaggedJet {
                jet,
                role: Role::Unassigned,
            })
            .collect();
        if jets.len() < 2 {
            return Self {
                jets,
                suep: None,
                isr: None,
            };
        }
        let (suep, isr) =
            if jets[0].jet.nconstituents() > jets[1].jet.nconstituents() {
                (0, 1)
            } else {
                (1, 0)
            };
        jets[suep].role = Role::Suep;
        jets[isr].role = Role::Isr;
        Self {
            jets,
            suep: Some(suep),
            isr: Some(isr),
        }
    }

    /// All jets ordered by descending transverse momentum
    pub fn jets(&self) -> &[TaggedJet] {
        &self.jets
    }

    pub fn suep(&self) -> Option<&Jet> {
        self.suep.map(|n| &self.jets[n].jet)
    }

    pub fn isr(&self) -> Option<&Jet> {
        self.isr.map(|n| &self.jets[n].jet)
    }

    /// The SUEP and ISR candidates, if assigned
    pub fn candidates(&self) -> Option<(&Jet, &Jet)> {
        self.suep().zip(self.isr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{cluster, JetAlgorithm, JetDefinition};
    use crate::four_vector::FourVector;

    fn jet(particles: &[FourVector]) -> Jet {
        let def = JetDefinition {
            algorithm: JetAlgorithm::AntiKt,
            radius: 10.,
            min_pt: 0.,
        };
        let mut jets = cluster(particles, &def).unwrap().into_sorted_jets();
        assert_eq!(jets.len(), 1);
        jets.pop().unwrap()
    }

    fn collinear(n: usize, pt: f64, phi: f64) -> Vec<FourVector> {
        (0..n)
            .map(|k| {
                FourVector::from_pt_eta_phi_m(pt, 0.01 * k as f64, phi, 0.)
            })
            .collect()
    }

    #[test]
    fn fewer_than_two_jets() {
        let selection = Selection::new(vec![]);
        assert!(selection.candidates().is_none());

        let selection = Selection::new(vec![jet(&collinear(3, 10., 0.))]);
        assert!(selection.suep().is_none());
        assert!(selection.isr().is_none());
        assert_eq!(selection.jets()[0].role, Role::Unassigned);
    }

    #[test]
    fn multiplicity_decides() {
        let hard = jet(&collinear(2, 200., 0.));
        let soft = jet(&collinear(10, 5., 3.));
        let selection = Selection::new(vec![hard.clone(), soft.clone()]);
        assert_eq!(selection.suep(), Some(&soft));
        assert_eq!(selection.isr(), Some(&hard));
        assert_eq!(selection.jets()[0].role, Role::Isr);
        assert_eq!(selection.jets()[1].role, Role::Suep);
    }

    #[test]
    fn equal_multiplicity_prefers_softer_jet() {
        let harder = jet(&collinear(4, 50., 0.));
        let softer = jet(&collinear(4, 30., 3.));
        for jets in [
            vec![harder.clone(), softer.clone()],
            vec![softer.clone(), harder.clone()],
        ] {
            let selection = Selection::new(jets);
            assert_eq!(selection.suep(), Some(&softer));
            assert_eq!(selection.isr(), Some(&harder));
        }
    }

    #[test]
    fn only_two_leading_jets_get_roles() {
        let jets = vec![
            jet(&collinear(20, 1., 0.)),
            jet(&collinear(2, 100., 2.)),
            jet(&collinear(3, 60., -2.)),
        ];
        let selection = Selection::new(jets);
        let roles: Vec<_> = selection.jets().iter().map(|j| j.role).collect();
        assert_eq!(roles, [Role::Isr, Role::Suep, Role::Unassigned]);
    }
}
