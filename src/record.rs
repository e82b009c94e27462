use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::cluster::Jet;
use crate::four_vector::FourVector;
use crate::shape::JetObservables;

/// How far the analysis of an event got
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
pub enum Outcome {
    /// SUEP and ISR candidates were found
    #[default]
    Success,
    /// Fewer than two jets passed the selection
    NoCandidates,
    /// The event has no tracks
    EmptyEvent,
}

/// Basic kinematics of a single object
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct Kinematics {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
}

impl From<&FourVector> for Kinematics {
    fn from(p: &FourVector) -> Self {
        Self {
            pt: p.pt(),
            eta: p.eta(),
            phi: p.phi(),
            mass: p.m(),
        }
    }
}

/// Kinematics of a jet candidate
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct CandidateRecord {
    #[serde(flatten)]
    pub kinematics: Kinematics,
    /// Number of constituents
    pub nconst: usize,
}

impl From<&Jet> for CandidateRecord {
    fn from(jet: &Jet) -> Self {
        Self {
            kinematics: jet.p().into(),
            nconst: jet.nconstituents(),
        }
    }
}

/// The SUEP candidate with its shape observables
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SuepRecord {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    #[serde(flatten)]
    pub observables: JetObservables,
}

/// Analysis result for a single event
///
/// Event-level fields are `None` for empty events, candidate fields are
/// `None` unless the outcome is [Outcome::Success].
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Record {
    /// Index of the event
    pub event: usize,
    pub label: String,
    pub outcome: Outcome,
    pub weight: f64,
    /// Scalar sum of the transverse momenta of all selected jets
    pub ht: Option<f64>,
    pub ntracks: Option<usize>,
    pub njets: Option<usize>,
    pub pv_npvs: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub triggers: BTreeMap<String, bool>,
    pub suep: Option<SuepRecord>,
    pub isr: Option<CandidateRecord>,
    /// Absolute azimuthal distance between SUEP and ISR candidate
    pub dphi_suep_isr: Option<f64>,
    /// Generator-level scalar mediator
    pub scalar: Option<Kinematics>,
}

/// Record entries that can be used for histograms and cuts
#[derive(
    Deserialize,
    Serialize,
    Display,
    EnumString,
    EnumIter,
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(into = "String", try_from = "String")]
pub enum Variable {
    /// SUEP sphericity
    #[strum(serialize = "spher")]
    Sphericity,
    /// SUEP aplanarity
    #[strum(serialize = "aplan")]
    Aplanarity,
    #[strum(serialize = "C")]
    C,
    #[strum(serialize = "D")]
    D,
    /// SUEP constituent multiplicity
    #[strum(serialize = "nconst")]
    NConst,
    /// Second Fox-Wolfram moment of the SUEP candidate
    #[strum(serialize = "FW2M")]
    Fw2,
    #[strum(serialize = "girth")]
    Girth,
    #[strum(serialize = "rho0")]
    Rho0,
    #[strum(serialize = "rho1")]
    Rho1,
    /// SUEP transverse momentum
    #[strum(serialize = "pt")]
    Pt,
    #[strum(serialize = "pt_avg")]
    PtAvg,
    #[strum(serialize = "pt_avg_b")]
    PtAvgBoosted,
    #[strum(serialize = "ntracks")]
    NTracks,
    #[strum(serialize = "njets")]
    NJets,
    #[strum(serialize = "ht")]
    Ht,
    #[strum(serialize = "PV")]
    PvNpvs,
    #[strum(serialize = "dphi_SUEP_ISR")]
    DeltaPhiSuepIsr,
}

impl From<Variable> for String {
    fn from(var: Variable) -> Self {
        var.to_string()
    }
}

impl TryFrom<String> for Variable {
    type Error = strum::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Record {
    /// The value of the given variable, if available
    pub fn get(&self, var: Variable) -> Option<f64> {
        use Variable::*;
        let suep = self.suep.as_ref();
        let obs = suep.map(|s| &s.observables);
        match var {
            Sphericity => obs.map(|o| o.shape.sphericity),
            Aplanarity => obs.map(|o| o.shape.aplanarity),
            C => obs.map(|o| o.shape.c),
            D => obs.map(|o| o.shape.d),
            NConst => suep.map(|s| s.candidate.nconst as f64),
            Fw2 => obs.map(|o| o.fw2),
            Girth => obs.map(|o| o.girth),
            Rho0 => obs.and_then(|o| o.density.first().copied()),
            Rho1 => obs.and_then(|o| o.density.get(1).copied()),
            Pt => suep.map(|s| s.candidate.kinematics.pt),
            PtAvg => obs.map(|o| o.pt_avg),
            PtAvgBoosted => obs.map(|o| o.pt_avg_boosted),
            NTracks => self.ntracks.map(|n| n as f64),
            NJets => self.njets.map(|n| n as f64),
            Ht => self.ht,
            PvNpvs => self.pv_npvs.map(f64::from),
            DeltaPhiSuepIsr => self.dphi_suep_isr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn variable_names() {
        assert_eq!("spher".parse::<Variable>().unwrap(), Variable::Sphericity);
        assert_eq!("FW2M".parse::<Variable>().unwrap(), Variable::Fw2);
        assert_eq!(Variable::NConst.to_string(), "nconst");
        for var in Variable::iter() {
            assert_eq!(var.to_string().parse::<Variable>().unwrap(), var);
        }
        assert!("sphericity".parse::<Variable>().is_err());
    }

    #[test]
    fn missing_values() {
        let record = Record {
            outcome: Outcome::EmptyEvent,
            ..Default::default()
        };
        for var in Variable::iter() {
            assert_eq!(record.get(var), None);
        }
        let record = Record {
            outcome: Outcome::NoCandidates,
            ntracks: Some(4),
            ht: Some(0.),
            ..Default::default()
        };
        assert_eq!(record.get(Variable::NTracks), Some(4.));
        assert_eq!(record.get(Variable::Ht), Some(0.));
        assert_eq!(record.get(Variable::Sphericity), None);
    }
}
