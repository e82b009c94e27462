use std::io::Read;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::{InvalidJetDefinition, JetAlgorithm, JetDefinition};
use crate::event::TrackSelection;
use crate::shape::TensorKind;

/// Analysis settings
///
/// Every field can be omitted in a configuration file, in which case
/// the default is used.
#[derive(Builder, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[builder(default)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Jet radius parameter
    pub radius: f64,
    /// Minimum transverse momentum of reclustered jets
    pub min_jet_pt: f64,
    /// Exponent p of the generalised kt algorithm
    ///
    /// -1 is anti-kt, 0 Cambridge/Aachen, 1 kt.
    pub algorithm_exponent: f64,
    /// Whether to compute shape variables in the SUEP candidate rest frame
    pub boost_to_candidate_frame: bool,
    /// Ring edges in ΔR for the radial density profile
    pub density_bin_edges: Vec<f64>,
    pub tensor: TensorKind,
    /// Label attached to every record
    #[builder(setter(into))]
    pub label: String,
    /// Events where this trigger did not fire are skipped, e.g.
    /// `HLT_PFHT1050`
    #[builder(setter(into, strip_option))]
    pub required_trigger: Option<String>,
    /// Events with more primary vertices are skipped
    #[builder(setter(strip_option))]
    pub max_pv_npvs: Option<u32>,
    #[builder(setter(strip_option))]
    pub track_selection: Option<TrackSelection>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            radius: 1.5,
            min_jet_pt: 150.,
            algorithm_exponent: -1.,
            boost_to_candidate_frame: true,
            density_bin_edges: vec![0., 0.05, 0.10],
            tensor: TensorKind::default(),
            label: "ch".to_owned(),
            required_trigger: None,
            max_pv_npvs: None,
            track_selection: Some(TrackSelection::default()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Jet radius has to be positive and finite, got {0}")]
    InvalidRadius(f64),
    #[error("Jet algorithm exponent has to be finite, got {0}")]
    InvalidExponent(f64),
    #[error("Minimum jet transverse momentum has to be finite and non-negative, got {0}")]
    InvalidMinJetPt(f64),
    #[error("Need at least two density bin edges, got {0}")]
    TooFewDensityEdges(usize),
    #[error("Density bin edges have to be finite, non-negative, and strictly increasing: {0:?}")]
    InvalidDensityEdges(Vec<f64>),
    #[error("Invalid track selection: {0} = {1}")]
    InvalidTrackSelection(&'static str, f64),
    #[error("Invalid jet definition")]
    JetDefinition(#[from] InvalidJetDefinition),
    #[error("Failed to parse configuration")]
    Yaml(#[from] serde_yaml::Error),
}

impl AnalysisConfig {
    /// Read a configuration in YAML format and check it
    pub fn from_yaml_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all settings are admissible
    pub fn validate(&self) -> Result<(), ConfigError> {
        use ConfigError::*;

        if !(self.radius.is_finite() && self.radius > 0.) {
            return Err(InvalidRadius(self.radius));
        }
        if !self.algorithm_exponent.is_finite() {
            return Err(InvalidExponent(self.algorithm_exponent));
        }
        if !(self.min_jet_pt.is_finite() && self.min_jet_pt >= 0.) {
            return Err(InvalidMinJetPt(self.min_jet_pt));
        }
        let edges = &self.density_bin_edges;
        if edges.len() < 2 {
            return Err(TooFewDensityEdges(edges.len()));
        }
        let edges_ok = edges.iter().all(|e| e.is_finite() && *e >= 0.)
            && edges.windows(2).all(|e| e[0] < e[1]);
        if !edges_ok {
            return Err(InvalidDensityEdges(edges.clone()));
        }
        self.jet_definition().validate()?;
        if let Some(sel) = self.track_selection.as_ref() {
            let bounds = [
                ("min_pt", sel.min_pt),
                ("max_abs_eta", sel.max_abs_eta),
                ("max_abs_dz", sel.max_abs_dz),
                ("max_dz_err", sel.max_dz_err),
            ];
            for (name, value) in bounds {
                if value.is_nan() || value < 0. {
                    return Err(InvalidTrackSelection(name, value));
                }
            }
        }
        Ok(())
    }

    pub fn jet_algorithm(&self) -> JetAlgorithm {
        JetAlgorithm::from_exponent(self.algorithm_exponent)
    }

    pub fn jet_definition(&self) -> JetDefinition {
        JetDefinition {
            algorithm: self.jet_algorithm(),
            radius: self.radius,
            min_pt: self.min_jet_pt,
        }
    }
}
