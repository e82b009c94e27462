use std::fmt::{self, Display};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::record::{Record, Variable};

/// The four regions of the ABCD plane
///
/// With the first variable on the horizontal and the second on the
/// vertical axis, A is low/low, B high/low, C low/high, and D, the
/// signal region, high/high. Values at a threshold count as high.
#[derive(
    Deserialize,
    Serialize,
    Display,
    EnumString,
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum Region {
    A,
    B,
    C,
    D,
}

impl Region {
    pub fn classify(x1: f64, cut1: f64, x2: f64, cut2: f64) -> Self {
        match (x1 >= cut1, x2 >= cut2) {
            (false, false) => Self::A,
            (true, false) => Self::B,
            (false, true) => Self::C,
            (true, true) => Self::D,
        }
    }

    fn idx(self) -> usize {
        self as usize
    }
}

#[derive(
    Deserialize,
    Serialize,
    Display,
    EnumString,
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
)]
pub enum Comparison {
    #[strum(serialize = "<")]
    #[serde(rename = "<")]
    Lt,
    #[strum(serialize = "<=")]
    #[serde(rename = "<=")]
    Le,
    #[strum(serialize = ">")]
    #[serde(rename = ">")]
    Gt,
    #[strum(serialize = ">=")]
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// A requirement on a record variable
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct Cut {
    pub var: Variable,
    pub cmp: Comparison,
    pub value: f64,
}

impl Cut {
    pub fn new(var: Variable, cmp: Comparison, value: f64) -> Self {
        Self { var, cmp, value }
    }

    /// Whether the record passes the cut
    ///
    /// Records without a value for the variable fail.
    pub fn passes(&self, record: &Record) -> bool {
        match record.get(self.var) {
            Some(x) if !x.is_nan() => self.cmp.holds(x, self.value),
            _ => false,
        }
    }
}

impl Display for Cut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.var, self.cmp, self.value)
    }
}

/// Regular binning on [lo, hi)
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct Binning {
    pub nbins: usize,
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbcdError {
    #[error("Invalid binning with {nbins} bins on [{lo}, {hi})")]
    InvalidBinning { nbins: usize, lo: f64, hi: f64 },
    #[error("Invalid threshold {1} for {0}")]
    InvalidThreshold(Variable, f64),
}

impl Binning {
    pub fn new(nbins: usize, lo: f64, hi: f64) -> Result<Self, AbcdError> {
        let binning = Self { nbins, lo, hi };
        binning.validate()?;
        Ok(binning)
    }

    fn validate(&self) -> Result<(), AbcdError> {
        if self.nbins > 0 && self.lo.is_finite() && self.hi.is_finite() && self.lo < self.hi {
            Ok(())
        } else {
            Err(AbcdError::InvalidBinning {
                nbins: self.nbins,
                lo: self.lo,
                hi: self.hi,
            })
        }
    }

    /// The bin containing `x`, `None` outside the range
    pub fn bin(&self, x: f64) -> Option<usize> {
        if !(self.lo..self.hi).contains(&x) {
            return None;
        }
        let pos = (x - self.lo) / (self.hi - self.lo) * self.nbins as f64;
        Some((pos as usize).min(self.nbins - 1))
    }
}

/// Weighted one-dimensional histogram
///
/// Entries outside the range are only counted in the under- and
/// overflow.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Histogram {
    binning: Binning,
    sumw: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64,
}

impl Histogram {
    pub fn new(binning: Binning) -> Self {
        Self {
            binning,
            sumw: vec![0.; binning.nbins],
            sumw2: vec![0.; binning.nbins],
            underflow: 0.,
            overflow: 0.,
        }
    }

    pub fn fill(&mut self, x: f64, weight: f64) {
        match self.binning.bin(x) {
            Some(bin) => {
                self.sumw[bin] += weight;
                self.sumw2[bin] += weight * weight;
            }
            None if x < self.binning.lo => self.underflow += weight,
            None => self.overflow += weight,
        }
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Sum of weights per bin
    pub fn values(&self) -> &[f64] {
        &self.sumw
    }

    /// Sum of squared weights per bin
    pub fn variances(&self) -> &[f64] {
        &self.sumw2
    }

    /// Sum of weights inside the histogram range
    pub fn total(&self) -> f64 {
        self.sumw.iter().sum()
    }

    /// Multiply all bin contents by `factor`
    pub fn scale(&mut self, factor: f64) {
        for w in &mut self.sumw {
            *w *= factor;
        }
        for w2 in &mut self.sumw2 {
            *w2 *= factor * factor;
        }
        self.underflow *= factor;
        self.overflow *= factor;
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.scale(factor);
        self
    }
}

/// Settings for the ABCD method
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AbcdDefinition {
    pub var1: Variable,
    pub var1_cut: f64,
    pub var1_binning: Binning,
    pub var2: Variable,
    pub var2_cut: f64,
    pub var2_binning: Binning,
    /// Requirements for records entering any region
    pub preselection: Vec<Cut>,
    /// Discard all records in the signal region D
    pub blind: bool,
}

impl Default for AbcdDefinition {
    fn default() -> Self {
        use Comparison::*;
        use Variable::*;
        Self {
            var1: Sphericity,
            var1_cut: 0.5,
            var1_binning: Binning {
                nbins: 100,
                lo: 0.,
                hi: 1.,
            },
            var2: NConst,
            var2_cut: 25.,
            var2_binning: Binning {
                nbins: 499,
                lo: 0.,
                hi: 500.,
            },
            preselection: vec![
                Cut::new(NConst, Ge, 10.),
                Cut::new(Sphericity, Ge, 0.25),
                Cut::new(PvNpvs, Lt, 35.),
            ],
            blind: true,
        }
    }
}

impl AbcdDefinition {
    pub fn validate(&self) -> Result<(), AbcdError> {
        self.var1_binning.validate()?;
        self.var2_binning.validate()?;
        for (var, cut) in [(self.var1, self.var1_cut), (self.var2, self.var2_cut)] {
            if !cut.is_finite() {
                return Err(AbcdError::InvalidThreshold(var, cut));
            }
        }
        Ok(())
    }
}

/// Distributions of one variable in the four regions
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RegionHistograms {
    pub a: Histogram,
    pub b: Histogram,
    pub c: Histogram,
    /// Observed distribution in the signal region
    pub d_obs: Histogram,
}

impl RegionHistograms {
    fn new(binning: Binning) -> Self {
        let hist = Histogram::new(binning);
        Self {
            a: hist.clone(),
            b: hist.clone(),
            c: hist.clone(),
            d_obs: hist,
        }
    }

    fn get_mut(&mut self, region: Region) -> &mut Histogram {
        match region {
            Region::A => &mut self.a,
            Region::B => &mut self.b,
            Region::C => &mut self.c,
            Region::D => &mut self.d_obs,
        }
    }
}

/// Outcome of sorting a record into the ABCD plane
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fill {
    Filled(Region),
    /// Missing or undefined variables
    Undefined,
    FailedPreselection,
    Blinded,
}

/// Accumulated ABCD distributions
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Abcd {
    definition: AbcdDefinition,
    /// Number of records per region
    counts: [usize; 4],
    var1: RegionHistograms,
    var2: RegionHistograms,
    undefined: usize,
    failed_preselection: usize,
    blinded: usize,
}

impl Abcd {
    pub fn new(definition: AbcdDefinition) -> Result<Self, AbcdError> {
        definition.validate()?;
        Ok(Self {
            counts: [0; 4],
            var1: RegionHistograms::new(definition.var1_binning),
            var2: RegionHistograms::new(definition.var2_binning),
            definition,
            undefined: 0,
            failed_preselection: 0,
            blinded: 0,
        })
    }

    pub fn definition(&self) -> &AbcdDefinition {
        &self.definition
    }

    /// Sort a record into its region and fill the histograms
    ///
    /// Histograms are filled with unit weight.
    pub fn fill(&mut self, record: &Record) -> Fill {
        let def = &self.definition;
        let values = record
            .get(def.var1)
            .zip(record.get(def.var2))
            .filter(|(x1, x2)| !x1.is_nan() && !x2.is_nan());
        let Some((x1, x2)) = values else {
            self.undefined += 1;
            return Fill::Undefined;
        };
        if let Some(cut) = def.preselection.iter().find(|c| !c.passes(record)) {
            debug!("Event {} fails {cut}", record.event);
            self.failed_preselection += 1;
            return Fill::FailedPreselection;
        }
        let region = Region::classify(x1, def.var1_cut, x2, def.var2_cut);
        if region == Region::D && def.blind {
            self.blinded += 1;
            return Fill::Blinded;
        }
        self.counts[region.idx()] += 1;
        self.var1.get_mut(region).fill(x1, 1.);
        self.var2.get_mut(region).fill(x2, 1.);
        Fill::Filled(region)
    }

    pub fn count(&self, region: Region) -> usize {
        self.counts[region.idx()]
    }

    pub fn var1(&self) -> &RegionHistograms {
        &self.var1
    }

    pub fn var2(&self) -> &RegionHistograms {
        &self.var2
    }

    /// Number of records without the ABCD variables
    pub fn undefined(&self) -> usize {
        self.undefined
    }

    pub fn failed_preselection(&self) -> usize {
        self.failed_preselection
    }

    /// Number of signal-region records discarded by blinding
    pub fn blinded(&self) -> usize {
        self.blinded
    }

    fn ratio_to_a(&self, region: Region) -> f64 {
        let a = self.count(Region::A);
        if a == 0 {
            warn!("Region A is empty, setting the expected D yield to zero");
            return 0.;
        }
        self.count(region) as f64 / a as f64
    }

    /// Expected number of records in the signal region, B · C / A
    pub fn d_expected_total(&self) -> f64 {
        self.count(Region::B) as f64 * self.ratio_to_a(Region::C)
    }

    /// Expected distribution of the first variable in region D
    ///
    /// This is the distribution in region B, scaled by C / A.
    pub fn d_expected(&self) -> Histogram {
        self.var1.b.clone().scaled(self.ratio_to_a(Region::C))
    }

    /// Expected distribution of the second variable in region D
    ///
    /// This is the distribution in region C, scaled by B / A.
    pub fn d_expected_var2(&self) -> Histogram {
        self.var2.c.clone().scaled(self.ratio_to_a(Region::B))
    }

    /// Multiply all histograms by a common factor
    ///
    /// Region counts are not affected.
    pub fn normalise(&mut self, factor: f64) {
        for hists in [&mut self.var1, &mut self.var2] {
            for hist in [&mut hists.a, &mut hists.b, &mut hists.c, &mut hists.d_obs] {
                hist.scale(factor);
            }
        }
    }
}

impl Display for Abcd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let def = &self.definition;
        writeln!(
            f,
            "ABCD in {} (cut {}) vs {} (cut {})",
            def.var1, def.var1_cut, def.var2, def.var2_cut
        )?;
        for region in [Region::A, Region::B, Region::C] {
            writeln!(f, "{region}: {}", self.count(region))?;
        }
        if def.blind {
            writeln!(f, "D: blinded")?;
        } else {
            writeln!(f, "D: {}", self.count(Region::D))?;
        }
        write!(f, "D expected: {:.3}", self.d_expected_total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CandidateRecord, Kinematics, Outcome, SuepRecord};
    use crate::shape::{EventShape, JetObservables};
    use approx::assert_abs_diff_eq;

    fn record(spher: f64, nconst: usize, pv: u32) -> Record {
        let shape = EventShape {
            sphericity: spher,
            ..Default::default()
        };
        Record {
            outcome: Outcome::Success,
            pv_npvs: Some(pv),
            suep: Some(SuepRecord {
                candidate: CandidateRecord {
                    kinematics: Kinematics {
                        pt: 300.,
                        eta: 0.,
                        phi: 0.,
                        mass: 100.,
                    },
                    nconst,
                },
                observables: JetObservables {
                    shape,
                    fw2: 0.,
                    girth: 0.,
                    density: vec![0., 0.],
                    pt_avg: 1.,
                    pt_avg_boosted: 1.,
                },
            }),
            ..Default::default()
        }
    }

    #[test]
    fn classify_at_threshold() {
        assert_eq!(Region::classify(0.49, 0.5, 24., 25.), Region::A);
        assert_eq!(Region::classify(0.5, 0.5, 24., 25.), Region::B);
        assert_eq!(Region::classify(0.49, 0.5, 25., 25.), Region::C);
        assert_eq!(Region::classify(0.5, 0.5, 25., 25.), Region::D);
    }

    #[test]
    fn histogram() {
        let mut hist = Histogram::new(Binning::new(4, 0., 1.).unwrap());
        hist.fill(0.1, 1.);
        hist.fill(0.25, 2.);
        hist.fill(0.999, 1.);
        hist.fill(1., 5.);
        hist.fill(-0.1, 3.);
        assert_eq!(hist.values(), [1., 2., 0., 1.]);
        assert_eq!(hist.variances(), [1., 4., 0., 1.]);
        assert_eq!(hist.total(), 4.);
        let hist = hist.scaled(0.5);
        assert_eq!(hist.values(), [0.5, 1., 0., 0.5]);
        assert_eq!(hist.variances(), [0.25, 1., 0., 0.25]);
        assert!(Binning::new(0, 0., 1.).is_err());
        assert!(Binning::new(3, 1., 1.).is_err());
    }

    #[test]
    fn d_expected() {
        let mut abcd = Abcd::new(AbcdDefinition {
            blind: false,
            ..Default::default()
        })
        .unwrap();
        let records = [
            // A
            record(0.3, 12, 20),
            record(0.4, 20, 20),
            // B
            record(0.6, 15, 20),
            record(0.7, 15, 20),
            record(0.55, 24, 20),
            // C
            record(0.45, 30, 20),
            // D
            record(0.8, 40, 20),
            // preselection
            record(0.2, 40, 20),
            record(0.6, 5, 20),
            record(0.6, 30, 40),
            // undefined
            record(f64::NAN, 40, 20),
            Record::default(),
        ];
        for record in &records {
            abcd.fill(record);
        }
        assert_eq!(abcd.count(Region::A), 2);
        assert_eq!(abcd.count(Region::B), 3);
        assert_eq!(abcd.count(Region::C), 1);
        assert_eq!(abcd.count(Region::D), 1);
        assert_eq!(abcd.failed_preselection(), 3);
        assert_eq!(abcd.undefined(), 2);
        assert_abs_diff_eq!(abcd.d_expected_total(), 1.5);
        let d_exp = abcd.d_expected();
        assert_abs_diff_eq!(d_exp.total(), 1.5, epsilon = 1e-12);
        let bin = d_exp.binning().bin(0.6).unwrap();
        assert_abs_diff_eq!(d_exp.values()[bin], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(abcd.d_expected_var2().total(), 1.5, epsilon = 1e-12);
        assert_eq!(abcd.var1().d_obs.total(), 1.);
    }

    #[test]
    fn blinding() {
        let mut abcd = Abcd::new(AbcdDefinition::default()).unwrap();
        assert_eq!(abcd.fill(&record(0.8, 40, 20)), Fill::Blinded);
        assert_eq!(abcd.fill(&record(0.3, 12, 20)), Fill::Filled(Region::A));
        assert_eq!(abcd.count(Region::D), 0);
        assert_eq!(abcd.blinded(), 1);
    }

    #[test]
    fn empty_control_region() {
        let mut abcd = Abcd::new(AbcdDefinition::default()).unwrap();
        abcd.fill(&record(0.6, 15, 20));
        assert_eq!(abcd.d_expected_total(), 0.);
        assert_eq!(abcd.d_expected().total(), 0.);
    }

    #[test]
    fn compressed_output() {
        use crate::compression::{auto_decompress, compress_writer, Compression};
        use std::io::Write;

        let mut abcd = Abcd::new(AbcdDefinition::default()).unwrap();
        abcd.fill(&record(0.3, 12, 20));
        abcd.fill(&record(0.7, 12, 20));
        abcd.fill(&record(0.3, 40, 20));
        for compression in [None, Some(Compression::Lz4(0)), Some(Compression::Zstd(3))] {
            let mut buf = Vec::new();
            {
                let mut writer = compress_writer(&mut buf, compression).unwrap();
                serde_yaml::to_writer(&mut writer, &abcd).unwrap();
                writer.flush().unwrap();
            }
            let reader = auto_decompress(buf.as_slice()).unwrap();
            let read: Abcd = serde_yaml::from_reader(reader).unwrap();
            assert_eq!(read, abcd);
        }
    }

    #[test]
    fn parse_cut() {
        let yaml = "{var: nconst, cmp: '>=', value: 10}";
        let cut: Cut = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cut, Cut::new(Variable::NConst, Comparison::Ge, 10.));
        assert_eq!(cut.to_string(), "nconst >= 10");
    }
}
