use std::fmt::{self, Display};
use std::ops::AddAssign;

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::candidates::Selection;
use crate::cluster::{cluster, JetDefinition};
use crate::config::{AnalysisConfig, ConfigError};
use crate::event::{Event, EventConverter, EventError};
use crate::progress_bar::{Progress, ProgressBar};
use crate::record::{CandidateRecord, Outcome, Record, SuepRecord};
use crate::shape::{JetObservables, ShapeSettings};
use crate::traits::TryConvert;

/// Counts of event outcomes in a batch
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Number of input events
    pub processed: usize,
    pub success: usize,
    pub no_candidates: usize,
    pub empty: usize,
    /// Events rejected during input validation
    pub malformed: usize,
    /// Events rejected by the trigger or pileup requirements
    pub failed_preselection: usize,
}

impl Summary {
    fn add(&mut self, outcome: &Processed) {
        self.processed += 1;
        match outcome {
            Processed::Record(r) => match r.outcome {
                Outcome::Success => self.success += 1,
                Outcome::NoCandidates => self.no_candidates += 1,
                Outcome::EmptyEvent => self.empty += 1,
            },
            Processed::Malformed(_) => self.malformed += 1,
            Processed::Rejected => self.failed_preselection += 1,
        }
    }

    /// Number of records written
    pub fn nrecords(&self) -> usize {
        self.success + self.no_candidates + self.empty
    }
}

impl AddAssign for Summary {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.success += rhs.success;
        self.no_candidates += rhs.no_candidates;
        self.empty += rhs.empty;
        self.malformed += rhs.malformed;
        self.failed_preselection += rhs.failed_preselection;
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events: {} with candidates, {} without candidates, {} empty, {} malformed, {} failed preselection",
            self.processed,
            self.success,
            self.no_candidates,
            self.empty,
            self.malformed,
            self.failed_preselection
        )
    }
}

enum Processed {
    Record(Record),
    Malformed(EventError),
    Rejected,
}

/// Per-event SUEP analysis
#[derive(Clone, Debug)]
pub struct Analysis {
    config: AnalysisConfig,
    jet_def: JetDefinition,
    converter: EventConverter,
}

impl Analysis {
    /// Set up an analysis, checking the configuration
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let jet_def = config.jet_definition();
        let mut converter = EventConverter::new();
        if let Some(selection) = config.track_selection {
            converter = converter.with_track_selection(selection);
        }
        Ok(Self {
            config,
            jet_def,
            converter,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Whether an event passes the trigger and pileup requirements
    ///
    /// Events without a decision for the required trigger fail.
    pub fn preselect(&self, event: &Event) -> bool {
        if let Some(trigger) = self.config.required_trigger.as_deref() {
            if event.trigger(trigger) != Some(true) {
                trace!("Event {}: trigger {trigger} not fired", event.id());
                return false;
            }
        }
        match self.config.max_pv_npvs {
            Some(max) if event.pv_npvs() > max => {
                trace!("Event {}: {} primary vertices", event.id(), event.pv_npvs());
                false
            }
            _ => true,
        }
    }

    /// Analyse a single event
    pub fn process(&self, event: &Event) -> Record {
        let mut record = Record {
            event: event.id(),
            label: self.config.label.clone(),
            weight: event.weight,
            scalar: event.scalar_mediator().map(|s| (&s.p).into()),
            ..Default::default()
        };
        let tracks = event.tracks();
        if tracks.is_empty() {
            debug!("Event {} has no tracks", event.id());
            record.outcome = Outcome::EmptyEvent;
            return record;
        }

        let jets = match cluster(tracks, &self.jet_def) {
            Ok(seq) => seq.into_sorted_jets(),
            Err(err) => unreachable!("jet definition was validated: {err}"),
        };
        record.ht = Some(jets.iter().map(|j| j.pt()).sum());
        record.ntracks = Some(tracks.len());
        record.njets = Some(jets.len());
        record.pv_npvs = Some(event.pv_npvs());
        record.triggers = event.triggers().clone();

        let selection = Selection::new(jets);
        let Some((suep, isr)) = selection.candidates() else {
            debug!(
                "Event {}: {} jets, no candidates",
                event.id(),
                selection.jets().len()
            );
            record.outcome = Outcome::NoCandidates;
            return record;
        };
        trace!(
            "Event {}: SUEP candidate with {} constituents, ISR candidate with {}",
            event.id(),
            suep.nconstituents(),
            isr.nconstituents()
        );
        let settings = ShapeSettings {
            boost: self.config.boost_to_candidate_frame,
            tensor: self.config.tensor,
            density_bin_edges: &self.config.density_bin_edges,
        };
        record.suep = Some(SuepRecord {
            candidate: suep.into(),
            observables: JetObservables::new(suep, tracks, &settings),
        });
        record.isr = Some(CandidateRecord::from(isr));
        record.dphi_suep_isr = Some(suep.p().delta_phi(isr.p()).abs());
        record.outcome = Outcome::Success;
        record
    }

    fn process_input<E>(&self, input: E) -> Processed
    where
        EventConverter: TryConvert<E, Event, Error = EventError>,
    {
        let event = match self.converter.try_convert(input) {
            Ok(event) => event,
            Err(err) => return Processed::Malformed(err),
        };
        if !self.preselect(&event) {
            return Processed::Rejected;
        }
        Processed::Record(self.process(&event))
    }

    /// Analyse a batch of events in parallel
    ///
    /// The input can be either [RawEvent](crate::event::RawEvent)s or
    /// the [ParsedEvent](crate::event::ParsedEvent)s returned by
    /// [read_events](crate::io::read_events). Records are returned in
    /// the order of the input events. Malformed events and events
    /// failing the preselection do not produce a record.
    pub fn run<E>(&self, events: Vec<E>) -> (Vec<Record>, Summary)
    where
        E: Send,
        EventConverter: TryConvert<E, Event, Error = EventError>,
    {
        info!(
            "Analysing {} events with {} jets (R = {}, pT > {} GeV)",
            events.len(),
            self.jet_def.algorithm,
            self.jet_def.radius,
            self.jet_def.min_pt
        );
        let progress = ProgressBar::new(events.len() as u64, "events analysed:");
        let processed: Vec<_> = events
            .into_par_iter()
            .map(|input| {
                let res = self.process_input(input);
                progress.inc(1);
                res
            })
            .collect();
        progress.finish();

        let mut summary = Summary::default();
        let mut records = Vec::with_capacity(processed.len());
        for (pos, p) in processed.into_iter().enumerate() {
            summary.add(&p);
            match p {
                Processed::Record(r) => records.push(r),
                Processed::Malformed(err) => {
                    warn!("Skipping malformed event at position {pos}: {err}")
                }
                Processed::Rejected => {}
            }
        }
        info!("{summary}");
        if summary.malformed > 0 {
            warn!("{} malformed events were skipped", summary.malformed);
        }
        (records, summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::f64::consts::PI;

    use super::*;
    use crate::config::AnalysisConfigBuilder;
    use crate::event::{EventBuilder, ParsedEvent, RawEvent, RawParticles};
    use crate::four_vector::FourVector;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn analysis() -> Analysis {
        let config = AnalysisConfigBuilder::default()
            .min_jet_pt(10.)
            .build()
            .unwrap();
        Analysis::new(config).unwrap()
    }

    fn two_jet_event(id: usize) -> Event {
        let mut event = EventBuilder::new(id);
        for k in 0..10 {
            let phi = 2. * PI * k as f64 / 10.;
            let eta = 0.3 * (phi).sin();
            event.add_track(FourVector::from_pt_eta_phi_m(
                5.,
                eta,
                0.5 * phi.cos(),
                0.,
            ));
        }
        event
            .add_track(FourVector::from_pt_eta_phi_m(200., 0.2, PI, 0.))
            .add_track(FourVector::from_pt_eta_phi_m(200., 0.25, PI - 0.05, 0.))
            .trigger("HLT_PFHT1050", true)
            .pv_npvs(20);
        event.build()
    }

    fn raw_event(event: &Event) -> RawEvent {
        let tracks = event.tracks();
        RawEvent {
            id: event.id(),
            tracks: RawParticles {
                pt: tracks.iter().map(|p| p.pt()).collect(),
                eta: tracks.iter().map(|p| p.eta()).collect(),
                phi: tracks.iter().map(|p| p.phi()).collect(),
                mass: vec![0.; tracks.len()],
            },
            triggers: event.triggers().clone(),
            pv_npvs: event.pv_npvs(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_event() {
        log_init();
        let analysis = analysis();
        let record = analysis.process(&EventBuilder::new(3).build());
        assert_eq!(record.event, 3);
        assert_eq!(record.label, "ch");
        assert_eq!(record.outcome, Outcome::EmptyEvent);
        assert!(record.ht.is_none());
        assert!(record.ntracks.is_none());
        assert!(record.suep.is_none());
        assert!(record.isr.is_none());
    }

    #[test]
    fn no_candidates() {
        log_init();
        let analysis = analysis();
        let mut event = EventBuilder::new(0);
        event
            .add_track(FourVector::from_pt_eta_phi_m(50., 0., 0., 0.))
            .add_track(FourVector::from_pt_eta_phi_m(1., 0., 3., 0.));
        let record = analysis.process(&event.build());
        assert_eq!(record.outcome, Outcome::NoCandidates);
        assert_eq!(record.ntracks, Some(2));
        assert_eq!(record.njets, Some(1));
        assert!((record.ht.unwrap() - 50.).abs() < 1e-9);
        assert!(record.suep.is_none());
        assert!(record.dphi_suep_isr.is_none());
    }

    #[test]
    fn success() {
        log_init();
        let analysis = analysis();
        let record = analysis.process(&two_jet_event(1));
        assert_eq!(record.outcome, Outcome::Success);
        assert_eq!(record.njets, Some(2));
        let suep = record.suep.as_ref().unwrap();
        assert_eq!(suep.candidate.nconst, 10);
        assert_eq!(record.isr.unwrap().nconst, 2);
        let spher = suep.observables.shape.sphericity;
        assert!((0. ..=1.).contains(&spher));
        assert!(record.dphi_suep_isr.unwrap() > 2.);
        assert_eq!(record.triggers.get("HLT_PFHT1050"), Some(&true));
    }

    #[test]
    fn preselection() {
        let mut event = EventBuilder::new(0);
        event.trigger("HLT_PFHT1050", false);
        assert!(analysis().preselect(&event.clone().build()));

        let config = AnalysisConfigBuilder::default()
            .required_trigger("HLT_PFHT1050")
            .build()
            .unwrap();
        let triggered = Analysis::new(config).unwrap();
        assert!(!triggered.preselect(&event.clone().build()));
        event.trigger("HLT_PFHT1050", true).pv_npvs(40);
        assert!(triggered.preselect(&event.clone().build()));

        let config = AnalysisConfigBuilder::default()
            .required_trigger("HLT_PFHT1050")
            .max_pv_npvs(35)
            .build()
            .unwrap();
        let analysis = Analysis::new(config).unwrap();
        assert!(!analysis.preselect(&event.build()));
        assert!(!analysis.preselect(&EventBuilder::new(1).build()));
    }

    #[test]
    fn run() {
        log_init();
        let config = AnalysisConfigBuilder::default()
            .min_jet_pt(10.)
            .required_trigger("HLT_PFHT1050")
            .build()
            .unwrap();
        let analysis = Analysis::new(config).unwrap();

        let fired = || -> BTreeMap<String, bool> {
            [("HLT_PFHT1050".to_owned(), true)].into_iter().collect()
        };
        let mut events = vec![];
        for id in 0..8 {
            events.push(raw_event(&two_jet_event(id)));
        }
        events.push(RawEvent {
            id: 8,
            triggers: fired(),
            ..Default::default()
        });
        let mut malformed = events[0].clone();
        malformed.id = 9;
        malformed.tracks.mass.pop();
        events.push(malformed);
        let mut rejected = RawEvent {
            id: 10,
            ..events[0].clone()
        };
        rejected.triggers.clear();
        events.push(rejected);

        let (records, summary) = analysis.run(events);
        assert_eq!(summary.processed, 11);
        assert_eq!(summary.success, 8);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.failed_preselection, 1);
        assert_eq!(summary.nrecords(), records.len());
        let ids: Vec<_> = records.iter().map(|r| r.event).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn empty_event_with_default_config() {
        log_init();
        let analysis = Analysis::new(AnalysisConfig::default()).unwrap();
        let (records, summary) = analysis.run(vec![RawEvent::default()]);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.failed_preselection, 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::EmptyEvent);
        assert!(records[0].suep.is_none());
        assert!(records[0].isr.is_none());
    }

    #[test]
    fn malformed_events_are_counted() {
        log_init();
        let analysis = analysis();
        let good = raw_event(&two_jet_event(0));
        let mut short_eta = raw_event(&two_jet_event(1));
        short_eta.tracks.eta.truncate(3);
        let mut long_pt = raw_event(&two_jet_event(2));
        long_pt.tracks.pt.push(1.);

        let (records, summary) = analysis.run(vec![good.clone(), short_eta, long_pt]);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.malformed, 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, 0);

        let parsed: Vec<ParsedEvent> = vec![
            Err(EventError::Parse("invalid value: integer `-3`".to_owned())),
            Ok(good),
        ];
        let (records, summary) = analysis.run(parsed);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.success, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, 0);
    }

    #[test]
    fn undefined_shape() {
        log_init();
        // the SUEP candidate is made of exactly collinear massless
        // tracks, so its rest frame is undefined
        let mut event = EventBuilder::new(0);
        for _ in 0..3 {
            event.add_track(FourVector::from_pt_eta_phi_m(5., 0., 0., 0.));
        }
        event
            .add_track(FourVector::from_pt_eta_phi_m(200., 0.2, PI, 0.))
            .add_track(FourVector::from_pt_eta_phi_m(200., 0.25, PI - 0.05, 0.));
        let raw = raw_event(&event.build());

        let (records, summary) = analysis().run(vec![raw]);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.malformed, 0);
        let record = &records[0];
        assert_eq!(record.outcome, Outcome::Success);
        let suep = record.suep.as_ref().unwrap();
        assert_eq!(suep.candidate.nconst, 3);
        assert!(suep.observables.shape.sphericity.is_nan());
        assert!(suep.observables.fw2.is_nan());
        assert!((suep.candidate.kinematics.pt - 15.).abs() < 1e-9);
        assert!(suep.observables.girth.abs() < 1e-12);
        assert!(record.isr.is_some());
        assert!(record.dphi_suep_isr.unwrap() > 3.);
    }
}
