use std::collections::BTreeMap;

use particle_id::ParticleID;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::four_vector::FourVector;
use crate::traits::TryConvert;

/// PDG id of the scalar mediator
pub const SCALAR_MEDIATOR_PID: ParticleID = ParticleID::new(25);
/// Generator status of the scalar mediator before its decay
pub const SCALAR_MEDIATOR_STATUS: i32 = 62;

/// Column-wise kinematics of a particle collection
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct RawParticles {
    pub pt: Vec<f64>,
    pub eta: Vec<f64>,
    pub phi: Vec<f64>,
    pub mass: Vec<f64>,
}

impl RawParticles {
    pub fn len(&self) -> usize {
        self.pt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pt.is_empty()
    }
}

/// Column-wise track quality information
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct RawTrackQuality {
    /// Primary vertex association quality
    pub from_pv: Vec<i32>,
    /// Longitudinal impact parameter
    pub dz: Vec<f64>,
    /// Uncertainty on the longitudinal impact parameter
    pub dz_err: Vec<f64>,
}

/// Column-wise generator-level particles
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct RawGenParticles {
    #[serde(flatten)]
    pub kinematics: RawParticles,
    pub pdg_id: Vec<i32>,
    pub status: Vec<i32>,
    /// Index of the mother particle, negative if there is none
    pub mother: Vec<i64>,
}

/// An event as it is read from an input file
///
/// No consistency checks are performed at this stage. Use
/// [EventConverter] to obtain a validated [Event].
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RawEvent {
    pub id: usize,
    pub weight: f64,
    pub tracks: RawParticles,
    pub track_quality: Option<RawTrackQuality>,
    pub gen: Option<RawGenParticles>,
    pub triggers: BTreeMap<String, bool>,
    pub pv_npvs: u32,
}

impl Default for RawEvent {
    fn default() -> Self {
        Self {
            id: 0,
            weight: 1.,
            tracks: Default::default(),
            track_quality: None,
            gen: None,
            triggers: Default::default(),
            pv_npvs: 0,
        }
    }
}

/// Malformed input event
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("Length mismatch in {collection}: {field} has {found} entries, expected {expected}")]
    LengthMismatch {
        collection: &'static str,
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Invalid {field} in entry {index} of {collection}: {value}")]
    InvalidValue {
        collection: &'static str,
        field: &'static str,
        index: usize,
        value: f64,
    },
    #[error("Invalid event weight: {0}")]
    InvalidWeight(f64),
    #[error("Mother {mother} of generator particle {index} is out of range")]
    MotherOutOfRange { index: usize, mother: i64 },
    #[error("Failed to parse event record: {0}")]
    Parse(String),
}

/// An input record that may have failed to parse
pub type ParsedEvent = Result<RawEvent, EventError>;

/// A generator-level particle
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct GenParticle {
    pub p: FourVector,
    pub id: ParticleID,
    pub status: i32,
    pub mother: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventBuilder {
    id: usize,
    weight: f64,
    tracks: Vec<FourVector>,
    gen: Vec<GenParticle>,
    triggers: BTreeMap<String, bool>,
    pv_npvs: u32,
}

impl EventBuilder {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            weight: 1.,
            ..Default::default()
        }
    }

    pub fn with_capacity(id: usize, cap: usize) -> Self {
        Self {
            tracks: Vec::with_capacity(cap),
            ..Self::new(id)
        }
    }

    pub fn add_track(&mut self, p: FourVector) -> &mut Self {
        self.tracks.push(p);
        self
    }

    pub fn add_gen(&mut self, particle: GenParticle) -> &mut Self {
        self.gen.push(particle);
        self
    }

    pub fn trigger(&mut self, name: &str, fired: bool) -> &mut Self {
        self.triggers.insert(name.to_owned(), fired);
        self
    }

    pub fn pv_npvs(&mut self, n: u32) -> &mut Self {
        self.pv_npvs = n;
        self
    }

    pub fn weight(&mut self, weight: f64) -> &mut Self {
        self.weight = weight;
        self
    }

    pub fn build(self) -> Event {
        Event {
            id: self.id,
            weight: self.weight,
            tracks: self.tracks,
            gen: self.gen,
            triggers: self.triggers,
            pv_npvs: self.pv_npvs,
        }
    }
}

impl From<EventBuilder> for Event {
    fn from(b: EventBuilder) -> Self {
        b.build()
    }
}

/// A validated collision event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    id: usize,
    pub weight: f64,
    tracks: Vec<FourVector>,
    gen: Vec<GenParticle>,
    triggers: BTreeMap<String, bool>,
    pv_npvs: u32,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Selected tracks
    pub fn tracks(&self) -> &[FourVector] {
        &self.tracks
    }

    /// Generator-level particles, empty for recorded data
    pub fn gen(&self) -> &[GenParticle] {
        &self.gen
    }

    pub fn triggers(&self) -> &BTreeMap<String, bool> {
        &self.triggers
    }

    /// Decision of the given trigger, if recorded
    pub fn trigger(&self, name: &str) -> Option<bool> {
        self.triggers.get(name).copied()
    }

    /// Number of primary vertices
    pub fn pv_npvs(&self) -> u32 {
        self.pv_npvs
    }

    /// The scalar mediator at generator level
    pub fn scalar_mediator(&self) -> Option<&GenParticle> {
        self.gen.iter().find(|p| {
            p.id == SCALAR_MEDIATOR_PID && p.status == SCALAR_MEDIATOR_STATUS
        })
    }
}

/// Track quality requirements
///
/// A track is kept if it passes all requirements. Tracks without
/// quality information only have to pass the kinematic requirements.
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TrackSelection {
    /// Primary vertex association has to be strictly better than this
    pub min_from_pv: i32,
    pub min_pt: f64,
    pub max_abs_eta: f64,
    /// Upper bound (exclusive) on the longitudinal impact parameter
    pub max_abs_dz: f64,
    /// Upper bound (exclusive) on the impact parameter uncertainty
    pub max_dz_err: f64,
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self {
            min_from_pv: 1,
            min_pt: 0.75,
            max_abs_eta: 2.5,
            max_abs_dz: 10.,
            max_dz_err: 0.05,
        }
    }
}

impl TrackSelection {
    pub fn accepts_kinematics(&self, pt: f64, eta: f64) -> bool {
        pt >= self.min_pt && eta.abs() <= self.max_abs_eta
    }

    pub fn accepts_quality(&self, from_pv: i32, dz: f64, dz_err: f64) -> bool {
        from_pv > self.min_from_pv
            && dz.abs() < self.max_abs_dz
            && dz_err < self.max_dz_err
    }
}

/// Converter from input events to validated events
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventConverter {
    track_selection: Option<TrackSelection>,
}

impl EventConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keep tracks passing the given selection
    pub fn with_track_selection(mut self, selection: TrackSelection) -> Self {
        self.track_selection = Some(selection);
        self
    }

    fn accepts(&self, raw: &RawEvent, n: usize) -> bool {
        let Some(selection) = self.track_selection.as_ref() else {
            return true;
        };
        let tracks = &raw.tracks;
        if !selection.accepts_kinematics(tracks.pt[n], tracks.eta[n]) {
            return false;
        }
        match raw.track_quality.as_ref() {
            Some(q) => selection.accepts_quality(q.from_pv[n], q.dz[n], q.dz_err[n]),
            None => true,
        }
    }
}

impl TryConvert<ParsedEvent, Event> for EventConverter {
    type Error = EventError;

    fn try_convert(&self, parsed: ParsedEvent) -> Result<Event, Self::Error> {
        self.try_convert(parsed?)
    }
}

impl TryConvert<RawEvent, Event> for EventConverter {
    type Error = EventError;

    fn try_convert(&self, raw: RawEvent) -> Result<Event, Self::Error> {
        if !raw.weight.is_finite() {
            return Err(EventError::InvalidWeight(raw.weight));
        }
        check_particles("tracks", &raw.tracks)?;
        let ntracks = raw.tracks.len();
        if let Some(quality) = raw.track_quality.as_ref() {
            check_len("track_quality", "from_pv", ntracks, quality.from_pv.len())?;
            check_len("track_quality", "dz", ntracks, quality.dz.len())?;
            check_len("track_quality", "dz_err", ntracks, quality.dz_err.len())?;
        }

        let mut event = EventBuilder::with_capacity(raw.id, ntracks);
        event.weight(raw.weight).pv_npvs(raw.pv_npvs);
        for n in 0..ntracks {
            if self.accepts(&raw, n) {
                event.add_track(momentum(&raw.tracks, n));
            }
        }
        if let Some(gen) = raw.gen.as_ref() {
            for particle in convert_gen(gen)? {
                event.add_gen(particle);
            }
        }
        for (name, fired) in &raw.triggers {
            event.trigger(name, *fired);
        }
        Ok(event.build())
    }
}

fn check_len(
    collection: &'static str,
    field: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), EventError> {
    if expected == found {
        Ok(())
    } else {
        Err(EventError::LengthMismatch {
            collection,
            field,
            expected,
            found,
        })
    }
}

fn check_particles(
    collection: &'static str,
    particles: &RawParticles,
) -> Result<(), EventError> {
    let n = particles.len();
    let columns = [
        ("pt", &particles.pt),
        ("eta", &particles.eta),
        ("phi", &particles.phi),
        ("mass", &particles.mass),
    ];
    for (field, column) in columns {
        check_len(collection, field, n, column.len())?;
        if let Some((index, &value)) =
            column.iter().enumerate().find(|(_, v)| !v.is_finite())
        {
            return Err(EventError::InvalidValue {
                collection,
                field,
                index,
                value,
            });
        }
    }
    if let Some((index, &value)) =
        particles.pt.iter().enumerate().find(|(_, pt)| **pt < 0.)
    {
        return Err(EventError::InvalidValue {
            collection,
            field: "pt",
            index,
            value,
        });
    }
    Ok(())
}

fn momentum(particles: &RawParticles, n: usize) -> FourVector {
    FourVector::from_pt_eta_phi_m(
        particles.pt[n],
        particles.eta[n],
        particles.phi[n],
        particles.mass[n],
    )
}

fn convert_gen(gen: &RawGenParticles) -> Result<Vec<GenParticle>, EventError> {
    const COLLECTION: &str = "gen";
    check_particles(COLLECTION, &gen.kinematics)?;
    let n = gen.kinematics.len();
    check_len(COLLECTION, "pdg_id", n, gen.pdg_id.len())?;
    check_len(COLLECTION, "status", n, gen.status.len())?;
    check_len(COLLECTION, "mother", n, gen.mother.len())?;
    (0..n)
        .map(|index| {
            let mother = match gen.mother[index] {
                m if m < 0 => None,
                m if (m as u64) < n as u64 => Some(m as usize),
                mother => {
                    return Err(EventError::MotherOutOfRange { index, mother })
                }
            };
            Ok(GenParticle {
                p: momentum(&gen.kinematics, index),
                id: ParticleID::new(gen.pdg_id[index]),
                status: gen.status[index],
                mother,
            })
        })
        .collect()
}
