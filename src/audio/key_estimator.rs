use super::history::BoundedHistory;
use super::note::PitchClass;
use crate::error::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

const NOTE_HISTORY_CAPACITY: usize = 50;
const VOTE_HISTORY_CAPACITY: usize = 30;
const MIN_NOTES: usize = 10;

/// Krumhansl-Kessler probe-tone ratings, index 0 = tonic.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    fn profile(self) -> &'static [f32; 12] {
        match self {
            Mode::Major => &MAJOR_PROFILE,
            Mode::Minor => &MINOR_PROFILE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub tonic: PitchClass,
    pub mode: Mode,
}

impl Key {
    pub fn new(tonic: PitchClass, mode: Mode) -> Self {
        Self { tonic, mode }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Mode::Major => "Major",
            Mode::Minor => "Minor",
        };
        write!(f, "{} {}", self.tonic, mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyVote {
    pub key: Key,
    /// Share of the vote history, rounded to a whole percent.
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    /// `None` while fewer than ten notes have been observed.
    pub key: Option<Key>,
    pub confidence: f32,
    pub consensus_key: Option<Key>,
    pub consensus_confidence: f32,
    /// Sorted by percentage, highest first.
    pub votes: Vec<KeyVote>,
}

impl KeyEstimate {
    fn collecting_data() -> Self {
        Self {
            key: None,
            confidence: 0.0,
            consensus_key: None,
            consensus_confidence: 0.0,
            votes: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.key.is_some()
    }
}

/// Key finding by profile correlation over recent notes, with a rolling vote
/// to smooth the instantaneous answer.
#[derive(Debug, Clone)]
pub struct KeyEstimator {
    notes: BoundedHistory<PitchClass>,
    votes: BoundedHistory<Key>,
}

impl KeyEstimator {
    pub fn new() -> Self {
        Self {
            notes: BoundedHistory::new(NOTE_HISTORY_CAPACITY),
            votes: BoundedHistory::new(VOTE_HISTORY_CAPACITY),
        }
    }

    pub fn add_note(&mut self, pitch_class: PitchClass) {
        self.notes.push(pitch_class);
    }

    /// Parses a pitch-class name ("C#") and records it.
    pub fn add_note_name(&mut self, name: &str) -> Result<()> {
        self.add_note(name.parse()?);
        Ok(())
    }

    pub fn note_history(&self) -> &BoundedHistory<PitchClass> {
        &self.notes
    }

    pub fn vote_history(&self) -> &BoundedHistory<Key> {
        &self.votes
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.votes.clear();
    }

    pub fn estimate_key(&mut self) -> KeyEstimate {
        if self.notes.len() < MIN_NOTES {
            return KeyEstimate::collecting_data();
        }

        let profile = self.observed_profile();
        let (key, correlation) = best_key(&profile);
        let confidence = (correlation / max_correlation() * 100.0).clamp(0.0, 100.0);

        self.votes.push(key);
        let tally = self.tally_votes();
        let total = self.votes.len() as f32;

        // Strict comparison: on a tie the key voted for earliest stays ahead.
        let (consensus_key, consensus_count) = tally
            .iter()
            .fold((key, 0usize), |(best, best_count), &(candidate, count)| {
                if count > best_count {
                    (candidate, count)
                } else {
                    (best, best_count)
                }
            });

        let mut votes: Vec<KeyVote> = tally
            .iter()
            .map(|&(key, count)| KeyVote {
                key,
                percentage: (count as f32 / total * 100.0).round() as u32,
            })
            .collect();
        votes.sort_by(|a, b| b.percentage.cmp(&a.percentage));

        debug!(
            "key: {} ({:.1}%), consensus {} ({}/{})",
            key,
            confidence,
            consensus_key,
            consensus_count,
            self.votes.len()
        );

        KeyEstimate {
            key: Some(key),
            confidence,
            consensus_key: Some(consensus_key),
            consensus_confidence: 100.0 * consensus_count as f32 / total,
            votes,
        }
    }

    /// Pitch-class histogram normalized to sum to one.
    fn observed_profile(&self) -> [f32; 12] {
        let mut counts = [0.0f32; 12];
        for pitch_class in self.notes.iter() {
            counts[pitch_class.index()] += 1.0;
        }
        let total = self.notes.len() as f32;
        counts.map(|count| count / total)
    }

    /// Counts per key in order of first appearance in the vote history.
    fn tally_votes(&self) -> Vec<(Key, usize)> {
        let mut tally: Vec<(Key, usize)> = Vec::new();
        for key in self.votes.iter() {
            match tally.iter_mut().find(|(candidate, _)| candidate == key) {
                Some((_, count)) => *count += 1,
                None => tally.push((*key, 1)),
            }
        }
        tally
    }
}

impl Default for KeyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlation of `observed` against the profile of `mode` rooted at `tonic`.
fn correlate(observed: &[f32; 12], tonic: PitchClass, mode: Mode) -> f32 {
    let profile = mode.profile();
    let root = tonic.index();
    observed
        .iter()
        .enumerate()
        .map(|(pitch_class, &weight)| weight * profile[(pitch_class + 12 - root) % 12])
        .sum()
}

/// Roots are tried C..B, major before minor, and only a strictly higher
/// correlation displaces the current best.
fn best_key(observed: &[f32; 12]) -> (Key, f32) {
    let mut best = Key::new(PitchClass::C, Mode::Major);
    let mut best_correlation = f32::NEG_INFINITY;

    for tonic in PitchClass::ALL {
        for mode in [Mode::Major, Mode::Minor] {
            let correlation = correlate(observed, tonic, mode);
            if correlation > best_correlation {
                best_correlation = correlation;
                best = Key::new(tonic, mode);
            }
        }
    }
    (best, best_correlation)
}

/// Largest correlation a unit-sum profile can reach: all weight on the
/// strongest degree of either template.
fn max_correlation() -> f32 {
    MAJOR_PROFILE
        .iter()
        .chain(MINOR_PROFILE.iter())
        .fold(0.0f32, |max, &w| max.max(w))
}
