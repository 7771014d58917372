use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::models::{AudioFeatures, Track};

/// Range on a single feature: `min` is inclusive, `below` exclusive.
/// A missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bounds {
    pub min: Option<f64>,
    pub below: Option<f64>,
}

impl Bounds {
    pub const ANY: Bounds = Bounds { min: None, below: None };

    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|m| value >= m) && self.below.is_none_or(|b| value < b)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.below) {
            (None, None) => write!(f, "any"),
            (Some(m), None) => write!(f, ">= {m:.2}"),
            (None, Some(b)) => write!(f, "< {b:.2}"),
            (Some(m), Some(b)) => write!(f, "{m:.2}..{b:.2}"),
        }
    }
}

/// Declarative predicate over energy and valence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureBounds {
    pub energy: Bounds,
    pub valence: Bounds,
}

impl FeatureBounds {
    pub fn matches(&self, f: &AudioFeatures) -> bool {
        self.energy.contains(f.energy) && self.valence.contains(f.valence)
    }
}

type Predicate = Box<dyn Fn(&AudioFeatures) -> bool>;

/// One destination playlist and the condition a track must meet to land in it.
pub struct Rule {
    destination: String,
    description: String,
    predicate: Predicate,
}

impl Rule {
    /// Rule from an arbitrary predicate.
    pub fn new(
        destination: impl Into<String>,
        predicate: impl Fn(&AudioFeatures) -> bool + 'static,
    ) -> Self {
        Self {
            destination: destination.into(),
            description: "custom".to_string(),
            predicate: Box::new(predicate),
        }
    }

    /// Rule from energy/valence bounds.
    pub fn bounded(destination: impl Into<String>, bounds: FeatureBounds) -> Self {
        Self {
            destination: destination.into(),
            description: format!("energy {}, valence {}", bounds.energy, bounds.valence),
            predicate: Box::new(move |f| bounds.matches(f)),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matches(&self, features: &AudioFeatures) -> bool {
        (self.predicate)(features)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("destination", &self.destination)
            .field("description", &self.description)
            .finish()
    }
}

/// Two rules point at the same destination playlist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Destination \"{0}\" appears more than once in the rule table")]
pub struct DuplicateDestination(pub String);

/// Ordered rule list. The first matching rule wins; overlaps and gaps are allowed.
#[derive(Debug)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Result<Self, DuplicateDestination> {
        for (i, rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|r| r.destination == rule.destination) {
                return Err(DuplicateDestination(rule.destination.clone()));
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.destination.as_str())
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.destinations().any(|d| d == destination)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First destination whose rule matches, if any.
    pub fn first_match(&self, features: &AudioFeatures) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.matches(features))
            .map(|r| r.destination.as_str())
    }
}

impl Default for RuleTable {
    /// The five built-in mood playlists.
    fn default() -> Self {
        const HIGH: Bounds = Bounds { min: Some(0.80), below: None };
        const MID: Bounds = Bounds { min: Some(0.55), below: Some(0.80) };
        const LOW: Bounds = Bounds { min: None, below: Some(0.55) };
        const HAPPY: Bounds = Bounds { min: Some(0.50), below: None };
        const SAD: Bounds = Bounds { min: None, below: Some(0.50) };

        let rule = |name: &str, energy, valence| {
            Rule::bounded(name, FeatureBounds { energy, valence })
        };
        Self {
            rules: vec![
                rule("Good Vibes Rollin'", HIGH, HAPPY),
                rule("Just fall.", HIGH, SAD),
                rule("Läuft einfach.", MID, HAPPY),
                rule("into the mind", MID, SAD),
                rule("feel the exhale", LOW, Bounds::ANY),
            ],
        }
    }
}

/// Per-destination URI lists for one run, in rule order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Buckets {
    entries: Vec<(String, Vec<String>)>,
    /// Tracks that had features but matched no rule.
    pub unmatched: usize,
    /// Tracks skipped because the service returned no features.
    pub missing_features: usize,
}

impl Buckets {
    pub fn get(&self, destination: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == destination)
            .map(|(_, uris)| uris.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, u)| (n.as_str(), u.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tracks placed in any bucket.
    pub fn assigned(&self) -> usize {
        self.entries.iter().map(|(_, u)| u.len()).sum()
    }
}

/// Partition `tracks` into one bucket per rule.
///
/// Pure: tracks without features are skipped, tracks matching no rule are
/// dropped, and each track lands in at most the first matching bucket.
/// Every destination gets an entry, empty or not.
pub fn classify(
    tracks: &[Track],
    features: &HashMap<String, AudioFeatures>,
    rules: &RuleTable,
) -> Buckets {
    let mut entries: Vec<(String, Vec<String>)> = rules
        .destinations()
        .map(|d| (d.to_string(), Vec::new()))
        .collect();
    let mut unmatched = 0;
    let mut missing_features = 0;

    for track in tracks {
        let Some(f) = features.get(&track.id) else {
            missing_features += 1;
            continue;
        };
        match rules.rules.iter().position(|r| r.matches(f)) {
            Some(idx) => entries[idx].1.push(track.uri.clone()),
            None => unmatched += 1,
        }
    }

    Buckets {
        entries,
        unmatched,
        missing_features,
    }
}
