use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Short party identifier assigned by the electoral authority (e.g. "PAN", "MORENA").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyCode(pub String);

impl PartyCode {
    pub fn new(code: impl Into<String>) -> Self {
        PartyCode(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A vote-count column in the source export and the parties that jointly own it.
/// A simple party column has one component; a joint-ticket column has two or more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteColumn {
    pub name: String,
    pub components: BTreeSet<PartyCode>,
}

impl VoteColumn {
    pub fn is_solo(&self) -> bool {
        self.components.len() == 1
    }
}

/// Official counts for one precinct, summed across all of its ballot stations.
/// Never mutated after parsing; one per precinct per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecinctRawTally {
    pub precinct_id: u32,
    pub district_id: u32,
    /// Vote counts keyed by source column name.
    pub votes: BTreeMap<String, u64>,
    pub total_votes: u64,
    pub registered_voters: u64,
}

impl PrecinctRawTally {
    pub fn new(precinct_id: u32, district_id: u32) -> Self {
        PrecinctRawTally {
            precinct_id,
            district_id,
            votes: BTreeMap::new(),
            total_votes: 0,
            registered_voters: 0,
        }
    }

    /// Count for a named column, zero when the column never appeared.
    pub fn vote_count(&self, column_name: &str) -> u64 {
        self.votes.get(column_name).copied().unwrap_or(0)
    }
}

/// Which parties run jointly on each alliance side in one district.
/// Parties on neither side run independently there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalitionPolicy {
    pub district_id: u32,
    pub side_a: BTreeSet<PartyCode>,
    pub side_b: BTreeSet<PartyCode>,
}

impl CoalitionPolicy {
    pub fn contains(&self, party: &PartyCode) -> bool {
        self.side_a.contains(party) || self.side_b.contains(party)
    }
}

/// Winning ballot option for a precinct: one of the two alliance sides,
/// or a party running independently in that district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    SideA,
    SideB,
    Independent(PartyCode),
}

impl Winner {
    /// Flat label stored alongside the structured payload for downstream filtering.
    pub fn label(&self) -> String {
        match self {
            Winner::SideA => "side_a".to_string(),
            Winner::SideB => "side_b".to_string(),
            Winner::Independent(p) => p.as_str().to_string(),
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-precinct output of the aggregation run. Upserted wholesale, keyed by
/// precinct id, so re-running overwrites idempotently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPrecinctResult {
    pub precinct_id: u32,
    pub district_id: u32,
    pub side_a_votes: u64,
    pub side_b_votes: u64,
    pub winner: Winner,
    pub winner_votes: u64,
    /// One decimal; `None` when the precinct reported zero registered voters.
    pub participation_percent: Option<f64>,
    pub outreach_target: u64,
    /// Policy actually applied, kept for auditability.
    pub policy_used: CoalitionPolicy,
    /// Raw tally the result was computed from.
    pub tally: PrecinctRawTally,
}
