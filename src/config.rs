use crate::model::{CoalitionPolicy, PartyCode, VoteColumn};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("column {0:?} has no components and none can be derived from its name")]
    EmptyComponents(String),
    #[error("district {district_id}: parties declared on both sides: {parties}")]
    OverlappingSides { district_id: u32, parties: String },
    #[error("empty party roster")]
    EmptyRoster,
}

/// Header names of the bookkeeping columns in the tally export. The export's
/// exact naming varies by cycle, so this is configuration, not a constant.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceColumns {
    #[serde(default = "default_precinct_column")]
    pub precinct: String,
    #[serde(default = "default_district_column")]
    pub district: String,
    #[serde(default = "default_total_column")]
    pub total: String,
    #[serde(default = "default_registered_column")]
    pub registered: String,
}

fn default_precinct_column() -> String {
    "SECCION".to_string()
}
fn default_district_column() -> String {
    "DISTRITO".to_string()
}
fn default_total_column() -> String {
    "TOTAL_VOTOS".to_string()
}
fn default_registered_column() -> String {
    "LISTA_NOMINAL".to_string()
}

impl Default for SourceColumns {
    fn default() -> Self {
        SourceColumns {
            precinct: default_precinct_column(),
            district: default_district_column(),
            total: default_total_column(),
            registered: default_registered_column(),
        }
    }
}

/// Declares, for every vote column that can appear in the export, which parties
/// jointly own it. Fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: Vec<VoteColumn>,
    solo_by_party: BTreeMap<PartyCode, String>,
}

impl ColumnMap {
    pub fn new(columns: Vec<VoteColumn>) -> Result<Self, ConfigError> {
        let mut solo_by_party = BTreeMap::new();
        for column in &columns {
            if column.components.is_empty() {
                return Err(ConfigError::EmptyComponents(column.name.clone()));
            }
            if column.is_solo() {
                let party = column.components.iter().next().cloned().unwrap();
                // First declaration wins; the data has no solo-column collisions.
                solo_by_party.entry(party).or_insert_with(|| column.name.clone());
            }
        }
        Ok(ColumnMap {
            columns,
            solo_by_party,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoteColumn> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The single-party column for `party`, if it appears standalone anywhere
    /// in the export.
    pub fn solo_column(&self, party: &PartyCode) -> Option<&str> {
        self.solo_by_party.get(party).map(|s| s.as_str())
    }
}

lazy_static! {
    // Joint-ticket column names join their party codes, e.g. "PAN-PRI-PRD"
    // or "MORENA_PT_PVEM".
    static ref COMPONENT_SEPARATOR_RX: Regex = Regex::new(r"[-_+]").unwrap();
}

#[derive(Debug, Deserialize)]
struct ColumnSpec {
    name: String,
    #[serde(default)]
    components: Vec<PartyCode>,
}

#[derive(Debug, Deserialize)]
struct ColumnsFile {
    #[serde(default)]
    source: SourceColumns,
    roster: Vec<PartyCode>,
    columns: Vec<ColumnSpec>,
}

/// Static per-cycle configuration: source column names, full party roster
/// (fixed order, used by winner determination), and the column-component map.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    pub source: SourceColumns,
    pub roster: Vec<PartyCode>,
    pub columns: ColumnMap,
}

impl ElectionConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let file: ColumnsFile = serde_json::from_reader(reader)?;
        if file.roster.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        let roster_set: BTreeSet<&PartyCode> = file.roster.iter().collect();

        let mut columns = Vec::with_capacity(file.columns.len());
        for spec in file.columns {
            let components: BTreeSet<PartyCode> = if spec.components.is_empty() {
                COMPONENT_SEPARATOR_RX
                    .split(&spec.name)
                    .filter(|s| !s.is_empty())
                    .map(PartyCode::new)
                    .collect()
            } else {
                spec.components.into_iter().collect()
            };
            if components.is_empty() {
                return Err(ConfigError::EmptyComponents(spec.name));
            }
            for party in &components {
                if !roster_set.contains(party) {
                    log::warn!(
                        "column {:?}: component {} is not in the party roster",
                        spec.name,
                        party
                    );
                }
            }
            columns.push(VoteColumn {
                name: spec.name,
                components,
            });
        }

        Ok(ElectionConfig {
            source: file.source,
            roster: file.roster,
            columns: ColumnMap::new(columns)?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::from_reader(File::open(path)?)
    }
}

#[derive(Debug, Deserialize)]
struct PolicySpec {
    district_id: u32,
    side_a: Vec<PartyCode>,
    side_b: Vec<PartyCode>,
}

#[derive(Debug, Deserialize)]
struct PoliciesFile {
    default_side_a: PartyCode,
    default_side_b: PartyCode,
    districts: Vec<PolicySpec>,
}

/// Per-district coalition declarations. Districts absent from the store fall
/// back to a strict default policy: each side holds only its namesake party.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    default_side_a: PartyCode,
    default_side_b: PartyCode,
    policies: BTreeMap<u32, CoalitionPolicy>,
}

impl PolicyStore {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let file: PoliciesFile = serde_json::from_reader(reader)?;
        let mut policies = BTreeMap::new();
        for spec in file.districts {
            let side_a: BTreeSet<PartyCode> = spec.side_a.into_iter().collect();
            let side_b: BTreeSet<PartyCode> = spec.side_b.into_iter().collect();
            let overlap: Vec<&PartyCode> = side_a.intersection(&side_b).collect();
            if !overlap.is_empty() {
                return Err(ConfigError::OverlappingSides {
                    district_id: spec.district_id,
                    parties: overlap.iter().map(|p| p.as_str()).join(", "),
                });
            }
            policies.insert(
                spec.district_id,
                CoalitionPolicy {
                    district_id: spec.district_id,
                    side_a,
                    side_b,
                },
            );
        }
        Ok(PolicyStore {
            default_side_a: file.default_side_a,
            default_side_b: file.default_side_b,
            policies,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// The declared policy for a district, or the strict single-namesake
    /// default when none is configured.
    pub fn policy_for(&self, district_id: u32) -> CoalitionPolicy {
        match self.policies.get(&district_id) {
            Some(policy) => policy.clone(),
            None => {
                log::warn!(
                    "district {}: no coalition policy configured, assuming no coalitions",
                    district_id
                );
                CoalitionPolicy {
                    district_id,
                    side_a: BTreeSet::from([self.default_side_a.clone()]),
                    side_b: BTreeSet::from([self.default_side_b.clone()]),
                }
            }
        }
    }
}
