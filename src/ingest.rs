use crate::config::ElectionConfig;
use crate::model::PrecinctRawTally;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot open tally file {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot read tally file: {0}")]
    Csv(#[from] csv::Error),
    #[error("required column {0:?} not found in header")]
    MissingColumn(String),
}

/// Outcome of one parse pass over a tally export.
#[derive(Debug)]
pub struct ParsedTallies {
    /// One accumulated tally per precinct, keyed by precinct id.
    pub tallies: BTreeMap<u32, PrecinctRawTally>,
    pub rows_read: usize,
    /// Rows dropped for a missing or non-positive precinct id.
    pub rows_dropped: usize,
}

/// Maps the configured column names to their positions in one file's header.
struct HeaderIndex {
    precinct: usize,
    district: usize,
    total: usize,
    registered: usize,
    /// (column name, header position) for every configured vote column that is
    /// actually present in this export.
    votes: Vec<(String, usize)>,
}

impl HeaderIndex {
    fn build(headers: &csv::StringRecord, config: &ElectionConfig) -> Result<Self, IngestError> {
        let position = |name: &str| -> Option<usize> {
            headers.iter().position(|h| h.trim() == name)
        };
        let required = |name: &str| -> Result<usize, IngestError> {
            position(name).ok_or_else(|| IngestError::MissingColumn(name.to_string()))
        };

        let votes = config
            .columns
            .iter()
            .filter_map(|c| position(&c.name).map(|idx| (c.name.clone(), idx)))
            .collect();

        Ok(HeaderIndex {
            precinct: required(&config.source.precinct)?,
            district: required(&config.source.district)?,
            total: required(&config.source.total)?,
            registered: required(&config.source.registered)?,
            votes,
        })
    }
}

/// Numeric cell parse that never fails a row: anything unparseable counts as zero.
fn parse_count(record: &csv::StringRecord, idx: usize) -> u64 {
    record
        .get(idx)
        .and_then(|cell| cell.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Read a tally export, one header row then one row per ballot station, and
/// accumulate every station row into its precinct's tally. Rows without a
/// usable precinct id are dropped. Feeding the same file twice doubles all
/// counts, so callers parse each export exactly once.
pub fn read_tallies<R: Read>(
    reader: R,
    config: &ElectionConfig,
) -> Result<ParsedTallies, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?;
    let index = HeaderIndex::build(headers, config)?;

    let mut tallies: BTreeMap<u32, PrecinctRawTally> = BTreeMap::new();
    let mut rows_read = 0usize;
    let mut rows_dropped = 0usize;

    for record in csv_reader.records() {
        let record = record?;
        rows_read += 1;

        let precinct_id = record
            .get(index.precinct)
            .and_then(|cell| cell.trim().parse::<u32>().ok())
            .unwrap_or(0);
        if precinct_id == 0 {
            rows_dropped += 1;
            log::debug!("dropping station row {} with no usable precinct id", rows_read);
            continue;
        }

        let district_id = record
            .get(index.district)
            .and_then(|cell| cell.trim().parse::<u32>().ok())
            .unwrap_or(0);

        let tally = tallies
            .entry(precinct_id)
            .or_insert_with(|| PrecinctRawTally::new(precinct_id, district_id));

        if tally.district_id != district_id {
            log::warn!(
                "precinct {}: station rows disagree on district ({} vs {}), keeping {}",
                precinct_id,
                tally.district_id,
                district_id,
                district_id
            );
            tally.district_id = district_id;
        }

        for (column_name, idx) in &index.votes {
            *tally.votes.entry(column_name.clone()).or_insert(0) += parse_count(&record, *idx);
        }
        tally.total_votes += parse_count(&record, index.total);
        tally.registered_voters += parse_count(&record, index.registered);
    }

    Ok(ParsedTallies {
        tallies,
        rows_read,
        rows_dropped,
    })
}

/// Path-based entry point; an unreadable file is fatal before any aggregation.
pub fn read_tallies_path(path: &Path, config: &ElectionConfig) -> Result<ParsedTallies, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })?;
    read_tallies(file, config)
}
