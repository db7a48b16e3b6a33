use ahash::AHashMap;
use rayon::prelude::*;

use super::classify_stats::QueryReport;
use super::{ClassificationTable, Compartment, ThresholdTable};
use crate::errors::{PangenomeError, Result};
use crate::types::{HashValue, Sketch};

/// Hash -> compartment lookup built from one ranktable.
#[derive(Debug, Clone, Default)]
pub struct CompartmentLookup {
    pub label: String,
    map: AHashMap<HashValue, Compartment>,
}

impl CompartmentLookup {
    /// Builds the lookup; a hash listed twice is an error.
    pub fn from_pairs<I>(label: impl Into<String>, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (HashValue, Compartment)>,
    {
        let label = label.into();
        let pairs = pairs.into_iter();
        let mut map = AHashMap::with_capacity(pairs.size_hint().0);
        for (hash, compartment) in pairs {
            if map.insert(hash, compartment).is_some() {
                return Err(PangenomeError::DuplicateHash { table: label, hash });
            }
        }
        Ok(Self { label, map })
    }

    /// Frequency rows are classified with `thresholds`; legacy rows keep
    /// their stored code.
    pub fn from_table(
        label: impl Into<String>,
        table: &ClassificationTable,
        thresholds: &ThresholdTable,
    ) -> Result<Self> {
        Self::from_pairs(label, table.compartments(thresholds)?)
    }

    #[inline]
    pub fn get(&self, hash: HashValue) -> Option<Compartment> {
        self.map.get(&hash).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Tallies and extracts for one query against one table.
#[derive(Debug, Clone)]
pub struct QueryClassification {
    pub report: QueryReport,
    /// Query hashes classified as central core.
    pub central_core: Sketch,
    /// Query hashes classified as shell.
    pub shell: Sketch,
}

/// Classifies every query hash. Hashes missing from the table are counted
/// as unclassified, never treated as errors.
pub fn classify_query(query: &Sketch, lookup: &CompartmentLookup) -> QueryClassification {
    let mut report = QueryReport::new(lookup.label.clone(), query.name.clone());

    let mut central_core = query.copy_and_clear();
    central_core.name = format!("{} {}", query.name, Compartment::CentralCore.name());
    let mut shell = query.copy_and_clear();
    shell.name = format!("{} {}", query.name, Compartment::Shell.name());

    for (hash, abund) in query.hash_abundances() {
        let classification = lookup.get(hash);
        report.record(classification);
        match classification {
            Some(Compartment::CentralCore) => central_core.add_hash_with_abundance(hash, abund),
            Some(Compartment::Shell) => shell.add_hash_with_abundance(hash, abund),
            _ => {}
        }
    }

    log::debug!(
        "'{}' vs '{}': {} classified, {} not in table",
        query.name,
        lookup.label,
        report.total_classified(),
        report.unclassified
    );

    QueryClassification {
        report,
        central_core,
        shell,
    }
}

/// Classifies `query` against each table independently, in parallel.
/// Results are returned in table order.
pub fn classify_query_tables(
    query: &Sketch,
    tables: &[(String, ClassificationTable)],
    thresholds: &ThresholdTable,
) -> Result<Vec<QueryClassification>> {
    tables
        .par_iter()
        .map(|(label, table)| -> Result<QueryClassification> {
            let lookup = CompartmentLookup::from_table(label.as_str(), table, thresholds)?;
            if lookup.is_empty() {
                log::warn!("'{}' has no hashes; every query hash will be unclassified", label);
            } else {
                log::debug!("'{}': {} classified hashes", label, lookup.len());
            }
            Ok(classify_query(query, &lookup))
        })
        .collect()
}
