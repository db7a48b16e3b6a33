// src/classify/classify_stats.rs

use std::fmt::Write as _;

use super::Compartment;

/// Per-table tallies for one query sketch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryReport {
    /// Where the table came from, usually its path.
    pub table: String,
    pub sketch_name: String,
    /// Hash counts in `Compartment::ALL` order.
    pub counts: [u64; 5],
    /// Query hashes absent from the table.
    pub unclassified: u64,
}

impl QueryReport {
    pub fn new(table: impl Into<String>, sketch_name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sketch_name: sketch_name.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn record(&mut self, classification: Option<Compartment>) {
        match classification {
            Some(c) => self.counts[c.index()] += 1,
            None => self.unclassified += 1,
        }
    }

    pub fn count(&self, compartment: Compartment) -> u64 {
        self.counts[compartment.index()]
    }

    /// Hashes found in the table, whatever their compartment.
    pub fn total_classified(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Share of classified hashes in `compartment`, 0 when nothing was
    /// classified.
    pub fn percent(&self, compartment: Compartment) -> f64 {
        let total = self.total_classified();
        if total == 0 {
            0.0
        } else {
            self.count(compartment) as f64 / total as f64 * 100.0
        }
    }

    /// Human-readable summary, one line per compartment.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "For '{}', signature '{}' contains:",
            self.table, self.sketch_name
        );
        for c in Compartment::ALL {
            let _ = writeln!(
                out,
                "\t {} ({:.1}%) hashes are classified as {}",
                self.count(c),
                self.percent(c),
                c.name()
            );
        }
        let _ = writeln!(
            out,
            "\t ...and {} hashes are NOT IN the csv file",
            self.unclassified
        );
        out
    }
}
