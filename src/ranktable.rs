//src/ranktable.rs

use std::io::{BufRead, Write};
use std::path::Path;

use crate::compartment::{Compartment, ThresholdTable};
use crate::errors::{PangenomeError, Result};
use crate::fileio::{create_writer, open_reader};
use crate::types::{FrequencyRecord, HashValue};

pub const FREQUENCY_HEADER: &str = "hashval,freq,abund,max_abund";
pub const CLASSIFICATION_HEADER: &str = "hashval,pangenome_classification";

/// File stem for a lineage's ranktable: anything but ASCII alphanumerics
/// becomes `_`. Distinct lineages can share a stem, so callers writing
/// several tables pass the stems through `fileio::unique_stems`.
pub fn lineage_file_stem(lineage: &str) -> String {
    lineage
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// A persisted ranktable in either of its two forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationTable {
    /// `hashval,freq,abund,max_abund`; compartments are derived at query time.
    Frequencies(Vec<FrequencyRecord>),
    /// Legacy `hashval,pangenome_classification` with codes 1-5.
    Compartments(Vec<(HashValue, Compartment)>),
}

impl ClassificationTable {
    pub fn len(&self) -> usize {
        match self {
            ClassificationTable::Frequencies(rows) => rows.len(),
            ClassificationTable::Compartments(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hash, compartment)` for every row, classifying frequency rows with
    /// `thresholds`.
    pub fn compartments(&self, thresholds: &ThresholdTable) -> Result<Vec<(HashValue, Compartment)>> {
        match self {
            ClassificationTable::Frequencies(rows) => rows
                .iter()
                .map(|r| {
                    thresholds
                        .classify_hash(r.hashval, r.freq)
                        .map(|c| (r.hashval, c))
                })
                .collect(),
            ClassificationTable::Compartments(rows) => Ok(rows.clone()),
        }
    }
}

/// Writes frequency records in the order given.
pub fn write_frequency_table<W: Write>(writer: &mut W, records: &[FrequencyRecord]) -> Result<()> {
    writeln!(writer, "{}", FREQUENCY_HEADER)?;
    for r in records {
        writeln!(writer, "{},{:.4},{},{}", r.hashval, r.freq, r.abund, r.max_abund)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the legacy direct form, grouped by compartment in code order and
/// keeping the record order inside each compartment.
pub fn write_classification_table<W: Write>(
    writer: &mut W,
    classified: &[(HashValue, Compartment)],
) -> Result<()> {
    writeln!(writer, "{}", CLASSIFICATION_HEADER)?;
    for compartment in Compartment::ALL {
        for &(hash, _) in classified.iter().filter(|(_, c)| *c == compartment) {
            writeln!(writer, "{},{}", hash, compartment.code())?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn save_frequency_table<P: AsRef<Path>>(path: P, records: &[FrequencyRecord]) -> Result<()> {
    let mut writer = create_writer(path)?;
    write_frequency_table(&mut writer, records)
}

pub fn save_classification_table<P: AsRef<Path>>(
    path: P,
    classified: &[(HashValue, Compartment)],
) -> Result<()> {
    let mut writer = create_writer(path)?;
    write_classification_table(&mut writer, classified)
}

/// Reads either table form; the header decides which.
pub fn read_table<R: BufRead>(reader: R, source: &str) -> Result<ClassificationTable> {
    let malformed = |line: usize, reason: String| PangenomeError::MalformedTable {
        path: source.to_string(),
        line,
        reason,
    };

    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(malformed(1, "empty table".to_string())),
    };
    let header = header.trim();

    if header == FREQUENCY_HEADER {
        let mut rows = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.trim().split(',').collect();
            if fields.len() != 4 {
                return Err(malformed(i + 2, format!("expected 4 fields, found {}", fields.len())));
            }
            let bad = |what: &str, value: &str| malformed(i + 2, format!("bad {} '{}'", what, value));
            let hashval = fields[0].parse().map_err(|_| bad("hashval", fields[0]))?;
            let freq: f64 = fields[1].parse().map_err(|_| bad("freq", fields[1]))?;
            if !(0.0..=1.0).contains(&freq) {
                return Err(bad("freq", fields[1]));
            }
            let abund = fields[2].parse().map_err(|_| bad("abund", fields[2]))?;
            let max_abund = fields[3].parse().map_err(|_| bad("max_abund", fields[3]))?;
            rows.push(FrequencyRecord {
                hashval,
                freq,
                abund,
                max_abund,
            });
        }
        Ok(ClassificationTable::Frequencies(rows))
    } else if header == CLASSIFICATION_HEADER {
        let mut rows = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.trim().split(',').collect();
            if fields.len() != 2 {
                return Err(malformed(i + 2, format!("expected 2 fields, found {}", fields.len())));
            }
            let hashval = fields[0]
                .parse()
                .map_err(|_| malformed(i + 2, format!("bad hashval '{}'", fields[0])))?;
            let compartment = fields[1]
                .parse::<i32>()
                .ok()
                .and_then(Compartment::from_code)
                .ok_or_else(|| malformed(i + 2, format!("bad classification '{}'", fields[1])))?;
            rows.push((hashval, compartment));
        }
        Ok(ClassificationTable::Compartments(rows))
    } else {
        Err(malformed(1, format!("unrecognised header '{}'", header)))
    }
}

pub fn load_table<P: AsRef<Path>>(path: P) -> Result<ClassificationTable> {
    let source = path.as_ref().display().to_string();
    let table = read_table(open_reader(&path)?, &source)?;
    log::info!("Loaded {} rows from '{}'", table.len(), source);
    Ok(table)
}
