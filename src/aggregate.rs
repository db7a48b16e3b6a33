//src/aggregate.rs

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::errors::{PangenomeError, Result};
use crate::fileio::create_new_writer;
use crate::resolve::{ident_from_name, resolve_lineage_name};
use crate::taxdb::{LineageLookup, Rank};
use crate::types::{HashValue, LineageBatchRow, Sketch};

/// Audit rows buffered before they are appended to the lineage CSV.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Header of the lineage audit CSV.
pub const LINEAGE_CSV_HEADER: &str = "lineage,sig_name,hash_count,genome_count";

/// Running per-hash counts that remember first-insertion order.
///
/// Insertion order is the tie-break when records are later sorted by
/// abundance, so it has to survive independently of hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbundanceCounter {
    index: AHashMap<HashValue, usize>,
    entries: Vec<(HashValue, u64)>,
}

impl AbundanceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to `hash`; an absent hash starts at zero.
    #[inline]
    pub fn add(&mut self, hash: HashValue, count: u64) {
        match self.index.get(&hash) {
            Some(&i) => self.entries[i].1 += count,
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((hash, count));
            }
        }
    }

    /// Pointwise add of a sketch's own hash -> abundance multiset.
    pub fn update(&mut self, sketch: &Sketch) {
        for (hash, abund) in sketch.hash_abundances() {
            self.add(hash, abund);
        }
    }

    pub fn get(&self, hash: HashValue) -> u64 {
        self.index.get(&hash).map(|&i| self.entries[i].1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_abundance(&self) -> Option<u64> {
        self.entries.iter().map(|&(_, c)| c).max()
    }

    /// `(hash, count)` pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (HashValue, u64)> + '_ {
        self.entries.iter().copied()
    }

    /// Contents sorted by hash, for order-insensitive comparison.
    pub fn sorted(&self) -> Vec<(HashValue, u64)> {
        let mut out = self.entries.clone();
        out.sort_unstable();
        out
    }
}

impl FromIterator<(HashValue, u64)> for AbundanceCounter {
    fn from_iter<I: IntoIterator<Item = (HashValue, u64)>>(iter: I) -> Self {
        let mut counter = AbundanceCounter::new();
        for (hash, count) in iter {
            counter.add(hash, count);
        }
        counter
    }
}

/// All genomes that share one lineage name.
#[derive(Debug, Clone)]
pub struct LineageGroup {
    pub lineage_name: String,
    /// Identifier of the first genome assigned to the group.
    pub representative: String,
    pub genome_count: usize,
    union: Sketch,
    counter: AbundanceCounter,
}

impl LineageGroup {
    /// Seeds a group from its first genome.
    pub fn new(lineage_name: impl Into<String>, representative: impl Into<String>, first: &Sketch) -> Self {
        let mut union = first.copy_and_clear();
        union.track_abundance = false;
        for hash in first.hashes() {
            union.add_hash(hash);
        }
        Self {
            lineage_name: lineage_name.into(),
            representative: representative.into(),
            genome_count: 1,
            union,
            counter: AbundanceCounter::new(),
        }
    }

    /// Unions `sketch` into the group. Hash schemes must agree.
    pub fn merge(&mut self, sketch: &Sketch) -> Result<()> {
        if sketch.params != self.union.params {
            return Err(PangenomeError::IncompatibleSketch {
                name: sketch.name.clone(),
            });
        }
        for hash in sketch.hashes() {
            self.union.add_hash(hash);
        }
        self.genome_count += 1;
        Ok(())
    }

    pub fn count_abundances(&mut self, sketch: &Sketch) {
        self.counter.update(sketch);
    }

    pub fn counter(&self) -> &AbundanceCounter {
        &self.counter
    }

    /// Distinct hashes seen in the group so far.
    pub fn hash_count(&self) -> usize {
        self.union.len()
    }

    pub fn sketch_name(&self) -> String {
        format!("{} {}", self.representative, self.lineage_name)
    }

    /// The merged sketch, named `"{representative} {lineage_name}"`.
    pub fn to_sketch(&self, with_abundance: bool) -> Sketch {
        self.to_sketch_named(&self.sketch_name(), with_abundance)
    }

    pub fn to_sketch_named(&self, name: &str, with_abundance: bool) -> Sketch {
        let mut sketch = self.union.clone();
        sketch.name = name.to_string();
        if with_abundance {
            sketch.set_abundances(self.counter.iter());
        }
        sketch
    }
}

/// Appends `LineageBatchRow`s to a CSV in bounded batches.
///
/// A log created from a path is deleted again if it is dropped without
/// `finish`, so an aborted pass leaves no partial file behind.
pub struct BatchLog {
    writer: Box<dyn Write>,
    batch: Vec<LineageBatchRow>,
    batch_size: usize,
    rows_written: usize,
    path: Option<PathBuf>,
    finished: bool,
}

impl BatchLog {
    /// Creates the CSV and writes its header. An existing file is never
    /// overwritten.
    pub fn create<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let writer = create_new_writer(path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => PangenomeError::AuditLogExists(path.to_path_buf()),
            _ => PangenomeError::Io(e),
        })?;
        let mut log = Self::from_writer(writer, batch_size)?;
        log.path = Some(path.to_path_buf());
        Ok(log)
    }

    pub fn from_writer(mut writer: Box<dyn Write>, batch_size: usize) -> Result<Self> {
        writeln!(writer, "{}", LINEAGE_CSV_HEADER)?;
        Ok(Self {
            writer,
            batch: Vec::with_capacity(batch_size.min(DEFAULT_BATCH_SIZE)),
            batch_size: batch_size.max(1),
            rows_written: 0,
            path: None,
            finished: false,
        })
    }

    pub fn push(&mut self, row: LineageBatchRow) -> Result<()> {
        self.batch.push(row);
        if self.batch.len() >= self.batch_size {
            self.write_batch()?;
        }
        Ok(())
    }

    /// Rows currently buffered.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    fn write_batch(&mut self) -> Result<()> {
        for row in self.batch.drain(..) {
            writeln!(
                self.writer,
                "{},{},{},{}",
                csv_field(&row.lineage),
                csv_field(&row.sig_name),
                row.hash_count,
                row.genome_count
            )?;
            self.rows_written += 1;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes whatever is still buffered.
    pub fn finish(mut self) -> Result<usize> {
        self.write_batch()?;
        self.finished = true;
        Ok(self.rows_written)
    }
}

impl Drop for BatchLog {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(path) = self.path.take() {
            // close the file before removing it
            self.writer = Box::new(io::sink());
            match fs::remove_file(&path) {
                Ok(()) => log::warn!("Removed incomplete audit log '{}'", path.display()),
                Err(e) => log::warn!("Could not remove incomplete audit log '{}': {}", path.display(), e),
            }
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Settings for one aggregation pass.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub rank: Rank,
    pub track_abundance: bool,
    pub batch_size: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            rank: Rank::Species,
            track_abundance: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Folds genome sketches into lineage groups.
///
/// Groups are kept in order of first appearance, and each group's counter
/// is only ever touched through `&mut self`.
pub struct Aggregator<'a, L: LineageLookup> {
    taxdb: &'a L,
    config: AggregatorConfig,
    groups: Vec<LineageGroup>,
    by_name: AHashMap<String, usize>,
    batch_log: Option<BatchLog>,
    genomes_seen: usize,
}

impl<'a, L: LineageLookup> Aggregator<'a, L> {
    pub fn new(taxdb: &'a L, config: AggregatorConfig) -> Self {
        Self {
            taxdb,
            config,
            groups: Vec::new(),
            by_name: AHashMap::new(),
            batch_log: None,
            genomes_seen: 0,
        }
    }

    pub fn with_batch_log(mut self, log: BatchLog) -> Self {
        self.batch_log = Some(log);
        self
    }

    /// Resolves the sketch's lineage and folds it into that group.
    /// Returns the lineage name it was assigned to.
    pub fn add_sketch(&mut self, sketch: &Sketch) -> Result<String> {
        let ident = ident_from_name(&sketch.name);
        let lineage_name = resolve_lineage_name(self.taxdb, ident, self.config.rank)?;
        self.add_to_group(&lineage_name, ident, sketch)?;
        Ok(lineage_name)
    }

    /// Folds a sketch into an explicitly named group.
    pub fn add_to_group(&mut self, lineage_name: &str, ident: &str, sketch: &Sketch) -> Result<()> {
        let ordinal = self.genomes_seen;
        if ordinal > 0 && ordinal % 1000 == 0 {
            log::info!("...{} - loading", ordinal);
        }

        let existing = self.by_name.get(lineage_name).copied();
        let group = match existing {
            Some(i) => {
                let group = &mut self.groups[i];
                group.merge(sketch)?;
                group
            }
            None => {
                self.by_name.insert(lineage_name.to_string(), self.groups.len());
                self.groups.push(LineageGroup::new(lineage_name, ident, sketch));
                let last = self.groups.len() - 1;
                &mut self.groups[last]
            }
        };
        if self.config.track_abundance {
            group.count_abundances(sketch);
        }
        let hash_count = group.hash_count();
        self.genomes_seen += 1;

        if let Some(log) = self.batch_log.as_mut() {
            log.push(LineageBatchRow {
                lineage: lineage_name.to_string(),
                sig_name: sketch.name.clone(),
                hash_count,
                genome_count: ordinal,
            })?;
        }
        Ok(())
    }

    pub fn groups(&self) -> &[LineageGroup] {
        &self.groups
    }

    pub fn group(&self, lineage_name: &str) -> Option<&LineageGroup> {
        self.by_name.get(lineage_name).map(|&i| &self.groups[i])
    }

    pub fn genomes_seen(&self) -> usize {
        self.genomes_seen
    }

    /// Ends the pass, flushing the audit log.
    pub fn finish(self) -> Result<Vec<LineageGroup>> {
        if let Some(log) = self.batch_log {
            let rows = log.finish()?;
            log::info!("Wrote {} lineage audit rows", rows);
        }
        log::info!(
            "Aggregated {} genomes into {} lineage groups",
            self.genomes_seen,
            self.groups.len()
        );
        Ok(self.groups)
    }
}

/// Folds every sketch into one abundance-tracking sketch named `name`.
pub fn merge_all<'s, I>(sketches: I, name: &str) -> Result<Sketch>
where
    I: IntoIterator<Item = &'s Sketch>,
{
    let mut group: Option<LineageGroup> = None;
    for (n, sketch) in sketches.into_iter().enumerate() {
        if n > 0 && n % 1000 == 0 {
            log::info!("...{} - loading", n);
        }
        match group.as_mut() {
            Some(g) => g.merge(sketch)?,
            None => group = Some(LineageGroup::new(name, name, sketch)),
        }
        if let Some(g) = group.as_mut() {
            g.count_abundances(sketch);
        }
    }
    let group = group.ok_or(PangenomeError::NoSketches)?;
    Ok(group.to_sketch_named(name, true))
}
