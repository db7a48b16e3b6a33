// src/lib.rs
pub mod types;
pub mod errors;
pub mod compartment;
pub mod fileio;
pub mod taxdb;
pub mod resolve;
pub mod aggregate;
pub mod classify;
pub mod ranktable;
pub mod sigfile;

use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

use regex::RegexBuilder;

use crate::aggregate::{merge_all, Aggregator, AggregatorConfig, BatchLog, LineageGroup};
use crate::classify::classify_groups::{
    classify_groups, classify_records, compartment_sizes, sketch_frequency_records, GroupFrequencies,
};
use crate::classify::classify_query::{classify_query_tables, QueryClassification};
use crate::compartment::{Compartment, ThresholdTable};
use crate::errors::{PangenomeError, Result};
use crate::fileio::{table_stem, unique_stems};
use crate::ranktable::{lineage_file_stem, load_table, save_frequency_table, ClassificationTable};
use crate::sigfile::{load_sketches, save_sketches, SketchSelection};
use crate::taxdb::TaxonomyDb;
use crate::types::{FrequencyRecord, HashValue, Sketch};

pub use crate::errors::PangenomeError as Error;

/// Output of a `create_db` pass: one group per lineage name, in order of
/// first appearance.
pub struct CreateDbResults {
    pub groups: Vec<LineageGroup>,
    pub track_abundance: bool,
}

impl CreateDbResults {
    /// One merged sketch per group, carrying abundances when tracked.
    pub fn merged_sketches(&self) -> Vec<Sketch> {
        self.groups
            .iter()
            .map(|g| g.to_sketch(self.track_abundance))
            .collect()
    }

    /// Per-group frequency tables. Requires abundance tracking.
    pub fn frequency_tables(&self) -> Result<Vec<GroupFrequencies>> {
        classify_groups(&self.groups)
    }

    /// Writes one frequency table per group into `dir` as `<lineage>.csv`,
    /// with lineages that map to the same file name kept apart by a numeric
    /// suffix. Returns the paths in group order.
    pub fn save_ranktables(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let tables = self.frequency_tables()?;
        let stems = unique_stems(tables.iter().map(|t| lineage_file_stem(&t.lineage_name)));

        let mut paths = Vec::with_capacity(tables.len());
        for (table, stem) in tables.iter().zip(stems) {
            let path = dir.join(format!("{}.csv", stem));
            log::debug!("'{}' -> {}", table.lineage_name, path.display());
            save_frequency_table(&path, &table.records)?;
            paths.push(path);
        }
        Ok(paths)
    }

    /// Short per-group summary.
    pub fn get_summary(&self) -> String {
        let mut output = String::new();
        writeln!(output, "lineage\tgenomes\thashes\trepresentative").unwrap();
        for g in &self.groups {
            writeln!(
                output,
                "{}\t{}\t{}\t{}",
                g.lineage_name,
                g.genome_count,
                g.hash_count(),
                g.representative
            )
            .unwrap();
        }
        output
    }
}

/// Merges every genome sketch into per-lineage groups.
///
/// Genomes are read file by file and folded as they arrive. Any genome whose
/// lineage cannot be resolved aborts the whole pass before anything is
/// written.
pub fn create_db(
    sketch_paths: &[PathBuf],
    taxonomy_paths: &[PathBuf],
    selection: &SketchSelection,
    config: AggregatorConfig,
    lineage_csv: Option<&Path>,
) -> Result<CreateDbResults> {
    // 1. Load taxonomy
    let taxdb = TaxonomyDb::load_all(taxonomy_paths)?;
    log::info!("found {} identifiers in taxdb.", taxdb.len());

    // 2. Optional audit log
    let mut aggregator = Aggregator::new(&taxdb, config);
    if let Some(path) = lineage_csv {
        aggregator = aggregator.with_batch_log(BatchLog::create(path, config.batch_size)?);
    }

    // 3. Fold every selected genome
    for path in sketch_paths {
        log::info!("loading sketches from file {}", path.display());
        for sketch in load_sketches(path, selection)? {
            aggregator.add_sketch(&sketch)?;
        }
    }

    let groups = aggregator.finish()?;
    Ok(CreateDbResults {
        groups,
        track_abundance: config.track_abundance,
    })
}

/// Folds every selected sketch, regardless of lineage, into one abundance
/// sketch called `name`.
pub fn merge_sketches(sketch_paths: &[PathBuf], selection: &SketchSelection, name: &str) -> Result<Sketch> {
    let mut all = Vec::new();
    for path in sketch_paths {
        log::info!("loading sketches from file {}", path.display());
        all.extend(load_sketches(path, selection)?);
    }
    merge_all(&all, name)
}

/// Frequency table for one merged pangenome sketch.
pub struct RanktableResults {
    pub sketch_name: String,
    pub records: Vec<FrequencyRecord>,
}

impl RanktableResults {
    pub fn classified(&self, thresholds: &ThresholdTable) -> Result<Vec<(HashValue, Compartment)>> {
        classify_records(&self.records, thresholds)
    }

    /// Compartment sizes under `thresholds`, as text.
    pub fn get_summary(&self, thresholds: &ThresholdTable) -> Result<String> {
        let sizes = compartment_sizes(&self.classified(thresholds)?);
        let mut output = String::new();
        writeln!(output, "'{}': {} hashes", self.sketch_name, self.records.len()).unwrap();
        for c in Compartment::ALL {
            writeln!(output, "\t{} hashes in {}", sizes[c.index()], c.name()).unwrap();
        }
        Ok(output)
    }
}

/// Picks the one sketch in `sketches` whose name or filename matches
/// `pattern`. Without a pattern the file must hold exactly one sketch.
pub fn select_lineage_sketch(
    sketches: Vec<Sketch>,
    source: &str,
    pattern: Option<&str>,
    ignore_case: bool,
) -> Result<Sketch> {
    let mut matches: Vec<Sketch> = match pattern {
        Some(pattern) => {
            log::info!("Looking for {} signature", pattern);
            let re = RegexBuilder::new(pattern)
                .case_insensitive(ignore_case)
                .build()?;
            sketches
                .into_iter()
                .filter(|s| re.is_match(&s.name) || re.is_match(&s.filename))
                .collect()
        }
        None => sketches,
    };

    match (matches.len(), pattern) {
        (1, _) => Ok(matches.remove(0)),
        (0, _) => Err(PangenomeError::NoSketches),
        (_, Some(pattern)) => Err(PangenomeError::AmbiguousLineage {
            pattern: pattern.to_string(),
            matches: matches.into_iter().map(|s| s.name).collect(),
        }),
        (found, None) => Err(PangenomeError::SketchCount {
            path: source.to_string(),
            found,
        }),
    }
}

/// Builds the frequency table of one lineage sketch from a merged database.
pub fn build_ranktable(
    db_path: &Path,
    selection: &SketchSelection,
    lineage: Option<&str>,
    ignore_case: bool,
) -> Result<RanktableResults> {
    let sketches = load_sketches(db_path, selection)?;
    let sketch = select_lineage_sketch(sketches, &db_path.display().to_string(), lineage, ignore_case)?;
    log::info!("Found '{}' with {} hashes", sketch.name, sketch.len());

    let records = sketch_frequency_records(&sketch)?;
    Ok(RanktableResults {
        sketch_name: sketch.name,
        records,
    })
}

/// A query sketch classified against several ranktables.
pub struct QueryResults {
    pub query: Sketch,
    pub per_table: Vec<QueryClassification>,
}

impl QueryResults {
    /// All per-table reports, concatenated.
    pub fn get_report(&self) -> String {
        self.per_table
            .iter()
            .map(|r| r.report.to_text())
            .collect::<Vec<_>>()
            .join("")
    }

    /// Saves each table's central core and shell hashes into `dir` as
    /// `<table stem>.central_core.sig` and `<table stem>.shell.sig`. Tables
    /// sharing a stem get a numeric suffix. Returns the paths written.
    pub fn save_extracts(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let stems = unique_stems(
            self.per_table
                .iter()
                .map(|r| table_stem(Path::new(&r.report.table))),
        );

        let mut paths = Vec::with_capacity(self.per_table.len() * 2);
        for (r, stem) in self.per_table.iter().zip(stems) {
            let core_path = dir.join(format!("{}.central_core.sig", stem));
            log::info!("Saving central core hashes to '{}'", core_path.display());
            save_sketches(&core_path, std::slice::from_ref(&r.central_core))?;

            let shell_path = dir.join(format!("{}.shell.sig", stem));
            log::info!("Saving shell hashes to '{}'", shell_path.display());
            save_sketches(&shell_path, std::slice::from_ref(&r.shell))?;

            paths.push(core_path);
            paths.push(shell_path);
        }
        Ok(paths)
    }
}

/// Classifies the single sketch in `query_path` against every table.
///
/// Thresholds are validated before any table is read.
pub fn classify_query_files(
    query_path: &Path,
    table_paths: &[PathBuf],
    selection: &SketchSelection,
    thresholds: &ThresholdTable,
) -> Result<QueryResults> {
    ThresholdTable::validate(thresholds.thresholds())?;

    let mut sketches = load_sketches(query_path, selection)?;
    if sketches.len() != 1 {
        return Err(PangenomeError::SketchCount {
            path: query_path.display().to_string(),
            found: sketches.len(),
        });
    }
    let query = sketches.remove(0);

    let mut tables: Vec<(String, ClassificationTable)> = Vec::with_capacity(table_paths.len());
    for path in table_paths {
        tables.push((path.display().to_string(), load_table(path)?));
    }

    let per_table = classify_query_tables(&query, &tables, thresholds)?;
    Ok(QueryResults { query, per_table })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranktable::save_classification_table;
    use crate::types::SketchParams;

    fn genome(name: &str, hashes: &[u64]) -> Sketch {
        let mut s = Sketch::new(name, SketchParams::default(), false);
        for &h in hashes {
            s.add_hash(h);
        }
        s
    }

    #[test]
    fn test_pangenome_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let tax = dir.path().join("tax.csv");
        fs::write(
            &tax,
            "ident,superkingdom,genus,species\n\
             GCF_1.1,d__Bacteria,g__E,s__Escherichia coli\n\
             GCF_2.1,d__Bacteria,g__E,s__Escherichia coli\n\
             GCF_3,d__Bacteria,g__E,s__Escherichia coli\n\
             GCF_4.2,d__Bacteria,g__S,s__Salmonella enterica\n",
        )
        .unwrap();

        // ten hashes in all three E. coli genomes, then progressively rarer ones
        let core: Vec<u64> = (1..=10).collect();
        let mut g1 = core.clone();
        g1.extend([100, 200]);
        let mut g2 = core.clone();
        g2.extend([100]);
        let genomes = vec![
            genome("GCF_1.1 E. coli A", &g1),
            genome("GCF_2.1 E. coli B", &g2),
            genome("GCF_3.1 E. coli C", &core),
            genome("GCF_4.2 S. enterica", &[500, 501]),
        ];
        let sigs = dir.path().join("genomes.sig");
        save_sketches(&sigs, &genomes).unwrap();

        // createdb
        let audit = dir.path().join("lineages.csv");
        let config = AggregatorConfig {
            track_abundance: true,
            ..AggregatorConfig::default()
        };
        let created = create_db(
            &[sigs.clone()],
            &[tax.clone()],
            &SketchSelection::default(),
            config,
            Some(&audit),
        )
        .unwrap();
        assert_eq!(created.groups.len(), 2);
        assert_eq!(created.groups[0].genome_count, 3);
        assert!(created.get_summary().contains("s__Escherichia coli\t3\t12\tGCF_1.1"));
        let audit_text = fs::read_to_string(&audit).unwrap();
        assert_eq!(audit_text.lines().count(), 5);

        let merged = created.merged_sketches();
        assert_eq!(merged[0].name, "GCF_1.1 s__Escherichia coli");
        assert_eq!(merged[0].abundance(1), Some(3));
        assert_eq!(merged[0].abundance(200), Some(1));
        let db = dir.path().join("merged.sig.gz");
        save_sketches(&db, &merged).unwrap();

        let tables = created.frequency_tables().unwrap();
        assert_eq!(tables[1].lineage_name, "s__Salmonella enterica");

        // ranktable for E. coli
        let ranks = build_ranktable(&db, &SketchSelection::default(), Some("escherichia"), true).unwrap();
        assert_eq!(ranks.records.len(), 12);
        assert_eq!(ranks.records[0].abund, 3);
        let classified = ranks.classified(&ThresholdTable::default()).unwrap();
        assert_eq!(compartment_sizes(&classified), [10, 0, 2, 0, 0]);
        let freq_csv = dir.path().join("ecoli.csv");
        save_frequency_table(&freq_csv, &ranks.records).unwrap();
        let legacy_csv = dir.path().join("ecoli.classes.csv");
        save_classification_table(&legacy_csv, &classified).unwrap();

        // classify a query against both forms
        let query = dir.path().join("query.sig");
        save_sketches(&query, &[genome("sample", &[1, 2, 200, 999])]).unwrap();
        let results = classify_query_files(
            &query,
            &[freq_csv.clone(), legacy_csv.clone()],
            &SketchSelection::default(),
            &ThresholdTable::default(),
        )
        .unwrap();
        assert_eq!(results.per_table.len(), 2);
        for r in &results.per_table {
            assert_eq!(r.report.count(Compartment::CentralCore), 2);
            assert_eq!(r.report.count(Compartment::Shell), 1);
            assert_eq!(r.report.unclassified, 1);
        }
        assert_eq!(results.per_table[0].report.counts, results.per_table[1].report.counts);
        assert!(results
            .get_report()
            .contains("2 (66.7%) hashes are classified as central core"));
    }

    #[test]
    fn unresolved_genome_aborts_createdb() {
        let dir = tempfile::tempdir().unwrap();
        let tax = dir.path().join("tax.csv");
        fs::write(&tax, "ident,species\nGCF_1.1,s__A\n").unwrap();
        let sigs = dir.path().join("genomes.sig");
        save_sketches(&sigs, &[genome("GCF_1.1 a", &[1]), genome("GCF_777.1 b", &[2])]).unwrap();

        let audit = dir.path().join("audit.csv");
        let config = AggregatorConfig {
            batch_size: 1,
            ..AggregatorConfig::default()
        };

        for _ in 0..2 {
            let err = create_db(
                &[sigs.clone()],
                &[tax.clone()],
                &SketchSelection::default(),
                config,
                Some(&audit),
            )
            .err()
            .unwrap();
            assert!(matches!(err, PangenomeError::UnresolvedLineage { ref ident, .. } if ident == "GCF_777.1"));
            assert!(!audit.exists());
        }
    }

    #[test]
    fn colliding_lineage_names_get_separate_ranktables() {
        let dir = tempfile::tempdir().unwrap();
        let tax = dir.path().join("tax.csv");
        fs::write(&tax, "ident,species
G1,s__E coli
G2,s__E-coli
G3,s__E_coli
").unwrap();
        let sigs = dir.path().join("genomes.sig");
        save_sketches(
            &sigs,
            &[genome("G1 a", &[1]), genome("G2 b", &[2, 3]), genome("G3 c", &[4, 5, 6])],
        )
        .unwrap();

        let config = AggregatorConfig {
            track_abundance: true,
            ..AggregatorConfig::default()
        };
        let created = create_db(&[sigs], &[tax], &SketchSelection::default(), config, None).unwrap();
        let out = dir.path().join("tables");
        let paths = created.save_ranktables(&out).unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["s__E_coli.csv", "s__E_coli.2.csv", "s__E_coli.3.csv"]);
        for (path, expected) in paths.iter().zip([1, 2, 3]) {
            match load_table(path).unwrap() {
                ClassificationTable::Frequencies(records) => assert_eq!(records.len(), expected),
                other => panic!("unexpected table {:?}", other),
            }
        }
    }

    #[test]
    fn extracts_from_same_named_tables_do_not_clash() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a", "b"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        let table_a = dir.path().join("a").join("ecoli.csv");
        let table_b = dir.path().join("b").join("ecoli.csv");
        save_classification_table(&table_a, &[(1, Compartment::CentralCore)]).unwrap();
        save_classification_table(&table_b, &[(2, Compartment::CentralCore), (1, Compartment::Shell)]).unwrap();

        let query = dir.path().join("query.sig");
        save_sketches(&query, &[genome("sample", &[1, 2])]).unwrap();
        let results = classify_query_files(
            &query,
            &[table_a, table_b],
            &SketchSelection::default(),
            &ThresholdTable::default(),
        )
        .unwrap();

        let out = dir.path().join("extracts");
        let paths = results.save_extracts(&out).unwrap();
        assert_eq!(paths.len(), 4);
        assert!(out.join("ecoli.central_core.sig").exists());
        assert!(out.join("ecoli.2.central_core.sig").exists());

        let first = load_sketches(out.join("ecoli.central_core.sig"), &SketchSelection::default()).unwrap();
        let second = load_sketches(out.join("ecoli.2.central_core.sig"), &SketchSelection::default()).unwrap();
        assert_eq!(first[0].hashes().collect::<Vec<_>>(), vec![1]);
        assert_eq!(second[0].hashes().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn lineage_selection_rules() {
        let sketches = vec![genome("G1 s__Escherichia coli", &[1]), genome("G2 s__Escherichia albertii", &[2])];
        let one = select_lineage_sketch(sketches.clone(), "db", Some("coli"), false).unwrap();
        assert_eq!(one.name, "G1 s__Escherichia coli");

        assert!(matches!(
            select_lineage_sketch(sketches.clone(), "db", Some("ESCHERICHIA"), true),
            Err(PangenomeError::AmbiguousLineage { .. })
        ));
        assert!(matches!(
            select_lineage_sketch(sketches.clone(), "db", Some("ESCHERICHIA"), false),
            Err(PangenomeError::NoSketches)
        ));
        assert!(matches!(
            select_lineage_sketch(sketches, "db", None, false),
            Err(PangenomeError::SketchCount { found: 2, .. })
        ));
    }

    #[test]
    fn merge_ignores_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let sigs = dir.path().join("genomes.sig");
        save_sketches(&sigs, &[genome("a", &[1, 2]), genome("b", &[2, 3])]).unwrap();
        let merged = merge_sketches(&[sigs], &SketchSelection::default(), "merged").unwrap();
        assert_eq!(merged.name, "merged");
        assert_eq!(merged.abundance(2), Some(2));
        assert_eq!(merged.len(), 3);
    }
}
