use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use pangenomics_rs::aggregate::{AggregatorConfig, DEFAULT_BATCH_SIZE};
use pangenomics_rs::compartment::ThresholdTable;
use pangenomics_rs::errors::Result;
use pangenomics_rs::ranktable::{save_classification_table, save_frequency_table};
use pangenomics_rs::sigfile::{save_sketches, SignatureFileSink, SketchSelection, SketchSink};
use pangenomics_rs::taxdb::Rank;
use pangenomics_rs::types::MoleculeType;
use pangenomics_rs::{build_ranktable, classify_query_files, create_db, merge_sketches};

/// Pangenome compartments (core, shell, cloud) from lineage-merged sketches
#[derive(Parser)]
#[command(name = "pangenomics-rs")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a database of sketches merged at a given rank
    Createdb(CreateDbArgs),
    /// Merge sketches into a single abundance sketch, ignoring lineage
    Merge(MergeArgs),
    /// Annotate the hashes of one merged lineage with pangenome frequencies
    Ranktable(RanktableArgs),
    /// Classify the hashes in a sketch against one or more ranktables
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct SelectArgs {
    /// k-mer size to select
    #[arg(short, long, default_value_t = 31)]
    ksize: u32,
    /// Molecule type to select (dna, protein, dayhoff, hp)
    #[arg(long, default_value = "dna")]
    moltype: MoleculeType,
    /// Downsample sketches to this scaled value
    #[arg(long)]
    scaled: Option<u64>,
}

impl SelectArgs {
    fn selection(&self) -> SketchSelection {
        SketchSelection {
            ksize: Some(self.ksize),
            molecule: Some(self.moltype),
            scaled: self.scaled,
        }
    }
}

#[derive(Args)]
struct CreateDbArgs {
    /// Genome sketches to combine
    #[arg(required = true)]
    sketches: Vec<PathBuf>,
    /// Lineage CSV file(s)
    #[arg(short = 't', long = "taxonomy", visible_alias = "taxonomy-file", required = true, num_args = 1..)]
    taxonomy: Vec<PathBuf>,
    /// Output signature file for the merged sketches
    #[arg(short, long)]
    output: PathBuf,
    /// Audit CSV of lineage, genome name, hash count and genome ordinal
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Rank to merge at
    #[arg(short, long, default_value = "species")]
    rank: Rank,
    /// Track hash abundance across each lineage
    #[arg(short, long)]
    abund: bool,
    /// Also write one frequency table per lineage into this directory
    #[arg(long, requires = "abund")]
    ranktable_dir: Option<PathBuf>,
    /// Audit rows buffered between writes
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    #[command(flatten)]
    select: SelectArgs,
}

#[derive(Args)]
struct MergeArgs {
    /// Sketches to combine
    #[arg(required = true)]
    sketches: Vec<PathBuf>,
    /// Output signature file
    #[arg(short, long)]
    output: PathBuf,
    /// Name of the merged sketch
    #[arg(long, default_value = "merged")]
    name: String,
    #[command(flatten)]
    select: SelectArgs,
}

#[derive(Args)]
struct RanktableArgs {
    /// Database created with `createdb --abund` or `merge`
    data: PathBuf,
    /// Regex selecting the lineage sketch, e.g. "s__Escherichia coli"
    #[arg(short, long)]
    lineage: Option<String>,
    /// Ignore case when matching --lineage
    #[arg(short, long)]
    ignore_case: bool,
    /// Frequency table output (hashval,freq,abund,max_abund)
    #[arg(short, long)]
    output: PathBuf,
    /// Also write the direct hashval,pangenome_classification table
    #[arg(long)]
    classification_csv: Option<PathBuf>,
    /// Compartment thresholds as percentages, e.g. 95:90:10:01:00
    #[arg(long, default_value = "95:90:10:01:00")]
    thresholds: ThresholdTable,
    #[command(flatten)]
    select: SelectArgs,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Query sketch (exactly one after selection)
    query: PathBuf,
    /// Ranktables produced by `ranktable`
    #[arg(required = true)]
    ranktables: Vec<PathBuf>,
    /// Compartment thresholds as percentages, e.g. 95:90:10:01:00
    #[arg(long, default_value = "95:90:10:01:00")]
    thresholds: ThresholdTable,
    /// Save central core and shell extracts per table into this directory
    #[arg(long)]
    extract_dir: Option<PathBuf>,
    #[command(flatten)]
    select: SelectArgs,
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{}}} {{msg}}", color);
    if let Ok(style) = ProgressStyle::default_spinner().template(&template) {
        spinner.set_style(style.tick_strings(&[
            "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
        ]));
    }
    spinner.set_message(msg.to_string());
    spinner
}

fn run_createdb(args: CreateDbArgs) -> Result<()> {
    let config = AggregatorConfig {
        rank: args.rank,
        track_abundance: args.abund,
        batch_size: args.batch_size,
    };

    let sp = spinner("blue", "Merging sketches by lineage...");
    let results = create_db(
        &args.sketches,
        &args.taxonomy,
        &args.select.selection(),
        config,
        args.csv.as_deref(),
    )?;
    sp.finish_with_message(format!(
        "Merged genomes into {} lineage groups at rank {}.",
        results.groups.len(),
        args.rank
    ));

    let sp = spinner("yellow", "Writing output sketches...");
    let mut sink = SignatureFileSink::new(&args.output);
    for sketch in results.merged_sketches() {
        sink.add(sketch)?;
    }
    let written = sink.finish()?;
    sp.finish_with_message(format!("Wrote {} sketches to '{}'.", written, args.output.display()));

    if let Some(dir) = &args.ranktable_dir {
        let sp = spinner("green", "Building per-lineage ranktables...");
        let paths = results.save_ranktables(dir)?;
        sp.finish_with_message(format!("Wrote {} ranktables to '{}'.", paths.len(), dir.display()));
    }

    print!("{}", results.get_summary());
    Ok(())
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let sp = spinner("blue", "Merging sketches...");
    let merged = merge_sketches(&args.sketches, &args.select.selection(), &args.name)?;
    save_sketches(&args.output, &[merged])?;
    sp.finish_with_message(format!("Saved '{}' to '{}'.", args.name, args.output.display()));
    Ok(())
}

fn run_ranktable(args: RanktableArgs) -> Result<()> {
    let sp = spinner("blue", "Computing hash frequencies...");
    let results = build_ranktable(
        &args.data,
        &args.select.selection(),
        args.lineage.as_deref(),
        args.ignore_case,
    )?;
    sp.finish_with_message(format!("'{}': {} hashes.", results.sketch_name, results.records.len()));

    log::info!("Writing hash frequencies to CSV file '{}'", args.output.display());
    save_frequency_table(&args.output, &results.records)?;

    if let Some(path) = &args.classification_csv {
        log::info!("Writing hash classification to CSV file '{}'", path.display());
        save_classification_table(path, &results.classified(&args.thresholds)?)?;
    }

    print!("{}", results.get_summary(&args.thresholds)?);
    Ok(())
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    let sp = spinner("green", "Classifying hashes...");
    let results = classify_query_files(
        &args.query,
        &args.ranktables,
        &args.select.selection(),
        &args.thresholds,
    )?;
    sp.finish_with_message(format!(
        "Classified '{}' against {} table(s).",
        results.query.name,
        results.per_table.len()
    ));

    if let Some(dir) = &args.extract_dir {
        results.save_extracts(dir)?;
    }

    print!("{}", results.get_report());
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let outcome = match cli.command {
        Commands::Createdb(args) => run_createdb(args),
        Commands::Merge(args) => run_merge(args),
        Commands::Ranktable(args) => run_ranktable(args),
        Commands::Classify(args) => run_classify(args),
    };

    if let Err(err) = outcome {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
