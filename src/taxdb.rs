//src/taxdb.rs

use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use ahash::AHashMap;

use crate::errors::{PangenomeError, Result};
use crate::fileio::open_reader;

/// Standard taxonomic ranks, broadest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Superkingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    Strain,
}

impl Rank {
    pub const ALL: [Rank; 8] = [
        Rank::Superkingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
        Rank::Strain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Superkingdom => "superkingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
            Rank::Strain => "strain",
        }
    }
}

impl FromStr for Rank {
    type Err = PangenomeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superkingdom" | "domain" => Ok(Rank::Superkingdom),
            "phylum" => Ok(Rank::Phylum),
            "class" => Ok(Rank::Class),
            "order" => Ok(Rank::Order),
            "family" => Ok(Rank::Family),
            "genus" => Ok(Rank::Genus),
            "species" => Ok(Rank::Species),
            "strain" => Ok(Rank::Strain),
            other => Err(PangenomeError::UnknownRank(other.to_string())),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of `(rank, name)` pairs, broadest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage {
    pub ranks: Vec<(Rank, String)>,
}

impl Lineage {
    pub fn new(ranks: Vec<(Rank, String)>) -> Self {
        Self { ranks }
    }

    /// Name at `rank`, if the lineage reaches it with a non-empty name.
    pub fn name_at(&self, rank: Rank) -> Option<&str> {
        self.ranks
            .iter()
            .find(|(r, name)| *r == rank && !name.is_empty())
            .map(|(_, name)| name.as_str())
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.ranks.iter().map(|(_, n)| n.as_str()).collect();
        f.write_str(&names.join(";"))
    }
}

/// A genome identifier to lineage store.
pub trait LineageLookup {
    fn lineage(&self, ident: &str) -> Option<&Lineage>;

    /// Up to `limit` stored identifiers closest to `ident`, best first.
    fn suggest(&self, ident: &str, limit: usize) -> Vec<String>;
}

/// Lineages loaded from a sourmash-style taxonomy CSV.
#[derive(Debug, Default, Clone)]
pub struct TaxonomyDb {
    lineages: AHashMap<String, Lineage>,
}

impl TaxonomyDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lineages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lineages.is_empty()
    }

    /// Adds an identifier. Re-adding the same lineage is a no-op; a
    /// different one is an error.
    pub fn insert(&mut self, ident: impl Into<String>, lineage: Lineage) -> Result<()> {
        let ident = ident.into();
        match self.lineages.get(&ident) {
            Some(existing) if *existing != lineage => {
                Err(PangenomeError::ConflictingLineage { ident })
            }
            Some(_) => Ok(()),
            None => {
                self.lineages.insert(ident, lineage);
                Ok(())
            }
        }
    }

    /// Loads and merges several taxonomy files.
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut db = TaxonomyDb::new();
        for path in paths {
            db.load(path)?;
        }
        Ok(db)
    }

    /// Parses a taxonomy CSV into this database.
    ///
    /// ```text
    /// ident,superkingdom,phylum,class,order,family,genus,species
    /// GCF_000005845.2,d__Bacteria,p__Proteobacteria,...,s__Escherichia coli
    /// ```
    /// A single `lineage` column holding `;`-separated names is accepted in
    /// place of the per-rank columns.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path_str = path.as_ref().display().to_string();
        let reader = open_reader(&path)?;
        let mut lines = reader.lines();

        let malformed = |line: usize, reason: String| PangenomeError::MalformedTaxonomy {
            path: path_str.clone(),
            line,
            reason,
        };

        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(malformed(1, "empty taxonomy file".to_string())),
        };
        let columns: Vec<String> = split_csv_line(&header)
            .into_iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let ident_col = columns
            .iter()
            .position(|c| c == "ident" || c == "identifiers" || c == "accession")
            .ok_or_else(|| malformed(1, "no 'ident' column in header".to_string()))?;
        let lineage_col = columns.iter().position(|c| c == "lineage");
        let rank_cols: Vec<(usize, Rank)> = columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.parse::<Rank>().ok().map(|r| (i, r)))
            .collect();
        if rank_cols.is_empty() && lineage_col.is_none() {
            return Err(malformed(1, "no rank or 'lineage' columns in header".to_string()));
        }

        let mut added = 0;
        for (i, line) in lines.enumerate() {
            let line = line?;
            let line_no = i + 2;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(&line);
            if fields.len() != columns.len() {
                return Err(malformed(
                    line_no,
                    format!("expected {} fields, found {}", columns.len(), fields.len()),
                ));
            }

            let ident = fields[ident_col].trim().to_string();
            if ident.is_empty() {
                return Err(malformed(line_no, "empty identifier".to_string()));
            }

            let ranks = if !rank_cols.is_empty() {
                rank_cols
                    .iter()
                    .map(|&(col, rank)| (rank, fields[col].trim().to_string()))
                    .collect()
            } else {
                let col = lineage_col.unwrap_or(0);
                Rank::ALL
                    .iter()
                    .zip(fields[col].split(';'))
                    .map(|(&rank, name)| (rank, name.trim().to_string()))
                    .collect()
            };

            self.insert(ident, Lineage::new(ranks))?;
            added += 1;
        }

        log::info!("Loaded {} lineages from {}", added, path_str);
        Ok(added)
    }
}

impl LineageLookup for TaxonomyDb {
    fn lineage(&self, ident: &str) -> Option<&Lineage> {
        self.lineages.get(ident)
    }

    fn suggest(&self, ident: &str, limit: usize) -> Vec<String> {
        closest_matches(ident, self.lineages.keys().map(String::as_str), limit)
    }
}

/// Minimum similarity for an identifier to be offered as a suggestion.
const SUGGESTION_CUTOFF: f64 = 0.6;

/// Up to `limit` candidates with similarity at least `SUGGESTION_CUTOFF`,
/// most similar first, ties broken alphabetically.
pub fn closest_matches<'a, I>(needle: &str, candidates: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle_chars: Vec<char> = needle.chars().collect();
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .filter_map(|cand| {
            let max_len = needle_chars.len().max(cand.chars().count());
            if max_len == 0 {
                return None;
            }
            let dist = levenshtein(&needle_chars, cand);
            let ratio = 1.0 - dist as f64 / max_len as f64;
            (ratio >= SUGGESTION_CUTOFF).then_some((ratio, cand))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, cand)| cand.to_string())
        .collect()
}

/// Edit distance between `a` and `b`, two-row dynamic programming.
fn levenshtein(a: &[char], b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Splits one CSV line, honouring double-quoted fields.
pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
