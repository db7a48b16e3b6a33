//src/types.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::PangenomeError;

/// A k-mer hash as stored in a sketch.
pub type HashValue = u64;

/// Molecule type a sketch was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoleculeType {
    Dna,
    Protein,
    Dayhoff,
    Hp,
}

impl MoleculeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoleculeType::Dna => "DNA",
            MoleculeType::Protein => "protein",
            MoleculeType::Dayhoff => "dayhoff",
            MoleculeType::Hp => "hp",
        }
    }
}

impl FromStr for MoleculeType {
    type Err = PangenomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dna" => Ok(MoleculeType::Dna),
            "protein" => Ok(MoleculeType::Protein),
            "dayhoff" => Ok(MoleculeType::Dayhoff),
            "hp" => Ok(MoleculeType::Hp),
            other => Err(PangenomeError::UnknownMolecule(other.to_string())),
        }
    }
}

impl fmt::Display for MoleculeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hash scheme a sketch was built with. Two sketches can only be
/// merged when these agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SketchParams {
    pub ksize: u32,
    pub molecule: MoleculeType,
    pub scaled: u64,
    pub seed: u64,
}

impl SketchParams {
    /// Largest hash kept at this `scaled`; `u64::MAX` when not scaled.
    pub fn max_hash(&self) -> u64 {
        max_hash_for_scaled(self.scaled)
    }
}

impl Default for SketchParams {
    fn default() -> Self {
        Self {
            ksize: 31,
            molecule: MoleculeType::Dna,
            scaled: 1000,
            seed: 42,
        }
    }
}

pub fn max_hash_for_scaled(scaled: u64) -> u64 {
    if scaled <= 1 {
        u64::MAX
    } else {
        (u64::MAX as f64 / scaled as f64) as u64
    }
}

pub fn scaled_for_max_hash(max_hash: u64) -> u64 {
    if max_hash == 0 {
        0
    } else {
        (u64::MAX as f64 / max_hash as f64).round() as u64
    }
}

/// One genome's (or one merged group's) sketch.
///
/// Hashes are kept sorted. Without abundance tracking every stored
/// abundance is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Sketch {
    pub name: String,
    pub filename: String,
    pub params: SketchParams,
    pub track_abundance: bool,
    hashes: BTreeMap<HashValue, u64>,
}

impl Sketch {
    pub fn new(name: impl Into<String>, params: SketchParams, track_abundance: bool) -> Self {
        Self {
            name: name.into(),
            filename: String::new(),
            params,
            track_abundance,
            hashes: BTreeMap::new(),
        }
    }

    /// An empty sketch with the same name and hash scheme.
    pub fn copy_and_clear(&self) -> Self {
        Self {
            name: self.name.clone(),
            filename: self.filename.clone(),
            params: self.params,
            track_abundance: self.track_abundance,
            hashes: BTreeMap::new(),
        }
    }

    pub fn add_hash(&mut self, hash: HashValue) {
        self.add_hash_with_abundance(hash, 1);
    }

    /// Adds `abund` occurrences of `hash`. Flat sketches only record presence.
    pub fn add_hash_with_abundance(&mut self, hash: HashValue, abund: u64) {
        if abund == 0 {
            return;
        }
        let slot = self.hashes.entry(hash).or_insert(0);
        if self.track_abundance {
            *slot += abund;
        } else {
            *slot = 1;
        }
    }

    /// Replaces all abundances, switching on abundance tracking.
    pub fn set_abundances<I>(&mut self, abundances: I)
    where
        I: IntoIterator<Item = (HashValue, u64)>,
    {
        self.track_abundance = true;
        self.hashes.clear();
        for (hash, abund) in abundances {
            if abund > 0 {
                self.hashes.insert(hash, abund);
            }
        }
    }

    pub fn contains(&self, hash: HashValue) -> bool {
        self.hashes.contains_key(&hash)
    }

    pub fn abundance(&self, hash: HashValue) -> Option<u64> {
        self.hashes.get(&hash).copied()
    }

    /// Sorted hash values.
    pub fn hashes(&self) -> impl Iterator<Item = HashValue> + '_ {
        self.hashes.keys().copied()
    }

    /// Sorted `(hash, abundance)` pairs.
    pub fn hash_abundances(&self) -> impl Iterator<Item = (HashValue, u64)> + '_ {
        self.hashes.iter().map(|(&h, &a)| (h, a))
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Drops every hash above the max hash of `scaled`.
    pub fn downsample(&mut self, scaled: u64) {
        if scaled <= self.params.scaled {
            return;
        }
        let max_hash = max_hash_for_scaled(scaled);
        self.hashes.retain(|&h, _| h <= max_hash);
        self.params.scaled = scaled;
    }
}

/// One row of the frequency table for a lineage group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRecord {
    pub hashval: HashValue,
    /// `abund / max_abund`, rounded to 4 decimals.
    pub freq: f64,
    pub abund: u64,
    pub max_abund: u64,
}

/// One row of the lineage audit CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageBatchRow {
    pub lineage: String,
    pub sig_name: String,
    /// Distinct hashes in the group after this genome was folded in.
    pub hash_count: usize,
    /// 0-based position of the genome in the input stream.
    pub genome_count: usize,
}
