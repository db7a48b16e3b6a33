//src/sigfile.rs

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{PangenomeError, Result};
use crate::fileio::{create_writer, open_reader};
use crate::types::{max_hash_for_scaled, scaled_for_max_hash, MoleculeType, Sketch, SketchParams};

/// One sketch inside a signature record, as sourmash writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MinHashRecord {
    #[serde(default)]
    num: u32,
    ksize: u32,
    #[serde(default = "default_seed")]
    seed: u64,
    #[serde(default)]
    max_hash: u64,
    mins: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    abundances: Option<Vec<u64>>,
    #[serde(default = "default_molecule")]
    molecule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    md5sum: Option<String>,
}

/// A named signature holding one sketch per ksize/molecule.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignatureRecord {
    #[serde(default = "default_class")]
    class: String,
    #[serde(default)]
    email: String,
    #[serde(default = "default_hash_function")]
    hash_function: String,
    #[serde(default)]
    filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default = "default_license")]
    license: String,
    signatures: Vec<MinHashRecord>,
    #[serde(default = "default_version")]
    version: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignatureFile {
    Many(Vec<SignatureRecord>),
    One(SignatureRecord),
}

fn default_seed() -> u64 {
    42
}
fn default_molecule() -> String {
    "DNA".to_string()
}
fn default_class() -> String {
    "sourmash_signature".to_string()
}
fn default_hash_function() -> String {
    "0.murmur64".to_string()
}
fn default_license() -> String {
    "CC0".to_string()
}
fn default_version() -> f64 {
    0.4
}

/// Protein-like alphabets store ksize in nucleotides on disk.
fn ksize_multiplier(molecule: MoleculeType) -> u32 {
    match molecule {
        MoleculeType::Dna => 1,
        _ => 3,
    }
}

impl MinHashRecord {
    fn into_sketch(self, name: String, filename: String) -> Result<Sketch> {
        let molecule: MoleculeType = self.molecule.parse()?;
        let params = SketchParams {
            ksize: self.ksize / ksize_multiplier(molecule),
            molecule,
            scaled: scaled_for_max_hash(self.max_hash),
            seed: self.seed,
        };

        if let Some(abunds) = &self.abundances {
            if abunds.len() != self.mins.len() {
                return Err(PangenomeError::AbundanceMismatch {
                    name,
                    hashes: self.mins.len(),
                    abundances: abunds.len(),
                });
            }
        }

        let mut sketch = Sketch::new(name, params, self.abundances.is_some());
        sketch.filename = filename;
        match self.abundances {
            Some(abunds) => {
                for (hash, abund) in self.mins.into_iter().zip(abunds) {
                    sketch.add_hash_with_abundance(hash, abund);
                }
            }
            None => {
                for hash in self.mins {
                    sketch.add_hash(hash);
                }
            }
        }
        Ok(sketch)
    }

    fn from_sketch(sketch: &Sketch) -> Self {
        let params = sketch.params;
        Self {
            num: 0,
            ksize: params.ksize * ksize_multiplier(params.molecule),
            seed: params.seed,
            max_hash: if params.scaled <= 1 { 0 } else { max_hash_for_scaled(params.scaled) },
            mins: sketch.hashes().collect(),
            abundances: sketch
                .track_abundance
                .then(|| sketch.hash_abundances().map(|(_, a)| a).collect()),
            molecule: params.molecule.as_str().to_string(),
            md5sum: None,
        }
    }
}

/// Which sketches to keep when loading, mirroring the usual
/// `-k/--moltype/--scaled` options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SketchSelection {
    pub ksize: Option<u32>,
    pub molecule: Option<MoleculeType>,
    pub scaled: Option<u64>,
}

impl SketchSelection {
    /// Keeps `sketch` if it matches, downsampling to the selected `scaled`.
    /// A sketch with a coarser `scaled` than requested cannot be used.
    pub fn select(&self, mut sketch: Sketch) -> Option<Sketch> {
        if self.ksize.is_some_and(|k| k != sketch.params.ksize) {
            return None;
        }
        if self.molecule.is_some_and(|m| m != sketch.params.molecule) {
            return None;
        }
        if let Some(scaled) = self.scaled {
            if sketch.params.scaled > scaled {
                log::debug!(
                    "skipping '{}': scaled={} is coarser than requested {}",
                    sketch.name,
                    sketch.params.scaled,
                    scaled
                );
                return None;
            }
            sketch.downsample(scaled);
        }
        Some(sketch)
    }
}

/// Loads every sketch in a signature JSON file (optionally `.gz`) that
/// passes `selection`.
pub fn load_sketches<P: AsRef<Path>>(path: P, selection: &SketchSelection) -> Result<Vec<Sketch>> {
    let path = path.as_ref();
    let reader = open_reader(path)?;
    let records = match serde_json::from_reader(reader)? {
        SignatureFile::Many(records) => records,
        SignatureFile::One(record) => vec![record],
    };

    let mut sketches = Vec::new();
    let mut total = 0usize;
    for record in records {
        let name = record
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| record.filename.clone());
        for mh in record.signatures {
            total += 1;
            let sketch = mh.into_sketch(name.clone(), record.filename.clone())?;
            if let Some(sketch) = selection.select(sketch) {
                sketches.push(sketch);
            }
        }
    }

    log::info!(
        "loaded {} of {} sketches from '{}' matching {:?}",
        sketches.len(),
        total,
        path.display(),
        selection
    );
    Ok(sketches)
}

/// Writes sketches as a sourmash-style JSON list, one record per sketch.
pub fn write_sketches<W: Write>(writer: &mut W, sketches: &[Sketch]) -> Result<()> {
    let records: Vec<SignatureRecord> = sketches
        .iter()
        .map(|s| SignatureRecord {
            class: default_class(),
            email: String::new(),
            hash_function: default_hash_function(),
            filename: s.filename.clone(),
            name: Some(s.name.clone()),
            license: default_license(),
            signatures: vec![MinHashRecord::from_sketch(s)],
            version: default_version(),
        })
        .collect();
    serde_json::to_writer(&mut *writer, &records)?;
    writer.flush()?;
    Ok(())
}

pub fn save_sketches<P: AsRef<Path>>(path: P, sketches: &[Sketch]) -> Result<()> {
    let mut writer = create_writer(path)?;
    write_sketches(&mut writer, sketches)
}

/// Receives finished sketches.
pub trait SketchSink {
    fn add(&mut self, sketch: Sketch) -> Result<()>;
}

impl SketchSink for Vec<Sketch> {
    fn add(&mut self, sketch: Sketch) -> Result<()> {
        self.push(sketch);
        Ok(())
    }
}

/// Collects sketches and writes them to one signature file on `finish`.
pub struct SignatureFileSink {
    path: PathBuf,
    sketches: Vec<Sketch>,
}

impl SignatureFileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            sketches: Vec::new(),
        }
    }

    pub fn finish(self) -> Result<usize> {
        save_sketches(&self.path, &self.sketches)?;
        log::info!("Wrote {} sketches to '{}'", self.sketches.len(), self.path.display());
        Ok(self.sketches.len())
    }
}

impl SketchSink for SignatureFileSink {
    fn add(&mut self, sketch: Sketch) -> Result<()> {
        self.sketches.push(sketch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG_JSON: &str = r#"[{"class":"sourmash_signature","email":"","hash_function":"0.murmur64",
        "filename":"g1.fa","name":"GCF_1.1 Escherichia coli","license":"CC0",
        "signatures":[
          {"num":0,"ksize":31,"seed":42,"max_hash":18446744073709552,"mins":[10,20,30],
           "abundances":[1,4,2],"molecule":"DNA","md5sum":"abc"},
          {"num":0,"ksize":21,"seed":42,"max_hash":18446744073709552,"mins":[5],"molecule":"DNA"}
        ],"version":0.4}]"#;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".sig").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn loads_sourmash_json() {
        let f = write_tmp(SIG_JSON);
        let all = load_sketches(f.path(), &SketchSelection::default()).unwrap();
        assert_eq!(all.len(), 2);
        let k31 = &all[0];
        assert_eq!(k31.name, "GCF_1.1 Escherichia coli");
        assert_eq!(k31.filename, "g1.fa");
        assert_eq!(k31.params.ksize, 31);
        assert_eq!(k31.params.scaled, 1000);
        assert!(k31.track_abundance);
        assert_eq!(k31.abundance(20), Some(4));
        assert!(!all[1].track_abundance);
    }

    #[test]
    fn mismatched_abundances_are_rejected() {
        let f = write_tmp(
            r#"{"name":"GCF_9.1 broken","filename":"g9.fa","signatures":[
                {"ksize":31,"max_hash":18446744073709552,"mins":[1,2,3],"abundances":[5,6]}]}"#,
        );
        let err = load_sketches(f.path(), &SketchSelection::default()).unwrap_err();
        assert!(matches!(
            err,
            PangenomeError::AbundanceMismatch { ref name, hashes: 3, abundances: 2 } if name == "GCF_9.1 broken"
        ));
    }

    #[test]
    fn selection_filters_by_ksize_and_molecule() {
        let f = write_tmp(SIG_JSON);
        let sel = SketchSelection {
            ksize: Some(21),
            ..SketchSelection::default()
        };
        let got = load_sketches(f.path(), &sel).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].params.ksize, 21);

        let protein = SketchSelection {
            molecule: Some(MoleculeType::Protein),
            ..SketchSelection::default()
        };
        assert!(load_sketches(f.path(), &protein).unwrap().is_empty());
    }

    #[test]
    fn selection_downsamples_and_skips_coarser() {
        let mut s = Sketch::new("x", SketchParams { scaled: 10, ..SketchParams::default() }, false);
        let cut = max_hash_for_scaled(1000);
        s.add_hash(cut - 1);
        s.add_hash(cut + 1);

        let sel = SketchSelection {
            scaled: Some(1000),
            ..SketchSelection::default()
        };
        let down = sel.select(s.clone()).unwrap();
        assert_eq!(down.params.scaled, 1000);
        assert_eq!(down.hashes().collect::<Vec<_>>(), vec![cut - 1]);

        let finer = SketchSelection {
            scaled: Some(5),
            ..SketchSelection::default()
        };
        assert!(finer.select(s).is_none());
    }

    #[test]
    fn saved_sketches_reload() {
        let mut abund = Sketch::new("G1 s__A", SketchParams::default(), true);
        abund.add_hash_with_abundance(7, 3);
        abund.add_hash_with_abundance(2, 1);
        let mut prot = Sketch::new(
            "P",
            SketchParams { ksize: 10, molecule: MoleculeType::Protein, scaled: 100, seed: 42 },
            false,
        );
        prot.add_hash(99);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sig.gz");
        let mut sink = SignatureFileSink::new(&path);
        sink.add(abund.clone()).unwrap();
        sink.add(prot.clone()).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);

        let back = load_sketches(&path, &SketchSelection::default()).unwrap();
        assert_eq!(back, vec![abund, prot]);
    }
}
