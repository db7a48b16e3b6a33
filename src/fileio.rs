//src/fileio.rs

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ahash::AHashSet;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

fn is_gz(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

/// Opens `path` for line reading, decompressing when it ends in `.gz`.
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let reader: Box<dyn BufRead> = if is_gz(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// Creates (truncating) `path`, compressing when it ends in `.gz`.
pub fn create_writer<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Write>> {
    let path = path.as_ref();
    wrap_writer(path, File::create(path)?)
}

/// Like `create_writer`, but fails with `AlreadyExists` instead of
/// truncating an existing file.
pub fn create_new_writer<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Write>> {
    let path = path.as_ref();
    let f = OpenOptions::new().write(true).create_new(true).open(path)?;
    wrap_writer(path, f)
}

fn wrap_writer(path: &Path, f: File) -> io::Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = if is_gz(path) {
        Box::new(BufWriter::new(GzEncoder::new(f, Compression::default())))
    } else {
        Box::new(BufWriter::new(f))
    };
    Ok(writer)
}

/// File stem without any `.gz` and data extension, e.g. `ecoli` for
/// `tables/ecoli.csv.gz`.
pub fn table_stem(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for ext in [".gz", ".csv", ".sig", ".json"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            name = stripped.to_string();
        }
    }
    name
}

/// Makes every stem unique by appending `.2`, `.3`, ... to repeats, keeping
/// order. Comparison ignores ASCII case so the names also stay distinct on
/// case-insensitive filesystems.
pub fn unique_stems<I>(stems: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut used = AHashSet::new();
    stems
        .into_iter()
        .map(|stem| {
            let mut name = stem.clone();
            let mut n = 2;
            while !used.insert(name.to_ascii_lowercase()) {
                name = format!("{}.{}", stem, n);
                n += 1;
            }
            if n > 2 {
                log::warn!("'{}' is already taken, using '{}'", stem, name);
            }
            name
        })
        .collect()
}
