//src/compartment.rs

use std::fmt;
use std::str::FromStr;

use crate::errors::{PangenomeError, Result};
use crate::types::HashValue;

/// Code reported for query hashes that are absent from a table.
pub const UNCLASSIFIED_CODE: i32 = -1;

/// The five pangenome compartments, ordered from most to least conserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Compartment {
    CentralCore = 1,
    ExternalCore = 2,
    Shell = 3,
    InnerCloud = 4,
    SurfaceCloud = 5,
}

impl Compartment {
    /// All compartments in ascending code order.
    pub const ALL: [Compartment; 5] = [
        Compartment::CentralCore,
        Compartment::ExternalCore,
        Compartment::Shell,
        Compartment::InnerCloud,
        Compartment::SurfaceCloud,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Compartment::CentralCore),
            2 => Some(Compartment::ExternalCore),
            3 => Some(Compartment::Shell),
            4 => Some(Compartment::InnerCloud),
            5 => Some(Compartment::SurfaceCloud),
            _ => None,
        }
    }

    /// Position in `ALL`.
    pub fn index(self) -> usize {
        self as usize - 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Compartment::CentralCore => "central core",
            Compartment::ExternalCore => "external core",
            Compartment::Shell => "shell",
            Compartment::InnerCloud => "inner cloud",
            Compartment::SurfaceCloud => "surface cloud",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Minimum frequency for each compartment, in `Compartment::ALL` order.
///
/// A table is only constructed through `new`, `parse` or `default`, so every
/// live value is valid: five thresholds in `[0, 1]`, non-increasing, and a
/// floor of exactly zero. The zero floor is what makes `classify` total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable {
    thresholds: [f64; 5],
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            thresholds: [0.95, 0.90, 0.10, 0.01, 0.00],
        }
    }
}

impl ThresholdTable {
    pub fn new(thresholds: &[f64]) -> Result<Self> {
        Self::validate(thresholds)?;
        let mut table = [0.0; 5];
        table.copy_from_slice(thresholds);
        Ok(Self { thresholds: table })
    }

    /// Checks count, range, ordering and the zero floor.
    pub fn validate(thresholds: &[f64]) -> Result<()> {
        if thresholds.len() != Compartment::ALL.len() {
            return Err(PangenomeError::InvalidThresholds(format!(
                "expected {} thresholds, got {}",
                Compartment::ALL.len(),
                thresholds.len()
            )));
        }
        for (compartment, &value) in Compartment::ALL.iter().zip(thresholds) {
            if !(0.0..=1.0).contains(&value) {
                return Err(PangenomeError::InvalidThresholds(format!(
                    "{} threshold {} is outside [0, 1]",
                    compartment, value
                )));
            }
        }
        for (i, pair) in thresholds.windows(2).enumerate() {
            if pair[1] > pair[0] {
                return Err(PangenomeError::InvalidThresholds(format!(
                    "{} threshold {} exceeds {} threshold {}",
                    Compartment::ALL[i + 1],
                    pair[1],
                    Compartment::ALL[i],
                    pair[0]
                )));
            }
        }
        let floor = thresholds[thresholds.len() - 1];
        if floor != 0.0 {
            return Err(PangenomeError::InvalidThresholds(format!(
                "{} threshold must be 0, got {}",
                Compartment::SurfaceCloud,
                floor
            )));
        }
        Ok(())
    }

    /// Parses `"95:90:10:01:00"`: five integer percentages, 0 to 100.
    pub fn parse(input: &str) -> Result<Self> {
        let parse_err = |reason: String| PangenomeError::ThresholdParse {
            input: input.to_string(),
            reason,
        };

        let mut fractions = Vec::with_capacity(5);
        for part in input.trim().split(':') {
            let pct: u32 = part
                .trim()
                .parse()
                .map_err(|_| parse_err(format!("'{}' is not an integer percentage", part)))?;
            if pct > 100 {
                return Err(parse_err(format!("{} is larger than 100", pct)));
            }
            fractions.push(pct as f64 / 100.0);
        }
        Self::new(&fractions)
    }

    pub fn thresholds(&self) -> &[f64; 5] {
        &self.thresholds
    }

    /// First compartment, most conserved first, whose minimum is at or
    /// below `freq`. The lower bound is inclusive.
    pub fn classify(&self, freq: f64) -> Option<Compartment> {
        Compartment::ALL
            .iter()
            .zip(self.thresholds.iter())
            .find(|(_, min)| freq >= **min)
            .map(|(&c, _)| c)
    }

    /// Like `classify`, but a miss is an internal error naming the hash.
    pub fn classify_hash(&self, hash: HashValue, freq: f64) -> Result<Compartment> {
        self.classify(freq)
            .ok_or(PangenomeError::Unclassifiable { hash, freq })
    }
}

impl FromStr for ThresholdTable {
    type Err = PangenomeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ThresholdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .thresholds
            .iter()
            .map(|t| format!("{:02}", (t * 100.0).round() as u32))
            .collect();
        f.write_str(&parts.join(":"))
    }
}
