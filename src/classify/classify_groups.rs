use rayon::prelude::*;

use super::{AbundanceCounter, Compartment, LineageGroup, ThresholdTable};
use crate::errors::{PangenomeError, Result};
use crate::types::{FrequencyRecord, HashValue, Sketch};

/// Frequency table for one lineage group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFrequencies {
    pub lineage_name: String,
    /// Name of the merged sketch the table was built from.
    pub sketch_name: String,
    /// Highest abundance first.
    pub records: Vec<FrequencyRecord>,
}

/// `ratio` rounded to 4 decimal digits.
///
/// Rounds the exact binary value through its decimal rendering. Scaling by
/// 10^4 first would carry values such as 18999/20000 across a threshold.
pub fn round_frequency(ratio: f64) -> f64 {
    format!("{:.4}", ratio).parse().unwrap_or(ratio)
}

/// One record per hash in `counter`, sorted by descending abundance.
///
/// Equal abundances keep the counter's insertion order, so the same counter
/// always produces the same table.
pub fn frequency_records(lineage_name: &str, counter: &AbundanceCounter) -> Result<Vec<FrequencyRecord>> {
    let max_abund = match counter.max_abundance() {
        Some(max) if max > 0 => max,
        _ => {
            return Err(PangenomeError::EmptyGroup {
                lineage: lineage_name.to_string(),
            })
        }
    };

    let mut records: Vec<FrequencyRecord> = counter
        .iter()
        .map(|(hashval, abund)| FrequencyRecord {
            hashval,
            freq: round_frequency(abund as f64 / max_abund as f64),
            abund,
            max_abund,
        })
        .collect();

    // stable: ties stay in insertion order
    records.sort_by(|a, b| b.abund.cmp(&a.abund));
    Ok(records)
}

/// Frequency records for a sketch that already carries group abundances,
/// e.g. one produced by `createdb --abund` or `merge`.
pub fn sketch_frequency_records(sketch: &Sketch) -> Result<Vec<FrequencyRecord>> {
    if !sketch.track_abundance {
        log::warn!(
            "'{}' does not track abundance; every hash will have frequency 1.0",
            sketch.name
        );
    }
    let counter: AbundanceCounter = sketch.hash_abundances().collect();
    frequency_records(&sketch.name, &counter)
}

/// Assigns a compartment to every record, keeping record order.
pub fn classify_records(
    records: &[FrequencyRecord],
    thresholds: &ThresholdTable,
) -> Result<Vec<(HashValue, Compartment)>> {
    records
        .iter()
        .map(|r| {
            thresholds
                .classify_hash(r.hashval, r.freq)
                .map(|c| (r.hashval, c))
        })
        .collect()
}

/// Builds every group's frequency table in parallel.
///
/// Each group is sorted on its own worker and results come back in group
/// order, so output does not depend on the thread count.
pub fn classify_groups(groups: &[LineageGroup]) -> Result<Vec<GroupFrequencies>> {
    groups
        .par_iter()
        .map(|group| -> Result<GroupFrequencies> {
            let records = frequency_records(&group.lineage_name, group.counter())?;
            Ok(GroupFrequencies {
                lineage_name: group.lineage_name.clone(),
                sketch_name: group.sketch_name(),
                records,
            })
        })
        .collect()
}

/// Per-compartment hash counts of a classified table, in code order.
pub fn compartment_sizes(classified: &[(HashValue, Compartment)]) -> [usize; 5] {
    let mut sizes = [0usize; 5];
    for &(_, c) in classified {
        sizes[c.index()] += 1;
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SketchParams;

    fn counter(pairs: &[(u64, u64)]) -> AbundanceCounter {
        pairs.iter().copied().collect()
    }

    #[test]
    fn frequencies_and_default_compartments() {
        let records = frequency_records("s__A", &counter(&[(3, 1), (1, 10), (2, 5)])).unwrap();
        let freqs: Vec<(u64, f64)> = records.iter().map(|r| (r.hashval, r.freq)).collect();
        assert_eq!(freqs, vec![(1, 1.0), (2, 0.5), (3, 0.1)]);
        assert!(records.iter().all(|r| r.max_abund == 10));

        let classified = classify_records(&records, &ThresholdTable::default()).unwrap();
        assert_eq!(
            classified,
            vec![
                (1, Compartment::CentralCore),
                (2, Compartment::Shell),
                (3, Compartment::Shell),
            ]
        );
        assert_eq!(compartment_sizes(&classified), [1, 0, 2, 0, 0]);
    }

    #[test]
    fn frequencies_round_to_four_digits() {
        let records = frequency_records("g", &counter(&[(1, 3), (2, 1), (3, 2)])).unwrap();
        assert_eq!(records[1].freq, 0.6667);
        assert_eq!(records[2].freq, 0.3333);
        assert_eq!(round_frequency(0.00004), 0.0);
    }

    #[test]
    fn values_just_below_a_threshold_stay_below() {
        let records = frequency_records("s__Ecoli", &counter(&[(1, 20_000), (2, 18_999), (3, 1_999)])).unwrap();
        assert_eq!(records[1].freq, 0.9499);
        assert_eq!(records[2].freq, 0.0999);

        let classified = classify_records(&records, &ThresholdTable::default()).unwrap();
        assert_eq!(
            classified,
            vec![
                (1, Compartment::CentralCore),
                (2, Compartment::ExternalCore),
                (3, Compartment::InnerCloud),
            ]
        );
    }

    #[test]
    fn ties_keep_insertion_order() {
        let records = frequency_records("g", &counter(&[(9, 2), (4, 7), (8, 2), (1, 2)])).unwrap();
        let order: Vec<u64> = records.iter().map(|r| r.hashval).collect();
        assert_eq!(order, vec![4, 9, 8, 1]);
    }

    #[test]
    fn rerunning_gives_identical_output() {
        let c = counter(&[(5, 3), (6, 3), (7, 1), (8, 9)]);
        assert_eq!(frequency_records("g", &c).unwrap(), frequency_records("g", &c).unwrap());
    }

    #[test]
    fn empty_group_is_fatal() {
        let err = frequency_records("s__Empty", &AbundanceCounter::new()).unwrap_err();
        assert!(matches!(err, PangenomeError::EmptyGroup { ref lineage } if lineage == "s__Empty"));
    }

    #[test]
    fn groups_come_back_in_order() {
        let mut groups = Vec::new();
        for i in 0..20u64 {
            let mut s = Sketch::new(format!("G{}", i), SketchParams::default(), true);
            s.add_hash_with_abundance(i, i + 1);
            s.add_hash_with_abundance(100 + i, 1);
            let mut g = LineageGroup::new(format!("s__{}", i), format!("G{}", i), &s);
            g.count_abundances(&s);
            groups.push(g);
        }
        let tables = classify_groups(&groups).unwrap();
        assert_eq!(tables.len(), 20);
        for (i, t) in tables.iter().enumerate() {
            assert_eq!(t.lineage_name, format!("s__{}", i));
            assert_eq!(t.sketch_name, format!("G{} s__{}", i, i));
            assert_eq!(t.records[0].abund, (i as u64 + 1).max(1));
        }
    }

    #[test]
    fn group_without_counts_fails_classification() {
        let s = Sketch::new("G", SketchParams::default(), false);
        let g = LineageGroup::new("s__A", "G", &s);
        assert!(classify_groups(&[g]).is_err());
    }

    #[test]
    fn flat_sketch_is_all_central_core() {
        let mut s = Sketch::new("merged", SketchParams::default(), false);
        s.add_hash(1);
        s.add_hash(2);
        let records = sketch_frequency_records(&s).unwrap();
        assert!(records.iter().all(|r| r.freq == 1.0));
    }
}
