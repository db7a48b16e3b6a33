//src/resolve.rs

use crate::errors::{PangenomeError, Result};
use crate::taxdb::{Lineage, LineageLookup, Rank};

/// How many near-miss identifiers an unresolved lookup reports.
pub const MAX_SUGGESTIONS: usize = 5;

/// One way of turning a genome identifier into a taxonomy key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    /// The identifier as given.
    Exact,
    /// Identifier with its `.N` version suffix removed.
    StrippedVersion,
    /// Unversioned identifier with `.N` appended.
    AppendedVersion(u8),
}

/// Outcome of resolving one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Found {
        key: String,
        strategy: LookupStrategy,
        lineage: &'a Lineage,
    },
    NotFound {
        suggestions: Vec<String>,
    },
}

/// Genome identifier of a sketch: the first space-separated token of its name.
pub fn ident_from_name(name: &str) -> &str {
    name.split(' ').next().unwrap_or("")
}

/// Candidate keys for `ident`, in the order they must be tried.
pub fn candidate_keys(ident: &str) -> Vec<(LookupStrategy, String)> {
    let mut keys = vec![(LookupStrategy::Exact, ident.to_string())];

    let bare = match ident.split_once('.') {
        Some((bare, _)) => {
            keys.push((LookupStrategy::StrippedVersion, bare.to_string()));
            bare
        }
        None => ident,
    };

    for version in 1..=9u8 {
        let key = format!("{}.{}", bare, version);
        if key != ident {
            keys.push((LookupStrategy::AppendedVersion(version), key));
        }
    }
    keys
}

/// Tries every strategy in order and stops at the first hit.
pub fn resolve<'a, L: LineageLookup>(db: &'a L, ident: &str) -> Resolution<'a> {
    for (strategy, key) in candidate_keys(ident) {
        if let Some(lineage) = db.lineage(&key) {
            return Resolution::Found {
                key,
                strategy,
                lineage,
            };
        }
    }
    Resolution::NotFound {
        suggestions: db.suggest(ident, MAX_SUGGESTIONS),
    }
}

/// Resolves `ident` and reduces its lineage to the name at `rank`.
///
/// An identifier that no strategy finds, or whose lineage stops short of
/// `rank`, is an error.
pub fn resolve_lineage_name<L: LineageLookup>(db: &L, ident: &str, rank: Rank) -> Result<String> {
    match resolve(db, ident) {
        Resolution::Found {
            key,
            strategy,
            lineage,
        } => {
            if strategy != LookupStrategy::Exact {
                log::debug!("resolved '{}' as '{}' ({:?})", ident, key, strategy);
            }
            lineage
                .name_at(rank)
                .map(str::to_string)
                .ok_or_else(|| PangenomeError::MissingRank {
                    ident: ident.to_string(),
                    rank: rank.to_string(),
                })
        }
        Resolution::NotFound { suggestions } => {
            log::error!(
                "no lineage for '{}'; closest identifiers: {:?}",
                ident,
                suggestions
            );
            Err(PangenomeError::UnresolvedLineage {
                ident: ident.to_string(),
                suggestions,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::TaxonomyDb;

    fn lineage(species: &str) -> Lineage {
        Lineage::new(vec![
            (Rank::Superkingdom, "d__Bacteria".to_string()),
            (Rank::Genus, "g__G".to_string()),
            (Rank::Species, species.to_string()),
        ])
    }

    fn db() -> TaxonomyDb {
        let mut db = TaxonomyDb::new();
        db.insert("GCA_1.1", lineage("s__exact")).unwrap();
        db.insert("GCA_2", lineage("s__bare")).unwrap();
        db.insert("GCA_3.4", lineage("s__appended")).unwrap();
        db.insert("GCA_4", Lineage::new(vec![(Rank::Genus, "g__only".to_string())]))
            .unwrap();
        db
    }

    #[test]
    fn ident_is_first_token() {
        assert_eq!(ident_from_name("GCA_1.1 Escherichia coli K-12"), "GCA_1.1");
        assert_eq!(ident_from_name("GCA_1.1"), "GCA_1.1");
        assert_eq!(ident_from_name(""), "");
    }

    #[test]
    fn candidate_order_is_exact_stripped_appended() {
        let keys = candidate_keys("GCA_9.2");
        assert_eq!(keys[0], (LookupStrategy::Exact, "GCA_9.2".to_string()));
        assert_eq!(keys[1], (LookupStrategy::StrippedVersion, "GCA_9".to_string()));
        assert_eq!(keys[2], (LookupStrategy::AppendedVersion(1), "GCA_9.1".to_string()));
        // GCA_9.2 is the exact key and is not retried.
        assert_eq!(keys[3], (LookupStrategy::AppendedVersion(3), "GCA_9.3".to_string()));
        assert_eq!(keys.len(), 10);

        let unversioned = candidate_keys("GCA_9");
        assert_eq!(unversioned.len(), 10);
        assert_eq!(unversioned[9].1, "GCA_9.9");
    }

    #[test]
    fn resolves_through_each_strategy() {
        let db = db();
        let cases = [
            ("GCA_1.1", LookupStrategy::Exact, "s__exact"),
            ("GCA_2.7", LookupStrategy::StrippedVersion, "s__bare"),
            ("GCA_3", LookupStrategy::AppendedVersion(4), "s__appended"),
            ("GCA_3.1", LookupStrategy::AppendedVersion(4), "s__appended"),
        ];
        for (ident, expected_strategy, species) in cases {
            match resolve(&db, ident) {
                Resolution::Found {
                    strategy, lineage, ..
                } => {
                    assert_eq!(strategy, expected_strategy, "{}", ident);
                    assert_eq!(lineage.name_at(Rank::Species), Some(species));
                }
                Resolution::NotFound { .. } => panic!("{} not resolved", ident),
            }
        }
    }

    #[test]
    fn unresolved_identifier_is_fatal_with_suggestions() {
        let err = resolve_lineage_name(&db(), "GCA_5.1", Rank::Species).unwrap_err();
        match err {
            PangenomeError::UnresolvedLineage { ident, suggestions } => {
                assert_eq!(ident, "GCA_5.1");
                assert!(!suggestions.is_empty());
                assert!(suggestions.len() <= MAX_SUGGESTIONS);
                assert!(suggestions.contains(&"GCA_1.1".to_string()));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_rank_is_fatal() {
        let err = resolve_lineage_name(&db(), "GCA_4", Rank::Species).unwrap_err();
        assert!(matches!(err, PangenomeError::MissingRank { .. }));
        assert_eq!(
            resolve_lineage_name(&db(), "GCA_4", Rank::Genus).unwrap(),
            "g__only"
        );
    }
}
