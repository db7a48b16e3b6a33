pub mod classify_groups;
pub mod classify_query;
pub mod classify_stats;

use super::aggregate::{AbundanceCounter, LineageGroup};
use super::compartment::{Compartment, ThresholdTable};
use super::ranktable::ClassificationTable;
