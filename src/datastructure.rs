/**
Containers for the outcome of a comparison: the error categories, the bucket counts (overall and
per label), and the confusion matrix. Every container can be merged with another one by addition,
with missing keys counting as zero, which makes partial results of different sentences, files or
threads safe to combine in any order.
*/
use crate::metrics::EvalVersion;
use crate::overlap::BoundaryType;
use ahash::AHashMap;
use enum_iterator::Sequence;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::Display;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Label used in the confusion matrix for a missing counterpart: `conf[label]["_"]` counts false
/// negatives, `conf["_"][label]` false positives.
pub const EMPTY_LABEL: &str = "_";

/// The error taxonomy. `BE` is the sum of `BES`, `BEL` and `BEO` and is never stored on its own.
/// The variants are declared in report order.
#[allow(clippy::upper_case_acronyms)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Sequence,
)]
pub enum ErrorCategory {
    /// Identical span, identical label
    TP,
    /// System span without counterpart
    FP,
    /// Labeling error: identical span, different label
    LE,
    /// Boundary error of any kind
    BE,
    /// Boundary error, system span smaller
    BES,
    /// Boundary error, system span larger
    BEL,
    /// Boundary error, shifted boundaries
    BEO,
    /// Labeling-boundary error: overlapping spans, different label
    LBE,
    /// Target span without counterpart
    FN,
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategoryError(pub String);

impl Display for UnknownCategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' is not a known error category", self.0)
    }
}

impl Error for UnknownCategoryError {}

impl FromStr for ErrorCategory {
    type Err = UnknownCategoryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TP" => Ok(Self::TP),
            "FP" => Ok(Self::FP),
            "FN" => Ok(Self::FN),
            "LE" => Ok(Self::LE),
            "BE" => Ok(Self::BE),
            "BES" => Ok(Self::BES),
            "BEL" => Ok(Self::BEL),
            "BEO" => Ok(Self::BEO),
            "LBE" => Ok(Self::LBE),
            _ => Err(UnknownCategoryError(String::from(s))),
        }
    }
}

/// What happened to a single span (or pair of spans) during matching.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    TP,
    LE,
    /// Same label, overlapping ranges
    BE(BoundaryType),
    /// Different label, overlapping ranges. The boundary type is kept for diagnostics only.
    LBE(BoundaryType),
    FP,
    FN,
}

impl Outcome {
    /// Does the outcome account for a target span?
    pub fn has_target(&self) -> bool {
        !matches!(self, Self::FP)
    }

    /// Does the outcome account for a system span?
    pub fn has_system(&self) -> bool {
        !matches!(self, Self::FN)
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BE(kind) => write!(f, "{}", kind),
            Self::LBE(kind) => write!(f, "LBE({})", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Bucket counts of one table row (a label, or the overall row).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCounts {
    #[serde(rename = "TP")]
    tp: usize,
    #[serde(rename = "FP")]
    fp: usize,
    #[serde(rename = "FN")]
    fn_: usize,
    #[serde(rename = "LE")]
    le: usize,
    #[serde(rename = "BES")]
    bes: usize,
    #[serde(rename = "BEL")]
    bel: usize,
    #[serde(rename = "BEO")]
    beo: usize,
    #[serde(rename = "LBE")]
    lbe: usize,
}

impl ErrorCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of a category. `BE` is computed from its three sub-types.
    pub fn get(&self, category: ErrorCategory) -> usize {
        match category {
            ErrorCategory::TP => self.tp,
            ErrorCategory::FP => self.fp,
            ErrorCategory::FN => self.fn_,
            ErrorCategory::LE => self.le,
            ErrorCategory::BE => self.bes + self.bel + self.beo,
            ErrorCategory::BES => self.bes,
            ErrorCategory::BEL => self.bel,
            ErrorCategory::BEO => self.beo,
            ErrorCategory::LBE => self.lbe,
        }
    }

    /// Adds one occurrence of the outcome.
    pub fn record(&mut self, outcome: Outcome) {
        let slot = match outcome {
            Outcome::TP => &mut self.tp,
            Outcome::FP => &mut self.fp,
            Outcome::FN => &mut self.fn_,
            Outcome::LE => &mut self.le,
            Outcome::BE(BoundaryType::BES) => &mut self.bes,
            Outcome::BE(BoundaryType::BEL) => &mut self.bel,
            Outcome::BE(BoundaryType::BEO) => &mut self.beo,
            Outcome::LBE(_) => &mut self.lbe,
        };
        *slot += 1;
    }

    /// Number of target spans accounted for by these counts.
    pub fn target_total(&self) -> usize {
        self.tp + self.le + self.bes + self.bel + self.beo + self.lbe + self.fn_
    }

    /// Number of system spans accounted for by these counts.
    pub fn system_total(&self) -> usize {
        self.tp + self.le + self.bes + self.bel + self.beo + self.lbe + self.fp
    }
}

impl<const N: usize> From<[(ErrorCategory, usize); N]> for ErrorCounts {
    /// Builds counts from `(category, count)` pairs. `BE` cannot be stored and is ignored.
    fn from(value: [(ErrorCategory, usize); N]) -> Self {
        let mut counts = ErrorCounts::default();
        for (category, count) in value {
            let slot = match category {
                ErrorCategory::TP => &mut counts.tp,
                ErrorCategory::FP => &mut counts.fp,
                ErrorCategory::FN => &mut counts.fn_,
                ErrorCategory::LE => &mut counts.le,
                ErrorCategory::BES => &mut counts.bes,
                ErrorCategory::BEL => &mut counts.bel,
                ErrorCategory::BEO => &mut counts.beo,
                ErrorCategory::LBE => &mut counts.lbe,
                ErrorCategory::BE => continue,
            };
            *slot += count;
        }
        counts
    }
}

impl AddAssign<&ErrorCounts> for ErrorCounts {
    fn add_assign(&mut self, rhs: &ErrorCounts) {
        self.tp += rhs.tp;
        self.fp += rhs.fp;
        self.fn_ += rhs.fn_;
        self.le += rhs.le;
        self.bes += rhs.bes;
        self.bel += rhs.bel;
        self.beo += rhs.beo;
        self.lbe += rhs.lbe;
    }
}

impl Add for ErrorCounts {
    type Output = ErrorCounts;
    fn add(mut self, rhs: Self) -> Self::Output {
        self += &rhs;
        self
    }
}

/// Overall and per-label counts of one evaluation version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTable {
    overall: ErrorCounts,
    per_label: AHashMap<String, ErrorCounts>,
}

impl CountTable {
    /// Makes sure the label has a row, even if nothing is ever recorded for it.
    pub fn register(&mut self, label: &str) {
        if !self.per_label.contains_key(label) {
            self.per_label.insert(String::from(label), ErrorCounts::default());
        }
    }

    /// Records the outcome in the overall row and in the row of `label`.
    pub fn record(&mut self, label: &str, outcome: Outcome) {
        self.overall.record(outcome);
        match self.per_label.get_mut(label) {
            Some(counts) => counts.record(outcome),
            None => {
                let mut counts = ErrorCounts::default();
                counts.record(outcome);
                self.per_label.insert(String::from(label), counts);
            }
        }
    }

    pub fn overall(&self) -> &ErrorCounts {
        &self.overall
    }

    /// Counts of a label. A label that never occurred has all-zero counts.
    pub fn label(&self, label: &str) -> ErrorCounts {
        self.per_label.get(label).copied().unwrap_or_default()
    }

    /// Rows sorted by label.
    pub fn per_label(&self) -> BTreeMap<&str, &ErrorCounts> {
        self.per_label
            .iter()
            .map(|(label, counts)| (label.as_str(), counts))
            .collect()
    }

    pub fn labels(&self) -> BTreeSet<&str> {
        self.per_label.keys().map(|l| l.as_str()).collect()
    }
}

impl AddAssign<&CountTable> for CountTable {
    fn add_assign(&mut self, rhs: &CountTable) {
        self.overall += &rhs.overall;
        for (label, counts) in rhs.per_label.iter() {
            match self.per_label.get_mut(label) {
                Some(own) => *own += counts,
                None => {
                    self.per_label.insert(label.clone(), *counts);
                }
            }
        }
    }
}

/// Target label × system label grid of error counts. Only errors are stored: exact matches never
/// enter the matrix, the diagonal holds boundary errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    rows: AHashMap<String, AHashMap<String, usize>>,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure the label appears in the matrix, even with no error.
    pub fn register(&mut self, label: &str) {
        if !self.rows.contains_key(label) {
            self.rows.insert(String::from(label), AHashMap::default());
        }
    }

    pub fn increment(&mut self, target_label: &str, system_label: &str) {
        self.register(target_label);
        let row = match self.rows.get_mut(target_label) {
            Some(row) => row,
            None => return,
        };
        match row.get_mut(system_label) {
            Some(count) => *count += 1,
            None => {
                row.insert(String::from(system_label), 1);
            }
        }
    }

    pub fn get(&self, target_label: &str, system_label: &str) -> usize {
        self.rows
            .get(target_label)
            .and_then(|row| row.get(system_label))
            .copied()
            .unwrap_or(0)
    }

    /// Every label appearing as a row or a column, plus `_`, sorted.
    pub fn labels(&self) -> BTreeSet<&str> {
        let mut labels: BTreeSet<&str> = self.rows.keys().map(|l| l.as_str()).collect();
        for row in self.rows.values() {
            labels.extend(row.keys().map(|l| l.as_str()));
        }
        labels.insert(EMPTY_LABEL);
        labels
    }

    /// Sum of all cells.
    pub fn total(&self) -> usize {
        self.rows.values().flat_map(|row| row.values()).sum()
    }
}

impl AddAssign<&ConfusionMatrix> for ConfusionMatrix {
    fn add_assign(&mut self, rhs: &ConfusionMatrix) {
        for (target_label, row) in rhs.rows.iter() {
            self.register(target_label);
            if let Some(own_row) = self.rows.get_mut(target_label) {
                for (system_label, count) in row.iter() {
                    *own_row.entry(system_label.clone()).or_insert(0) += count;
                }
            }
        }
    }
}

/// Serialized as a dense, sorted matrix over all labels.
impl Serialize for ConfusionMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let labels = self.labels();
        let mut map = serializer.serialize_map(Some(labels.len()))?;
        for target_label in labels.iter() {
            let row: BTreeMap<&str, usize> = labels
                .iter()
                .map(|system_label| (*system_label, self.get(target_label, system_label)))
                .collect();
            map.serialize_entry(target_label, &row)?;
        }
        map.end()
    }
}

/// All counts produced by comparing sentences: traditional counts, fine-grained (fair) counts and
/// the confusion matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub(crate) traditional: CountTable,
    pub(crate) fair: CountTable,
    pub(crate) confusion: ConfusionMatrix,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the counts needed by the evaluation version. The weighted version uses the
    /// fine-grained counts.
    pub fn table(&self, version: EvalVersion) -> &CountTable {
        match version {
            EvalVersion::Traditional => &self.traditional,
            EvalVersion::Fair | EvalVersion::Weighted => &self.fair,
        }
    }

    pub fn traditional(&self) -> &CountTable {
        &self.traditional
    }

    pub fn fair(&self) -> &CountTable {
        &self.fair
    }

    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    /// Makes sure the label has a row in every table and in the confusion matrix.
    pub(crate) fn register(&mut self, label: &str) {
        self.traditional.register(label);
        self.fair.register(label);
        self.confusion.register(label);
    }

    /// Consumes both evaluations and returns their sum.
    pub fn merge(mut self, other: Evaluation) -> Evaluation {
        self += &other;
        self
    }
}

impl AddAssign<&Evaluation> for Evaluation {
    fn add_assign(&mut self, rhs: &Evaluation) {
        self.traditional += &rhs.traditional;
        self.fair += &rhs.fair;
        self.confusion += &rhs.confusion;
    }
}
