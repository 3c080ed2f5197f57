/**
Scoring engine. Precision, recall and F1 are computed from bucket counts through a weight table:

* `traditional`: only `TP`, `FP` and `FN` count;
* `fair`: labeling, boundary and labeling-boundary errors count as half a false positive and half a
  false negative;
* `weighted`: any [WeightTable].

A division by zero always yields `0`.
*/
use crate::datastructure::{CountTable, ErrorCounts};
use crate::weights::WeightTable;
use enum_iterator::Sequence;
use itertools::multizip;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Evaluation versions, in report order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Sequence,
)]
#[serde(rename_all = "lowercase")]
pub enum EvalVersion {
    Traditional,
    Fair,
    Weighted,
}

impl EvalVersion {
    /// Capitalized name, as used in report titles.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Traditional => "Traditional",
            Self::Fair => "Fair",
            Self::Weighted => "Weighted",
        }
    }

    /// Weight table effectively used by this version. A weighted evaluation without any listed
    /// category falls back to the fair table.
    pub fn weights(&self, weights: &WeightTable) -> WeightTable {
        match self {
            Self::Traditional => WeightTable::traditional(),
            Self::Fair => WeightTable::fair(),
            Self::Weighted if weights.listed().next().is_none() => WeightTable::fair(),
            Self::Weighted => *weights,
        }
    }
}

impl Display for EvalVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Traditional => write!(f, "traditional"),
            Self::Fair => write!(f, "fair"),
            Self::Weighted => write!(f, "weighted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingEvalVersionError(pub String);

impl Display for ParsingEvalVersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unknown evaluation method '{}'. Expected 'traditional', 'fair' or 'weighted'",
            self.0
        )
    }
}

impl Error for ParsingEvalVersionError {}

impl FromStr for EvalVersion {
    type Err = ParsingEvalVersionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "traditional" => Ok(Self::Traditional),
            "fair" => Ok(Self::Fair),
            "weighted" => Ok(Self::Weighted),
            _ => Err(ParsingEvalVersionError(String::from(s))),
        }
    }
}

fn divide_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Weighted precision of the counts, in `[0, 1]`.
pub fn precision(counts: &ErrorCounts, version: EvalVersion, weights: &WeightTable) -> f64 {
    let (tp, fp, _) = version.weights(weights).weighted_sums(counts);
    divide_or_zero(tp, tp + fp)
}

/// Weighted recall of the counts, in `[0, 1]`.
pub fn recall(counts: &ErrorCounts, version: EvalVersion, weights: &WeightTable) -> f64 {
    let (tp, _, fn_) = version.weights(weights).weighted_sums(counts);
    divide_or_zero(tp, tp + fn_)
}

/// Harmonic mean of precision and recall.
pub fn fscore(precision: f64, recall: f64) -> f64 {
    divide_or_zero(2.0 * precision * recall, precision + recall)
}

/// Precision, recall and F1 of a row of counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(rename = "Prec")]
    pub precision: f64,
    #[serde(rename = "Rec")]
    pub recall: f64,
    #[serde(rename = "F1")]
    pub fscore: f64,
}

impl Scores {
    pub fn new(counts: &ErrorCounts, version: EvalVersion, weights: &WeightTable) -> Self {
        let precision = precision(counts, version, weights);
        let recall = recall(counts, version, weights);
        Scores {
            precision,
            recall,
            fscore: fscore(precision, recall),
        }
    }
}

/// Scores of a whole count table: one row per label, plus the overall row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableScores {
    pub per_label: BTreeMap<String, Scores>,
    pub overall: Scores,
}

/// Scores every label of the table in a single vectorised pass.
pub fn score_table(
    table: &CountTable,
    version: EvalVersion,
    weights: &WeightTable,
    parallel: bool,
) -> TableScores {
    let weights = version.weights(weights);
    let rows = table.per_label();
    let n = rows.len();
    let mut tp = Array1::<f64>::zeros(n);
    let mut fp = Array1::<f64>::zeros(n);
    let mut fn_ = Array1::<f64>::zeros(n);
    for (i, counts) in rows.values().enumerate() {
        let (w_tp, w_fp, w_fn) = weights.weighted_sums(counts);
        tp[i] = w_tp;
        fp[i] = w_fp;
        fn_[i] = w_fn;
    }
    let divide: fn(Array1<f64>, Array1<f64>) -> (Array1<f64>, Found0InDenominator) = if parallel {
        par_prf_divide_results_and_mask
    } else {
        prf_divide_results_and_mask
    };
    let (precision, zero_in_precision) = divide(tp.clone(), &tp + &fp);
    let (recall, zero_in_recall) = divide(tp.clone(), &tp + &fn_);
    let (fscore, zero_in_fscore) = divide(2.0 * &precision * &recall, &precision + &recall);
    if zero_in_precision || zero_in_recall || zero_in_fscore {
        debug!(
            "Division by zero while scoring the {} evaluation, replaced by 0",
            version
        );
    }
    let per_label = multizip((rows.keys(), precision.iter(), recall.iter(), fscore.iter()))
        .map(|(label, precision, recall, fscore)| {
            (
                String::from(*label),
                Scores {
                    precision: *precision,
                    recall: *recall,
                    fscore: *fscore,
                },
            )
        })
        .collect();
    TableScores {
        per_label,
        overall: Scores::new(table.overall(), version, &weights),
    }
}

type Found0InDenominator = bool;

/// Divides element-wise. Where the denominator is zero the result is zero; the second return value
/// tells whether that happened. The numerator must be zero wherever the denominator is.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: denominator of the division
fn prf_divide_results_and_mask<D: Dimension>(
    numerator: Array<f64, D>,
    mut denominator: Array<f64, D>,
) -> (Array<f64, D>, Found0InDenominator) {
    let mut found_zero_in_denom: Found0InDenominator = false;
    denominator.mapv_inplace(|v| {
        if v == 0.0 {
            found_zero_in_denom = true;
            1.0
        } else {
            v
        }
    });
    (numerator / denominator, found_zero_in_denom)
}

/// Parallel version of `prf_divide_results_and_mask`.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: denominator of the division
fn par_prf_divide_results_and_mask<D: Dimension>(
    numerator: Array<f64, D>,
    mut denominator: Array<f64, D>,
) -> (Array<f64, D>, Found0InDenominator) {
    let found_zero_in_denom = AtomicBool::new(false);
    denominator.par_mapv_inplace(|v| {
        if v == 0.0 {
            found_zero_in_denom.store(true, Ordering::Relaxed);
            1.0
        } else {
            v
        }
    });
    (numerator / denominator, found_zero_in_denom.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructure::{ErrorCategory, Outcome};
    use crate::overlap::BoundaryType;
    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    const EPSILON: f64 = 1e-9;

    fn scenario_counts() -> ErrorCounts {
        ErrorCounts::from([
            (ErrorCategory::TP, 8),
            (ErrorCategory::FP, 2),
            (ErrorCategory::FN, 2),
            (ErrorCategory::LE, 1),
            (ErrorCategory::BEL, 1),
            (ErrorCategory::LBE, 1),
        ])
    }

    #[rstest]
    #[case(EvalVersion::Traditional, 0.8, 0.8, 0.8)]
    #[case(EvalVersion::Fair, 8.0 / 11.5, 8.0 / 11.5, 0.6956521739)]
    #[case(EvalVersion::Weighted, 8.0 / 11.5, 8.0 / 11.5, 0.6956521739)]
    fn test_scores(
        #[case] version: EvalVersion,
        #[case] prec: f64,
        #[case] rec: f64,
        #[case] f1: f64,
    ) {
        let scores = Scores::new(&scenario_counts(), version, &WeightTable::fair());
        assert!((scores.precision - prec).abs() < EPSILON);
        assert!((scores.recall - rec).abs() < EPSILON);
        assert!((scores.fscore - f1).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_custom_table() {
        // boundary errors count as half a true positive
        let weights = WeightTable::from_formulas("BE = 0.5*TP + 0.5*FP");
        let counts = scenario_counts();
        let p = precision(&counts, EvalVersion::Weighted, &weights);
        let r = recall(&counts, EvalVersion::Weighted, &weights);
        assert!((p - 8.5 / 11.0).abs() < EPSILON);
        assert!((r - 8.5 / 10.5).abs() < EPSILON);
    }

    #[test]
    fn test_weighted_without_weights_is_fair() {
        let counts = scenario_counts();
        assert_eq!(
            Scores::new(&counts, EvalVersion::Weighted, &WeightTable::empty()),
            Scores::new(&counts, EvalVersion::Fair, &WeightTable::empty())
        );
    }

    #[test]
    fn test_zero_division() {
        let empty = ErrorCounts::default();
        for version in enum_iterator::all::<EvalVersion>() {
            assert_eq!(
                Scores::new(&empty, version, &WeightTable::fair()),
                Scores::default()
            );
        }
        assert_eq!(fscore(0.0, 0.0), 0.0);
    }

    #[rstest]
    #[case("traditional", Ok(EvalVersion::Traditional))]
    #[case(" Fair", Ok(EvalVersion::Fair))]
    #[case("WEIGHTED", Ok(EvalVersion::Weighted))]
    #[case("strict", Err(ParsingEvalVersionError(String::from("strict"))))]
    fn test_version_from_str(
        #[case] input: &str,
        #[case] expected: Result<EvalVersion, ParsingEvalVersionError>,
    ) {
        assert_eq!(input.parse::<EvalVersion>(), expected)
    }

    #[test]
    fn test_prf_divide_results_and_mask() {
        let numerator = array![1.0, 0.0, 3.0];
        let denominator = array![2.0, 0.0, 4.0];
        let (result, found) = prf_divide_results_and_mask(numerator.clone(), denominator.clone());
        assert_eq!(result, array![0.5, 0.0, 0.75]);
        assert!(found);
        let (par_result, par_found) = par_prf_divide_results_and_mask(numerator, denominator);
        assert_eq!(par_result, result);
        assert!(par_found);
        let (_, found) = prf_divide_results_and_mask(array![1.0], array![2.0]);
        assert!(!found);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_score_table_matches_scalar(#[case] parallel: bool) {
        let mut table = CountTable::default();
        table.record("PER", Outcome::TP);
        table.record("PER", Outcome::LE);
        table.record("LOC", Outcome::BE(BoundaryType::BES));
        table.record("LOC", Outcome::FN);
        table.register("ORG");
        for version in enum_iterator::all::<EvalVersion>() {
            let scores = score_table(&table, version, &WeightTable::fair(), parallel);
            assert_eq!(
                scores.per_label.keys().collect::<Vec<_>>(),
                vec!["LOC", "ORG", "PER"]
            );
            for (label, row) in scores.per_label.iter() {
                let expected = Scores::new(&table.label(label), version, &WeightTable::fair());
                assert!((row.precision - expected.precision).abs() < EPSILON);
                assert!((row.recall - expected.recall).abs() < EPSILON);
                assert!((row.fscore - expected.fscore).abs() < EPSILON);
            }
            assert_eq!(scores.per_label["ORG"], Scores::default());
            assert_eq!(
                scores.overall,
                Scores::new(table.overall(), version, &WeightTable::fair())
            );
        }
    }

    #[test]
    fn test_propertie_bounded_scores() {
        fn bounded(raw: (u16, u16, u16, u16, u16, u16), version: u8) -> TestResult {
            let counts = ErrorCounts::from([
                (ErrorCategory::TP, raw.0 as usize),
                (ErrorCategory::FP, raw.1 as usize),
                (ErrorCategory::FN, raw.2 as usize),
                (ErrorCategory::LE, raw.3 as usize),
                (ErrorCategory::BEO, raw.4 as usize),
                (ErrorCategory::LBE, raw.5 as usize),
            ]);
            let version = match version % 3 {
                0 => EvalVersion::Traditional,
                1 => EvalVersion::Fair,
                _ => EvalVersion::Weighted,
            };
            let weights = WeightTable::from_formulas("BE = 0.5*TP + 0.5*FN, LE = 1*FP");
            let scores = Scores::new(&counts, version, &weights);
            let in_range = |v: f64| (0.0..=1.0).contains(&v);
            TestResult::from_bool(
                in_range(scores.precision) && in_range(scores.recall) && in_range(scores.fscore),
            )
        }
        QuickCheck::new()
            .tests(2000)
            .quickcheck(bounded as fn((u16, u16, u16, u16, u16, u16), u8) -> TestResult)
    }
}
