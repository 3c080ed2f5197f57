/**
Weight tables map every error category to its contribution to the true positive, false positive and
false negative totals used by the scores. They can be written as formulas:

```text
TP = 1*TP, FP = 1*FP, FN = 1*FN, LE = 0.5*FP + 0.5*FN, BE = 0.5TP + 0.5FP, LBE = 1 FN
```
*/
use crate::datastructure::{ErrorCategory, ErrorCounts};
use enum_iterator::{all, Sequence};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

const N_CATEGORIES: usize = <ErrorCategory as Sequence>::CARDINALITY;

static CATEGORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\w+)\s*=").expect("CATEGORY regex is invalid"));
static TP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d*\.?\d+)\s*\*?\s*TP").expect("TP regex is invalid"));
static FP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d*\.?\d+)\s*\*?\s*FP").expect("FP regex is invalid"));
static FN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d*\.?\d+)\s*\*?\s*FN").expect("FN regex is invalid"));

/// Contribution of one occurrence of a category to the weighted TP, FP and FN totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    #[serde(rename = "TP")]
    pub tp: f64,
    #[serde(rename = "FP")]
    pub fp: f64,
    #[serde(rename = "FN")]
    pub fn_: f64,
}

impl Weight {
    pub const fn new(tp: f64, fp: f64, fn_: f64) -> Self {
        Weight { tp, fp, fn_ }
    }
}

impl From<(f64, f64, f64)> for Weight {
    fn from(value: (f64, f64, f64)) -> Self {
        Weight::new(value.0, value.1, value.2)
    }
}

const HALF_FP_HALF_FN: Weight = Weight::new(0.0, 0.5, 0.5);

fn identity(category: ErrorCategory) -> Option<Weight> {
    match category {
        ErrorCategory::TP => Some(Weight::new(1.0, 0.0, 0.0)),
        ErrorCategory::FP => Some(Weight::new(0.0, 1.0, 0.0)),
        ErrorCategory::FN => Some(Weight::new(0.0, 0.0, 1.0)),
        _ => None,
    }
}

/// Errors of a single weight formula clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightFormulaError {
    /// The clause does not start with `CATEGORY =`
    MissingCategory(String),
    /// The category before `=` is not part of the error taxonomy
    UnknownCategory(String),
}

impl Display for WeightFormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCategory(clause) => {
                write!(f, "No error type found in weight formula '{}'", clause)
            }
            Self::UnknownCategory(name) => {
                write!(f, "Unknown error type '{}' in weight formula", name)
            }
        }
    }
}

impl Error for WeightFormulaError {}

/// Weight per error category. Categories that are not listed weigh nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTable {
    weights: [Option<Weight>; N_CATEGORIES],
}

impl Default for WeightTable {
    /// The fair table.
    fn default() -> Self {
        Self::fair()
    }
}

impl WeightTable {
    /// A table listing no category at all.
    pub fn empty() -> Self {
        WeightTable {
            weights: [None; N_CATEGORIES],
        }
    }

    /// `TP`, `FP` and `FN` count once for themselves.
    pub fn traditional() -> Self {
        let mut table = Self::empty();
        for category in all::<ErrorCategory>() {
            table.weights[category as usize] = identity(category);
        }
        table
    }

    /// Traditional weights, plus `LE`, `BE` and `LBE` counting half a false positive and half a
    /// false negative.
    pub fn fair() -> Self {
        Self::traditional()
            .with(ErrorCategory::LE, HALF_FP_HALF_FN)
            .with(ErrorCategory::BE, HALF_FP_HALF_FN)
            .with(ErrorCategory::LBE, HALF_FP_HALF_FN)
    }

    pub fn with(mut self, category: ErrorCategory, weight: Weight) -> Self {
        self.set(category, weight);
        self
    }

    pub fn set(&mut self, category: ErrorCategory, weight: Weight) {
        self.weights[category as usize] = Some(weight);
    }

    /// Weight of the category, zero when it is not listed.
    pub fn weight(&self, category: ErrorCategory) -> Weight {
        self.weights[category as usize].unwrap_or_default()
    }

    pub fn is_listed(&self, category: ErrorCategory) -> bool {
        self.weights[category as usize].is_some()
    }

    /// Listed categories with their weights, in report order.
    pub fn listed(&self) -> impl Iterator<Item = (ErrorCategory, Weight)> + '_ {
        all::<ErrorCategory>().filter_map(|c| self.weights[c as usize].map(|w| (c, w)))
    }

    /// Weighted `(TP, FP, FN)` totals of the counts.
    pub fn weighted_sums(&self, counts: &ErrorCounts) -> (f64, f64, f64) {
        self.listed()
            .fold((0.0, 0.0, 0.0), |(tp, fp, fn_), (category, weight)| {
                let n = counts.get(category) as f64;
                (tp + weight.tp * n, fp + weight.fp * n, fn_ + weight.fn_ * n)
            })
    }

    /// Parses comma separated weight formulas. Invalid clauses are skipped with a warning. If no
    /// clause is valid the fair table is returned; otherwise unlisted `TP`, `FP` and `FN` get their
    /// identity weights. `default` gives the fair table.
    pub fn from_formulas(formulas: &str) -> Self {
        if formulas.trim() == "default" {
            return Self::fair();
        }
        let mut table = Self::empty();
        let mut valid = false;
        for clause in formulas.split(',') {
            match parse_clause(clause) {
                Ok((category, weight)) => {
                    table.set(category, weight);
                    valid = true;
                }
                Err(e) => warn!("{}, skipping it", e),
            }
        }
        if !valid {
            warn!("No valid weights found in '{}', using default weights", formulas);
            return Self::fair();
        }
        for category in [ErrorCategory::TP, ErrorCategory::FP, ErrorCategory::FN] {
            if let (None, Some(weight)) = (table.weights[category as usize], identity(category)) {
                table.set(category, weight);
            }
        }
        table
    }
}

impl FromStr for WeightTable {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_formulas(s))
    }
}

/// Formats the table back into formulas.
impl Display for WeightTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clauses: Vec<String> = self
            .listed()
            .map(|(c, w)| format!("{} = {}*TP + {}*FP + {}*FN", c, w.tp, w.fp, w.fn_))
            .collect();
        write!(f, "{}", clauses.join(", "))
    }
}

/// Parses a single `CATEGORY = w1*SRC1 + w2*SRC2` clause. A missing source weighs 0.
pub fn parse_clause(clause: &str) -> Result<(ErrorCategory, Weight), WeightFormulaError> {
    let name = CATEGORY_RE
        .captures(clause)
        .and_then(|c| c.get(1))
        .ok_or_else(|| WeightFormulaError::MissingCategory(String::from(clause.trim())))?
        .as_str();
    let category: ErrorCategory = name
        .parse()
        .map_err(|_| WeightFormulaError::UnknownCategory(String::from(name)))?;
    let weight_of = |re: &Regex, source: &str| -> f64 {
        let found = re
            .captures(clause)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());
        match found {
            Some(w) => w,
            None => {
                warn!(
                    "Missing weight for {} for error type {}, set to 0",
                    source, category
                );
                0.0
            }
        }
    };
    let weight = Weight::new(
        weight_of(&TP_RE, "TP"),
        weight_of(&FP_RE, "FP"),
        weight_of(&FN_RE, "FN"),
    );
    Ok((category, weight))
}
