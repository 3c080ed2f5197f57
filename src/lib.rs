/*!
This library evaluates span annotations, such as named entities or chunks, against a gold standard.
Besides the usual exact-match counts, it classifies every mismatch into a single error category so
that near misses are not counted twice.

# Error categories
* `TP`: same label, same tokens.
* `FP` / `FN`: a system span / target span without any overlapping counterpart.
* `LE`: labeling error, same tokens but a different label.
* `BE`: boundary error, same label and overlapping tokens. Boundary errors are further divided into
  `BES` (the system span is smaller), `BEL` (the system span is larger) and `BEO` (the spans
  overlap, neither contains the other).
* `LBE`: labeling-boundary error, different label and overlapping tokens.

# Evaluation versions
* `traditional`: only exact matches are true positives; every other span is a false positive or a
  false negative, so that a single near miss is counted twice.
* `fair`: `LE`, `BE` and `LBE` are counted once, each weighing half a false positive and half a
  false negative.
* `weighted`: every category can be given any weight through formulas such as
  `LE = 0.5*FP + 0.5*FN, BE = 0.5*TP + 0.5*FN`.

# Terminology
* The target is the gold standard, the system is the annotation being evaluated.
* A span is a label with a token range; tokens are 1-based indices within a sentence.
* The focus decides which label a labeling error is counted under: the target label (recall
  oriented) or the system label (precision oriented).
*/

mod aggregator;
mod config;
mod corpus;
mod datastructure;
mod matcher;
mod metrics;
mod overlap;
mod reader;
mod reporter;
mod span;
mod stats;
mod weights;

// The public api starts here
pub use span::{SentencePair, Span};

pub use overlap::{overlap_type, BoundaryType, OverlapType};

pub use datastructure::{
    ConfusionMatrix, CountTable, ErrorCategory, ErrorCounts, Evaluation, Outcome,
    UnknownCategoryError, EMPTY_LABEL,
};

pub use matcher::{
    compare_spans, compare_spans_with, Alignment, Focus, MatchStrategy, SentenceEvaluation,
    UnknownStrategyError,
};

pub use aggregator::{evaluate_corpus, Aggregator, LabelFilter, MatchSettings};

pub use metrics::{
    fscore, precision, recall, score_table, EvalVersion, ParsingEvalVersionError, Scores,
    TableScores,
};

pub use weights::{parse_clause, Weight, WeightFormulaError, WeightTable};

pub use stats::{annotation_stats, LabelStats};

pub use reader::{
    parse_sentence, punctuation_indices, read_sentences, remove_punctuation, spans_from_conll,
    spans_from_lines, split_sentences, InputFormat, ParsingError, PUNCTUATION_TAGS,
};

pub use config::{ConfigError, FairEvalConfig, FairEvalConfigBuilder, OutputTarget};

pub use reporter::Reporter;

pub use corpus::{
    evaluate_files, expand_input, pair_files, read_file_pair, EvaluationError,
    InconsistentLengthError,
};

/// Evaluates sentences already held in memory. Only the matching, filtering, scoring and parallel
/// settings of the configuration are used; its inputs are ignored.
///
/// * `pairs`: Target and system spans of each sentence
/// * `config`: Evaluation settings
///
/// # Example
/// ```rust
/// use faireval::{
///     evaluate_sentences, ErrorCategory, EvalVersion, FairEvalConfigBuilder, SentencePair, Span,
/// };
///
/// let pairs = vec![SentencePair::new(
///     vec![Span::new("PER", 1, 2), Span::new("ORG", 4, 4)],
///     vec![Span::new("PER", 1, 2), Span::new("LOC", 4, 5)],
/// )];
/// let config = FairEvalConfigBuilder::default().build();
/// let reporter = evaluate_sentences(&pairs, &config);
///
/// let fair = reporter.evaluation().fair().overall();
/// assert_eq!(fair.get(ErrorCategory::TP), 1);
/// assert_eq!(fair.get(ErrorCategory::LBE), 1);
/// let traditional = reporter.evaluation().traditional().overall();
/// assert_eq!(traditional.get(ErrorCategory::FP), 1);
/// assert_eq!(traditional.get(ErrorCategory::FN), 1);
///
/// let scores = reporter.scores(EvalVersion::Fair).unwrap();
/// assert!((scores.overall.fscore - 2.0 / 3.0).abs() < 1e-9);
/// ```
pub fn evaluate_sentences(pairs: &[SentencePair], config: &FairEvalConfig) -> Reporter {
    let aggregator = evaluate_corpus(pairs, &config.match_settings(), config.parallel());
    Reporter::new(
        aggregator,
        config.eval_methods(),
        config.weights(),
        config.parallel(),
    )
}
