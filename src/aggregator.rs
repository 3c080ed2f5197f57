/**
Accumulation of sentence results over a corpus. Spans are filtered by label before matching; the
results of each sentence are then summed per label and overall. Aggregators merge by addition, so a
corpus can be split over threads and reduced in any order.
*/
use crate::datastructure::Evaluation;
use crate::matcher::{compare_spans_with, Focus, MatchStrategy};
use crate::span::{SentencePair, Span};
use crate::stats::{annotation_stats, LabelStats};
use ahash::AHashSet;
use rayon::prelude::*;
use std::ops::AddAssign;
use tracing::debug;

/// Allow-list and deny-list of labels. Spans with a label that is not allowed are removed from
/// both sides before matching, so they produce no count at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    labels: Option<AHashSet<String>>,
    exclude: AHashSet<String>,
}

impl LabelFilter {
    /// A filter letting every label through.
    pub fn all() -> Self {
        Self::default()
    }

    /// * `labels`: Allow-list. `None` allows every label.
    /// * `exclude`: Deny-list. It wins over the allow-list.
    pub fn new<I, J, S, T>(labels: Option<I>, exclude: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        LabelFilter {
            labels: labels.map(|l| l.into_iter().map(Into::into).collect()),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, label: &str) -> bool {
        !self.exclude.contains(label)
            && self.labels.as_ref().map_or(true, |l| l.contains(label))
    }

    /// Keeps the allowed spans, in their original order.
    pub fn filter(&self, spans: &[Span]) -> Vec<Span> {
        spans
            .iter()
            .filter(|s| self.allows(s.label()))
            .cloned()
            .collect()
    }

    /// Sorted allow-list, if any.
    pub fn labels(&self) -> Option<Vec<&str>> {
        self.labels.as_ref().map(|l| {
            let mut labels: Vec<&str> = l.iter().map(|s| s.as_str()).collect();
            labels.sort_unstable();
            labels
        })
    }

    /// Sorted deny-list.
    pub fn excluded(&self) -> Vec<&str> {
        let mut excluded: Vec<&str> = self.exclude.iter().map(|s| s.as_str()).collect();
        excluded.sort_unstable();
        excluded
    }
}

/// Everything influencing how a single sentence is compared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSettings {
    pub focus: Focus,
    pub strategy: MatchStrategy,
    pub filter: LabelFilter,
}

/// Running totals of a corpus evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregator {
    evaluation: Evaluation,
    target_stats: LabelStats,
    sentences: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters, compares and accumulates one sentence.
    pub fn add_sentence(&mut self, pair: &SentencePair, settings: &MatchSettings) {
        self.add_spans(&pair.target, &pair.system, settings)
    }

    pub fn add_spans(&mut self, target: &[Span], system: &[Span], settings: &MatchSettings) {
        let target = settings.filter.filter(target);
        let system = settings.filter.filter(system);
        let result = compare_spans_with(&target, &system, settings.focus, settings.strategy);
        self.evaluation += result.evaluation();
        self.target_stats += &annotation_stats(&target);
        self.sentences += 1;
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    /// Label frequencies of the target spans that passed the filter.
    pub fn target_stats(&self) -> &LabelStats {
        &self.target_stats
    }

    /// Number of sentences accumulated.
    pub fn sentences(&self) -> usize {
        self.sentences
    }

    /// Consumes both aggregators and returns their sum.
    pub fn merge(mut self, other: Aggregator) -> Aggregator {
        self += &other;
        self
    }

    pub fn into_parts(self) -> (Evaluation, LabelStats) {
        (self.evaluation, self.target_stats)
    }
}

impl AddAssign<&Aggregator> for Aggregator {
    fn add_assign(&mut self, rhs: &Aggregator) {
        self.evaluation += &rhs.evaluation;
        self.target_stats += &rhs.target_stats;
        self.sentences += rhs.sentences;
    }
}

/// Evaluates every sentence of the corpus. With `parallel`, sentences are distributed over the
/// rayon thread pool and the partial aggregators are reduced; the result is the same either way.
pub fn evaluate_corpus(
    pairs: &[SentencePair],
    settings: &MatchSettings,
    parallel: bool,
) -> Aggregator {
    debug!(
        "Evaluating {} sentences ({})",
        pairs.len(),
        if parallel { "parallel" } else { "sequential" }
    );
    if parallel {
        pairs
            .par_iter()
            .fold(Aggregator::new, |mut acc, pair| {
                acc.add_sentence(pair, settings);
                acc
            })
            .reduce(Aggregator::new, Aggregator::merge)
    } else {
        pairs.iter().fold(Aggregator::new(), |mut acc, pair| {
            acc.add_sentence(pair, settings);
            acc
        })
    }
}
