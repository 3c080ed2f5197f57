/**
Sentence level matching of target and system spans.

The spans of both sides live in an arena indexed by their input position, with a consumed flag per
index. Four ordered phases pair them one-to-one:

1. identical token sets: same label first (`TP`), then different labels (`LE`);
2. overlapping ranges with the same label (`BES`, `BEL`, `BEO`);
3. overlapping ranges with different labels (`LBE`);
4. everything left over (`FN` for target spans, `FP` for system spans).

A consumed span is never reconsidered, so every span ends up in exactly one bucket.
*/
use crate::datastructure::{Evaluation, Outcome, EMPTY_LABEL};
use crate::overlap::{overlap_type, BoundaryType, OverlapType};
use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::convert::Infallible;
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

/// Which side's label is credited in the per-label rows for `TP`, `LE` and `LBE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    #[default]
    Target,
    System,
}

impl Display for Focus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target => write!(f, "target"),
            Self::System => write!(f, "system"),
        }
    }
}

/// `system` (in any case) gives the system focus, anything else the target focus.
impl FromStr for Focus {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("system") {
            Ok(Self::System)
        } else {
            Ok(Self::Target)
        }
    }
}

/// How a candidate is picked when a target span overlaps several available system spans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// First candidate in ascending `(begin, end, input position)` order.
    #[default]
    First,
    /// Candidate sharing the most tokens, then the fewest system-only tokens, then the shortest,
    /// then the first one.
    MaxOverlap,
}

impl Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::MaxOverlap => write!(f, "max_overlap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategyError(pub String);

impl Display for UnknownStrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unknown match strategy '{}', expected 'first' or 'max_overlap'",
            self.0
        )
    }
}

impl Error for UnknownStrategyError {}

impl FromStr for MatchStrategy {
    type Err = UnknownStrategyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(Self::First),
            "max_overlap" | "maxoverlap" => Ok(Self::MaxOverlap),
            _ => Err(UnknownStrategyError(String::from(s))),
        }
    }
}

/// One decision of the matcher. Indices refer to the input slices given to [compare_spans].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alignment {
    pub target: Option<usize>,
    pub system: Option<usize>,
    pub outcome: Outcome,
}

/// Counts and alignments of a single sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentenceEvaluation {
    evaluation: Evaluation,
    alignments: Vec<Alignment>,
}

impl SentenceEvaluation {
    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    /// Alignments in the order they were decided.
    pub fn alignments(&self) -> &[Alignment] {
        &self.alignments
    }

    pub fn into_evaluation(self) -> Evaluation {
        self.evaluation
    }
}

/// Compares the spans of one sentence with the default [MatchStrategy].
pub fn compare_spans(target: &[Span], system: &[Span], focus: Focus) -> SentenceEvaluation {
    compare_spans_with(target, system, focus, MatchStrategy::default())
}

/// Compares the spans of one sentence. Every target span and every system span is attributed to
/// exactly one category.
pub fn compare_spans_with(
    target: &[Span],
    system: &[Span],
    focus: Focus,
    strategy: MatchStrategy,
) -> SentenceEvaluation {
    let mut matcher = Matcher::new(target, system, focus);
    matcher.pair_identical(true);
    matcher.pair_identical(false);
    matcher.pair_overlapping(true, strategy);
    matcher.pair_overlapping(false, strategy);
    matcher.finish()
}

/// Boundary error type of the system span relative to the target span. Coinciding ranges are
/// refined through the token sets.
fn boundary_type(target: &Span, system: &Span) -> BoundaryType {
    match overlap_type(target.range(), system.range()) {
        OverlapType::TP => {
            if system.tokens().is_subset(target.tokens()) {
                BoundaryType::BES
            } else if system.tokens().is_superset(target.tokens()) {
                BoundaryType::BEL
            } else {
                BoundaryType::BEO
            }
        }
        other => other.boundary().unwrap_or(BoundaryType::BEO),
    }
}

/// Indices of the spans, sorted by `(begin, end, input position)`.
fn stable_order(spans: &[Span]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by_key(|&i| (spans[i].begin(), spans[i].end(), i));
    order
}

struct Matcher<'a> {
    target: &'a [Span],
    system: &'a [Span],
    target_order: Vec<usize>,
    system_order: Vec<usize>,
    target_used: Vec<bool>,
    system_used: Vec<bool>,
    focus: Focus,
    result: SentenceEvaluation,
}

impl<'a> Matcher<'a> {
    fn new(target: &'a [Span], system: &'a [Span], focus: Focus) -> Self {
        let mut result = SentenceEvaluation::default();
        for span in target.iter().chain(system.iter()) {
            result.evaluation.register(span.label());
        }
        Matcher {
            target,
            system,
            target_order: stable_order(target),
            system_order: stable_order(system),
            target_used: vec![false; target.len()],
            system_used: vec![false; system.len()],
            focus,
            result,
        }
    }

    fn focus_label(&self, t: usize, s: usize) -> &'a str {
        let (target, system): (&'a [Span], &'a [Span]) = (self.target, self.system);
        match self.focus {
            Focus::Target => target[t].label(),
            Focus::System => system[s].label(),
        }
    }

    /// Phase 1: identical token sets, restricted to equal or to different labels.
    fn pair_identical(&mut self, same_label: bool) {
        for ti in 0..self.target_order.len() {
            let t = self.target_order[ti];
            if self.target_used[t] {
                continue;
            }
            let target_span = &self.target[t];
            let found = self.system_order.iter().copied().find(|&s| {
                let system_span = &self.system[s];
                !self.system_used[s]
                    && system_span.tokens() == target_span.tokens()
                    && (system_span.label() == target_span.label()) == same_label
            });
            if let Some(s) = found {
                let outcome = if same_label { Outcome::TP } else { Outcome::LE };
                self.record_pair(t, s, outcome);
            }
        }
    }

    /// Phases 2 and 3: overlapping ranges, restricted to equal or to different labels.
    fn pair_overlapping(&mut self, same_label: bool, strategy: MatchStrategy) {
        for ti in 0..self.target_order.len() {
            let t = self.target_order[ti];
            if self.target_used[t] {
                continue;
            }
            let target_span = &self.target[t];
            let mut candidates = self
                .system_order
                .iter()
                .copied()
                .enumerate()
                .filter(|&(_, s)| {
                    let system_span = &self.system[s];
                    !self.system_used[s]
                        && (system_span.label() == target_span.label()) == same_label
                        && overlap_type(target_span.range(), system_span.range())
                            .is_overlapping()
                });
            let found = match strategy {
                MatchStrategy::First => candidates.next().map(|(_, s)| s),
                MatchStrategy::MaxOverlap => candidates
                    .min_by_key(|&(position, s)| {
                        let system_span = &self.system[s];
                        let shared = target_span.shared_tokens(system_span);
                        (
                            Reverse(shared),
                            system_span.tokens().len() - shared,
                            system_span.len(),
                            position,
                        )
                    })
                    .map(|(_, s)| s),
            };
            if let Some(s) = found {
                let kind = boundary_type(target_span, &self.system[s]);
                let outcome = if same_label {
                    Outcome::BE(kind)
                } else {
                    Outcome::LBE(kind)
                };
                self.record_pair(t, s, outcome);
            }
        }
    }

    fn record_pair(&mut self, t: usize, s: usize, outcome: Outcome) {
        self.target_used[t] = true;
        self.system_used[s] = true;
        let target_label = self.target[t].label();
        let system_label = self.system[s].label();
        let focus_label = self.focus_label(t, s);
        let evaluation = &mut self.result.evaluation;
        match outcome {
            Outcome::TP => {
                evaluation.traditional.record(target_label, Outcome::TP);
                evaluation.fair.record(focus_label, Outcome::TP);
            }
            Outcome::BE(_) => {
                evaluation.traditional.record(target_label, Outcome::FN);
                evaluation.traditional.record(system_label, Outcome::FP);
                evaluation.fair.record(target_label, outcome);
                evaluation.confusion.increment(target_label, target_label);
            }
            Outcome::LE | Outcome::LBE(_) => {
                evaluation.traditional.record(target_label, Outcome::FN);
                evaluation.traditional.record(system_label, Outcome::FP);
                evaluation.fair.record(focus_label, outcome);
                evaluation.confusion.increment(target_label, system_label);
            }
            Outcome::FP | Outcome::FN => return,
        }
        self.result.alignments.push(Alignment {
            target: Some(t),
            system: Some(s),
            outcome,
        });
    }

    /// Phase 4: unmatched spans.
    fn finish(mut self) -> SentenceEvaluation {
        let evaluation = &mut self.result.evaluation;
        for &t in self.target_order.iter().filter(|&&t| !self.target_used[t]) {
            let label = self.target[t].label();
            evaluation.traditional.record(label, Outcome::FN);
            evaluation.fair.record(label, Outcome::FN);
            evaluation.confusion.increment(label, EMPTY_LABEL);
            self.result.alignments.push(Alignment {
                target: Some(t),
                system: None,
                outcome: Outcome::FN,
            });
        }
        for &s in self.system_order.iter().filter(|&&s| !self.system_used[s]) {
            let label = self.system[s].label();
            evaluation.traditional.record(label, Outcome::FP);
            evaluation.fair.record(label, Outcome::FP);
            evaluation.confusion.increment(EMPTY_LABEL, label);
            self.result.alignments.push(Alignment {
                target: None,
                system: Some(s),
                outcome: Outcome::FP,
            });
        }
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructure::{ErrorCategory, ErrorCounts};
    use enum_iterator::all;
    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    fn spans(raw: &[(&str, usize, usize)]) -> Vec<Span> {
        raw.iter().map(|&(l, b, e)| Span::new(l, b, e)).collect()
    }

    fn only(category: ErrorCategory, count: usize, counts: &ErrorCounts) -> bool {
        all::<ErrorCategory>()
            .filter(|c| *c != ErrorCategory::BE)
            .all(|c| counts.get(c) == if c == category { count } else { 0 })
    }

    #[test]
    fn test_exact_label_match() {
        let result = compare_spans(
            &spans(&[("PER", 1, 2)]),
            &spans(&[("PER", 1, 2)]),
            Focus::Target,
        );
        let evaluation = result.evaluation();
        assert!(only(ErrorCategory::TP, 1, evaluation.fair().overall()));
        assert_eq!(evaluation.traditional().overall().get(ErrorCategory::TP), 1);
        assert_eq!(evaluation.confusion().total(), 0);
    }

    #[test]
    fn test_labeling_error() {
        let result = compare_spans(
            &spans(&[("ORG", 4, 4)]),
            &spans(&[("LOC", 4, 4)]),
            Focus::Target,
        );
        let evaluation = result.evaluation();
        assert!(only(ErrorCategory::LE, 1, evaluation.fair().overall()));
        assert_eq!(evaluation.fair().label("ORG").get(ErrorCategory::LE), 1);
        assert_eq!(evaluation.fair().label("LOC").get(ErrorCategory::LE), 0);
        assert_eq!(evaluation.confusion().get("ORG", "LOC"), 1);
        assert_eq!(evaluation.confusion().total(), 1);
        let traditional = evaluation.traditional();
        assert_eq!(traditional.label("ORG").get(ErrorCategory::FN), 1);
        assert_eq!(traditional.label("LOC").get(ErrorCategory::FP), 1);
    }

    #[test]
    fn test_same_label_boundary_error() {
        let result = compare_spans(
            &spans(&[("LOC", 1, 3)]),
            &spans(&[("LOC", 1, 2)]),
            Focus::Target,
        );
        let evaluation = result.evaluation();
        let overall = evaluation.fair().overall();
        assert_eq!(overall.get(ErrorCategory::BES), 1);
        assert_eq!(overall.get(ErrorCategory::BE), 1);
        assert_eq!(overall.system_total(), 1);
        assert_eq!(overall.target_total(), 1);
        assert_eq!(evaluation.confusion().get("LOC", "LOC"), 1);
    }

    #[test]
    fn test_labeling_boundary_error() {
        let result = compare_spans(
            &spans(&[("ORG", 1, 3)]),
            &spans(&[("LOC", 2, 4)]),
            Focus::Target,
        );
        let evaluation = result.evaluation();
        let overall = evaluation.fair().overall();
        assert_eq!(overall.get(ErrorCategory::LBE), 1);
        assert_eq!(overall.get(ErrorCategory::BE), 0);
        assert_eq!(overall.target_total(), 1);
        assert_eq!(evaluation.confusion().get("ORG", "LOC"), 1);
        assert_eq!(
            result.alignments(),
            &[Alignment {
                target: Some(0),
                system: Some(0),
                outcome: Outcome::LBE(BoundaryType::BEO)
            }]
        );
    }

    #[test]
    fn test_disjoint_spans() {
        let result = compare_spans(
            &spans(&[("PER", 1, 2)]),
            &spans(&[("PER", 5, 6)]),
            Focus::Target,
        );
        let evaluation = result.evaluation();
        let overall = evaluation.fair().overall();
        assert_eq!(overall.get(ErrorCategory::FN), 1);
        assert_eq!(overall.get(ErrorCategory::FP), 1);
        assert_eq!(overall.get(ErrorCategory::BE), 0);
        assert_eq!(evaluation.confusion().get("PER", "_"), 1);
        assert_eq!(evaluation.confusion().get("_", "PER"), 1);
    }

    #[rstest]
    #[case(Focus::Target, "ORG", "LOC")]
    #[case(Focus::System, "LOC", "ORG")]
    fn test_focus_attribution(
        #[case] focus: Focus,
        #[case] credited: &str,
        #[case] other: &str,
    ) {
        let target = spans(&[("ORG", 1, 1), ("ORG", 3, 5)]);
        let system = spans(&[("LOC", 1, 1), ("LOC", 4, 6)]);
        let result = compare_spans(&target, &system, focus);
        let fair = result.evaluation().fair();
        assert_eq!(fair.label(credited).get(ErrorCategory::LE), 1);
        assert_eq!(fair.label(credited).get(ErrorCategory::LBE), 1);
        assert_eq!(fair.label(other), ErrorCounts::default());
        // the confusion matrix is always target x system
        assert_eq!(result.evaluation().confusion().get("ORG", "LOC"), 2);
    }

    #[test]
    fn test_same_label_identical_wins_over_label_error() {
        let target = spans(&[("PER", 1, 2)]);
        let system = spans(&[("LOC", 1, 2), ("PER", 1, 2)]);
        let result = compare_spans(&target, &system, Focus::Target);
        let overall = result.evaluation().fair().overall();
        assert_eq!(overall.get(ErrorCategory::TP), 1);
        assert_eq!(overall.get(ErrorCategory::LE), 0);
        assert_eq!(overall.get(ErrorCategory::FP), 1);
    }

    #[test]
    fn test_same_label_boundary_wins_over_cross_label() {
        let target = spans(&[("NP", 2, 4)]);
        let system = spans(&[("VP", 2, 3), ("NP", 3, 6)]);
        let result = compare_spans(&target, &system, Focus::Target);
        let overall = result.evaluation().fair().overall();
        assert_eq!(overall.get(ErrorCategory::BEO), 1);
        assert_eq!(overall.get(ErrorCategory::LBE), 0);
        assert_eq!(overall.get(ErrorCategory::FP), 1);
    }

    #[test]
    fn test_coinciding_range_refined_by_tokens() {
        let target = vec![Span::new("NP", 1, 3)];
        let system = vec![Span::with_tokens("NP", 1, 3, [1, 3])];
        let result = compare_spans(&target, &system, Focus::Target);
        assert_eq!(result.evaluation().fair().overall().get(ErrorCategory::BES), 1);
    }

    #[test]
    fn test_max_overlap_prefers_larger_intersection() {
        let target = spans(&[("NP", 1, 6)]);
        let system = spans(&[("NP", 0, 1), ("NP", 2, 6)]);
        let first = compare_spans_with(&target, &system, Focus::Target, MatchStrategy::First);
        assert_eq!(first.alignments()[0].system, Some(0));
        assert_eq!(
            first.alignments()[0].outcome,
            Outcome::BE(BoundaryType::BEO)
        );
        let best = compare_spans_with(&target, &system, Focus::Target, MatchStrategy::MaxOverlap);
        assert_eq!(best.alignments()[0].system, Some(1));
        assert_eq!(best.alignments()[0].outcome, Outcome::BE(BoundaryType::BES));
    }

    #[rstest]
    #[case(MatchStrategy::First)]
    #[case(MatchStrategy::MaxOverlap)]
    fn test_candidates_follow_boundary_order(#[case] strategy: MatchStrategy) {
        // both candidates share two tokens and are equally long
        let target = spans(&[("A", 3, 6)]);
        let system = spans(&[("A", 5, 7), ("A", 2, 4)]);
        let result = compare_spans_with(&target, &system, Focus::Target, strategy);
        assert_eq!(result.alignments()[0].target, Some(0));
        assert_eq!(result.alignments()[0].system, Some(1));
        assert_eq!(result.alignments()[1].system, Some(0));
        assert_eq!(result.alignments()[1].outcome, Outcome::FP);
    }

    #[rstest]
    #[case::fewer_system_only_tokens(
        Span::new("NP", 0, 4),
        Span::new("NP", 5, 8)
    )]
    #[case::shorter_range(
        Span::with_tokens("NP", 0, 4, [0, 2, 3, 4]),
        Span::new("NP", 5, 8)
    )]
    fn test_max_overlap_tie_breaks(#[case] earlier: Span, #[case] better: Span) {
        let target = spans(&[("NP", 2, 7)]);
        let system = vec![earlier, better];
        assert_eq!(
            target[0].shared_tokens(&system[0]),
            target[0].shared_tokens(&system[1])
        );
        let first = compare_spans_with(&target, &system, Focus::Target, MatchStrategy::First);
        assert_eq!(first.alignments()[0].system, Some(0));
        let best = compare_spans_with(&target, &system, Focus::Target, MatchStrategy::MaxOverlap);
        assert_eq!(best.alignments()[0].system, Some(1));
        assert_eq!(best.alignments()[0].outcome, Outcome::BE(BoundaryType::BEO));
    }

    #[test]
    fn test_empty_sentence() {
        let result = compare_spans(&[], &spans(&[("X", 1, 1)]), Focus::Target);
        assert_eq!(result.evaluation().fair().overall().get(ErrorCategory::FP), 1);
        let result = compare_spans(&[], &[], Focus::Target);
        assert_eq!(*result.evaluation().fair().overall(), ErrorCounts::default());
        assert!(result.alignments().is_empty());
    }

    #[test]
    fn test_labels_registered() {
        let result = compare_spans(
            &spans(&[("A", 1, 1)]),
            &spans(&[("B", 1, 1)]),
            Focus::Target,
        );
        let labels: Vec<&str> = result.evaluation().fair().labels().into_iter().collect();
        assert_eq!(labels, vec!["A", "B"]);
        assert_eq!(result.evaluation().traditional().label("B").get(ErrorCategory::FP), 1);
    }

    fn arbitrary_spans(raw: Vec<(u8, u8, u8)>) -> Vec<Span> {
        const LABELS: [&str; 3] = ["A", "B", "C"];
        raw.into_iter()
            .take(12)
            .map(|(l, b, len)| {
                let begin = (b % 16) as usize + 1;
                Span::new(LABELS[(l % 3) as usize], begin, begin + (len % 4) as usize)
            })
            .collect()
    }

    #[test]
    fn test_propertie_exhaustive_and_unique() {
        fn exhaustive(
            raw_target: Vec<(u8, u8, u8)>,
            raw_system: Vec<(u8, u8, u8)>,
            max: bool,
        ) -> TestResult {
            let target = arbitrary_spans(raw_target);
            let system = arbitrary_spans(raw_system);
            let strategy = if max {
                MatchStrategy::MaxOverlap
            } else {
                MatchStrategy::First
            };
            let result = compare_spans_with(&target, &system, Focus::Target, strategy);
            let fair = result.evaluation().fair().overall();
            let traditional = result.evaluation().traditional().overall();
            let mut target_seen = vec![0; target.len()];
            let mut system_seen = vec![0; system.len()];
            for alignment in result.alignments() {
                if let Some(t) = alignment.target {
                    target_seen[t] += 1;
                }
                if let Some(s) = alignment.system {
                    system_seen[s] += 1;
                }
            }
            TestResult::from_bool(
                fair.target_total() == target.len()
                    && fair.system_total() == system.len()
                    && traditional.get(ErrorCategory::TP) + traditional.get(ErrorCategory::FN)
                        == target.len()
                    && traditional.get(ErrorCategory::TP) + traditional.get(ErrorCategory::FP)
                        == system.len()
                    && traditional.get(ErrorCategory::TP) == fair.get(ErrorCategory::TP)
                    && target_seen.iter().all(|&n| n == 1)
                    && system_seen.iter().all(|&n| n == 1),
            )
        }
        QuickCheck::new().tests(2000).quickcheck(
            exhaustive as fn(Vec<(u8, u8, u8)>, Vec<(u8, u8, u8)>, bool) -> TestResult,
        )
    }

    #[test]
    fn test_propertie_traditional_refinement() {
        fn refinement(raw_target: Vec<(u8, u8, u8)>, raw_system: Vec<(u8, u8, u8)>) -> bool {
            let target = arbitrary_spans(raw_target);
            let system = arbitrary_spans(raw_system);
            let result = compare_spans(&target, &system, Focus::Target);
            let fair = result.evaluation().fair().overall();
            let traditional = result.evaluation().traditional().overall();
            let reclassified = fair.get(ErrorCategory::LE)
                + fair.get(ErrorCategory::BE)
                + fair.get(ErrorCategory::LBE);
            traditional.get(ErrorCategory::FN) == reclassified + fair.get(ErrorCategory::FN)
                && traditional.get(ErrorCategory::FP) == reclassified + fair.get(ErrorCategory::FP)
        }
        QuickCheck::new()
            .tests(2000)
            .quickcheck(refinement as fn(Vec<(u8, u8, u8)>, Vec<(u8, u8, u8)>) -> bool)
    }
}
