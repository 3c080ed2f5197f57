use crate::aggregator::Aggregator;
use crate::datastructure::{ErrorCategory, ErrorCounts, Evaluation};
use crate::metrics::{score_table, EvalVersion, Scores, TableScores};
use crate::stats::LabelStats;
use crate::weights::WeightTable;
use enum_iterator::all;
use itertools::Itertools;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Display;

const OVERALL: &str = "overall";

/// Formats a score in `[0, 1]` as a percentage with two decimals.
fn percent(value: f64) -> String {
    format!("{:04.2}", 100.0 * value)
}

fn write_row(
    f: &mut std::fmt::Formatter<'_>,
    columns: &[ErrorCategory],
    label: &str,
    counts: &ErrorCounts,
    scores: &Scores,
) -> std::fmt::Result {
    writeln!(
        f,
        "{}\t{}\t{}\t{}\t{}",
        label,
        columns.iter().map(|c| counts.get(*c)).join("\t"),
        percent(scores.precision),
        percent(scores.recall),
        percent(scores.fscore)
    )
}

/// Result of a corpus evaluation: counts, scores per requested version, the confusion matrix and
/// the target label frequencies. `Display` renders the tab separated text report, `Serialize` the
/// `overall` / `per_label` / `conf` structure.
#[derive(Debug, Clone)]
pub struct Reporter {
    settings: Option<String>,
    versions: Vec<EvalVersion>,
    weights: WeightTable,
    evaluation: Evaluation,
    scores: BTreeMap<EvalVersion, TableScores>,
    target_stats: LabelStats,
}

impl Reporter {
    /// Scores the aggregated counts for every requested version.
    pub fn new(
        aggregator: Aggregator,
        versions: &[EvalVersion],
        weights: WeightTable,
        parallel: bool,
    ) -> Self {
        let (evaluation, target_stats) = aggregator.into_parts();
        let scores = versions
            .iter()
            .map(|v| {
                (
                    *v,
                    score_table(evaluation.table(*v), *v, &weights, parallel),
                )
            })
            .collect();
        Reporter {
            settings: None,
            versions: versions.iter().copied().unique().collect(),
            weights,
            evaluation,
            scores,
            target_stats,
        }
    }

    /// Adds the settings listing printed at the top of the text report.
    pub fn with_settings<S: Into<String>>(mut self, settings: S) -> Self {
        self.settings = Some(settings.into());
        self
    }

    pub fn versions(&self) -> &[EvalVersion] {
        &self.versions
    }

    pub fn scores(&self, version: EvalVersion) -> Option<&TableScores> {
        self.scores.get(&version)
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    pub fn target_stats(&self) -> &LabelStats {
        &self.target_stats
    }

    /// Count columns of the text table of a version.
    pub fn columns(&self, version: EvalVersion) -> Vec<ErrorCategory> {
        match version {
            EvalVersion::Traditional => {
                vec![ErrorCategory::TP, ErrorCategory::FP, ErrorCategory::FN]
            }
            EvalVersion::Fair => vec![
                ErrorCategory::TP,
                ErrorCategory::FP,
                ErrorCategory::LE,
                ErrorCategory::BE,
                ErrorCategory::LBE,
                ErrorCategory::FN,
            ],
            EvalVersion::Weighted => version
                .weights(&self.weights)
                .listed()
                .map(|(c, _)| c)
                .collect(),
        }
    }

    /// Categories carried by the serialized rows of a version.
    fn serialized_categories(version: EvalVersion) -> Vec<ErrorCategory> {
        match version {
            EvalVersion::Traditional => {
                vec![ErrorCategory::TP, ErrorCategory::FP, ErrorCategory::FN]
            }
            EvalVersion::Fair | EvalVersion::Weighted => all::<ErrorCategory>().collect(),
        }
    }

    fn write_version(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        version: EvalVersion,
        scores: &TableScores,
    ) -> std::fmt::Result {
        let columns = self.columns(version);
        let table = self.evaluation.table(version);
        writeln!(f, "### {} evaluation:", version.title())?;
        writeln!(
            f,
            "Label\t{}\tPrec\tRec\tF1",
            columns.iter().map(|c| c.to_string()).join("\t")
        )?;
        for (label, row) in scores.per_label.iter() {
            write_row(f, &columns, label, &table.label(label), row)?;
        }
        write_row(f, &columns, OVERALL, table.overall(), &scores.overall)?;
        writeln!(f)
    }
}

impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(settings) = &self.settings {
            writeln!(f, "### Evaluation settings:")?;
            writeln!(f, "{}", settings.trim_end())?;
            writeln!(f)?;
        }
        for version in self.versions.iter() {
            if let Some(scores) = self.scores.get(version) {
                self.write_version(f, *version, scores)?;
            }
        }

        writeln!(f, "### Comparison:")?;
        writeln!(f, "Version\tPrec\tRec\tF1")?;
        for version in self.versions.iter() {
            if let Some(scores) = self.scores.get(version) {
                writeln!(
                    f,
                    "{}\t{}\t{}\t{}",
                    version.title(),
                    percent(scores.overall.precision),
                    percent(scores.overall.recall),
                    percent(scores.overall.fscore)
                )?;
            }
        }
        writeln!(f)?;

        let confusion = self.evaluation.confusion();
        let labels = confusion.labels();
        writeln!(f, "### Confusion matrix:")?;
        writeln!(f, "Target\\System\t{}", labels.iter().join("\t"))?;
        for target_label in labels.iter() {
            writeln!(
                f,
                "{}\t{}",
                target_label,
                labels
                    .iter()
                    .map(|system_label| confusion.get(target_label, system_label))
                    .join("\t")
            )?;
        }
        writeln!(f)?;

        writeln!(f, "### Target data stats:")?;
        writeln!(f, "Label\tFreq\t%")?;
        for (label, count) in self.target_stats.sorted() {
            writeln!(
                f,
                "{}\t{}\t{}",
                label,
                count,
                percent(self.target_stats.share(label))
            )?;
        }
        Ok(())
    }
}

/// One serialized row: the counts of the given categories followed by `Prec`, `Rec` and `F1`.
struct Row<'a> {
    categories: &'a [ErrorCategory],
    counts: ErrorCounts,
    scores: Scores,
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.categories.len() + 3))?;
        for category in self.categories {
            map.serialize_entry(&category.to_string(), &self.counts.get(*category))?;
        }
        map.serialize_entry("Prec", &self.scores.precision)?;
        map.serialize_entry("Rec", &self.scores.recall)?;
        map.serialize_entry("F1", &self.scores.fscore)?;
        map.end()
    }
}

struct Overall<'a>(&'a Reporter);

impl Serialize for Overall<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let reporter = self.0;
        let mut map = serializer.serialize_map(Some(reporter.scores.len()))?;
        for (version, scores) in reporter.scores.iter() {
            let categories = Reporter::serialized_categories(*version);
            let row = Row {
                categories: &categories,
                counts: *reporter.evaluation.table(*version).overall(),
                scores: scores.overall,
            };
            map.serialize_entry(&version.to_string(), &row)?;
        }
        map.end()
    }
}

struct PerLabel<'a>(&'a Reporter);

impl Serialize for PerLabel<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let reporter = self.0;
        let mut map = serializer.serialize_map(Some(reporter.scores.len()))?;
        for (version, scores) in reporter.scores.iter() {
            let categories = Reporter::serialized_categories(*version);
            let table = reporter.evaluation.table(*version);
            let rows: BTreeMap<&str, Row> = scores
                .per_label
                .iter()
                .map(|(label, row)| {
                    (
                        label.as_str(),
                        Row {
                            categories: &categories,
                            counts: table.label(label),
                            scores: *row,
                        },
                    )
                })
                .collect();
            map.serialize_entry(&version.to_string(), &rows)?;
        }
        map.end()
    }
}

impl Serialize for Reporter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("overall", &Overall(self))?;
        map.serialize_entry("per_label", &PerLabel(self))?;
        map.serialize_entry("conf", self.evaluation.confusion())?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{evaluate_corpus, MatchSettings};
    use crate::span::{SentencePair, Span};

    fn reporter(versions: &[EvalVersion], weights: WeightTable) -> Reporter {
        let pairs = vec![
            SentencePair::new(
                vec![Span::new("PER", 1, 2), Span::new("ORG", 4, 4)],
                vec![Span::new("PER", 1, 2), Span::new("LOC", 4, 4)],
            ),
            SentencePair::new(vec![Span::new("LOC", 1, 3)], vec![Span::new("LOC", 1, 2)]),
        ];
        let aggregator = evaluate_corpus(&pairs, &MatchSettings::default(), false);
        Reporter::new(aggregator, versions, weights, false)
    }

    #[test]
    fn test_text_report() {
        let report = reporter(&[EvalVersion::Traditional, EvalVersion::Fair], WeightTable::fair())
            .with_settings("focus: target\n");
        let text = report.to_string();
        let expected_sections = [
            "### Evaluation settings:",
            "### Traditional evaluation:",
            "### Fair evaluation:",
            "### Comparison:",
            "### Confusion matrix:",
            "### Target data stats:",
        ];
        let positions: Vec<usize> = expected_sections
            .iter()
            .map(|s| text.find(s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("Label\tTP\tFP\tFN\tPrec\tRec\tF1\n"));
        assert!(text.contains("Label\tTP\tFP\tLE\tBE\tLBE\tFN\tPrec\tRec\tF1\n"));
        // traditional: 1 TP, 2 FP, 2 FN
        assert!(text.contains("overall\t1\t2\t2\t33.33\t33.33\t33.33\n"));
        // fair: LE and BE count half
        assert!(text.contains("overall\t1\t0\t1\t1\t0\t0\t50.00\t50.00\t50.00\n"));
        assert!(text.contains("Target\\System\tLOC\tORG\tPER\t_\n"));
        assert!(text.contains("ORG\t1\t0\t0\t0\n"));
        assert!(text.contains("PER\t1\t33.33\n"));
        assert!(text.contains(
            "Version\tPrec\tRec\tF1\nTraditional\t33.33\t33.33\t33.33\nFair\t50.00\t50.00\t50.00\n"
        ));
    }

    #[test]
    fn test_weighted_columns() {
        let weights = WeightTable::from_formulas("BES = 0.5*TP + 0.5*FN, LE = 1*FP");
        let report = reporter(&[EvalVersion::Weighted], weights);
        assert_eq!(
            report.columns(EvalVersion::Weighted),
            vec![
                ErrorCategory::TP,
                ErrorCategory::FP,
                ErrorCategory::LE,
                ErrorCategory::BES,
                ErrorCategory::FN
            ]
        );
        assert!(report.to_string().contains("Label\tTP\tFP\tLE\tBES\tFN\tPrec\tRec\tF1\n"));
    }

    #[test]
    fn test_json_structure() {
        let report = reporter(
            &[EvalVersion::Traditional, EvalVersion::Fair],
            WeightTable::fair(),
        );
        let json = serde_json::to_value(&report).unwrap();
        let traditional = &json["overall"]["traditional"];
        assert_eq!(traditional["TP"], 1);
        assert_eq!(traditional["FN"], 2);
        assert!(traditional.get("LE").is_none());
        let fair = &json["overall"]["fair"];
        assert_eq!(fair["LE"], 1);
        assert_eq!(fair["BES"], 1);
        assert_eq!(fair["BE"], 1);
        assert_eq!(fair["F1"], 0.5);
        assert_eq!(json["per_label"]["fair"]["ORG"]["LE"], 1);
        assert_eq!(json["per_label"]["traditional"]["LOC"]["FP"], 2);
        assert_eq!(json["conf"]["ORG"]["LOC"], 1);
        assert_eq!(json["conf"]["LOC"]["LOC"], 1);
        assert!(json["overall"].get("weighted").is_none());
    }
}
