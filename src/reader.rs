/**
Importers turning annotation files into spans. Two formats are understood, detected per sentence
from its first line:

* span files: four tab separated fields per line, `label begin end tokens`, where `tokens` is a
  comma separated list of 1-based token indices (blank for the whole range);
* token-tagged files (CoNLL-2000 style): one token per line with `form pos annotation`, where the
  annotation holds BIO tags, stacked with `|` from the outermost to the innermost span.

Sentences are separated by blank lines in both formats.
*/
use crate::span::Span;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::warn;

/// POS tags treated as punctuation: STTS, UPOS, custom tags and PTB.
pub const PUNCTUATION_TAGS: [&str; 18] = [
    "$.", "$,", "$(", "PUNCT", "PUNKT", "KOMMA", "COMMA", "KLAMMER", ".", ",", ":", "(", ")", "\"",
    "‘", "“", "’", "”",
];

/// Annotations marking a token outside of any span.
const OUTSIDE: [&str; 3] = ["O", "_", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Error returned when a sentence cannot be turned into spans. Line numbers are 1-based and
/// relative to the sentence.
pub enum ParsingError {
    MissingLabel {
        line: usize,
    },
    IllegalIndex {
        line: usize,
        field: &'static str,
        value: String,
    },
    EndBeforeBegin {
        line: usize,
        begin: usize,
        end: usize,
    },
    UnknownFormat {
        line: usize,
        content: String,
    },
}

impl Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLabel { line } => write!(f, "Missing label in input (line {})", line),
            Self::IllegalIndex { line, field, value } => write!(
                f,
                "{} '{}' is not a legal index (line {})",
                field, value, line
            ),
            Self::EndBeforeBegin { line, begin, end } => write!(
                f,
                "End {} is smaller than begin {} (line {})",
                end, begin, line
            ),
            Self::UnknownFormat { line, content } => write!(
                f,
                "Unknown input format, expected 4 tab separated or 3 space separated columns: '{}' (line {})",
                content, line
            ),
        }
    }
}

impl Error for ParsingError {}

/// Format of a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Spans,
    Conll,
}

impl InputFormat {
    /// Detects the format from a single line.
    pub fn detect(line: &str) -> Option<Self> {
        if line.split('\t').count() == 4 {
            Some(Self::Spans)
        } else if line.split_whitespace().count() == 3 {
            Some(Self::Conll)
        } else {
            None
        }
    }
}

/// Splits a text into sentences: groups of non blank lines separated by blank lines.
pub fn split_sentences(text: &str) -> Vec<Vec<&str>> {
    let mut sentences = Vec::new();
    let mut sentence = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !sentence.is_empty() {
                sentences.push(std::mem::take(&mut sentence));
            }
        } else {
            sentence.push(line);
        }
    }
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    sentences
}

/// Reads a UTF-8 file and returns its sentences.
pub fn read_sentences<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<Vec<String>>> {
    let text = fs::read_to_string(path)?;
    Ok(split_sentences(&text)
        .into_iter()
        .map(|s| s.into_iter().map(String::from).collect())
        .collect())
}

/// Parses the lines of one sentence into spans. The format is detected from the first line.
/// `ignore_punct` only affects token-tagged input.
pub fn parse_sentence<S: AsRef<str>>(
    lines: &[S],
    ignore_punct: bool,
) -> Result<Vec<Span>, ParsingError> {
    let first = match lines.first() {
        Some(first) => first.as_ref(),
        None => return Ok(Vec::new()),
    };
    match InputFormat::detect(first) {
        Some(InputFormat::Spans) => spans_from_lines(lines),
        Some(InputFormat::Conll) => {
            let spans = spans_from_conll(lines);
            if ignore_punct {
                Ok(remove_punctuation(spans, &punctuation_indices(lines)))
            } else {
                Ok(spans)
            }
        }
        None => Err(ParsingError::UnknownFormat {
            line: 1,
            content: String::from(first),
        }),
    }
}

fn parse_index(
    value: Option<&str>,
    line: usize,
    field: &'static str,
) -> Result<usize, ParsingError> {
    let value = value.unwrap_or("").trim();
    match value.parse::<usize>() {
        Ok(index) if index >= 1 => Ok(index),
        _ => Err(ParsingError::IllegalIndex {
            line,
            field,
            value: String::from(value),
        }),
    }
}

/// Parses span file lines: `label \t begin \t end \t tokens`.
pub fn spans_from_lines<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Span>, ParsingError> {
    let mut spans = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let line_number = i + 1;
        let mut fields = line.as_ref().split('\t');
        let label = fields.next().unwrap_or("").trim();
        if label.is_empty() {
            return Err(ParsingError::MissingLabel { line: line_number });
        }
        let begin = parse_index(fields.next(), line_number, "Begin")?;
        let end = parse_index(fields.next(), line_number, "End")?;
        if end < begin {
            return Err(ParsingError::EndBeforeBegin {
                line: line_number,
                begin,
                end,
            });
        }
        let raw_tokens = fields.next().unwrap_or("").trim();
        let tokens: Vec<usize> = if raw_tokens.is_empty() {
            Vec::new()
        } else {
            match raw_tokens
                .split(',')
                .map(|t| t.trim().parse::<usize>())
                .collect::<Result<Vec<usize>, _>>()
            {
                Ok(tokens) => tokens
                    .into_iter()
                    .filter(|t| begin <= *t && *t <= end)
                    .collect(),
                Err(_) => {
                    warn!(
                        "Token list '{}' is not valid (line {}), using the range {}..={}",
                        raw_tokens, line_number, begin, end
                    );
                    Vec::new()
                }
            }
        };
        spans.push(Span::with_tokens(label, begin, end, tokens));
    }
    Ok(spans)
}

/// An open span while reading token-tagged input.
struct OpenSpan {
    label: String,
    begin: usize,
    end: usize,
    tokens: BTreeSet<usize>,
}

impl OpenSpan {
    fn new(label: &str, index: usize) -> Self {
        OpenSpan {
            label: String::from(label),
            begin: index,
            end: index,
            tokens: BTreeSet::from([index]),
        }
    }

    fn extend(&mut self, index: usize) {
        self.end = index;
        self.tokens.insert(index);
    }

    fn close(self) -> Span {
        Span::with_tokens(self.label, self.begin, self.end, self.tokens)
    }
}

/// Closes every open span, outermost first.
fn close_all(stack: &mut Vec<OpenSpan>, spans: &mut Vec<Span>) {
    spans.extend(stack.drain(..).map(OpenSpan::close));
}

/// Closes open spans, innermost first, until at most `depth` remain.
fn close_down_to(depth: usize, stack: &mut Vec<OpenSpan>, spans: &mut Vec<Span>) {
    while stack.len() > depth {
        if let Some(open) = stack.pop() {
            spans.push(open.close());
        }
    }
}

/// Reconstructs spans from stacked BIO annotations (`form pos annotation` lines).
pub fn spans_from_conll<S: AsRef<str>>(lines: &[S]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut stack: Vec<OpenSpan> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let index = i + 1;
        let annotation = line.as_ref().split_whitespace().nth(2).unwrap_or("");
        if OUTSIDE.contains(&annotation) {
            close_all(&mut stack, &mut spans);
            continue;
        }
        let levels: Vec<&str> = annotation.split('|').collect();
        close_down_to(levels.len(), &mut stack, &mut spans);
        for (level, tag) in levels.into_iter().enumerate() {
            let label = tag.split('-').nth(1).unwrap_or("");
            if tag.starts_with("B-") {
                if level == 0 {
                    close_all(&mut stack, &mut spans);
                } else {
                    close_down_to(level, &mut stack, &mut spans);
                }
                stack.push(OpenSpan::new(label, index));
            } else if tag.starts_with("I-") {
                match stack.get_mut(level) {
                    Some(open) => open.extend(index),
                    None => stack.push(OpenSpan::new(label, index)),
                }
            }
        }
    }
    close_all(&mut stack, &mut spans);
    spans
}

/// 1-based indices of the tokens whose POS tag is punctuation.
pub fn punctuation_indices<S: AsRef<str>>(lines: &[S]) -> BTreeSet<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            line.as_ref()
                .split_whitespace()
                .nth(1)
                .is_some_and(|pos| PUNCTUATION_TAGS.contains(&pos))
        })
        .map(|(i, _)| i + 1)
        .collect()
}

/// Removes the given tokens from every span. Spans left without tokens are dropped.
pub fn remove_punctuation(spans: Vec<Span>, punctuation: &BTreeSet<usize>) -> Vec<Span> {
    if punctuation.is_empty() {
        return spans;
    }
    spans
        .into_iter()
        .filter_map(|span| span.without_tokens(punctuation))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn conll(text: &str) -> Vec<&str> {
        text.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).collect()
    }

    #[test]
    fn test_split_sentences() {
        let text = "a\tb\n\n\n  \nc\r\nd\r\n\ne";
        assert_eq!(
            split_sentences(text),
            vec![vec!["a\tb"], vec!["c", "d"], vec!["e"]]
        );
        assert!(split_sentences("\n\n").is_empty());
    }

    #[rstest]
    #[case("NP\t1\t3\t1,2,3", Some(InputFormat::Spans))]
    #[case("NP\t1\t3\t", Some(InputFormat::Spans))]
    #[case("Haus NN B-NP", Some(InputFormat::Conll))]
    #[case("Haus\tNN\tB-NP", Some(InputFormat::Conll))]
    #[case("Haus NN", None)]
    fn test_detect(#[case] line: &str, #[case] expected: Option<InputFormat>) {
        assert_eq!(InputFormat::detect(line), expected)
    }

    #[test]
    fn test_spans_from_lines() {
        let lines = ["NP\t1\t3\t1,3", "PP\t4\t6\t", "AP\t2\t2\t2,x", "VP\t7\t9\t1,8,12"];
        let spans = spans_from_lines(&lines).unwrap();
        assert_eq!(
            spans,
            vec![
                Span::with_tokens("NP", 1, 3, [1, 3]),
                Span::new("PP", 4, 6),
                Span::new("AP", 2, 2),
                Span::with_tokens("VP", 7, 9, [8]),
            ]
        );
    }

    #[rstest]
    #[case("\t1\t2\t", ParsingError::MissingLabel { line: 1 })]
    #[case("NP\tx\t2\t", ParsingError::IllegalIndex { line: 1, field: "Begin", value: String::from("x") })]
    #[case("NP\t0\t2\t", ParsingError::IllegalIndex { line: 1, field: "Begin", value: String::from("0") })]
    #[case("NP\t1\t\t", ParsingError::IllegalIndex { line: 1, field: "End", value: String::new() })]
    #[case("NP\t3\t2\t", ParsingError::EndBeforeBegin { line: 1, begin: 3, end: 2 })]
    fn test_spans_from_lines_errors(#[case] line: &str, #[case] expected: ParsingError) {
        assert_eq!(spans_from_lines(&[line]), Err(expected))
    }

    #[test]
    fn test_error_line_number() {
        let lines = ["NP\t1\t2\t", "NP\t5\t4\t"];
        assert_eq!(
            spans_from_lines(&lines),
            Err(ParsingError::EndBeforeBegin {
                line: 2,
                begin: 5,
                end: 4
            })
        );
    }

    #[test]
    fn test_spans_from_conll_flat() {
        let lines = conll(
            "
            Der ART B-NP
            Mann NN I-NP
            sieht VVFIN O
            das ART B-NP
            Haus NN I-NP
            Peter NE B-PER
            ",
        );
        assert_eq!(
            spans_from_conll(&lines),
            vec![
                Span::new("NP", 1, 2),
                Span::new("NP", 4, 5),
                Span::new("PER", 6, 6)
            ]
        );
    }

    #[test]
    fn test_spans_from_conll_stacked() {
        let lines = conll(
            "
            in APPR B-PP
            dem ART I-PP|B-NP
            alten ADJA I-PP|I-NP|B-AP
            Haus NN I-PP|I-NP
            . $. O
            ",
        );
        assert_eq!(
            spans_from_conll(&lines),
            vec![
                Span::new("AP", 3, 3),
                Span::new("PP", 1, 4),
                Span::new("NP", 2, 4),
            ]
        );
    }

    #[test]
    fn test_spans_from_conll_new_span_at_inner_level() {
        let lines = conll(
            "
            a X B-NP|B-AP
            b X I-NP|B-AP
            c X I-NP
            ",
        );
        assert_eq!(
            spans_from_conll(&lines),
            vec![
                Span::new("AP", 1, 1),
                Span::new("AP", 2, 2),
                Span::new("NP", 1, 3),
            ]
        );
    }

    #[test]
    fn test_spans_from_conll_missing_begin() {
        let lines = conll("a X O\nb X I-NP\nc X I-NP");
        assert_eq!(spans_from_conll(&lines), vec![Span::new("NP", 2, 3)]);
    }

    #[test]
    fn test_ignore_punctuation() {
        let lines = conll(
            "
            ( $( B-NP
            Peter NE I-NP
            , $, I-NP
            Paul NE I-NP
            ) $( I-NP
            . $. B-X
            ",
        );
        let spans = parse_sentence(&lines, true).unwrap();
        assert_eq!(spans, vec![Span::with_tokens("NP", 2, 4, [2, 4])]);
        let spans = parse_sentence(&lines, false).unwrap();
        assert_eq!(spans, vec![Span::new("NP", 1, 5), Span::new("X", 6, 6)]);
    }

    #[test]
    fn test_parse_sentence_unknown_format() {
        assert_eq!(
            parse_sentence(&["only two"], false),
            Err(ParsingError::UnknownFormat {
                line: 1,
                content: String::from("only two")
            })
        );
        assert_eq!(parse_sentence::<&str>(&[], false), Ok(vec![]));
    }
}
