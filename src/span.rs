/**
This module contains the span, the unit compared by the matcher. A span is a labeled, contiguous
range of tokens with an explicit set of member tokens. The token set can be smaller than the range:
punctuation can be removed from it without moving the boundaries.
*/
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

/// A labeled token range, such as `("NP", 3, 5, {3, 4, 5})`. Token indices are inclusive on both
/// ends and `begin <= end` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawSpan")]
pub struct Span {
    label: String,
    begin: usize,
    end: usize,
    tokens: BTreeSet<usize>,
}

impl Span {
    /// Builds a span covering every token from `begin` to `end`. If `end < begin`, the boundaries
    /// are swapped.
    pub fn new<S: Into<String>>(label: S, begin: usize, end: usize) -> Self {
        let (begin, end) = if end < begin {
            (end, begin)
        } else {
            (begin, end)
        };
        Span {
            label: label.into(),
            begin,
            end,
            tokens: (begin..=end).collect(),
        }
    }

    /// Builds a span with an explicit token set. An empty set, or a set containing tokens outside
    /// of `begin..=end`, is invalid and replaced by the full range.
    pub fn with_tokens<S, I>(label: S, begin: usize, end: usize, tokens: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = usize>,
    {
        let mut span = Span::new(label, begin, end);
        let tokens: BTreeSet<usize> = tokens.into_iter().collect();
        if !tokens.is_empty() && tokens.iter().all(|t| span.contains_index(*t)) {
            span.tokens = tokens;
        }
        span
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn tokens(&self) -> &BTreeSet<usize> {
        &self.tokens
    }

    /// Length of the range, in tokens.
    pub fn len(&self) -> usize {
        self.end - self.begin + 1
    }

    /// A span always covers at least one token.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Is the index within the boundaries of the span (whether or not it belongs to the token
    /// set)?
    pub fn contains_index(&self, index: usize) -> bool {
        self.begin <= index && index <= self.end
    }

    /// Removes the given tokens from the token set and moves the boundaries onto the remaining
    /// tokens. Returns `None` if no token is left.
    pub fn without_tokens(mut self, removed: &BTreeSet<usize>) -> Option<Self> {
        self.tokens.retain(|t| !removed.contains(t));
        let first = *self.tokens.first()?;
        let last = *self.tokens.last()?;
        self.begin = first;
        self.end = last;
        Some(self)
    }

    /// Number of tokens shared by the two token sets.
    pub(crate) fn shared_tokens(&self, other: &Span) -> usize {
        self.tokens.intersection(&other.tokens).count()
    }

    pub(crate) fn range(&self) -> (usize, usize) {
        (self.begin, self.end)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.label, self.begin, self.end)
    }
}

/// Serialized form of a span, checked by [Span::with_tokens] on the way in.
#[derive(Deserialize)]
struct RawSpan {
    label: String,
    begin: usize,
    end: usize,
    #[serde(default)]
    tokens: Vec<usize>,
}

impl From<RawSpan> for Span {
    fn from(raw: RawSpan) -> Self {
        Span::with_tokens(raw.label, raw.begin, raw.end, raw.tokens)
    }
}

impl<S: Into<String>> From<(S, usize, usize)> for Span {
    fn from(value: (S, usize, usize)) -> Self {
        Span::new(value.0, value.1, value.2)
    }
}

/// The spans of one sentence, as annotated in the target (gold) and the system (predicted) data.
/// Both sides must share the same token indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    pub target: Vec<Span>,
    pub system: Vec<Span>,
}

impl SentencePair {
    pub fn new(target: Vec<Span>, system: Vec<Span>) -> Self {
        SentencePair { target, system }
    }
}
