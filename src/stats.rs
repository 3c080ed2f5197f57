use crate::span::Span;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Label frequencies of a flat list of spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelStats {
    counts: AHashMap<String, usize>,
    total: usize,
}

/// Counts how often each label occurs. Sentence boundaries play no role.
pub fn annotation_stats<'a, I>(spans: I) -> LabelStats
where
    I: IntoIterator<Item = &'a Span>,
{
    let mut stats = LabelStats::default();
    for span in spans {
        stats.add(span.label());
    }
    stats
}

impl LabelStats {
    fn add(&mut self, label: &str) {
        self.total += 1;
        match self.counts.get_mut(label) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(String::from(label), 1);
            }
        }
    }

    pub fn get(&self, label: &str) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Total number of spans counted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Share of the label among all spans, in `[0, 1]`. Zero when nothing was counted.
    pub fn share(&self, label: &str) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.get(label) as f64 / self.total as f64
        }
    }

    /// Frequencies sorted by label.
    pub fn sorted(&self) -> BTreeMap<&str, usize> {
        self.counts.iter().map(|(l, c)| (l.as_str(), *c)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl AddAssign<&LabelStats> for LabelStats {
    fn add_assign(&mut self, rhs: &LabelStats) {
        self.total += rhs.total;
        for (label, count) in rhs.counts.iter() {
            *self.counts.entry(label.clone()).or_insert(0) += count;
        }
    }
}
