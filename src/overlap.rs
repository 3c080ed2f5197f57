/**
Classification of the positional relationship between two token ranges. The first range is the
reference; the second range is described relative to it:

```text
first   ---XXXX---
second  ---XXXX---  TP  (identical)
second  ----XX----  BES (smaller, contained)
second  ---XX-----  BES
second  --XXXXXX--  BEL (larger, containing)
second  --XXXXX---  BEL
second  ----XXXX--  BEO (overlapping, shifted)
second  -X--------  NONE
```
*/
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Relationship of a second range relative to a first one.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlapType {
    /// Identical ranges
    TP,
    /// The second range is a proper subset of the first one
    BES,
    /// The second range is a proper superset of the first one
    BEL,
    /// The ranges intersect but neither contains the other
    BEO,
    /// No shared token index
    NONE,
}

/// The three ways two overlapping, non identical spans can relate to each other.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoundaryType {
    BES,
    BEL,
    BEO,
}

impl OverlapType {
    /// Returns the boundary error described by this overlap, if any.
    pub fn boundary(self) -> Option<BoundaryType> {
        match self {
            Self::BES => Some(BoundaryType::BES),
            Self::BEL => Some(BoundaryType::BEL),
            Self::BEO => Some(BoundaryType::BEO),
            Self::TP | Self::NONE => None,
        }
    }

    pub fn is_overlapping(self) -> bool {
        !matches!(self, Self::NONE)
    }
}

impl Display for OverlapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Display for BoundaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Classifies the range `(b2, e2)` relative to `(b1, e1)`. Both ranges are inclusive and must
/// satisfy `b <= e`.
///
/// * `first`: The reference range
/// * `second`: The range to classify
pub fn overlap_type(first: (usize, usize), second: (usize, usize)) -> OverlapType {
    let (b1, e1) = first;
    let (b2, e2) = second;
    if b1 == b2 && e1 == e2 {
        OverlapType::TP
    } else if b2 >= b1 && e2 <= e1 {
        OverlapType::BES
    } else if b2 <= b1 && e2 >= e1 {
        OverlapType::BEL
    } else if b2 <= e1 && b1 <= e2 {
        OverlapType::BEO
    } else {
        OverlapType::NONE
    }
}
