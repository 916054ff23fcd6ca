//! Character ranges inside one span's text and their algebra.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A validated half-open `[start, end)` character range into a span's text.
///
/// Offsets count `char`s of the flattened span text. `start < end` is enforced at
/// construction, so an empty range is unrepresentable. Values are immutable:
/// merging and subtraction produce new ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawTextRange", into = "RawTextRange")]
pub struct TextRange {
    /// First character covered by the range.
    start: usize,
    /// One past the last character covered by the range.
    end: usize,
}

/// Unvalidated wire shape, checked on the way in.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTextRange {
    /// Exclusive end offset.
    end_offset: usize,
    /// Inclusive start offset.
    start_offset: usize,
}

impl TextRange {
    /// Whether `offset` lies inside the range.
    #[must_use]
    pub const fn contains(self, offset: usize) -> bool {
        return self.start <= offset && offset < self.end;
    }

    /// Whether `other` lies entirely inside this range.
    #[must_use]
    pub const fn covers(self, other: Self) -> bool {
        return self.start <= other.start && other.end <= self.end;
    }

    /// The exclusive end offset.
    #[must_use]
    pub const fn end(self) -> usize {
        return self.end;
    }

    /// Merge two ranges that overlap or touch into the range spanning both.
    /// Returns `None` when a gap separates them.
    #[must_use]
    pub fn merge(self, other: Self) -> Option<Self> {
        if !self.touches(other) {
            return None;
        }
        return Some(Self {
            end: self.end.max(other.end),
            start: self.start.min(other.start),
        });
    }

    /// Build a range, rejecting `start >= end`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` if the range would be empty or inverted.
    pub fn new(start: usize, end: usize) -> Result<Self, Error> {
        if start >= end {
            return Err(Error::InvalidRange { end, start });
        }
        return Ok(Self { start, end });
    }

    /// Whether the two ranges share at least one character.
    #[must_use]
    pub const fn overlaps(self, other: Self) -> bool {
        return self.start < other.end && other.start < self.end;
    }

    /// The inclusive start offset.
    #[must_use]
    pub const fn start(self) -> usize {
        return self.start;
    }

    /// Remove the part of `self` covered by `cut`.
    ///
    /// Yields nothing when `cut` covers `self`, one fragment when `cut` clips an
    /// edge (or misses entirely), and a before/after pair when `cut` sits strictly
    /// inside.
    #[must_use]
    pub fn subtract(self, cut: Self) -> Vec<Self> {
        if !self.overlaps(cut) {
            return vec![self];
        }
        let mut fragments = Vec::with_capacity(2);
        if self.start < cut.start {
            fragments.push(Self { end: cut.start, start: self.start });
        }
        if cut.end < self.end {
            fragments.push(Self { end: self.end, start: cut.end });
        }
        return fragments;
    }

    /// Whether the ranges overlap or abut, i.e. can be merged into one.
    #[must_use]
    pub const fn touches(self, other: Self) -> bool {
        return self.start <= other.end && other.start <= self.end;
    }
}

impl std::fmt::Display for TextRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}..{}", self.start, self.end);
    }
}

impl From<TextRange> for RawTextRange {
    fn from(range: TextRange) -> Self {
        return Self { end_offset: range.end, start_offset: range.start };
    }
}

impl TryFrom<RawTextRange> for TextRange {
    type Error = Error;

    fn try_from(raw: RawTextRange) -> Result<Self, Self::Error> {
        return Self::new(raw.start_offset, raw.end_offset);
    }
}
