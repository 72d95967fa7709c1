//! Screen-position value types.
//!
//! The external editing surface reports cursors and selections in 1-based
//! line/column coordinates, and every derived boundary the tree computes is
//! expressed in the same space. These are pure value types; nothing here
//! touches the tree.

use serde::{Deserialize, Serialize};

/// A (line, column) point, both 1-based, ordered line-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// Start of the document.
    pub fn origin() -> Self {
        Self { line: 1, col: 1 }
    }

    pub fn with_col(self, col: usize) -> Self {
        Self { col, ..self }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A span between two points, half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    /// Zero-width span at a single point.
    pub fn collapsed(at: Pos) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Whether `pos` lies on the span including its end boundary.
    pub fn touches(&self, pos: Pos) -> bool {
        self.start <= pos && pos <= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
