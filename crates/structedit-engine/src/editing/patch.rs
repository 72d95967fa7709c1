//! Result metadata for an applied command: what the external text surface
//! must change to stay in sync with the tree.

use crate::pos::{Pos, Span};
use serde::{Deserialize, Serialize};

/// Verbatim replacement the surface applies to its buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub span: Span,
    pub text: String,
}

/// Where the visible cursor/selection lands after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorState {
    Cursor(Pos),
    Selection(Span),
}

impl CursorState {
    /// The position context resolution starts from.
    pub fn focus(&self) -> Pos {
        match self {
            CursorState::Cursor(p) => *p,
            CursorState::Selection(s) => s.start,
        }
    }
}

/// Result of applying a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub edits: Vec<TextEdit>,
    pub cursor: CursorState,
    pub version: u64,
}
