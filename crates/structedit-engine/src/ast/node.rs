//! Node taxonomy for the construct tree.
//!
//! Every tree node is a [`Node`]: shared identity/position fields plus a
//! [`NodeKind`] tagged union. Capabilities (text-editable, has-body,
//! is-empty) are predicates on the tag, not downcasts, so `match` stays
//! exhaustive when a kind is added.

use crate::ast::scope::Scope;
use crate::pos::{Pos, Span};
use structedit_grammar::{DefId, FormatToken, HoleType};

/// Rendered stand-in for holes and empty editable tokens. Keeps every hole
/// at least this wide so it stays a clickable, navigable target.
pub const HOLE_TEXT: &str = "---";

/// Columns one body nesting level indents by.
pub const TAB_WIDTH: usize = 4;

/// Handle into the [`Tree`](crate::ast::Tree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which child list of the parent a node's `index_in_parent` points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Tokens,
    Body,
}

/// Leaf node carrying literal text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Fixed text; atomic for navigation and deletion.
    NonEditable,
    /// User-edited text validated against `pattern` on every edit.
    Editable { pattern: String },
    /// Editable identifier (shared identifier pattern, no scope effects).
    Identifier,
    /// Identifier that registers/unregisters itself in the nearest scope.
    Assignment,
    /// Transient token accumulating typed characters until a keyword match
    /// terminates it or the edit is aborted.
    Autocomplete,
    /// Typed placeholder awaiting an expression of `expected` type.
    Hole { expected: HoleType },
    /// Non-editable reference to a named entity; `text` is the name.
    Reference,
}

impl Token {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::NonEditable,
            text: text.into(),
        }
    }

    pub fn hole(expected: HoleType) -> Self {
        Self {
            kind: TokenKind::Hole { expected },
            text: String::new(),
        }
    }

    pub fn identifier() -> Self {
        Self {
            kind: TokenKind::Identifier,
            text: String::new(),
        }
    }

    pub fn assignment() -> Self {
        Self {
            kind: TokenKind::Assignment,
            text: String::new(),
        }
    }

    pub fn editable(pattern: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Editable {
                pattern: pattern.into(),
            },
            text: seed.into(),
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Reference,
            text: name.into(),
        }
    }

    pub fn autocomplete() -> Self {
        Self {
            kind: TokenKind::Autocomplete,
            text: String::new(),
        }
    }

    /// Holes and text-editable tokens with no content yet.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            TokenKind::Hole { .. } => true,
            TokenKind::Editable { .. }
            | TokenKind::Identifier
            | TokenKind::Assignment => self.text.is_empty(),
            TokenKind::NonEditable | TokenKind::Reference | TokenKind::Autocomplete => false,
        }
    }

    pub fn is_text_editable(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Editable { .. }
                | TokenKind::Identifier
                | TokenKind::Assignment
                | TokenKind::Autocomplete
        )
    }

    /// The text this token occupies on screen; empty tokens render the
    /// fixed hole placeholder so they never collapse to zero width.
    pub fn render_text(&self) -> &str {
        if self.is_empty() {
            HOLE_TEXT
        } else {
            &self.text
        }
    }
}

/// Statement or expression instantiated from a grammar definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Construct {
    pub def: DefId,
    pub tokens: Vec<NodeId>,
    /// Present iff the definition carries a body marker.
    pub body: Option<Vec<NodeId>>,
    /// Present iff the definition introduces a lexical scope.
    pub scope: Option<Scope>,
}

/// Expanding token run inside a construct. Grows one `cycle` of tokens each
/// time `trigger` is typed at its right boundary; the explicit state machine
/// replaces ad-hoc modular arithmetic at call sites.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub def: DefId,
    pub trigger: char,
    pub cycle: Vec<FormatToken>,
    /// How many cycles have been grown so far.
    pub cycle_index: usize,
    pub tokens: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Token(Token),
    Construct(Construct),
    Compound(Compound),
    /// Editable blank line inside a body; zero-width unless an autocomplete
    /// token is active on it.
    EmptyLine { autocomplete: Option<NodeId> },
    /// The document root: body statements plus the top-level scope.
    Module { body: Vec<NodeId>, scope: Scope },
}

impl NodeKind {
    pub fn is_token(&self) -> bool {
        matches!(self, NodeKind::Token(_))
    }

    pub fn has_body(&self) -> bool {
        matches!(
            self,
            NodeKind::Module { .. }
                | NodeKind::Construct(Construct { body: Some(_), .. })
        )
    }
}

/// Diagnostic bookkeeping for a construct in draft mode. A construct is in
/// draft mode exactly when its node carries one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRecord {
    pub message: String,
    pub actions: Vec<RemediationAction>,
}

/// One-click fix offered alongside a draft diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationAction {
    pub label: String,
    /// Construct to insert above the drafted one, when the fix is an
    /// insertion (e.g. a missing import).
    pub insert_keyword: Option<String>,
}

/// An arena slot: kind plus the identity and derived-position fields shared
/// by every construct.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Non-owning back-link; `None` for the module root and detached nodes.
    pub parent: Option<NodeId>,
    pub index_in_parent: usize,
    pub slot: Slot,
    /// Derived boundaries, written only by the build engine.
    pub left: Pos,
    pub right: Pos,
    /// Externally attached diagnostic text.
    pub message: Option<String>,
    pub draft: Option<DraftRecord>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            index_in_parent: 0,
            slot: Slot::Body,
            left: Pos::origin(),
            right: Pos::origin(),
            message: None,
            draft: None,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.left, self.right)
    }

    pub fn in_draft_mode(&self) -> bool {
        self.draft.is_some()
    }

    pub fn as_token(&self) -> Option<&Token> {
        match &self.kind {
            NodeKind::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_token_mut(&mut self) -> Option<&mut Token> {
        match &mut self.kind {
            NodeKind::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_empty_line(&self) -> bool {
        matches!(self.kind, NodeKind::EmptyLine { .. })
    }

    /// Whether this node is a hole token.
    pub fn is_hole(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Token(Token {
                kind: TokenKind::Hole { .. },
                ..
            })
        )
    }

    pub fn hole_type(&self) -> Option<HoleType> {
        match &self.kind {
            NodeKind::Token(Token {
                kind: TokenKind::Hole { expected },
                ..
            }) => Some(*expected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tokens_render_the_placeholder() {
        assert_eq!(Token::hole(HoleType::Boolean).render_text(), HOLE_TEXT);
        assert_eq!(Token::identifier().render_text(), HOLE_TEXT);
        let mut ident = Token::identifier();
        ident.text = "count".to_string();
        assert_eq!(ident.render_text(), "count");
    }

    #[test]
    fn literal_tokens_are_never_empty() {
        assert!(!Token::literal("if ").is_empty());
        assert!(!Token::reference("choice").is_empty());
        assert!(Token::hole(HoleType::Any).is_empty());
    }

    #[test]
    fn editable_capability_matches_kinds() {
        assert!(Token::identifier().is_text_editable());
        assert!(Token::assignment().is_text_editable());
        assert!(Token::editable("^.*$", "").is_text_editable());
        assert!(!Token::literal("print(").is_text_editable());
        assert!(!Token::hole(HoleType::Any).is_text_editable());
    }

    #[test]
    fn draft_state_and_record_travel_together() {
        let mut node = Node::new(NodeKind::EmptyLine { autocomplete: None });
        assert!(!node.in_draft_mode());
        node.draft = Some(DraftRecord {
            message: "missing import".to_string(),
            actions: vec![],
        });
        assert!(node.in_draft_mode());
    }
}
