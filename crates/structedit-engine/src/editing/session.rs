//! The editing session: the single entry point every edit flows through.
//!
//! A [`Session`] owns the tree, the grammar, the notification bus, and the
//! cursor. Callers apply a [`Cmd`] and get back a [`Patch`]: the text edits
//! the external surface must apply plus the new cursor state. All mutation
//! is synchronous and single-threaded; the tree is never observable in a
//! partially rebuilt state.

use crate::ast::node::{NodeId, NodeKind, Slot, Token, TokenKind, HOLE_TEXT};
use crate::ast::tree::{indent, Tree};
use crate::editing::build::{build_tree, indent_col, rebuild};
use crate::editing::context::{resolve_context, Context};
use crate::editing::events::{EventBus, Notification, NotifyKind};
use crate::editing::navigate;
use crate::editing::patch::{CursorState, Patch, TextEdit};
use crate::editing::validate::{
    imported_modules, validate_expression_insertion, validate_statement_insertion, InsertionResult,
};
use crate::pos::{Pos, Span};
use std::sync::Arc;
use structedit_grammar::{
    ConstructKind, DefId, FormatToken, Grammar, HoleType, IDENTIFIER_PATTERN,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown construct keyword `{0}`")]
    UnknownConstruct(String),

    #[error("nothing insertable at the cursor")]
    NoInsertionPoint,

    #[error("insertion rejected: {0}")]
    InvalidInsertion(String),

    #[error("nothing deletable at the cursor")]
    NothingToDelete,
}

/// One editing command from the external surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    SetCursor(Pos),
    SetSelection(Span),
    InsertConstruct { keyword: String },
    TypeChar(char),
    Backspace,
    NewLine,
    DeleteFocused,
    NavigateLeft,
    NavigateRight,
    NavigateUp,
    NavigateDown,
}

pub struct Session {
    tree: Tree,
    grammar: Arc<Grammar>,
    bus: EventBus,
    cursor: CursorState,
    version: u64,
    focused: Option<NodeId>,
    drafts: Vec<NodeId>,
}

impl Session {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        let mut tree = Tree::new();
        build_tree(&mut tree);
        Self {
            tree,
            grammar,
            bus: EventBus::new(),
            cursor: CursorState::Cursor(Pos::origin()),
            version: 0,
            focused: None,
            drafts: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn cursor(&self) -> CursorState {
        self.cursor
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn render(&self) -> String {
        self.tree.render()
    }

    /// Constructs still waiting on an unmet import.
    pub fn open_drafts(&self) -> &[NodeId] {
        &self.drafts
    }

    /// Subscription access for external observers.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn apply(&mut self, cmd: Cmd) -> Result<Patch, EngineError> {
        log::debug!("apply {cmd:?}");
        let edits = match cmd {
            Cmd::SetCursor(pos) => {
                self.cursor = CursorState::Cursor(pos);
                Vec::new()
            }
            Cmd::SetSelection(span) => {
                self.cursor = CursorState::Selection(span);
                Vec::new()
            }
            Cmd::NavigateLeft => {
                self.cursor = navigate::navigate_left(&self.tree, &self.grammar, &self.cursor);
                Vec::new()
            }
            Cmd::NavigateRight => {
                self.cursor = navigate::navigate_right(&self.tree, &self.grammar, &self.cursor);
                Vec::new()
            }
            Cmd::NavigateUp => {
                self.cursor = navigate::navigate_up(&self.tree, &self.grammar, &self.cursor);
                Vec::new()
            }
            Cmd::NavigateDown => {
                self.cursor = navigate::navigate_down(&self.tree, &self.grammar, &self.cursor);
                Vec::new()
            }
            Cmd::InsertConstruct { keyword } => self.insert_construct(&keyword)?,
            Cmd::TypeChar(c) => self.type_char(c)?,
            Cmd::Backspace => self.backspace()?,
            Cmd::NewLine => self.new_line()?,
            Cmd::DeleteFocused => self.delete_focused()?,
        };
        self.validate_imports();
        self.refresh_focus();
        self.drain_notifications();
        self.version += 1;
        Ok(Patch {
            edits,
            cursor: self.cursor,
            version: self.version,
        })
    }

    /// Validation verdict for every grammar construct at the current cursor,
    /// for toolbox-style callers.
    pub fn availability(&self) -> Vec<(DefId, InsertionResult)> {
        let ctx = self.context();
        let hole = self.hole_target(&ctx);
        let line = ctx
            .construct
            .filter(|c| self.tree.node(*c).is_empty_line());
        self.grammar
            .defs()
            .map(|(id, _)| {
                let verdict = if let Some(h) = hole {
                    validate_expression_insertion(&self.tree, &self.grammar, h, id)
                } else if let Some((parent, index)) =
                    line.and_then(|l| self.body_slot_of(l))
                {
                    validate_statement_insertion(&self.tree, &self.grammar, parent, index, id)
                } else {
                    InsertionResult::Invalid {
                        reason: "nothing insertable at the cursor".to_string(),
                    }
                };
                (id, verdict)
            })
            .collect()
    }

    /// Re-check every open draft against the imports now above it and close
    /// the satisfied ones. Runs after every command; calling it again with no
    /// change is a no-op.
    pub fn validate_imports(&mut self) {
        let drafts = std::mem::take(&mut self.drafts);
        for node in drafts {
            if self.tree.node(node).parent.is_none() {
                continue;
            }
            let Some(def_id) = self.tree.def_of(node) else {
                continue;
            };
            let Some(module) = self.grammar.def(def_id).requires_import.clone() else {
                self.tree.node_mut(node).draft = None;
                continue;
            };
            let line = self.tree.node(node).left.line;
            if imported_modules(&self.tree, &self.grammar, line)
                .iter()
                .any(|m| *m == module)
            {
                self.tree.node_mut(node).draft = None;
                self.tree.notify(node, NotifyKind::Change);
            } else {
                self.drafts.push(node);
            }
        }
    }

    // ---- commands --------------------------------------------------------

    fn insert_construct(&mut self, keyword: &str) -> Result<Vec<TextEdit>, EngineError> {
        let def_id = self
            .grammar
            .lookup(keyword)
            .ok_or_else(|| EngineError::UnknownConstruct(keyword.to_string()))?;
        let ctx = self.context();
        if let Some(hole) = self.hole_target(&ctx) {
            return self.fill_hole(hole, def_id);
        }
        let line = ctx
            .construct
            .filter(|c| self.tree.node(*c).is_empty_line())
            .ok_or(EngineError::NoInsertionPoint)?;
        self.insert_statement(line, def_id)
    }

    fn insert_statement(&mut self, line: NodeId, def_id: DefId) -> Result<Vec<TextEdit>, EngineError> {
        let (parent, index) = self.body_slot_of(line).ok_or(EngineError::NoInsertionPoint)?;
        let verdict = validate_statement_insertion(&self.tree, &self.grammar, parent, index, def_id);
        if let InsertionResult::Invalid { reason } = verdict {
            return Err(EngineError::InvalidInsertion(reason));
        }
        let old_span = self.tree.node(line).span();
        let stmt = self.tree.instantiate(&self.grammar, def_id);
        if let InsertionResult::DraftMode(record) = verdict {
            self.tree.node_mut(stmt).draft = Some(record);
            self.drafts.push(stmt);
        }
        self.tree.replace(parent, Slot::Body, index, stmt);
        rebuild(&mut self.tree, parent, Slot::Body, index);
        let text = self.tree.render_subtree(stmt);
        self.cursor = self
            .first_gap(stmt)
            .unwrap_or(CursorState::Cursor(self.tree.node(stmt).right));
        Ok(vec![TextEdit { span: old_span, text }])
    }

    fn fill_hole(&mut self, hole: NodeId, def_id: DefId) -> Result<Vec<TextEdit>, EngineError> {
        let verdict = validate_expression_insertion(&self.tree, &self.grammar, hole, def_id);
        if let InsertionResult::Invalid { reason } = verdict {
            return Err(EngineError::InvalidInsertion(reason));
        }
        let node = self.tree.node(hole);
        let (parent, index) = match node.parent {
            Some(p) => (p, node.index_in_parent),
            None => return Err(EngineError::NoInsertionPoint),
        };
        let old_span = node.span();
        let expr = self.tree.instantiate(&self.grammar, def_id);
        if let InsertionResult::DraftMode(record) = verdict {
            self.tree.node_mut(expr).draft = Some(record);
            self.drafts.push(expr);
        }
        self.tree.replace(parent, Slot::Tokens, index, expr);
        rebuild(&mut self.tree, parent, Slot::Tokens, index);
        let text = self.tree.render_subtree(expr);
        self.cursor = self
            .first_gap(expr)
            .unwrap_or(CursorState::Cursor(self.tree.node(expr).right));
        Ok(vec![TextEdit { span: old_span, text }])
    }

    fn type_char(&mut self, c: char) -> Result<Vec<TextEdit>, EngineError> {
        let ctx = self.context();
        let pos = self.cursor.focus();

        if let Some(token) = ctx.token {
            if self.tree.node(token).is_hole() {
                // Holes are filled through insertion, never typed into.
                self.tree.notify(token, NotifyKind::Fail);
                return Ok(Vec::new());
            }
            let text = self.token_text(token);
            let (new_text, caret) = if ctx.selected {
                (c.to_string(), 1)
            } else {
                let offset = self.token_offset(token, pos);
                (splice_char(&text, offset, c), offset + 1)
            };
            return Ok(self.set_token_text(token, new_text, caret));
        }

        if let Some(stmt) = ctx.construct {
            // The growth trigger typed at a compound's right edge.
            if let Some(compound) = self.compound_at(stmt, pos, Some(c)) {
                return Ok(self.grow(compound));
            }
            if self.tree.node(stmt).is_empty_line() {
                return self.autocomplete_char(stmt, c);
            }
        }

        if let Some(token) = ctx.token_to_left.filter(|t| self.editable(*t)) {
            let text = self.token_text(token);
            let offset = text.chars().count();
            let new_text = splice_char(&text, offset, c);
            return Ok(self.set_token_text(token, new_text, offset + 1));
        }
        if let Some(token) = ctx.token_to_right.filter(|t| self.editable(*t)) {
            let text = self.token_text(token);
            let new_text = splice_char(&text, 0, c);
            return Ok(self.set_token_text(token, new_text, 1));
        }

        if let Some(stmt) = ctx.construct {
            self.tree.notify(stmt, NotifyKind::Fail);
        }
        Ok(Vec::new())
    }

    fn backspace(&mut self) -> Result<Vec<TextEdit>, EngineError> {
        let ctx = self.context();
        let pos = self.cursor.focus();

        // Un-grow a compound whose last cycle is still unfilled.
        if let Some(stmt) = ctx.construct {
            if let Some(compound) = self.compound_at(stmt, pos, None) {
                let old_span = self.tree.node(compound).span();
                if self.tree.shrink_compound(compound) {
                    rebuild(&mut self.tree, compound, Slot::Tokens, 0);
                    let text = self.tree.render_subtree(compound);
                    self.cursor = CursorState::Cursor(self.tree.node(compound).right);
                    return Ok(vec![TextEdit { span: old_span, text }]);
                }
            }
        }

        let target = ctx
            .token
            .filter(|t| self.editable(*t))
            .or_else(|| ctx.token_to_left.filter(|t| self.editable(*t)));
        if let Some(token) = target {
            let text = self.token_text(token);
            let offset = self.token_offset(token, pos);
            if offset == 0 || text.is_empty() {
                return Ok(Vec::new());
            }
            let mut chars: Vec<char> = text.chars().collect();
            chars.remove((offset - 1).min(chars.len() - 1));
            let new_text: String = chars.into_iter().collect();

            if new_text.is_empty() && self.is_autocomplete(token) {
                return Ok(self.abort_autocomplete(token));
            }
            return Ok(self.set_token_text(token, new_text, offset - 1));
        }

        // At a line start: delete the statement, or splice out a blank line.
        if let Some(stmt) = ctx.construct {
            if self.tree.node(stmt).left == pos {
                if self.tree.node(stmt).is_empty_line() {
                    return Ok(self.remove_blank_line(stmt));
                }
                return self.delete_statement(stmt);
            }
        }
        Ok(Vec::new())
    }

    fn new_line(&mut self) -> Result<Vec<TextEdit>, EngineError> {
        let ctx = self.context();
        let stmt = ctx.construct.ok_or(EngineError::NoInsertionPoint)?;
        let (parent, index) = self.body_slot_of(stmt).ok_or(EngineError::NoInsertionPoint)?;
        let at = self.tree.node(stmt).right;
        let line = self.tree.alloc(NodeKind::EmptyLine { autocomplete: None });
        self.tree.insert_body_child(parent, index + 1, line);
        rebuild(&mut self.tree, parent, Slot::Body, index + 1);
        let left = self.tree.node(line).left;
        self.cursor = CursorState::Cursor(left);
        Ok(vec![TextEdit {
            span: Span::collapsed(at),
            text: format!("\n{}", indent(self.tree.indent_level(line))),
        }])
    }

    fn delete_focused(&mut self) -> Result<Vec<TextEdit>, EngineError> {
        let ctx = self.context();
        if ctx.selected {
            if let Some(expr) = ctx.expression {
                return self.delete_expression(expr);
            }
            if let Some(token) = ctx.token {
                let text = self.token_text(token);
                if self.editable(token) && !text.is_empty() {
                    return Ok(self.set_token_text(token, String::new(), 0));
                }
                return Ok(Vec::new());
            }
        }
        if let Some(stmt) = ctx.construct {
            if !self.tree.node(stmt).is_empty_line() {
                return self.delete_statement(stmt);
            }
        }
        Err(EngineError::NothingToDelete)
    }

    // ---- edit mechanics --------------------------------------------------

    /// Replace a statement with a blank line, refusing while user content
    /// survives anywhere in it.
    fn delete_statement(&mut self, stmt: NodeId) -> Result<Vec<TextEdit>, EngineError> {
        if !self.tree.can_delete_statement(stmt) {
            self.tree.notify(stmt, NotifyKind::Fail);
            return Ok(Vec::new());
        }
        let (parent, index) = self.body_slot_of(stmt).ok_or(EngineError::NothingToDelete)?;
        let old_span = self.tree.node(stmt).span();
        let line = self.tree.alloc(NodeKind::EmptyLine { autocomplete: None });
        self.tree.replace(parent, Slot::Body, index, line);
        rebuild(&mut self.tree, parent, Slot::Body, index);
        self.cursor = CursorState::Cursor(self.tree.node(line).left);
        Ok(vec![TextEdit {
            span: old_span,
            text: String::new(),
        }])
    }

    /// Replace an expression with a hole of the type its slot expects.
    fn delete_expression(&mut self, expr: NodeId) -> Result<Vec<TextEdit>, EngineError> {
        let node = self.tree.node(expr);
        let (parent, index) = match node.parent {
            Some(p) => (p, node.index_in_parent),
            None => return Err(EngineError::NothingToDelete),
        };
        let old_span = node.span();
        let expected = self.expected_hole_type(parent, index);
        let hole = self.tree.alloc(NodeKind::Token(Token::hole(expected)));
        self.tree.replace(parent, Slot::Tokens, index, hole);
        rebuild(&mut self.tree, parent, Slot::Tokens, index);
        self.cursor = CursorState::Selection(self.tree.node(hole).span());
        Ok(vec![TextEdit {
            span: old_span,
            text: HOLE_TEXT.to_string(),
        }])
    }

    fn remove_blank_line(&mut self, line: NodeId) -> Vec<TextEdit> {
        let Some((parent, index)) = self.body_slot_of(line) else {
            return Vec::new();
        };
        // A body always keeps at least one line.
        let body = self.tree.children(parent, Slot::Body);
        if body.len() <= 1 {
            return Vec::new();
        }
        let span = if index > 0 {
            let prev = body[index - 1];
            Span::new(self.tree.node(prev).right, self.tree.node(line).right)
        } else {
            let next = body[index + 1];
            Span::new(self.tree.node(line).left, self.tree.node(next).left)
        };
        self.tree.remove_body_child(parent, index);
        rebuild(&mut self.tree, parent, Slot::Body, index);
        self.cursor = CursorState::Cursor(span.start);
        vec![TextEdit {
            span,
            text: String::new(),
        }]
    }

    /// Apply a text change to an editable token. A pattern mismatch leaves
    /// the token unchanged and fires `Fail`. `caret` is the character offset
    /// the cursor lands on afterwards.
    fn set_token_text(&mut self, token: NodeId, new_text: String, caret: usize) -> Vec<TextEdit> {
        let Some(tkn) = self.tree.node(token).as_token().cloned() else {
            return Vec::new();
        };
        if !self.pattern_allows(&tkn.kind, &new_text) {
            self.tree.notify(token, NotifyKind::Fail);
            return Vec::new();
        }
        let old_span = self.tree.node(token).span();

        if matches!(tkn.kind, TokenKind::Assignment) {
            let owner = self.tree.nearest_scope_owner(token);
            if let Some(scope) = self.tree.scope_mut(owner) {
                if !tkn.text.is_empty() {
                    scope.unregister(&tkn.text);
                }
                if !new_text.is_empty() {
                    scope.register(&new_text);
                }
            }
        }

        if let Some(t) = self.tree.node_mut(token).as_token_mut() {
            t.text = new_text.clone();
        }
        self.tree.notify(token, NotifyKind::Change);
        self.rebuild_from(token);

        let text = self.tree.render_inline(token, self.tree.indent_level(token));
        self.cursor = if new_text.is_empty() {
            CursorState::Selection(self.tree.node(token).span())
        } else {
            CursorState::Cursor(self.pos_at_offset(token, caret))
        };
        vec![TextEdit {
            span: old_span,
            text,
        }]
    }

    /// Accumulate one character of keyword autocompletion on a blank line,
    /// committing the construct on an exact match.
    fn autocomplete_char(&mut self, line: NodeId, c: char) -> Result<Vec<TextEdit>, EngineError> {
        let existing = match self.tree.node(line).kind {
            NodeKind::EmptyLine { autocomplete } => autocomplete,
            _ => return Ok(Vec::new()),
        };
        let mut text = existing.map(|t| self.token_text(t)).unwrap_or_default();
        text.push(c);

        let exact = self
            .grammar
            .lookup(&text)
            .filter(|d| self.grammar.def(*d).kind == ConstructKind::Statement);
        if let Some(def_id) = exact {
            return match self.insert_statement(line, def_id) {
                Err(EngineError::InvalidInsertion(_)) => {
                    self.tree.notify(line, NotifyKind::Fail);
                    Ok(Vec::new())
                }
                other => other,
            };
        }

        let is_prefix = self.grammar.defs().any(|(_, d)| {
            d.kind == ConstructKind::Statement && d.keyword.starts_with(&text)
        });
        if !is_prefix {
            self.tree.notify(line, NotifyKind::Fail);
            return Ok(Vec::new());
        }

        let token = match existing {
            Some(t) => t,
            None => {
                let t = self.tree.alloc(NodeKind::Token(Token::autocomplete()));
                self.tree.set_autocomplete(line, Some(t));
                t
            }
        };
        let caret = text.chars().count();
        Ok(self.set_token_text(token, text, caret))
    }

    fn abort_autocomplete(&mut self, token: NodeId) -> Vec<TextEdit> {
        let Some(line) = self.tree.node(token).parent else {
            return Vec::new();
        };
        let old_span = self.tree.node(token).span();
        self.tree.set_autocomplete(line, None);
        if let Some((parent, index)) = self.body_slot_of(line) {
            rebuild(&mut self.tree, parent, Slot::Body, index);
        }
        self.cursor = CursorState::Cursor(self.tree.node(line).left);
        vec![TextEdit {
            span: old_span,
            text: String::new(),
        }]
    }

    fn grow(&mut self, compound: NodeId) -> Vec<TextEdit> {
        let old_span = self.tree.node(compound).span();
        let grown = self.tree.grow_compound(compound);
        let from = self.tree.tokens_of(compound).len() - grown.len();
        rebuild(&mut self.tree, compound, Slot::Tokens, from);
        let text = self.tree.render_subtree(compound);
        self.cursor = grown
            .iter()
            .find_map(|t| {
                let node = self.tree.node(*t);
                node.as_token()
                    .filter(|k| k.is_empty())
                    .map(|_| CursorState::Selection(node.span()))
            })
            .unwrap_or(CursorState::Cursor(self.tree.node(compound).right));
        vec![TextEdit {
            span: old_span,
            text,
        }]
    }

    // ---- bookkeeping -----------------------------------------------------

    fn refresh_focus(&mut self) {
        let ctx = self.context();
        let new = ctx.token.or(ctx.expression).or(ctx.construct);
        if let Some(old) = self.focused {
            if Some(old) != new {
                self.bus.dispatch(&Notification {
                    node: old,
                    kind: NotifyKind::FocusOff,
                });
            }
        }
        self.focused = new;
    }

    fn drain_notifications(&mut self) {
        for n in self.tree.take_notifications() {
            self.bus.dispatch(&n);
        }
    }

    // ---- queries ---------------------------------------------------------

    fn context(&self) -> Context {
        resolve_context(&self.tree, &self.grammar, &self.cursor)
    }

    fn hole_target(&self, ctx: &Context) -> Option<NodeId> {
        [ctx.token, ctx.token_to_right, ctx.token_to_left]
            .into_iter()
            .flatten()
            .find(|t| self.tree.node(*t).is_hole())
    }

    fn body_slot_of(&self, stmt: NodeId) -> Option<(NodeId, usize)> {
        let node = self.tree.node(stmt);
        (node.slot == Slot::Body)
            .then_some(())
            .and(node.parent)
            .map(|p| (p, node.index_in_parent))
    }

    fn editable(&self, token: NodeId) -> bool {
        self.tree
            .node(token)
            .as_token()
            .is_some_and(|t| t.is_text_editable())
    }

    fn is_autocomplete(&self, token: NodeId) -> bool {
        self.tree
            .node(token)
            .as_token()
            .is_some_and(|t| matches!(t.kind, TokenKind::Autocomplete))
    }

    /// Character offset of `pos` within a token's text, stepping over the
    /// text the way the build engine lays it out so positions on
    /// continuation lines of embedded newlines land on the right character.
    fn token_offset(&self, token: NodeId, pos: Pos) -> usize {
        let text = self.token_text(token);
        let level = self.tree.indent_level(token);
        let mut cur = self.tree.node(token).left;
        for (i, c) in text.chars().enumerate() {
            if cur == pos {
                return i;
            }
            cur = if c == '\n' {
                Pos::new(cur.line + 1, indent_col(level))
            } else {
                cur.with_col(cur.col + 1)
            };
        }
        text.chars().count()
    }

    /// Position the caret lands on `caret` characters into a token's text.
    fn pos_at_offset(&self, token: NodeId, caret: usize) -> Pos {
        let text = self.token_text(token);
        let level = self.tree.indent_level(token);
        let mut cur = self.tree.node(token).left;
        for c in text.chars().take(caret) {
            cur = if c == '\n' {
                Pos::new(cur.line + 1, indent_col(level))
            } else {
                cur.with_col(cur.col + 1)
            };
        }
        cur
    }

    fn token_text(&self, token: NodeId) -> String {
        self.tree
            .node(token)
            .as_token()
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    fn pattern_allows(&self, kind: &TokenKind, text: &str) -> bool {
        if text.is_empty() {
            return true;
        }
        let pattern = match kind {
            TokenKind::Editable { pattern } => pattern.as_str(),
            TokenKind::Identifier | TokenKind::Assignment => IDENTIFIER_PATTERN,
            TokenKind::Autocomplete => return true,
            _ => return false,
        };
        self.grammar.pattern(pattern).is_match(text)
    }

    /// Selection of the first unfilled leaf in `id`, in document order.
    fn first_gap(&self, id: NodeId) -> Option<CursorState> {
        self.tree.leaf_tokens(id).into_iter().find_map(|t| {
            let node = self.tree.node(t);
            node.as_token()
                .filter(|tkn| tkn.is_empty())
                .map(|_| CursorState::Selection(node.span()))
        })
    }

    /// Compound whose right boundary sits at `pos`. With a trigger given, it
    /// must also be the compound's growth key.
    fn compound_at(&self, stmt: NodeId, pos: Pos, trigger: Option<char>) -> Option<NodeId> {
        let mut stack = vec![stmt];
        while let Some(cur) = stack.pop() {
            if let NodeKind::Compound(c) = &self.tree.node(cur).kind {
                if self.tree.node(cur).right == pos && trigger.is_none_or(|t| t == c.trigger) {
                    return Some(cur);
                }
            }
            stack.extend(self.tree.tokens_of(cur).iter().copied());
        }
        None
    }

    /// The hole type a token slot of `parent` expects, recovered from the
    /// grammar format so deleted expressions leave a correctly typed hole.
    fn expected_hole_type(&self, parent: NodeId, index: usize) -> HoleType {
        let def = match self.tree.def_of(parent) {
            Some(d) => self.grammar.def(d),
            None => return HoleType::Any,
        };
        match &self.tree.node(parent).kind {
            NodeKind::Construct(_) => {
                let slots: Vec<&FormatToken> = def
                    .format
                    .iter()
                    .filter(|f| !matches!(f, FormatToken::Body))
                    .collect();
                match slots.get(index) {
                    Some(FormatToken::Hole { expected }) => *expected,
                    _ => HoleType::Any,
                }
            }
            NodeKind::Compound(c) => match c.cycle.get(index % c.cycle.len().max(1)) {
                Some(FormatToken::Hole { expected }) => *expected,
                _ => HoleType::Any,
            },
            _ => HoleType::Any,
        }
    }

    fn rebuild_from(&mut self, token: NodeId) {
        let node = self.tree.node(token);
        let Some(parent) = node.parent else { return };
        let (slot, index) = (node.slot, node.index_in_parent);
        if self.tree.node(parent).is_empty_line() {
            // Autocomplete token: re-lay out the whole blank line.
            if let Some((gp, idx)) = self.body_slot_of(parent) {
                rebuild(&mut self.tree, gp, Slot::Body, idx);
            }
        } else {
            rebuild(&mut self.tree, parent, slot, index);
        }
    }
}

fn splice_char(text: &str, offset: usize, c: char) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    chars.insert(offset.min(chars.len()), c);
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session() -> Session {
        Session::new(Arc::new(Grammar::python_subset()))
    }

    fn insert(s: &mut Session, keyword: &str) -> Patch {
        s.apply(Cmd::InsertConstruct {
            keyword: keyword.to_string(),
        })
        .unwrap()
    }

    fn type_str(s: &mut Session, text: &str) {
        for c in text.chars() {
            s.apply(Cmd::TypeChar(c)).unwrap();
        }
    }

    #[test]
    fn insert_statement_emits_edit_and_selects_first_hole() {
        let mut s = session();
        let patch = insert(&mut s, "if");
        assert_eq!(patch.edits.len(), 1);
        assert_eq!(patch.edits[0].text, "if ---:\n    ");
        assert_eq!(patch.edits[0].span, Span::collapsed(Pos::new(1, 1)));
        assert_eq!(
            patch.cursor,
            CursorState::Selection(Span::new(Pos::new(1, 4), Pos::new(1, 7)))
        );
        assert_eq!(s.render(), "if ---:\n    ");
    }

    #[test]
    fn unknown_keyword_is_an_error() {
        let mut s = session();
        let err = s
            .apply(Cmd::InsertConstruct {
                keyword: "lambda".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownConstruct(k) if k == "lambda"));
    }

    #[test]
    fn invalid_placement_is_rejected_without_mutation() {
        let mut s = session();
        let before = s.render();
        let err = s
            .apply(Cmd::InsertConstruct {
                keyword: "elif".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInsertion(_)));
        assert_eq!(s.render(), before);
    }

    #[test]
    fn hole_fill_replaces_the_placeholder() {
        let mut s = session();
        insert(&mut s, "if");
        // Cursor now selects the condition hole.
        let patch = insert(&mut s, "true");
        assert_eq!(patch.edits[0].span, Span::new(Pos::new(1, 4), Pos::new(1, 7)));
        assert_eq!(patch.edits[0].text, "True");
        assert_eq!(s.render(), "if True:\n    ");
    }

    #[test]
    fn typing_into_assignment_registers_the_binding() {
        let mut s = session();
        insert(&mut s, "assign");
        // First gap is the assignment target.
        type_str(&mut s, "x");
        assert_eq!(s.render(), "x = ---");
        let stmt = s.tree().body_of(s.tree().root()).unwrap()[0];
        assert!(s.tree().identifier_in_scope(stmt, "x"));
    }

    #[test]
    fn rejected_edit_fires_fail_and_changes_nothing() {
        let mut s = session();
        insert(&mut s, "assign");
        let stmt = s.tree().body_of(s.tree().root()).unwrap()[0];
        let target = s.tree().tokens_of(stmt)[0];

        let failed = Rc::new(RefCell::new(false));
        let f = failed.clone();
        s.bus_mut().subscribe(target, NotifyKind::Fail, move |_| {
            *f.borrow_mut() = true;
            crate::editing::events::Subscription::Keep
        });

        // An identifier may not start with a digit.
        let patch = s.apply(Cmd::TypeChar('1')).unwrap();
        assert!(patch.edits.is_empty());
        assert!(*failed.borrow());
        assert_eq!(s.render(), "--- = ---");
    }

    #[test]
    fn autocomplete_commits_on_exact_keyword() {
        let mut s = session();
        let patch = s.apply(Cmd::TypeChar('i')).unwrap();
        assert_eq!(patch.edits[0].text, "i");
        assert_eq!(s.render(), "i");

        let patch = s.apply(Cmd::TypeChar('f')).unwrap();
        assert_eq!(patch.edits[0].text, "if ---:\n    ");
        // The edit replaces the accumulated prefix.
        assert_eq!(patch.edits[0].span, Span::new(Pos::new(1, 1), Pos::new(1, 2)));
        assert_eq!(s.render(), "if ---:\n    ");
    }

    #[test]
    fn autocomplete_rejects_non_prefix_characters() {
        let mut s = session();
        let patch = s.apply(Cmd::TypeChar('z')).unwrap();
        assert!(patch.edits.is_empty());
        assert_eq!(s.render(), "");
    }

    #[test]
    fn backspace_aborts_an_autocomplete_in_progress() {
        let mut s = session();
        s.apply(Cmd::TypeChar('i')).unwrap();
        let patch = s.apply(Cmd::Backspace).unwrap();
        assert_eq!(patch.edits[0].text, "");
        assert_eq!(s.render(), "");
        let line = s.tree().body_of(s.tree().root()).unwrap()[0];
        assert!(matches!(
            s.tree().node(line).kind,
            NodeKind::EmptyLine { autocomplete: None }
        ));
    }

    #[test]
    fn missing_import_opens_a_draft_then_an_import_closes_it() {
        let mut s = session();
        s.apply(Cmd::NewLine).unwrap();
        s.apply(Cmd::SetCursor(Pos::new(2, 1))).unwrap();
        insert(&mut s, "print");
        insert(&mut s, "choice");
        assert_eq!(s.open_drafts().len(), 1);
        let drafted = s.open_drafts()[0];
        assert!(s.tree().node(drafted).in_draft_mode());

        s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
        insert(&mut s, "import");
        type_str(&mut s, "random");
        assert_eq!(s.render(), "import random\nprint(random.choice(---))");
        assert!(s.open_drafts().is_empty());
        assert!(!s.tree().node(drafted).in_draft_mode());
    }

    #[test]
    fn compound_grows_on_trigger_and_shrinks_on_backspace() {
        let mut s = session();
        insert(&mut s, "print");
        insert(&mut s, "list");
        insert(&mut s, "number");
        type_str(&mut s, "4");
        assert_eq!(s.render(), "print([4])");

        // Comma at the compound's right edge appends a fresh element slot.
        s.apply(Cmd::SetCursor(Pos::new(1, 9))).unwrap();
        let patch = s.apply(Cmd::TypeChar(',')).unwrap();
        assert_eq!(s.render(), "print([4, ---])");
        assert_eq!(
            patch.cursor,
            CursorState::Selection(Span::new(Pos::new(1, 11), Pos::new(1, 14)))
        );

        s.apply(Cmd::SetCursor(Pos::new(1, 14))).unwrap();
        s.apply(Cmd::Backspace).unwrap();
        assert_eq!(s.render(), "print([4])");
    }

    #[test]
    fn delete_focused_expression_leaves_a_typed_hole() {
        let mut s = session();
        insert(&mut s, "if");
        insert(&mut s, "true");
        s.apply(Cmd::SetSelection(Span::new(Pos::new(1, 4), Pos::new(1, 8))))
            .unwrap();
        let patch = s.apply(Cmd::DeleteFocused).unwrap();
        assert_eq!(patch.edits[0].text, "---");
        assert_eq!(s.render(), "if ---:\n    ");

        let if_stmt = s.tree().body_of(s.tree().root()).unwrap()[0];
        let hole = s.tree().tokens_of(if_stmt)[1];
        assert_eq!(
            s.tree().node(hole).hole_type(),
            Some(structedit_grammar::HoleType::Boolean)
        );
    }

    #[test]
    fn statement_with_content_refuses_deletion() {
        let mut s = session();
        insert(&mut s, "if");
        insert(&mut s, "true");
        s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
        let patch = s.apply(Cmd::DeleteFocused).unwrap();
        assert!(patch.edits.is_empty());
        assert_eq!(s.render(), "if True:\n    ");
    }

    #[test]
    fn empty_statement_deletes_to_a_blank_line() {
        let mut s = session();
        insert(&mut s, "print");
        s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
        let patch = s.apply(Cmd::DeleteFocused).unwrap();
        assert_eq!(patch.edits[0].span, Span::new(Pos::new(1, 1), Pos::new(1, 11)));
        assert_eq!(patch.edits[0].text, "");
        assert_eq!(s.render(), "");
    }

    #[test]
    fn selecting_a_whole_statement_deletes_it_as_a_statement() {
        let mut s = session();
        insert(&mut s, "if");
        let if_stmt = s.tree().body_of(s.tree().root()).unwrap()[0];
        let span = s.tree().node(if_stmt).span();
        s.apply(Cmd::SetSelection(span)).unwrap();
        let patch = s.apply(Cmd::DeleteFocused).unwrap();
        assert_eq!(patch.edits[0].text, "");
        assert_eq!(s.render(), "");

        // A filled statement refuses under the same selection.
        let mut s = session();
        insert(&mut s, "if");
        insert(&mut s, "true");
        let if_stmt = s.tree().body_of(s.tree().root()).unwrap()[0];
        let span = s.tree().node(if_stmt).span();
        s.apply(Cmd::SetSelection(span)).unwrap();
        let patch = s.apply(Cmd::DeleteFocused).unwrap();
        assert!(patch.edits.is_empty());
        assert_eq!(s.render(), "if True:\n    ");
    }

    #[test]
    fn editing_inside_a_multiline_token_targets_the_right_character() {
        let mut s = session();
        insert(&mut s, "print");
        insert(&mut s, "text");
        type_str(&mut s, "ab");
        s.apply(Cmd::TypeChar('\n')).unwrap();
        type_str(&mut s, "cd");
        assert_eq!(s.render(), "print(\"ab\ncd\")");

        // Cursor between 'c' and 'd' on the continuation line.
        s.apply(Cmd::SetCursor(Pos::new(2, 2))).unwrap();
        let patch = s.apply(Cmd::TypeChar('x')).unwrap();
        assert_eq!(s.render(), "print(\"ab\ncxd\")");
        assert_eq!(patch.cursor, CursorState::Cursor(Pos::new(2, 3)));

        s.apply(Cmd::Backspace).unwrap();
        assert_eq!(s.render(), "print(\"ab\ncd\")");
    }

    #[test]
    fn availability_reflects_the_cursor_context() {
        let mut s = session();
        let g = Arc::new(Grammar::python_subset());
        let at_blank = s.availability();
        let verdict = |list: &[(DefId, InsertionResult)], kw: &str| {
            list.iter()
                .find(|(id, _)| g.def(*id).keyword == kw)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(verdict(&at_blank, "if"), InsertionResult::Valid);
        assert!(matches!(
            verdict(&at_blank, "elif"),
            InsertionResult::Invalid { .. }
        ));
        assert!(matches!(
            verdict(&at_blank, "true"),
            InsertionResult::Invalid { .. }
        ));

        insert(&mut s, "if");
        let at_hole = s.availability();
        assert_eq!(verdict(&at_hole, "true"), InsertionResult::Valid);
        assert!(matches!(
            verdict(&at_hole, "print"),
            InsertionResult::Invalid { .. }
        ));
    }

    #[test]
    fn version_increments_on_every_command() {
        let mut s = session();
        let p1 = s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
        let p2 = s.apply(Cmd::NavigateRight).unwrap();
        assert_eq!(p2.version, p1.version + 1);
    }
}
