//! Cursor-to-tree resolution.
//!
//! Given a cursor position or selection reported by the external surface,
//! produce a [`Context`] describing what is focused: the token under or
//! beside the cursor, the enclosing expression, and the statement owning the
//! line. Resolution is a pure read; navigation and validation both build on
//! it and never mutate the tree here.

use crate::ast::node::{NodeId, NodeKind};
use crate::ast::tree::Tree;
use crate::editing::patch::CursorState;
use crate::pos::Pos;
use structedit_grammar::{ConstructKind, Grammar};

/// Resolved description of the current focus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    /// Statement owning the focused line.
    pub construct: Option<NodeId>,
    /// Token the cursor is strictly inside, or the exactly-selected leaf.
    pub token: Option<NodeId>,
    /// Leaf ending exactly at the cursor.
    pub token_to_left: Option<NodeId>,
    /// Leaf starting exactly at the cursor.
    pub token_to_right: Option<NodeId>,
    /// Expression enclosing `token`, or the exactly-selected expression.
    pub expression: Option<NodeId>,
    /// Outermost expression ending exactly at the cursor.
    pub expression_to_left: Option<NodeId>,
    /// Outermost expression starting exactly at the cursor.
    pub expression_to_right: Option<NodeId>,
    /// Whether the focus is an exact-boundary selection.
    pub selected: bool,
}

/// Map a cursor or selection onto the tree.
pub fn resolve_context(tree: &Tree, grammar: &Grammar, cursor: &CursorState) -> Context {
    match cursor {
        CursorState::Selection(span) if !span.is_collapsed() => {
            resolve_selection(tree, span.start, span.end)
        }
        CursorState::Selection(span) => resolve_cursor(tree, grammar, span.start),
        CursorState::Cursor(pos) => resolve_cursor(tree, grammar, *pos),
    }
}

fn resolve_selection(tree: &Tree, start: Pos, end: Pos) -> Context {
    let mut ctx = Context::default();
    let Some(stmt) = tree.statement_at_line(start.line) else {
        return ctx;
    };
    ctx.construct = Some(stmt);

    // Only exact boundary matches resolve; partial overlaps don't.
    let mut stack = vec![stmt];
    while let Some(cur) = stack.pop() {
        let node = tree.node(cur);
        if node.left == start && node.right == end {
            ctx.selected = true;
            if node.kind.is_token() {
                ctx.token = Some(cur);
            } else if node.slot == crate::ast::node::Slot::Body {
                // A whole selected statement is the line construct itself,
                // never an expression.
                ctx.construct = Some(cur);
            } else {
                ctx.expression = Some(cur);
            }
            return ctx;
        }
        stack.extend(tree.tokens_of(cur).iter().copied());
        if let NodeKind::EmptyLine {
            autocomplete: Some(tkn),
        } = node.kind
        {
            stack.push(tkn);
        }
    }
    ctx
}

fn resolve_cursor(tree: &Tree, grammar: &Grammar, pos: Pos) -> Context {
    let mut ctx = Context::default();
    let Some(stmt) = tree.statement_at_line(pos.line) else {
        return ctx;
    };
    ctx.construct = Some(stmt);

    let leaves = tree.leaf_tokens(stmt);
    for leaf in &leaves {
        let node = tree.node(*leaf);
        if node.left < pos && pos < node.right {
            // Strictly inside: mid-token-text edits target this token.
            ctx.token = Some(*leaf);
            ctx.expression = enclosing_expression(tree, grammar, *leaf);
            return ctx;
        }
    }

    // On a boundary: the context straddles it.
    ctx.token_to_right = leaves
        .iter()
        .copied()
        .find(|l| tree.node(*l).left == pos);
    ctx.token_to_left = leaves
        .iter()
        .copied()
        .find(|l| tree.node(*l).right == pos);
    ctx.expression_to_right = ctx
        .token_to_right
        .and_then(|t| outermost_expression_at(tree, grammar, t, pos, Side::Left));
    ctx.expression_to_left = ctx
        .token_to_left
        .and_then(|t| outermost_expression_at(tree, grammar, t, pos, Side::Right));
    ctx
}

/// Nearest enclosing expression-kind construct, stopping at the statement.
pub fn enclosing_expression(tree: &Tree, grammar: &Grammar, id: NodeId) -> Option<NodeId> {
    let mut cur = tree.node(id).parent;
    while let Some(node) = cur {
        if is_expression(tree, grammar, node) {
            return Some(node);
        }
        if tree.node(node).slot == crate::ast::node::Slot::Body {
            return None;
        }
        cur = tree.node(node).parent;
    }
    None
}

fn is_expression(tree: &Tree, grammar: &Grammar, id: NodeId) -> bool {
    tree.def_of(id)
        .is_some_and(|d| grammar.def(d).kind == ConstructKind::Expression)
        && matches!(tree.node(id).kind, NodeKind::Construct(_))
}

enum Side {
    Left,
    Right,
}

/// Walk outward from `leaf` collecting expressions whose boundary sits
/// exactly at `pos`; return the outermost one.
fn outermost_expression_at(
    tree: &Tree,
    grammar: &Grammar,
    leaf: NodeId,
    pos: Pos,
    side: Side,
) -> Option<NodeId> {
    let mut found = None;
    let mut cur = tree.node(leaf).parent;
    while let Some(node) = cur {
        if is_expression(tree, grammar, node) {
            let bound = match side {
                Side::Left => tree.node(node).left,
                Side::Right => tree.node(node).right,
            };
            if bound == pos {
                found = Some(node);
            }
        }
        if tree.node(node).slot == crate::ast::node::Slot::Body {
            break;
        }
        cur = tree.node(node).parent;
    }
    found
}
