//! Cursor movement in terms of context-resolution primitives.
//!
//! Horizontal movement treats non-editable tokens as atomic (jump over,
//! never enter) and holes as stop targets (select, never pass through).
//! Vertical movement maps to the nearest statement on the target line and
//! clamps to its line bounds.

use crate::ast::node::{NodeId, TokenKind};
use crate::ast::tree::Tree;
use crate::editing::context::resolve_context;
use crate::editing::patch::CursorState;
use crate::pos::Pos;
use structedit_grammar::Grammar;

pub fn navigate_right(tree: &Tree, grammar: &Grammar, cursor: &CursorState) -> CursorState {
    let pos = match cursor {
        CursorState::Selection(span) if !span.is_collapsed() => {
            return CursorState::Cursor(span.end);
        }
        other => other.focus(),
    };
    let ctx = resolve_context(tree, grammar, &CursorState::Cursor(pos));

    if let Some(token) = ctx.token {
        // Inside editable text: move one column, clamping to the boundary.
        let right = tree.node(token).right;
        return CursorState::Cursor(pos.with_col((pos.col + 1).min(right.col)));
    }

    match ctx.token_to_right {
        Some(t) => step_onto(tree, t, Direction::Right),
        None => match tree.statement_at_line(pos.line + 1) {
            Some(next) => CursorState::Cursor(tree.node(next).left),
            None => CursorState::Cursor(pos),
        },
    }
}

pub fn navigate_left(tree: &Tree, grammar: &Grammar, cursor: &CursorState) -> CursorState {
    let pos = match cursor {
        CursorState::Selection(span) if !span.is_collapsed() => {
            return CursorState::Cursor(span.start);
        }
        other => other.focus(),
    };
    let ctx = resolve_context(tree, grammar, &CursorState::Cursor(pos));

    if let Some(token) = ctx.token {
        let left = tree.node(token).left;
        return CursorState::Cursor(pos.with_col(pos.col.saturating_sub(1).max(left.col)));
    }

    match ctx.token_to_left {
        Some(t) => step_onto(tree, t, Direction::Left),
        None => {
            if pos.line == 1 {
                return CursorState::Cursor(pos);
            }
            match tree.statement_at_line(pos.line - 1) {
                Some(prev) => CursorState::Cursor(line_end(tree, prev, pos.line - 1)),
                None => CursorState::Cursor(pos),
            }
        }
    }
}

pub fn navigate_up(tree: &Tree, grammar: &Grammar, cursor: &CursorState) -> CursorState {
    vertical(tree, grammar, cursor, -1)
}

pub fn navigate_down(tree: &Tree, grammar: &Grammar, cursor: &CursorState) -> CursorState {
    vertical(tree, grammar, cursor, 1)
}

fn vertical(tree: &Tree, _grammar: &Grammar, cursor: &CursorState, delta: i64) -> CursorState {
    let pos = cursor.focus();
    let target = pos.line as i64 + delta;
    if target < 1 {
        return CursorState::Cursor(pos);
    }
    let target = target as usize;
    match tree.statement_at_line(target) {
        Some(stmt) => {
            let start = tree.node(stmt).left;
            let end = line_end(tree, stmt, target);
            CursorState::Cursor(Pos::new(target, pos.col.clamp(start.col, end.col)))
        }
        None => CursorState::Cursor(pos),
    }
}

enum Direction {
    Left,
    Right,
}

/// Landing rules for a horizontal step onto `token`.
fn step_onto(tree: &Tree, token: NodeId, dir: Direction) -> CursorState {
    let node = tree.node(token);
    let Some(tkn) = node.as_token() else {
        return CursorState::Cursor(node.left);
    };
    if tkn.is_empty() {
        // Holes are stop targets: select, don't pass through.
        return CursorState::Selection(node.span());
    }
    match (&tkn.kind, dir) {
        // Atomic skip over fixed text.
        (TokenKind::NonEditable | TokenKind::Reference, Direction::Right) => {
            CursorState::Cursor(node.right)
        }
        (TokenKind::NonEditable | TokenKind::Reference, Direction::Left) => {
            CursorState::Cursor(node.left)
        }
        // Enter editable text one column at a time.
        (_, Direction::Right) => CursorState::Cursor(node.left.with_col(node.left.col + 1)),
        (_, Direction::Left) => CursorState::Cursor(node.right.with_col(node.right.col - 1)),
    }
}

/// End of the part of `stmt` that sits on `line`.
fn line_end(tree: &Tree, stmt: NodeId, line: usize) -> Pos {
    let mut end = tree.node(stmt).left;
    for leaf in tree.leaf_tokens(stmt) {
        let right = tree.node(leaf).right;
        if right.line == line && right > end {
            end = right;
        }
    }
    if end.line != line {
        end = Pos::new(line, tree.node(stmt).left.col);
    }
    end
}

/// Whether the cursor sits at the first column of its statement.
pub fn on_beginning_of_line(tree: &Tree, pos: Pos) -> bool {
    tree.statement_at_line(pos.line)
        .is_some_and(|stmt| tree.node(stmt).left == pos)
}

/// Whether the cursor sits at the last column of its statement's line.
pub fn on_end_of_line(tree: &Tree, pos: Pos) -> bool {
    tree.statement_at_line(pos.line)
        .is_some_and(|stmt| line_end(tree, stmt, pos.line) == pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::node::Slot;
    use crate::editing::build::build_tree;
    use crate::pos::Span;
    use pretty_assertions::assert_eq;

    fn program() -> (Grammar, Tree) {
        // Line 1: "if True:"  Line 2: "    print(---)"
        let g = Grammar::python_subset();
        let mut tree = Tree::new();
        let if_stmt = tree.instantiate(&g, g.lookup("if").unwrap());
        tree.replace(tree.root(), Slot::Body, 0, if_stmt);
        let cond = tree.instantiate(&g, g.lookup("true").unwrap());
        tree.replace(if_stmt, Slot::Tokens, 1, cond);
        let print_stmt = tree.instantiate(&g, g.lookup("print").unwrap());
        tree.replace(if_stmt, Slot::Body, 0, print_stmt);
        build_tree(&mut tree);
        (g, tree)
    }

    #[test]
    fn right_skips_non_editable_atomically() {
        let (g, tree) = program();
        // At line start, "if " lies to the right.
        let out = navigate_right(&tree, &g, &CursorState::Cursor(Pos::new(1, 1)));
        assert_eq!(out, CursorState::Cursor(Pos::new(1, 4)));
    }

    #[test]
    fn right_stops_on_holes_by_selecting_them() {
        let (g, tree) = program();
        // End of "print(" on line 2 is column 11; the hole follows.
        let out = navigate_right(&tree, &g, &CursorState::Cursor(Pos::new(2, 11)));
        assert_eq!(
            out,
            CursorState::Selection(Span::new(Pos::new(2, 11), Pos::new(2, 14)))
        );
    }

    #[test]
    fn right_at_end_of_line_wraps_to_next_statement() {
        let (g, tree) = program();
        let out = navigate_right(&tree, &g, &CursorState::Cursor(Pos::new(1, 9)));
        assert_eq!(out, CursorState::Cursor(Pos::new(2, 5)));
    }

    #[test]
    fn left_collapses_selection_to_its_start() {
        let (g, tree) = program();
        let span = Span::new(Pos::new(2, 11), Pos::new(2, 14));
        let out = navigate_left(&tree, &g, &CursorState::Selection(span));
        assert_eq!(out, CursorState::Cursor(Pos::new(2, 11)));
    }

    #[test]
    fn vertical_clamps_to_statement_bounds() {
        let (g, tree) = program();
        // From the end of line 1 (col 9), down to line 2.
        let out = navigate_down(&tree, &g, &CursorState::Cursor(Pos::new(1, 9)));
        assert_eq!(out, CursorState::Cursor(Pos::new(2, 9)));

        // From column 1, down: clamps to the statement's left edge.
        let out = navigate_down(&tree, &g, &CursorState::Cursor(Pos::new(1, 1)));
        assert_eq!(out, CursorState::Cursor(Pos::new(2, 5)));
    }

    #[test]
    fn vertical_at_document_edges_stays_put() {
        let (g, tree) = program();
        let out = navigate_up(&tree, &g, &CursorState::Cursor(Pos::new(1, 3)));
        assert_eq!(out, CursorState::Cursor(Pos::new(1, 3)));
        let out = navigate_down(&tree, &g, &CursorState::Cursor(Pos::new(2, 5)));
        assert_eq!(out, CursorState::Cursor(Pos::new(2, 5)));
    }

    #[test]
    fn line_boundary_predicates() {
        let (_, tree) = program();
        assert!(on_beginning_of_line(&tree, Pos::new(1, 1)));
        assert!(!on_beginning_of_line(&tree, Pos::new(1, 2)));
        assert!(on_end_of_line(&tree, Pos::new(1, 9)));
        assert!(!on_end_of_line(&tree, Pos::new(2, 14)));
        assert!(on_end_of_line(&tree, Pos::new(2, 15)));
    }
}
