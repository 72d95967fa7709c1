//! Build/rebuild engine: the only code allowed to write the derived
//! `left`/`right` boundaries.
//!
//! `build` lays out a whole subtree from a starting position; `rebuild`
//! re-lays out only the children from a given index onward, reusing the
//! cached boundaries of untouched earlier siblings, and propagates outward
//! through following siblings and ancestors until nothing else moves. Both
//! are total over well-formed trees; inconsistencies degrade to a logged
//! warning, never a panic.

use crate::ast::node::{NodeId, NodeKind, Slot, TAB_WIDTH};
use crate::ast::tree::Tree;
use crate::pos::Pos;

/// Column where statements at `level` begin.
pub fn indent_col(level: usize) -> usize {
    1 + level * TAB_WIDTH
}

/// Lay out `id` and its whole subtree starting at `pos`; returns the right
/// boundary.
pub fn build(tree: &mut Tree, id: NodeId, pos: Pos) -> Pos {
    let right = match &tree.node(id).kind {
        NodeKind::Token(_) => {
            let level = tree.indent_level(id);
            let text = match &tree.node(id).kind {
                NodeKind::Token(t) => t.render_text().to_string(),
                _ => unreachable!(),
            };
            if text.is_empty() {
                log::warn!("token built with empty text at {pos}");
            }
            advance(pos, &text, level)
        }
        NodeKind::EmptyLine { autocomplete } => match *autocomplete {
            Some(tkn) => build(tree, tkn, pos),
            None => pos,
        },
        NodeKind::Construct(_) | NodeKind::Compound(_) => {
            let tokens = tree.tokens_of(id).to_vec();
            let mut cur = pos;
            for t in tokens {
                cur = build(tree, t, cur);
            }
            if tree.body_of(id).is_some() {
                cur = layout_body(tree, id, 0, cur, false);
            }
            cur
        }
        NodeKind::Module { .. } => layout_body(tree, id, 0, pos, true),
    };
    let node = tree.node_mut(id);
    node.left = pos;
    node.right = right;
    right
}

/// Re-lay out the children of `parent` in `slot` from `from_index` onward,
/// then propagate to the parent's own following siblings if its right
/// boundary moved.
pub fn rebuild(tree: &mut Tree, parent: NodeId, slot: Slot, from_index: usize) {
    let old_right = tree.node(parent).right;

    let cur = match slot {
        Slot::Tokens => {
            let tokens = tree.tokens_of(parent).to_vec();
            let mut cur = if from_index == 0 {
                tree.node(parent).left
            } else {
                tree.node(tokens[from_index - 1]).right
            };
            for t in tokens.iter().skip(from_index) {
                cur = build(tree, *t, cur);
            }
            // Token-row changes shift every body line below.
            if tree.body_of(parent).is_some() {
                cur = layout_body(tree, parent, 0, cur, false);
            }
            cur
        }
        Slot::Body => {
            let first_inline = matches!(tree.node(parent).kind, NodeKind::Module { .. });
            let prev_end = if from_index == 0 {
                let tokens = tree.tokens_of(parent);
                match tokens.last() {
                    Some(last) => tree.node(*last).right,
                    None => tree.node(parent).left,
                }
            } else {
                let body = tree.body_of(parent).unwrap_or(&[]);
                tree.node(body[from_index - 1]).right
            };
            layout_body(
                tree,
                parent,
                from_index,
                prev_end,
                first_inline && from_index == 0,
            )
        }
    };

    log::debug!("rebuild {parent:?} {slot:?} from {from_index}: right {old_right} -> {cur}");
    tree.node_mut(parent).right = cur;

    if cur != old_right {
        let node = tree.node(parent);
        if let (Some(grandparent), pslot, pindex) = (node.parent, node.slot, node.index_in_parent) {
            rebuild(tree, grandparent, pslot, pindex + 1);
        }
    }
}

/// Convenience: build the whole tree from the document origin.
pub fn build_tree(tree: &mut Tree) {
    let root = tree.root();
    build(tree, root, Pos::origin());
}

/// Lay out body children of `parent` from `from_index`, where `cur` is the
/// end of whatever precedes them. When `first_inline` is set the first child
/// starts at `cur` itself (the module root's first line); otherwise every
/// child starts on a fresh line at the body's indent column.
fn layout_body(
    tree: &mut Tree,
    parent: NodeId,
    from_index: usize,
    cur: Pos,
    first_inline: bool,
) -> Pos {
    let body = match tree.body_of(parent) {
        Some(b) => b.to_vec(),
        None => return cur,
    };
    let level = match tree.node(parent).kind {
        NodeKind::Module { .. } => 0,
        _ => tree.indent_level(parent) + 1,
    };
    let mut cur = cur;
    for (i, stmt) in body.iter().enumerate().skip(from_index) {
        let start = if first_inline && i == from_index && from_index == 0 {
            cur
        } else {
            Pos::new(cur.line + 1, indent_col(level))
        };
        cur = build(tree, *stmt, start);
    }
    cur
}

/// Advance `pos` over `text`. Newlines re-indent continuation text to the
/// owner's nesting level.
fn advance(pos: Pos, text: &str, level: usize) -> Pos {
    let mut cur = pos;
    for c in text.chars() {
        if c == '\n' {
            cur = Pos::new(cur.line + 1, indent_col(level));
        } else {
            cur.col += 1;
        }
    }
    cur
}
