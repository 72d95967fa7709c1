//! Structural outlines: a line-oriented summary of a tree (keyword, nesting
//! depth, unfilled holes per statement) that can also be re-derived from
//! render text. Rendering a tree and re-deriving the outline must agree with
//! the outline taken from the tree itself; this is the round-trip property
//! the integration tests check.

use crate::ast::node::{NodeId, NodeKind, HOLE_TEXT, TAB_WIDTH};
use crate::ast::tree::Tree;
use structedit_grammar::{ConstructKind, FormatToken, Grammar};

/// One statement line of the structural summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    /// Grammar keyword, or empty for a blank line.
    pub keyword: String,
    /// Body nesting depth (0 = module level).
    pub depth: usize,
    /// Unfilled holes (including empty identifiers) on the line.
    pub holes: usize,
}

/// Outline of the tree, statement by statement in document order.
pub fn outline(tree: &Tree, grammar: &Grammar) -> Vec<OutlineEntry> {
    let mut out = Vec::new();
    if let Some(body) = tree.body_of(tree.root()) {
        for stmt in body {
            outline_statement(tree, grammar, *stmt, 0, &mut out);
        }
    }
    out
}

fn outline_statement(
    tree: &Tree,
    grammar: &Grammar,
    stmt: NodeId,
    depth: usize,
    out: &mut Vec<OutlineEntry>,
) {
    match &tree.node(stmt).kind {
        NodeKind::EmptyLine { .. } => out.push(OutlineEntry {
            keyword: String::new(),
            depth,
            holes: 0,
        }),
        _ => {
            let keyword = tree
                .keyword_of(stmt, grammar)
                .unwrap_or_default()
                .to_string();
            let holes = tree
                .leaf_tokens(stmt)
                .iter()
                .filter(|t| tree.node(**t).as_token().is_some_and(|tkn| tkn.is_empty()))
                .count();
            out.push(OutlineEntry {
                keyword,
                depth,
                holes,
            });
            if let Some(body) = tree.body_of(stmt) {
                for line in body {
                    outline_statement(tree, grammar, *line, depth + 1, out);
                }
            }
        }
    }
}

/// Re-derive the outline from render text alone, using per-definition line
/// matchers built from the grammar's token formats. The inverse of
/// [`outline`] modulo exact whitespace.
pub fn derive_outline_from_render(text: &str, grammar: &Grammar) -> Vec<OutlineEntry> {
    let matchers = line_matchers(grammar);
    let mut out = Vec::new();
    for line in text.split('\n') {
        let content = line.trim_start_matches(' ');
        let depth = (line.len() - content.len()) / TAB_WIDTH;
        if content.is_empty() {
            out.push(OutlineEntry {
                keyword: String::new(),
                depth,
                holes: 0,
            });
            continue;
        }
        let keyword = matchers
            .iter()
            .find(|(_, re)| re.is_match(content))
            .map(|(kw, _)| kw.clone())
            .unwrap_or_default();
        out.push(OutlineEntry {
            keyword,
            depth,
            holes: content.matches(HOLE_TEXT).count(),
        });
    }
    out
}

/// Full-line regexes for every statement definition, in grammar order.
pub fn line_matchers(grammar: &Grammar) -> Vec<(String, regex::Regex)> {
    grammar
        .defs()
        .filter(|(_, def)| def.kind == ConstructKind::Statement)
        .map(|(_, def)| {
            let mut pattern = String::from("^");
            push_format_pattern(&def.format, &mut pattern);
            pattern.push('$');
            let re = regex::Regex::new(&pattern).expect("format-derived pattern is valid");
            (def.keyword.clone(), re)
        })
        .collect()
}

fn push_format_pattern(format: &[FormatToken], pattern: &mut String) {
    for fmt in format {
        match fmt {
            FormatToken::Literal { text } => pattern.push_str(&regex::escape(text)),
            FormatToken::Body => {}
            FormatToken::Repeating { cycle, .. } => {
                pattern.push_str("(?:");
                push_format_pattern(cycle, pattern);
                pattern.push_str(")*");
            }
            // Any filled or unfilled slot.
            _ => pattern.push_str("(?:.+?)"),
        }
    }
}
