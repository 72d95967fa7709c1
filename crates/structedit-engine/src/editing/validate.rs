//! Insertion validation.
//!
//! Every construct insertion passes through here before the tree is
//! touched. Three dependency mechanisms are checked, all driven by the
//! grammar table: sibling ordering (`elif` must follow `if`), ancestor
//! containment (`break` must sit inside a loop), and imports (`choice`
//! needs `random` imported above it). Ordering and ancestry failures
//! block the insertion; a missing import degrades it to draft mode with
//! a remediation attached instead.

use crate::ast::node::{DraftRecord, NodeId, RemediationAction, Slot};
use crate::ast::tree::Tree;
use structedit_grammar::{ConstructDef, ConstructKind, DefId, Grammar, HoleType};

/// Outcome of validating one insertion.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertionResult {
    Valid,
    Invalid { reason: String },
    /// Insertable, but only as a draft carrying this diagnostic.
    DraftMode(DraftRecord),
}

impl InsertionResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, InsertionResult::Valid)
    }
}

/// Validate inserting `def_id` as a statement at `index` of `parent`'s body.
pub fn validate_statement_insertion(
    tree: &Tree,
    grammar: &Grammar,
    parent: NodeId,
    index: usize,
    def_id: DefId,
) -> InsertionResult {
    let def = grammar.def(def_id);
    if def.kind != ConstructKind::Statement {
        return InsertionResult::Invalid {
            reason: format!("`{}` is an expression, not a statement", def.keyword),
        };
    }
    if let Err(reason) = ancestor_allows(tree, grammar, parent, def) {
        return InsertionResult::Invalid { reason };
    }
    if let Err(reason) = ordering_allows(tree, grammar, parent, index, def) {
        return InsertionResult::Invalid { reason };
    }
    let line = insertion_line(tree, parent, index);
    match missing_import(tree, grammar, def, line) {
        Some(record) => InsertionResult::DraftMode(record),
        None => InsertionResult::Valid,
    }
}

/// Validate filling `hole` with the expression `def_id`.
pub fn validate_expression_insertion(
    tree: &Tree,
    grammar: &Grammar,
    hole: NodeId,
    def_id: DefId,
) -> InsertionResult {
    let def = grammar.def(def_id);
    if def.kind != ConstructKind::Expression {
        return InsertionResult::Invalid {
            reason: format!("`{}` is a statement, not an expression", def.keyword),
        };
    }
    let Some(expected) = tree.node(hole).hole_type() else {
        return InsertionResult::Invalid {
            reason: "insertion target is not a hole".to_string(),
        };
    };
    let produced = def.returns.unwrap_or(HoleType::Any);
    if !expected.accepts(produced) {
        return InsertionResult::Invalid {
            reason: format!(
                "`{}` produces {produced:?} but the hole expects {expected:?}",
                def.keyword
            ),
        };
    }
    let line = tree.node(hole).left.line;
    match missing_import(tree, grammar, def, line) {
        Some(record) => InsertionResult::DraftMode(record),
        None => InsertionResult::Valid,
    }
}

/// Ancestor containment: at least one rule must match a body-owning
/// ancestor of the insertion point at an allowed nesting distance.
fn ancestor_allows(
    tree: &Tree,
    grammar: &Grammar,
    parent: NodeId,
    def: &ConstructDef,
) -> Result<(), String> {
    if def.requires_ancestor.is_empty() {
        return Ok(());
    }
    // Level 1 is the construct whose body receives the statement.
    let mut level = 1usize;
    let mut cur = parent;
    loop {
        if let Some(kw) = tree.keyword_of(cur, grammar) {
            for rule in &def.requires_ancestor {
                let within = level >= rule.min_level
                    && (rule.max_level == 0 || level <= rule.max_level);
                if rule.keyword == kw && within {
                    return Ok(());
                }
            }
        }
        let node = tree.node(cur);
        let Some(up) = node.parent else { break };
        if node.slot == Slot::Body {
            level += 1;
        }
        cur = up;
    }
    let wanted: Vec<&str> = def
        .requires_ancestor
        .iter()
        .map(|r| r.keyword.as_str())
        .collect();
    Err(format!(
        "`{}` only goes inside {}",
        def.keyword,
        wanted.join(" or ")
    ))
}

/// Sibling ordering: at least one alternative in `requires_construct` must
/// be reachable by walking the preceding siblings backwards.
fn ordering_allows(
    tree: &Tree,
    grammar: &Grammar,
    parent: NodeId,
    index: usize,
    def: &ConstructDef,
) -> Result<(), String> {
    if def.requires_construct.is_empty() {
        return Ok(());
    }
    let siblings = tree.children(parent, Slot::Body);
    for required in &def.requires_construct {
        if follows_required(tree, grammar, siblings, index, required, &def.keyword) {
            return Ok(());
        }
    }
    Err(format!(
        "`{}` must directly follow {}",
        def.keyword,
        def.requires_construct.join(" or ")
    ))
}

/// Walk the preceding siblings backwards, matching them against the
/// required construct's ordered follower table. The candidate occupies its
/// own slot in that table from the start, so repetition limits count it.
fn follows_required(
    tree: &Tree,
    grammar: &Grammar,
    siblings: &[NodeId],
    index: usize,
    required: &str,
    candidate: &str,
) -> bool {
    let Some(req_id) = grammar.lookup(required) else {
        return false;
    };
    let table = &grammar.def(req_id).requiring_constructs;
    let Some(slot) = table.iter().position(|r| r.keyword == candidate) else {
        return false;
    };

    let mut counts = vec![0usize; table.len()];
    counts[slot] = 1;
    if counts[slot] > table[slot].max_repeat {
        return false;
    }
    let mut cur = slot;

    for sib in siblings[..index].iter().rev() {
        if tree.node(*sib).is_empty_line() {
            continue;
        }
        let Some(kw) = tree.keyword_of(*sib, grammar) else {
            return false;
        };
        if kw == required {
            // Followers ahead of the candidate in the table must have met
            // their minimum between here and the insertion point.
            return table[..slot]
                .iter()
                .enumerate()
                .all(|(i, r)| counts[i] >= r.min_repeat);
        }
        match table.iter().position(|r| r.keyword == kw) {
            // Walking backwards, follower slots may only stay or decrease.
            Some(j) if j <= cur => {
                counts[j] += 1;
                if counts[j] > table[j].max_repeat {
                    return false;
                }
                cur = j;
            }
            _ => return false,
        }
    }
    false
}

/// Line the statement inserted at `(parent, index)` will start on.
fn insertion_line(tree: &Tree, parent: NodeId, index: usize) -> usize {
    let body = tree.children(parent, Slot::Body);
    match body.get(index) {
        Some(at) => tree.node(*at).left.line,
        None => tree.node(parent).right.line + 1,
    }
}

/// Module names made available by import statements above `before_line`.
pub fn imported_modules(tree: &Tree, grammar: &Grammar, before_line: usize) -> Vec<String> {
    let mut out = Vec::new();
    let Some(body) = tree.body_of(tree.root()) else {
        return out;
    };
    for stmt in body {
        if tree.node(*stmt).left.line >= before_line {
            break;
        }
        let Some(def_id) = tree.def_of(*stmt) else {
            continue;
        };
        if !grammar.def(def_id).imports_module {
            continue;
        }
        let name = tree.tokens_of(*stmt).iter().find_map(|t| {
            let tkn = tree.node(*t).as_token()?;
            (tkn.is_text_editable() && !tkn.text.is_empty()).then(|| tkn.text.clone())
        });
        if let Some(name) = name {
            out.push(name);
        }
    }
    out
}

/// Draft diagnostic for an unmet import requirement, if any.
fn missing_import(
    tree: &Tree,
    grammar: &Grammar,
    def: &ConstructDef,
    line: usize,
) -> Option<DraftRecord> {
    let module = def.requires_import.as_deref()?;
    if imported_modules(tree, grammar, line).iter().any(|m| m == module) {
        return None;
    }
    Some(DraftRecord {
        message: format!("`{}` needs the `{module}` module imported", def.keyword),
        actions: vec![RemediationAction {
            label: format!("import {module}"),
            insert_keyword: Some("import".to_string()),
        }],
    })
}
