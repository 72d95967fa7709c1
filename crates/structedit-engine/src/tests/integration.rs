//! End-to-end flows: whole programs assembled through the session command
//! surface, checked against render text, layout invariants, and the
//! outline round trip.

use crate::ast::node::{NodeId, NodeKind};
use crate::ast::outline::{derive_outline_from_render, outline};
use crate::ast::tree::Tree;
use crate::editing::events::{NotifyKind, Subscription};
use crate::editing::session::{Cmd, EngineError, Session};
use crate::pos::Pos;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use structedit_grammar::{Grammar, HoleType};

fn session() -> Session {
    Session::new(Arc::new(Grammar::python_subset()))
}

fn insert(s: &mut Session, keyword: &str) {
    s.apply(Cmd::InsertConstruct {
        keyword: keyword.to_string(),
    })
    .unwrap();
}

fn type_str(s: &mut Session, text: &str) {
    for c in text.chars() {
        s.apply(Cmd::TypeChar(c)).unwrap();
    }
}

/// Select the first unfilled leaf of `stmt` so the next insertion lands in it.
fn select_gap(s: &mut Session, stmt: NodeId) {
    let hole = s
        .tree()
        .leaf_tokens(stmt)
        .into_iter()
        .find(|t| {
            s.tree()
                .node(*t)
                .as_token()
                .is_some_and(|tkn| tkn.is_empty())
        })
        .expect("statement has an unfilled slot");
    let span = s.tree().node(hole).span();
    s.apply(Cmd::SetSelection(span)).unwrap();
}

fn module_stmt(s: &Session, index: usize) -> NodeId {
    s.tree().body_of(s.tree().root()).unwrap()[index]
}

/// Index invariant plus sibling position monotonicity, over the whole tree.
fn assert_layout_consistent(tree: &Tree) {
    tree.check_index_consistency().unwrap();
    fn walk(tree: &Tree, id: NodeId) {
        for children in [
            tree.tokens_of(id).to_vec(),
            tree.body_of(id).unwrap_or(&[]).to_vec(),
        ] {
            for pair in children.windows(2) {
                let a = tree.node(pair[0]);
                let b = tree.node(pair[1]);
                assert!(
                    a.right <= b.left,
                    "siblings overlap: {} vs {}",
                    a.span(),
                    b.span()
                );
            }
            for child in children {
                walk(tree, child);
            }
        }
    }
    walk(tree, tree.root());
}

#[test]
fn inserting_if_on_a_blank_line_creates_body_and_hole() {
    let mut s = session();
    insert(&mut s, "if");

    let if_stmt = module_stmt(&s, 0);
    assert_eq!(s.tree().keyword_of(if_stmt, s.grammar()), Some("if"));

    let hole = s.tree().tokens_of(if_stmt)[1];
    assert_eq!(s.tree().node(hole).hole_type(), Some(HoleType::Boolean));
    // Never zero-width.
    let node = s.tree().node(hole);
    assert!(node.right > node.left);

    let body = s.tree().body_of(if_stmt).unwrap();
    assert_eq!(body.len(), 1);
    assert!(s.tree().node(body[0]).is_empty_line());
    assert_layout_consistent(s.tree());
}

#[test]
fn elif_above_its_if_is_refused() {
    let mut s = session();
    s.apply(Cmd::NewLine).unwrap();
    s.apply(Cmd::SetCursor(Pos::new(2, 1))).unwrap();
    insert(&mut s, "if");

    s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
    let err = s
        .apply(Cmd::InsertConstruct {
            keyword: "elif".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInsertion(_)));
    assert_eq!(s.render(), "\nif ---:\n    ");
}

#[test]
fn elif_directly_below_its_if_is_accepted() {
    let mut s = session();
    insert(&mut s, "if");

    // A fresh module-level line below the if's body.
    s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
    s.apply(Cmd::NewLine).unwrap();
    insert(&mut s, "elif");

    assert_eq!(s.render(), "if ---:\n    \nelif ---:\n    ");
    assert_layout_consistent(s.tree());
}

#[test]
fn missing_import_drafts_then_a_from_import_clears_it() {
    let mut s = session();
    s.apply(Cmd::NewLine).unwrap();
    s.apply(Cmd::SetCursor(Pos::new(2, 1))).unwrap();
    insert(&mut s, "print");
    insert(&mut s, "choice");

    assert_eq!(s.open_drafts().len(), 1);
    let drafted = s.open_drafts()[0];
    let record = s.tree().node(drafted).draft.clone().unwrap();
    assert_eq!(record.actions[0].insert_keyword.as_deref(), Some("import"));

    // `from random import ...` above it satisfies the requirement.
    s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
    insert(&mut s, "from");
    type_str(&mut s, "random");

    assert!(s.open_drafts().is_empty());
    assert!(!s.tree().node(drafted).in_draft_mode());

    // Re-running the check with nothing changed stays a no-op.
    s.validate_imports();
    s.validate_imports();
    assert!(s.open_drafts().is_empty());
}

#[test]
fn invalid_identifier_keystroke_fails_without_mutation() {
    let mut s = session();
    insert(&mut s, "assign");
    let target = s.tree().tokens_of(module_stmt(&s, 0))[0];

    let fails = Rc::new(RefCell::new(0));
    let f = fails.clone();
    let bus = s.bus_mut();
    bus.subscribe(target, NotifyKind::Fail, move |_| {
        *f.borrow_mut() += 1;
        Subscription::Keep
    });

    // "1x" can never begin: the leading digit is rejected outright.
    s.apply(Cmd::TypeChar('1')).unwrap();
    assert_eq!(*fails.borrow(), 1);
    assert_eq!(s.render(), "--- = ---");

    s.apply(Cmd::TypeChar('x')).unwrap();
    assert_eq!(*fails.borrow(), 1);
    assert_eq!(s.render(), "x = ---");
}

#[test]
fn statements_with_content_refuse_deletion_until_emptied() {
    let mut s = session();
    insert(&mut s, "if");
    insert(&mut s, "true");
    s.apply(Cmd::SetCursor(Pos::new(2, 5))).unwrap();
    insert(&mut s, "print");

    let if_stmt = module_stmt(&s, 0);
    assert!(!s.tree().can_delete_statement(if_stmt));

    s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
    s.apply(Cmd::DeleteFocused).unwrap();
    assert_eq!(s.render(), "if True:\n    print(---)");

    // Empty the body line first, then the condition, then delete.
    s.apply(Cmd::SetCursor(Pos::new(2, 5))).unwrap();
    s.apply(Cmd::DeleteFocused).unwrap();
    assert_eq!(s.render(), "if True:\n    ");
    assert!(!s.tree().can_delete_statement(if_stmt));

    s.apply(Cmd::SetSelection(crate::pos::Span::new(
        Pos::new(1, 4),
        Pos::new(1, 8),
    )))
    .unwrap();
    s.apply(Cmd::DeleteFocused).unwrap();
    assert!(s.tree().can_delete_statement(if_stmt));

    s.apply(Cmd::SetCursor(Pos::new(1, 1))).unwrap();
    s.apply(Cmd::DeleteFocused).unwrap();
    assert_eq!(s.render(), "");
}

#[rstest]
#[case("print", "print(---)")]
#[case("assign", "--- = ---")]
#[case("while", "while ---:\n    ")]
#[case("for", "for --- in ---:\n    ")]
#[case("import", "import ---")]
fn inserted_statements_render_their_format(#[case] keyword: &str, #[case] expected: &str) {
    let mut s = session();
    insert(&mut s, keyword);
    assert_eq!(s.render(), expected);
    assert_layout_consistent(s.tree());
}

#[test]
fn validation_is_deterministic_between_mutations() {
    let mut s = session();
    insert(&mut s, "if");
    let first = s.availability();
    let second = s.availability();
    assert_eq!(first, second);
}

#[test]
fn assembled_program_round_trips_through_its_outline() {
    let mut s = session();

    // import random
    insert(&mut s, "import");
    type_str(&mut s, "random");

    // x = random.randint(1, 6)
    s.apply(Cmd::NewLine).unwrap();
    insert(&mut s, "assign");
    type_str(&mut s, "x");
    let assign = module_stmt(&s, 1);
    select_gap(&mut s, assign);
    insert(&mut s, "randint");
    insert(&mut s, "number");
    type_str(&mut s, "1");
    select_gap(&mut s, assign);
    insert(&mut s, "number");
    type_str(&mut s, "6");

    // if x == 6:
    s.apply(Cmd::NewLine).unwrap();
    insert(&mut s, "if");
    insert(&mut s, "==");
    insert(&mut s, "var");
    type_str(&mut s, "x");
    let if_stmt = module_stmt(&s, 2);
    select_gap(&mut s, if_stmt);
    insert(&mut s, "number");
    type_str(&mut s, "6");

    //     print("high")
    s.apply(Cmd::SetCursor(Pos::new(4, 5))).unwrap();
    insert(&mut s, "print");
    insert(&mut s, "text");
    type_str(&mut s, "high");

    let expected = "import random\n\
                    x = random.randint(1, 6)\n\
                    if x == 6:\n    \
                    print(\"high\")";
    assert_eq!(s.render(), expected);
    assert!(s.open_drafts().is_empty());
    assert_layout_consistent(s.tree());

    let from_tree = outline(s.tree(), s.grammar());
    let from_render = derive_outline_from_render(&s.render(), s.grammar());
    assert_eq!(from_tree, from_render);
    assert_eq!(from_tree.len(), 4);
    assert_eq!(from_tree[3].keyword, "print");
    assert_eq!(from_tree[3].depth, 1);
}

#[test]
fn deleting_a_nested_expression_leaves_its_statement_editable() {
    let mut s = session();
    insert(&mut s, "while");
    insert(&mut s, "<");
    let while_stmt = module_stmt(&s, 0);
    select_gap(&mut s, while_stmt);
    insert(&mut s, "number");
    type_str(&mut s, "3");
    assert_eq!(s.render(), "while 3 < ---:\n    ");

    // Remove the whole comparison; the condition becomes a boolean hole.
    let cond = s.tree().tokens_of(while_stmt)[1];
    let span = s.tree().node(cond).span();
    s.apply(Cmd::SetSelection(span)).unwrap();
    s.apply(Cmd::DeleteFocused).unwrap();
    assert_eq!(s.render(), "while ---:\n    ");

    let hole = s.tree().tokens_of(while_stmt)[1];
    assert_eq!(s.tree().node(hole).hole_type(), Some(HoleType::Boolean));
    assert_layout_consistent(s.tree());
}

#[test]
fn empty_line_autocomplete_survives_focus_changes() {
    let mut s = session();
    s.apply(Cmd::NewLine).unwrap();
    s.apply(Cmd::SetCursor(Pos::new(2, 1))).unwrap();
    type_str(&mut s, "whil");
    assert_eq!(s.render(), "\nwhil");

    let line = module_stmt(&s, 1);
    assert!(matches!(
        s.tree().node(line).kind,
        NodeKind::EmptyLine {
            autocomplete: Some(_)
        }
    ));

    s.apply(Cmd::TypeChar('e')).unwrap();
    assert_eq!(s.render(), "\nwhile ---:\n    ");
    assert_layout_consistent(s.tree());
}

