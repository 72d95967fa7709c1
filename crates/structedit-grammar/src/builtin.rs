//! Compiled-in Python-subset construct table.
//!
//! This is the grammar the CLI and the engine's integration tests run
//! against. It is deliberately small but exercises every format-token kind
//! and every dependency mechanism (ordering, ancestors, imports).

use crate::{
    AncestorRule, ConstructDef, ConstructKind, FormatToken, HoleType, RequiringRule,
    IDENTIFIER_PATTERN, MODULE_PATTERN, NUMBER_PATTERN, TEXT_PATTERN,
};

fn lit(text: &str) -> FormatToken {
    FormatToken::Literal {
        text: text.to_string(),
    }
}

fn hole(expected: HoleType) -> FormatToken {
    FormatToken::Hole { expected }
}

fn editable(pattern: &str) -> FormatToken {
    FormatToken::Editable {
        pattern: pattern.to_string(),
        seed: String::new(),
    }
}

fn follower(keyword: &str, min_repeat: usize, max_repeat: usize) -> RequiringRule {
    RequiringRule {
        keyword: keyword.to_string(),
        min_repeat,
        max_repeat,
    }
}

fn ancestor(keyword: &str) -> AncestorRule {
    AncestorRule {
        keyword: keyword.to_string(),
        min_level: 1,
        max_level: 0,
    }
}

fn statement(keyword: &str, format: Vec<FormatToken>) -> ConstructDef {
    ConstructDef {
        keyword: keyword.to_string(),
        kind: ConstructKind::Statement,
        returns: None,
        format,
        introduces_scope: false,
        requires_construct: vec![],
        requires_ancestor: vec![],
        requiring_constructs: vec![],
        requires_import: None,
        imports_module: false,
    }
}

fn expression(keyword: &str, returns: HoleType, format: Vec<FormatToken>) -> ConstructDef {
    ConstructDef {
        returns: Some(returns),
        kind: ConstructKind::Expression,
        ..statement(keyword, format)
    }
}

pub(crate) fn python_subset_defs() -> Vec<ConstructDef> {
    let mut defs = Vec::new();

    defs.push(ConstructDef {
        imports_module: true,
        ..statement("import", vec![lit("import "), editable(MODULE_PATTERN)])
    });

    defs.push(ConstructDef {
        imports_module: true,
        ..statement(
            "from",
            vec![
                lit("from "),
                editable(MODULE_PATTERN),
                lit(" import "),
                editable(IDENTIFIER_PATTERN),
            ],
        )
    });

    defs.push(ConstructDef {
        introduces_scope: true,
        requiring_constructs: vec![follower("elif", 0, usize::MAX), follower("else", 0, 1)],
        ..statement(
            "if",
            vec![
                lit("if "),
                hole(HoleType::Boolean),
                lit(":"),
                FormatToken::Body,
            ],
        )
    });

    defs.push(ConstructDef {
        introduces_scope: true,
        requires_construct: vec!["if".to_string()],
        ..statement(
            "elif",
            vec![
                lit("elif "),
                hole(HoleType::Boolean),
                lit(":"),
                FormatToken::Body,
            ],
        )
    });

    defs.push(ConstructDef {
        introduces_scope: true,
        requires_construct: vec!["if".to_string(), "while".to_string(), "for".to_string()],
        ..statement("else", vec![lit("else:"), FormatToken::Body])
    });

    defs.push(ConstructDef {
        introduces_scope: true,
        requiring_constructs: vec![follower("else", 0, 1)],
        ..statement(
            "while",
            vec![
                lit("while "),
                hole(HoleType::Boolean),
                lit(":"),
                FormatToken::Body,
            ],
        )
    });

    defs.push(ConstructDef {
        introduces_scope: true,
        requiring_constructs: vec![follower("else", 0, 1)],
        ..statement(
            "for",
            vec![
                lit("for "),
                FormatToken::Assignment,
                lit(" in "),
                hole(HoleType::Iterable),
                lit(":"),
                FormatToken::Body,
            ],
        )
    });

    defs.push(ConstructDef {
        requires_ancestor: vec![ancestor("while"), ancestor("for")],
        ..statement("break", vec![lit("break")])
    });

    defs.push(statement(
        "assign",
        vec![FormatToken::Assignment, lit(" = "), hole(HoleType::Any)],
    ));

    defs.push(statement(
        "print",
        vec![lit("print("), hole(HoleType::Any), lit(")")],
    ));

    defs.push(expression(
        "==",
        HoleType::Boolean,
        vec![hole(HoleType::Any), lit(" == "), hole(HoleType::Any)],
    ));

    defs.push(expression(
        "<",
        HoleType::Boolean,
        vec![hole(HoleType::Number), lit(" < "), hole(HoleType::Number)],
    ));

    defs.push(expression(
        "number",
        HoleType::Number,
        vec![editable(NUMBER_PATTERN)],
    ));

    defs.push(expression(
        "text",
        HoleType::Text,
        vec![lit("\""), editable(TEXT_PATTERN), lit("\"")],
    ));

    defs.push(expression("true", HoleType::Boolean, vec![lit("True")]));
    defs.push(expression("false", HoleType::Boolean, vec![lit("False")]));

    defs.push(expression(
        "var",
        HoleType::Any,
        vec![FormatToken::Identifier],
    ));

    defs.push(expression(
        "range",
        HoleType::Iterable,
        vec![lit("range("), hole(HoleType::Number), lit(")")],
    ));

    defs.push(expression(
        "list",
        HoleType::Iterable,
        vec![
            lit("["),
            hole(HoleType::Any),
            FormatToken::Repeating {
                trigger: ',',
                cycle: vec![lit(", "), hole(HoleType::Any)],
            },
            lit("]"),
        ],
    ));

    defs.push(expression(
        "call",
        HoleType::Any,
        vec![
            FormatToken::Identifier,
            lit("("),
            hole(HoleType::Any),
            FormatToken::Repeating {
                trigger: ',',
                cycle: vec![lit(", "), hole(HoleType::Any)],
            },
            lit(")"),
        ],
    ));

    defs.push(ConstructDef {
        requires_import: Some("random".to_string()),
        ..expression(
            "choice",
            HoleType::Any,
            vec![lit("random.choice("), hole(HoleType::Iterable), lit(")")],
        )
    });

    defs.push(ConstructDef {
        requires_import: Some("random".to_string()),
        ..expression(
            "randint",
            HoleType::Number,
            vec![
                lit("random.randint("),
                hole(HoleType::Number),
                lit(", "),
                hole(HoleType::Number),
                lit(")"),
            ],
        )
    });

    defs
}
