//! Declarative grammar tables for the structedit editing core.
//!
//! A [`Grammar`] is a static table of [`ConstructDef`]s. Each definition
//! describes one insertable construct: its keyword, the ordered token
//! format it expands to, whether it carries a nested body and lexical
//! scope, and its ordering/ancestor/import requirements. The editing
//! engine never hard-codes language rules; it only consults this table.
//!
//! Grammars can be loaded from TOML files (see [`Grammar::load_from_path`])
//! or taken from the compiled-in Python subset ([`Grammar::python_subset`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod builtin;

/// Identifier regex shared by identifier and assignment tokens.
pub const IDENTIFIER_PATTERN: &str = r"^[^\d\W]\w*$";

/// Module-path regex for import statements (`random`, `os.path`, ...).
/// Trailing dots are legal so the text stays valid while being typed.
pub const MODULE_PATTERN: &str = r"^[^\d\W]\w*(\.([^\d\W]\w*)?)*$";

/// Number literal regex. A trailing decimal point is legal so the text
/// stays valid while being typed.
pub const NUMBER_PATTERN: &str = r"^[0-9]+(\.[0-9]*)?$";

/// String literal content regex (anything but a quote).
pub const TEXT_PATTERN: &str = r#"^[^"]*$"#;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("failed to read grammar file at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse grammar file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("duplicate construct keyword `{0}`")]
    DuplicateKeyword(String),

    #[error("construct `{keyword}` references unknown construct `{target}`")]
    UnknownReference { keyword: String, target: String },

    #[error("invalid editable pattern `{pattern}` in construct `{keyword}`: {source}")]
    BadPattern {
        keyword: String,
        pattern: String,
        source: Box<regex::Error>,
    },

    #[error("expression construct `{0}` is missing a return type")]
    MissingReturnType(String),

    #[error("construct `{0}` has a body marker that is not the last format token")]
    MisplacedBody(String),

    #[error("construct `{0}` has an empty repeating cycle")]
    EmptyCycle(String),
}

/// Handle into a [`Grammar`]'s definition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(pub u32);

/// Whether a construct occupies a line (statement) or fills a hole
/// (expression).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
    Statement,
    Expression,
}

/// The type a hole expects, and the type an expression produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleType {
    Any,
    Boolean,
    Number,
    Text,
    Iterable,
}

impl HoleType {
    /// Whether a hole of this type accepts an expression returning `produced`.
    pub fn accepts(self, produced: HoleType) -> bool {
        self == HoleType::Any || produced == HoleType::Any || self == produced
    }
}

/// One slot in a construct's token format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum FormatToken {
    /// Fixed text, atomic for navigation and deletion.
    Literal { text: String },
    /// Typed placeholder awaiting an expression.
    Hole { expected: HoleType },
    /// User-editable identifier (no scope registration).
    Identifier,
    /// Identifier that registers itself in the nearest lexical scope.
    Assignment,
    /// Free-form editable text validated by a regex.
    Editable {
        pattern: String,
        #[serde(default)]
        seed: String,
    },
    /// Non-editable reference to a named entity.
    Reference,
    /// Marker for a nested statement body; must be the last format token.
    Body,
    /// Expanding token run: one `cycle` of tokens is appended each time the
    /// trigger key is typed at the construct's right boundary.
    Repeating {
        trigger: char,
        cycle: Vec<FormatToken>,
    },
}

/// Ancestor requirement: the construct is only insertable inside an ancestor
/// with `keyword`, between `min_level` and `max_level` body levels up
/// (`max_level` 0 means unbounded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestorRule {
    pub keyword: String,
    #[serde(default = "one")]
    pub min_level: usize,
    #[serde(default)]
    pub max_level: usize,
}

fn one() -> usize {
    1
}

/// Entry in a construct's table of legal dependents, in the order they may
/// follow it. `elif` appearing as `{ keyword = "elif", max_repeat = N }` on
/// the `if` definition means up to N `elif`s may follow an `if`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiringRule {
    pub keyword: String,
    #[serde(default)]
    pub min_repeat: usize,
    #[serde(default = "unbounded")]
    pub max_repeat: usize,
}

fn unbounded() -> usize {
    usize::MAX
}

/// One construct definition: the declarative stand-in for a per-rule class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructDef {
    /// Unique key for the construct, also used by autocomplete matching.
    pub keyword: String,
    pub kind: ConstructKind,
    /// Type produced when inserted into a hole; required for expressions.
    #[serde(default)]
    pub returns: Option<HoleType>,
    pub format: Vec<FormatToken>,
    /// Whether this construct opens a new lexical scope for its body.
    #[serde(default)]
    pub introduces_scope: bool,
    /// Alternative constructs, one of which must precede this one among its
    /// siblings (e.g. `elif` requires `if`).
    #[serde(default)]
    pub requires_construct: Vec<String>,
    #[serde(default)]
    pub requires_ancestor: Vec<AncestorRule>,
    /// Ordered, repetition-bounded table of constructs allowed to follow
    /// this one (consulted when validating a dependent's insertion).
    #[serde(default)]
    pub requiring_constructs: Vec<RequiringRule>,
    /// Module that must be imported before this construct's line.
    #[serde(default)]
    pub requires_import: Option<String>,
    /// Marks import statements: their first editable token names the module
    /// they make available.
    #[serde(default)]
    pub imports_module: bool,
}

impl ConstructDef {
    pub fn has_body(&self) -> bool {
        self.format
            .iter()
            .any(|f| matches!(f, FormatToken::Body))
    }
}

#[derive(Debug, Deserialize)]
struct GrammarFile {
    #[serde(rename = "construct")]
    constructs: Vec<ConstructDef>,
}

/// A validated construct table with keyword lookup and a compiled regex
/// cache for editable-token patterns.
#[derive(Debug)]
pub struct Grammar {
    defs: Vec<ConstructDef>,
    by_keyword: HashMap<String, DefId>,
    patterns: HashMap<String, regex::Regex>,
}

impl Grammar {
    /// Build a grammar from definitions, rejecting tables that reference
    /// unknown constructs, carry bad regexes, or misplace body markers.
    pub fn new(defs: Vec<ConstructDef>) -> Result<Self, GrammarError> {
        let mut by_keyword = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            let prev = by_keyword.insert(def.keyword.clone(), DefId(i as u32));
            if prev.is_some() {
                return Err(GrammarError::DuplicateKeyword(def.keyword.clone()));
            }
        }

        let mut patterns = HashMap::new();
        for def in &defs {
            if def.kind == ConstructKind::Expression && def.returns.is_none() {
                return Err(GrammarError::MissingReturnType(def.keyword.clone()));
            }
            for target in def
                .requires_construct
                .iter()
                .chain(def.requires_ancestor.iter().map(|a| &a.keyword))
                .chain(def.requiring_constructs.iter().map(|r| &r.keyword))
            {
                if !by_keyword.contains_key(target) {
                    return Err(GrammarError::UnknownReference {
                        keyword: def.keyword.clone(),
                        target: target.clone(),
                    });
                }
            }
            for (i, fmt) in def.format.iter().enumerate() {
                match fmt {
                    FormatToken::Body if i != def.format.len() - 1 => {
                        return Err(GrammarError::MisplacedBody(def.keyword.clone()));
                    }
                    FormatToken::Repeating { cycle, .. } if cycle.is_empty() => {
                        return Err(GrammarError::EmptyCycle(def.keyword.clone()));
                    }
                    _ => {}
                }
            }
            for pattern in format_patterns(&def.format) {
                if !patterns.contains_key(pattern) {
                    let compiled = regex::Regex::new(pattern).map_err(|source| {
                        GrammarError::BadPattern {
                            keyword: def.keyword.clone(),
                            pattern: pattern.to_string(),
                            source: Box::new(source),
                        }
                    })?;
                    patterns.insert(pattern.to_string(), compiled);
                }
            }
        }

        // Identifier/assignment tokens always validate against the shared
        // identifier pattern, so keep it compiled even if no editable token
        // names it explicitly.
        patterns
            .entry(IDENTIFIER_PATTERN.to_string())
            .or_insert_with(|| regex::Regex::new(IDENTIFIER_PATTERN).expect("builtin pattern"));

        Ok(Self {
            defs,
            by_keyword,
            patterns,
        })
    }

    /// Load a grammar table from a TOML file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, GrammarError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| GrammarError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let file: GrammarFile =
            toml::from_str(&content).map_err(|source| GrammarError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        Self::new(file.constructs)
    }

    pub fn lookup(&self, keyword: &str) -> Option<DefId> {
        self.by_keyword.get(keyword).copied()
    }

    pub fn def(&self, id: DefId) -> &ConstructDef {
        &self.defs[id.0 as usize]
    }

    pub fn defs(&self) -> impl Iterator<Item = (DefId, &ConstructDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(i, d)| (DefId(i as u32), d))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Compiled regex for an editable-token pattern. Panics only if `pattern`
    /// never went through grammar validation, which is a caller bug.
    pub fn pattern(&self, pattern: &str) -> &regex::Regex {
        self.patterns
            .get(pattern)
            .unwrap_or_else(|| panic!("pattern not registered with grammar: {pattern}"))
    }

    /// The compiled-in Python-subset grammar used by tests and the CLI.
    pub fn python_subset() -> Self {
        Self::new(builtin::python_subset_defs()).expect("builtin grammar must validate")
    }
}

/// All regex patterns reachable from a format, including repeating cycles.
fn format_patterns(format: &[FormatToken]) -> Vec<&str> {
    let mut out = Vec::new();
    for fmt in format {
        match fmt {
            FormatToken::Editable { pattern, .. } => out.push(pattern.as_str()),
            FormatToken::Repeating { cycle, .. } => out.extend(format_patterns(cycle)),
            _ => {}
        }
    }
    out
}
