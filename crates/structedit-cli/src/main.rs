//! Non-interactive inspector for the editing core.
//!
//! Replays a script of editing commands against a fresh session and prints
//! the resulting program text, so grammar tables and validation rules can be
//! exercised without an editor front end. One command per line:
//!
//! ```text
//! insert if
//! type x
//! cursor 2 5
//! insert print
//! ```

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use structedit_engine::{Cmd, InsertionResult, Pos, Session};
use structedit_grammar::Grammar;

#[derive(Parser)]
#[command(name = "structedit", about = "Replay an edit script against a construct tree")]
struct Args {
    /// Edit script, one command per line. `#` starts a comment.
    script: PathBuf,

    /// Grammar table to load instead of the built-in Python subset.
    #[arg(long)]
    grammar: Option<PathBuf>,

    /// Print per-construct availability after every command.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let grammar = match &args.grammar {
        Some(path) => Grammar::load_from_path(path)
            .with_context(|| format!("loading grammar from {}", path.display()))?,
        None => Grammar::python_subset(),
    };

    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;

    let mut session = Session::new(Arc::new(grammar));
    for (lineno, line) in script.lines().enumerate() {
        let cmds = parse_line(line)
            .with_context(|| format!("{}:{}", args.script.display(), lineno + 1))?;
        if cmds.is_empty() {
            continue;
        }

        for cmd in cmds {
            log::debug!("applying {cmd:?}");
            match session.apply(cmd.clone()) {
                Ok(patch) => {
                    for edit in &patch.edits {
                        log::debug!("edit {} -> {:?}", edit.span, edit.text);
                    }
                }
                Err(e) => println!("line {}: {cmd:?} refused: {e}", lineno + 1),
            }
        }

        if args.check {
            print_availability(&session);
        }
    }

    println!("{}", session.render());
    print_drafts(&session);
    Ok(())
}

/// One script line to commands; empty for blanks and comments. `type`
/// expands to one command per character.
fn parse_line(line: &str) -> Result<Vec<Cmd>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Vec::new());
    }

    let (verb, rest) = match line.split_once(' ') {
        Some((v, r)) => (v, r.trim()),
        None => (line, ""),
    };

    let cmds = match verb {
        "insert" => {
            if rest.is_empty() {
                bail!("`insert` needs a construct keyword");
            }
            vec![Cmd::InsertConstruct {
                keyword: rest.to_string(),
            }]
        }
        "type" => {
            if rest.is_empty() {
                bail!("`type` needs text to type");
            }
            rest.chars().map(Cmd::TypeChar).collect()
        }
        "cursor" => {
            let (line, col) = rest
                .split_once(' ')
                .context("`cursor` needs `<line> <col>`")?;
            vec![Cmd::SetCursor(Pos::new(line.trim().parse()?, col.trim().parse()?))]
        }
        "backspace" => vec![Cmd::Backspace],
        "newline" => vec![Cmd::NewLine],
        "delete" => vec![Cmd::DeleteFocused],
        "left" => vec![Cmd::NavigateLeft],
        "right" => vec![Cmd::NavigateRight],
        "up" => vec![Cmd::NavigateUp],
        "down" => vec![Cmd::NavigateDown],
        other => bail!("unknown command `{other}`"),
    };
    Ok(cmds)
}

fn print_availability(session: &Session) {
    for (id, result) in session.availability() {
        let keyword = &session.grammar().def(id).keyword;
        match result {
            InsertionResult::Valid => println!("  {keyword}: ok"),
            InsertionResult::Invalid { reason } => println!("  {keyword}: invalid ({reason})"),
            InsertionResult::DraftMode(record) => {
                println!("  {keyword}: draft ({})", record.message)
            }
        }
    }
}

fn print_drafts(session: &Session) {
    for id in session.open_drafts() {
        let node = session.tree().node(*id);
        if let Some(record) = &node.draft {
            println!("draft at {}: {}", node.span(), record.message);
            for action in &record.actions {
                println!("  fix: {}", action.label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("").unwrap(), vec![]);
        assert_eq!(parse_line("   ").unwrap(), vec![]);
        assert_eq!(parse_line("# insert if").unwrap(), vec![]);
    }

    #[test]
    fn commands_parse() {
        assert_eq!(
            parse_line("insert if").unwrap(),
            vec![Cmd::InsertConstruct {
                keyword: "if".to_string()
            }]
        );
        assert_eq!(
            parse_line("type ab").unwrap(),
            vec![Cmd::TypeChar('a'), Cmd::TypeChar('b')]
        );
        assert_eq!(
            parse_line("cursor 2 5").unwrap(),
            vec![Cmd::SetCursor(Pos::new(2, 5))]
        );
        assert_eq!(parse_line("down").unwrap(), vec![Cmd::NavigateDown]);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse_line("insert").is_err());
        assert!(parse_line("type").is_err());
        assert!(parse_line("cursor 2").is_err());
        assert!(parse_line("wiggle").is_err());
    }
}
