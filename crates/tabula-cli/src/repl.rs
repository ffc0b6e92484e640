//! Interactive REPL (Read-Eval-Print-Loop) for Tabula.
//!
//! Provides an interactive SQL shell with command history, line editing,
//! and multi-line input support.

use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::Result;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{CompletionType, Config, EditMode, Editor, Helper};
use tracing::{debug, error};

use crate::commands::{Command, CommandResult};
use crate::shell::Shell;

/// The REPL prompt shown when waiting for input.
const PROMPT: &str = "tabula> ";

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "ORDER", "ASC", "DESC", "NULLS",
    "FIRST", "LAST", "LIMIT", "OFFSET", "DISTINCT", "AS", "JOIN", "LEFT", "RIGHT", "FULL",
    "INNER", "OUTER", "CROSS", "SEMI", "ANTI", "ON", "USING", "UNION", "ALL", "AND", "OR",
    "NOT", "NULL", "IS", "IN", "LIKE", "BETWEEN", "CASE", "WHEN", "THEN", "ELSE", "END",
    "CAST", "OVER", "PARTITION", "COUNT", "SUM", "AVG", "MEAN", "MEDIAN", "MIN", "MAX",
    "RANK", "DENSE_RANK", "ROW_NUMBER", "LAG", "LEAD", "COALESCE", "EXPLAIN",
];

/// REPL helper for rustyline: keyword completion and multi-line input.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
            .map(|i| i + 1)
            .unwrap_or(0);

        let word_upper = line[start..pos].to_uppercase();
        let matches = KEYWORDS
            .iter()
            .filter(|kw| !word_upper.is_empty() && kw.starts_with(&word_upper))
            .map(|kw| Pair {
                display: kw.to_string(),
                replacement: kw.to_string(),
            })
            .collect();

        Ok((start, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;
}

impl Highlighter for ReplHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }
}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let trimmed = ctx.input().trim();

        // Meta-commands are single-line; queries end with a semicolon.
        if trimmed.is_empty() || trimmed.starts_with('\\') || trimmed.ends_with(';') {
            return Ok(ValidationResult::Valid(None));
        }

        Ok(ValidationResult::Incomplete)
    }
}

impl Helper for ReplHelper {}

/// Interactive REPL for Tabula.
pub struct Repl {
    shell: Shell,
    editor: Editor<ReplHelper, DefaultHistory>,
    history_file: Option<PathBuf>,
}

impl Repl {
    /// Creates a new REPL instance.
    pub fn new(shell: Shell, history_file: Option<PathBuf>, history_size: usize) -> Result<Self> {
        let rl_config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .max_history_size(history_size)?
            .build();

        let mut editor = Editor::with_config(rl_config)?;
        editor.set_helper(Some(ReplHelper));

        if let Some(ref path) = history_file {
            if path.exists() {
                if let Err(e) = editor.load_history(path) {
                    debug!("Failed to load history: {}", e);
                }
            }
        }

        Ok(Self {
            shell,
            editor,
            history_file,
        })
    }

    /// Prints the welcome banner.
    pub fn print_banner(&self) {
        println!("Tabula v{}", env!("CARGO_PKG_VERSION"));
        println!("Type \\? for help, \\q to quit.\n");
    }

    /// Runs the main REPL loop.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    if let Err(e) = self.editor.add_history_entry(line) {
                        debug!("Failed to add history entry: {}", e);
                    }

                    match self.process_line(line) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("ERROR: {:#}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("\\q");
                    break;
                }
                Err(e) => {
                    error!("Readline error: {}", e);
                    break;
                }
            }
        }

        self.save_history();
        Ok(())
    }

    /// Processes a single line of input. Returns true to exit.
    fn process_line(&mut self, line: &str) -> Result<bool> {
        if line.starts_with('\\') {
            return match Command::parse(line).execute(&mut self.shell)? {
                CommandResult::Continue => Ok(false),
                CommandResult::Exit => Ok(true),
                CommandResult::Output(msg) => {
                    println!("{}", msg);
                    Ok(false)
                }
            };
        }

        for statement in crate::split_statements(line) {
            println!("{}", self.shell.run_sql(statement)?);
        }
        Ok(false)
    }

    fn save_history(&mut self) {
        if let Some(ref path) = self.history_file {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    debug!("Failed to create history directory: {}", e);
                    return;
                }
            }
            if let Err(e) = self.editor.save_history(path) {
                debug!("Failed to save history: {}", e);
            }
        }
    }
}
