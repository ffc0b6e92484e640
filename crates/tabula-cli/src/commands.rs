//! Backslash meta-commands for the REPL.
//!
//! Provides `\d`, `\explain`, `\timing`, `\o`, `\q` and `\?`.

use anyhow::Result;

use crate::formatter::OutputFormat;
use crate::shell::Shell;

/// Result of executing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Continue the REPL.
    Continue,
    /// Exit the REPL.
    Exit,
    /// Output a message.
    Output(String),
}

/// A parsed command.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Quit the REPL.
    Quit,
    /// Show help.
    Help,
    /// List tables, or describe one.
    Describe(Option<String>),
    /// Show the plans of a query.
    Explain(Option<String>),
    /// Toggle timing.
    Timing,
    /// Show or set the output format.
    Format(Option<String>),
    /// Unknown command.
    Unknown(String),
}

impl Command {
    /// Parses a command string.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let cmd = input.strip_prefix('\\').unwrap_or(input);

        let mut parts = cmd.splitn(2, char::is_whitespace);
        let cmd_name = parts.next().unwrap_or_default().to_lowercase();
        let args = parts
            .next()
            .map(|s| s.trim().trim_end_matches(';').trim().to_string())
            .filter(|s| !s.is_empty());

        match cmd_name.as_str() {
            "q" | "quit" | "exit" => Command::Quit,
            "?" | "h" | "help" => Command::Help,
            "d" | "dt" => Command::Describe(args),
            "explain" => Command::Explain(args),
            "timing" | "t" => Command::Timing,
            "o" | "format" => Command::Format(args),
            _ => Command::Unknown(cmd_name),
        }
    }

    /// Executes the command.
    pub fn execute(&self, shell: &mut Shell) -> Result<CommandResult> {
        match self {
            Command::Quit => Ok(CommandResult::Exit),

            Command::Help => Ok(CommandResult::Output(Self::help_text())),

            Command::Describe(name) => Ok(CommandResult::Output(shell.describe(name.as_deref())?)),

            Command::Explain(Some(sql)) => Ok(CommandResult::Output(shell.explain(sql)?)),

            Command::Explain(None) => Ok(CommandResult::Output(
                "Usage: \\explain <query>".to_string(),
            )),

            Command::Timing => {
                let message = if shell.toggle_timing() {
                    "Timing is on."
                } else {
                    "Timing is off."
                };
                Ok(CommandResult::Output(message.to_string()))
            }

            Command::Format(None) => Ok(CommandResult::Output(format!(
                "Output format is {}.",
                shell.format()
            ))),

            Command::Format(Some(name)) => match name.parse::<OutputFormat>() {
                Ok(format) => {
                    shell.set_format(format);
                    Ok(CommandResult::Output(format!("Output format set to {}.", format)))
                }
                Err(message) => Ok(CommandResult::Output(message)),
            },

            Command::Unknown(cmd) => Ok(CommandResult::Output(format!(
                "Unknown command '\\{}'. Type \\? for help.",
                cmd
            ))),
        }
    }

    /// Returns help text.
    fn help_text() -> String {
        r#"Tabula CLI Commands
===================

General:
  \q, \quit         Exit the CLI
  \?, \help         Show this help

Tables:
  \d                List registered tables
  \d NAME           Show the schema of a table

Queries:
  \explain QUERY    Show the plan before and after optimization
  \timing           Toggle timing display
  \o FORMAT         Set output format (table, json, csv, raw)

Type SQL queries followed by a semicolon to run them.
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;

    #[test]
    fn test_parse_quit() {
        assert_eq!(Command::parse("\\q"), Command::Quit);
        assert_eq!(Command::parse("\\quit"), Command::Quit);
        assert_eq!(Command::parse("\\exit"), Command::Quit);
    }

    #[test]
    fn test_parse_help() {
        assert_eq!(Command::parse("\\?"), Command::Help);
        assert_eq!(Command::parse("\\help"), Command::Help);
    }

    #[test]
    fn test_parse_describe() {
        assert_eq!(Command::parse("\\d"), Command::Describe(None));
        assert_eq!(
            Command::parse("\\d sales"),
            Command::Describe(Some("sales".to_string()))
        );
    }

    #[test]
    fn test_parse_explain_strips_semicolon() {
        assert_eq!(
            Command::parse("\\explain SELECT 1;"),
            Command::Explain(Some("SELECT 1".to_string()))
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(Command::parse("\\xyz"), Command::Unknown("xyz".to_string()));
    }

    #[test]
    fn test_execute_format_and_timing() {
        let mut shell = Shell::new(&CliConfig::default(), OutputFormat::Table).unwrap();

        let result = Command::parse("\\o json").execute(&mut shell).unwrap();
        assert_eq!(result, CommandResult::Output("Output format set to json.".into()));
        assert_eq!(shell.format(), OutputFormat::Json);

        let result = Command::parse("\\o xml").execute(&mut shell).unwrap();
        assert!(matches!(result, CommandResult::Output(msg) if msg.starts_with("Unknown format")));
        assert_eq!(shell.format(), OutputFormat::Json);

        let result = Command::parse("\\timing").execute(&mut shell).unwrap();
        assert_eq!(result, CommandResult::Output("Timing is on.".into()));

        assert_eq!(
            Command::parse("\\q").execute(&mut shell).unwrap(),
            CommandResult::Exit
        );
    }
}
