//! Interactive console
//!
//! Lines starting with `!` are commands, everything else is an expression.

use std::path::Path;

use norn_list::{Recipients, SharedEnvironment};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::store::{self, StoreError};

const PROMPT: &str = "> ";

const HELP: &str = "\
Commands:
  !save <file>   Save every list definition to a file
  !load <file>   Evaluate every line of a file
  !env           Show every list definition
  !help          Show this help
Anything else is evaluated as a list expression.";

/// What the console prints for one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Error(String),
}

pub struct Console {
    env: SharedEnvironment,
}

impl Console {
    pub fn new(env: SharedEnvironment) -> Self {
        Self { env }
    }

    pub fn handle_line(&self, line: &str) -> Reply {
        let line = line.trim();
        match line.strip_prefix('!') {
            Some(command) => self.command(command.trim()),
            None => self.expression(line),
        }
    }

    fn command(&self, command: &str) -> Reply {
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match (name, arg) {
            ("save", file) if !file.is_empty() => match store::save(&self.env, Path::new(file)) {
                Ok(count) => Reply::Output(format!("saved {} lists to {}", count, file)),
                Err(StoreError::Write { .. }) => Reply::Error(
                    "either the folder does not exist or the filename contains illegal characters".into(),
                ),
                Err(e) => Reply::Error(e.to_string()),
            },
            ("load", file) if !file.is_empty() => match store::load(&self.env, Path::new(file)) {
                Ok(count) => Reply::Output(format!("loaded {} lines from {}", count, file)),
                Err(e) => Reply::Error(e.to_string()),
            },
            ("save" | "load", _) => Reply::Error(format!("usage: !{} <file>", name)),
            ("env", "") => Reply::Output(self.describe_environment()),
            ("help", "") => Reply::Output(HELP.to_string()),
            _ => Reply::Error(format!("unknown command: !{}", command)),
        }
    }

    fn expression(&self, line: &str) -> Reply {
        match self.env.evaluate(line) {
            Ok(result) => Reply::Output(join_recipients(&result.recipients, ", ")),
            Err(e) => Reply::Error(e.to_string()),
        }
    }

    fn describe_environment(&self) -> String {
        self.env
            .snapshot()
            .into_iter()
            .map(|(name, value)| format!("{} = {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Read lines until Ctrl-C or Ctrl-D.
    pub fn run(&self) -> rustyline::Result<()> {
        let mut editor = DefaultEditor::new()?;
        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        editor.add_history_entry(line.as_str())?;
                    }
                    match self.handle_line(&line) {
                        Reply::Output(text) => println!("{}", text),
                        Reply::Error(text) => eprintln!("error: {}", text),
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    debug!("console closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn join_recipients(recipients: &Recipients, separator: &str) -> String {
    recipients.iter().map(String::as_str).collect::<Vec<_>>().join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn output(text: &str) -> Reply {
        Reply::Output(text.to_string())
    }

    #[test]
    fn test_expressions_print_sorted_recipients() {
        let console = Console::new(SharedEnvironment::new());
        assert_eq!(console.handle_line("c@x, A@x, b@x"), output("a@x, b@x, c@x"));
        assert_eq!(console.handle_line(""), output(""));
    }

    #[test]
    fn test_bindings_persist_between_lines() {
        let console = Console::new(SharedEnvironment::new());
        console.handle_line("hobbits = frodo@shire, sam@shire");
        assert_eq!(console.handle_line("hobbits ! sam@shire"), output("frodo@shire"));
    }

    #[test]
    fn test_errors_are_reported() {
        let console = Console::new(SharedEnvironment::new());
        assert!(matches!(console.handle_line("a@b@c"), Reply::Error(_)));
        assert!(matches!(console.handle_line("a = b; b = a"), Reply::Error(m) if m.contains("recursive")));
        assert!(matches!(console.handle_line("!frobnicate"), Reply::Error(m) if m.contains("unknown command")));
        assert!(matches!(console.handle_line("!save"), Reply::Error(m) if m.contains("usage")));
    }

    #[test]
    fn test_env_lists_bindings() {
        let console = Console::new(SharedEnvironment::new());
        console.handle_line("b = x@y; a = b, z@y");
        assert_eq!(console.handle_line("!env"), output("a = b , z@y\nb = x@y"));
    }

    #[test]
    fn test_save_and_load_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists.txt");
        let path = path.to_str().unwrap();

        let first = Console::new(SharedEnvironment::new());
        first.handle_line("team = a@x, b@x");
        assert!(matches!(first.handle_line(&format!("!save {}", path)), Reply::Output(_)));

        let second = Console::new(SharedEnvironment::new());
        assert!(matches!(second.handle_line(&format!("!load {}", path)), Reply::Output(_)));
        assert_eq!(second.handle_line("team"), output("a@x, b@x"));
    }

    #[test]
    fn test_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(SharedEnvironment::new());

        let missing = dir.path().join("missing.txt");
        let reply = console.handle_line(&format!("!load {}", missing.display()));
        assert!(matches!(reply, Reply::Error(m) if m.contains("file does not exist")));

        let bad = dir.path().join("no/such/folder.txt");
        let reply = console.handle_line(&format!("!save {}", bad.display()));
        assert!(matches!(reply, Reply::Error(m) if m.contains("folder does not exist")));
    }
}
