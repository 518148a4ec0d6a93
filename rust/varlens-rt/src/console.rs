//! Diagnostic console commands.
//!
//! Evaluate requests whose expression starts with a backtick are routed here
//! instead of to the expression resolver. Commands inspect or adjust the
//! session's formatter registry and counters and always answer with text; an
//! unknown command is an answer too, never a failed request.

use std::fmt::Write as _;

use varlens_core::TypeDescriptor;

use crate::formatters::{FormatterDiagnostics, FormatterRegistry};

/// Prefix that marks an evaluate expression as a console command.
pub const CONSOLE_PREFIX: char = '`';

const HELP: &str = "\
formatter list              registered formatters with pattern and capabilities
formatter counters          size and materialize calls per formatter
formatter size-calls        type names whose size was queried
formatter delete <name>     unregister a formatter
formatter clear             unregister every formatter
formatter reset             zero the counters
help                        this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    List,
    Counters,
    SizeCalls,
    Delete(String),
    Clear,
    Reset,
}

impl ConsoleCommand {
    /// Parse a command line, with or without the leading backtick.
    pub fn parse(input: &str) -> Result<Self, String> {
        let line = input.trim().trim_start_matches(CONSOLE_PREFIX).trim();
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] | ["help"] => Ok(ConsoleCommand::Help),
            ["formatter", "list"] => Ok(ConsoleCommand::List),
            ["formatter", "counters"] => Ok(ConsoleCommand::Counters),
            ["formatter", "size-calls"] => Ok(ConsoleCommand::SizeCalls),
            ["formatter", "delete", name] => Ok(ConsoleCommand::Delete(name.to_string())),
            ["formatter", "delete"] => Err("usage: formatter delete <name>".to_string()),
            ["formatter", "clear"] => Ok(ConsoleCommand::Clear),
            ["formatter", "reset"] => Ok(ConsoleCommand::Reset),
            _ => Err(format!("unknown command '{}'; try `help", line)),
        }
    }

    pub fn execute(
        &self,
        registry: &mut FormatterRegistry,
        diagnostics: &mut FormatterDiagnostics,
    ) -> String {
        match self {
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::List => {
                if registry.is_empty() {
                    return "no formatters registered".to_string();
                }
                let mut out = String::new();
                for reg in registry.registrations() {
                    let probe = TypeDescriptor::scalar(reg.pattern.to_string());
                    let _ = writeln!(
                        out,
                        "{}  {}  [{}]",
                        reg.name,
                        reg.pattern,
                        reg.formatter.capabilities(&probe)
                    );
                }
                out.trim_end().to_string()
            }
            ConsoleCommand::Counters => {
                let mut out = String::new();
                for (name, counts) in diagnostics.iter() {
                    let _ = write!(
                        out,
                        "{}: size={} materialize={}",
                        name, counts.size_calls, counts.materialize_calls
                    );
                    if counts.timed_out > 0 {
                        let _ = write!(out, " timed_out={}", counts.timed_out);
                    }
                    out.push('\n');
                }
                if out.is_empty() {
                    "no formatter calls".to_string()
                } else {
                    out.trim_end().to_string()
                }
            }
            ConsoleCommand::SizeCalls => diagnostics.render_size_log(),
            ConsoleCommand::Delete(name) => match registry.unregister(name) {
                Some(reg) => format!("deleted formatter '{}' ({})", reg.name, reg.pattern),
                None => format!("no formatter named '{}'", name),
            },
            ConsoleCommand::Clear => {
                let removed = registry.len();
                registry.clear();
                format!("removed {} formatters", removed)
            }
            ConsoleCommand::Reset => {
                diagnostics.reset();
                "counters reset".to_string()
            }
        }
    }
}

/// Parse and run `input`, answering parse errors as text.
pub fn run(
    input: &str,
    registry: &mut FormatterRegistry,
    diagnostics: &mut FormatterDiagnostics,
) -> String {
    match ConsoleCommand::parse(input) {
        Ok(command) => command.execute(registry, diagnostics),
        Err(message) => message,
    }
}
