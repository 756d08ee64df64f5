//! Operator confirmation
//!
//! The question goes to stderr; stdout carries only the report so
//! `fix --json` stays parseable.

use owo_colors::OwoColorize;
use std::io::{self, BufRead, IsTerminal, Write};

/// Ask a yes/no question on the terminal. Anything but an explicit yes,
/// including a non-interactive stdin, is a no.
pub fn confirm(question: &str) -> bool {
    if !io::stdin().is_terminal() {
        return false;
    }

    if write_question(&mut io::stderr(), question).is_err() {
        return false;
    }

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => is_yes(&line),
        Err(_) => false,
    }
}

fn write_question<W: Write>(out: &mut W, question: &str) -> io::Result<()> {
    write!(
        out,
        "{}  {} {} ",
        "?".bright_cyan().bold(),
        question.bright_white(),
        "[y/N]".dimmed()
    )?;
    out.flush()
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
