// src/cli/output.rs

//! Terminal rendering of outcomes and listings.

use crate::core::outcome::{Outcome, OutcomeKind};
use anyhow::{Result, anyhow};
use colored::Colorize;
use serde::Serialize;

/// Prints a non-error outcome. An error outcome becomes the returned `Err`
/// so the binary prints it to stderr and exits with status 1.
pub fn report(outcome: Outcome) -> Result<()> {
    match outcome.kind {
        OutcomeKind::Error => return Err(anyhow!(outcome.message)),
        OutcomeKind::Success => println!("{}", outcome.message.green()),
        OutcomeKind::Info => println!("{}", outcome.message.cyan()),
        OutcomeKind::Warning => println!("{}", outcome.message.yellow()),
        OutcomeKind::Plain => println!("{}", outcome.message),
    }
    Ok(())
}

/// Machine-readable listing for a desktop bridge or scripts.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns; the last column is not padded.
pub fn table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<String>| {
        let last = cells.len().saturating_sub(1);
        cells
            .into_iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i == last {
                    cell
                } else {
                    format!("{:<width$}", cell, width = width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(header.iter().map(|h| h.to_string()).collect())
        .bold()
        .to_string()];
    lines.extend(rows.iter().map(|row| render(row.clone())));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_outcome_becomes_err() {
        let err = report(Outcome::error("Project 'x' not found.")).unwrap_err();
        assert_eq!(err.to_string(), "Project 'x' not found.");
        assert!(report(Outcome::plain("hi")).is_ok());
    }

    #[test]
    fn test_table_aligns_columns() {
        colored::control::set_override(false);
        let text = table(
            &["Name", "Port"],
            &[
                vec!["app".into(), "8080".into()],
                vec!["backend".into(), "3000".into()],
            ],
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Name     Port");
        assert_eq!(lines[1], "app      8080");
        assert_eq!(lines[2], "backend  3000");
    }
}
