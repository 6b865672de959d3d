use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::format::LocalZone;
use crate::probe::UsageReport;

pub const DEFAULT_REPORT_FILE: &str = "anthropic_token_usage.txt";

pub const NOTE: &str = "Note: The rate limits shown below represent the most restrictive limits currently in effect.\n\
These are typically per-minute limits unless a more restrictive limit (like daily) has been reached.";

const HEADERS: [&str; 6] = [
    "Model",
    "Req Limit",
    "Req Remaining",
    "Token Limit",
    "Tokens Remaining",
    "Reset Time",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

const ALIGN: [Align; 6] = [
    Align::Left,
    Align::Right,
    Align::Right,
    Align::Right,
    Align::Right,
    Align::Left,
];

fn rows(report: &UsageReport) -> Vec<[String; 6]> {
    report
        .iter()
        .map(|(model, r)| {
            [
                model.to_string(),
                r.requests_limit.clone(),
                r.requests_remaining.clone(),
                r.tokens_limit.clone(),
                r.tokens_remaining.clone(),
                r.reset_time.clone(),
            ]
        })
        .collect()
}

fn pad(cell: &str, width: usize, align: Align) -> String {
    match align {
        Align::Left => format!("{cell:<width$}"),
        Align::Right => format!("{cell:>width$}"),
    }
}

fn rule(widths: &[usize], fill: char) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.extend(std::iter::repeat_n(fill, w + 2));
        line.push('+');
    }
    line
}

fn row_line<S: AsRef<str>>(cells: &[S], widths: &[usize], align: &[Align]) -> String {
    let mut line = String::from("|");
    for ((cell, w), a) in cells.iter().zip(widths).zip(align) {
        line.push(' ');
        line.push_str(&pad(cell.as_ref(), *w, *a));
        line.push_str(" |");
    }
    line
}

/// Grid table: `=` under the header, `-` between rows. No trailing newline.
pub fn render_table(report: &UsageReport) -> String {
    let rows = rows(report);
    let widths: Vec<usize> = (0..HEADERS.len())
        .map(|i| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(HEADERS[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = vec![
        rule(&widths, '-'),
        row_line(&HEADERS, &widths, &ALIGN),
        rule(&widths, '='),
    ];
    for r in &rows {
        lines.push(row_line(r, &widths, &ALIGN));
        lines.push(rule(&widths, '-'));
    }
    if rows.is_empty() {
        lines.pop();
        lines.push(rule(&widths, '-'));
    }
    lines.join("\n")
}

/// Full text shown on the console and written to the report file.
pub fn render_document(zone: LocalZone, report: &UsageReport) -> String {
    format!(
        "System Timezone: {zone}\n\n{NOTE}\n\nCurrent Rate Limits and Usage:\n{}\n",
        render_table(report)
    )
}

pub fn write_report(path: &Path, doc: &str) -> Result<()> {
    fs::write(path, doc).with_context(|| format!("write report {}", path.display()))?;
    tracing::info!("report written to {}", path.display());
    Ok(())
}
