//! Plain-text rendering of reconciliation results.

use std::fmt::Write as _;

use crate::reconcile::ReconciliationReport;

const HEADERS: [&str; 7] = [
    "dimension",
    "fact_keys",
    "dim_keys",
    "matched",
    "coverage",
    "unused",
    "status",
];

fn coverage_rows(report: &ReconciliationReport) -> Vec<[String; 7]> {
    report
        .dimensions
        .iter()
        .map(|c| {
            [
                c.dimension.table_name().to_string(),
                c.fact_distinct.to_string(),
                c.dimension_distinct.to_string(),
                c.matches.to_string(),
                format!("{:.2}%", c.coverage()),
                c.unused.to_string(),
                c.verdict.label().to_string(),
            ]
        })
        .collect()
}

fn push_line(output: &mut String, cells: &[&str], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(output, "{}", line.trim_end());
}

/// Aligned coverage table, then the unresolved sample of each failing
/// dimension, then the overall result.
pub fn render_report(report: &ReconciliationReport) -> String {
    let rows = coverage_rows(report);
    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    push_line(&mut output, &HEADERS, &widths);
    let rule = widths.map(|w| "-".repeat(w));
    push_line(&mut output, &rule.each_ref().map(String::as_str), &widths);
    for row in &rows {
        push_line(&mut output, &row.each_ref().map(String::as_str), &widths);
    }

    for coverage in report.failures() {
        if coverage.missing_total == 0 {
            continue;
        }
        let _ = writeln!(
            output,
            "\n{}: {} unresolved key(s), sample:",
            coverage.dimension.table_name(),
            coverage.missing_total
        );
        for fingerprint in &coverage.missing_sample {
            let _ = writeln!(output, "  {fingerprint}");
        }
    }

    let _ = writeln!(
        output,
        "\nreferential integrity: {}",
        if report.passed() { "PASSED" } else { "FAILED" }
    );
    output
}
