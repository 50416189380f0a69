//! Terminal summary of a generation run.
//!
//! The document itself goes to the output file; this is the short colored
//! recap printed to stderr afterwards.

use colored::*;
use std::path::Path;

use crate::diagnostics::{Diagnostic, DiagnosticReport, Severity};

/// Diagnostics listed individually before the summary truncates.
const MAX_LISTED: usize = 20;

/// Write the run summary to stderr.
pub fn write_summary(package: &str, version: &str, output: &Path, report: &DiagnosticReport, verbose: bool) {
    eprintln!();
    eprint!("  ");
    eprint!("{}", "apistubgen".cyan().bold());
    eprintln!(" v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();

    eprint!("  {}", "Package:  ".dimmed());
    eprintln!("{} {}", package, version);
    eprint!("  {}", "Output:   ".dimmed());
    eprintln!("{}", output.display());
    eprintln!();

    write_counts(report);

    let listed: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| verbose || d.level == Severity::Error)
        .collect();
    if !listed.is_empty() {
        eprintln!();
        write_diagnostics(&listed);
    }

    eprintln!();
    write_final_status(report);
    eprintln!();
}

fn write_counts(report: &DiagnosticReport) {
    eprint!("  {}", "Diagnostics:".bold());
    eprint!("  {}", format!("{} errors", report.count(Severity::Error)).red());
    eprint!("  {}", format!("{} warnings", report.count(Severity::Warning)).yellow());
    eprint!("  {}", format!("{} info", report.count(Severity::Info)).blue());
    if report.unclaimed > 0 {
        eprint!("  {}", format!("({} unclaimed)", report.unclaimed).dimmed());
    }
    eprintln!();
}

fn write_diagnostics(diagnostics: &[&Diagnostic]) {
    for d in diagnostics.iter().take(MAX_LISTED) {
        write_severity_tag(d.level);
        eprint!("   ");
        eprint!("{:<10}", d.diagnostic_id.dimmed());
        if d.is_claimed() {
            eprint!("{}", d.target_id.blue());
        }
        eprintln!();
        eprintln!("            {}", d.text);
    }
    if diagnostics.len() > MAX_LISTED {
        eprintln!(
            "    {}",
            format!("... and {} more", diagnostics.len() - MAX_LISTED).dimmed()
        );
    }
}

fn write_severity_tag(level: Severity) {
    match level {
        Severity::Error => eprint!("    {} ", "ERROR".red()),
        Severity::Warning => eprint!("    {} ", "WARN ".yellow()),
        Severity::Info => eprint!("    {} ", "INFO ".blue()),
        Severity::Default => eprint!("    {} ", "NOTE ".dimmed()),
    }
}

fn write_final_status(report: &DiagnosticReport) {
    eprint!("  ");
    if report.has_errors() {
        eprint!("{}", "FAILED".red());
        eprint!("  {}", "error-level diagnostics were reported".dimmed());
    } else {
        eprint!("{}", "DONE".green());
    }
    eprintln!();
}
