//! Runs checkers and turns findings into document diagnostics.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::checkers::{builtin_checkers, CheckContext, Checker};
use super::{Diagnostic, DiagnosticCode, Finding, Severity, Target};
use crate::config::Settings;
use crate::nodes::{walk, ModuleNode, NodeIndex};
use crate::python::PackageIndex;

/// Prefix of every diagnostic ID.
const DIAGNOSTIC_PREFIX: &str = "AZ_PY_";

/// Result of a diagnostic run.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Findings that could not be attributed to any line.
    pub unclaimed: usize,
}

impl DiagnosticReport {
    pub fn count(&self, level: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.level == level).count()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == Severity::Error)
    }
}

/// Collects findings from nodes and checkers, attributes them to lines and
/// assigns serial IDs.
pub struct DiagnosticEngine<'a> {
    settings: &'a Settings,
    checkers: Vec<Box<dyn Checker>>,
}

impl<'a> DiagnosticEngine<'a> {
    /// An engine with the built-in checkers.
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            checkers: builtin_checkers(),
        }
    }

    /// An engine with no checkers; only recorded findings are reported.
    pub fn empty(settings: &'a Settings) -> Self {
        Self {
            settings,
            checkers: Vec::new(),
        }
    }

    pub fn with_checker(mut self, checker: Box<dyn Checker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Produce the diagnostics for a built graph.
    ///
    /// `recorded` holds findings raised before the graph existed (import
    /// failures); they are reported first, followed by findings recorded on
    /// nodes and then checker findings in registration order.
    pub fn run(
        &self,
        modules: &[ModuleNode],
        index: &PackageIndex,
        nodes: &NodeIndex,
        recorded: Vec<Finding>,
    ) -> DiagnosticReport {
        let mut findings = recorded;
        for module in modules {
            walk(&module.children, &mut |node| findings.extend(node.errors().iter().cloned()));
        }

        let ctx = CheckContext {
            modules,
            index,
            settings: self.settings,
        };
        for checker in &self.checkers {
            if checker.codes().iter().all(|c| self.settings.is_disabled(*c)) {
                debug!(checker = checker.name(), "checker disabled");
                continue;
            }
            let produced = checker.check(&ctx);
            debug!(checker = checker.name(), findings = produced.len(), "checker finished");
            findings.extend(produced);
        }

        let report = self.attribute(findings, nodes);
        info!(
            diagnostics = report.diagnostics.len(),
            unclaimed = report.unclaimed,
            "diagnostics collected"
        );
        report
    }

    fn attribute(&self, findings: Vec<Finding>, nodes: &NodeIndex) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();
        let mut claimed_keys: BTreeSet<(DiagnosticCode, String)> = BTreeSet::new();
        let mut unclaimed_keys: BTreeSet<(DiagnosticCode, String)> = BTreeSet::new();
        let mut serial: u64 = 0;

        for finding in findings {
            if self.settings.is_disabled(finding.code) {
                continue;
            }
            let target_id = match &finding.target {
                Target::Node(id) => Some(id.clone()),
                Target::Source { file, line } => nodes.claim_source(file, *line).map(str::to_string),
                Target::File(_) => None,
            };
            let fresh = match &target_id {
                Some(id) => claimed_keys.insert((finding.code, id.clone())),
                None => unclaimed_keys.insert((finding.code, finding.message.clone())),
            };
            if !fresh {
                continue;
            }
            if target_id.is_none() {
                report.unclaimed += 1;
            }
            serial += 1;
            report.diagnostics.push(Diagnostic {
                diagnostic_id: format!("{}{}", DIAGNOSTIC_PREFIX, serial),
                text: format!("{} [{}]", finding.message, finding.code),
                help_link_uri: Some(self.settings.help_link(finding.code)),
                target_id: target_id.unwrap_or_default(),
                level: self.settings.severity_for(finding.code),
                code: finding.code,
                serial,
            });
        }
        report
    }
}
