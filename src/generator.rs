//! The generation pipeline.
//!
//! acquire -> install -> discover -> index -> build graph -> diagnose -> emit.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::apiview::ApiView;
use crate::config::Settings;
use crate::diagnostics::{DiagnosticCode, DiagnosticEngine, DiagnosticReport, Finding};
use crate::discover::{discover, Discovery};
use crate::nodes::{GraphBuilder, NodeIndex};
use crate::package::{
    acquire, install_package, CrossLanguageMap, Installer, NoopInstaller, PackageKind, PipInstaller, Scratch,
};
use crate::python::PackageIndex;
use crate::tokens::{build_navigation, Emitter};

/// Output of one run.
#[derive(Debug)]
pub struct Generated {
    pub document: ApiView,
    pub report: DiagnosticReport,
}

/// Configures and runs a generation.
pub struct Generator {
    pkg_path: PathBuf,
    temp_path: PathBuf,
    settings: Settings,
    mapping_path: Option<PathBuf>,
    source_url: Option<String>,
    filter_namespace: Option<String>,
    installer: Option<Box<dyn Installer>>,
}

impl Generator {
    pub fn new<P: AsRef<Path>, T: AsRef<Path>>(pkg_path: P, temp_path: T) -> Self {
        Self {
            pkg_path: pkg_path.as_ref().to_path_buf(),
            temp_path: temp_path.as_ref().to_path_buf(),
            settings: Settings::default(),
            mapping_path: None,
            source_url: None,
            filter_namespace: None,
            installer: None,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn mapping_path(mut self, path: Option<PathBuf>) -> Self {
        self.mapping_path = path;
        self
    }

    pub fn source_url(mut self, url: Option<String>) -> Self {
        self.source_url = url;
        self
    }

    pub fn filter_namespace(mut self, namespace: Option<String>) -> Self {
        self.filter_namespace = namespace;
        self
    }

    /// Do not install the package; sources are read from where they were extracted.
    pub fn skip_install(mut self, skip: bool) -> Self {
        if skip {
            self.installer = Some(Box::new(NoopInstaller));
        }
        self
    }

    pub fn installer(mut self, installer: Box<dyn Installer>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn generate(mut self) -> anyhow::Result<Generated> {
        // Reject bad input before creating anything on disk.
        PackageKind::detect(&self.pkg_path)?;

        let installer: Box<dyn Installer> = match self.installer.take() {
            Some(installer) => installer,
            None => Box::new(PipInstaller::locate(self.settings.install.python.as_deref())?),
        };

        let scratch = Scratch::create(&self.temp_path)?;
        let package = acquire(&self.pkg_path, &scratch, installer.python())?;
        install_package(
            installer.as_ref(),
            &package.input,
            &package.metadata.extras,
            self.settings.install_extras(),
        )?;

        let discovery = discover(&package.root, self.filter_namespace.as_deref(), &self.settings)?;
        info!(
            namespace = %discovery.namespace,
            modules = discovery.modules.len(),
            "modules discovered"
        );
        let index = PackageIndex::load(&discovery.import_root, &discovery.namespace)
            .with_context(|| format!("indexing {}", discovery.import_root.display()))?;

        let recorded = import_failures(&index, &discovery);
        let emitted: Vec<String> = discovery
            .modules
            .iter()
            .filter(|m| index.module(m).is_some())
            .cloned()
            .collect();

        let graph = GraphBuilder::new(&index, &self.settings).build(&emitted);
        let nodes = NodeIndex::build(&graph);
        let report = DiagnosticEngine::new(&self.settings).run(&graph, &index, &nodes, recorded);
        if report.unclaimed > 0 {
            warn!(count = report.unclaimed, "findings not attributable to any line");
        }

        let mapping = self.load_mapping(&package.root, &discovery)?;
        let tokens = Emitter::new(&self.settings, &nodes)
            .with_mapping(mapping.as_ref())
            .with_source_url(self.source_url.as_deref(), &package.root)
            .emit(&graph);

        let mut document = ApiView::new(&package.metadata.name, &package.metadata.version);
        document.tokens = tokens;
        document.navigation = build_navigation(&package.metadata.name, &graph);
        document.diagnostics = report.diagnostics.iter().filter(|d| d.is_claimed()).cloned().collect();
        document.cross_language_package_id = mapping.as_ref().and_then(|m| m.package_id().map(str::to_string));
        document.verify_unique_ids()?;

        debug!(tokens = document.tokens.len(), "document assembled");
        Ok(Generated { document, report })
    }

    fn load_mapping(&self, root: &Path, discovery: &Discovery) -> anyhow::Result<Option<CrossLanguageMap>> {
        let ns_dir = discovery
            .namespace
            .split('.')
            .fold(discovery.import_root.clone(), |p, s| p.join(s));
        match CrossLanguageMap::locate(self.mapping_path.as_deref(), &[root, ns_dir.as_path()]) {
            Some(path) => {
                let mapping = CrossLanguageMap::load(&path)?;
                info!(path = %path.display(), entries = mapping.len(), "cross-language mapping loaded");
                Ok(Some(mapping))
            }
            None => Ok(None),
        }
    }
}

/// Findings for modules that could not be parsed. Discovered modules are
/// targeted by name; private helpers only by file. A failed module leaves
/// every name it defines without a source, so these are reported as
/// missing source links.
fn import_failures(index: &PackageIndex, discovery: &Discovery) -> Vec<Finding> {
    index
        .failures()
        .map(|(name, failure)| {
            let message = format!("Unable to import module {}: {}", name, failure.reason);
            warn!(module = %name, reason = %failure.reason, "module omitted");
            if discovery.modules.iter().any(|m| m == name) {
                Finding::node(DiagnosticCode::MissingSourceLink, name, message)
            } else {
                Finding::in_file(DiagnosticCode::MissingSourceLink, failure.path.clone(), message)
            }
        })
        .collect()
}
