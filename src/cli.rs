//! Command-line interface for apistubgen.

use clap::Parser;
use std::io;
use std::path::PathBuf;

use tracing::info;

use crate::config::Settings;
use crate::generator::Generator;
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;

/// Generate an APIView token file for a Python package.
///
/// Accepts a wheel, a source distribution, or a source directory with
/// `setup.py` or `pyproject.toml`, and writes a JSON document describing the
/// package's public API for review.
#[derive(Parser, Debug)]
#[command(name = "apistubgen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Wheel, sdist, or source directory of the package to review
    #[arg(long)]
    pub pkg_path: PathBuf,

    /// Scratch root for extraction and install
    #[arg(long)]
    pub temp_path: PathBuf,

    /// Output file, or a directory to write `<package>_python.json` into
    #[arg(long)]
    pub out_path: PathBuf,

    /// Cross-language ID mapping file (JSON)
    #[arg(long)]
    pub mapping_path: Option<PathBuf>,

    /// Base URL for source links on classes and functions
    #[arg(long)]
    pub source_url: Option<String>,

    /// Emit only modules under this namespace
    #[arg(long)]
    pub filter_namespace: Option<String>,

    /// Do not install the package before reading it
    #[arg(long)]
    pub skip_install: bool,

    /// Settings file (default: apistub.yaml, then the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Debug logging and a full diagnostic listing
    #[arg(short, long)]
    pub verbose: bool,
}

/// Set up stderr logging; `warn` by default, `debug` when verbose.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Run one generation. Returns the process exit code.
pub fn run(args: &Cli) -> anyhow::Result<i32> {
    let settings = Settings::load(args.config.as_deref())?;

    let generated = Generator::new(&args.pkg_path, &args.temp_path)
        .settings(settings)
        .mapping_path(args.mapping_path.clone())
        .source_url(args.source_url.clone())
        .filter_namespace(args.filter_namespace.clone())
        .skip_install(args.skip_install)
        .generate()?;

    let document = &generated.document;
    let path = document.write(&args.out_path)?;
    info!(path = %path.display(), "done");

    report::write_summary(
        &document.package_name,
        &document.version_string,
        &path,
        &generated.report,
        args.verbose,
    );

    if generated.report.has_errors() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_required_flags() {
        assert!(Cli::try_parse_from(["apistubgen", "--pkg-path", "x"]).is_err());
        let cli = Cli::try_parse_from([
            "apistubgen",
            "--pkg-path",
            "pkg.whl",
            "--temp-path",
            "/tmp",
            "--out-path",
            "out",
            "--skip-install",
            "--filter-namespace",
            "azure.foo",
        ])
        .unwrap();
        assert!(cli.skip_install);
        assert_eq!(cli.filter_namespace.as_deref(), Some("azure.foo"));
        assert!(cli.mapping_path.is_none());
        assert!(!cli.verbose);
    }
}
