//! Installing the package under review.
//!
//! Installation goes through the `Installer` trait so runs that only need the
//! sources (tests, `--skip-install`) can use `NoopInstaller`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use super::metadata::Extra;
use crate::error::StubError;

/// Interpreter names tried on PATH, in order.
const PYTHON_NAMES: &[&str] = &["python3", "python"];

pub trait Installer {
    fn name(&self) -> &'static str;

    /// Install `target` (an archive or a source directory), optionally with an extra.
    fn install(&self, target: &Path, extra: Option<&str>) -> Result<(), StubError>;

    /// Interpreter used for installs, if any.
    fn python(&self) -> Option<&Path> {
        None
    }
}

/// `<python> -m pip install --force-reinstall -q <target>`.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    python: PathBuf,
}

impl PipInstaller {
    /// Use `configured`, or the first of `python3`/`python` on PATH.
    pub fn locate(configured: Option<&Path>) -> Result<Self, StubError> {
        Ok(Self {
            python: find_python(configured)?,
        })
    }
}

impl Installer for PipInstaller {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn install(&self, target: &Path, extra: Option<&str>) -> Result<(), StubError> {
        let spec = match extra {
            Some(extra) => format!("{}[{}]", target.display(), extra),
            None => target.display().to_string(),
        };
        debug!(python = %self.python.display(), spec = %spec, "pip install");
        let output = Command::new(&self.python)
            .args(["-m", "pip", "install", "--force-reinstall", "-q"])
            .arg(&spec)
            .output()?;
        if output.status.success() {
            return Ok(());
        }
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(StubError::InstallFailed {
            status: output.status.to_string(),
            output: captured.trim().to_string(),
        })
    }

    fn python(&self) -> Option<&Path> {
        Some(&self.python)
    }
}

/// Does nothing; sources are read where they were extracted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstaller;

impl Installer for NoopInstaller {
    fn name(&self) -> &'static str {
        "none"
    }

    fn install(&self, _target: &Path, _extra: Option<&str>) -> Result<(), StubError> {
        Ok(())
    }
}

pub fn find_python(configured: Option<&Path>) -> Result<PathBuf, StubError> {
    if let Some(path) = configured {
        return which::which(path).map_err(|_| StubError::InterpreterNotFound);
    }
    PYTHON_NAMES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or(StubError::InterpreterNotFound)
}

/// Install the package, then each extra whose marker holds.
///
/// A failed extra is logged and skipped; a failed package install is fatal.
pub fn install_package(
    installer: &dyn Installer,
    target: &Path,
    extras: &[Extra],
    with_extras: bool,
) -> Result<(), StubError> {
    info!(installer = installer.name(), target = %target.display(), "installing package");
    installer.install(target, None)?;
    if !with_extras {
        return Ok(());
    }
    let env = MarkerEnv::current();
    for extra in extras.iter().filter(|e| !e.name.is_empty()) {
        if let Some(marker) = &extra.marker {
            if !env.holds(marker) {
                debug!(extra = %extra.name, marker = %marker, "skipping extra");
                continue;
            }
        }
        if let Err(e) = installer.install(target, Some(&extra.name)) {
            warn!(extra = %extra.name, error = %e, "extra failed to install");
        }
    }
    Ok(())
}

/// Values for the environment-marker variables we evaluate.
#[derive(Debug, Clone)]
pub struct MarkerEnv {
    pub sys_platform: String,
    pub platform_system: String,
    pub os_name: String,
    /// Unknown without asking an interpreter; comparisons against it hold.
    pub python_version: Option<String>,
}

impl MarkerEnv {
    pub fn current() -> Self {
        let (sys_platform, platform_system) = match std::env::consts::OS {
            "windows" => ("win32", "Windows"),
            "macos" => ("darwin", "Darwin"),
            "linux" => ("linux", "Linux"),
            other => (other, other),
        };
        Self {
            sys_platform: sys_platform.to_string(),
            platform_system: platform_system.to_string(),
            os_name: if cfg!(windows) { "nt" } else { "posix" }.to_string(),
            python_version: None,
        }
    }

    /// Evaluate `a == 'x' and b != 'y' or ...`. Unknown variables hold.
    pub fn holds(&self, marker: &str) -> bool {
        marker
            .split(" or ")
            .any(|clause| clause.split(" and ").all(|cmp| self.compare(cmp.trim())))
    }

    fn compare(&self, expr: &str) -> bool {
        let expr = expr.trim_matches(|c| c == '(' || c == ')').trim();
        let Some((op, pos)) = ["==", "!=", ">=", "<=", ">", "<"]
            .iter()
            .find_map(|op| expr.find(op).map(|pos| (*op, pos)))
        else {
            return true;
        };
        let var = expr[..pos].trim();
        let value = expr[pos + op.len()..].trim().trim_matches(|c| c == '\'' || c == '"');
        let actual = match var {
            "sys_platform" => self.sys_platform.as_str(),
            "platform_system" => self.platform_system.as_str(),
            "os_name" => self.os_name.as_str(),
            "python_version" => match &self.python_version {
                Some(v) => v.as_str(),
                None => return true,
            },
            _ => return true,
        };
        if var == "python_version" {
            let ord = version_key(actual).cmp(&version_key(value));
            return match op {
                "==" => ord.is_eq(),
                "!=" => ord.is_ne(),
                ">=" => ord.is_ge(),
                "<=" => ord.is_le(),
                ">" => ord.is_gt(),
                _ => ord.is_lt(),
            };
        }
        match op {
            "==" => actual == value,
            "!=" => actual != value,
            _ => true,
        }
    }
}

fn version_key(v: &str) -> Vec<u64> {
    v.split('.').map(|p| p.parse().unwrap_or(0)).collect()
}
