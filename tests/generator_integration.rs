//! End-to-end tests for the generation pipeline.
//!
//! The fixture package in `testdata/widgets` is presented in each supported
//! input shape (source directory with `setup.py`, with `pyproject.toml`, a
//! wheel and an sdist) and run through the generator without installing.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use walkdir::WalkDir;

use apistub::tokens::{line_ids, render_lines, Token, TokenKind};
use apistub::{ApiView, DiagnosticCode, Generated, Generator, Severity, StubError};

const NAME: &str = "azure-widgets";
const VERSION: &str = "1.0.0b1";

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join("widgets")
}

/// Fixture files as (relative path with forward slashes, absolute path).
fn fixture_files() -> Vec<(String, PathBuf)> {
    let root = fixture_root();
    let mut files: Vec<(String, PathBuf)> = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(&root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            (rel, e.path().to_path_buf())
        })
        .collect();
    files.sort();
    files
}

fn copy_fixture(dest: &Path) {
    for (rel, src) in fixture_files() {
        let target = dest.join(&rel);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::copy(&src, &target).unwrap();
    }
}

fn setup_py() -> String {
    format!(
        "from setuptools import setup, find_packages\n\nPACKAGE_NAME = \"{}\"\n\nsetup(\n    name=PACKAGE_NAME,\n    packages=find_packages(),\n    extras_require={{\"aio\": [\"aiohttp\"]}},\n)\n",
        NAME
    )
}

fn core_metadata() -> String {
    format!("Metadata-Version: 2.1\nName: {}\nVersion: {}\nProvides-Extra: aio\n", NAME, VERSION)
}

fn setup_dir(tmp: &Path) -> PathBuf {
    let dir = tmp.join("setup-src");
    copy_fixture(&dir);
    fs::write(dir.join("setup.py"), setup_py()).unwrap();
    dir
}

fn pyproject_dir(tmp: &Path) -> PathBuf {
    let dir = tmp.join("pyproject-src");
    copy_fixture(&dir);
    fs::write(
        dir.join("pyproject.toml"),
        format!(
            "[build-system]\nrequires = [\"setuptools\"]\n\n[project]\nname = \"{}\"\ndynamic = [\"version\"]\n\n[project.optional-dependencies]\naio = [\"aiohttp\"]\n",
            NAME
        ),
    )
    .unwrap();
    dir
}

fn wheel(tmp: &Path) -> PathBuf {
    let path = tmp.join(format!("azure_widgets-{}-py3-none-any.whl", VERSION));
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for (rel, src) in fixture_files() {
        zip.start_file(rel.as_str(), options).unwrap();
        zip.write_all(&fs::read(&src).unwrap()).unwrap();
    }
    let info = format!("azure_widgets-{}.dist-info", VERSION);
    zip.start_file(format!("{}/METADATA", info), options).unwrap();
    zip.write_all(core_metadata().as_bytes()).unwrap();
    zip.start_file(format!("{}/top_level.txt", info), options).unwrap();
    zip.write_all(b"azure\n").unwrap();
    zip.finish().unwrap();
    path
}

fn sdist(tmp: &Path) -> PathBuf {
    let path = tmp.join(format!("{}-{}.tar.gz", NAME, VERSION));
    let prefix = format!("{}-{}", NAME, VERSION);
    let mut builder = tar::Builder::new(GzEncoder::new(File::create(&path).unwrap(), Compression::default()));
    for (rel, src) in fixture_files() {
        builder
            .append_path_with_name(&src, format!("{}/{}", prefix, rel))
            .unwrap();
    }
    for (name, body) in [("PKG-INFO", core_metadata()), ("setup.py", setup_py())] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", prefix, name), body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    path
}

fn generate(pkg: &Path, tmp: &Path) -> Generated {
    Generator::new(pkg, tmp.join("scratch"))
        .skip_install(true)
        .generate()
        .unwrap()
}

fn lines(tokens: &[Token]) -> Vec<String> {
    render_lines(tokens).into_iter().map(|l| l.trim().to_string()).collect()
}

fn marker<'a>(doc: &'a ApiView, id: &str) -> Option<&'a Token> {
    doc.tokens
        .iter()
        .find(|t| t.kind == TokenKind::LineIdMarker && t.definition_id.as_deref() == Some(id))
}

fn position(lines: &[String], prefix: &str) -> usize {
    lines
        .iter()
        .position(|l| l.starts_with(prefix))
        .unwrap_or_else(|| panic!("no line starting with {:?}", prefix))
}

#[test]
fn test_metadata_and_document_fields() {
    let tmp = TempDir::new().unwrap();
    let doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    assert_eq!(doc.package_name, NAME);
    assert_eq!(doc.version_string, VERSION);
    assert_eq!(doc.language, "Python");
    assert_eq!(doc.cross_language_package_id.as_deref(), Some("Widgets"));

    let ids = line_ids(&doc.tokens);
    assert!(ids.contains(&"azure.widgets"));
    assert!(ids.contains(&"azure.widgets.aio"));
    assert!(!ids.iter().any(|id| id.contains("._models") || id.contains("._client")));
}

#[test]
fn test_simple_class_method() {
    let tmp = TempDir::new().unwrap();
    let doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    let ids = line_ids(&doc.tokens);
    for id in [
        "azure.widgets.Widget",
        "azure.widgets.Widget.bar",
        "azure.widgets.Widget.bar.param(x)",
        "azure.widgets.Widget.bar.param(y)",
    ] {
        assert_eq!(ids.iter().filter(|i| **i == id).count(), 1, "{}", id);
    }
    assert!(lines(&doc.tokens).contains(&"def bar(self, x: int, *, y: str = \"k\") -> None".to_string()));

    let module = doc.navigation[0]
        .child_items
        .iter()
        .find(|m| m.navigation_id == "azure.widgets")
        .unwrap();
    let widgets: Vec<_> = module
        .child_items
        .iter()
        .filter(|i| i.navigation_id == "azure.widgets.Widget")
        .collect();
    assert_eq!(widgets.len(), 1);
}

#[test]
fn test_docstring_kwargs_and_union() {
    let tmp = TempDir::new().unwrap();
    let doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    let rendered = lines(&doc.tokens);
    assert!(rendered.contains(
        &"def azure.widgets.connect(host, *, port: int = ..., tls: bool = ..., **kwargs) -> None".to_string()
    ));
    assert!(rendered.contains(&"def azure.widgets.convert(value: Union[str, int, None]) -> str".to_string()));
}

#[test]
fn test_enum_typed_dict_and_absorption() {
    let tmp = TempDir::new().unwrap();
    let doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    let ids = line_ids(&doc.tokens);
    assert!(ids.contains(&"azure.widgets.Color.RED"));
    assert!(ids.contains(&"azure.widgets.Color.GREEN"));

    let rendered = lines(&doc.tokens);
    assert!(rendered.contains(&"RED = \"r\"".to_string()));
    assert!(rendered.contains(&"key \"color\": Color".to_string()));
    assert!(rendered.contains(&"class azure.widgets.WidgetIterator: implements Iterator".to_string()));
    assert!(!ids.contains(&"azure.widgets.WidgetIterator.__iter__"));
    assert!(!ids.contains(&"azure.widgets.WidgetIterator.__next__"));
    assert!(rendered
        .iter()
        .any(|l| l.starts_with("class azure.widgets.aio.WidgetClient:") && l.ends_with("implements AsyncContextManager")));
}

#[test]
fn test_canonical_member_order() {
    let tmp = TempDir::new().unwrap();
    let doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    let rendered = lines(&doc.tokens);
    let property = position(&rendered, "property label: str");
    let ivar = position(&rendered, "ivar name: str");
    let init = position(&rendered, "def __init__(self, name: str");
    let bar = position(&rendered, "def bar(");
    assert!(property < ivar && ivar < init && init < bar);
}

#[test]
fn test_async_twins_and_overloads() {
    let tmp = TempDir::new().unwrap();
    let doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    let ids = line_ids(&doc.tokens);
    assert!(ids.contains(&"azure.widgets.Widget.fetch"));
    assert!(ids.contains(&"azure.widgets.Widget.fetch:async"));
    let rendered = lines(&doc.tokens);
    assert!(rendered.contains(&"def fetch(self)".to_string()));
    assert!(rendered.contains(&"async def fetch(self)".to_string()));

    for id in [
        "azure.widgets.WidgetClient.get_widget_1",
        "azure.widgets.WidgetClient.get_widget_2",
        "azure.widgets.WidgetClient.get_widget",
    ] {
        assert!(ids.contains(&id), "{}", id);
    }
    let rows: Vec<&String> = rendered
        .iter()
        .filter(|l| !l.is_empty())
        .skip_while(|l| !l.starts_with("@overload"))
        .take(5)
        .collect();
    assert_eq!(rows[0], "@overload");
    assert!(rows[1].starts_with("def get_widget(self, name: str"));
    assert_eq!(rows[2], "@overload");
    assert!(rows[3].starts_with("def get_widget(self, name: bytes"));
    assert!(rows[4].starts_with("def get_widget(self, name: Union[str, bytes]"));
}

#[test]
fn test_diagnostics_are_attributed_once() {
    let tmp = TempDir::new().unwrap();
    let generated = generate(&setup_dir(tmp.path()), tmp.path());
    let doc = &generated.document;

    let mut pairs: Vec<(String, String)> = doc
        .diagnostics
        .iter()
        .map(|d| (d.text.clone(), d.target_id.clone()))
        .collect();
    let before = pairs.len();
    pairs.sort();
    pairs.dedup();
    assert_eq!(pairs.len(), before);

    let kwargs: Vec<&str> = doc
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::MissingKwargs)
        .map(|d| d.target_id.as_str())
        .collect();
    assert_eq!(kwargs, vec!["azure.widgets.WidgetClient.delete_widget"]);

    assert!(doc
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::MissingType && d.target_id == "azure.widgets.connect.param(host)"));

    // The private module with a syntax error cannot be tied to a line.
    assert_eq!(generated.report.unclaimed, 1);
    assert!(doc.diagnostics.iter().all(|d| !d.target_id.is_empty()));
    for (i, d) in generated.report.diagnostics.iter().enumerate() {
        assert_eq!(d.diagnostic_id, format!("AZ_PY_{}", i + 1));
    }
}

#[test]
fn test_public_import_failure_targets_module() {
    let tmp = TempDir::new().unwrap();
    let dir = setup_dir(tmp.path());
    fs::write(dir.join("azure/widgets/legacy.py"), "def broken(:\n    pass\n").unwrap();
    let doc = generate(&dir, tmp.path()).document;

    assert!(!line_ids(&doc.tokens).contains(&"azure.widgets.legacy"));
    let failure = doc
        .diagnostics
        .iter()
        .find(|d| d.text.starts_with("Unable to import module azure.widgets.legacy"))
        .unwrap();
    assert_eq!(failure.target_id, "azure.widgets.legacy");
    assert_eq!(failure.code, DiagnosticCode::MissingSourceLink);
    assert_eq!(failure.level, Severity::Warning);
    assert!(failure.text.ends_with("[missing-source-link]"));
}

#[test]
fn test_serialized_codes_stay_in_closed_set() {
    let tmp = TempDir::new().unwrap();
    let dir = setup_dir(tmp.path());
    fs::write(dir.join("azure/widgets/legacy.py"), "def broken(:\n    pass\n").unwrap();
    let doc = generate(&dir, tmp.path()).document;
    let json: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();

    let diagnostics = json["Diagnostics"].as_array().unwrap();
    assert!(!diagnostics.is_empty());
    for d in diagnostics {
        let text = d["Text"].as_str().unwrap();
        let code = text
            .rsplit_once(" [")
            .and_then(|(_, rest)| rest.strip_suffix(']'))
            .unwrap();
        assert!(DiagnosticCode::parse(code).is_ok(), "{}", text);
        if let Some(link) = d["HelpLinkUri"].as_str() {
            assert!(link.ends_with(&format!("#{}", code)));
        }
    }
}

#[test]
fn test_cross_language_ids() {
    let tmp = TempDir::new().unwrap();
    let doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    let cross = |id: &str| marker(&doc, id).and_then(|t| t.cross_language_id.clone());
    assert_eq!(cross("azure.widgets.WidgetClient").as_deref(), Some("Widgets.Client"));
    assert_eq!(cross("azure.widgets.aio.WidgetClient").as_deref(), Some("Widgets.Client"));
    assert_eq!(
        cross("azure.widgets.WidgetClient.get_widget_1").as_deref(),
        Some("Widgets.Client.getWidget")
    );
    assert_eq!(cross("azure.widgets.Widget"), None);
}

#[test]
fn test_explicit_mapping_path_wins() {
    let tmp = TempDir::new().unwrap();
    let dir = setup_dir(tmp.path());
    let mapping = tmp.path().join("mapping.json");
    fs::write(&mapping, r#"{"azure.widgets.Widget": "Widgets.Widget"}"#).unwrap();
    let doc = Generator::new(&dir, tmp.path().join("scratch"))
        .skip_install(true)
        .mapping_path(Some(mapping))
        .generate()
        .unwrap()
        .document;
    let widget = marker(&doc, "azure.widgets.Widget").unwrap();
    assert_eq!(widget.cross_language_id.as_deref(), Some("Widgets.Widget"));
    assert!(marker(&doc, "azure.widgets.WidgetClient").unwrap().cross_language_id.is_none());
    assert!(doc.cross_language_package_id.is_none());
}

#[test]
fn test_unique_ids_and_duplicate_rejection() {
    let tmp = TempDir::new().unwrap();
    let mut doc = generate(&setup_dir(tmp.path()), tmp.path()).document;
    assert!(doc.verify_unique_ids().is_ok());

    let duplicate = marker(&doc, "azure.widgets.Widget").cloned().unwrap();
    doc.tokens.push(duplicate);
    doc.tokens.push(Token::new(TokenKind::Newline, ""));
    assert!(matches!(
        doc.verify_unique_ids(),
        Err(StubError::DuplicateDefinitionId(id)) if id == "azure.widgets.Widget"
    ));
    assert!(doc.write(&tmp.path().join("out.json")).is_err());
}

#[test]
fn test_runs_are_deterministic() {
    let tmp = TempDir::new().unwrap();
    let pkg = wheel(tmp.path());
    let first = generate(&pkg, tmp.path()).document.to_json().unwrap();
    let second = generate(&pkg, tmp.path()).document.to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_input_shapes_agree() {
    let tmp = TempDir::new().unwrap();
    let shapes = [
        setup_dir(tmp.path()),
        pyproject_dir(tmp.path()),
        wheel(tmp.path()),
        sdist(tmp.path()),
    ];
    let docs: Vec<ApiView> = shapes.iter().map(|p| generate(p, tmp.path()).document).collect();

    let summary = |doc: &ApiView| {
        let ids: Vec<String> = line_ids(&doc.tokens).into_iter().map(str::to_string).collect();
        let diagnostics = serde_json::to_string(&doc.diagnostics).unwrap();
        (doc.package_name.clone(), doc.version_string.clone(), ids, diagnostics)
    };
    let expected = summary(&docs[0]);
    for (shape, doc) in shapes.iter().zip(&docs).skip(1) {
        assert_eq!(summary(doc), expected, "{}", shape.display());
    }
}

#[test]
fn test_source_links() {
    let tmp = TempDir::new().unwrap();
    let doc = Generator::new(setup_dir(tmp.path()), tmp.path().join("scratch"))
        .skip_install(true)
        .source_url(Some("https://example.com/repo/".to_string()))
        .generate()
        .unwrap()
        .document;
    let rendered = lines(&doc.tokens);
    assert!(rendered.contains(&"# Source URL: https://example.com/repo/".to_string()));
    assert!(rendered
        .iter()
        .any(|l| l.starts_with("class azure.widgets.Widget: # https://example.com/repo/azure/widgets/_models.py#L")));
}

#[test]
fn test_filter_namespace_and_output_file() {
    let tmp = TempDir::new().unwrap();
    let doc = Generator::new(setup_dir(tmp.path()), tmp.path().join("scratch"))
        .skip_install(true)
        .filter_namespace(Some("azure.widgets.aio".to_string()))
        .generate()
        .unwrap()
        .document;
    let ids = line_ids(&doc.tokens);
    assert!(ids.contains(&"azure.widgets.aio.WidgetClient"));
    assert!(!ids.contains(&"azure.widgets"));

    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let path = doc.write(&out).unwrap();
    assert_eq!(path, out.join(format!("{}_python.json", NAME)));
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["Navigation"][0]["NavigationId"], "GLOBAL");
}

#[test]
fn test_invalid_inputs_fail_before_scratch() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("package.rar");
    fs::write(&bogus, b"").unwrap();
    let scratch = tmp.path().join("scratch");
    let err = Generator::new(&bogus, &scratch).skip_install(true).generate().unwrap_err();
    assert!(matches!(err.downcast_ref::<StubError>(), Some(StubError::UnsupportedArchive(_))));
    assert!(!scratch.exists());

    let err = Generator::new(tmp.path().join("missing"), &scratch)
        .skip_install(true)
        .generate()
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<StubError>(), Some(StubError::InvalidPath(_))));
}
