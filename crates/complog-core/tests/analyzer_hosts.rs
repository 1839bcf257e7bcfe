//! Analyzer host behavior as seen through the reader.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use complog_core::{
    AnalyzerHostManager, ArchiveBuilder, BasicAnalyzerKind, BuilderOptions, CompilerCall,
    CompilerCallKind, CompilerLogReader, ComplogError, HostOptions, Language, ReaderOptions,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write(dir: &Path, name: &str, data: &[u8]) {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

/// Two projects using the same generator, and a third with none.
fn project_tree() -> (TempDir, Vec<u8>) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "tools/Gen.dll", b"MZ-generator");
    for name in ["one", "two"] {
        write(root, &format!("{name}/a.cs"), b"partial class A {}");
        write(root, &format!("{name}/obj/gen/A.g.cs"), b"partial class A { int X; }");
    }
    write(root, "plain/p.cs", b"class P {}");

    let analyzer = format!("/analyzer:{}", root.join("tools/Gen.dll").display());
    let calls = [
        ("one", vec![analyzer.clone(), "/generatedfilesout:obj/gen".into(), "a.cs".into()]),
        ("two", vec![analyzer.clone(), "/generatedfilesout:obj/gen".into(), "a.cs".into()]),
        ("plain", vec!["p.cs".to_string()]),
    ];

    let mut builder = ArchiveBuilder::new(Cursor::new(Vec::new()), BuilderOptions::default());
    for (name, args) in calls {
        let call = CompilerCall::new(
            root.join(name).join(format!("{name}.csproj")),
            CompilerCallKind::Regular,
            Some("net8.0".to_string()),
            Language::CSharp,
            args,
        );
        assert!(builder.add(&call).unwrap(), "{:?}", builder.diagnostics());
    }
    let bytes = builder.finish().unwrap().into_inner();
    (dir, bytes)
}

fn open(bytes: Vec<u8>, options: ReaderOptions) -> CompilerLogReader {
    CompilerLogReader::from_reader(Cursor::new(bytes), options).unwrap()
}

/// Test: calls with the same analyzer set share one live host
#[test]
fn test_identical_analyzer_sets_share_a_host() {
    let (_dir, bytes) = project_tree();
    let reader = open(bytes, ReaderOptions::default());
    let calls = reader.compiler_calls().unwrap();

    let first = reader.analyzer_host(&calls[0]).unwrap();
    let second = reader.analyzer_host(&calls[1]).unwrap();
    assert!(first.is_cached());
    assert!(first.same_host(&second));
    assert_eq!(first.modules().len(), 1);
    assert_eq!(first.modules()[0].file_name, "Gen.dll");

    let other = reader.analyzer_host(&calls[2]).unwrap();
    assert!(!other.same_host(&first));
    assert_eq!(reader.host_manager().live_hosts(), 2);

    drop(first);
    assert!(!second.is_disposed());
    drop(second);
    drop(other);
    assert_eq!(reader.host_manager().live_hosts(), 0);
}

/// Test: the None strategy substitutes recorded generated text
#[test]
fn test_none_strategy_substitutes_generated_text() {
    let (_dir, bytes) = project_tree();
    let options = ReaderOptions::default().with_analyzer_kind(BasicAnalyzerKind::None);
    let reader = open(bytes, options);
    let call = reader.compiler_call(0).unwrap();

    let data = reader
        .compilation_data(&call, &CancellationToken::new())
        .unwrap();
    assert!(!data.host.is_cached());
    assert!(data.host.modules().is_empty());
    let sources = data.compiled_sources().unwrap();
    let texts: Vec<&str> = sources.iter().map(|s| &*s.text).collect();
    assert_eq!(texts, vec!["partial class A {}", "partial class A { int X; }"]);
}

/// Test: no recorded generated text means generation fails closed
#[test]
fn test_none_strategy_without_generated_text_fails_closed() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Gen.dll", b"MZ");
    write(dir.path(), "a.cs", b"class A {}");
    let call = CompilerCall::new(
        dir.path().join("app.csproj"),
        CompilerCallKind::Regular,
        None,
        Language::CSharp,
        vec!["/analyzer:Gen.dll".to_string(), "a.cs".to_string()],
    );
    let mut builder = ArchiveBuilder::new(Cursor::new(Vec::new()), BuilderOptions::default());
    assert!(builder.add(&call).unwrap());
    let bytes = builder.finish().unwrap().into_inner();

    let options = ReaderOptions::default().with_analyzer_kind(BasicAnalyzerKind::None);
    let reader = open(bytes, options);
    let call = reader.compiler_call(0).unwrap();
    let host = reader.analyzer_host(&call).unwrap();
    assert!(!host.is_available());
    assert!(matches!(
        host.generated_sources(),
        Err(ComplogError::GeneratorsUnavailable(_))
    ));
}

/// Test: a runtime without dynamic loading refuses code-loading strategies
#[test]
fn test_code_loading_refused_without_dynamic_loading() {
    let (_dir, bytes) = project_tree();
    let options = ReaderOptions::default()
        .with_analyzer_kind(BasicAnalyzerKind::OnDisk)
        .with_host(HostOptions::default().with_dynamic_loading(false));
    let reader = open(bytes, options);
    let call = reader.compiler_call(0).unwrap();
    assert!(matches!(
        reader.analyzer_host(&call),
        Err(ComplogError::Capability {
            kind: BasicAnalyzerKind::OnDisk
        })
    ));
}

/// Test: on-disk hosts materialize analyzers and clean up after release
#[test]
fn test_on_disk_host_cleans_up_scratch_directory() {
    let (_dir, bytes) = project_tree();
    let options = ReaderOptions::default().with_analyzer_kind(BasicAnalyzerKind::OnDisk);
    let reader = open(bytes, options);
    let call = reader.compiler_call(0).unwrap();

    let host = reader.analyzer_host(&call).unwrap();
    let path = host.modules()[0].path.clone().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"MZ-generator");
    drop(host);
    assert!(!path.exists());
}

/// Test: closing a reader leaves an externally supplied manager running
#[test]
fn test_external_manager_outlives_reader() {
    let (_dir, bytes) = project_tree();
    let manager = Arc::new(AnalyzerHostManager::new(HostOptions::default()));
    let reader = CompilerLogReader::with_host_manager(
        Cursor::new(bytes.clone()),
        ReaderOptions::default(),
        manager.clone(),
    )
    .unwrap();
    let call = reader.compiler_call(0).unwrap();
    let lease = reader.analyzer_host(&call).unwrap();
    reader.close();
    assert!(!manager.is_closed());
    assert!(!lease.is_disposed());
    drop(lease);

    let owned = open(bytes, ReaderOptions::default());
    owned.close();
    assert!(owned.host_manager().is_closed());
}
